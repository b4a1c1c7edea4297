//! Topic Status
//!
//! Collapses a channel's state into the coarse status shown next to each
//! topic in the history list.

use agent_timeline_core::{Channel, ExecutionStatus, TopicStatus};

/// Derive the status of a channel. First match wins:
/// stopping, running, failed, idle.
pub fn derive_topic_status(channel: &Channel) -> TopicStatus {
    if channel.aborting {
        return TopicStatus::Stopping;
    }

    let latest = channel.latest_execution().map(|e| e.status);
    let live = channel
        .messages
        .iter()
        .any(|m| m.is_streaming() || m.is_thinking());
    if channel.responding || live || latest == Some(ExecutionStatus::Running) {
        return TopicStatus::Running;
    }

    if latest == Some(ExecutionStatus::Failed) || channel.error.is_some() {
        return TopicStatus::Failed;
    }

    TopicStatus::Idle
}
