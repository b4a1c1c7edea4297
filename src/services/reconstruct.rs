//! Metadata Reconstructor
//!
//! Rebuilds executions from the persisted `agent_metadata` summary after a
//! reload or reconnect, and seeds a channel from the message history API.

use chrono::{DateTime, Utc};
use serde_json::Value;

use agent_timeline_core::{
    AgentExecution, Channel, ExecutionError, ExecutionStatus, Message, Phase, PhaseStatus,
};

use crate::models::history::{ExecutionSummary, HistoryMessage, TimelineEntry};

/// Fields checked, in order, when a node output is an object
const OUTPUT_TEXT_FIELDS: [&str; 3] = ["content", "output", "text"];

/// `deep_research-step` -> `Deep Research Step`
pub fn humanize_node_id(node_id: &str) -> String {
    node_id
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Displayable text for a node output
fn output_text(output: &Value) -> String {
    match output {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => OUTPUT_TEXT_FIELDS
            .iter()
            .find_map(|field| map.get(*field))
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => pretty(other),
            })
            .unwrap_or_else(|| pretty(output)),
        other => pretty(other),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Status of a summary: the last terminal timeline entry wins, otherwise the
/// top-level status is taken as recorded
fn summary_status(summary: &ExecutionSummary) -> ExecutionStatus {
    let from_timeline = summary
        .timeline
        .iter()
        .rev()
        .find_map(|entry| match entry.event_type.as_str() {
            "agent_end" => Some(ExecutionStatus::from_terminal(
                entry.status.as_deref().unwrap_or("completed"),
            )),
            "agent_error" => Some(ExecutionStatus::Failed),
            _ => None,
        });

    from_timeline
        .or_else(|| ExecutionStatus::parse(&summary.status))
        .unwrap_or_else(|| ExecutionStatus::from_terminal(&summary.status))
}

fn node_duration(timeline: &[TimelineEntry], node_id: &str) -> Option<u64> {
    timeline
        .iter()
        .rev()
        .filter(|entry| entry.event_type == "node_end")
        .find(|entry| entry.node_id.as_deref() == Some(node_id))
        .and_then(|entry| entry.duration_ms)
}

fn summary_error(error: &Value) -> ExecutionError {
    match error {
        Value::Object(map) => ExecutionError {
            error_type: map
                .get("error_type")
                .and_then(Value::as_str)
                .unwrap_or("error")
                .to_string(),
            message: map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            recoverable: map
                .get("recoverable")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            node_id: map
                .get("node_id")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        Value::String(message) => ExecutionError {
            error_type: "error".to_string(),
            message: message.clone(),
            recoverable: false,
            node_id: None,
        },
        other => ExecutionError {
            error_type: "error".to_string(),
            message: other.to_string(),
            recoverable: false,
            node_id: None,
        },
    }
}

/// Rebuild an execution from its persisted summary.
///
/// Phases follow `node_order` and are all `completed`, including those of a
/// run that is still `running`.
pub fn reconstruct_execution(summary: &ExecutionSummary, now: DateTime<Utc>) -> AgentExecution {
    let started_at = summary.started_at.unwrap_or(now);
    let mut execution = AgentExecution::new(summary.execution_id.clone(), started_at).with_agent(
        summary.agent_id.clone(),
        summary.agent_name.clone(),
        summary.agent_type.clone(),
    );

    execution.phases = summary
        .node_order
        .iter()
        .map(|node_id| {
            let name = summary
                .node_names
                .get(node_id)
                .cloned()
                .unwrap_or_else(|| humanize_node_id(node_id));
            let mut phase = Phase::new(node_id.clone(), name, started_at);
            phase.status = PhaseStatus::Completed;
            phase.streamed_content = summary
                .node_outputs
                .get(node_id)
                .map(output_text)
                .unwrap_or_default();
            phase.duration_ms = node_duration(&summary.timeline, node_id);
            phase
        })
        .collect();

    execution.status = summary_status(summary);
    execution.ended_at = summary.ended_at;
    execution.duration_ms = summary.duration_ms;
    execution.error = summary.error.as_ref().map(summary_error);
    execution
}

fn history_to_message(entry: HistoryMessage, now: DateTime<Utc>) -> Message {
    let mut msg = Message::new(entry.id.clone(), entry.id, entry.role, entry.created_at)
        .with_content(entry.content);
    msg.thinking_content = entry.thinking_content;
    msg.attachments = entry.attachments;
    msg.citations = entry.citations;
    msg.agent_execution = entry
        .agent_metadata
        .as_ref()
        .map(|summary| reconstruct_execution(summary, now));
    msg.backfill_content_from_phases();
    msg
}

fn is_in_flight(msg: &Message) -> bool {
    msg.is_loading() || msg.is_streaming() || msg.is_thinking() || msg.has_running_execution()
}

/// Replace a channel's messages with the persisted history.
///
/// Local messages after the last one the history knows about are kept when
/// they are still in flight or were never persisted, so a reload during a
/// run does not drop the live tail.
pub fn seed_history(channel: &mut Channel, history: Vec<HistoryMessage>, now: DateTime<Utc>) {
    let known = |id: &str| history.iter().any(|h| h.id == id);
    let tail_start = channel
        .messages
        .iter()
        .rposition(|m| known(&m.id))
        .map_or(0, |i| i + 1);

    let tail: Vec<Message> = channel
        .messages
        .drain(tail_start..)
        .filter(|m| !known(&m.id))
        .filter(|m| is_in_flight(m) || !crate::utils::ids::is_persisted_id(&m.id))
        .collect();

    let mut messages: Vec<Message> = history
        .into_iter()
        .map(|entry| history_to_message(entry, now))
        .collect();
    if !tail.is_empty() {
        tracing::debug!(
            "[Reconstruct] Keeping {} in-flight local messages on channel {}",
            tail.len(),
            channel.id
        );
    }
    messages.extend(tail);
    channel.messages = messages;
}
