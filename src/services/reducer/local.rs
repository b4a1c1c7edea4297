//! Local Transitions
//!
//! Transitions that originate from the client instead of the transport: user
//! commands and the abort timeout. They go through the same reducer as
//! transport events so that every mutation of a channel has one owner.

use chrono::{DateTime, Utc};
use serde_json::Value;

use agent_timeline_core::{
    AgentExecution, Channel, ChannelEffect, Effects, ExecutionStatus, Message, MessageActivity,
    MessageRole, OutboundFrame,
};

use super::queries;
use super::tools::{self, ToolDecision};

/// A client-originated transition
#[derive(Debug, Clone, PartialEq)]
pub enum LocalAction {
    /// The user sent a message
    UserMessage {
        client_id: String,
        content: String,
        file_ids: Vec<String>,
        context: Option<Value>,
    },
    /// The user asked to stop the current generation
    AbortRequested,
    /// No `stream_aborted` ack arrived in time
    AbortTimedOut,
    /// The history API accepted an edit
    MessageEdited {
        message_id: String,
        content: String,
        truncate: bool,
        regenerate: bool,
    },
    /// The history API deleted a message
    MessageDeleted { message_id: String },
    /// The user confirmed or cancelled a tool call
    ToolCallDecided {
        tool_call_id: String,
        decision: ToolDecision,
    },
}

pub(super) fn apply(channel: &mut Channel, action: LocalAction, now: DateTime<Utc>) -> Effects {
    match action {
        LocalAction::UserMessage {
            client_id,
            content,
            file_ids,
            context,
        } => user_message(channel, client_id, content, file_ids, context, now),
        LocalAction::AbortRequested => abort_requested(channel),
        LocalAction::AbortTimedOut => {
            tracing::warn!(
                "[Reducer] No abort acknowledgement for channel {}, cancelling locally",
                channel.id
            );
            finalize_cancellation(channel, now)
        }
        LocalAction::MessageEdited {
            message_id,
            content,
            truncate,
            regenerate,
        } => message_edited(channel, message_id, content, truncate, regenerate),
        LocalAction::MessageDeleted { message_id } => {
            match queries::message_index(channel, &message_id) {
                Some(index) => {
                    channel.messages.remove(index);
                }
                None => tracing::debug!("[Reducer] Deleted message {} not in channel", message_id),
            }
            Effects::none()
        }
        LocalAction::ToolCallDecided {
            tool_call_id,
            decision,
        } => tools::decide(channel, &tool_call_id, decision),
    }
}

fn user_message(
    channel: &mut Channel,
    client_id: String,
    content: String,
    file_ids: Vec<String>,
    context: Option<Value>,
    now: DateTime<Utc>,
) -> Effects {
    channel.messages.push(
        Message::new(client_id.clone(), client_id, MessageRole::User, now)
            .with_content(content.clone()),
    );
    channel.error = None;
    channel.responding = true;

    Effects::none().with_frame(OutboundFrame::Message {
        message: content,
        file_ids,
        context: context.or_else(|| channel.knowledge_context.clone()),
    })
}

fn abort_requested(channel: &mut Channel) -> Effects {
    if channel.aborting {
        return Effects::none();
    }
    if !queries::is_in_flight(channel) {
        tracing::debug!("[Reducer] Abort with nothing in flight on channel {}", channel.id);
        return Effects::none();
    }
    channel.aborting = true;
    Effects::none().with_frame(OutboundFrame::Abort)
}

fn message_edited(
    channel: &mut Channel,
    message_id: String,
    content: String,
    truncate: bool,
    regenerate: bool,
) -> Effects {
    let Some(index) = queries::message_index(channel, &message_id) else {
        tracing::warn!("[Reducer] Edited message {} not in channel", message_id);
        return Effects::none();
    };
    channel.messages[index].content = content;
    if truncate {
        channel.messages.truncate(index + 1);
    }
    if !regenerate {
        return Effects::none();
    }
    channel.responding = true;
    Effects::none().with_frame(OutboundFrame::Regenerate { message_id })
}

/// Settle a cancellation, from the server ack or the local timeout.
///
/// Idempotent: once applied, applying it again changes nothing.
pub(crate) fn finalize_cancellation(channel: &mut Channel, now: DateTime<Utc>) -> Effects {
    channel.responding = false;
    channel.aborting = false;

    for msg in channel.messages.iter_mut() {
        let cancelled = msg
            .agent_execution
            .as_mut()
            .is_some_and(|e| e.finish(ExecutionStatus::Cancelled, None, now));
        if msg.is_streaming() || msg.is_thinking() {
            msg.activity = MessageActivity::Idle;
        }
        if cancelled {
            msg.backfill_content_from_phases();
        }
    }

    if let Some(index) = queries::loading_index(channel) {
        let msg = &mut channel.messages[index];
        let mut execution = AgentExecution::new(format!("aborted-{}", msg.client_id), now);
        execution.finish(ExecutionStatus::Cancelled, Some(0), now);
        msg.agent_execution = Some(execution);
        msg.activity = MessageActivity::Idle;
    }

    Effects::none().with(ChannelEffect::DisarmAbortTimer)
}
