//! Tool-Call Lifecycle
//!
//! Tool calls belong to the active phase when the run has an execution, and
//! to the message itself otherwise. User decisions only apply to calls still
//! waiting for confirmation.

use chrono::{DateTime, Utc};

use agent_timeline_core::events::{ToolCallRequestPayload, ToolCallResponsePayload};
use agent_timeline_core::{
    Channel, Effects, Message, MessageActivity, MessageRole, OutboundFrame, ToolCall,
    ToolCallStatus,
};

use super::queries::{self, ToolCallLocation};
use super::router::destination_phase;
use crate::utils::ids::new_client_id;

/// A user's answer to a tool call awaiting confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolDecision {
    Confirm,
    Cancel,
}

pub(super) fn tool_call_request(
    channel: &mut Channel,
    payload: ToolCallRequestPayload,
    now: DateTime<Utc>,
) -> Effects {
    if queries::locate_tool_call(channel, &payload.id).is_some() {
        tracing::debug!("[Reducer] Duplicate tool_call_request {}", payload.id);
        return Effects::none();
    }

    let call = ToolCall {
        id: payload.id,
        name: payload.name,
        description: payload.description,
        arguments: payload.arguments,
        status: payload.status,
        result: None,
        error: None,
        timestamp: payload.timestamp.unwrap_or(now),
    };

    if let Some(execution) = queries::running_execution_index(channel)
        .and_then(|index| queries::execution_at(channel, index))
    {
        let phase = destination_phase(execution, now);
        execution.phases[phase].tool_calls.push(call);
        return Effects::none();
    }

    match queries::loading_index(channel) {
        Some(index) => {
            let msg = &mut channel.messages[index];
            msg.activity = MessageActivity::Idle;
            msg.tool_calls.push(call);
        }
        None => {
            let mut msg = Message::new(
                new_client_id("tool"),
                new_client_id("tool"),
                MessageRole::Assistant,
                now,
            );
            msg.tool_calls.push(call);
            channel.messages.push(msg);
        }
    }
    Effects::none()
}

pub(super) fn tool_call_response(channel: &mut Channel, payload: ToolCallResponsePayload) -> Effects {
    let Some(location) = queries::locate_tool_call(channel, &payload.tool_call_id) else {
        tracing::warn!(
            "[Reducer] tool_call_response for unknown call {} in channel {}",
            payload.tool_call_id,
            channel.id
        );
        return Effects::none();
    };

    if let ToolCallLocation::Phase { message, .. } = location {
        if !channel.messages[message].has_running_execution() {
            tracing::debug!(
                "[Reducer] Late tool_call_response {} for finished execution",
                payload.tool_call_id
            );
        }
    }

    if let Some(call) = queries::tool_call_at(channel, location) {
        call.status = payload.status;
        if payload.result.is_some() {
            call.result = payload.result;
        }
        if payload.error.is_some() {
            call.error = payload.error;
        }
    }
    Effects::none()
}

/// Apply a user's decision. Only calls waiting for confirmation move; any
/// other status, or an unknown id, leaves state unchanged and sends nothing.
pub(super) fn decide(channel: &mut Channel, tool_call_id: &str, decision: ToolDecision) -> Effects {
    let Some(call) = queries::locate_tool_call(channel, tool_call_id)
        .and_then(|location| queries::tool_call_at(channel, location))
    else {
        tracing::debug!("[Reducer] Decision for unknown tool call {}", tool_call_id);
        return Effects::none();
    };
    if !call.is_waiting() {
        tracing::debug!(
            "[Reducer] Tool call {} is {:?}, ignoring decision",
            tool_call_id,
            call.status
        );
        return Effects::none();
    }

    let tool_call_id = tool_call_id.to_string();
    match decision {
        ToolDecision::Confirm => {
            call.status = ToolCallStatus::Executing;
            Effects::none().with_frame(OutboundFrame::ToolCallConfirm { tool_call_id })
        }
        ToolDecision::Cancel => {
            call.status = ToolCallStatus::Failed;
            call.error = Some("Cancelled by user".to_string());
            Effects::none().with_frame(OutboundFrame::ToolCallCancel { tool_call_id })
        }
    }
}
