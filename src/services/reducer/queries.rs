//! Named Channel Queries
//!
//! Every lookup the reducer performs over a channel's messages lives here, so
//! the precedence rules are written down once. All queries scan from the end
//! of the message list: when several messages match, the most recent wins.

use agent_timeline_core::{AgentExecution, Channel, ExecutionContext, Message, MessageRole};

use crate::utils::ids::is_persisted_id;

/// Where a tool call lives in the state tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallLocation {
    /// Inside a phase of a message's execution
    Phase {
        message: usize,
        phase: usize,
        call: usize,
    },
    /// Directly on a message without an execution
    Message { message: usize, call: usize },
}

/// Index of the pending loading placeholder
pub fn loading_index(channel: &Channel) -> Option<usize> {
    channel.messages.iter().rposition(Message::is_loading)
}

/// Index of the message with the given id
pub fn message_index(channel: &Channel, id: &str) -> Option<usize> {
    channel.messages.iter().rposition(|m| m.id == id)
}

/// Index of the message whose execution is running
pub fn running_execution_index(channel: &Channel) -> Option<usize> {
    channel
        .messages
        .iter()
        .rposition(Message::has_running_execution)
}

/// Index of the most recent streaming message
pub fn last_streaming_index(channel: &Channel) -> Option<usize> {
    channel.messages.iter().rposition(Message::is_streaming)
}

/// Index of the most recent thinking message
pub fn last_thinking_index(channel: &Channel) -> Option<usize> {
    channel.messages.iter().rposition(Message::is_thinking)
}

/// Whether output is actively arriving: a message is streaming or thinking,
/// or an execution is running
pub fn has_live_output(channel: &Channel) -> bool {
    channel
        .messages
        .iter()
        .any(|m| m.is_streaming() || m.is_thinking() || m.has_running_execution())
}

/// Whether anything could still be cancelled
pub fn is_in_flight(channel: &Channel) -> bool {
    channel.responding || loading_index(channel).is_some() || has_live_output(channel)
}

/// Latest assistant message that can take an attachment of some type: either
/// still streaming, or without attachments of that type yet
pub fn latest_assistant_accepting(
    channel: &Channel,
    has_kind: impl Fn(&Message) -> bool,
) -> Option<usize> {
    channel
        .messages
        .iter()
        .rposition(|m| m.role == MessageRole::Assistant && (m.is_streaming() || !has_kind(m)))
}

/// Assistant message still being generated under a local id: loading,
/// streaming, thinking, or owning the running execution
pub fn generating_message_index(channel: &Channel) -> Option<usize> {
    channel.messages.iter().rposition(|m| {
        m.role == MessageRole::Assistant
            && !is_persisted_id(&m.id)
            && (m.is_loading() || m.is_streaming() || m.is_thinking() || m.has_running_execution())
    })
}

/// Index of the message owning the execution with this exact id
pub fn execution_index_by_id(channel: &Channel, execution_id: &str) -> Option<usize> {
    channel.messages.iter().rposition(|m| {
        m.agent_execution
            .as_ref()
            .is_some_and(|e| e.execution_id == execution_id)
    })
}

/// Execution for a context by exact id, then by parent id
pub fn execution_index_exact(channel: &Channel, context: &ExecutionContext) -> Option<usize> {
    execution_index_by_id(channel, &context.execution_id).or_else(|| {
        context
            .parent_execution_id
            .as_deref()
            .and_then(|parent| execution_index_by_id(channel, parent))
    })
}

/// Execution for a context: exact id, then parent id, then whichever
/// execution is running
pub fn execution_index_for(channel: &Channel, context: &ExecutionContext) -> Option<usize> {
    if let Some(index) = execution_index_exact(channel, context) {
        return Some(index);
    }
    let fallback = running_execution_index(channel)?;
    tracing::debug!(
        "[Reducer] No execution {} in channel {}, using running execution",
        context.execution_id,
        channel.id
    );
    Some(fallback)
}

/// Message and subagent index for a subagent id, searching every execution
pub fn subagent_location(channel: &Channel, subagent_id: &str) -> Option<(usize, usize)> {
    channel.messages.iter().enumerate().rev().find_map(|(mi, m)| {
        m.agent_execution
            .as_ref()
            .and_then(|e| e.subagents.iter().position(|s| s.id == subagent_id))
            .map(|si| (mi, si))
    })
}

/// Mutable execution at a message index
pub fn execution_at(channel: &mut Channel, index: usize) -> Option<&mut AgentExecution> {
    channel
        .messages
        .get_mut(index)
        .and_then(|m| m.agent_execution.as_mut())
}

fn phase_call(message: usize, execution: &AgentExecution, id: &str) -> Option<ToolCallLocation> {
    execution.phases.iter().enumerate().find_map(|(pi, p)| {
        p.tool_calls
            .iter()
            .position(|t| t.id == id)
            .map(|ci| ToolCallLocation::Phase {
                message,
                phase: pi,
                call: ci,
            })
    })
}

/// Locate a tool call: phases of running executions first, then standalone
/// message tool calls, then phases of finished executions
pub fn locate_tool_call(channel: &Channel, tool_call_id: &str) -> Option<ToolCallLocation> {
    let messages = &channel.messages;

    let running = messages.iter().enumerate().rev().find_map(|(mi, m)| {
        m.agent_execution
            .as_ref()
            .filter(|e| e.is_running())
            .and_then(|e| phase_call(mi, e, tool_call_id))
    });
    if running.is_some() {
        return running;
    }

    let standalone = messages.iter().enumerate().rev().find_map(|(mi, m)| {
        m.tool_calls
            .iter()
            .position(|t| t.id == tool_call_id)
            .map(|ci| ToolCallLocation::Message {
                message: mi,
                call: ci,
            })
    });
    if standalone.is_some() {
        return standalone;
    }

    messages.iter().enumerate().rev().find_map(|(mi, m)| {
        m.agent_execution
            .as_ref()
            .filter(|e| !e.is_running())
            .and_then(|e| phase_call(mi, e, tool_call_id))
    })
}

/// Mutable tool call at a location
pub fn tool_call_at(
    channel: &mut Channel,
    location: ToolCallLocation,
) -> Option<&mut agent_timeline_core::ToolCall> {
    match location {
        ToolCallLocation::Phase {
            message,
            phase,
            call,
        } => execution_at(channel, message)
            .and_then(|e| e.phases.get_mut(phase))
            .and_then(|p| p.tool_calls.get_mut(call)),
        ToolCallLocation::Message { message, call } => channel
            .messages
            .get_mut(message)
            .and_then(|m| m.tool_calls.get_mut(call)),
    }
}
