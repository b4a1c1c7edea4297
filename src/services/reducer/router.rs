//! Content Router
//!
//! Decides where streamed text lands. Messages with an execution receive text
//! in one of their phases; plain messages receive it in `content`. Thinking
//! text always goes to `thinking_content`.

use chrono::{DateTime, Utc};

use agent_timeline_core::events::{
    StreamingChunkPayload, StreamingEndPayload, StreamingStartPayload, ThinkingChunkPayload,
    ThinkingEndPayload, ThinkingStartPayload,
};
use agent_timeline_core::{
    AgentExecution, Channel, Effects, Message, MessageActivity, MessageRole, Phase, PhaseStatus,
};

use super::queries;
use crate::models::settings::StreamSettings;
use crate::utils::ids::new_client_id;

/// Id and name of the phase synthesized for executions that stream text
/// without ever starting a node
pub const RESPONSE_PHASE_ID: &str = "response";
const RESPONSE_PHASE_NAME: &str = "Response";

/// Full-content resend detection.
///
/// Some producers resend the whole accumulated text instead of a delta. An
/// incoming chunk replaces the phase text when the existing text is longer
/// than `replace_min_len`, the chunk is longer still, and both share the same
/// first `prefix_len` characters. Lengths are counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkMergePolicy {
    pub replace_min_len: usize,
    pub prefix_len: usize,
}

impl Default for ChunkMergePolicy {
    fn default() -> Self {
        Self {
            replace_min_len: 100,
            prefix_len: 100,
        }
    }
}

impl From<&StreamSettings> for ChunkMergePolicy {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            replace_min_len: settings.duplicate_replace_min_len,
            prefix_len: settings.duplicate_prefix_len,
        }
    }
}

/// How a chunk was merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Appended,
    Replaced,
}

impl ChunkMergePolicy {
    /// Whether `chunk` is a resend of (and extends) `existing`
    pub fn is_resend(&self, existing: &str, chunk: &str) -> bool {
        let existing_len = existing.chars().count();
        if existing_len <= self.replace_min_len || chunk.chars().count() <= existing_len {
            return false;
        }
        existing
            .chars()
            .take(self.prefix_len)
            .eq(chunk.chars().take(self.prefix_len))
    }

    /// Merge a chunk into accumulated phase text
    pub fn merge(&self, existing: &mut String, chunk: &str) -> MergeOutcome {
        if self.is_resend(existing, chunk) {
            existing.clear();
            existing.push_str(chunk);
            MergeOutcome::Replaced
        } else {
            existing.push_str(chunk);
            MergeOutcome::Appended
        }
    }
}

/// Make sure an execution has somewhere to put text: synthesizes a single
/// running `response` phase when it has none
pub fn ensure_response_phase(execution: &mut AgentExecution, now: DateTime<Utc>) {
    if execution.phases.is_empty() {
        execution
            .phases
            .push(Phase::new(RESPONSE_PHASE_ID, RESPONSE_PHASE_NAME, now));
    }
}

/// Destination phase: the `current_node` phase, then the running phase, then
/// the last phase. Synthesizes `response` for an execution with no phases.
pub fn destination_phase(execution: &mut AgentExecution, now: DateTime<Utc>) -> usize {
    ensure_response_phase(execution, now);
    execution
        .current_node
        .as_deref()
        .and_then(|node| execution.phase_index(node))
        .or_else(|| execution.running_phase_index())
        .unwrap_or(execution.phases.len() - 1)
}

fn new_streaming_message(id: &str, now: DateTime<Utc>) -> Message {
    Message::new(id, new_client_id("stream"), MessageRole::Assistant, now)
        .with_activity(MessageActivity::Streaming)
}

pub(super) fn streaming_start(
    channel: &mut Channel,
    payload: StreamingStartPayload,
    now: DateTime<Utc>,
) -> Effects {
    channel.responding = true;

    if let Some(index) = queries::loading_index(channel) {
        let msg = &mut channel.messages[index];
        msg.id = payload.id;
        msg.activity = MessageActivity::Streaming;
        return Effects::none();
    }

    if let Some(index) = queries::message_index(channel, &payload.id) {
        channel.messages[index].activity = MessageActivity::Streaming;
        return Effects::none();
    }

    if let Some(index) = queries::running_execution_index(channel) {
        let msg = &mut channel.messages[index];
        if let Some(execution) = msg.agent_execution.as_mut() {
            ensure_response_phase(execution, now);
        }
        msg.activity = MessageActivity::Streaming;
        return Effects::none();
    }

    channel
        .messages
        .push(new_streaming_message(&payload.id, now));
    Effects::none()
}

fn chunk_target(channel: &mut Channel, id: &str) -> Option<usize> {
    if let Some(index) = queries::message_index(channel, id)
        .or_else(|| queries::running_execution_index(channel))
        .or_else(|| queries::last_streaming_index(channel))
    {
        return Some(index);
    }

    // The chunk beat its streaming_start: the placeholder becomes the stream
    let index = queries::loading_index(channel)?;
    tracing::debug!(
        "[Reducer] Chunk for {} arrived before streaming_start, converting placeholder",
        id
    );
    channel.messages[index].id = id.to_string();
    Some(index)
}

pub(super) fn streaming_chunk(
    policy: &ChunkMergePolicy,
    channel: &mut Channel,
    payload: StreamingChunkPayload,
    now: DateTime<Utc>,
) -> Effects {
    let Some(index) = chunk_target(channel, &payload.id) else {
        tracing::warn!(
            "[Reducer] Dropping chunk for unknown stream {} in channel {}",
            payload.id,
            channel.id
        );
        return Effects::none();
    };

    let msg = &mut channel.messages[index];
    if msg.agent_execution.as_ref().is_some_and(|e| !e.is_running()) {
        tracing::debug!(
            "[Reducer] Dropping chunk for {}: execution on message {} already finished",
            payload.id,
            msg.id
        );
        return Effects::none();
    }
    // An ended plain stream takes the text but stays idle
    if msg.agent_execution.is_some() || msg.activity != MessageActivity::Idle {
        msg.activity = MessageActivity::Streaming;
    }
    match msg.agent_execution.as_mut() {
        Some(execution) => {
            let phase = destination_phase(execution, now);
            let outcome = policy.merge(&mut execution.phases[phase].streamed_content, &payload.content);
            if outcome == MergeOutcome::Replaced {
                tracing::debug!(
                    "[Reducer] Chunk replaced phase {} content (full resend)",
                    execution.phases[phase].id
                );
            }
        }
        None => msg.content.push_str(&payload.content),
    }
    Effects::none()
}

pub(super) fn streaming_end(
    channel: &mut Channel,
    payload: StreamingEndPayload,
    now: DateTime<Utc>,
) -> Effects {
    channel.responding = false;

    let Some(index) = queries::message_index(channel, &payload.id)
        .or_else(|| queries::running_execution_index(channel))
        .or_else(|| queries::last_streaming_index(channel))
    else {
        tracing::debug!(
            "[Reducer] streaming_end for unknown stream {} in channel {}",
            payload.id,
            channel.id
        );
        return Effects::none();
    };

    let msg = &mut channel.messages[index];
    msg.activity = MessageActivity::Idle;

    if let Some(execution) = msg.agent_execution.as_mut() {
        if let Some(phase) = execution
            .phases
            .iter_mut()
            .find(|p| p.id == RESPONSE_PHASE_ID && p.component_key.is_none() && p.is_running())
        {
            phase.close(PhaseStatus::Completed, now);
        }
    }

    msg.backfill_content_from_phases();
    if msg.content.trim().is_empty() {
        if let Some(content) = payload.content {
            msg.content = content;
        }
    }
    if let Some(created_at) = payload.created_at {
        msg.created_at = created_at;
    }
    Effects::none()
}

pub(super) fn thinking_start(
    channel: &mut Channel,
    payload: ThinkingStartPayload,
    now: DateTime<Utc>,
) -> Effects {
    let index = if let Some(index) = queries::running_execution_index(channel) {
        index
    } else if let Some(index) = queries::loading_index(channel) {
        channel.messages[index].id = payload.id;
        index
    } else if let Some(index) = queries::message_index(channel, &payload.id) {
        index
    } else {
        channel.messages.push(Message::new(
            payload.id,
            new_client_id("think"),
            MessageRole::Assistant,
            now,
        ));
        channel.messages.len() - 1
    };

    let msg = &mut channel.messages[index];
    msg.activity = MessageActivity::Thinking;
    msg.thinking_content.get_or_insert_with(String::new);
    Effects::none()
}

fn thinking_target(channel: &Channel, id: &str) -> Option<usize> {
    queries::message_index(channel, id)
        .or_else(|| queries::running_execution_index(channel))
        .or_else(|| queries::last_thinking_index(channel))
}

pub(super) fn thinking_chunk(channel: &mut Channel, payload: ThinkingChunkPayload) -> Effects {
    match thinking_target(channel, &payload.id) {
        Some(index) => channel.messages[index]
            .thinking_content
            .get_or_insert_with(String::new)
            .push_str(&payload.content),
        None => tracing::warn!(
            "[Reducer] Dropping thinking chunk for unknown message {} in channel {}",
            payload.id,
            channel.id
        ),
    }
    Effects::none()
}

pub(super) fn thinking_end(channel: &mut Channel, payload: ThinkingEndPayload) -> Effects {
    if let Some(index) = thinking_target(channel, &payload.id) {
        let msg = &mut channel.messages[index];
        if msg.is_thinking() {
            msg.activity = MessageActivity::Idle;
        }
    }
    Effects::none()
}
