//! Channel Reducer
//!
//! Applies one event at a time to one channel's state tree.
//!
//! `ChannelReducer::apply` is synchronous and deterministic: the caller
//! injects the current time and receives the side effects the transition
//! requires as [`Effects`]. Nothing here awaits, sends, or reads a clock.
//!
//! ## Modules
//!
//! - `router` - streamed text and thinking placement, chunk merging
//! - `lifecycle` - agent/node/subagent/progress events
//! - `tools` - tool-call requests, responses, and user decisions
//! - `local` - client-originated transitions (send, abort, edit, delete)
//! - `queries` - named lookups with last-match-wins precedence

pub mod lifecycle;
pub mod local;
pub mod queries;
pub mod router;
pub mod tools;

use chrono::{DateTime, Utc};

use agent_timeline_core::events::{
    ErrorPayload, GeneratedFilesPayload, InsufficientBalancePayload, MessagePayload,
    MessageSavedPayload, SearchCitationsPayload, TopicUpdatedPayload,
};
use agent_timeline_core::{
    Channel, ChannelEffect, Effects, ExecutionStatus, Message, MessageActivity, MessageNotice,
    MessageRole, NoticeKind, Notification, NotificationLevel, StreamEvent,
};

use crate::models::settings::StreamSettings;
use crate::utils::ids::new_client_id;

pub use local::LocalAction;
pub use router::{ChunkMergePolicy, MergeOutcome, RESPONSE_PHASE_ID};
pub use tools::ToolDecision;

/// Pure state machine for a single channel
#[derive(Debug, Clone, Default)]
pub struct ChannelReducer {
    merge: ChunkMergePolicy,
}

impl ChannelReducer {
    pub fn new(merge: ChunkMergePolicy) -> Self {
        Self { merge }
    }

    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self::new(ChunkMergePolicy::from(settings))
    }

    pub fn merge_policy(&self) -> &ChunkMergePolicy {
        &self.merge
    }

    /// Apply one transport event
    pub fn apply(&self, channel: &mut Channel, event: StreamEvent, now: DateTime<Utc>) -> Effects {
        tracing::trace!("[Reducer] {} <- {}", channel.id, event.kind());
        match event {
            StreamEvent::Processing(_) => placeholder(channel, None, now),
            StreamEvent::Loading(p) => placeholder(channel, p.id, now),
            StreamEvent::StreamingStart(p) => router::streaming_start(channel, p, now),
            StreamEvent::StreamingChunk(p) => router::streaming_chunk(&self.merge, channel, p, now),
            StreamEvent::StreamingEnd(p) => router::streaming_end(channel, p, now),
            StreamEvent::Message(p) => message(channel, p, now),
            StreamEvent::MessageSaved(p) => message_saved(channel, p),
            StreamEvent::ThinkingStart(p) => router::thinking_start(channel, p, now),
            StreamEvent::ThinkingChunk(p) => router::thinking_chunk(channel, p),
            StreamEvent::ThinkingEnd(p) => router::thinking_end(channel, p),
            StreamEvent::ToolCallRequest(p) => tools::tool_call_request(channel, p, now),
            StreamEvent::ToolCallResponse(p) => tools::tool_call_response(channel, p),
            StreamEvent::Error(p) => error(channel, p, now),
            StreamEvent::InsufficientBalance(p) => insufficient_balance(channel, p, now),
            StreamEvent::StreamAborted(p) => {
                if !channel.aborting {
                    tracing::debug!(
                        "[Reducer] Ignoring stream_aborted on channel {}: no abort pending",
                        channel.id
                    );
                    return Effects::none();
                }
                tracing::info!(
                    "[Reducer] Stream aborted on channel {} ({})",
                    channel.id,
                    p.reason.as_deref().unwrap_or("no reason")
                );
                local::finalize_cancellation(channel, now)
            }
            StreamEvent::TopicUpdated(p) => topic_updated(channel, p),
            StreamEvent::AgentStart(p) => lifecycle::agent_start(channel, p, now),
            StreamEvent::AgentEnd(p) => lifecycle::agent_end(channel, p, now),
            StreamEvent::AgentError(p) => lifecycle::agent_error(channel, p, now),
            StreamEvent::NodeStart(p) => lifecycle::node_start(channel, p, now),
            StreamEvent::NodeEnd(p) => lifecycle::node_end(channel, p, now),
            StreamEvent::SubagentStart(p) => lifecycle::subagent_start(channel, p, now),
            StreamEvent::SubagentEnd(p) => lifecycle::subagent_end(channel, p, now),
            StreamEvent::ProgressUpdate(p) => lifecycle::progress_update(channel, p),
            StreamEvent::SearchCitations(p) => search_citations(channel, p),
            StreamEvent::GeneratedFiles(p) => generated_files(channel, p),
        }
    }

    /// Apply one client-originated transition
    pub fn apply_local(
        &self,
        channel: &mut Channel,
        action: LocalAction,
        now: DateTime<Utc>,
    ) -> Effects {
        local::apply(channel, action, now)
    }
}

/// `processing` / `loading`: mark the channel busy and show one placeholder.
/// `loading` may carry the placeholder id; `processing` never does.
fn placeholder(channel: &mut Channel, id: Option<String>, now: DateTime<Utc>) -> Effects {
    channel.responding = true;
    channel.error = None;

    if queries::loading_index(channel).is_some() || queries::has_live_output(channel) {
        return Effects::none();
    }

    let client_id = new_client_id("loading");
    let id = id.unwrap_or_else(|| client_id.clone());
    channel.messages.push(
        Message::new(id, client_id, MessageRole::Assistant, now)
            .with_activity(MessageActivity::Loading),
    );
    Effects::none()
}

fn message(channel: &mut Channel, payload: MessagePayload, now: DateTime<Utc>) -> Effects {
    if queries::message_index(channel, &payload.id).is_some() {
        return Effects::none();
    }

    let created_at = payload.created_at.unwrap_or(now);

    // A complete assistant reply takes the placeholder's slot
    if payload.role == MessageRole::Assistant {
        if let Some(index) = queries::loading_index(channel) {
            let msg = &mut channel.messages[index];
            msg.id = payload.id;
            msg.content = payload.content;
            msg.created_at = created_at;
            msg.thinking_content = payload.thinking_content;
            msg.activity = MessageActivity::Idle;
            channel.responding = false;
            return Effects::none();
        }
    }

    let mut msg = Message::new(payload.id.clone(), payload.id, payload.role, created_at)
        .with_content(payload.content);
    msg.thinking_content = payload.thinking_content;
    channel.messages.push(msg);
    Effects::none()
}

fn message_saved(channel: &mut Channel, payload: MessageSavedPayload) -> Effects {
    let Some(index) = queries::message_index(channel, &payload.stream_id)
        .or_else(|| queries::generating_message_index(channel))
    else {
        tracing::warn!(
            "[Reducer] message_saved for unknown stream {} in channel {}",
            payload.stream_id,
            channel.id
        );
        return Effects::none();
    };

    let msg = &mut channel.messages[index];
    tracing::debug!("[Reducer] Message {} persisted as {}", msg.id, payload.db_id);
    msg.id = payload.db_id;
    if let Some(created_at) = payload.created_at {
        msg.created_at = created_at;
    }
    Effects::none()
}

/// Turn the placeholder into a notice message, or append one
fn place_notice(channel: &mut Channel, content: String, notice: MessageNotice, now: DateTime<Utc>) {
    match queries::loading_index(channel) {
        Some(index) => {
            let msg = &mut channel.messages[index];
            msg.activity = MessageActivity::Idle;
            msg.content = content;
            msg.notice = Some(notice);
        }
        None => {
            let id = new_client_id("notice");
            let mut msg = Message::new(id.clone(), id, MessageRole::Assistant, now)
                .with_content(content);
            msg.notice = Some(notice);
            channel.messages.push(msg);
        }
    }
}

/// Streaming and thinking stop when the run is over
fn clear_live_activity(channel: &mut Channel) {
    for msg in channel
        .messages
        .iter_mut()
        .filter(|m| m.is_streaming() || m.is_thinking())
    {
        msg.activity = MessageActivity::Idle;
    }
}

fn error(channel: &mut Channel, payload: ErrorPayload, now: DateTime<Utc>) -> Effects {
    tracing::warn!("[Reducer] Backend error on channel {}: {}", channel.id, payload.message);

    for msg in channel
        .messages
        .iter_mut()
        .filter(|m| m.has_running_execution())
    {
        if let Some(execution) = msg.agent_execution.as_mut() {
            execution.finish(ExecutionStatus::Failed, None, now);
        }
        msg.backfill_content_from_phases();
    }
    clear_live_activity(channel);

    channel.error = Some(payload.message.clone());
    place_notice(
        channel,
        payload.message,
        MessageNotice {
            kind: NoticeKind::Error,
            code: payload.error_code,
            action_url: None,
        },
        now,
    );
    lifecycle::settle_run(channel)
}

fn insufficient_balance(
    channel: &mut Channel,
    payload: InsufficientBalancePayload,
    now: DateTime<Utc>,
) -> Effects {
    if channel.running_execution_count() == 0 {
        channel.error = Some(payload.message.clone());
    }
    clear_live_activity(channel);

    place_notice(
        channel,
        payload.message.clone(),
        MessageNotice {
            kind: NoticeKind::InsufficientBalance,
            code: payload.error_code,
            action_url: payload.action_url.clone(),
        },
        now,
    );

    let notification = Notification {
        channel_id: channel.id.clone(),
        level: NotificationLevel::Warning,
        message: payload.message,
        action_url: payload.action_url,
    };
    let mut effects = lifecycle::settle_run(channel);
    effects.push(ChannelEffect::Notify(notification));
    effects
}

fn topic_updated(channel: &mut Channel, payload: TopicUpdatedPayload) -> Effects {
    if payload.id != channel.id {
        tracing::warn!(
            "[Reducer] topic_updated for {} delivered to channel {}",
            payload.id,
            channel.id
        );
        return Effects::none();
    }
    channel.title = payload.name.clone();
    Effects::none().with(ChannelEffect::RenameHistory {
        channel_id: payload.id,
        title: payload.name,
    })
}

fn search_citations(channel: &mut Channel, payload: SearchCitationsPayload) -> Effects {
    let Some(index) = queries::latest_assistant_accepting(channel, |m| !m.citations.is_empty())
    else {
        tracing::warn!("[Reducer] No message to attach citations to in channel {}", channel.id);
        return Effects::none();
    };
    let citations = &mut channel.messages[index].citations;
    for citation in payload.citations {
        if !citations.iter().any(|c| c.url == citation.url) {
            citations.push(citation);
        }
    }
    Effects::none()
}

fn generated_files(channel: &mut Channel, payload: GeneratedFilesPayload) -> Effects {
    let Some(index) = queries::latest_assistant_accepting(channel, |m| !m.attachments.is_empty())
    else {
        tracing::warn!("[Reducer] No message to attach files to in channel {}", channel.id);
        return Effects::none();
    };
    let attachments = &mut channel.messages[index].attachments;
    for file in payload.files {
        if !attachments.iter().any(|a| a.id == file.id) {
            attachments.push(file);
        }
    }
    Effects::none()
}
