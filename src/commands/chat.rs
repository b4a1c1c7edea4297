//! Chat Commands
//!
//! User-initiated operations on a channel: sending, aborting, tool call
//! decisions, message edits, and state queries.

use agent_timeline_core::{Channel, TopicStatus};

use crate::models::command::{EditMode, EditOutcome, SendMessageRequest};
use crate::models::history::HistoryMessage;
use crate::models::response::CommandResponse;
use crate::state::AppState;

/// Open (or re-open) a channel
pub async fn open_channel(
    state: &AppState,
    channel_id: &str,
    session_id: &str,
    title: &str,
) -> CommandResponse<bool> {
    state.channels().open_channel(channel_id, session_id, title).await;
    CommandResponse::ok(true)
}

/// Close a channel and cancel its pending abort timer
pub async fn close_channel(state: &AppState, channel_id: &str) -> CommandResponse<bool> {
    CommandResponse::ok(state.channels().close_channel(channel_id).await)
}

/// Send a user message. Returns the local id of the new message.
pub async fn send_message(
    state: &AppState,
    channel_id: &str,
    request: SendMessageRequest,
) -> CommandResponse<String> {
    state.channels().send_message(channel_id, request).await.into()
}

/// Stop the current generation
pub async fn abort_generation(state: &AppState, channel_id: &str) -> CommandResponse<bool> {
    state.channels().abort_generation(channel_id).await.into()
}

/// Approve a tool call that is waiting for confirmation
pub async fn confirm_tool_call(
    state: &AppState,
    channel_id: &str,
    tool_call_id: &str,
) -> CommandResponse<bool> {
    state
        .channels()
        .confirm_tool_call(channel_id, tool_call_id)
        .await
        .into()
}

/// Reject a tool call that is waiting for confirmation
pub async fn cancel_tool_call(
    state: &AppState,
    channel_id: &str,
    tool_call_id: &str,
) -> CommandResponse<bool> {
    state
        .channels()
        .cancel_tool_call(channel_id, tool_call_id)
        .await
        .into()
}

/// Edit a persisted message
pub async fn edit_message(
    state: &AppState,
    channel_id: &str,
    message_id: &str,
    content: &str,
    mode: EditMode,
) -> CommandResponse<EditOutcome> {
    state
        .channels()
        .edit_message(channel_id, message_id, content, mode)
        .await
        .into()
}

/// Delete a persisted message
pub async fn delete_message(
    state: &AppState,
    channel_id: &str,
    message_id: &str,
) -> CommandResponse<()> {
    state
        .channels()
        .delete_message(channel_id, message_id)
        .await
        .into()
}

/// Replace a channel's messages with persisted history
pub async fn load_history(
    state: &AppState,
    channel_id: &str,
    history: Vec<HistoryMessage>,
) -> CommandResponse<()> {
    state
        .channels()
        .seed_history(channel_id, history)
        .await
        .into()
}

/// Current state of a channel
pub async fn get_channel(state: &AppState, channel_id: &str) -> CommandResponse<Channel> {
    state.channels().snapshot(channel_id).await.into()
}

/// Coarse status for the history list
pub async fn get_topic_status(state: &AppState, channel_id: &str) -> CommandResponse<TopicStatus> {
    state.channels().topic_status(channel_id).await.into()
}
