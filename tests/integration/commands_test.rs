//! Command Surface Tests
//!
//! Commands over `AppState` with a recording transport:
//! - Sending and the frames it produces
//! - Tool call confirmation gating
//! - Edit and delete against persisted and local ids
//! - Malformed frames, cross-channel routing, and topic renames

use std::sync::Arc;

use serde_json::{json, Value};

use agent_timeline::commands::{
    cancel_tool_call, confirm_tool_call, delete_message, edit_message, get_channel,
    get_topic_status, open_channel, send_message,
};
use agent_timeline::models::command::{EditMode, SendMessageRequest};
use agent_timeline::services::transport::{NoopHistoryApi, RecordingTransport};
use agent_timeline::AppState;
use agent_timeline_core::{OutboundFrame, ToolCallStatus, TopicStatus};

// ============================================================================
// Helpers
// ============================================================================

const USER_ID: &str = "2a9f4c1e-61b8-4d3f-a2c4-7be0d8e1f301";
const REPLY_ID: &str = "5c0e7d92-3a41-4b6e-9f0a-1d2b3c4d5e02";

fn frame(kind: &str, data: Value) -> Value {
    json!({ "type": kind, "data": data })
}

async fn setup() -> (AppState, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let state = AppState::detached(transport.clone(), Arc::new(NoopHistoryApi));
    open_channel(&state, "c1", "s1", "Topic").await;
    (state, transport)
}

async fn feed(state: &AppState, channel_id: &str, frames: Vec<Value>) {
    for f in frames {
        state.channels().dispatch_raw(channel_id, f).await.unwrap();
    }
}

async fn seed_persisted_turn(state: &AppState) {
    feed(
        state,
        "c1",
        vec![
            frame("message", json!({ "id": USER_ID, "role": "user", "content": "first" })),
            frame(
                "message",
                json!({ "id": REPLY_ID, "role": "assistant", "content": "reply" }),
            ),
        ],
    )
    .await;
}

// ============================================================================
// Sending
// ============================================================================

#[tokio::test]
async fn test_send_emits_message_frame_with_channel_context() {
    let (state, transport) = setup().await;
    state
        .channels()
        .set_knowledge_context("c1", Some(json!({"collection": "docs"})))
        .await
        .unwrap();

    let response = send_message(&state, "c1", SendMessageRequest::new("hello")).await;
    assert!(response.success);

    let frames = transport.frames().await;
    assert_eq!(
        frames[0].1,
        OutboundFrame::Message {
            message: "hello".to_string(),
            file_ids: Vec::new(),
            context: Some(json!({"collection": "docs"})),
        }
    );

    let second = send_message(&state, "c1", SendMessageRequest::new("again")).await;
    assert!(!second.success);
    assert_eq!(transport.frames().await.len(), 1);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let (state, transport) = setup().await;
    let response = send_message(&state, "c1", SendMessageRequest::new("   ")).await;
    assert!(!response.success);
    assert!(transport.frames().await.is_empty());
}

// ============================================================================
// Tool calls
// ============================================================================

#[tokio::test]
async fn test_tool_decisions_only_apply_while_waiting() {
    let (state, transport) = setup().await;
    feed(
        &state,
        "c1",
        vec![
            frame("agent_start", json!({ "context": { "execution_id": "e1" } })),
            frame("node_start", json!({ "context": { "execution_id": "e1" }, "node_id": "act" })),
            frame("tool_call_request", json!({ "id": "tc1", "name": "shell" })),
            frame("tool_call_request", json!({ "id": "tc2", "name": "write_file" })),
        ],
    )
    .await;

    assert_eq!(confirm_tool_call(&state, "c1", "tc1").await.data, Some(true));
    assert_eq!(confirm_tool_call(&state, "c1", "tc1").await.data, Some(false));
    assert_eq!(cancel_tool_call(&state, "c1", "tc1").await.data, Some(false));
    assert_eq!(cancel_tool_call(&state, "c1", "tc2").await.data, Some(true));
    assert_eq!(confirm_tool_call(&state, "c1", "missing").await.data, Some(false));

    let channel = get_channel(&state, "c1").await.data.unwrap();
    let calls = &channel.messages[0].agent_execution.as_ref().unwrap().phases[0].tool_calls;
    assert_eq!(calls[0].status, ToolCallStatus::Executing);
    assert_eq!(calls[1].status, ToolCallStatus::Failed);
    assert_eq!(calls[1].error.as_deref(), Some("Cancelled by user"));

    let frames: Vec<OutboundFrame> = transport.frames().await.into_iter().map(|(_, f)| f).collect();
    assert_eq!(
        frames,
        vec![
            OutboundFrame::ToolCallConfirm {
                tool_call_id: "tc1".to_string()
            },
            OutboundFrame::ToolCallCancel {
                tool_call_id: "tc2".to_string()
            },
        ]
    );
}

// ============================================================================
// Edit and delete
// ============================================================================

#[tokio::test]
async fn test_edit_and_delete_reject_local_ids() {
    let (state, _transport) = setup().await;
    let local_id = send_message(&state, "c1", SendMessageRequest::new("draft"))
        .await
        .data
        .unwrap();

    let edit = edit_message(&state, "c1", &local_id, "changed", EditMode::EditOnly).await;
    assert!(!edit.success);
    assert!(edit.error.unwrap().contains("not been saved"));

    let delete = delete_message(&state, "c1", &local_id).await;
    assert!(!delete.success);

    let channel = get_channel(&state, "c1").await.data.unwrap();
    assert_eq!(channel.messages[0].content, "draft");
}

#[tokio::test]
async fn test_edit_only_keeps_later_messages() {
    let (state, transport) = setup().await;
    seed_persisted_turn(&state).await;

    let outcome = edit_message(&state, "c1", USER_ID, "first, edited", EditMode::EditOnly)
        .await
        .data
        .unwrap();
    assert!(!outcome.regenerate);

    let channel = get_channel(&state, "c1").await.data.unwrap();
    assert_eq!(channel.messages.len(), 2);
    assert_eq!(channel.messages[0].content, "first, edited");
    assert!(transport.frames().await.is_empty());
}

#[tokio::test]
async fn test_truncate_and_regenerate() {
    let (state, transport) = setup().await;
    seed_persisted_turn(&state).await;

    let outcome = edit_message(
        &state,
        "c1",
        USER_ID,
        "second try",
        EditMode::TruncateAndRegenerate,
    )
    .await
    .data
    .unwrap();
    assert!(outcome.regenerate);

    let channel = get_channel(&state, "c1").await.data.unwrap();
    assert_eq!(channel.messages.len(), 1);
    assert!(channel.responding);
    assert_eq!(
        transport.frames().await[0].1,
        OutboundFrame::Regenerate {
            message_id: USER_ID.to_string()
        }
    );

    // A response is now in progress
    let again = edit_message(&state, "c1", USER_ID, "third", EditMode::TruncateAndRegenerate).await;
    assert!(!again.success);
}

#[tokio::test]
async fn test_regenerate_requires_user_message() {
    let (state, _transport) = setup().await;
    seed_persisted_turn(&state).await;

    let response = edit_message(&state, "c1", REPLY_ID, "x", EditMode::TruncateAndRegenerate).await;
    assert!(!response.success);
}

#[tokio::test]
async fn test_delete_persisted_message() {
    let (state, _transport) = setup().await;
    seed_persisted_turn(&state).await;

    assert!(delete_message(&state, "c1", REPLY_ID).await.success);
    let channel = get_channel(&state, "c1").await.data.unwrap();
    assert_eq!(channel.messages.len(), 1);
    assert_eq!(channel.messages[0].id, USER_ID);
}

// ============================================================================
// Inbound frames
// ============================================================================

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (state, _transport) = setup().await;
    let frames = futures_util::stream::iter(vec![
        json!("not an object"),
        json!({ "type": "no_such_event", "data": {} }),
        json!({ "type": "streaming_chunk", "data": { "content": "missing id" } }),
        frame("processing", json!({})),
    ]);

    let applied = state.channels().drive("c1", frames).await.unwrap();
    assert_eq!(applied, 1);
    assert_eq!(
        get_topic_status(&state, "c1").await.data,
        Some(TopicStatus::Running)
    );
}

#[tokio::test]
async fn test_nested_events_route_to_owning_channel() {
    let (state, _transport) = setup().await;
    open_channel(&state, "c2", "s1", "Side panel").await;
    feed(
        &state,
        "c1",
        vec![frame("agent_start", json!({ "context": { "execution_id": "root" } }))],
    )
    .await;

    feed(
        &state,
        "c2",
        vec![frame(
            "subagent_start",
            json!({
                "context": { "execution_id": "root" },
                "subagent_id": "child-1",
                "subagent_name": "Coder"
            }),
        )],
    )
    .await;

    let c1 = get_channel(&state, "c1").await.data.unwrap();
    let execution = c1.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.subagents.len(), 1);
    assert_eq!(execution.subagents[0].name, "Coder");

    let c2 = get_channel(&state, "c2").await.data.unwrap();
    assert!(c2.messages.is_empty());
}

#[tokio::test]
async fn test_topic_rename_updates_history_title() {
    let (state, _transport) = setup().await;
    feed(
        &state,
        "c1",
        vec![frame("topic_updated", json!({ "id": "c1", "name": "Crate comparison" }))],
    )
    .await;

    let channel = get_channel(&state, "c1").await.data.unwrap();
    assert_eq!(channel.title, "Crate comparison");
    assert_eq!(
        state.channels().history_title("c1").await.as_deref(),
        Some("Crate comparison")
    );
}

#[tokio::test]
async fn test_insufficient_balance_notifies_subscribers() {
    let (state, _transport) = setup().await;
    let mut notifications = state.channels().subscribe();
    feed(
        &state,
        "c1",
        vec![
            frame("processing", json!({})),
            frame(
                "insufficient_balance",
                json!({ "message": "Out of credits", "action_url": "https://example.com/topup" }),
            ),
        ],
    )
    .await;

    let notification = notifications.try_recv().unwrap();
    assert_eq!(notification.channel_id, "c1");
    assert_eq!(notification.action_url.as_deref(), Some("https://example.com/topup"));
    assert_eq!(
        get_topic_status(&state, "c1").await.data,
        Some(TopicStatus::Failed)
    );
}
