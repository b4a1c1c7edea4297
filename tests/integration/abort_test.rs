//! Abort Coordination Tests
//!
//! Drives `ChannelManager` under paused tokio time:
//! - Local cancellation when the server never acknowledges an abort
//! - Acknowledgement before the timeout disarms the timer
//! - Late acknowledgements change nothing
//! - A stale timer never cancels a newer run

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use agent_timeline::models::command::SendMessageRequest;
use agent_timeline::models::settings::StreamSettings;
use agent_timeline::services::channel_manager::ChannelManager;
use agent_timeline::services::transport::{NoopHistoryApi, RecordingTransport};
use agent_timeline_core::{ExecutionStatus, MessageActivity, OutboundFrame, TopicStatus};

// ============================================================================
// Helpers
// ============================================================================

fn frame(kind: &str, data: Value) -> Value {
    json!({ "type": kind, "data": data })
}

async fn manager() -> (ChannelManager, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::new());
    let manager = ChannelManager::new(
        &StreamSettings::default(),
        transport.clone(),
        Arc::new(NoopHistoryApi),
    );
    manager.open_channel("c1", "s1", "Topic").await;
    (manager, transport)
}

const PAST_TIMEOUT: Duration = Duration::from_millis(10_500);

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_abort_cancels_locally() {
    let (manager, transport) = manager().await;
    manager
        .dispatch_raw("c1", frame("loading", json!({})))
        .await
        .unwrap();

    assert!(manager.abort_generation("c1").await.unwrap());
    assert_eq!(manager.topic_status("c1").await.unwrap(), TopicStatus::Stopping);
    assert_eq!(manager.armed_abort_timers().await, 1);

    tokio::time::sleep(PAST_TIMEOUT).await;

    let channel = manager.snapshot("c1").await.unwrap();
    assert!(!channel.responding);
    assert!(!channel.aborting);
    assert_eq!(channel.messages.len(), 1);

    let msg = &channel.messages[0];
    assert_eq!(msg.activity, MessageActivity::Idle);
    let execution = msg.agent_execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);
    assert!(execution.execution_id.starts_with("aborted-"));

    assert_eq!(manager.armed_abort_timers().await, 0);
    let frames = transport.frames().await;
    assert_eq!(frames, vec![("c1".to_string(), OutboundFrame::Abort)]);
}

#[tokio::test(start_paused = true)]
async fn test_ack_disarms_timer() {
    let (manager, _transport) = manager().await;
    manager
        .dispatch_raw(
            "c1",
            frame("agent_start", json!({ "context": { "execution_id": "e1" } })),
        )
        .await
        .unwrap();

    assert!(manager.abort_generation("c1").await.unwrap());
    manager
        .dispatch_raw("c1", frame("stream_aborted", json!({ "reason": "user" })))
        .await
        .unwrap();
    assert_eq!(manager.armed_abort_timers().await, 0);

    let after_ack = manager.snapshot("c1").await.unwrap();
    let execution = after_ack.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Cancelled);

    tokio::time::sleep(PAST_TIMEOUT).await;
    assert_eq!(manager.snapshot("c1").await.unwrap(), after_ack);
}

#[tokio::test(start_paused = true)]
async fn test_late_ack_after_timeout_is_noop() {
    let (manager, _transport) = manager().await;
    manager
        .dispatch_raw("c1", frame("loading", json!({})))
        .await
        .unwrap();
    manager.abort_generation("c1").await.unwrap();

    tokio::time::sleep(PAST_TIMEOUT).await;
    let settled = manager.snapshot("c1").await.unwrap();

    manager
        .dispatch_raw("c1", frame("stream_aborted", json!({})))
        .await
        .unwrap();
    assert_eq!(manager.snapshot("c1").await.unwrap(), settled);
}

#[tokio::test(start_paused = true)]
async fn test_late_ack_spares_run_started_after_timeout() {
    let (manager, transport) = manager().await;
    manager
        .dispatch_raw("c1", frame("loading", json!({})))
        .await
        .unwrap();
    manager.abort_generation("c1").await.unwrap();
    tokio::time::sleep(PAST_TIMEOUT).await;

    manager
        .send_message("c1", SendMessageRequest::new("one more time"))
        .await
        .unwrap();
    manager
        .dispatch_raw(
            "c1",
            frame("agent_start", json!({ "context": { "execution_id": "e2" } })),
        )
        .await
        .unwrap();

    // The ack for the first abort shows up only now
    manager
        .dispatch_raw("c1", frame("stream_aborted", json!({})))
        .await
        .unwrap();

    let channel = manager.snapshot("c1").await.unwrap();
    assert!(channel.responding);
    assert!(!channel.aborting);
    let execution = channel
        .messages
        .iter()
        .filter_map(|m| m.agent_execution.as_ref())
        .find(|e| e.execution_id == "e2")
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert_eq!(manager.topic_status("c1").await.unwrap(), TopicStatus::Running);
    assert_eq!(manager.armed_abort_timers().await, 0);
    assert_eq!(transport.frames().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_abort_while_stopping_is_ignored() {
    let (manager, transport) = manager().await;
    manager
        .dispatch_raw("c1", frame("processing", json!({})))
        .await
        .unwrap();

    assert!(manager.abort_generation("c1").await.unwrap());
    assert!(!manager.abort_generation("c1").await.unwrap());
    assert_eq!(transport.frames().await.len(), 1);
    assert_eq!(manager.armed_abort_timers().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_spares_newer_run() {
    let (manager, _transport) = manager().await;
    manager
        .dispatch_raw("c1", frame("loading", json!({})))
        .await
        .unwrap();
    manager.abort_generation("c1").await.unwrap();
    manager
        .dispatch_raw("c1", frame("stream_aborted", json!({})))
        .await
        .unwrap();

    manager
        .send_message("c1", SendMessageRequest::new("try again"))
        .await
        .unwrap();
    tokio::time::sleep(PAST_TIMEOUT).await;

    let channel = manager.snapshot("c1").await.unwrap();
    assert!(channel.responding);
    assert!(!channel.aborting);
    assert_eq!(manager.topic_status("c1").await.unwrap(), TopicStatus::Running);
}

#[tokio::test]
async fn test_abort_with_nothing_in_flight() {
    let (manager, transport) = manager().await;
    assert!(!manager.abort_generation("c1").await.unwrap());
    assert!(transport.frames().await.is_empty());
    assert_eq!(manager.armed_abort_timers().await, 0);
}
