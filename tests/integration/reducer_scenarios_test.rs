//! Reducer Scenario Tests
//!
//! Event sequences applied through `ChannelReducer` exactly as they arrive on
//! the wire (`{type, data}` frames):
//! - Phase streaming inside an agent execution
//! - Plain streaming replacing the loading placeholder
//! - Nested runs and duplicate lifecycle events
//! - Structural invariants over long pseudo-random sequences

use chrono::Utc;
use serde_json::{json, Value};

use agent_timeline::services::derive_topic_status;
use agent_timeline::services::reducer::ChannelReducer;
use agent_timeline_core::{
    Channel, ExecutionStatus, MessageActivity, NoticeKind, PhaseStatus, StreamEvent,
    SubagentStatus, ToolCallStatus, TopicStatus,
};

// ============================================================================
// Helpers
// ============================================================================

fn event(kind: &str, data: Value) -> StreamEvent {
    StreamEvent::from_value(json!({ "type": kind, "data": data })).unwrap()
}

fn apply_all(reducer: &ChannelReducer, channel: &mut Channel, events: Vec<StreamEvent>) {
    for e in events {
        reducer.apply(channel, e, Utc::now());
    }
}

fn ctx(execution_id: &str) -> Value {
    json!({ "execution_id": execution_id })
}

/// Deterministic generator so sequences are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_event(rng: &mut Lcg) -> StreamEvent {
    let k = rng.below(3);
    let exec = format!("e{}", k);
    let stream = format!("s{}", k);
    let node = format!("n{}", rng.below(3));
    match rng.below(17) {
        0 => event("processing", json!({})),
        1 => event("loading", json!({})),
        2 => event("streaming_start", json!({ "id": stream })),
        3 => event("streaming_chunk", json!({ "id": stream, "content": "x" })),
        4 => event("streaming_end", json!({ "id": stream })),
        5 => event("thinking_start", json!({ "id": stream })),
        6 => event("thinking_chunk", json!({ "id": stream, "content": "hm" })),
        7 => event("thinking_end", json!({ "id": stream })),
        8 => event("agent_start", json!({ "context": ctx(&exec) })),
        9 => event("node_start", json!({ "context": ctx(&exec), "node_id": node })),
        10 => event(
            "node_end",
            json!({ "context": ctx(&exec), "node_id": node, "status": "completed" }),
        ),
        11 => event("agent_end", json!({ "context": ctx(&exec) })),
        12 => event(
            "agent_error",
            json!({ "context": ctx(&exec), "error_type": "tool", "message": "bad" }),
        ),
        13 => event(
            "tool_call_request",
            json!({ "id": format!("tc{}", rng.below(4)), "name": "search" }),
        ),
        14 => event("error", json!({ "message": "boom" })),
        15 => event("stream_aborted", json!({})),
        _ => event(
            "message",
            json!({ "id": format!("m{}", rng.below(4)), "role": "assistant", "content": "hi" }),
        ),
    }
}

fn assert_structure(channel: &Channel, step: usize) {
    assert!(channel.loading_count() <= 1, "two placeholders at step {}", step);
    assert!(
        channel.running_execution_count() <= 1,
        "two running executions at step {}",
        step
    );
    for execution in channel.messages.iter().filter_map(|m| m.agent_execution.as_ref()) {
        let running = execution.phases.iter().filter(|p| p.is_running()).count();
        assert!(running <= 1, "two running phases at step {}", step);
        if execution.status.is_terminal() {
            assert_eq!(running, 0, "running phase in finished execution at step {}", step);
        }
    }
}

// ============================================================================
// Execution streaming
// ============================================================================

#[test]
fn test_single_node_run_accumulates_phase_text() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "n1" })),
            event("streaming_chunk", json!({ "id": "stream-1", "content": "A" })),
            event("streaming_chunk", json!({ "id": "stream-1", "content": "B" })),
            event(
                "node_end",
                json!({ "context": ctx("e1"), "node_id": "n1", "status": "completed" }),
            ),
            event("agent_end", json!({ "context": ctx("e1"), "status": "completed" })),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    let msg = &channel.messages[0];
    let execution = msg.agent_execution.as_ref().unwrap();
    assert_eq!(execution.phases.len(), 1);
    assert_eq!(execution.phases[0].id, "n1");
    assert_eq!(execution.phases[0].streamed_content, "AB");
    assert_eq!(execution.phases[0].status, PhaseStatus::Completed);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(msg.content, "AB");
    assert!(!channel.responding);
}

#[test]
fn test_full_resend_replaces_phase_text() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");
    let final_text: String = "The quick brown fox jumps over the lazy dog. "
        .repeat(4)
        .chars()
        .take(140)
        .collect();
    let partial: String = final_text.chars().take(120).collect();

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "write" })),
            event("streaming_chunk", json!({ "id": "s1", "content": partial })),
            event("streaming_chunk", json!({ "id": "s1", "content": final_text.clone() })),
        ],
    );

    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    let content = &execution.phases[0].streamed_content;
    assert_eq!(content.chars().count(), 140);
    assert_eq!(content, &final_text);
}

#[test]
fn test_chunk_after_run_end_is_dropped() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1"), "id": "s1" })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "n1" })),
            event("streaming_start", json!({ "id": "s1" })),
            event("streaming_chunk", json!({ "id": "s1", "content": "A" })),
            event("streaming_end", json!({ "id": "s1" })),
            event("agent_end", json!({ "context": ctx("e1"), "status": "completed" })),
            event("streaming_chunk", json!({ "id": "s1", "content": "B" })),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    let msg = &channel.messages[0];
    assert_eq!(msg.activity, MessageActivity::Idle);
    let execution = msg.agent_execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.phases[0].streamed_content, "A");
    assert_eq!(derive_topic_status(&channel), TopicStatus::Idle);
}

#[test]
fn test_next_node_closes_previous_phase() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "plan" })),
            event("streaming_chunk", json!({ "id": "x", "content": "plan text" })),
            event(
                "node_start",
                json!({ "context": ctx("e1"), "node_id": "web_search", "node_name": "Search" }),
            ),
            event("streaming_chunk", json!({ "id": "x", "content": "results" })),
        ],
    );

    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.phases[0].status, PhaseStatus::Completed);
    assert_eq!(execution.phases[1].status, PhaseStatus::Running);
    assert_eq!(execution.phases[1].name, "Search");
    assert_eq!(execution.phases[1].streamed_content, "results");
    assert_eq!(execution.current_phase.as_deref(), Some("Search"));
}

#[test]
fn test_agent_start_adopts_loading_placeholder() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("loading", json!({})),
            event("agent_start", json!({ "context": ctx("e1") })),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    assert_eq!(channel.loading_count(), 0);
    assert!(channel.messages[0].has_running_execution());
    assert!(channel.responding);
}

#[test]
fn test_duplicate_agent_start_is_ignored() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "n1" })),
            event("agent_start", json!({ "context": ctx("e1") })),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.phases.len(), 1);
    assert!(execution.is_running());
}

#[test]
fn test_new_root_force_completes_previous_run() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("agent_start", json!({ "context": ctx("e2") })),
        ],
    );

    assert_eq!(channel.messages.len(), 2);
    let first = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(first.status, ExecutionStatus::Completed);
    assert_eq!(channel.running_execution_count(), 1);
}

#[test]
fn test_nested_run_attaches_to_parent() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");
    let child = json!({
        "execution_id": "sub-1",
        "parent_execution_id": "e1",
        "agent_name": "Researcher",
        "agent_type": "research",
        "depth": 1
    });

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("agent_start", json!({ "context": child.clone() })),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.subagents.len(), 1);
    assert_eq!(execution.subagents[0].name, "Researcher");
    assert_eq!(execution.subagents[0].status, SubagentStatus::Running);

    reducer.apply(
        &mut channel,
        event("agent_end", json!({ "context": child, "duration_ms": 900 })),
        Utc::now(),
    );

    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.subagents[0].status, SubagentStatus::Completed);
    assert_eq!(execution.subagents[0].duration_ms, Some(900));
    assert!(execution.is_running());
}

#[test]
fn test_nested_end_without_start_leaves_parent_running() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");
    let orphan = json!({ "execution_id": "child", "parent_execution_id": "root" });

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("root") })),
            event("agent_end", json!({ "context": orphan.clone(), "status": "completed" })),
            event(
                "agent_error",
                json!({ "context": orphan, "error_type": "tool", "message": "boom" }),
            ),
        ],
    );

    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert!(execution.error.is_none());
    assert!(channel.responding);

    reducer.apply(
        &mut channel,
        event("agent_end", json!({ "context": ctx("root"), "status": "completed" })),
        Utc::now(),
    );
    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
}

#[test]
fn test_tool_call_lands_in_current_phase() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "n1" })),
            event(
                "tool_call_request",
                json!({ "id": "tc1", "name": "web_search", "arguments": {"q": "rust"} }),
            ),
            event(
                "tool_call_request",
                json!({ "id": "tc1", "name": "web_search", "arguments": {"q": "rust"} }),
            ),
            event(
                "tool_call_response",
                json!({ "toolCallId": "tc1", "status": "completed", "result": {"hits": 3} }),
            ),
        ],
    );

    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    let calls = &execution.phases[0].tool_calls;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, ToolCallStatus::Completed);
    assert_eq!(calls[0].result, Some(json!({"hits": 3})));
}

#[test]
fn test_node_end_for_unknown_node_changes_nothing() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");
    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "n1" })),
        ],
    );
    let before = channel.clone();

    reducer.apply(
        &mut channel,
        event(
            "node_end",
            json!({ "context": ctx("e1"), "node_id": "ghost", "status": "completed" }),
        ),
        Utc::now(),
    );
    assert_eq!(channel, before);
}

// ============================================================================
// Plain streaming
// ============================================================================

#[test]
fn test_plain_stream_replaces_placeholder() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("processing", json!({})),
            event("streaming_start", json!({ "id": "s-1" })),
            event("streaming_chunk", json!({ "id": "s-1", "content": "Hel" })),
            event("streaming_chunk", json!({ "id": "s-1", "content": "lo" })),
            event("streaming_end", json!({ "id": "s-1" })),
            event(
                "message_saved",
                json!({ "stream_id": "s-1", "db_id": "6f1c2a1e-7d4b-4c55-9a55-0b6f4f0e9d11" }),
            ),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    let msg = &channel.messages[0];
    assert_eq!(msg.content, "Hello");
    assert_eq!(msg.activity, MessageActivity::Idle);
    assert_eq!(msg.id, "6f1c2a1e-7d4b-4c55-9a55-0b6f4f0e9d11");
    assert!(!channel.responding);
}

#[test]
fn test_stale_chunk_ids() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    // Nothing to attach to
    reducer.apply(
        &mut channel,
        event("streaming_chunk", json!({ "id": "old", "content": "lost" })),
        Utc::now(),
    );
    assert!(channel.messages.is_empty());

    // A live stream absorbs chunks tagged with an outdated id
    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("streaming_start", json!({ "id": "s-2" })),
            event("streaming_chunk", json!({ "id": "s-1", "content": "kept" })),
        ],
    );
    assert_eq!(channel.messages.len(), 1);
    assert_eq!(channel.messages[0].content, "kept");
}

#[test]
fn test_thinking_then_answer_share_one_message() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("loading", json!({})),
            event("thinking_start", json!({ "id": "t-1" })),
            event("thinking_chunk", json!({ "id": "t-1", "content": "considering" })),
            event("thinking_end", json!({ "id": "t-1" })),
            event("streaming_start", json!({ "id": "t-1" })),
            event("streaming_chunk", json!({ "id": "t-1", "content": "answer" })),
            event("streaming_end", json!({ "id": "t-1" })),
        ],
    );

    assert_eq!(channel.messages.len(), 1);
    let msg = &channel.messages[0];
    assert_eq!(msg.thinking_content.as_deref(), Some("considering"));
    assert_eq!(msg.content, "answer");
}

#[test]
fn test_error_fails_run_and_leaves_notice() {
    let reducer = ChannelReducer::default();
    let mut channel = Channel::new("c1", "s1");

    apply_all(
        &reducer,
        &mut channel,
        vec![
            event("agent_start", json!({ "context": ctx("e1") })),
            event("node_start", json!({ "context": ctx("e1"), "node_id": "n1" })),
            event("error", json!({ "message": "upstream timeout", "error_code": "E504" })),
        ],
    );

    let execution = channel.messages[0].agent_execution.as_ref().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.phases[0].status, PhaseStatus::Failed);
    assert_eq!(channel.error.as_deref(), Some("upstream timeout"));

    let notice = channel.messages.last().unwrap().notice.as_ref().unwrap();
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.code.as_deref(), Some("E504"));
    assert!(!channel.responding);
}

// ============================================================================
// Invariants
// ============================================================================

#[test]
fn test_structure_holds_for_random_sequences() {
    let reducer = ChannelReducer::default();
    for seed in 1..=25u64 {
        let mut rng = Lcg(seed);
        let mut channel = Channel::new("c1", "s1");
        for step in 0..300 {
            let e = random_event(&mut rng);
            reducer.apply(&mut channel, e, Utc::now());
            assert_structure(&channel, step);
        }
    }
}
