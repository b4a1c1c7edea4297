//! Agent Timeline Core
//!
//! Event taxonomy, execution data model, and declared effects for the Agent
//! Timeline workspace. This crate has no behavior beyond small model helpers
//! and no dependencies on the reducer, transport, or storage code.
//!
//! ## Module Organization
//!
//! - `error` - Core error types (`CoreError`, `CoreResult`)
//! - `events` - The closed set of inbound stream events (`StreamEvent`)
//! - `channel` - Channel and message state tree (`Channel`, `Message`)
//! - `execution` - Agent executions, phases, tool calls, subagents
//! - `effects` - Side effects declared by transitions (`Effects`, `OutboundFrame`)
//!
//! ## Design Principles
//!
//! 1. **Zero external dependencies beyond serde/thiserror/chrono**
//! 2. **Closed unions** - adding an event kind fails to compile until every
//!    consumer handles it
//! 3. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod channel;
pub mod effects;
pub mod error;
pub mod events;
pub mod execution;

// ── Error Types ────────────────────────────────────────────────────────
pub use error::{CoreError, CoreResult};

// ── State Tree ─────────────────────────────────────────────────────────
pub use channel::{
    Attachment, Channel, Citation, Message, MessageActivity, MessageNotice, MessageRole,
    NoticeKind, TopicStatus,
};
pub use execution::{
    elapsed_ms, AgentExecution, ExecutionError, ExecutionStatus, Phase, PhaseStatus, Subagent,
    SubagentStatus, ToolCall, ToolCallStatus,
};

// ── Events ─────────────────────────────────────────────────────────────
pub use events::{ExecutionContext, StreamEvent};

// ── Effects ────────────────────────────────────────────────────────────
pub use effects::{ChannelEffect, Effects, Notification, NotificationLevel, OutboundFrame};
