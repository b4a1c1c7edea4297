//! Declared Effects
//!
//! The reducer never performs I/O. Instead of sending frames or raising
//! notifications directly, each transition declares what should happen via
//! [`Effects`]; the channel manager executes them after the state change has
//! been committed.
//!
//! # Example
//!
//! ```ignore
//! let effects = Effects::none()
//!     .with_frame(OutboundFrame::Abort)
//!     .with(ChannelEffect::DisarmAbortTimer);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames the client sends to the backend over the channel transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A user chat message
    Message {
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        file_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
    },
    /// Request cancellation of the in-flight generation
    Abort,
    /// Approve a tool call waiting for confirmation
    ToolCallConfirm { tool_call_id: String },
    /// Reject a tool call waiting for confirmation
    ToolCallCancel { tool_call_id: String },
    /// Re-run the agent from an edited user message
    Regenerate { message_id: String },
}

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A non-blocking, user-facing notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub channel_id: String,
    pub level: NotificationLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

/// A side effect declared by a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEffect {
    /// Send a frame over the channel transport (fire-and-forget)
    SendFrame(OutboundFrame),
    /// Surface a notification to the UI
    Notify(Notification),
    /// Rename the channel's entry in the history list
    RenameHistory { channel_id: String, title: String },
    /// Cancel the pending abort timeout for the channel
    DisarmAbortTimer,
}

/// Ordered list of effects produced by one transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    items: Vec<ChannelEffect>,
}

impl Effects {
    /// No effects
    pub fn none() -> Self {
        Self::default()
    }

    /// Add an effect (builder)
    pub fn with(mut self, effect: ChannelEffect) -> Self {
        self.items.push(effect);
        self
    }

    /// Add a frame to send (builder)
    pub fn with_frame(self, frame: OutboundFrame) -> Self {
        self.with(ChannelEffect::SendFrame(frame))
    }

    /// Add an effect in place
    pub fn push(&mut self, effect: ChannelEffect) {
        self.items.push(effect);
    }

    /// Append all effects from another set
    pub fn extend(&mut self, other: Effects) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelEffect> {
        self.items.iter()
    }

    /// Whether any effect matches the predicate
    pub fn contains(&self, predicate: impl Fn(&ChannelEffect) -> bool) -> bool {
        self.items.iter().any(predicate)
    }
}

impl IntoIterator for Effects {
    type Item = ChannelEffect;
    type IntoIter = std::vec::IntoIter<ChannelEffect>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
