//! Command Models
//!
//! Request and result types for the channel command surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length accepted by the history API for edited content
pub const MAX_EDIT_CONTENT_LEN: usize = 100_000;

/// Send message request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
    /// Overrides the channel's knowledge context for this message
    #[serde(default)]
    pub context: Option<Value>,
}

impl SendMessageRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_files(mut self, file_ids: Vec<String>) -> Self {
        self.file_ids = file_ids;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// How an edit is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Update the content only
    EditOnly,
    /// Update the content, drop every later message, and re-run the agent.
    /// Only valid for user messages.
    #[default]
    TruncateAndRegenerate,
}

impl EditMode {
    pub fn truncates(self) -> bool {
        matches!(self, Self::TruncateAndRegenerate)
    }
}

/// Result reported by the history API for an edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOutcome {
    pub message_id: String,
    pub content: String,
    /// Number of later messages the backend deleted
    pub deleted_count: usize,
    /// Whether the client should trigger regeneration
    pub regenerate: bool,
}
