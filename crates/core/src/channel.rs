//! Channel & Message Model
//!
//! The per-conversation state tree: a channel owns an ordered list of
//! messages, each optionally carrying an agent execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execution::{AgentExecution, ToolCall};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

/// Transient activity of a message.
///
/// A single enum instead of independent booleans: a message can be loading,
/// streaming, or thinking, never two at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageActivity {
    #[default]
    Idle,
    Loading,
    Streaming,
    Thinking,
}

/// Kind of notice carried by an error-like message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Error,
    InsufficientBalance,
}

/// Error/notice details attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNotice {
    pub kind: NoticeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

/// A search citation attached to an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "cited_text", skip_serializing_if = "Option::is_none")]
    pub cited_text: Option<String>,
    #[serde(default, alias = "start_index", skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u64>,
    #[serde(default, alias = "end_index", skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u64>,
}

/// A file attached to a message (uploaded or generated)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// One chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server UUID once persisted, otherwise a local opaque id
    pub id: String,
    /// Stable local id; survives `id` reassignment
    pub client_id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub activity: MessageActivity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_execution: Option<AgentExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<MessageNotice>,
}

impl Message {
    /// Create an idle message
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        role: MessageRole,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            role,
            content: String::new(),
            created_at,
            activity: MessageActivity::Idle,
            thinking_content: None,
            tool_calls: Vec::new(),
            attachments: Vec::new(),
            citations: Vec::new(),
            agent_execution: None,
            notice: None,
        }
    }

    /// Set the content
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Set the activity
    pub fn with_activity(mut self, activity: MessageActivity) -> Self {
        self.activity = activity;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.activity == MessageActivity::Loading
    }

    pub fn is_streaming(&self) -> bool {
        self.activity == MessageActivity::Streaming
    }

    pub fn is_thinking(&self) -> bool {
        self.activity == MessageActivity::Thinking
    }

    /// Whether the attached execution is still running
    pub fn has_running_execution(&self) -> bool {
        self.agent_execution
            .as_ref()
            .is_some_and(AgentExecution::is_running)
    }

    /// Fill empty direct content from the execution's last non-empty phase
    pub fn backfill_content_from_phases(&mut self) {
        if !self.content.trim().is_empty() {
            return;
        }
        if let Some(text) = self
            .agent_execution
            .as_ref()
            .and_then(AgentExecution::last_non_empty_phase_content)
        {
            self.content = text.to_string();
        }
    }
}

/// One conversation/topic's live state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub responding: bool,
    #[serde(default)]
    pub aborting: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_context: Option<Value>,
}

impl Channel {
    /// Create an empty channel
    pub fn new(id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            title: String::new(),
            messages: Vec::new(),
            connected: false,
            error: None,
            responding: false,
            aborting: false,
            knowledge_context: None,
        }
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Number of messages currently flagged as loading
    pub fn loading_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_loading()).count()
    }

    /// Number of messages whose execution is running
    pub fn running_execution_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.has_running_execution())
            .count()
    }

    /// Latest execution in message order, if any
    pub fn latest_execution(&self) -> Option<&AgentExecution> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.agent_execution.as_ref())
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }
}

/// Coarse per-channel status consumed by UI badges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    Idle,
    Running,
    Stopping,
    Failed,
}
