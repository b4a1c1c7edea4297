//! Stream Event Taxonomy
//!
//! The closed set of events a channel receives from the transport. Each frame
//! on the wire is `{"type": <kind>, "data": {...}}`; payload fields are
//! snake_case, as the backend emits them.
//!
//! Parsing is explicit (`StreamEvent::from_value`) so that an unknown kind and a
//! malformed payload are reported as distinct errors. Callers log and drop
//! both; neither ever reaches the reducer.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::channel::{Attachment, Citation, MessageRole};
use crate::error::{CoreError, CoreResult};
use crate::execution::ToolCallStatus;

fn default_completed() -> String {
    "completed".to_string()
}

/// Execution/node context carried by agent lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub execution_path: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ExecutionContext {
    /// Minimal context for a root execution
    pub fn root(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            agent_id: String::new(),
            agent_name: String::new(),
            agent_type: String::new(),
            parent_execution_id: None,
            depth: 0,
            execution_path: Vec::new(),
            current_node: None,
            started_at: None,
        }
    }

    /// Set the parent execution (marks a nested run)
    pub fn with_parent(mut self, parent_execution_id: impl Into<String>) -> Self {
        self.parent_execution_id = Some(parent_execution_id.into());
        self.depth = self.depth.max(1);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoadingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingStartPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingChunkPayload {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingEndPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSavedPayload {
    pub stream_id: String,
    pub db_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingStartPayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingChunkPayload {
    pub id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingEndPayload {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequestPayload {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponsePayload {
    #[serde(alias = "toolCallId")]
    pub tool_call_id: String,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, alias = "error")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InsufficientBalancePayload {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamAbortedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicUpdatedPayload {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStartPayload {
    pub context: ExecutionContext,
    /// Stream-local message id, when the producer supplies one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEndPayload {
    pub context: ExecutionContext,
    #[serde(default = "default_completed")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentErrorPayload {
    pub context: ExecutionContext,
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStartPayload {
    pub context: ExecutionContext,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEndPayload {
    pub context: ExecutionContext,
    pub node_id: String,
    #[serde(default = "default_completed")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentStartPayload {
    pub context: ExecutionContext,
    pub subagent_id: String,
    #[serde(default)]
    pub subagent_name: String,
    #[serde(default)]
    pub subagent_type: String,
    #[serde(default)]
    pub depth: u32,
    #[serde(default)]
    pub execution_path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentEndPayload {
    pub context: ExecutionContext,
    pub subagent_id: String,
    #[serde(default = "default_completed")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdatePayload {
    pub context: ExecutionContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchCitationsPayload {
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedFilesPayload {
    #[serde(default)]
    pub files: Vec<Attachment>,
}

/// Every event kind a channel can receive
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Processing(ProcessingPayload),
    Loading(LoadingPayload),
    StreamingStart(StreamingStartPayload),
    StreamingChunk(StreamingChunkPayload),
    StreamingEnd(StreamingEndPayload),
    Message(MessagePayload),
    MessageSaved(MessageSavedPayload),
    ThinkingStart(ThinkingStartPayload),
    ThinkingChunk(ThinkingChunkPayload),
    ThinkingEnd(ThinkingEndPayload),
    ToolCallRequest(ToolCallRequestPayload),
    ToolCallResponse(ToolCallResponsePayload),
    Error(ErrorPayload),
    InsufficientBalance(InsufficientBalancePayload),
    StreamAborted(StreamAbortedPayload),
    TopicUpdated(TopicUpdatedPayload),
    AgentStart(AgentStartPayload),
    AgentEnd(AgentEndPayload),
    AgentError(AgentErrorPayload),
    NodeStart(NodeStartPayload),
    NodeEnd(NodeEndPayload),
    SubagentStart(SubagentStartPayload),
    SubagentEnd(SubagentEndPayload),
    ProgressUpdate(ProgressUpdatePayload),
    SearchCitations(SearchCitationsPayload),
    GeneratedFiles(GeneratedFilesPayload),
}

fn payload<T: DeserializeOwned>(kind: &str, data: Value) -> CoreResult<T> {
    serde_json::from_value(data)
        .map_err(|e| CoreError::parse(format!("invalid `{}` payload: {}", kind, e)))
}

impl StreamEvent {
    /// Parse a `{type, data}` frame
    pub fn from_value(value: Value) -> CoreResult<Self> {
        let Value::Object(mut frame) = value else {
            return Err(CoreError::protocol("event frame is not a JSON object"));
        };
        let kind = match frame.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(CoreError::protocol("event frame has no string `type`")),
        };
        let data = match frame.remove("data") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data) => data,
        };
        Self::from_parts(&kind, data)
    }

    /// Parse a JSON text frame
    pub fn from_json(text: &str) -> CoreResult<Self> {
        Self::from_value(serde_json::from_str(text)?)
    }

    fn from_parts(kind: &str, data: Value) -> CoreResult<Self> {
        let event = match kind {
            "processing" => Self::Processing(payload(kind, data)?),
            "loading" => Self::Loading(payload(kind, data)?),
            "streaming_start" => Self::StreamingStart(payload(kind, data)?),
            "streaming_chunk" => Self::StreamingChunk(payload(kind, data)?),
            "streaming_end" => Self::StreamingEnd(payload(kind, data)?),
            "message" => Self::Message(payload(kind, data)?),
            "message_saved" => Self::MessageSaved(payload(kind, data)?),
            "thinking_start" => Self::ThinkingStart(payload(kind, data)?),
            "thinking_chunk" => Self::ThinkingChunk(payload(kind, data)?),
            "thinking_end" => Self::ThinkingEnd(payload(kind, data)?),
            "tool_call_request" => Self::ToolCallRequest(payload(kind, data)?),
            "tool_call_response" => Self::ToolCallResponse(payload(kind, data)?),
            "error" => Self::Error(payload(kind, data)?),
            "insufficient_balance" => Self::InsufficientBalance(payload(kind, data)?),
            "stream_aborted" => Self::StreamAborted(payload(kind, data)?),
            "topic_updated" => Self::TopicUpdated(payload(kind, data)?),
            "agent_start" => Self::AgentStart(payload(kind, data)?),
            "agent_end" => Self::AgentEnd(payload(kind, data)?),
            "agent_error" => Self::AgentError(payload(kind, data)?),
            "node_start" => Self::NodeStart(payload(kind, data)?),
            "node_end" => Self::NodeEnd(payload(kind, data)?),
            "subagent_start" => Self::SubagentStart(payload(kind, data)?),
            "subagent_end" => Self::SubagentEnd(payload(kind, data)?),
            "progress_update" => Self::ProgressUpdate(payload(kind, data)?),
            "search_citations" => Self::SearchCitations(payload(kind, data)?),
            "generated_files" => Self::GeneratedFiles(payload(kind, data)?),
            other => return Err(CoreError::protocol(format!("unknown event kind: {}", other))),
        };
        Ok(event)
    }

    /// Wire tag of this event
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Processing(_) => "processing",
            Self::Loading(_) => "loading",
            Self::StreamingStart(_) => "streaming_start",
            Self::StreamingChunk(_) => "streaming_chunk",
            Self::StreamingEnd(_) => "streaming_end",
            Self::Message(_) => "message",
            Self::MessageSaved(_) => "message_saved",
            Self::ThinkingStart(_) => "thinking_start",
            Self::ThinkingChunk(_) => "thinking_chunk",
            Self::ThinkingEnd(_) => "thinking_end",
            Self::ToolCallRequest(_) => "tool_call_request",
            Self::ToolCallResponse(_) => "tool_call_response",
            Self::Error(_) => "error",
            Self::InsufficientBalance(_) => "insufficient_balance",
            Self::StreamAborted(_) => "stream_aborted",
            Self::TopicUpdated(_) => "topic_updated",
            Self::AgentStart(_) => "agent_start",
            Self::AgentEnd(_) => "agent_end",
            Self::AgentError(_) => "agent_error",
            Self::NodeStart(_) => "node_start",
            Self::NodeEnd(_) => "node_end",
            Self::SubagentStart(_) => "subagent_start",
            Self::SubagentEnd(_) => "subagent_end",
            Self::ProgressUpdate(_) => "progress_update",
            Self::SearchCitations(_) => "search_citations",
            Self::GeneratedFiles(_) => "generated_files",
        }
    }

    /// Execution context, for lifecycle events that carry one
    pub fn execution_context(&self) -> Option<&ExecutionContext> {
        match self {
            Self::AgentStart(p) => Some(&p.context),
            Self::AgentEnd(p) => Some(&p.context),
            Self::AgentError(p) => Some(&p.context),
            Self::NodeStart(p) => Some(&p.context),
            Self::NodeEnd(p) => Some(&p.context),
            Self::SubagentStart(p) => Some(&p.context),
            Self::SubagentEnd(p) => Some(&p.context),
            Self::ProgressUpdate(p) => Some(&p.context),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for StreamEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
