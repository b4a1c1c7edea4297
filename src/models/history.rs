//! History Models
//!
//! Shapes returned by the message history API: persisted messages and the
//! `agent_metadata` summary stored alongside assistant messages. Field names
//! are snake_case, as the backend stores them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use agent_timeline_core::{Attachment, Citation, MessageRole};

/// One entry of the persisted execution timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(alias = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TimelineEntry {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            node_id: None,
            status: None,
            duration_ms: None,
            timestamp: None,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Persisted summary of one agent execution (`agent_metadata`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub execution_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub agent_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub node_outputs: Map<String, Value>,
    #[serde(default)]
    pub node_order: Vec<String>,
    #[serde(default)]
    pub node_names: HashMap<String, String>,
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ExecutionSummary {
    pub fn new(execution_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            agent_id: String::new(),
            agent_name: String::new(),
            agent_type: String::new(),
            status: status.into(),
            node_outputs: Map::new(),
            node_order: Vec::new(),
            node_names: HashMap::new(),
            timeline: Vec::new(),
            started_at: None,
            ended_at: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Append a node output, keeping `node_order` in sync
    pub fn with_node_output(mut self, node_id: impl Into<String>, output: Value) -> Self {
        let node_id = node_id.into();
        self.node_order.push(node_id.clone());
        self.node_outputs.insert(node_id, output);
        self
    }

    pub fn with_timeline(mut self, timeline: Vec<TimelineEntry>) -> Self {
        self.timeline = timeline;
        self
    }
}

/// A message as returned by the history API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<ExecutionSummary>,
}
