//! Execution Data Model
//!
//! Agent executions, their phases, tool calls, and nested subagents. These are
//! the nodes of the timeline the reducer maintains for each assistant message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Milliseconds elapsed between two instants, clamped at zero.
pub fn elapsed_ms(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(started_at)
        .num_milliseconds()
        .max(0) as u64
}

/// Status of an agent execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether no further transitions are allowed
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Map a producer-supplied terminal status string.
    ///
    /// Unknown strings are treated as `completed`: the producer only sends
    /// terminal events for runs that actually stopped.
    pub fn from_terminal(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "failed" | "error" => Self::Failed,
            "cancelled" | "canceled" | "aborted" => Self::Cancelled,
            _ => Self::Completed,
        }
    }

    /// Parse any status string, including `running`
    pub fn parse(status: &str) -> Option<Self> {
        match status.to_ascii_lowercase().as_str() {
            "running" | "pending" => Some(Self::Running),
            "completed" | "success" | "succeeded" => Some(Self::Completed),
            "failed" | "error" => Some(Self::Failed),
            "cancelled" | "canceled" | "aborted" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Status of a single phase (node) within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Running,
    Completed,
    Skipped,
    Failed,
    Cancelled,
}

impl PhaseStatus {
    /// Map a `node_end` status: `completed` and `skipped` pass through,
    /// everything else is a failure.
    pub fn from_node_end(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "completed" | "success" => Self::Completed,
            "skipped" => Self::Skipped,
            _ => Self::Failed,
        }
    }

    /// Phase status used when an execution terminates with a running phase
    pub fn closing_for(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Running | ExecutionStatus::Completed => Self::Completed,
            ExecutionStatus::Failed => Self::Failed,
            ExecutionStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Status of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    WaitingConfirmation,
    Executing,
    Completed,
    Failed,
}

impl Default for ToolCallStatus {
    fn default() -> Self {
        Self::WaitingConfirmation
    }
}

/// A request to invoke an external capability, gated by confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Value,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    /// Create a tool call awaiting confirmation
    pub fn new(id: impl Into<String>, name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            arguments: Value::Null,
            status: ToolCallStatus::WaitingConfirmation,
            result: None,
            error: None,
            timestamp,
        }
    }

    /// Set the arguments
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = arguments;
        self
    }

    /// Whether the call is still gated on a user decision
    pub fn is_waiting(&self) -> bool {
        self.status == ToolCallStatus::WaitingConfirmation
    }
}

/// One node/step of an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_key: Option<String>,
    pub status: PhaseStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub streamed_content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<Value>,
}

impl Phase {
    /// Create a running phase
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            component_key: None,
            status: PhaseStatus::Running,
            started_at: now,
            ended_at: None,
            duration_ms: None,
            streamed_content: String::new(),
            tool_calls: Vec::new(),
            output_summary: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == PhaseStatus::Running
    }

    /// Close the phase, stamping `ended_at` and computing the duration
    pub fn close(&mut self, status: PhaseStatus, now: DateTime<Utc>) {
        self.status = status;
        self.ended_at = Some(now);
        self.duration_ms = Some(elapsed_ms(self.started_at, now));
    }

    /// Put a previously closed phase back into the running state
    pub fn reactivate(&mut self, now: DateTime<Utc>) {
        self.status = PhaseStatus::Running;
        self.started_at = now;
        self.ended_at = None;
        self.duration_ms = None;
    }
}

/// Status of a nested subagent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Running,
    Completed,
    Failed,
}

impl SubagentStatus {
    pub fn from_end(status: &str) -> Self {
        match ExecutionStatus::from_terminal(status) {
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => Self::Failed,
            _ => Self::Completed,
        }
    }
}

/// A nested execution spawned by a root execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subagent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: SubagentStatus,
    pub depth: u32,
    #[serde(default)]
    pub execution_path: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_summary: Option<Value>,
}

/// Error details recorded by `agent_error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionError {
    pub error_type: String,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

/// One run of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentExecution {
    pub execution_id: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub agent_type: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub subagents: Vec<Subagent>,
}

impl AgentExecution {
    /// Create a running execution with no phases
    pub fn new(execution_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            execution_id: execution_id.into(),
            agent_id: String::new(),
            agent_name: String::new(),
            agent_type: String::new(),
            status: ExecutionStatus::Running,
            started_at,
            ended_at: None,
            duration_ms: None,
            current_node: None,
            current_phase: None,
            progress_percent: None,
            progress_message: None,
            error: None,
            phases: Vec::new(),
            subagents: Vec::new(),
        }
    }

    /// Set agent identity fields
    pub fn with_agent(
        mut self,
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> Self {
        self.agent_id = agent_id.into();
        self.agent_name = agent_name.into();
        self.agent_type = agent_type.into();
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn phase_index(&self, phase_id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == phase_id)
    }

    pub fn running_phase_index(&self) -> Option<usize> {
        self.phases.iter().position(Phase::is_running)
    }

    pub fn subagent_mut(&mut self, subagent_id: &str) -> Option<&mut Subagent> {
        self.subagents.iter_mut().find(|s| s.id == subagent_id)
    }

    /// Close every running phase with the given status
    pub fn close_running_phases(&mut self, status: PhaseStatus, now: DateTime<Utc>) {
        for phase in self.phases.iter_mut().filter(|p| p.is_running()) {
            phase.close(status, now);
        }
    }

    /// Move the execution into a terminal state.
    ///
    /// Returns `false` (and changes nothing) if the execution is already
    /// terminal or `status` is not terminal.
    pub fn finish(
        &mut self,
        status: ExecutionStatus,
        duration_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(now);
        self.duration_ms = Some(duration_ms.unwrap_or_else(|| elapsed_ms(self.started_at, now)));
        self.close_running_phases(PhaseStatus::closing_for(status), now);
        true
    }

    /// Content of the last phase that streamed anything
    pub fn last_non_empty_phase_content(&self) -> Option<&str> {
        self.phases
            .iter()
            .rev()
            .map(|p| p.streamed_content.as_str())
            .find(|c| !c.trim().is_empty())
    }

    /// Find a tool call in any phase
    pub fn tool_call_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolCall> {
        self.phases
            .iter_mut()
            .flat_map(|p| p.tool_calls.iter_mut())
            .find(|t| t.id == tool_call_id)
    }
}
