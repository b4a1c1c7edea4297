//! Execution Lifecycle Reducer
//!
//! Agent, node, subagent, and progress events. An execution moves from
//! `running` to exactly one terminal status; terminal executions ignore
//! further node and progress events.

use chrono::{DateTime, Utc};

use agent_timeline_core::events::{
    AgentEndPayload, AgentErrorPayload, AgentStartPayload, NodeEndPayload, NodeStartPayload,
    ProgressUpdatePayload, SubagentEndPayload, SubagentStartPayload,
};
use agent_timeline_core::{
    elapsed_ms, AgentExecution, Channel, ChannelEffect, Effects, ExecutionContext,
    ExecutionError, ExecutionStatus, Message, MessageActivity, MessageRole, Phase, PhaseStatus,
    Subagent, SubagentStatus,
};

use super::queries;
use crate::services::reconstruct::humanize_node_id;
use crate::utils::ids::new_client_id;

/// Clear `responding`, and settle a pending abort if there is one
pub(super) fn settle_run(channel: &mut Channel) -> Effects {
    channel.responding = false;
    if channel.aborting {
        channel.aborting = false;
        return Effects::none().with(ChannelEffect::DisarmAbortTimer);
    }
    Effects::none()
}

/// Finish a message's execution and strip its transient activity
fn finish_message(
    msg: &mut Message,
    status: ExecutionStatus,
    duration_ms: Option<u64>,
    now: DateTime<Utc>,
) -> bool {
    let finished = msg
        .agent_execution
        .as_mut()
        .is_some_and(|e| e.finish(status, duration_ms, now));
    msg.activity = MessageActivity::Idle;
    msg.backfill_content_from_phases();
    finished
}

fn subagent_from_context(context: &ExecutionContext, now: DateTime<Utc>) -> Subagent {
    Subagent {
        id: context.execution_id.clone(),
        name: context.agent_name.clone(),
        kind: context.agent_type.clone(),
        status: SubagentStatus::Running,
        depth: context.depth,
        execution_path: context.execution_path.clone(),
        started_at: context.started_at.unwrap_or(now),
        ended_at: None,
        duration_ms: None,
        output_summary: None,
    }
}

fn attach_subagent(execution: &mut AgentExecution, subagent: Subagent) {
    match execution.subagent_mut(&subagent.id) {
        Some(existing) => {
            existing.name = subagent.name;
            existing.kind = subagent.kind;
        }
        None => execution.subagents.push(subagent),
    }
}

fn end_subagent(
    subagent: &mut Subagent,
    status: SubagentStatus,
    duration_ms: Option<u64>,
    output_summary: Option<serde_json::Value>,
    now: DateTime<Utc>,
) {
    subagent.status = status;
    subagent.ended_at = Some(now);
    subagent.duration_ms = Some(duration_ms.unwrap_or_else(|| elapsed_ms(subagent.started_at, now)));
    if output_summary.is_some() {
        subagent.output_summary = output_summary;
    }
}

pub(super) fn agent_start(
    channel: &mut Channel,
    payload: AgentStartPayload,
    now: DateTime<Utc>,
) -> Effects {
    let context = payload.context;

    if queries::execution_index_by_id(channel, &context.execution_id).is_some() {
        tracing::debug!(
            "[Reducer] Duplicate agent_start for execution {}",
            context.execution_id
        );
        return Effects::none();
    }

    if let Some(parent) = context.parent_execution_id.as_deref() {
        if let Some(index) = queries::execution_index_by_id(channel, parent) {
            if let Some(root) = queries::execution_at(channel, index) {
                attach_subagent(root, subagent_from_context(&context, now));
            }
            return Effects::none();
        }
    }

    // One running execution per channel
    for msg in channel
        .messages
        .iter_mut()
        .filter(|m| m.has_running_execution())
    {
        tracing::debug!("[Reducer] Force-completing execution on message {}", msg.id);
        finish_message(msg, ExecutionStatus::Completed, None, now);
    }

    let execution = AgentExecution::new(
        context.execution_id.clone(),
        context.started_at.unwrap_or(now),
    )
    .with_agent(
        context.agent_id.clone(),
        context.agent_name.clone(),
        context.agent_type.clone(),
    );

    let target = queries::loading_index(channel).or_else(|| {
        payload
            .id
            .as_deref()
            .and_then(|id| queries::message_index(channel, id))
            .filter(|&i| channel.messages[i].agent_execution.is_none())
    });

    match target {
        Some(index) => {
            let msg = &mut channel.messages[index];
            if let Some(id) = payload.id {
                msg.id = id;
            }
            if msg.is_loading() {
                msg.activity = MessageActivity::Idle;
            }
            msg.agent_execution = Some(execution);
        }
        None => {
            let id = payload
                .id
                .unwrap_or_else(|| format!("agent-{}", context.execution_id));
            let mut msg = Message::new(
                id,
                new_client_id("agent"),
                MessageRole::Assistant,
                now,
            );
            msg.agent_execution = Some(execution);
            channel.messages.push(msg);
        }
    }

    channel.responding = true;
    Effects::none()
}

pub(super) fn node_start(
    channel: &mut Channel,
    payload: NodeStartPayload,
    now: DateTime<Utc>,
) -> Effects {
    let Some(index) = queries::execution_index_for(channel, &payload.context) else {
        tracing::warn!(
            "[Reducer] node_start {} with no execution in channel {}",
            payload.node_id,
            channel.id
        );
        return Effects::none();
    };
    let Some(execution) = queries::execution_at(channel, index) else {
        return Effects::none();
    };
    if !execution.is_running() {
        tracing::debug!(
            "[Reducer] Ignoring node_start {} for finished execution {}",
            payload.node_id,
            execution.execution_id
        );
        return Effects::none();
    }

    let label = payload
        .node_name
        .clone()
        .unwrap_or_else(|| humanize_node_id(&payload.node_id));
    let running = execution.running_phase_index();

    if running.map(|i| execution.phases[i].id.as_str()) != Some(payload.node_id.as_str()) {
        if let Some(i) = running {
            execution.phases[i].close(PhaseStatus::Completed, now);
        }
        match execution.phase_index(&payload.node_id) {
            Some(i) => {
                let phase = &mut execution.phases[i];
                phase.reactivate(now);
                phase.name = label.clone();
                if payload.component_key.is_some() {
                    phase.component_key = payload.component_key;
                }
            }
            None => {
                let mut phase = Phase::new(payload.node_id.clone(), label.clone(), now);
                phase.component_key = payload.component_key;
                execution.phases.push(phase);
            }
        }
    }

    execution.current_node = Some(payload.node_id);
    execution.current_phase = Some(label);
    Effects::none()
}

pub(super) fn node_end(
    channel: &mut Channel,
    payload: NodeEndPayload,
    now: DateTime<Utc>,
) -> Effects {
    let Some(execution) = queries::execution_index_for(channel, &payload.context)
        .and_then(|index| queries::execution_at(channel, index))
    else {
        tracing::debug!("[Reducer] node_end {} with no execution", payload.node_id);
        return Effects::none();
    };
    if !execution.is_running() {
        return Effects::none();
    }
    let Some(i) = execution.phase_index(&payload.node_id) else {
        tracing::debug!(
            "[Reducer] node_end for unknown node {} in execution {}",
            payload.node_id,
            execution.execution_id
        );
        return Effects::none();
    };

    let phase = &mut execution.phases[i];
    phase.close(PhaseStatus::from_node_end(&payload.status), now);
    if payload.duration_ms.is_some() {
        phase.duration_ms = payload.duration_ms;
    }
    if payload.output_summary.is_some() {
        phase.output_summary = payload.output_summary;
    }
    Effects::none()
}

/// Shared terminal handling for `agent_end` / `agent_error`
fn terminate(
    channel: &mut Channel,
    context: &ExecutionContext,
    status: ExecutionStatus,
    duration_ms: Option<u64>,
    error: Option<ExecutionError>,
    now: DateTime<Utc>,
) -> Effects {
    // A nested run that was registered as a subagent
    if queries::execution_index_by_id(channel, &context.execution_id).is_none() {
        if let Some((mi, si)) = queries::subagent_location(channel, &context.execution_id) {
            if let Some(subagent) =
                queries::execution_at(channel, mi).and_then(|e| e.subagents.get_mut(si))
            {
                let status = match status {
                    ExecutionStatus::Completed | ExecutionStatus::Running => {
                        SubagentStatus::Completed
                    }
                    _ => SubagentStatus::Failed,
                };
                end_subagent(subagent, status, duration_ms, None, now);
            }
            return Effects::none();
        }
        // A nested run whose start never arrived must not end its parent
        if let Some(parent) = context.parent_execution_id.as_deref() {
            tracing::debug!(
                "[Reducer] Terminal event for unknown nested execution {} (parent {})",
                context.execution_id,
                parent
            );
            return Effects::none();
        }
    }

    let Some(index) = queries::execution_index_for(channel, context) else {
        tracing::debug!(
            "[Reducer] Terminal event for unknown execution {}",
            context.execution_id
        );
        return settle_run(channel);
    };

    let msg = &mut channel.messages[index];
    if let (Some(execution), Some(error)) = (msg.agent_execution.as_mut(), error) {
        if execution.is_running() {
            execution.error = Some(error);
        }
    }
    if !finish_message(msg, status, duration_ms, now) {
        tracing::debug!(
            "[Reducer] Execution {} already terminal, keeping status",
            context.execution_id
        );
    }
    settle_run(channel)
}

pub(super) fn agent_end(
    channel: &mut Channel,
    payload: AgentEndPayload,
    now: DateTime<Utc>,
) -> Effects {
    let status = ExecutionStatus::from_terminal(&payload.status);
    terminate(channel, &payload.context, status, payload.duration_ms, None, now)
}

pub(super) fn agent_error(
    channel: &mut Channel,
    payload: AgentErrorPayload,
    now: DateTime<Utc>,
) -> Effects {
    let error = ExecutionError {
        error_type: payload.error_type,
        message: payload.message,
        recoverable: payload.recoverable,
        node_id: payload.node_id,
    };
    terminate(
        channel,
        &payload.context,
        ExecutionStatus::Failed,
        None,
        Some(error),
        now,
    )
}

pub(super) fn subagent_start(
    channel: &mut Channel,
    payload: SubagentStartPayload,
    now: DateTime<Utc>,
) -> Effects {
    let Some(execution) = queries::execution_index_for(channel, &payload.context)
        .and_then(|index| queries::execution_at(channel, index))
    else {
        tracing::warn!(
            "[Reducer] subagent_start {} with no execution in channel {}",
            payload.subagent_id,
            channel.id
        );
        return Effects::none();
    };

    attach_subagent(
        execution,
        Subagent {
            id: payload.subagent_id,
            name: payload.subagent_name,
            kind: payload.subagent_type,
            status: SubagentStatus::Running,
            depth: payload.depth,
            execution_path: payload.execution_path,
            started_at: now,
            ended_at: None,
            duration_ms: None,
            output_summary: None,
        },
    );
    Effects::none()
}

pub(super) fn subagent_end(
    channel: &mut Channel,
    payload: SubagentEndPayload,
    now: DateTime<Utc>,
) -> Effects {
    let subagent = queries::execution_index_for(channel, &payload.context)
        .and_then(|index| queries::execution_at(channel, index))
        .and_then(|e| e.subagent_mut(&payload.subagent_id));
    match subagent {
        Some(subagent) => end_subagent(
            subagent,
            SubagentStatus::from_end(&payload.status),
            payload.duration_ms,
            payload.output_summary,
            now,
        ),
        None => tracing::debug!(
            "[Reducer] subagent_end for unknown subagent {}",
            payload.subagent_id
        ),
    }
    Effects::none()
}

pub(super) fn progress_update(channel: &mut Channel, payload: ProgressUpdatePayload) -> Effects {
    if let Some(execution) = queries::execution_index_for(channel, &payload.context)
        .and_then(|index| queries::execution_at(channel, index))
        .filter(|e| e.is_running())
    {
        execution.progress_percent = payload.progress_percent;
        execution.progress_message = Some(payload.message);
    }
    Effects::none()
}
