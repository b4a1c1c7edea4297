//! Channel Manager
//!
//! Registry of live channels. Each channel's state sits behind its own
//! `tokio::sync::Mutex`, and every mutation goes through [`ChannelReducer`]
//! while that lock is held, so events for one channel are applied one at a
//! time. Effects other than timer bookkeeping run after the lock is released.
//!
//! Lock order is always channel first, then the abort timer registry.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};

use agent_timeline_core::events::ErrorPayload;
use agent_timeline_core::{
    Channel, ChannelEffect, Effects, MessageRole, Notification, OutboundFrame, StreamEvent,
    TopicStatus,
};

use super::abort::AbortCoordinator;
use super::reconstruct;
use super::reducer::{queries, ChannelReducer, LocalAction, ToolDecision};
use super::status::derive_topic_status;
use super::transport::{ChannelTransport, MessageHistoryApi};
use crate::models::command::{EditMode, EditOutcome, SendMessageRequest, MAX_EDIT_CONTENT_LEN};
use crate::models::history::HistoryMessage;
use crate::models::settings::StreamSettings;
use crate::utils::error::{AppError, AppResult};
use crate::utils::ids::{is_persisted_id, new_client_id};

type ChannelHandle = Arc<Mutex<Channel>>;

const NOTIFICATION_CAPACITY: usize = 64;

struct ManagerInner {
    reducer: ChannelReducer,
    abort_timeout: Duration,
    channels: RwLock<HashMap<String, ChannelHandle>>,
    history_titles: RwLock<HashMap<String, String>>,
    abort: AbortCoordinator,
    transport: Arc<dyn ChannelTransport>,
    history_api: Arc<dyn MessageHistoryApi>,
    notifications: broadcast::Sender<Notification>,
}

/// Shared handle to the channel registry
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

impl ChannelManager {
    pub fn new(
        settings: &StreamSettings,
        transport: Arc<dyn ChannelTransport>,
        history_api: Arc<dyn MessageHistoryApi>,
    ) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                reducer: ChannelReducer::from_settings(settings),
                abort_timeout: settings.abort_timeout(),
                channels: RwLock::new(HashMap::new()),
                history_titles: RwLock::new(HashMap::new()),
                abort: AbortCoordinator::new(),
                transport,
                history_api,
                notifications,
            }),
        }
    }

    fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Register a channel. Opening an already open channel keeps its state.
    pub async fn open_channel(&self, channel_id: &str, session_id: &str, title: &str) {
        let mut channels = self.inner.channels.write().await;
        if channels.contains_key(channel_id) {
            return;
        }
        let mut channel = Channel::new(channel_id, session_id).with_title(title);
        channel.connected = true;
        channels.insert(channel_id.to_string(), Arc::new(Mutex::new(channel)));
        self.inner
            .history_titles
            .write()
            .await
            .insert(channel_id.to_string(), title.to_string());
        tracing::info!("[ChannelManager] Opened channel {} (session {})", channel_id, session_id);
    }

    /// Drop a channel and its pending abort timer
    pub async fn close_channel(&self, channel_id: &str) -> bool {
        let removed = self.inner.channels.write().await.remove(channel_id).is_some();
        if removed {
            self.inner.abort.disarm(channel_id).await;
        }
        removed
    }

    pub async fn channel_ids(&self) -> Vec<String> {
        self.inner.channels.read().await.keys().cloned().collect()
    }

    async fn handle(&self, channel_id: &str) -> AppResult<ChannelHandle> {
        self.inner
            .channels
            .read()
            .await
            .get(channel_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Channel {}", channel_id)))
    }

    /// Copy of a channel's current state
    pub async fn snapshot(&self, channel_id: &str) -> AppResult<Channel> {
        let handle = self.handle(channel_id).await?;
        let channel = handle.lock().await;
        Ok(channel.clone())
    }

    pub async fn topic_status(&self, channel_id: &str) -> AppResult<TopicStatus> {
        let handle = self.handle(channel_id).await?;
        let channel = handle.lock().await;
        Ok(derive_topic_status(&channel))
    }

    /// Title shown for the channel in the history list
    pub async fn history_title(&self, channel_id: &str) -> Option<String> {
        self.inner.history_titles.read().await.get(channel_id).cloned()
    }

    pub async fn set_connected(&self, channel_id: &str, connected: bool) -> AppResult<()> {
        let handle = self.handle(channel_id).await?;
        handle.lock().await.connected = connected;
        Ok(())
    }

    /// Default context sent with every user message on the channel
    pub async fn set_knowledge_context(
        &self,
        channel_id: &str,
        context: Option<Value>,
    ) -> AppResult<()> {
        let handle = self.handle(channel_id).await?;
        handle.lock().await.knowledge_context = context;
        Ok(())
    }

    /// Subscribe to user-facing notifications from every channel
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.inner.notifications.subscribe()
    }

    /// Number of abort timers currently armed
    pub async fn armed_abort_timers(&self) -> usize {
        self.inner.abort.armed_count().await
    }

    // ========================================================================
    // Inbound events
    // ========================================================================

    /// Apply one parsed event to a channel
    pub async fn dispatch(&self, channel_id: &str, event: StreamEvent) -> AppResult<()> {
        let target = self.route(channel_id, &event).await?;
        let handle = self.handle(&target).await?;
        let effects = {
            let mut channel = handle.lock().await;
            let effects = self.inner.reducer.apply(&mut channel, event, Utc::now());
            self.disarm_requested(&target, effects).await
        };
        self.run_effects(&target, effects).await
    }

    /// Parse and apply one raw frame. Frames that fail to parse are logged
    /// and dropped; returns whether the frame was applied.
    pub async fn dispatch_raw(&self, channel_id: &str, frame: Value) -> AppResult<bool> {
        match StreamEvent::from_value(frame) {
            Ok(event) => {
                self.dispatch(channel_id, event).await?;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!("[ChannelManager] Dropping frame on {}: {}", channel_id, e);
                Ok(false)
            }
        }
    }

    /// Feed a stream of raw frames into a channel until it ends. Returns the
    /// number of frames applied.
    pub async fn drive<S>(&self, channel_id: &str, frames: S) -> AppResult<usize>
    where
        S: Stream<Item = Value>,
    {
        futures_util::pin_mut!(frames);
        let mut applied = 0;
        while let Some(frame) = frames.next().await {
            if self.dispatch_raw(channel_id, frame).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Nested-run events may arrive on a different channel of the same
    /// session than the one holding their parent execution. Other channels
    /// are only read here; the event is applied by the owner.
    async fn route(&self, channel_id: &str, event: &StreamEvent) -> AppResult<String> {
        let Some(context) = event.execution_context() else {
            return Ok(channel_id.to_string());
        };
        let nested = matches!(
            event,
            StreamEvent::SubagentStart(_) | StreamEvent::SubagentEnd(_)
        ) || context.parent_execution_id.is_some();
        if !nested {
            return Ok(channel_id.to_string());
        }

        let session_id = {
            let handle = self.handle(channel_id).await?;
            let channel = handle.lock().await;
            if queries::execution_index_exact(&channel, context).is_some() {
                return Ok(channel_id.to_string());
            }
            channel.session_id.clone()
        };

        let others: Vec<(String, ChannelHandle)> = self
            .inner
            .channels
            .read()
            .await
            .iter()
            .filter(|(id, _)| id.as_str() != channel_id)
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();
        for (id, handle) in others {
            let channel = handle.lock().await;
            if channel.session_id == session_id
                && queries::execution_index_exact(&channel, context).is_some()
            {
                tracing::debug!(
                    "[ChannelManager] Routing {} for {} from {} to {}",
                    event.kind(),
                    context.execution_id,
                    channel_id,
                    id
                );
                return Ok(id);
            }
        }
        Ok(channel_id.to_string())
    }

    /// Replace a channel's messages with persisted history
    pub async fn seed_history(
        &self,
        channel_id: &str,
        history: Vec<HistoryMessage>,
    ) -> AppResult<()> {
        let handle = self.handle(channel_id).await?;
        let mut channel = handle.lock().await;
        reconstruct::seed_history(&mut channel, history, Utc::now());
        Ok(())
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Send a user message. Returns the message's local id.
    pub async fn send_message(
        &self,
        channel_id: &str,
        request: SendMessageRequest,
    ) -> AppResult<String> {
        if request.message.trim().is_empty() && request.file_ids.is_empty() {
            return Err(AppError::validation("Message is empty"));
        }

        let handle = self.handle(channel_id).await?;
        let client_id = new_client_id("user");
        let effects = {
            let mut channel = handle.lock().await;
            if channel.responding || channel.aborting {
                return Err(AppError::validation(
                    "A response is already in progress on this channel",
                ));
            }
            self.inner.reducer.apply_local(
                &mut channel,
                LocalAction::UserMessage {
                    client_id: client_id.clone(),
                    content: request.message,
                    file_ids: request.file_ids,
                    context: request.context,
                },
                Utc::now(),
            )
        };

        if let Err(e) = self.run_effects(channel_id, effects).await {
            // Nothing will answer a message that never left
            let failure = StreamEvent::Error(ErrorPayload {
                message: format!("Failed to send message: {}", e),
                error_code: None,
            });
            self.dispatch(channel_id, failure).await?;
            return Err(e);
        }
        Ok(client_id)
    }

    /// Ask the backend to stop the current generation. Returns `false` when
    /// nothing was in flight.
    pub async fn abort_generation(&self, channel_id: &str) -> AppResult<bool> {
        let handle = self.handle(channel_id).await?;
        let effects = {
            let mut channel = handle.lock().await;
            let effects = self.inner.reducer.apply_local(
                &mut channel,
                LocalAction::AbortRequested,
                Utc::now(),
            );
            if effects.contains(|e| matches!(e, ChannelEffect::SendFrame(OutboundFrame::Abort))) {
                self.arm_abort_timer(channel_id).await;
            }
            effects
        };

        let requested = !effects.is_empty();
        if let Err(e) = self.run_effects(channel_id, effects).await {
            tracing::warn!(
                "[ChannelManager] Abort frame not delivered on {}, waiting for timeout: {}",
                channel_id,
                e
            );
        }
        Ok(requested)
    }

    async fn arm_abort_timer(&self, channel_id: &str) {
        let manager = self.downgrade();
        let channel = channel_id.to_string();
        self.inner
            .abort
            .arm(channel_id, self.inner.abort_timeout, move |generation| async move {
                if let Some(inner) = manager.upgrade() {
                    ChannelManager { inner }
                        .expire_abort(&channel, generation)
                        .await;
                }
            })
            .await;
    }

    async fn expire_abort(&self, channel_id: &str, generation: u64) {
        let Ok(handle) = self.handle(channel_id).await else {
            return;
        };
        let effects = {
            let mut channel = handle.lock().await;
            if !self.inner.abort.take_if_current(channel_id, generation).await {
                return;
            }
            if !channel.aborting {
                tracing::debug!("[ChannelManager] Abort on {} already settled", channel_id);
                return;
            }
            let effects = self.inner.reducer.apply_local(
                &mut channel,
                LocalAction::AbortTimedOut,
                Utc::now(),
            );
            self.disarm_requested(channel_id, effects).await
        };
        if let Err(e) = self.run_effects(channel_id, effects).await {
            tracing::warn!("[ChannelManager] Effects after abort timeout failed: {}", e);
        }
    }

    /// Approve a tool call. Returns `false` if it was not waiting.
    pub async fn confirm_tool_call(&self, channel_id: &str, tool_call_id: &str) -> AppResult<bool> {
        self.decide_tool_call(channel_id, tool_call_id, ToolDecision::Confirm)
            .await
    }

    /// Reject a tool call. Returns `false` if it was not waiting.
    pub async fn cancel_tool_call(&self, channel_id: &str, tool_call_id: &str) -> AppResult<bool> {
        self.decide_tool_call(channel_id, tool_call_id, ToolDecision::Cancel)
            .await
    }

    async fn decide_tool_call(
        &self,
        channel_id: &str,
        tool_call_id: &str,
        decision: ToolDecision,
    ) -> AppResult<bool> {
        let effects = self
            .apply_local(
                channel_id,
                LocalAction::ToolCallDecided {
                    tool_call_id: tool_call_id.to_string(),
                    decision,
                },
            )
            .await?;
        let decided = !effects.is_empty();
        self.run_effects(channel_id, effects).await?;
        Ok(decided)
    }

    /// Edit a persisted message through the history API
    pub async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
        mode: EditMode,
    ) -> AppResult<EditOutcome> {
        require_persisted(message_id, "edit")?;
        if content.trim().is_empty() {
            return Err(AppError::validation("Edited content is empty"));
        }
        if content.chars().count() > MAX_EDIT_CONTENT_LEN {
            return Err(AppError::validation(format!(
                "Edited content exceeds {} characters",
                MAX_EDIT_CONTENT_LEN
            )));
        }

        {
            let handle = self.handle(channel_id).await?;
            let channel = handle.lock().await;
            let message = channel.message(message_id).ok_or_else(|| {
                AppError::not_found(format!("Message {} in channel {}", message_id, channel_id))
            })?;
            if mode.truncates() {
                if message.role != MessageRole::User {
                    return Err(AppError::validation(
                        "Only user messages can be edited with regeneration",
                    ));
                }
                if channel.responding || channel.aborting {
                    return Err(AppError::validation(
                        "Cannot regenerate while a response is in progress",
                    ));
                }
            }
        }

        let outcome = self
            .inner
            .history_api
            .edit_message(message_id, content, mode.truncates())
            .await?;
        let effects = self
            .apply_local(
                channel_id,
                LocalAction::MessageEdited {
                    message_id: message_id.to_string(),
                    content: outcome.content.clone(),
                    truncate: mode.truncates(),
                    regenerate: outcome.regenerate,
                },
            )
            .await?;
        self.run_effects(channel_id, effects).await?;
        Ok(outcome)
    }

    /// Delete a persisted message through the history API
    pub async fn delete_message(&self, channel_id: &str, message_id: &str) -> AppResult<()> {
        require_persisted(message_id, "delete")?;
        self.handle(channel_id).await?;
        self.inner.history_api.delete_message(message_id).await?;
        let effects = self
            .apply_local(
                channel_id,
                LocalAction::MessageDeleted {
                    message_id: message_id.to_string(),
                },
            )
            .await?;
        self.run_effects(channel_id, effects).await
    }

    // ========================================================================
    // Effects
    // ========================================================================

    async fn apply_local(&self, channel_id: &str, action: LocalAction) -> AppResult<Effects> {
        let handle = self.handle(channel_id).await?;
        let mut channel = handle.lock().await;
        let effects = self
            .inner
            .reducer
            .apply_local(&mut channel, action, Utc::now());
        Ok(self.disarm_requested(channel_id, effects).await)
    }

    /// Handle timer bookkeeping while the channel lock is still held, so a
    /// stale disarm can never cancel a timer armed by a later abort.
    async fn disarm_requested(&self, channel_id: &str, effects: Effects) -> Effects {
        let mut rest = Effects::none();
        for effect in effects {
            match effect {
                ChannelEffect::DisarmAbortTimer => {
                    self.inner.abort.disarm(channel_id).await;
                }
                other => rest.push(other),
            }
        }
        rest
    }

    /// Run declared effects. Every effect is attempted; the first transport
    /// failure is returned.
    async fn run_effects(&self, channel_id: &str, effects: Effects) -> AppResult<()> {
        let mut first_error = None;
        for effect in effects {
            match effect {
                ChannelEffect::SendFrame(frame) => {
                    if let Err(e) = self.inner.transport.send_frame(channel_id, frame).await {
                        tracing::warn!(
                            "[ChannelManager] Failed to send frame on {}: {}",
                            channel_id,
                            e
                        );
                        first_error.get_or_insert(e);
                    }
                }
                ChannelEffect::Notify(notification) => {
                    if self.inner.notifications.send(notification).is_err() {
                        tracing::debug!("[ChannelManager] Notification dropped, no subscribers");
                    }
                }
                ChannelEffect::RenameHistory { channel_id, title } => {
                    self.inner
                        .history_titles
                        .write()
                        .await
                        .insert(channel_id, title);
                }
                ChannelEffect::DisarmAbortTimer => {
                    self.inner.abort.disarm(channel_id).await;
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Only server-assigned ids can be sent to the history API
fn require_persisted(message_id: &str, action: &str) -> AppResult<()> {
    if is_persisted_id(message_id) {
        return Ok(());
    }
    Err(AppError::validation(format!(
        "Cannot {} message {}: it has not been saved yet",
        action, message_id
    )))
}
