//! Transport Seams
//!
//! The channel's outbound socket and the message history REST API are
//! external collaborators. They are injected behind these traits so the
//! manager can run against a real backend, a recording double, or nothing.

use async_trait::async_trait;
use tokio::sync::Mutex;

use agent_timeline_core::OutboundFrame;

use crate::models::command::EditOutcome;
use crate::utils::error::AppResult;

/// Outbound half of a channel's persistent connection
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Send one frame. Delivery is fire-and-forget.
    async fn send_frame(&self, channel_id: &str, frame: OutboundFrame) -> AppResult<()>;
}

/// Message history REST API
#[async_trait]
pub trait MessageHistoryApi: Send + Sync {
    /// Update a persisted message. With `truncate_and_regenerate`, every later
    /// message is deleted and the caller should trigger regeneration.
    async fn edit_message(
        &self,
        message_id: &str,
        content: &str,
        truncate_and_regenerate: bool,
    ) -> AppResult<EditOutcome>;

    /// Delete a persisted message
    async fn delete_message(&self, message_id: &str) -> AppResult<()>;
}

/// Transport that only logs outgoing frames
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingTransport;

#[async_trait]
impl ChannelTransport for LoggingTransport {
    async fn send_frame(&self, channel_id: &str, frame: OutboundFrame) -> AppResult<()> {
        let json = serde_json::to_string(&frame)?;
        tracing::info!("[Transport] {} -> {}", channel_id, json);
        Ok(())
    }
}

/// Transport that keeps every frame it was asked to send
#[derive(Debug, Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<(String, OutboundFrame)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent so far, in order
    pub async fn frames(&self) -> Vec<(String, OutboundFrame)> {
        self.frames.lock().await.clone()
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    async fn send_frame(&self, channel_id: &str, frame: OutboundFrame) -> AppResult<()> {
        self.frames
            .lock()
            .await
            .push((channel_id.to_string(), frame));
        Ok(())
    }
}

/// History API that accepts every request without persisting anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHistoryApi;

#[async_trait]
impl MessageHistoryApi for NoopHistoryApi {
    async fn edit_message(
        &self,
        message_id: &str,
        content: &str,
        truncate_and_regenerate: bool,
    ) -> AppResult<EditOutcome> {
        Ok(EditOutcome {
            message_id: message_id.to_string(),
            content: content.to_string(),
            deleted_count: 0,
            regenerate: truncate_and_regenerate,
        })
    }

    async fn delete_message(&self, _message_id: &str) -> AppResult<()> {
        Ok(())
    }
}
