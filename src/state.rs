//! Application State
//!
//! Shared state handed to every command: the configuration service and the
//! channel manager.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::settings::{AppConfig, SettingsUpdate, StreamSettings};
use crate::services::channel_manager::ChannelManager;
use crate::services::transport::{ChannelTransport, MessageHistoryApi};
use crate::storage::ConfigService;
use crate::utils::error::{AppError, AppResult};

/// Application state
pub struct AppState {
    /// Configuration service for app settings
    config: Arc<RwLock<Option<ConfigService>>>,
    /// Live channels
    channels: ChannelManager,
}

impl AppState {
    /// Build state around an opened config service
    pub fn new(
        config: ConfigService,
        transport: Arc<dyn ChannelTransport>,
        history_api: Arc<dyn MessageHistoryApi>,
    ) -> Self {
        let channels = ChannelManager::new(&config.get_config().stream, transport, history_api);
        Self {
            config: Arc::new(RwLock::new(Some(config))),
            channels,
        }
    }

    /// Build state from the config file in the user's data directory
    pub fn initialize(
        transport: Arc<dyn ChannelTransport>,
        history_api: Arc<dyn MessageHistoryApi>,
    ) -> AppResult<Self> {
        let config = ConfigService::new()?;
        Ok(Self::new(config, transport, history_api))
    }

    /// State without a config service, using default settings
    pub fn detached(
        transport: Arc<dyn ChannelTransport>,
        history_api: Arc<dyn MessageHistoryApi>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(None)),
            channels: ChannelManager::new(&StreamSettings::default(), transport, history_api),
        }
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// Check if config is healthy
    pub fn is_config_healthy(&self) -> bool {
        if let Ok(guard) = self.config.try_read() {
            if let Some(ref config) = *guard {
                return config.is_healthy();
            }
        }
        false
    }

    /// Get the current configuration
    pub async fn get_config(&self) -> AppResult<AppConfig> {
        let guard = self.config.read().await;
        match &*guard {
            Some(config) => Ok(config.get_config_clone()),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Update the configuration. Stream settings are read when the channel
    /// manager is built, so they apply from the next start.
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.config.write().await;
        match &mut *guard {
            Some(config) => config.update_config(update),
            None => Err(AppError::config("Config service not initialized")),
        }
    }
}
