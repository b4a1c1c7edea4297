//! Agent Timeline
//!
//! Client-side reducer for streamed AI agent executions. Server events are
//! folded into per-channel message timelines with phases, tool calls, and
//! nested subagents. It includes:
//! - The channel reducer and its named queries
//! - Abort coordination with a local timeout fallback
//! - Reconstruction of executions from persisted metadata
//! - Commands, configuration, and the transport seams

pub mod commands;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export commonly used items from commands
pub use commands::{
    // Chat commands
    abort_generation, cancel_tool_call, close_channel, confirm_tool_call, delete_message,
    edit_message, get_channel, get_topic_status, load_history, open_channel, send_message,
    // Health commands
    get_health,
    // Settings commands
    get_settings, update_settings,
};
pub use models::response::*;
pub use models::settings::{AppConfig, SettingsUpdate, StreamSettings};
pub use services::{ChannelManager, ChannelReducer};
pub use state::AppState;
pub use utils::error::{AppError, AppResult};
