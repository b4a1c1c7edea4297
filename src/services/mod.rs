//! Services
//!
//! Channel state machine and the services around it. Commands call into the
//! [`ChannelManager`]; everything below it is synchronous reduction except
//! the abort timer and the transport seams.

pub mod abort;
pub mod channel_manager;
pub mod reconstruct;
pub mod reducer;
pub mod status;
pub mod transport;

pub use abort::AbortCoordinator;
pub use channel_manager::ChannelManager;
pub use reconstruct::{reconstruct_execution, seed_history};
pub use reducer::{ChannelReducer, ChunkMergePolicy, LocalAction, ToolDecision};
pub use status::derive_topic_status;
pub use transport::{
    ChannelTransport, LoggingTransport, MessageHistoryApi, NoopHistoryApi, RecordingTransport,
};
