//! Commands
//!
//! Entry points for the UI. Each command takes the shared [`AppState`] and
//! returns a [`CommandResponse`] envelope.
//!
//! [`AppState`]: crate::state::AppState
//! [`CommandResponse`]: crate::models::response::CommandResponse

pub mod chat;
pub mod health;
pub mod settings;

pub use chat::*;
pub use health::*;
pub use settings::*;
