//! Data Models
//!
//! Contains the data structures used by commands, storage, and history seeding.

pub mod command;
pub mod history;
pub mod response;
pub mod settings;

pub use command::*;
pub use history::*;
pub use response::*;
pub use settings::*;
