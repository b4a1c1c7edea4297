//! Utilities
//!
//! Common utilities used throughout the application.

pub mod error;
pub mod ids;
pub mod paths;

pub use error::*;
pub use ids::*;
pub use paths::*;
