//! Message Identity Helpers
//!
//! Locally created messages get opaque client ids; the server assigns a UUID
//! once a message is persisted. Commands that hit the REST API only accept
//! persisted ids.

use uuid::Uuid;

/// Generate a local message id with a readable prefix
pub fn new_client_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Whether an id was assigned by the server
pub fn is_persisted_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}
