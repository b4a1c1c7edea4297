//! Health Check Commands
//!
//! Reports whether the configuration is usable and how many channels are open.

use crate::models::response::{CommandResponse, HealthResponse};
use crate::state::AppState;

/// Get the health status of the backend
pub async fn get_health(state: &AppState) -> CommandResponse<HealthResponse> {
    let mut health = HealthResponse::default();
    health.config = state.is_config_healthy();
    health.channels = state.channels().channel_ids().await.len();

    health.status = if health.config {
        "healthy".to_string()
    } else {
        "degraded".to_string()
    };

    CommandResponse::ok(health)
}
