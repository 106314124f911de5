//! Statistics Routes

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::server::server_core::ServerState;
use crate::server::types::ServerStats;

/// Get server statistics
pub async fn get_stats(State(state): State<Arc<ServerState>>) -> Json<ServerStats> {
    Json(state.get_stats().await)
}
