//! Health Check Routes

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::server::server_core::ServerState;
use crate::server::types::HealthResponse;
use crate::text::Language;
use crate::voice::VoiceId;

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let loaded_voices = state
        .pipeline
        .voices()
        .cached_voices()
        .into_iter()
        .map(|voice| voice.name)
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        service: crate::SERVICE_NAME.to_string(),
        version: crate::VERSION.to_string(),
        engine: state.pipeline.engine().info().name.clone(),
        languages: Language::all().iter().map(|l| l.code().to_string()).collect(),
        voices: VoiceId::all().iter().map(|v| v.to_string()).collect(),
        loaded_voices,
        uptime: state.uptime().as_secs(),
    })
}
