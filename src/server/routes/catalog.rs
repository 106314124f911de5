//! Language and voice discovery routes

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::server::server_core::ServerState;
use crate::server::types::{ApiError, LanguagesResponse, VoicesResponse};
use crate::text::Language;
use crate::voice::{catalog, VoiceId};

/// Supported languages and the configured default
pub async fn list_languages(State(state): State<Arc<ServerState>>) -> Json<LanguagesResponse> {
    Json(LanguagesResponse {
        languages: Language::all().iter().map(|l| l.code().to_string()).collect(),
        default: state.pipeline.defaults().language.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct VoicesQuery {
    #[serde(default)]
    pub language: Option<String>,
}

/// Catalog voices, optionally narrowed to one language's endpoints
pub async fn list_voices(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<VoicesQuery>,
) -> Result<Json<VoicesResponse>, ApiError> {
    let language = match query.language.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(code) => Some(code.parse::<Language>()?),
        None => None,
    };

    let endpoints = catalog()
        .into_iter()
        .filter(|key| language.map_or(true, |l| key.language == l))
        .map(|key| key.name())
        .collect();

    Ok(Json(VoicesResponse {
        voices: VoiceId::all().iter().map(|v| v.to_string()).collect(),
        default: state.pipeline.defaults().voice.clone(),
        language: language.map(|l| l.code().to_string()),
        endpoints,
        note: "All voices support all languages".to_string(),
    }))
}
