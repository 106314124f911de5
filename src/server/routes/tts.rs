//! Synthesis Routes
//!
//! `GET /api/tts` takes query parameters; `POST /api/tts` also accepts a JSON
//! body whose fields override the query string. The whole utterance is
//! buffered and returned as one WAV file.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::audio::AudioOutput;
use crate::core::error::TtsError;
use crate::inference::TtsParams;
use crate::server::server_core::ServerState;
use crate::server::types::ApiError;

/// Download name of the synthesized file
pub const OUTPUT_FILENAME: &str = "tts_output.wav";

/// Synthesize from query parameters
pub async fn synthesize_get(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<TtsParams>,
) -> Result<Response, ApiError> {
    synthesize(&state, params).await
}

/// Synthesize from an optional JSON body layered over the query
pub async fn synthesize_post(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<TtsParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let overrides = if body.iter().all(u8::is_ascii_whitespace) {
        TtsParams::default()
    } else {
        serde_json::from_slice::<TtsParams>(&body)
            .map_err(|e| TtsError::invalid("body", format!("invalid JSON body: {}", e)))?
    };
    synthesize(&state, query.merge(overrides)).await
}

async fn synthesize(state: &ServerState, params: TtsParams) -> Result<Response, ApiError> {
    let request = state.pipeline.accept(params)?;
    let request_id = request.id;
    let audio = state.pipeline.synthesize(request).await?;
    let wav = AudioOutput::to_wav_bytes(&audio.samples, audio.sample_rate)?;
    debug!(%request_id, bytes = wav.len(), duration_secs = audio.duration_secs(), "sending WAV response");

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", OUTPUT_FILENAME),
            ),
        ],
        wav,
    )
        .into_response())
}
