//! Server Types
//!
//! Response bodies and the HTTP mapping of synthesis errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::error::TtsError;
use crate::engine::GateStats;
use crate::inference::PipelineStats;
use crate::server::middleware::HttpSummary;
use crate::voice::{CachedVoice, VoiceCacheStats};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status
    pub status: String,

    /// Service name
    pub service: String,

    /// Version
    pub version: String,

    /// Engine name
    pub engine: String,

    /// Supported language codes
    pub languages: Vec<String>,

    /// Catalog voice ids
    pub voices: Vec<String>,

    /// Voices currently resident, as `<language>-<voice>`
    #[serde(default)]
    pub loaded_voices: Vec<String>,

    /// Uptime (seconds)
    pub uptime: u64,
}

/// Language list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguagesResponse {
    pub languages: Vec<String>,
    pub default: String,
}

/// Voice list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<String>,
    pub default: String,

    /// Language filter, when one was given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Voice endpoints, `<language>-<voice>`
    pub endpoints: Vec<String>,

    pub note: String,
}

/// Server statistics
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    /// Uptime (seconds)
    pub uptime: u64,
    pub http: HttpSummary,
    pub sessions: PipelineStats,
    pub engine: GateStats,
    pub voice_cache: VoiceCacheStats,
    pub loaded_voices: Vec<CachedVoice>,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,

    /// Error code
    pub code: String,

    /// Details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Segment that failed, for engine errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<usize>,
}

/// A synthesis error on its way to an HTTP client
#[derive(Debug)]
pub struct ApiError(pub TtsError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TtsError::InvalidParameter { .. } | TtsError::UnsupportedVoice { .. } => StatusCode::BAD_REQUEST,
            TtsError::ModelLoad { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TtsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            // Nobody is left to read this; nginx convention for a vanished client
            TtsError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            TtsError::Engine { .. } | TtsError::Config { .. } | TtsError::Io { .. } | TtsError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn body(&self) -> ErrorResponse {
        let err = &self.0;
        let segment = match err {
            TtsError::Engine { segment, .. } => *segment,
            _ => None,
        };
        let (error, details) = match err {
            TtsError::InvalidParameter { message, .. } => (message.clone(), None),
            TtsError::UnsupportedVoice { .. } => (err.to_string(), None),
            _ => ("TTS generation failed".to_string(), Some(err.to_string())),
        };
        ErrorResponse {
            error,
            code: err.code().to_string(),
            details,
            segment,
        }
    }
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self.0, TtsError::Cancelled) {
            info!("request cancelled before a response was written");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (TtsError::invalid("text", "Missing 'text' parameter"), 400),
            (
                TtsError::UnsupportedVoice {
                    voice: "M9".into(),
                    available: "M1".into(),
                },
                400,
            ),
            (TtsError::model_load("fr-M4", "missing"), 503),
            (TtsError::engine("boom", false), 500),
            (TtsError::internal("bug"), 500),
            (TtsError::Timeout { duration_ms: 10 }, 504),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status().as_u16(), status);
        }
    }

    #[test]
    fn test_missing_text_body() {
        let body = ApiError(TtsError::invalid("text", "Missing 'text' parameter")).body();
        assert_eq!(body.error, "Missing 'text' parameter");
        assert_eq!(body.code, "invalid_parameter");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_engine_error_body() {
        let body = ApiError(TtsError::engine("exploded", false).at_segment(1)).body();
        assert_eq!(body.error, "TTS generation failed");
        assert_eq!(body.segment, Some(1));
        assert!(body.details.unwrap().contains("exploded"));
    }
}
