//! TTS Server Module
//!
//! HTTP front end of the synthesis service:
//! - `GET|POST /api/tts` returning one WAV file per request
//! - Language and voice discovery endpoints
//! - Health and statistics endpoints
//! - Layered configuration shared with the Wyoming listener

pub mod config;
pub mod middleware;
pub mod routes;
pub mod server_core;
pub mod types;

pub use config::{AddonOptions, LoggingConfig, ServerConfig, WyomingConfig, ADDON_OPTIONS_PATH};
pub use middleware::{HttpMetrics, HttpSummary, RouteSummary};
pub use server_core::{create_router, shutdown_signal, ServerState, TtsServer};
pub use types::{ApiError, ErrorResponse, HealthResponse, LanguagesResponse, ServerStats, VoicesResponse};
