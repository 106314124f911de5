//! # Supertonic-TTS - Streaming TTS serving layer
//!
//! A local text-to-speech service between a home-automation controller and a
//! neural synthesis engine. Text is normalized, split into sentence-sized
//! segments, synthesized with bounded pipelining and delivered strictly in
//! order, so playback can start before the whole utterance is rendered.
//!
//! ## Features
//!
//! - **Streaming pipeline**: up to K segments in flight, in-order delivery, back-pressure
//! - **Voice cache**: single-flight loading, reference-counted handles, idle eviction
//! - **Engine gate**: process-wide FIFO limit on concurrent engine calls
//! - **Transports**: REST (`/api/tts` returning WAV) and the Wyoming TCP protocol
//! - **5 languages x 10 voices**: en, fr, es, pt, ko with voices M1-M5 and F1-F5
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use supertonic_tts::engine::{create_engine, EngineConfig};
//! use supertonic_tts::inference::{PipelineConfig, SynthesisDefaults, SynthesisPipeline, TtsParams};
//! use supertonic_tts::voice::VoiceCacheConfig;
//!
//! let engine = create_engine(&EngineConfig::default())?;
//! let pipeline = SynthesisPipeline::from_parts(
//!     engine,
//!     1,
//!     &VoiceCacheConfig::default(),
//!     PipelineConfig::default(),
//!     SynthesisDefaults::default(),
//! )?;
//!
//! let request = pipeline.accept(TtsParams::text("Bonjour tout le monde."))?;
//! let mut stream = pipeline.start(request);
//! while let Some(event) = stream.next_event().await {
//!     // SessionEvent::Segment(..) in index order, then Completed or Failed
//! }
//! ```

pub mod audio;
pub mod core;
pub mod engine;
pub mod inference;
pub mod server;
pub mod streaming;
pub mod text;
pub mod voice;
pub mod wyoming;

// Core re-exports
pub use core::error::{Result, TtsError};

// Pipeline re-exports
pub use inference::{PipelineConfig, SynthesisDefaults, SynthesisPipeline, TtsParams, UtteranceRequest};
pub use streaming::{AudioSegment, SessionEvent, SessionState, StreamHandle};

// Text and voice re-exports
pub use text::{normalize, segment, Language, NormalizedText, Segment};
pub use voice::{VoiceHandle, VoiceId, VoiceKey, VoiceResolver};

// Engine re-exports
pub use engine::{create_engine, EngineConfig, EngineGate, SynthesisEngine, VoiceModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name reported to clients
pub const SERVICE_NAME: &str = "Supertonic TTS";
