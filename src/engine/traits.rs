//! Core traits for the synthesis engine capability
//!
//! The serving layer consumes a neural engine through two blocking calls:
//! loading a voice model and running inference for one piece of text.
//! Both are CPU/GPU-bound and are always invoked off the async runtime,
//! behind the engine gate.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::error::Result;
use crate::voice::VoiceKey;

/// Static description of an engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    /// Engine identifier
    pub name: String,
    /// Fixed output sample rate in Hz
    pub sample_rate: u32,
    /// Engine applies `speed` itself; otherwise the pipeline time-scales
    pub native_speed: bool,
}

/// Per-call inference parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferParams {
    /// 1..=10, mapped to refinement steps; higher costs more
    pub quality: u8,
    /// Speaking rate multiplier, honoured only by native-speed engines
    pub speed: f32,
}

/// A loaded voice model
///
/// Engines downcast through `as_any` to reach their own model type.
pub trait VoiceModel: Send + Sync + fmt::Debug {
    fn key(&self) -> VoiceKey;

    fn as_any(&self) -> &dyn Any;
}

/// Synthesis engine capability
pub trait SynthesisEngine: Send + Sync {
    /// Get engine information
    fn info(&self) -> &EngineInfo;

    /// Load the model for one (language, voice) pair. Blocking.
    fn load_voice(&self, key: VoiceKey) -> Result<Arc<dyn VoiceModel>>;

    /// Synthesize mono f32 samples at `info().sample_rate`. Blocking.
    fn infer(&self, model: &dyn VoiceModel, text: &str, params: &InferParams) -> Result<Vec<f32>>;
}
