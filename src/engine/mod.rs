//! Synthesis engine abstraction
//!
//! The neural engine is an external collaborator reached through the
//! [`SynthesisEngine`] capability. Every call goes through the shared
//! [`EngineGate`].
//!
//! # Engines
//! - **preview**: deterministic tone renderer, no model needed
//! - **process**: external synthesizer command, one run per segment

pub mod config;
pub mod gate;
pub mod preview;
pub mod process;
pub mod traits;

use std::sync::Arc;

use tracing::info;

pub use config::{EngineConfig, EngineKind};
pub use gate::{EngineGate, GateStats};
pub use preview::PreviewEngine;
pub use process::ProcessEngine;
pub use traits::{EngineInfo, InferParams, SynthesisEngine, VoiceModel};

use crate::core::error::{Result, TtsError};

/// Build the configured engine
pub fn create_engine(config: &EngineConfig) -> Result<Arc<dyn SynthesisEngine>> {
    config.validate()?;

    let engine: Arc<dyn SynthesisEngine> = match config.kind {
        EngineKind::Preview => Arc::new(PreviewEngine::new(config.sample_rate, config.voices_dir.clone())),
        EngineKind::Process => {
            let command = config
                .command
                .clone()
                .ok_or_else(|| TtsError::config("engine.command is required for the process engine"))?;
            let voices_dir = config
                .voices_dir
                .clone()
                .ok_or_else(|| TtsError::config("engine.voices_dir is required for the process engine"))?;
            Arc::new(ProcessEngine::new(command, config.args.clone(), voices_dir, config.sample_rate))
        }
    };

    let engine_info = engine.info();
    info!(
        engine = %engine_info.name,
        sample_rate = engine_info.sample_rate,
        native_speed = engine_info.native_speed,
        "synthesis engine ready"
    );
    Ok(engine)
}
