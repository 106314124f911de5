//! Inference module for streaming text-to-speech
//!
//! - UtteranceRequest: validated request built from raw parameters
//! - SynthesisPipeline: per-request orchestration and in-order delivery
//! - PipelineConfig: pipelining, deadline and text-processing settings

mod pipeline;
mod request;

pub use pipeline::{PipelineConfig, PipelineStats, SynthesisPipeline};
pub use request::{
    ParamValue, SynthesisDefaults, TtsParams, UtteranceRequest, QUALITY_RANGE, SPEED_RANGE, VOLUME_RANGE,
};
