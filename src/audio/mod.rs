//! Audio processing modules
//!
//! - Volume gain and speed time-scaling applied to each synthesized segment
//! - WAV and raw PCM encoding for the delivery adapters

mod output;
mod transform;

pub use output::{to_i16, AudioOutput, SAMPLE_WIDTH};
pub use transform::{apply_gain, time_scale};
