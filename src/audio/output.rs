//! Audio output encoding
//!
//! Provides:
//! - WAV encoding to memory (REST responses)
//! - WAV file saving (CLI)
//! - Raw 16-bit little-endian PCM (streaming chunks)

use std::io::Cursor;
use std::path::Path;

use crate::core::error::{Result, TtsError};

/// Bytes per sample of the 16-bit PCM produced here
pub const SAMPLE_WIDTH: u16 = 2;

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Convert one normalized sample to 16-bit PCM
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Audio output encoder
pub struct AudioOutput;

impl AudioOutput {
    /// Encode samples as an in-memory 16-bit PCM mono WAV file
    pub fn to_wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))?;
            for &sample in samples {
                writer.write_sample(to_i16(sample))?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Save audio samples to a WAV file (16-bit PCM)
    pub fn save<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = hound::WavWriter::create(path, wav_spec(sample_rate)).map_err(|e| TtsError::Io {
            message: format!("cannot create WAV file: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        for &sample in samples {
            writer.write_sample(to_i16(sample))?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Raw little-endian 16-bit PCM
    pub fn to_pcm16_le(samples: &[f32]) -> Vec<u8> {
        samples
            .iter()
            .flat_map(|&sample| to_i16(sample).to_le_bytes())
            .collect()
    }
}
