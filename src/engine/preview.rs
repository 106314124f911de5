//! Preview engine
//!
//! A deterministic stand-in for the neural engine. Each spoken character
//! becomes a short tone whose pitch depends on the voice, and punctuation
//! becomes silence. Useful for wiring checks, demos and tests where no model
//! is installed.

use std::any::Any;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::traits::{EngineInfo, InferParams, SynthesisEngine, VoiceModel};
use crate::core::error::{Result, TtsError};
use crate::voice::{Gender, VoiceKey};

const TONE_MS: u32 = 55;
const WORD_GAP_MS: u32 = 40;
const CLAUSE_PAUSE_MS: u32 = 120;
const SENTENCE_PAUSE_MS: u32 = 250;
const AMPLITUDE: f32 = 0.25;

/// Voice loaded by the preview engine
#[derive(Debug, Clone)]
pub struct PreviewVoice {
    key: VoiceKey,
    /// Base pitch in Hz
    pub pitch_hz: f32,
    /// Style file the voice was read from, if any
    pub style_path: Option<PathBuf>,
}

impl VoiceModel for PreviewVoice {
    fn key(&self) -> VoiceKey {
        self.key
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Deterministic tone renderer
#[derive(Debug)]
pub struct PreviewEngine {
    info: EngineInfo,
    voices_dir: Option<PathBuf>,
}

impl PreviewEngine {
    /// Engine that reads `<voices_dir>/<voice>.json` style files when a
    /// directory is given, and derives voices from their id otherwise
    pub fn new(sample_rate: u32, voices_dir: Option<PathBuf>) -> Self {
        Self {
            info: EngineInfo {
                name: "preview".to_string(),
                sample_rate,
                native_speed: false,
            },
            voices_dir,
        }
    }

    fn default_pitch(key: &VoiceKey) -> f32 {
        let n = key.voice.number() as f32;
        match key.voice.gender() {
            Gender::Male => 100.0 + 12.0 * n,
            Gender::Female => 190.0 + 15.0 * n,
        }
    }

    fn read_style(path: &Path, key: &VoiceKey) -> Result<Value> {
        let content = std::fs::read_to_string(path).map_err(|e| TtsError::ModelLoad {
            voice: key.to_string(),
            message: format!("cannot read voice style: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        serde_json::from_str(&content).map_err(|e| TtsError::ModelLoad {
            voice: key.to_string(),
            message: format!("corrupt voice style: {}", e),
            path: Some(path.to_path_buf()),
        })
    }

    fn render(&self, voice: &PreviewVoice, text: &str) -> Vec<f32> {
        let rate = self.info.sample_rate as f32;
        let ms = |n: u32| (rate * n as f32 / 1000.0) as usize;
        let mut samples = Vec::new();

        for c in text.chars() {
            if c.is_alphanumeric() {
                let step = (c as u32 % 12) as f32;
                let freq = voice.pitch_hz * (1.0 + step / 24.0);
                let len = ms(TONE_MS);
                samples.extend((0..len).map(|i| {
                    let t = i as f32 / rate;
                    // Raised-cosine envelope avoids clicks between tones
                    let env = 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos();
                    AMPLITUDE * env * (2.0 * PI * freq * t).sin()
                }));
            } else {
                let pause = match c {
                    '.' | '!' | '?' | '…' => SENTENCE_PAUSE_MS,
                    ',' | ';' | ':' => CLAUSE_PAUSE_MS,
                    c if c.is_whitespace() => WORD_GAP_MS,
                    _ => 0,
                };
                samples.resize(samples.len() + ms(pause), 0.0);
            }
        }

        samples
    }
}

/// Moving-average passes; more passes cost more and sound smoother
fn refine(samples: &mut [f32], passes: u8) {
    if samples.len() < 3 {
        return;
    }
    for _ in 0..passes {
        let mut prev = samples[0];
        for i in 1..samples.len() - 1 {
            let current = samples[i];
            samples[i] = (prev + current + samples[i + 1]) / 3.0;
            prev = current;
        }
    }
}

impl SynthesisEngine for PreviewEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    fn load_voice(&self, key: VoiceKey) -> Result<Arc<dyn VoiceModel>> {
        let mut voice = PreviewVoice {
            key,
            pitch_hz: Self::default_pitch(&key),
            style_path: None,
        };

        if let Some(dir) = &self.voices_dir {
            let path = dir.join(format!("{}.json", key.voice));
            let style = Self::read_style(&path, &key)?;
            if let Some(pitch) = style.get("pitch_hz").and_then(Value::as_f64) {
                voice.pitch_hz = pitch as f32;
            }
            voice.style_path = Some(path);
        }

        debug!(voice = %key, pitch_hz = voice.pitch_hz, "preview voice loaded");
        Ok(Arc::new(voice))
    }

    fn infer(&self, model: &dyn VoiceModel, text: &str, params: &InferParams) -> Result<Vec<f32>> {
        let voice = model
            .as_any()
            .downcast_ref::<PreviewVoice>()
            .ok_or_else(|| TtsError::engine("voice was not loaded by the preview engine", false))?;

        let mut samples = self.render(voice, text);
        refine(&mut samples, params.quality);
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceKey;

    fn key(name: &str) -> VoiceKey {
        VoiceKey::from_name(name).unwrap()
    }

    fn params(quality: u8) -> InferParams {
        InferParams { quality, speed: 1.0 }
    }

    #[test]
    fn test_deterministic() {
        let engine = PreviewEngine::new(16000, None);
        let voice = engine.load_voice(key("en-F2")).unwrap();
        let a = engine.infer(voice.as_ref(), "Hello there.", &params(3)).unwrap();
        let b = engine.infer(voice.as_ref(), "Hello there.", &params(3)).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_voices_differ() {
        let engine = PreviewEngine::new(16000, None);
        let m = engine.load_voice(key("fr-M1")).unwrap();
        let f = engine.load_voice(key("fr-F1")).unwrap();
        let a = engine.infer(m.as_ref(), "Bonjour", &params(1)).unwrap();
        let b = engine.infer(f.as_ref(), "Bonjour", &params(1)).unwrap();
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_text() {
        let engine = PreviewEngine::new(16000, None);
        let voice = engine.load_voice(key("en-M1")).unwrap();
        assert!(engine.infer(voice.as_ref(), "", &params(5)).unwrap().is_empty());
    }

    #[test]
    fn test_style_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("M4.json"), r#"{"pitch_hz": 150.0}"#).unwrap();
        std::fs::write(dir.path().join("F1.json"), "not json").unwrap();

        let engine = PreviewEngine::new(16000, Some(dir.path().to_path_buf()));
        let voice = engine.load_voice(key("fr-M4")).unwrap();
        let preview = voice.as_any().downcast_ref::<PreviewVoice>().unwrap();
        assert_eq!(preview.pitch_hz, 150.0);

        let corrupt = engine.load_voice(key("fr-F1")).unwrap_err();
        assert_eq!(corrupt.code(), "model_load_error");

        let missing = engine.load_voice(key("fr-M2")).unwrap_err();
        assert_eq!(missing.code(), "model_load_error");
    }
}
