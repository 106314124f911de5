//! Shared fixtures for integration tests
//!
//! `ScriptedEngine` renders one sample per non-whitespace character, so the
//! audio of any text is the concatenation of the audio of its pieces.

#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use supertonic_tts::engine::{EngineInfo, InferParams, SynthesisEngine, VoiceModel};
use supertonic_tts::inference::{PipelineConfig, SynthesisDefaults, SynthesisPipeline};
use supertonic_tts::voice::{VoiceCacheConfig, VoiceKey};
use supertonic_tts::{Result, TtsError};

pub const SAMPLE_RATE: u32 = 16000;

#[derive(Debug)]
pub struct ScriptedVoice(pub VoiceKey);

impl VoiceModel for ScriptedVoice {
    fn key(&self) -> VoiceKey {
        self.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Deterministic engine with scripted failures and delays
pub struct ScriptedEngine {
    info: EngineInfo,
    /// Inference fails for text containing this marker
    fail_on: Option<String>,
    /// Whether `fail_on` failures are reported as recoverable
    fail_recoverable: bool,
    /// First inference for text containing this marker fails recoverably
    flaky_on: Option<String>,
    flaky_tripped: Mutex<bool>,
    /// Per-call sleep, optionally longer for text containing a marker
    delay: Duration,
    slow_on: Option<(String, Duration)>,
    pub loads: AtomicUsize,
    pub infers: AtomicUsize,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            info: EngineInfo {
                name: "scripted".into(),
                sample_rate: SAMPLE_RATE,
                native_speed: false,
            },
            fail_on: None,
            fail_recoverable: false,
            flaky_on: None,
            flaky_tripped: Mutex::new(false),
            delay: Duration::ZERO,
            slow_on: None,
            loads: AtomicUsize::new(0),
            infers: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self
    }

    /// Like `failing_on`, but every failure claims to be recoverable
    pub fn failing_recoverably_on(mut self, marker: &str) -> Self {
        self.fail_on = Some(marker.to_string());
        self.fail_recoverable = true;
        self
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn flaky_on(mut self, marker: &str) -> Self {
        self.flaky_on = Some(marker.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn slow_on(mut self, marker: &str, delay: Duration) -> Self {
        self.slow_on = Some((marker.to_string(), delay));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn infers(&self) -> usize {
        self.infers.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Audio this engine produces for `text`
    pub fn render(text: &str) -> Vec<f32> {
        text.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| (c as u32 % 97) as f32 / 200.0)
            .collect()
    }
}

impl SynthesisEngine for ScriptedEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    fn load_voice(&self, key: VoiceKey) -> Result<Arc<dyn VoiceModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedVoice(key)))
    }

    fn infer(&self, _model: &dyn VoiceModel, text: &str, _params: &InferParams) -> Result<Vec<f32>> {
        self.infers.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let mut delay = self.delay;
        if let Some((marker, slow)) = &self.slow_on {
            if text.contains(marker.as_str()) {
                delay = *slow;
            }
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(TtsError::engine(format!("cannot render '{}'", text), self.fail_recoverable));
            }
        }
        if let Some(marker) = &self.flaky_on {
            let mut tripped = self.flaky_tripped.lock().unwrap();
            if text.contains(marker.as_str()) && !*tripped {
                *tripped = true;
                return Err(TtsError::engine("transient device error", true));
            }
        }
        Ok(Self::render(text))
    }
}

/// English, M1, unit speed and volume
pub fn neutral_defaults() -> SynthesisDefaults {
    SynthesisDefaults {
        language: "en".into(),
        voice: "M1".into(),
        speed: 1.0,
        volume: 1.0,
        quality: 5,
    }
}

pub fn pipeline_with(engine: Arc<ScriptedEngine>, config: PipelineConfig) -> Arc<SynthesisPipeline> {
    SynthesisPipeline::from_parts(engine, 1, &VoiceCacheConfig::default(), config, neutral_defaults()).unwrap()
}

pub fn pipeline(engine: Arc<ScriptedEngine>) -> Arc<SynthesisPipeline> {
    pipeline_with(engine, PipelineConfig::default())
}
