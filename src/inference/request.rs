//! Utterance requests
//!
//! Raw parameters arrive from HTTP query strings, JSON bodies and Wyoming
//! events. They are merged with the configured defaults and validated here,
//! before any engine work is scheduled.

use std::fmt;
use std::ops::RangeInclusive;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{Result, TtsError};
use crate::text::Language;
use crate::voice::{VoiceId, VoiceKey};

/// Accepted speaking rates
pub const SPEED_RANGE: RangeInclusive<f32> = 0.5..=2.0;
/// Accepted linear volume gains
pub const VOLUME_RANGE: RangeInclusive<f32> = 1.0..=3.0;
/// Accepted quality levels
pub const QUALITY_RANGE: RangeInclusive<u8> = 1..=10;

/// A numeric parameter given as a number or as a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    fn as_f64(&self, field: &str) -> Result<f64> {
        match self {
            ParamValue::Number(n) => Ok(*n),
            ParamValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| TtsError::invalid(field, format!("'{}' is not a number", s))),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

/// Unvalidated request parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsParams {
    /// Text to synthesize
    #[serde(default)]
    pub text: Option<String>,

    /// Language code (en, fr, es, pt, ko)
    #[serde(default)]
    pub language: Option<String>,

    /// Voice id (M1-M5, F1-F5)
    #[serde(default)]
    pub voice: Option<String>,

    #[serde(default)]
    pub speed: Option<ParamValue>,

    #[serde(default)]
    pub volume: Option<ParamValue>,

    #[serde(default)]
    pub quality: Option<ParamValue>,
}

impl TtsParams {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Fields set in `overrides` win
    pub fn merge(self, overrides: TtsParams) -> TtsParams {
        TtsParams {
            text: overrides.text.or(self.text),
            language: overrides.language.or(self.language),
            voice: overrides.voice.or(self.voice),
            speed: overrides.speed.or(self.speed),
            volume: overrides.volume.or(self.volume),
            quality: overrides.quality.or(self.quality),
        }
    }
}

/// Values used when a request leaves a parameter out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisDefaults {
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_voice")]
    pub voice: String,

    #[serde(default = "default_speed")]
    pub speed: f32,

    #[serde(default = "default_volume")]
    pub volume: f32,

    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_language() -> String {
    "fr".to_string()
}

fn default_voice() -> String {
    "M4".to_string()
}

fn default_speed() -> f32 {
    1.5
}

fn default_volume() -> f32 {
    2.0
}

fn default_quality() -> u8 {
    5
}

impl Default for SynthesisDefaults {
    fn default() -> Self {
        Self {
            language: default_language(),
            voice: default_voice(),
            speed: default_speed(),
            volume: default_volume(),
            quality: default_quality(),
        }
    }
}

impl SynthesisDefaults {
    /// Default voice as a catalog key
    pub fn voice_key(&self) -> Result<VoiceKey> {
        VoiceKey::from_codes(&self.language, &self.voice)
    }

    pub fn validate(&self) -> Result<()> {
        self.voice_key()?;
        check_speed(self.speed as f64)?;
        check_volume(self.volume as f64)?;
        check_quality(self.quality as f64)?;
        Ok(())
    }
}

/// A validated, immutable synthesis request
#[derive(Debug, Clone)]
pub struct UtteranceRequest {
    pub id: Uuid,
    pub text: String,
    pub voice: VoiceKey,
    pub speed: f32,
    pub volume: f32,
    pub quality: u8,
    /// Start of the session deadline
    pub accepted_at: Instant,
}

impl UtteranceRequest {
    /// Build a request from explicit values, validating ranges
    pub fn new(text: impl Into<String>, voice: VoiceKey, speed: f32, volume: f32, quality: u8) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(missing_text());
        }
        Ok(Self {
            id: Uuid::new_v4(),
            text,
            voice,
            speed: check_speed(speed as f64)?,
            volume: check_volume(volume as f64)?,
            quality: check_quality(quality as f64)?,
            accepted_at: Instant::now(),
        })
    }

    /// Validate raw parameters, filling gaps from `defaults`
    pub fn from_params(params: TtsParams, defaults: &SynthesisDefaults, max_text_chars: usize) -> Result<Self> {
        let text = match params.text {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(missing_text()),
        };
        let chars = text.chars().count();
        if chars > max_text_chars {
            return Err(TtsError::invalid(
                "text",
                format!("text is {} characters, limit is {}", chars, max_text_chars),
            ));
        }

        let language: Language = non_empty(params.language)
            .unwrap_or_else(|| defaults.language.clone())
            .parse()?;
        let voice = VoiceId::parse(&non_empty(params.voice).unwrap_or_else(|| defaults.voice.clone()))?;

        let speed = match params.speed {
            Some(value) => check_speed(value.as_f64("speed")?)?,
            None => defaults.speed,
        };
        let volume = match params.volume {
            Some(value) => check_volume(value.as_f64("volume")?)?,
            None => defaults.volume,
        };
        let quality = match params.quality {
            Some(value) => check_quality(value.as_f64("quality")?)?,
            None => defaults.quality,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            text,
            voice: VoiceKey::new(language, voice),
            speed,
            volume,
            quality,
            accepted_at: Instant::now(),
        })
    }

    pub fn language(&self) -> Language {
        self.voice.language
    }
}

impl fmt::Display for UtteranceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} voice={} speed={} volume={} quality={} chars={}",
            self.id,
            self.voice,
            self.speed,
            self.volume,
            self.quality,
            self.text.chars().count()
        )
    }
}

fn missing_text() -> TtsError {
    TtsError::invalid("text", "Missing 'text' parameter")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Range check on the parsed value, before narrowing to f32
fn within(range: &RangeInclusive<f32>, value: f64) -> bool {
    value.is_finite() && value >= *range.start() as f64 && value <= *range.end() as f64
}

fn check_speed(value: f64) -> Result<f32> {
    if within(&SPEED_RANGE, value) {
        Ok(value as f32)
    } else {
        Err(TtsError::invalid(
            "speed",
            format!("speed must be between 0.5 and 2.0, got {}", value),
        ))
    }
}

fn check_volume(value: f64) -> Result<f32> {
    if within(&VOLUME_RANGE, value) {
        Ok(value as f32)
    } else {
        Err(TtsError::invalid(
            "volume",
            format!("volume must be between 1.0 and 3.0, got {}", value),
        ))
    }
}

fn check_quality(value: f64) -> Result<u8> {
    let in_range = value >= *QUALITY_RANGE.start() as f64 && value <= *QUALITY_RANGE.end() as f64;
    if value.is_finite() && value.fract() == 0.0 && in_range {
        Ok(value as u8)
    } else {
        Err(TtsError::invalid(
            "quality",
            format!("quality must be an integer between 1 and 10, got {}", value),
        ))
    }
}
