//! Engine configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, TtsError};

/// Which engine implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Built-in deterministic tone renderer
    #[default]
    Preview,
    /// External synthesizer command
    Process,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,

    /// Directory holding `<voice>.json` style files
    #[serde(default)]
    pub voices_dir: Option<PathBuf>,

    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Engine calls allowed at once, process-wide
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Synthesizer executable for the process engine
    #[serde(default)]
    pub command: Option<PathBuf>,

    /// Extra arguments for the synthesizer executable
    #[serde(default)]
    pub args: Vec<String>,

    /// Voices to load at startup, as `<language>-<voice>` names
    #[serde(default)]
    pub preload: Vec<String>,
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_max_concurrent() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            voices_dir: None,
            sample_rate: default_sample_rate(),
            max_concurrent: default_max_concurrent(),
            command: None,
            args: Vec::new(),
            preload: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate < 8000 {
            return Err(TtsError::config(format!(
                "engine.sample_rate must be at least 8000, got {}",
                self.sample_rate
            )));
        }
        if self.max_concurrent == 0 {
            return Err(TtsError::config("engine.max_concurrent must be at least 1"));
        }
        if self.kind == EngineKind::Process {
            if self.command.is_none() {
                return Err(TtsError::config("engine.command is required for the process engine"));
            }
            if self.voices_dir.is_none() {
                return Err(TtsError::config("engine.voices_dir is required for the process engine"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.kind, EngineKind::Preview);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.max_concurrent, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_process_requires_command() {
        let mut config = EngineConfig {
            kind: EngineKind::Process,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.command = Some(PathBuf::from("/usr/bin/synth"));
        config.voices_dir = Some(PathBuf::from("/data/voice_styles"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml() {
        let config: EngineConfig = serde_yaml::from_str("kind: process\ncommand: /bin/synth\nvoices_dir: /v\n").unwrap();
        assert_eq!(config.kind, EngineKind::Process);
        assert_eq!(config.max_concurrent, 1);
    }
}
