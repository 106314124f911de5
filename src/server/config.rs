//! Server Configuration
//!
//! Layered: YAML file, then the add-on options file, then the `PORT`
//! environment variable. Command-line flags are applied last by the binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::{Result, TtsError};
use crate::engine::EngineConfig;
use crate::inference::{PipelineConfig, SynthesisDefaults};
use crate::voice::{VoiceCacheConfig, VoiceKey};

/// Where the add-on supervisor writes user options
pub const ADDON_OPTIONS_PATH: &str = "/data/options.json";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wyoming protocol listener
    #[serde(default)]
    pub wyoming: WyomingConfig,

    /// Values used when a request omits a parameter
    #[serde(default)]
    pub defaults: SynthesisDefaults,

    /// Synthesis engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// Segmentation, pipelining and deadlines
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Loaded voice cache
    #[serde(default)]
    pub voices: VoiceCacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wyoming listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WyomingConfig {
    /// Enable the Wyoming listener
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_wyoming_port")]
    pub port: u16,
}

impl Default for WyomingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_wyoming_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable access log
    #[serde(default = "default_true")]
    pub access_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            access_log: true,
        }
    }
}

/// Options file written by the add-on supervisor
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddonOptions {
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub default_voice: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub volume_boost: Option<f32>,
    #[serde(default)]
    pub quality: Option<u8>,
}

/// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_wyoming_port() -> u16 {
    10200
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            wyoming: WyomingConfig::default(),
            defaults: SynthesisDefaults::default(),
            engine: EngineConfig::default(),
            pipeline: PipelineConfig::default(),
            voices: VoiceCacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TtsError::Config {
            message: format!("cannot read config file: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| TtsError::Config {
            message: format!("invalid config file: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Save to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Resolve configuration from every source except the command line
    pub fn from_sources(config_path: Option<&Path>, options_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let options_path = options_path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(ADDON_OPTIONS_PATH));
        config.apply_addon_options(&options_path)?;
        config.apply_env();
        Ok(config)
    }

    /// Overlay the add-on options file if present
    ///
    /// Returns whether the file existed.
    pub fn apply_addon_options(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(path)?;
        let options: AddonOptions = serde_json::from_str(&content).map_err(|e| TtsError::Config {
            message: format!("invalid add-on options: {}", e),
            path: Some(path.to_path_buf()),
        })?;
        self.apply_options(options);
        info!(path = %path.display(), "applied add-on options");
        Ok(true)
    }

    pub fn apply_options(&mut self, options: AddonOptions) {
        if let Some(language) = options.default_language {
            self.defaults.language = language;
        }
        if let Some(voice) = options.default_voice {
            self.defaults.voice = voice;
        }
        if let Some(speed) = options.speed {
            self.defaults.speed = speed;
        }
        if let Some(volume) = options.volume_boost {
            self.defaults.volume = volume;
        }
        if let Some(quality) = options.quality {
            self.defaults.quality = quality;
        }
    }

    /// Apply `PORT` from the environment
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.trim().parse().ok()) {
            self.port = port;
        }
    }

    /// Voices to load at startup; the default voice when none are listed
    pub fn preload_keys(&self) -> Result<Vec<VoiceKey>> {
        if self.engine.preload.is_empty() {
            return Ok(vec![self.defaults.voice_key()?]);
        }
        self.engine
            .preload
            .iter()
            .map(|name| VoiceKey::from_name(name))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.defaults
            .validate()
            .map_err(|e| TtsError::config(format!("invalid synthesis defaults: {}", e)))?;
        self.engine.validate()?;
        self.pipeline.validate()?;
        self.preload_keys()
            .map_err(|e| TtsError::config(format!("invalid engine.preload entry: {}", e)))?;
        if self.wyoming.enabled && self.wyoming.port == self.port && self.wyoming.host == self.host {
            return Err(TtsError::config("wyoming.port must differ from port"));
        }
        Ok(())
    }
}
