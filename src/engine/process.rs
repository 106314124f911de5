//! External process engine
//!
//! Runs a synthesizer command once per segment: the text is written to its
//! stdin and raw little-endian f32 mono PCM is read from its stdout. Call
//! parameters travel as environment variables:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `TTS_LANGUAGE` | language code, e.g. `fr` |
//! | `TTS_VOICE` | voice id, e.g. `M4` |
//! | `TTS_VOICE_STYLE` | path to the voice style file |
//! | `TTS_STEPS` | quality, 1..=10 |
//! | `TTS_SPEED` | speed multiplier |
//! | `TTS_SAMPLE_RATE` | expected output rate |
//!
//! Exit code 75 (`EX_TEMPFAIL`) and death by signal are reported as
//! recoverable failures.

use std::any::Any;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

use tracing::debug;

use super::traits::{EngineInfo, InferParams, SynthesisEngine, VoiceModel};
use crate::core::error::{Result, TtsError};
use crate::voice::VoiceKey;

const EX_TEMPFAIL: i32 = 75;

/// Voice resolved to its style file on disk
#[derive(Debug, Clone)]
pub struct ProcessVoice {
    key: VoiceKey,
    pub style_path: PathBuf,
}

impl VoiceModel for ProcessVoice {
    fn key(&self) -> VoiceKey {
        self.key
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Engine backed by an external synthesizer command
#[derive(Debug)]
pub struct ProcessEngine {
    info: EngineInfo,
    command: PathBuf,
    args: Vec<String>,
    voices_dir: PathBuf,
}

impl ProcessEngine {
    pub fn new(command: PathBuf, args: Vec<String>, voices_dir: PathBuf, sample_rate: u32) -> Self {
        Self {
            info: EngineInfo {
                name: format!("process:{}", command.display()),
                sample_rate,
                native_speed: true,
            },
            command,
            args,
            voices_dir,
        }
    }

    fn run(&self, voice: &ProcessVoice, text: &str, params: &InferParams) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .env("TTS_LANGUAGE", voice.key.language.code())
            .env("TTS_VOICE", voice.key.voice.to_string())
            .env("TTS_VOICE_STYLE", &voice.style_path)
            .env("TTS_STEPS", params.quality.to_string())
            .env("TTS_SPEED", params.speed.to_string())
            .env("TTS_SAMPLE_RATE", self.info.sample_rate.to_string());

        let mut child = cmd.spawn().map_err(|e| {
            let recoverable = !matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied);
            TtsError::engine(format!("cannot start {}: {}", self.command.display(), e), recoverable)
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin.write_all(text.as_bytes()).and_then(|_| stdin.flush());
            drop(stdin);
            if let Err(e) = written {
                // Reap the child so a failed call leaves no zombie behind
                let _ = child.kill();
                let _ = child.wait();
                return Err(TtsError::engine(format!("cannot write to synthesizer: {}", e), true));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| TtsError::engine(format!("synthesizer I/O failed: {}", e), true))?;

        if !output.status.success() {
            let recoverable = match output.status.code() {
                Some(code) => code == EX_TEMPFAIL,
                None => true,
            };
            return Err(TtsError::engine(
                format!("synthesizer exited with {}", output.status),
                recoverable,
            ));
        }
        Ok(output.stdout)
    }
}

/// Decode little-endian f32 PCM
fn decode_f32le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(TtsError::engine(
            format!("synthesizer output is not f32 PCM ({} bytes)", bytes.len()),
            false,
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

impl SynthesisEngine for ProcessEngine {
    fn info(&self) -> &EngineInfo {
        &self.info
    }

    fn load_voice(&self, key: VoiceKey) -> Result<Arc<dyn VoiceModel>> {
        let style_path = self.voices_dir.join(format!("{}.json", key.voice));
        if !style_path.is_file() {
            return Err(TtsError::ModelLoad {
                voice: key.to_string(),
                message: "voice style file not found".to_string(),
                path: Some(style_path),
            });
        }
        debug!(voice = %key, path = %style_path.display(), "voice style located");
        Ok(Arc::new(ProcessVoice { key, style_path }))
    }

    fn infer(&self, model: &dyn VoiceModel, text: &str, params: &InferParams) -> Result<Vec<f32>> {
        let voice = model
            .as_any()
            .downcast_ref::<ProcessVoice>()
            .ok_or_else(|| TtsError::engine("voice was not loaded by the process engine", false))?;
        let bytes = self.run(voice, text, params)?;
        decode_f32le(&bytes)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn setup(script: &str) -> (tempfile::TempDir, ProcessEngine) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("M4.json"), "{}").unwrap();
        let path = dir.path().join("synth.sh");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        let engine = ProcessEngine::new(path, Vec::new(), dir.path().to_path_buf(), 16000);
        (dir, engine)
    }

    fn params() -> InferParams {
        InferParams { quality: 5, speed: 1.5 }
    }

    #[test]
    fn test_reads_pcm() {
        // 1.0f32 then 0.0f32, little-endian
        let (_dir, engine) = setup("#!/bin/sh\ncat > /dev/null\nprintf '\\000\\000\\200\\077\\000\\000\\000\\000'\n");
        let voice = engine.load_voice(VoiceKey::from_name("fr-M4").unwrap()).unwrap();
        let samples = engine.infer(voice.as_ref(), "Bonjour", &params()).unwrap();
        assert_eq!(samples, vec![1.0, 0.0]);
        assert!(engine.info().native_speed);
    }

    #[test]
    fn test_passes_parameters() {
        let (_dir, engine) = setup(
            "#!/bin/sh\ncat > /dev/null\n[ \"$TTS_LANGUAGE\" = fr ] && [ \"$TTS_VOICE\" = M4 ] && [ \"$TTS_STEPS\" = 5 ] && [ \"$TTS_SPEED\" = 1.5 ] || exit 3\n",
        );
        let voice = engine.load_voice(VoiceKey::from_name("fr-M4").unwrap()).unwrap();
        assert!(engine.infer(voice.as_ref(), "x", &params()).unwrap().is_empty());
    }

    #[test]
    fn test_exit_codes() {
        let (_dir, engine) = setup("#!/bin/sh\ncat > /dev/null\nexit 75\n");
        let voice = engine.load_voice(VoiceKey::from_name("fr-M4").unwrap()).unwrap();
        assert!(engine.infer(voice.as_ref(), "x", &params()).unwrap_err().is_retryable());

        let (_dir, engine) = setup("#!/bin/sh\ncat > /dev/null\nexit 2\n");
        let voice = engine.load_voice(VoiceKey::from_name("fr-M4").unwrap()).unwrap();
        assert!(!engine.infer(voice.as_ref(), "x", &params()).unwrap_err().is_retryable());
    }

    #[test]
    fn test_truncated_output() {
        let (_dir, engine) = setup("#!/bin/sh\ncat > /dev/null\nprintf 'abc'\n");
        let voice = engine.load_voice(VoiceKey::from_name("fr-M4").unwrap()).unwrap();
        assert_eq!(engine.infer(voice.as_ref(), "x", &params()).unwrap_err().code(), "engine_error");
    }

    #[test]
    fn test_exit_before_reading_input() {
        let (_dir, engine) = setup("#!/bin/sh\nexit 0\n");
        let voice = engine.load_voice(VoiceKey::from_name("fr-M4").unwrap()).unwrap();
        // Large enough that the write cannot fit in the pipe buffer
        let text = "Bonjour. ".repeat(64 * 1024);
        let err = engine.infer(voice.as_ref(), &text, &params()).unwrap_err();
        assert_eq!(err.code(), "engine_error");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_style() {
        let (_dir, engine) = setup("#!/bin/sh\n");
        let err = engine.load_voice(VoiceKey::from_name("fr-F1").unwrap()).unwrap_err();
        assert_eq!(err.code(), "model_load_error");
    }
}
