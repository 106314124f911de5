//! Supertonic-TTS CLI - serve, synthesize and inspect the voice catalog
//!
//! Configuration is layered: YAML file (`--config`), add-on options file,
//! `PORT` environment variable, then the flags given here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use supertonic_tts::audio::AudioOutput;
use supertonic_tts::engine::{create_engine, EngineKind};
use supertonic_tts::inference::{ParamValue, SynthesisPipeline, TtsParams};
use supertonic_tts::server::{ServerConfig, TtsServer};
use supertonic_tts::streaming::SessionEvent;
use supertonic_tts::text::Language;
use supertonic_tts::voice::{catalog, VoiceId};
use supertonic_tts::VERSION;

/// Available synthesis engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineType {
    /// Built-in deterministic tone renderer
    Preview,
    /// External synthesizer command
    Process,
}

impl From<EngineType> for EngineKind {
    fn from(engine: EngineType) -> Self {
        match engine {
            EngineType::Preview => EngineKind::Preview,
            EngineType::Process => EngineKind::Process,
        }
    }
}

/// Supertonic-TTS - streaming text-to-speech server
#[derive(Parser, Debug)]
#[command(name = "supertonic-tts")]
#[command(author, version, about = "Streaming text-to-speech server", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// YAML configuration file
    #[arg(short, long, global = true, env = "SUPERTONIC_CONFIG")]
    config: Option<PathBuf>,

    /// Add-on options file
    #[arg(long, global = true)]
    options: Option<PathBuf>,

    /// Engine to use, overriding the configuration
    #[arg(long, value_enum, global = true)]
    engine: Option<EngineType>,

    /// Directory with voice style files
    #[arg(long, global = true)]
    voices_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP and Wyoming servers
    Serve {
        /// Host to bind
        #[arg(long)]
        host: Option<String>,

        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Wyoming port
        #[arg(long)]
        wyoming_port: Option<u16>,

        /// Disable the Wyoming listener
        #[arg(long)]
        no_wyoming: bool,
    },

    /// Synthesize text to a WAV file through the streaming pipeline
    Synth {
        /// Text to synthesize
        #[arg(short, long)]
        text: String,

        /// Language code (en, fr, es, pt, ko)
        #[arg(short, long)]
        language: Option<String>,

        /// Voice id (M1-M5, F1-F5)
        #[arg(long)]
        voice: Option<String>,

        /// Speed multiplier (0.5 - 2.0)
        #[arg(long)]
        speed: Option<f64>,

        /// Volume boost (1.0 - 3.0)
        #[arg(long)]
        volume: Option<f64>,

        /// Quality level (1 - 10)
        #[arg(long)]
        quality: Option<u8>,

        /// Output audio file path
        #[arg(short, long, default_value = "tts_output.wav")]
        output: PathBuf,
    },

    /// List languages and voices
    Voices {
        /// Only show endpoints for this language
        #[arg(short, long)]
        language: Option<String>,
    },
}

fn setup_logging(verbose: bool, level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    let _ = fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(filter)
        .try_init();
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::from_sources(cli.config.as_deref(), cli.options.as_deref())
        .context("failed to load configuration")?;
    if let Some(engine) = cli.engine {
        config.engine.kind = engine.into();
    }
    if let Some(dir) = &cli.voices_dir {
        config.engine.voices_dir = Some(dir.clone());
    }

    setup_logging(cli.verbose, &config.logging.level);
    info!("Supertonic-TTS v{}", VERSION);

    match cli.command {
        Commands::Serve {
            host,
            port,
            wyoming_port,
            no_wyoming,
        } => {
            if let Some(host) = host {
                config.wyoming.host = host.clone();
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(port) = wyoming_port {
                config.wyoming.port = port;
            }
            if no_wyoming {
                config.wyoming.enabled = false;
            }
            run_server(config).await
        }
        Commands::Synth {
            text,
            language,
            voice,
            speed,
            volume,
            quality,
            output,
        } => {
            let params = TtsParams {
                text: Some(text),
                language,
                voice,
                speed: speed.map(ParamValue::Number),
                volume: volume.map(ParamValue::Number),
                quality: quality.map(|q| ParamValue::Number(q as f64)),
            };
            run_synth(config, params, output).await
        }
        Commands::Voices { language } => list_voices(&config, language.as_deref()),
    }
}

async fn run_server(config: ServerConfig) -> Result<()> {
    let server = TtsServer::new(config).context("failed to initialize server")?;
    server.run().await.context("server error")?;
    Ok(())
}

async fn run_synth(config: ServerConfig, params: TtsParams, output: PathBuf) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let engine = create_engine(&config.engine).context("failed to create engine")?;
    let pipeline: Arc<SynthesisPipeline> = SynthesisPipeline::from_parts(
        engine,
        config.engine.max_concurrent,
        &config.voices,
        config.pipeline.clone(),
        config.defaults.clone(),
    )?;

    let request = pipeline.accept(params)?;
    info!(voice = %request.voice, speed = request.speed, volume = request.volume, quality = request.quality, "synthesizing");

    let start = Instant::now();
    let pb = create_progress_bar("Synthesizing...");
    let mut stream = pipeline.start(request);
    let mut samples = Vec::new();
    let mut segments = 0;

    while let Some(event) = stream.next_event().await {
        match event {
            SessionEvent::Segment(segment) => {
                segments += 1;
                pb.set_message(format!("Segment {} ready ({:.0} ms)", segment.index + 1, segment.duration_ms()));
                samples.extend_from_slice(&segment.samples);
            }
            SessionEvent::Completed(summary) => {
                pb.finish_with_message(format!(
                    "Done: {} segments, {:.2}s of audio, first segment after {:.0} ms",
                    summary.segments, summary.audio_secs, summary.stats.first_segment_latency_ms
                ));
                break;
            }
            SessionEvent::Failed(e) => {
                pb.abandon_with_message(format!("Failed after {} segments", segments));
                return Err(e).context("synthesis failed");
            }
        }
    }

    AudioOutput::save(&samples, pipeline.sample_rate(), &output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        output = %output.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "audio saved"
    );
    Ok(())
}

fn list_voices(config: &ServerConfig, language: Option<&str>) -> Result<()> {
    let filter = language.map(str::parse::<Language>).transpose()?;

    println!("Languages:");
    for l in Language::all() {
        let marker = if l.code() == config.defaults.language { " (default)" } else { "" };
        println!("  {:<4} {}{}", l.code(), l.name(), marker);
    }

    println!();
    println!("Voices:");
    for v in VoiceId::all() {
        let marker = if v.to_string() == config.defaults.voice { " (default)" } else { "" };
        println!("  {}{}", v, marker);
    }

    println!();
    println!("Endpoints:");
    for key in catalog().into_iter().filter(|k| filter.map_or(true, |l| k.language == l)) {
        println!("  {}", key);
    }
    Ok(())
}
