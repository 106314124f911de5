//! Streaming synthesis pipeline
//!
//! Drives one session per accepted request:
//! 1. Text normalization (abbreviations, punctuation, optional numbers)
//! 2. Segmentation into sentence-sized pieces
//! 3. Voice resolution through the shared voice cache
//! 4. Bounded pipelined synthesis, at most `max_in_flight` segments ahead
//!    of delivery, every engine call passing the engine gate
//! 5. Speed time-scaling and volume gain per segment
//! 6. In-order delivery over a bounded channel
//!
//! A session ends with exactly one terminal event, except on cancellation
//! where the consumer is already gone.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::request::{SynthesisDefaults, TtsParams, UtteranceRequest};
use crate::audio::{apply_gain, time_scale};
use crate::core::error::{Result, TtsError};
use crate::engine::{EngineGate, InferParams, SynthesisEngine};
use crate::streaming::{
    AudioSegment, CollectedAudio, ReorderBuffer, SessionEvent, SessionState, StreamHandle, StreamSession,
};
use crate::text::{builtin_table, AbbreviationTable, Segment, Segmenter, SegmenterConfig, TextNormalizer};
use crate::voice::{VoiceCacheConfig, VoiceHandle, VoiceResolver};

/// Silence emitted for a segment with nothing to speak
const EMPTY_SEGMENT_MS: u32 = 50;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Segments dispatched ahead of delivery per session
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Delivered segments buffered for a slow consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Session deadline, measured from acceptance
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_max_segment_chars")]
    pub max_segment_chars: usize,

    #[serde(default = "default_min_clause_chars")]
    pub min_clause_chars: usize,

    /// Longest accepted request text, in characters
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Spell out English numbers
    #[serde(default)]
    pub expand_numbers: bool,

    /// YAML file with extra abbreviation entries
    #[serde(default)]
    pub abbreviations_file: Option<PathBuf>,
}

fn default_max_in_flight() -> usize {
    2
}

fn default_channel_capacity() -> usize {
    2
}

fn default_session_timeout_secs() -> u64 {
    120
}

fn default_max_segment_chars() -> usize {
    200
}

fn default_min_clause_chars() -> usize {
    20
}

fn default_max_text_chars() -> usize {
    5000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            channel_capacity: default_channel_capacity(),
            session_timeout_secs: default_session_timeout_secs(),
            max_segment_chars: default_max_segment_chars(),
            min_clause_chars: default_min_clause_chars(),
            max_text_chars: default_max_text_chars(),
            expand_numbers: false,
            abbreviations_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            max_chars: self.max_segment_chars,
            min_clause_chars: self.min_clause_chars,
        }
    }

    /// Normalizer with the built-in tables plus any configured overrides
    pub fn normalizer(&self) -> Result<TextNormalizer> {
        let table = match &self.abbreviations_file {
            Some(path) => {
                let mut table = AbbreviationTable::builtin();
                let added = table.load_overrides(path)?;
                info!(path = %path.display(), entries = added, "loaded abbreviation overrides");
                Arc::new(table)
            }
            None => builtin_table(),
        };
        Ok(TextNormalizer::with_table(table).with_number_expansion(self.expand_numbers))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(TtsError::config("pipeline.max_in_flight must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(TtsError::config("pipeline.channel_capacity must be at least 1"));
        }
        if self.session_timeout_secs == 0 {
            return Err(TtsError::config("pipeline.session_timeout_secs must be at least 1"));
        }
        if self.max_segment_chars < 2 || self.min_clause_chars >= self.max_segment_chars {
            return Err(TtsError::config(
                "pipeline.min_clause_chars must be below pipeline.max_segment_chars",
            ));
        }
        if self.max_text_chars == 0 {
            return Err(TtsError::config("pipeline.max_text_chars must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct PipelineCounters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    segments: AtomicU64,
    retries: AtomicU64,
}

/// Session counters since startup
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub sessions_started: u64,
    pub sessions_active: u64,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub sessions_cancelled: u64,
    pub sessions_timed_out: u64,
    pub segments_delivered: u64,
    pub engine_retries: u64,
}

/// Synthesis orchestrator shared by all delivery adapters
pub struct SynthesisPipeline {
    engine: Arc<dyn SynthesisEngine>,
    gate: Arc<EngineGate>,
    voices: Arc<VoiceResolver>,
    normalizer: TextNormalizer,
    segmenter: Segmenter,
    defaults: SynthesisDefaults,
    config: PipelineConfig,
    counters: Arc<PipelineCounters>,
}

impl SynthesisPipeline {
    /// Create a pipeline on top of an existing voice cache
    ///
    /// Engine and gate are the ones the cache loads voices with.
    pub fn new(voices: Arc<VoiceResolver>, normalizer: TextNormalizer, config: PipelineConfig) -> Self {
        Self {
            engine: Arc::clone(voices.engine()),
            gate: Arc::clone(voices.gate()),
            segmenter: Segmenter::new(config.segmenter_config()),
            voices,
            normalizer,
            defaults: SynthesisDefaults::default(),
            config,
            counters: Arc::new(PipelineCounters::default()),
        }
    }

    /// Wire engine, gate, voice cache and pipeline together
    pub fn from_parts(
        engine: Arc<dyn SynthesisEngine>,
        max_concurrent: usize,
        voice_cache: &VoiceCacheConfig,
        config: PipelineConfig,
        defaults: SynthesisDefaults,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        defaults.validate()?;
        let gate = Arc::new(EngineGate::new(max_concurrent));
        let voices = Arc::new(VoiceResolver::new(engine, gate, voice_cache));
        let normalizer = config.normalizer()?;
        Ok(Arc::new(Self::new(voices, normalizer, config).with_defaults(defaults)))
    }

    pub fn with_defaults(mut self, defaults: SynthesisDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn engine(&self) -> &Arc<dyn SynthesisEngine> {
        &self.engine
    }

    pub fn gate(&self) -> &Arc<EngineGate> {
        &self.gate
    }

    pub fn voices(&self) -> &Arc<VoiceResolver> {
        &self.voices
    }

    pub fn defaults(&self) -> &SynthesisDefaults {
        &self.defaults
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.info().sample_rate
    }

    /// Validate raw parameters against the configured defaults and limits
    pub fn accept(&self, params: TtsParams) -> Result<UtteranceRequest> {
        UtteranceRequest::from_params(params, &self.defaults, self.config.max_text_chars)
    }

    /// Start a session; audio arrives on the returned handle
    pub fn start(self: &Arc<Self>, request: UtteranceRequest) -> StreamHandle {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (session, state) = StreamSession::new(request.id, request.accepted_at);
        let handle = StreamHandle::new(request.id, rx, state, self.sample_rate());

        self.counters.started.fetch_add(1, Ordering::Relaxed);
        info!(request = %request, "synthesis accepted");

        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.drive(request, session, tx).await });
        handle
    }

    /// Run a session to completion and concatenate its audio
    pub async fn synthesize(self: &Arc<Self>, request: UtteranceRequest) -> Result<CollectedAudio> {
        self.start(request).collect().await
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        let started = c.started.load(Ordering::Relaxed);
        let completed = c.completed.load(Ordering::Relaxed);
        let failed = c.failed.load(Ordering::Relaxed);
        let cancelled = c.cancelled.load(Ordering::Relaxed);
        PipelineStats {
            sessions_started: started,
            sessions_active: started.saturating_sub(completed + failed + cancelled),
            sessions_completed: completed,
            sessions_failed: failed,
            sessions_cancelled: cancelled,
            sessions_timed_out: c.timed_out.load(Ordering::Relaxed),
            segments_delivered: c.segments.load(Ordering::Relaxed),
            engine_retries: c.retries.load(Ordering::Relaxed),
        }
    }

    async fn drive(self: Arc<Self>, request: UtteranceRequest, mut session: StreamSession, tx: mpsc::Sender<SessionEvent>) {
        let timeout = self.config.session_timeout();
        let deadline = tokio::time::Instant::from_std(request.accepted_at + timeout);

        let outcome = tokio::select! {
            biased;
            _ = tx.closed() => Err(TtsError::Cancelled),
            result = tokio::time::timeout_at(deadline, self.run_session(&request, &mut session, &tx)) => {
                result.unwrap_or(Err(TtsError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                }))
            }
        };

        match outcome {
            Ok(()) => {
                session.transition(SessionState::Completed);
                let summary = session.summary();
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    request_id = %request.id,
                    segments = summary.segments,
                    audio_secs = summary.audio_secs,
                    elapsed_ms = summary.elapsed_ms,
                    first_segment_ms = summary.stats.first_segment_latency_ms as u64,
                    rtf = summary.stats.rtf,
                    "synthesis completed"
                );
                let _ = tx.send(SessionEvent::Completed(summary)).await;
            }
            Err(TtsError::Cancelled) => {
                session.transition(SessionState::Cancelled);
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                info!(
                    request_id = %request.id,
                    delivered = session.delivered(),
                    total = session.total(),
                    "synthesis cancelled by consumer"
                );
            }
            Err(err) => {
                session.transition(SessionState::Failed);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                if matches!(err, TtsError::Timeout { .. }) {
                    self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                }
                if err.is_client_error() {
                    warn!(request_id = %request.id, error = %err, "synthesis rejected");
                } else {
                    error!(
                        request_id = %request.id,
                        code = err.code(),
                        delivered = session.delivered(),
                        error = %err,
                        "synthesis failed"
                    );
                }
                let _ = tx.send(SessionEvent::Failed(err)).await;
            }
        }
    }

    async fn run_session(
        &self,
        request: &UtteranceRequest,
        session: &mut StreamSession,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> Result<()> {
        session.transition(SessionState::Normalizing);
        let normalized = self.normalizer.normalize(&request.text, request.language());

        session.transition(SessionState::Segmenting);
        let segments = self.segmenter.segment(&normalized, request.id);
        session.set_total(segments.len());
        debug!(request_id = %request.id, segments = segments.len(), chars = normalized.len(), "text segmented");

        let voice = self.voices.resolve(request.voice).await?;
        session.transition(SessionState::Synthesizing);

        let window = self.config.max_in_flight.max(1);
        let total = segments.len();
        let mut jobs: JoinSet<(usize, Result<AudioSegment>)> = JoinSet::new();
        let mut aborts: Vec<(usize, AbortHandle)> = Vec::with_capacity(window);
        let mut reorder = ReorderBuffer::new();
        // Lowest failing index; results above it are never delivered
        let mut failure: Option<(usize, TtsError)> = None;
        // Same index, visible to engine calls still waiting for a permit
        let halt = Arc::new(AtomicUsize::new(usize::MAX));

        loop {
            if failure.is_none() {
                while session.dispatched() - session.delivered() < window {
                    let Some(index) = session.next_dispatch() else { break };
                    let job = SegmentJob {
                        engine: Arc::clone(&self.engine),
                        gate: Arc::clone(&self.gate),
                        voice: voice.clone(),
                        segment: segments[index].clone(),
                        is_final: index + 1 == total,
                        speed: request.speed,
                        volume: request.volume,
                        quality: request.quality,
                        counters: Arc::clone(&self.counters),
                        halt: Arc::clone(&halt),
                    };
                    debug!(request_id = %request.id, index, "segment dispatched");
                    aborts.push((index, jobs.spawn(job.run())));
                }
            }

            if let Some((failed_at, _)) = &failure {
                if reorder.next_index() >= *failed_at {
                    break;
                }
            }

            let Some(joined) = jobs.join_next().await else { break };
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) if e.is_cancelled() && failure.is_some() => continue,
                Err(e) => return Err(TtsError::internal(format!("segment task failed: {}", e))),
            };
            session.record_synthesized();
            aborts.retain(|(i, _)| *i != index);

            let failed_at = failure.as_ref().map(|(i, _)| *i);
            match result {
                Ok(audio) => {
                    if failed_at.is_some_and(|f| index > f) {
                        continue;
                    }
                    reorder
                        .insert(index, audio)
                        .map_err(|_| TtsError::internal(format!("segment {} synthesized twice", index)))?;
                }
                // Skipped because a lower segment failed; that failure is still on its way
                Err(TtsError::Cancelled) => continue,
                Err(err) => {
                    if failed_at.map_or(true, |f| index < f) {
                        warn!(request_id = %request.id, index, error = %err, "segment failed");
                        halt.fetch_min(index, Ordering::SeqCst);
                        for (_, handle) in aborts.iter().filter(|(i, _)| *i > index) {
                            handle.abort();
                        }
                        failure = Some((index, err.at_segment(index)));
                    }
                    continue;
                }
            }

            while let Some((index, audio)) = reorder.pop_ready() {
                session.record_delivery(&audio);
                self.counters.segments.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %request.id,
                    index,
                    samples = audio.samples.len(),
                    queued_ms = audio.latency().as_millis() as u64,
                    "segment delivered"
                );
                tx.send(SessionEvent::Segment(audio))
                    .await
                    .map_err(|_| TtsError::Cancelled)?;
            }
        }

        if let Some((_, err)) = failure {
            let dropped = reorder.discard() + jobs.len();
            if dropped > 0 {
                debug!(request_id = %request.id, dropped, "discarded segments after failure");
            }
            return Err(err);
        }
        if !session.is_fully_delivered() {
            return Err(TtsError::internal(format!(
                "delivered {} of {} segments",
                session.delivered(),
                session.total()
            )));
        }
        Ok(())
    }
}

/// Everything one segment needs, owned so it can run as its own task
struct SegmentJob {
    engine: Arc<dyn SynthesisEngine>,
    gate: Arc<EngineGate>,
    voice: VoiceHandle,
    segment: Segment,
    is_final: bool,
    speed: f32,
    volume: f32,
    quality: u8,
    counters: Arc<PipelineCounters>,
    /// Lowest failed index of the session, `usize::MAX` while none has failed
    halt: Arc<AtomicUsize>,
}

impl SegmentJob {
    async fn run(self) -> (usize, Result<AudioSegment>) {
        let index = self.segment.index;
        (index, self.render().await)
    }

    async fn render(self) -> Result<AudioSegment> {
        let info = self.engine.info();
        let sample_rate = info.sample_rate;

        let samples = if self.segment.is_empty() {
            vec![0.0; (sample_rate * EMPTY_SEGMENT_MS / 1000) as usize]
        } else {
            let raw = self.infer().await?;
            let scale = !info.native_speed && self.speed != 1.0;
            self.post_process(raw, scale).await?
        };

        Ok(AudioSegment {
            request_id: self.segment.request_id,
            index: self.segment.index,
            samples,
            sample_rate,
            is_final: self.is_final,
            text: self.segment.text,
            generated_at: Instant::now(),
        })
    }

    /// One engine call, retried once in place on a recoverable error
    ///
    /// The retry and the failure mark happen under the same permit, so a
    /// later segment queued on the gate never runs before them.
    async fn infer(&self) -> Result<Vec<f32>> {
        let engine = Arc::clone(&self.engine);
        // The blocking call keeps its own reference so the model outlives a cancelled session
        let voice = self.voice.clone();
        let text = self.segment.text.clone();
        let params = InferParams {
            quality: self.quality,
            speed: self.speed,
        };
        let index = self.segment.index;
        let halt = Arc::clone(&self.halt);
        let counters = Arc::clone(&self.counters);

        self.gate
            .run(move || {
                if halt.load(Ordering::SeqCst) < index {
                    return Err(TtsError::Cancelled);
                }
                let result = match engine.infer(voice.model(), &text, &params) {
                    Err(err) if err.is_retryable() => {
                        counters.retries.fetch_add(1, Ordering::Relaxed);
                        warn!(index, error = %err, "retrying segment");
                        engine.infer(voice.model(), &text, &params)
                    }
                    other => other,
                };
                if result.is_err() {
                    halt.fetch_min(index, Ordering::SeqCst);
                }
                result
            })
            .await
    }

    async fn post_process(&self, samples: Vec<f32>, scale: bool) -> Result<Vec<f32>> {
        let speed = self.speed;
        let volume = self.volume;
        tokio::task::spawn_blocking(move || {
            let mut samples = if scale { time_scale(&samples, speed)? } else { samples };
            apply_gain(&mut samples, volume);
            Ok(samples)
        })
        .await
        .map_err(|e| TtsError::internal(format!("post-processing task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.channel_capacity, 2);
        assert_eq!(config.session_timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = PipelineConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().code(), "config_error");

        let config = PipelineConfig {
            min_clause_chars: 300,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_yaml_partial() {
        let config: PipelineConfig = serde_yaml::from_str("max_in_flight: 4\nexpand_numbers: true\n").unwrap();
        assert_eq!(config.max_in_flight, 4);
        assert!(config.expand_numbers);
        assert_eq!(config.max_text_chars, 5000);
    }

    #[test]
    fn test_normalizer_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abbr.yaml");
        std::fs::write(&path, "es:\n  \"Sra.\": \"Señora\"\n").unwrap();
        let config = PipelineConfig {
            abbreviations_file: Some(path),
            ..Default::default()
        };
        let normalizer = config.normalizer().unwrap();
        let text = normalizer.normalize("Hola Sra. Ruiz", crate::text::Language::Es);
        assert_eq!(text.as_str(), "Hola Señora Ruiz");
    }
}
