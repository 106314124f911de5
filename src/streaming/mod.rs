//! Streaming Synthesis Module
//!
//! Types shared between the synthesis pipeline and the delivery adapters:
//! - Audio segments delivered in index order
//! - Session events and the consumer-side stream handle
//! - Reorder buffer and session state machine
//! - Latency statistics

pub mod reorder;
pub mod session;

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub use reorder::ReorderBuffer;
pub use session::{SessionState, StreamSession};

use crate::core::error::{Result, TtsError};

/// Synthesized audio for one segment
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub request_id: Uuid,
    /// Index of the text segment this fulfils
    pub index: usize,
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Last segment of the request
    pub is_final: bool,
    /// Text that produced this audio
    pub text: String,
    /// When synthesis of this segment finished
    pub generated_at: Instant,
}

impl AudioSegment {
    /// Get segment duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.samples.len() as f64 / self.sample_rate as f64) * 1000.0
    }

    /// Time since synthesis finished
    pub fn latency(&self) -> Duration {
        self.generated_at.elapsed()
    }
}

/// Streaming statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamingStats {
    /// Segments delivered
    pub total_segments: usize,
    /// Total audio duration in seconds
    pub total_audio_secs: f64,
    /// Average time a finished segment waited before delivery
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Acceptance to first delivered segment
    pub first_segment_latency_ms: f64,
    /// Wall time over audio time; below 1.0 is faster than real time
    pub rtf: f64,
}

impl StreamingStats {
    /// Update statistics with a delivered segment
    pub fn update(&mut self, segment: &AudioSegment, session_start: Instant) {
        self.total_segments += 1;
        self.total_audio_secs += segment.duration_ms() / 1000.0;

        let latency = segment.latency().as_secs_f64() * 1000.0;
        if self.total_segments == 1 {
            self.first_segment_latency_ms = session_start.elapsed().as_secs_f64() * 1000.0;
            self.min_latency_ms = latency;
            self.max_latency_ms = latency;
            self.avg_latency_ms = latency;
        } else {
            self.min_latency_ms = self.min_latency_ms.min(latency);
            self.max_latency_ms = self.max_latency_ms.max(latency);
            // Running average
            self.avg_latency_ms += (latency - self.avg_latency_ms) / self.total_segments as f64;
        }

        if self.total_audio_secs > 0.0 {
            self.rtf = session_start.elapsed().as_secs_f64() / self.total_audio_secs;
        }
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub request_id: Uuid,
    pub segments: usize,
    pub audio_secs: f64,
    pub elapsed_ms: u64,
    pub stats: StreamingStats,
}

/// What a consumer receives, in order
///
/// Zero or more `Segment`s with increasing indices, then exactly one of
/// `Completed` or `Failed`.
#[derive(Debug)]
pub enum SessionEvent {
    Segment(AudioSegment),
    Completed(SessionSummary),
    Failed(TtsError),
}

/// Whole utterance gathered from a stream
#[derive(Debug)]
pub struct CollectedAudio {
    pub request_id: Uuid,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub segments: usize,
    pub summary: SessionSummary,
}

impl CollectedAudio {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Consumer side of a synthesis session
///
/// Dropping the handle cancels the session.
#[derive(Debug)]
pub struct StreamHandle {
    request_id: Uuid,
    events: mpsc::Receiver<SessionEvent>,
    state: watch::Receiver<SessionState>,
    sample_rate: u32,
    next_index: usize,
    finished: bool,
}

impl StreamHandle {
    pub fn new(
        request_id: Uuid,
        events: mpsc::Receiver<SessionEvent>,
        state: watch::Receiver<SessionState>,
        sample_rate: u32,
    ) -> Self {
        Self {
            request_id,
            events,
            state,
            sample_rate,
            next_index: 0,
            finished: false,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches a terminal state
    pub async fn wait_terminal(&mut self) -> SessionState {
        let reached = self.state.wait_for(|s| s.is_terminal()).await.map(|state| *state);
        reached.unwrap_or_else(|_| *self.state.borrow())
    }

    /// Next event; `None` after the terminal event
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        match &event {
            Some(SessionEvent::Segment(segment)) => {
                debug_assert_eq!(segment.index, self.next_index, "segments out of order");
                self.next_index = segment.index + 1;
            }
            Some(_) | None => self.finished = true,
        }
        event
    }

    /// Segments received so far
    pub fn received(&self) -> usize {
        self.next_index
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Buffer the whole stream and concatenate it in order
    pub async fn collect(mut self) -> Result<CollectedAudio> {
        let mut samples = Vec::new();
        let mut segments = 0;

        while let Some(event) = self.next_event().await {
            match event {
                SessionEvent::Segment(segment) => {
                    samples.extend_from_slice(&segment.samples);
                    segments += 1;
                }
                SessionEvent::Completed(summary) => {
                    return Ok(CollectedAudio {
                        request_id: self.request_id,
                        samples,
                        sample_rate: self.sample_rate,
                        segments,
                        summary,
                    });
                }
                SessionEvent::Failed(err) => return Err(err),
            }
        }

        Err(TtsError::internal("stream closed without a terminal event"))
    }
}
