//! Stream session state
//!
//! One session per accepted request, owned by the task driving it.
//!
//! ```text
//! Accepted -> Normalizing -> Segmenting -> Synthesizing -> Completed
//!     \____________\_____________\______________\______> Failed | Cancelled
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::{AudioSegment, SessionSummary, StreamingStats};

/// Lifecycle of a synthesis request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Accepted,
    Normalizing,
    Segmenting,
    Synthesizing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }

    /// Forward steps only; failure and cancellation from any live state
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (_, Cancelled)
                | (Accepted, Normalizing)
                | (Normalizing, Segmenting)
                | (Segmenting, Synthesizing)
                | (Synthesizing, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Accepted => "accepted",
            SessionState::Normalizing => "normalizing",
            SessionState::Segmenting => "segmenting",
            SessionState::Synthesizing => "synthesizing",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request bookkeeping
#[derive(Debug)]
pub struct StreamSession {
    request_id: Uuid,
    state: watch::Sender<SessionState>,
    started: Instant,
    total: usize,
    dispatched: usize,
    synthesized: usize,
    delivered: usize,
    stats: StreamingStats,
}

impl StreamSession {
    /// New session in `Accepted`; `started` is when the request was accepted
    pub fn new(request_id: Uuid, started: Instant) -> (Self, watch::Receiver<SessionState>) {
        let (state, observer) = watch::channel(SessionState::Accepted);
        let session = Self {
            request_id,
            state,
            started,
            total: 0,
            dispatched: 0,
            synthesized: 0,
            delivered: 0,
            stats: StreamingStats::default(),
        };
        (session, observer)
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next`; illegal moves are ignored and reported as `false`
    pub fn transition(&mut self, next: SessionState) -> bool {
        let current = self.state();
        if !current.can_transition_to(next) {
            debug!(request_id = %self.request_id, from = %current, to = %next, "ignored state transition");
            return false;
        }
        self.state.send_replace(next);
        debug!(request_id = %self.request_id, from = %current, to = %next, "session state");
        true
    }

    pub fn set_total(&mut self, total: usize) {
        self.total = total;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Claim the next segment index for dispatch
    pub fn next_dispatch(&mut self) -> Option<usize> {
        if self.dispatched >= self.total {
            return None;
        }
        let index = self.dispatched;
        self.dispatched += 1;
        Some(index)
    }

    pub fn record_synthesized(&mut self) {
        self.synthesized += 1;
    }

    pub fn record_delivery(&mut self, segment: &AudioSegment) {
        self.delivered += 1;
        self.stats.update(segment, self.started);
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn synthesized(&self) -> usize {
        self.synthesized
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Segments handed to the engine and not yet back
    pub fn in_flight(&self) -> usize {
        self.dispatched - self.synthesized
    }

    pub fn is_fully_delivered(&self) -> bool {
        self.delivered == self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stats(&self) -> &StreamingStats {
        &self.stats
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            request_id: self.request_id,
            segments: self.delivered,
            audio_secs: self.stats.total_audio_secs,
            elapsed_ms: self.elapsed().as_millis() as u64,
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path() {
        let (mut session, observer) = StreamSession::new(Uuid::new_v4(), Instant::now());
        for next in [Normalizing, Segmenting, Synthesizing, Completed] {
            assert!(session.transition(next));
            assert_eq!(*observer.borrow(), next);
        }
    }

    #[test]
    fn test_terminal_absorbing() {
        let (mut session, _observer) = StreamSession::new(Uuid::new_v4(), Instant::now());
        assert!(session.transition(Normalizing));
        assert!(session.transition(Failed));
        assert!(!session.transition(Synthesizing));
        assert!(!session.transition(Cancelled));
        assert_eq!(session.state(), Failed);
    }

    #[test]
    fn test_no_skipping() {
        assert!(!Accepted.can_transition_to(Synthesizing));
        assert!(!Synthesizing.can_transition_to(Normalizing));
        assert!(Accepted.can_transition_to(Cancelled));
        assert!(Segmenting.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
    }

    #[test]
    fn test_dispatch_counters() {
        let (mut session, _observer) = StreamSession::new(Uuid::new_v4(), Instant::now());
        session.set_total(2);
        assert_eq!(session.next_dispatch(), Some(0));
        assert_eq!(session.next_dispatch(), Some(1));
        assert_eq!(session.next_dispatch(), None);
        assert_eq!(session.in_flight(), 2);
        session.record_synthesized();
        assert_eq!(session.in_flight(), 1);
    }

    #[test]
    fn test_serialize_state() {
        assert_eq!(serde_json::to_string(&Synthesizing).unwrap(), "\"synthesizing\"");
    }
}
