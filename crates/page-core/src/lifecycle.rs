//! Request lifecycle tracking.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::PageError;

/// Lifecycle phases for a request.
///
/// `Received → Normalized → (Serving | Rendering) → {Rendered | Bubbled | Failed}
/// → Emitting → Complete`. A fresh cache hit goes straight from `Normalized`
/// to `Serving` and then `Emitting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestPhase {
    /// Request received, processing started.
    Received,
    /// Pathname resolved and normalized.
    Normalized,
    /// A cached artifact is being served.
    Serving,
    /// The render function is running.
    Rendering,
    /// Rendering produced a result.
    Rendered,
    /// No fallback was available and the caller asked to bubble.
    Bubbled,
    /// The request failed.
    Failed,
    /// The result is being written to the response.
    Emitting,
    /// Response finalized.
    Complete,
}

impl RequestPhase {
    /// Short name used in logs and timing marks.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Normalized => "normalized",
            Self::Serving => "serving",
            Self::Rendering => "rendering",
            Self::Rendered => "rendered",
            Self::Bubbled => "bubbled",
            Self::Failed => "failed",
            Self::Emitting => "emitting",
            Self::Complete => "complete",
        }
    }

    /// Whether no further transition can happen in this core.
    ///
    /// `Bubbled` is not terminal: an outer strategy decides what comes next.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Complete)
    }

    /// Check if moving to `next` is allowed.
    pub fn can_advance_to(&self, next: RequestPhase) -> bool {
        use RequestPhase::*;

        if next == Failed {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Received, Normalized)
                | (Normalized, Serving)
                | (Normalized, Rendering)
                | (Rendering, Rendered)
                | (Rendering, Bubbled)
                | (Serving, Emitting)
                | (Rendered, Emitting)
                | (Emitting, Complete)
        )
    }
}

impl std::fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Time from start to a recorded mark.
    pub fn since_start(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request state machine.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    phase: RequestPhase,
    history: Vec<RequestPhase>,
    timing: TimingContext,
}

impl RequestLifecycle {
    /// Start a lifecycle in `Received`.
    pub fn new() -> Self {
        let mut timing = TimingContext::new();
        timing.mark(RequestPhase::Received.as_str());
        Self {
            phase: RequestPhase::Received,
            history: vec![RequestPhase::Received],
            timing,
        }
    }

    /// Move to the next phase.
    pub fn advance(&mut self, next: RequestPhase) -> Result<(), PageError> {
        if !self.phase.can_advance_to(next) {
            return Err(PageError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        self.timing.mark(next.as_str());
        Ok(())
    }

    /// Current phase.
    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Every phase visited, in order.
    pub fn history(&self) -> &[RequestPhase] {
        &self.history
    }

    /// Timing marks for each visited phase.
    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
