//! Reasoning display state.
//!
//! While the loop runs, a compact "what the agent is doing" view is kept
//! live: a rolling window of the last few step summaries plus elapsed time,
//! serialized as a one-line marker that travels inline with the streamed
//! text. A 100ms display timer re-renders the view and doubles as the
//! abort watchdog.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use inklore_core::cancel::{CancelSignal, TerminalNotice};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::trace;

/// Rolling window size for the live view.
const ROLLING_WINDOW: usize = 4;

/// Display refresh interval; also the abort-watchdog polling rate.
const DISPLAY_TICK: Duration = Duration::from_millis(100);

const MARKER_PREFIX: &str = "<!--reasoning:";
const MARKER_SUFFIX: &str = "-->";

/// The notice emitted exactly once when a run is interrupted.
pub const INTERRUPTED_NOTICE: &str = "_Generation interrupted._";

/// Shared callback the loop and the timer both render through.
pub type UpdateFn = dyn Fn(&str) + Send + Sync;

/// Display status of the reasoning view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningStatus {
    Idle,
    Reasoning,
    Collapsed,
    Complete,
}

/// One recorded reasoning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// The typed envelope embedded in the text channel as a one-line marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningMarker {
    pub status: ReasoningStatus,
    pub elapsed_secs: u64,
    pub steps: Vec<String>,
}

impl Default for ReasoningMarker {
    fn default() -> Self {
        Self {
            status: ReasoningStatus::Idle,
            elapsed_secs: 0,
            steps: Vec::new(),
        }
    }
}

impl ReasoningMarker {
    /// Serialize as a single-line structured comment.
    pub fn render(&self) -> String {
        let payload = serde_json::to_string(self).unwrap_or_default();
        format!("{MARKER_PREFIX}{payload}{MARKER_SUFFIX}")
    }

    /// Parse the first marker found in `text`. Malformed embedded JSON
    /// degrades to an empty step list rather than failing.
    pub fn parse(text: &str) -> Option<Self> {
        let start = text.find(MARKER_PREFIX)?;
        let rest = &text[start + MARKER_PREFIX.len()..];
        let end = rest.find(MARKER_SUFFIX)?;
        match serde_json::from_str(&rest[..end]) {
            Ok(marker) => Some(marker),
            Err(e) => {
                trace!(error = %e, "Malformed reasoning marker payload");
                Some(Self::default())
            }
        }
    }
}

#[derive(Debug)]
struct TrackerInner {
    status: ReasoningStatus,
    started_at: Option<Instant>,
    elapsed_secs: u64,
    recent: VecDeque<ReasoningStep>,
    history: Vec<ReasoningStep>,
    streamed_text: String,
}

impl TrackerInner {
    fn marker(&self, steps: Vec<String>) -> ReasoningMarker {
        ReasoningMarker {
            status: self.status,
            elapsed_secs: self.elapsed_secs,
            steps,
        }
    }
}

/// Timer-driven display state machine, mutated only under control of the
/// loop controller. Cloning shares state.
#[derive(Clone)]
pub struct ReasoningTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl ReasoningTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                status: ReasoningStatus::Idle,
                started_at: None,
                elapsed_secs: 0,
                recent: VecDeque::new(),
                history: Vec::new(),
                streamed_text: String::new(),
            })),
        }
    }

    /// Reset and enter `Reasoning`. Called at the start of each run.
    pub fn begin(&self) {
        let mut inner = self.lock();
        inner.status = ReasoningStatus::Reasoning;
        inner.started_at = Some(Instant::now());
        inner.elapsed_secs = 0;
        inner.recent.clear();
        inner.history.clear();
        inner.streamed_text.clear();
    }

    /// Record a step. Always appended to the unbounded history; unless
    /// `display_only`, also pushed to the rolling window, evicting the
    /// oldest entry past the window size.
    pub fn add_step(&self, summary: impl Into<String>, tool_name: Option<String>, display_only: bool) {
        let step = ReasoningStep {
            timestamp: Utc::now(),
            summary: summary.into(),
            tool_name,
        };
        let mut inner = self.lock();
        if !display_only {
            inner.recent.push_back(step.clone());
            while inner.recent.len() > ROLLING_WINDOW {
                inner.recent.pop_front();
            }
        }
        inner.history.push(step);
    }

    /// Replace the streamed-text portion of the rendered view.
    pub fn set_streamed_text(&self, text: &str) {
        self.lock().streamed_text = text.to_string();
    }

    /// Mark the answer as streaming (reasoning view folds away).
    pub fn collapse(&self) {
        let mut inner = self.lock();
        inner.elapsed_secs = Self::elapsed(&inner);
        inner.status = ReasoningStatus::Collapsed;
    }

    /// Finalize the run.
    pub fn complete(&self) {
        let mut inner = self.lock();
        inner.elapsed_secs = Self::elapsed(&inner);
        inner.status = ReasoningStatus::Complete;
    }

    pub fn status(&self) -> ReasoningStatus {
        self.lock().status
    }

    /// Full history summaries, for best-effort answers and the expanded view.
    pub fn step_summaries(&self) -> Vec<String> {
        self.lock().history.iter().map(|s| s.summary.clone()).collect()
    }

    /// The live view: rolling-window marker plus streamed text.
    pub fn render(&self) -> String {
        let inner = self.lock();
        let steps = inner.recent.iter().map(|s| s.summary.clone()).collect();
        let marker = inner.marker(steps).render();
        if inner.streamed_text.is_empty() {
            marker
        } else {
            format!("{marker}\n{}", inner.streamed_text)
        }
    }

    /// The finalized marker embedding the full step history.
    pub fn final_marker(&self) -> String {
        let inner = self.lock();
        let steps = inner.history.iter().map(|s| s.summary.clone()).collect();
        inner.marker(steps).render()
    }

    /// Recompute elapsed seconds from the run start.
    pub fn tick_elapsed(&self) {
        let mut inner = self.lock();
        inner.elapsed_secs = Self::elapsed(&inner);
    }

    /// Spawn the display timer. Ticks while status is `Reasoning`,
    /// re-rendering the view through `on_update`. Doubles as the abort
    /// watchdog: on cancellation it races the loop for the terminal-notice
    /// claim and, if it wins, emits the interrupted notice.
    pub fn spawn_display_timer(
        &self,
        on_update: Arc<UpdateFn>,
        cancel: CancelSignal,
        notice: TerminalNotice,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DISPLAY_TICK);
            // The first tick of a tokio interval fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if cancel.is_cancelled() {
                    if notice.try_claim() {
                        on_update.as_ref()(&format!("{}\n\n{INTERRUPTED_NOTICE}", tracker.render()));
                    }
                    return;
                }
                if tracker.status() != ReasoningStatus::Reasoning {
                    return;
                }
                tracker.tick_elapsed();
                on_update.as_ref()(&tracker.render());
            }
        })
    }

    fn elapsed(inner: &TrackerInner) -> u64 {
        inner
            .started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(inner.elapsed_secs)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerInner> {
        // Poisoning cannot outlive a single-process display state; recover.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ReasoningTracker {
    fn default() -> Self {
        Self::new()
    }
}
