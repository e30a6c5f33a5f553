//! Cooperative cancellation primitives.
//!
//! A run is cancelled by setting a shared flag plus a reason. The loop, the
//! chunk-consumption path, and the display timer all check the same flag at
//! their suspension points; a cancelled stream is drained cleanly rather
//! than abandoned.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Ordinary interruption; partial progress is persisted.
    Interrupted,
    /// The user started a new conversation; persistence is suppressed.
    NewConversation,
}

#[derive(Debug, Default)]
struct CancelInner {
    flag: AtomicBool,
    reason: OnceLock<CancelReason>,
}

/// A shared cancellation signal, settable by the caller at any time.
///
/// Cloning is cheap; all clones observe the same state. The first reason
/// set wins — later `cancel` calls keep the flag set but do not overwrite
/// the recorded reason.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal with the given reason.
    pub fn cancel(&self, reason: CancelReason) {
        let _ = self.inner.reason.set(reason);
        self.inner.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// The recorded reason, if cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.is_cancelled() {
            self.inner.reason.get().copied()
        } else {
            None
        }
    }

    /// Whether the finalized exchange should still be persisted.
    pub fn should_persist(&self) -> bool {
        self.reason() != Some(CancelReason::NewConversation)
    }
}

/// A single-assignment claim on emitting the terminal "interrupted" notice.
///
/// The loop and the display timer race to discover cancellation; whichever
/// claims this flag first emits the notice, and the other path suppresses
/// its own emission.
#[derive(Debug, Clone, Default)]
pub struct TerminalNotice {
    claimed: Arc<AtomicBool>,
}

impl TerminalNotice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to claim the right to emit the notice. Returns true exactly
    /// once across all clones.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether the notice has already been claimed by some path.
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}
