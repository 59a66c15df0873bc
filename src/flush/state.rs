//! Flush scheduling state machine
//!
//! ```text
//! state              write               timer fired     flush complete
//! ─────────────────  ──────────────────  ──────────────  ─────────────────
//! Idle               Scheduled(now+d)    -               -
//! Scheduled(t)       Scheduled(now+d)    Flushing(None)  -
//! Flushing(None)     Flushing(now+d)     -               Idle
//! Flushing(Some(t))  Flushing(now+d)     -               Scheduled(t)
//! ```
//!
//! An inline (forced) flush moves `Scheduled` back to `Idle`.
//!
//! Only the timer thread enters `Flushing`, so a timer flush never overlaps
//! itself. Writes arriving mid-flush are remembered as a re-arm deadline
//! instead of starting a second flush.

use std::time::Instant;

/// State of the debounce timer for one store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// Nothing pending
    Idle,

    /// A flush will run at `deadline` unless re-armed
    Scheduled { deadline: Instant },

    /// The timer thread is flushing; `rearm` is set by writes that arrived
    Flushing { rearm: Option<Instant> },

    /// The coalescer is shutting down
    Stopped,
}

impl FlushState {
    /// A write was recorded; (re)arm the timer to `deadline`
    pub fn on_write(self, deadline: Instant) -> Self {
        match self {
            FlushState::Idle | FlushState::Scheduled { .. } => FlushState::Scheduled { deadline },
            FlushState::Flushing { .. } => FlushState::Flushing {
                rearm: Some(deadline),
            },
            FlushState::Stopped => FlushState::Stopped,
        }
    }

    /// The quiescence period elapsed
    pub fn on_timer_fired(self) -> Self {
        match self {
            FlushState::Scheduled { .. } => FlushState::Flushing { rearm: None },
            other => other,
        }
    }

    /// The timer-driven flush finished
    pub fn on_flush_complete(self) -> Self {
        match self {
            FlushState::Flushing { rearm: Some(deadline) } => FlushState::Scheduled { deadline },
            FlushState::Flushing { rearm: None } => FlushState::Idle,
            other => other,
        }
    }

    /// A caller flushed inline (hard cap or explicit flush)
    pub fn on_forced_flush(self) -> Self {
        match self {
            FlushState::Scheduled { .. } => FlushState::Idle,
            other => other,
        }
    }

    /// Shut down; nothing fires afterwards
    pub fn on_stop(self) -> Self {
        FlushState::Stopped
    }
}
