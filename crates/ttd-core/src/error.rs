//! Error and control-flow types for the replay driver and log lifecycle.
//!
//! `thiserror` enums for true failures, mirroring `ttd_eventlog::error` and
//! `commitlog::error`; a plain sum type for the *expected* unwind-to-host
//! control flow, per the teacher's own "prefer exhaustive matching over
//! runtime dispatch where the language allows it" instinct applied here to
//! panic-free control flow instead.

use thiserror::Error;

/// Why a replay step handed control back to the host instead of continuing.
/// Not a failure — this is the only supported way to exit a replay step.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The cursor ran off the end of the event list.
    EndOfLog,
    /// A source-location step/reverse-step resolved to an earlier anchor;
    /// carries the target event time the trampoline should `find_snap_time`
    /// and re-enter replay at.
    JumpTo(u64),
    /// A breakpoint was hit requiring reinflation at `event_time`.
    Breakpoint(u64),
}

/// The result of a single replay step (or a run of steps).
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// The step(s) completed normally; the cursor is positioned at the next
    /// unreplayed entry (or the list is exhausted with no further entries to
    /// report, which itself will surface as `Aborted(EndOfLog)` on the next
    /// call).
    Continue,
    Aborted(AbortReason),
}

impl ReplayOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_))
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error(transparent)]
    Format(#[from] ttd_eventlog::ParseError),

    #[error(transparent)]
    Emit(#[from] ttd_eventlog::EmitError),

    #[error(transparent)]
    HostApi(#[from] ttd_hostapi::HostApiError),

    /// The next event's `event_time` or kind disagrees with what the
    /// replay cursor expected. A hard assertion failure in diagnostic
    /// builds; production builds are expected to escalate this to
    /// `ReplayOutcome::Aborted` instead of ever constructing this variant
    /// (see `Log::assert_in_sync`).
    #[error("out of sync: expected {expected_kind:?}@{expected_time}, found {found_kind:?}@{found_time}")]
    OutOfSync {
        expected_kind: ttd_eventlog::EventKind,
        expected_time: u64,
        found_kind: ttd_eventlog::EventKind,
        found_time: u64,
    },

    #[error("snapshot reports {0} script contexts; the core requires exactly one")]
    MultipleContexts(u32),

    #[error("mode stack underflow: pop_mode called with an empty overlay stack")]
    ModeStackUnderflow,

    #[error("call stack was not empty ({0} frames) at a top-level callback boundary")]
    CallStackNotEmpty(usize),

    #[error("no snapshot or RTR-carrying entry exists at or before event_time {0}")]
    NoSnapshotBefore(u64),

    #[error("replay cursor exhausted: no further entries to replay")]
    ReplayExhausted,
}
