//! Mode state machine (C5): a base mode plus a nested overlay stack.
//!
//! The base transitions `Pending -> {RecordEnabled, DebuggingEnabled,
//! Detached}` exactly once; everything pushed afterward is an overlay (e.g.
//! `ExcludedExecution` during snapshot extraction) that must be popped in
//! LIFO order. The *computed* mode is the OR-fold of the whole stack and is
//! what recording/replay gates check.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u8 {
        const PENDING             = 0b0000_0001;
        const RECORD_ENABLED      = 0b0000_0010;
        const DEBUGGING_ENABLED   = 0b0000_0100;
        const DETACHED            = 0b0000_1000;
        /// Overlay only: recording is suppressed while this bit is set,
        /// regardless of `RECORD_ENABLED` (used during snapshot extraction
        /// and inflation so internal engine allocations don't self-record).
        const EXCLUDED_EXECUTION  = 0b0001_0000;
    }
}

/// Base modes a log can be in. Exactly one is active at the bottom of the
/// overlay stack; transitions other than the ones below are programmer
/// error and panic (mirroring the original's debug-assertion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseMode {
    Pending,
    RecordEnabled,
    DebuggingEnabled,
    Detached,
}

impl BaseMode {
    fn flags(self) -> ModeFlags {
        match self {
            Self::Pending => ModeFlags::PENDING,
            Self::RecordEnabled => ModeFlags::RECORD_ENABLED,
            Self::DebuggingEnabled => ModeFlags::DEBUGGING_ENABLED,
            Self::Detached => ModeFlags::DETACHED,
        }
    }
}

/// The mode stack: `[0]` is the base mode, `[1..]` are overlays.
#[derive(Debug, Clone)]
pub struct ModeStack {
    base: BaseMode,
    overlays: Vec<ModeFlags>,
    computed: ModeFlags,
}

impl ModeStack {
    pub fn new() -> Self {
        let base = BaseMode::Pending;
        Self {
            base,
            overlays: Vec::new(),
            computed: base.flags(),
        }
    }

    pub fn base(&self) -> BaseMode {
        self.base
    }

    pub fn computed(&self) -> ModeFlags {
        self.computed
    }

    /// Transition the base mode. Valid only from `Pending`, and only to one
    /// of the three terminal bases (P4: `mode_stack[0]` is always one of the
    /// four `BaseMode` variants, never transitioned again once set).
    pub fn set_global_mode(&mut self, base: BaseMode) {
        debug_assert!(
            matches!(self.base, BaseMode::Pending) || base == self.base,
            "base mode transitions only out of Pending"
        );
        log::debug!("mode stack base transition: {:?} -> {:?}", self.base, base);
        self.base = base;
        self.recompute();
    }

    /// Push an overlay (e.g. `EXCLUDED_EXECUTION`). Must be matched by
    /// exactly one `pop_mode` (P4).
    pub fn push_mode(&mut self, overlay: ModeFlags) {
        self.overlays.push(overlay);
        self.recompute();
    }

    /// Pop the most recently pushed overlay, asserting it matches `expect`
    /// (LIFO discipline). Returns an error rather than panicking so a
    /// release build can surface the bug as `LogError` instead of crashing.
    pub fn pop_mode(&mut self, expect: ModeFlags) -> Result<(), crate::error::LogError> {
        match self.overlays.last() {
            Some(&top) if top == expect => {
                self.overlays.pop();
                self.recompute();
                Ok(())
            }
            Some(_) | None => {
                log::warn!("mode stack underflow: pop_mode({expect:?}) on overlays {:?}", self.overlays);
                Err(crate::error::LogError::ModeStackUnderflow)
            }
        }
    }

    pub fn set_debugging(&mut self, enabled: bool) {
        if enabled {
            self.base = BaseMode::DebuggingEnabled;
        } else if self.base == BaseMode::DebuggingEnabled {
            self.base = BaseMode::Pending;
        }
        self.recompute();
    }

    /// Recording is gated on `RECORD_ENABLED && !EXCLUDED_EXECUTION`.
    pub fn should_record(&self) -> bool {
        self.computed.contains(ModeFlags::RECORD_ENABLED) && !self.computed.contains(ModeFlags::EXCLUDED_EXECUTION)
    }

    /// Replay proceeds whenever the base mode is `DebuggingEnabled`.
    pub fn should_replay(&self) -> bool {
        self.base == BaseMode::DebuggingEnabled
    }

    fn recompute(&mut self) {
        self.computed = self
            .overlays
            .iter()
            .fold(self.base.flags(), |acc, &o| acc | o);
    }
}

impl Default for ModeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excluded_execution_suppresses_recording_p6_s6() {
        let mut m = ModeStack::new();
        m.set_global_mode(BaseMode::RecordEnabled);
        assert!(m.should_record());
        m.push_mode(ModeFlags::EXCLUDED_EXECUTION);
        assert!(!m.should_record());
        m.pop_mode(ModeFlags::EXCLUDED_EXECUTION).unwrap();
        assert!(m.should_record());
    }

    #[test]
    fn mismatched_pop_errors_p4() {
        let mut m = ModeStack::new();
        m.push_mode(ModeFlags::EXCLUDED_EXECUTION);
        let err = m.pop_mode(ModeFlags::DEBUGGING_ENABLED).unwrap_err();
        assert!(matches!(err, crate::error::LogError::ModeStackUnderflow));
    }

    #[test]
    fn debugging_enables_replay() {
        let mut m = ModeStack::new();
        assert!(!m.should_replay());
        m.set_debugging(true);
        assert!(m.should_replay());
    }
}
