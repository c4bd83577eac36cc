//! Logical time counters (C4).
//!
//! Every recorded entry gets a monotone `event_time`; within a top-level
//! callback, `(function_time, loop_time, stmt_index)` additionally orders
//! statements for the debugger's step/reverse-step commands.

/// A statement's identity within a top-level callback: unique as the
/// 4-tuple `(function, function_time, loop_time, stmt_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementSpan {
    pub function: ttd_hostapi::FunctionRef,
    pub function_time: u64,
    pub loop_time: u64,
    pub stmt_index: u32,
    pub bc_min: u32,
    pub bc_max: u32,
}

/// Logical time state for one log. Owned by `Log`; advanced only while a
/// top-level callback is active.
///
/// Statement-span and loop-iteration tracking (`SingleCallCounter` in the
/// data model) live on [`crate::callstack::CallFrame`] instead of here —
/// they're per call frame, not per log, so a recursive call must not see
/// its caller's statement position.
#[derive(Debug, Clone)]
pub struct TimeTracker {
    event_time_ctr: u64,
    running_function_time_ctr: u64,
    top_level_callback_event_time: i64,
    host_callback_id: i64,
}

impl TimeTracker {
    pub fn new() -> Self {
        Self {
            event_time_ctr: 0,
            running_function_time_ctr: 0,
            top_level_callback_event_time: -1,
            host_callback_id: -1,
        }
    }

    /// Returns the current `event_time` and advances the counter. Every
    /// appended entry that participates in replay ordering calls this
    /// exactly once.
    pub fn get_and_advance_event_time(&mut self) -> u64 {
        let t = self.event_time_ctr;
        self.event_time_ctr += 1;
        t
    }

    pub fn event_time_ctr(&self) -> u64 {
        self.event_time_ctr
    }

    /// Used only by replay/inflation to reposition the counter without
    /// advancing through recording.
    pub fn set_event_time_ctr(&mut self, t: u64) {
        self.event_time_ctr = t;
    }

    /// Entry and exit of a call frame are distinguishable points in time:
    /// both push and pop advance this counter.
    pub fn advance_function_time(&mut self) -> u64 {
        let t = self.running_function_time_ctr;
        self.running_function_time_ctr += 1;
        t
    }

    pub fn function_time_ctr(&self) -> u64 {
        self.running_function_time_ctr
    }

    pub fn top_level_callback_event_time(&self) -> i64 {
        self.top_level_callback_event_time
    }

    pub fn host_callback_id(&self) -> i64 {
        self.host_callback_id
    }

    /// See C4.6: entering a top-level host callback resets the per-callback
    /// counters and stores the two boundary identifiers.
    pub fn reset_for_top_level(&mut self, event_time: i64, host_callback_id: i64) {
        self.running_function_time_ctr = 0;
        self.top_level_callback_event_time = event_time;
        self.host_callback_id = host_callback_id;
    }
}

impl Default for TimeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_time_advances_monotonically() {
        let mut t = TimeTracker::new();
        let times: Vec<_> = (0..5).map(|_| t.get_and_advance_event_time()).collect();
        assert_eq!(times, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn reset_for_top_level_zeros_function_time() {
        let mut t = TimeTracker::new();
        t.advance_function_time();
        t.advance_function_time();
        t.reset_for_top_level(7, 3);
        assert_eq!(t.function_time_ctr(), 0);
        assert_eq!(t.top_level_callback_event_time(), 7);
        assert_eq!(t.host_callback_id(), 3);
    }
}
