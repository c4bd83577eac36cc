//! Logical time, the mode state machine, the call-frame shadow stack, the
//! replay driver, and snapshot scheduling/extraction/inflation/pruning for
//! a single script context's time-travel event log.
//!
//! `ttd-eventlog` is pure storage (the arena, the chunked list, the kind
//! catalogue, the on-disk format); this crate is the policy layer on top,
//! generic over the engine-facing collaborator traits in `ttd-hostapi` the
//! same way the teacher's commit log is generic over its storage backend.
//! [`Log`] is the single entry point an embedder constructs and drives.

pub mod callstack;
pub mod config;
pub mod error;
pub mod log;
pub mod mode;
pub mod recorder;
pub mod replay;
pub mod snapshot;
pub mod time;

#[cfg(test)]
pub(crate) mod testutil;

pub use callstack::{CallFrame, CallStack, FramePopper, LastFrame, StatementResolution};
pub use config::Options;
pub use error::{AbortReason, LogError, ReplayOutcome};
pub use log::Log;
pub use mode::{BaseMode, ModeFlags, ModeStack};
pub use recorder::ScriptTableKind;
pub use snapshot::SnapTimeResult;
pub use time::{StatementSpan, TimeTracker};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_log;

    /// S1: record a top-level callback with two recorders, expect both
    /// to be stamped with consecutive event-times.
    #[test]
    fn scenario_s1_record() {
        let mut log = test_log();
        log.mode_mut().set_global_mode(BaseMode::RecordEnabled);
        log.reset_for_top_level(0, 1).unwrap();
        assert_eq!(log.record_date_time(1234.5), Some(0));
        assert_eq!(log.record_random_seed(0xA, 0xB), Some(1));
        log.call_stack().count();
        assert_eq!(log.events().count(), 2);
    }

    /// P4: every push_mode is matched by exactly one pop_mode, and the base
    /// is always one of the four variants.
    #[test]
    fn scenario_p4_mode_stack_discipline() {
        let mut log = test_log();
        log.mode_mut().push_mode(ModeFlags::EXCLUDED_EXECUTION);
        assert!(log.mode_mut().pop_mode(ModeFlags::EXCLUDED_EXECUTION).is_ok());
        assert!(matches!(
            log.mode().base(),
            BaseMode::Pending | BaseMode::Detached | BaseMode::RecordEnabled | BaseMode::DebuggingEnabled
        ));
    }

    /// S6: no recorder invoked under an ExcludedExecution overlay produces
    /// an entry.
    #[test]
    fn scenario_s6_excluded_execution_suppresses_recording() {
        let mut log = test_log();
        log.mode_mut().set_global_mode(BaseMode::RecordEnabled);
        log.reset_for_top_level(0, 1).unwrap();
        log.mode_mut().push_mode(ModeFlags::EXCLUDED_EXECUTION);
        assert_eq!(log.record_date_time(1.0), None);
        log.mode_mut().pop_mode(ModeFlags::EXCLUDED_EXECUTION).unwrap();
        assert_eq!(log.record_date_time(2.0), Some(0));
        assert_eq!(log.events().count(), 1);
    }

    /// §6 diagnostics: position tracking follows the topmost call frame,
    /// not a log-wide counter, so it reports real data once a frame is
    /// pushed and bytecode dispatch starts resolving statements.
    #[test]
    fn diagnostics_report_topmost_frame_position() {
        let mut log = test_log();
        log.mode_mut().set_global_mode(BaseMode::RecordEnabled);
        log.reset_for_top_level(0, 1).unwrap();

        let (_, popper) = log.record_call_function_begin(
            ttd_hostapi::FunctionRef(7),
            0,
            1,
            0.0,
            ttd_hostapi::VarTag(0),
            Vec::new(),
        );

        assert!(log.get_time_and_position().1.is_none());

        log.on_bytecode_dispatch(0, |_| StatementResolution {
            stmt_index: 0,
            bc_min: 0,
            bc_max: 10,
        });
        let (_, pos) = log.get_time_and_position();
        assert_eq!(pos.unwrap().stmt_index, 0);
        assert!(log.get_previous_time_and_position().is_none());

        log.update_loop_count_info();
        log.on_bytecode_dispatch(11, |_| StatementResolution {
            stmt_index: 1,
            bc_min: 11,
            bc_max: 20,
        });
        let (_, pos) = log.get_time_and_position();
        assert_eq!(pos.unwrap().stmt_index, 1);
        assert_eq!(log.get_previous_time_and_position().unwrap().stmt_index, 0);

        popper.pop_normal();
    }
}
