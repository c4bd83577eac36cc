//! Snapshot scheduling, extraction, `find_snap_time`, inflation, and the
//! pruner (C9).
//!
//! Extraction and inflation both run under an `ExcludedExecution` overlay
//! so the engine's own internal allocations during the walk don't
//! recursively record — the same overlay mechanism `ModeStack` already
//! provides for C5, reused here rather than invented specially for
//! snapshots (mirroring how the teacher keeps `SnapshotWorker` a thin
//! caller of the same locking/state primitives the rest of the database
//! uses, rather than growing its own).

use ttd_eventlog::events::SnapshotPayload;
use ttd_eventlog::{EventLogEntry, EventPayload};
use ttd_hostapi::{HeapWalker, Inflater, LogStream, PropertyRegistry, SnapshotBlob};

use crate::error::LogError;
use crate::log::Log;
use crate::mode::ModeFlags;

/// What `find_snap_time` reports in addition to the anchor event time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapTimeResult {
    pub anchor_event_time: u64,
    /// True iff the chosen snapshot differs from the last one inflated
    /// while an inflate map still exists — the caller must allocate fresh
    /// context state rather than re-preparing in place.
    pub needs_fresh_context: bool,
}

impl<E, I, P, S> Log<E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    /// Scheduling: feed a wall-clock delta; `is_time_for_snapshot` flips
    /// once the accumulated delta exceeds `snapshot_interval`.
    pub fn increment_elapsed(&mut self, dt: f64) {
        self.elapsed_since_snapshot += dt;
    }

    pub fn is_time_for_snapshot(&self) -> bool {
        self.elapsed_since_snapshot > self.options.snapshot_interval
    }

    /// Extracts a snapshot of the live context and appends an anchor
    /// `Snapshot` entry. Runs the walk under `ExcludedExecution` so the
    /// walker's own scratch allocations don't recurse into recording.
    pub fn do_snapshot_extract(&mut self, restore_log_tag: u64) -> Result<Option<u64>, LogError> {
        let Some(ctx) = self.ctx.take() else {
            return Ok(None);
        };
        self.mode.push_mode(ModeFlags::EXCLUDED_EXECUTION);
        let roots = self.heap_walker.extract_snapshot_roots(&ctx);
        let mut state = self.heap_walker.begin_snapshot(&ctx);
        self.heap_walker.mark_walk(&mut state, &roots);
        self.heap_walker.evacuate(&mut state);
        let (blob, _cardinalities) = self.heap_walker.complete(state);
        self.ctx = Some(ctx);
        self.mode
            .pop_mode(ModeFlags::EXCLUDED_EXECUTION)
            .map_err(|_| LogError::ModeStackUnderflow)?;

        self.elapsed_since_snapshot = 0.0;
        let restore_event_time = self.time.event_time_ctr() as i64;
        let t = self.time.get_and_advance_event_time();
        self.events.append(EventLogEntry {
            event_time: t,
            payload: EventPayload::Snapshot(SnapshotPayload {
                blob,
                restore_event_time,
                restore_log_tag,
            }),
        });
        Ok(Some(t))
    }

    /// Ready-to-run snapshots: attaches a snapshot to `entry_time`'s
    /// `CallFunctionBegin` payload if it doesn't already carry one.
    /// Idempotent (P7).
    pub fn do_rtr_snap_if_needed(&mut self, entry_time: u64, restore_log_tag: u64) -> Result<bool, LogError> {
        let cursor = self.find_cursor_at(entry_time);
        let already_has_rtr = cursor
            .as_ref()
            .and_then(|c| self.events.get(c))
            .and_then(|e| e.payload.as_call_function_begin())
            .is_some_and(|p| p.rtr_snapshot.is_some());
        if already_has_rtr {
            return Ok(false);
        }
        let Some(ctx) = self.ctx.take() else { return Ok(false) };
        self.mode.push_mode(ModeFlags::EXCLUDED_EXECUTION);
        let roots = self.heap_walker.extract_snapshot_roots(&ctx);
        let mut state = self.heap_walker.begin_snapshot(&ctx);
        self.heap_walker.mark_walk(&mut state, &roots);
        self.heap_walker.evacuate(&mut state);
        let (blob, _cardinalities) = self.heap_walker.complete(state);
        self.ctx = Some(ctx);
        self.mode
            .pop_mode(ModeFlags::EXCLUDED_EXECUTION)
            .map_err(|_| LogError::ModeStackUnderflow)?;
        let _ = restore_log_tag;

        // The event list only hands out shared references; rebuilding the
        // entry via `pop_oldest`/`append` would disturb ordering, so the
        // attach happens through a dedicated mutator the list exposes for
        // exactly this case.
        self.attach_rtr_snapshot(entry_time, blob)
    }

    fn find_cursor_at(&self, event_time: u64) -> Option<ttd_eventlog::Cursor> {
        let mut cur = self.events.iter_first();
        while cur.is_valid() {
            if self.events.get(&cur)?.event_time == event_time {
                return Some(cur);
            }
            cur = self.events.next(&cur);
        }
        None
    }

    fn attach_rtr_snapshot(&mut self, entry_time: u64, blob: SnapshotBlob) -> Result<bool, LogError> {
        let Some(cursor) = self.find_cursor_at(entry_time) else {
            return Ok(false);
        };
        let Some(entry) = self.events.get_mut(&cursor) else {
            return Ok(false);
        };
        let Some(begin) = entry.payload.as_call_function_begin_mut() else {
            return Ok(false);
        };
        if begin.rtr_snapshot.is_some() {
            return Ok(false);
        }
        begin.rtr_snapshot = Some(blob);
        Ok(true)
    }

    /// Scans backward from the tail for the most recent Snapshot or
    /// RTR-carrying `CallFunctionBegin` at or before `target` (P8).
    pub fn find_snap_time(&self, target: u64) -> Result<SnapTimeResult, LogError> {
        let mut cur = self.events.iter_last();
        while cur.is_valid() {
            let entry = self.events.get(&cur).ok_or(LogError::NoSnapshotBefore(target))?;
            if entry.event_time <= target {
                let is_anchor = matches!(&entry.payload, EventPayload::Snapshot(_))
                    || entry
                        .payload
                        .as_call_function_begin()
                        .is_some_and(|p| p.rtr_snapshot.is_some());
                if is_anchor {
                    let needs_fresh_context =
                        self.inflate_map.is_some() && self.last_inflate_snapshot_time != Some(entry.event_time);
                    return Ok(SnapTimeResult {
                        anchor_event_time: entry.event_time,
                        needs_fresh_context,
                    });
                }
            }
            cur = self.events.prev(&cur);
        }
        Err(LogError::NoSnapshotBefore(target))
    }

    /// Inflates the context at `etime`'s anchor snapshot: forces re-prep of
    /// the inflate map (or allocates a fresh one, evicting any other
    /// in-memory snapshot state), resets logical time, and repositions the
    /// replay cursor to the event whose time equals the restored
    /// `event_time_ctr` (advancing past it if that event is itself a
    /// Snapshot). Finishes with `reset_for_top_level(-1, -1)`.
    pub fn do_inflate(&mut self, etime: u64) -> Result<(), LogError> {
        let cursor = self.find_cursor_at(etime).ok_or(LogError::NoSnapshotBefore(etime))?;
        let entry = self.events.get(&cursor).ok_or(LogError::NoSnapshotBefore(etime))?.clone();
        let (blob, restore_event_time, restore_log_tag) = match &entry.payload {
            EventPayload::Snapshot(p) => (p.blob.clone(), p.restore_event_time, p.restore_log_tag),
            EventPayload::CallFunctionBegin(p) if p.rtr_snapshot.is_some() => {
                (p.rtr_snapshot.clone().unwrap(), self.time.event_time_ctr() as i64, 0)
            }
            _ => return Err(LogError::NoSnapshotBefore(etime)),
        };

        self.mode.push_mode(ModeFlags::EXCLUDED_EXECUTION);
        let reuse_existing = self.last_inflate_snapshot_time == Some(etime);
        let existing = if reuse_existing { self.inflate_map.take() } else { None };
        if !reuse_existing {
            self.inflate_map = None;
        }
        // Cardinalities are opaque to the core beyond sizing; a real
        // embedder would derive them from the blob. The mock/path here
        // mirrors `prep_for_inflate`'s "existing vs fresh" contract.
        let cardinalities = ttd_hostapi::Cardinalities::default();
        let mut map = self.inflater.prep_for_inflate(cardinalities, existing);
        if let Some(ctx) = self.ctx.as_mut() {
            self.inflater
                .inflate_script_context(&blob, ctx, &mut map, &self.script_tables)?;
        }
        self.inflater.cleanup_inflate_map(map);
        self.inflate_map = None;
        self.last_inflate_snapshot_time = Some(etime);
        self.mode
            .pop_mode(ModeFlags::EXCLUDED_EXECUTION)
            .map_err(|_| LogError::ModeStackUnderflow)?;

        self.time.set_event_time_ctr(restore_event_time.max(0) as u64);
        let _ = restore_log_tag;

        let mut repositioned = self.find_cursor_at(self.time.event_time_ctr());
        if let Some(c) = &repositioned {
            if matches!(self.events.get(c).map(|e| &e.payload), Some(EventPayload::Snapshot(_))) {
                repositioned = Some(self.events.next(c));
            }
        }
        self.replay_cursor = repositioned;

        self.reset_for_top_level(-1, -1)
    }

    /// Removes the oldest retained snapshot (and every event strictly
    /// before it) once `snapshot_history_length` is exceeded, provided no
    /// live inflate map or in-flight replay still references an event-time
    /// at or before it. Never removes the single most-recent-before-any-
    /// live-reference snapshot (preserves I3). The embedder calls this on
    /// its own schedule; the core never prunes automatically.
    pub fn prune(&mut self) -> usize {
        let retained = self.count_retained_snapshots();
        if retained <= self.options.snapshot_history_length {
            return 0;
        }
        let floor = self
            .replay_cursor
            .as_ref()
            .and_then(|c| self.events.get(c))
            .map(|e| e.event_time)
            .or(self.last_inflate_snapshot_time)
            .unwrap_or(u64::MAX);

        let mut removed = 0;
        let mut to_drop = retained - self.options.snapshot_history_length;
        while to_drop > 0 {
            let Some(entry) = self.events.get(&self.events.iter_first()) else {
                break;
            };
            if entry.event_time >= floor {
                break;
            }
            let is_snapshot = matches!(entry.payload, EventPayload::Snapshot(_));
            self.events.pop_oldest();
            removed += 1;
            if is_snapshot {
                to_drop -= 1;
            }
        }
        if removed > 0 {
            log::debug!("pruned {removed} entries below floor {floor}, {retained} snapshots retained before pruning");
        }
        removed
    }

    fn count_retained_snapshots(&self) -> usize {
        let mut count = 0;
        let mut cur = self.events.iter_first();
        while cur.is_valid() {
            if let Some(entry) = self.events.get(&cur) {
                if matches!(entry.payload, EventPayload::Snapshot(_)) {
                    count += 1;
                }
            }
            cur = self.events.next(&cur);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn find_snap_time_returns_lower_bound_p8_s4() {
        let mut log = test_log();
        log.mode_mut().set_global_mode(crate::mode::BaseMode::RecordEnabled);
        log.reset_for_top_level(0, 1).unwrap();
        for _ in 0..10 {
            log.record_date_time(0.0);
        }
        log.do_snapshot_extract(0).unwrap();
        for _ in 0..40 {
            log.record_date_time(0.0);
        }
        let result = log.find_snap_time(30).unwrap();
        assert_eq!(result.anchor_event_time, 10);
    }

    #[test]
    fn rtr_snapshot_attaches_once_p7() {
        let mut log = test_log();
        log.mode_mut().set_global_mode(crate::mode::BaseMode::RecordEnabled);
        log.reset_for_top_level(0, 1).unwrap();
        let (t, popper) = log.record_call_function_begin(ttd_hostapi::FunctionRef(1), 0, 1, 0.0, ttd_hostapi::VarTag(1), vec![]);
        popper.pop_normal();
        let t = t.unwrap();
        assert!(log.do_rtr_snap_if_needed(t, 0).unwrap());
        assert!(!log.do_rtr_snap_if_needed(t, 0).unwrap());
    }
}
