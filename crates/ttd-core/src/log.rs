//! The top-level `Log` owner type: the runtime-facing surface of spec §6.
//!
//! Generic over the embedder's collaborator types the same way the
//! teacher's `commitlog::Generic<R: Repo, T>` is generic over its storage
//! backend — an embedder supplies one concrete type per `ttd-hostapi`
//! trait instead of a vtable of raw function pointers. `ScriptActivityProbe`
//! is taken as a transient `&mut dyn` argument on the few calls that need it
//! (external-call replay, leave-script scopes) rather than folded into
//! `Log`'s own type parameters, since the core never holds one across calls.

use std::marker::PhantomData;
use std::path::PathBuf;

use ttd_eventlog::EventList;
use ttd_hostapi::{HeapWalker, Inflater, LogStream, PropertyRegistry};

use crate::callstack::CallStack;
use crate::config::Options;
use crate::mode::ModeStack;
use crate::time::TimeTracker;

/// The log owner. Not `Send`/`Sync`: it is built around raw arena/list
/// indices that alias the way an `Rc` would, so a compile-time single-thread
/// guarantee is obtained for free instead of relying on a documented
/// convention (see DESIGN.md — REDESIGN, behavior unchanged).
pub struct Log<E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    pub(crate) options: Options,
    pub(crate) mode: ModeStack,
    pub(crate) time: TimeTracker,
    pub(crate) call_stack: CallStack,
    pub(crate) events: EventList,
    pub(crate) heap_walker: E,
    pub(crate) inflater: I,
    pub(crate) properties: P,
    pub(crate) stream: S,
    pub(crate) log_dir: PathBuf,
    pub(crate) script_tables: ttd_hostapi::ScriptTables,
    pub(crate) ctx: Option<E::Context>,

    pub(crate) last_inflate_snapshot_time: Option<u64>,
    pub(crate) inflate_map: Option<I::InflateMap>,
    pub(crate) elapsed_since_snapshot: f64,
    pub(crate) replay_cursor: Option<ttd_eventlog::Cursor>,

    _not_send_sync: PhantomData<*const ()>,
}

impl<E, I, P, S> Log<E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    pub fn new(options: Options, log_dir: PathBuf, heap_walker: E, inflater: I, properties: P, stream: S) -> Self {
        Self {
            events: EventList::with_chunk_capacity(options.chunk_capacity),
            options,
            mode: ModeStack::new(),
            time: TimeTracker::new(),
            call_stack: CallStack::new(),
            heap_walker,
            inflater,
            properties,
            stream,
            log_dir,
            script_tables: ttd_hostapi::ScriptTables::default(),
            ctx: None,
            last_inflate_snapshot_time: None,
            inflate_map: None,
            elapsed_since_snapshot: 0.0,
            replay_cursor: None,
            _not_send_sync: PhantomData,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn mode(&self) -> &ModeStack {
        &self.mode
    }

    pub fn mode_mut(&mut self) -> &mut ModeStack {
        &mut self.mode
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn events(&self) -> &EventList {
        &self.events
    }

    pub fn log_dir(&self) -> &std::path::Path {
        &self.log_dir
    }

    /// Attach the engine context this log records/replays against. Requires
    /// an empty call stack (the engine must not already be mid-callback).
    pub fn start_on(&mut self, ctx: E::Context) -> Result<(), crate::error::LogError> {
        self.call_stack.reset_for_top_level()?;
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Detach and return the engine context, leaving the log's own state
    /// (events, mode, time) untouched so it can be resumed later by another
    /// `start_on`.
    pub fn stop_on(&mut self) -> Option<E::Context> {
        self.ctx.take()
    }

    pub fn ctx(&self) -> Option<&E::Context> {
        self.ctx.as_ref()
    }

    pub fn ctx_mut(&mut self) -> Option<&mut E::Context> {
        self.ctx.as_mut()
    }

    /// C4.6: entering a top-level host callback. Requires an empty call
    /// stack (P5) and resets the per-callback time counters.
    pub fn reset_for_top_level(&mut self, event_time: i64, host_callback_id: i64) -> Result<(), crate::error::LogError> {
        self.call_stack.reset_for_top_level()?;
        self.time.reset_for_top_level(event_time, host_callback_id);
        Ok(())
    }

    pub fn time(&self) -> &TimeTracker {
        &self.time
    }

    /// §6 diagnostics: the current logical position, as tracked on the
    /// topmost call frame.
    pub fn get_time_and_position(&self) -> (u64, Option<crate::time::StatementSpan>) {
        let position = self.call_stack.top().and_then(crate::callstack::CallFrame::current_position);
        (self.time.event_time_ctr(), position)
    }

    pub fn get_previous_time_and_position(&self) -> Option<crate::time::StatementSpan> {
        self.call_stack.top().and_then(crate::callstack::CallFrame::last_position)
    }

    /// C6: a loop back-edge fired in the currently executing frame. Separate
    /// from [`Self::on_bytecode_dispatch`] — a loop body that re-dispatches
    /// the same statement every iteration still needs its iteration count
    /// bumped, even though the statement index itself never changes.
    pub fn update_loop_count_info(&mut self) {
        self.call_stack.update_loop_count_info();
    }

    /// C6: resolves a bytecode dispatch in the currently executing frame
    /// against its current statement span, rotating current into last on a
    /// genuine transition. `resolve` is the embedder's bytecode-to-statement
    /// map, consulted only when the dispatch has left the cached span.
    pub fn on_bytecode_dispatch(&mut self, bc_offset: u32, resolve: impl FnOnce(u32) -> crate::callstack::StatementResolution) {
        self.call_stack.update_current_statement_info(bc_offset, resolve);
    }

    pub fn get_exception_or_return_time_and_position(&self) -> Option<crate::callstack::LastFrame> {
        self.call_stack.last_frame()
    }

    /// Scans the event list for the entry whose payload carries
    /// `host_callback_id`, matching whichever boundary (`CallbackOperation`
    /// registration, or `CallFunctionBegin`/`End`) `is_register` asks for.
    pub fn get_event_for_host_callback_id(&self, is_register: bool, host_id: i64) -> Option<u64> {
        let mut cur = self.events.iter_first();
        while cur.is_valid() {
            let entry = self.events.get(&cur)?;
            let matches = match &entry.payload {
                ttd_eventlog::EventPayload::CallbackOperation(p) if is_register => p.host_callback_id == host_id,
                ttd_eventlog::EventPayload::CallFunctionBegin(p) if !is_register => p.host_callback_id == host_id,
                _ => false,
            };
            if matches {
                return Some(entry.event_time);
            }
            cur = self.events.next(&cur);
        }
        None
    }

    /// §6 diagnostics: the `k`-th entry's event time, in append order.
    pub fn get_kth_event_time(&self, k: usize) -> Option<u64> {
        let mut cur = self.events.iter_first();
        let mut i = 0;
        while cur.is_valid() {
            if i == k {
                return self.events.get(&cur).map(|e| e.event_time);
            }
            cur = self.events.next(&cur);
            i += 1;
        }
        None
    }
}
