//! Recording entry points (C7): one method per host-observable operation.
//!
//! Uniform contract: stamp `event_time`, copy the parameters into an
//! [`ttd_eventlog::EventPayload`], append it, and return the stamped time —
//! unless recording is currently gated off (`ModeStack::should_record`),
//! in which case nothing is appended and `None` is returned. Engines are
//! expected to call these unconditionally; the mode gate living here (not
//! at every call site) is what lets `ExcludedExecution` overlays (snapshot
//! extraction, inflation) suppress recording for their whole scope.

use ttd_eventlog::events::{CallFunctionBeginPayload, CallFunctionEndPayload, CallbackOperationPayload, CodeParsePayload, ExternalCallPayload};
use ttd_eventlog::{EventLogEntry, EventPayload};
use ttd_hostapi::{HeapWalker, Inflater, LogStream, PropertyId, PropertyRegistry, VarTag};

use crate::log::Log;

impl<E, I, P, S> Log<E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    fn record(&mut self, payload: EventPayload) -> Option<u64> {
        if !self.mode.should_record() {
            return None;
        }
        let t = self.time.get_and_advance_event_time();
        self.events.append(EventLogEntry { event_time: t, payload });
        Some(t)
    }

    pub fn record_telemetry(&mut self, message: String, print: bool) -> Option<u64> {
        self.record(EventPayload::Telemetry { message, print })
    }

    pub fn record_date_time(&mut self, value: f64) -> Option<u64> {
        self.record(EventPayload::DateTime { value })
    }

    pub fn record_date_string(&mut self, value: String) -> Option<u64> {
        self.record(EventPayload::DateString { value })
    }

    pub fn record_random_seed(&mut self, low: u64, high: u64) -> Option<u64> {
        self.record(EventPayload::RandomSeed { low, high })
    }

    pub fn record_property_enum(
        &mut self,
        has_property: bool,
        pid: PropertyId,
        attributes: u32,
        name: Option<String>,
    ) -> Option<u64> {
        self.record(EventPayload::PropertyEnum {
            has_property,
            pid,
            attributes,
            name,
        })
    }

    pub fn record_symbol_creation(&mut self, pid: PropertyId) -> Option<u64> {
        self.record(EventPayload::SymbolCreation { pid })
    }

    pub fn record_external_cb_register(&mut self, callback_var: VarTag) -> Option<u64> {
        self.record(EventPayload::ExternalCbRegister { callback_var })
    }

    /// Open-question resolution: takes already-decoded bytes; the engine's
    /// value layer owns interpreting them as UTF-8/UTF-16.
    pub fn record_create_string(&mut self, bytes: Vec<u8>, result: VarTag) -> Option<u64> {
        self.record(EventPayload::CreateString { bytes, result })
    }

    pub fn record_create_number(&mut self, value: f64, result: VarTag) -> Option<u64> {
        self.record(EventPayload::CreateNumber { value, result })
    }

    pub fn record_create_boolean(&mut self, value: bool, result: VarTag) -> Option<u64> {
        self.record(EventPayload::CreateBoolean { value, result })
    }

    pub fn record_create_symbol(&mut self, description: Option<String>, result: VarTag) -> Option<u64> {
        self.record(EventPayload::CreateSymbol { description, result })
    }

    pub fn record_var_to_object(&mut self, input: VarTag, result: VarTag) -> Option<u64> {
        self.record(EventPayload::VarToObject { input, result })
    }

    /// Re-issues on replay against the engine so the tag lifecycle the
    /// inflate map relies on stays faithful (open-question resolution).
    pub fn record_add_root_ref(&mut self, var: VarTag) -> Option<u64> {
        self.record(EventPayload::AddRootRef { var })
    }

    pub fn record_remove_root_ref(&mut self, var: VarTag) -> Option<u64> {
        self.record(EventPayload::RemoveRootRef { var })
    }

    /// Zero-payload marker: participates in ordering only.
    pub fn record_event_loop_yield_point(&mut self) -> Option<u64> {
        self.record(EventPayload::EventLoopYieldPoint)
    }

    pub fn record_allocate_basic_object(&mut self, result: VarTag) -> Option<u64> {
        self.record(EventPayload::AllocateBasicObject { result })
    }

    pub fn record_allocate_array(&mut self, length: u32, result: VarTag) -> Option<u64> {
        self.record(EventPayload::AllocateArray { length, result })
    }

    pub fn record_allocate_array_buffer(&mut self, length: u32, result: VarTag) -> Option<u64> {
        self.record(EventPayload::AllocateArrayBuffer { length, result })
    }

    pub fn record_allocate_function(&mut self, name: Option<String>, result: VarTag) -> Option<u64> {
        self.record(EventPayload::AllocateFunction { name, result })
    }

    pub fn record_get_and_clear_exception(&mut self, had_exception: bool) -> Option<u64> {
        self.record(EventPayload::GetAndClearException { had_exception })
    }

    pub fn record_get_property(&mut self, object: VarTag, pid: PropertyId, result: VarTag) -> Option<u64> {
        self.record(EventPayload::GetProperty { object, pid, result })
    }

    pub fn record_get_index(&mut self, object: VarTag, index: u32, result: VarTag) -> Option<u64> {
        self.record(EventPayload::GetIndex { object, index, result })
    }

    pub fn record_get_own_property_info(
        &mut self,
        object: VarTag,
        pid: PropertyId,
        found: bool,
        attributes: u32,
    ) -> Option<u64> {
        self.record(EventPayload::GetOwnPropertyInfo {
            object,
            pid,
            found,
            attributes,
        })
    }

    pub fn record_get_own_properties_info(&mut self, object: VarTag, pids: Vec<PropertyId>) -> Option<u64> {
        self.record(EventPayload::GetOwnPropertiesInfo { object, pids })
    }

    pub fn record_define_property(&mut self, object: VarTag, pid: PropertyId, attributes: u32) -> Option<u64> {
        self.record(EventPayload::DefineProperty { object, pid, attributes })
    }

    pub fn record_delete_property(&mut self, object: VarTag, pid: PropertyId, result: bool) -> Option<u64> {
        self.record(EventPayload::DeleteProperty { object, pid, result })
    }

    pub fn record_set_prototype(&mut self, object: VarTag, prototype: VarTag) -> Option<u64> {
        self.record(EventPayload::SetPrototype { object, prototype })
    }

    pub fn record_set_property(&mut self, object: VarTag, pid: PropertyId, value: VarTag) -> Option<u64> {
        self.record(EventPayload::SetProperty { object, pid, value })
    }

    pub fn record_set_index(&mut self, object: VarTag, index: u32, value: VarTag) -> Option<u64> {
        self.record(EventPayload::SetIndex { object, index, value })
    }

    pub fn record_get_typed_array_info(
        &mut self,
        object: VarTag,
        byte_length: u32,
        byte_offset: u32,
        element_kind: u8,
    ) -> Option<u64> {
        self.record(EventPayload::GetTypedArrayInfo {
            object,
            byte_length,
            byte_offset,
            element_kind,
        })
    }

    pub fn record_construct_call(&mut self, callee: VarTag, args: Vec<VarTag>, result: VarTag) -> Option<u64> {
        self.record(EventPayload::ConstructCall { callee, args, result })
    }

    pub fn record_callback_operation(
        &mut self,
        create: bool,
        repeating: bool,
        host_callback_id: i64,
        callee: VarTag,
    ) -> Option<u64> {
        self.record(EventPayload::CallbackOperation(CallbackOperationPayload {
            create,
            repeating,
            host_callback_id,
            callee,
        }))
    }

    /// Also registers the body in the matching script table (loaded /
    /// newFunction / eval, per `load_flags`) so the on-disk format's three
    /// parallel tables stay consistent with the event stream.
    pub fn record_code_parse(
        &mut self,
        body_counter: u64,
        load_flags: u32,
        document_id: u64,
        source_uri: String,
        source_code: String,
        log_dir: String,
        table: ScriptTableKind,
    ) -> Option<u64> {
        let body = ttd_hostapi::ScriptBody {
            body_counter,
            document_id,
            source_uri: source_uri.clone(),
            source_code: source_code.clone(),
        };
        match table {
            ScriptTableKind::Loaded => self.script_tables.loaded.push(body),
            ScriptTableKind::NewFunction => self.script_tables.new_function.push(body),
            ScriptTableKind::Eval => self.script_tables.eval.push(body),
        }
        self.record(EventPayload::CodeParse(CodeParsePayload {
            body_counter,
            load_flags,
            document_id,
            source_uri,
            source_code,
            log_dir,
        }))
    }

    pub fn record_code_load(&mut self, body_counter: u64) -> Option<u64> {
        self.record(EventPayload::CodeLoad { body_counter })
    }

    /// Pushes a call frame and records `CallFunctionBegin`. `root_depth ==
    /// 0` marks a top-level (host-originated) call. Returns the stamped
    /// event time (if recording) alongside the frame popper the caller must
    /// release via `pop_normal` on a normal return, or simply drop on an
    /// unwinding script exception (see `crate::callstack`).
    pub fn record_call_function_begin(
        &mut self,
        function: ttd_hostapi::FunctionRef,
        root_depth: u32,
        host_callback_id: i64,
        wall_clock_time: f64,
        callee: VarTag,
        args: Vec<VarTag>,
    ) -> (Option<u64>, crate::callstack::FramePopper<'_>) {
        let stamped = self.record(EventPayload::CallFunctionBegin(CallFunctionBeginPayload {
            root_depth,
            host_callback_id,
            wall_clock_time,
            callee,
            args,
            rtr_snapshot: None,
        }));
        let function_time = self.time.advance_function_time();
        let popper = self.call_stack.push_frame(function, function_time, root_depth);
        (stamped, popper)
    }

    /// Records `CallFunctionEnd` and advances `running_function_time_ctr`
    /// for the matching exit point. The caller must separately release the
    /// `FramePopper` returned by `record_call_function_begin` via
    /// `pop_normal` (or drop it, for an unwinding exception).
    pub fn record_call_function_end(&mut self, root_depth: u32, host_callback_id: i64) -> Option<u64> {
        self.time.advance_function_time();
        self.record(EventPayload::CallFunctionEnd(CallFunctionEndPayload {
            root_depth,
            host_callback_id,
        }))
    }

    /// Records an external (host) call. `scoped` callers should prefer
    /// [`Self::begin_external_call`], which guarantees a well-formed record
    /// is written even if the host call unwinds before supplying a result.
    pub fn record_external_call(
        &mut self,
        root_depth: u32,
        callee: VarTag,
        args: Vec<VarTag>,
        return_value: VarTag,
        has_script_exception: bool,
        has_terminal_exception: bool,
    ) -> Option<u64> {
        let recorded = self.record(EventPayload::ExternalCall(ExternalCallPayload {
            root_depth,
            callee,
            args,
            return_value,
            has_script_exception,
            has_terminal_exception,
        }));
        self.call_stack.clear_exception_tracking();
        recorded
    }

    /// Scoped form of `record_external_call`: begins the call, and if the
    /// returned guard is dropped without `finish`, writes a terminal-
    /// exception record on release so a throwing external call still
    /// produces a well-formed log entry (spec §4.7).
    pub fn begin_external_call(&mut self, root_depth: u32, callee: VarTag, args: Vec<VarTag>) -> ExternalCallGuard<'_, E, I, P, S> {
        ExternalCallGuard {
            log: self,
            root_depth,
            callee,
            args: Some(args),
        }
    }
}

/// RAII guard for an in-flight external call. See
/// [`Log::begin_external_call`].
pub struct ExternalCallGuard<'a, E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    log: &'a mut Log<E, I, P, S>,
    root_depth: u32,
    callee: VarTag,
    args: Option<Vec<VarTag>>,
}

impl<'a, E, I, P, S> ExternalCallGuard<'a, E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    /// The call returned (normally or with a script exception already
    /// captured by the caller). Writes the final record and defuses the
    /// guard's terminal-exception fallback.
    pub fn finish(mut self, return_value: VarTag, has_script_exception: bool, has_terminal_exception: bool) -> Option<u64> {
        let args = self.args.take().expect("finish called twice");
        self.log
            .record_external_call(self.root_depth, self.callee, args, return_value, has_script_exception, has_terminal_exception)
    }
}

impl<'a, E, I, P, S> Drop for ExternalCallGuard<'a, E, I, P, S>
where
    E: HeapWalker,
    I: Inflater<Context = E::Context>,
    P: PropertyRegistry,
    S: LogStream,
{
    fn drop(&mut self) {
        if let Some(args) = self.args.take() {
            self.log.record_external_call(self.root_depth, self.callee, args, VarTag(0), true, true);
        }
    }
}

/// Which of the three script tables a `CodeParse` body belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTableKind {
    Loaded,
    NewFunction,
    Eval,
}
