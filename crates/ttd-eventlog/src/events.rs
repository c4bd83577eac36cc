//! The event kind catalogue: one variant per host-observable operation in
//! the recorder/replayer contract, plus the anchor `Snapshot` kind.
//!
//! The original C++ core dispatches on these via a parallel array of
//! function pointers (the "kind dispatch table"). Rust has sum types, so
//! [`EventPayload`] is a plain `enum` and emit/parse/unload are exhaustive
//! `match`es in [`crate::format`] and [`crate::list`] — the compiler, not a
//! runtime table, enforces that every kind is handled. [`DispatchTable`]
//! (see [`crate::dispatch`]) still exists to satisfy the *external* part of
//! the contract: a per-kind JsRT replay dispatcher an embedder can override.

use ttd_hostapi::{FunctionRef, PropertyId, SnapshotBlob, VarTag};

/// Discriminant for an [`EventPayload`], used for fast `match`-free checks
/// (e.g. "is the current entry a `Snapshot`?") and as the [`DispatchTable`]
/// index.
///
/// [`DispatchTable`]: crate::dispatch::DispatchTable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    Telemetry,
    DateTime,
    DateString,
    RandomSeed,
    PropertyEnum,
    SymbolCreation,
    ExternalCall,
    ExternalCbRegister,
    CreateNumber,
    CreateBoolean,
    CreateString,
    CreateSymbol,
    VarToObject,
    AddRootRef,
    RemoveRootRef,
    EventLoopYieldPoint,
    AllocateBasicObject,
    AllocateArray,
    AllocateArrayBuffer,
    AllocateFunction,
    GetAndClearException,
    GetProperty,
    GetIndex,
    GetOwnPropertyInfo,
    GetOwnPropertiesInfo,
    DefineProperty,
    DeleteProperty,
    SetPrototype,
    SetProperty,
    SetIndex,
    GetTypedArrayInfo,
    ConstructCall,
    CallbackOperation,
    CodeParse,
    CallFunctionBegin,
    CallFunctionEnd,
    CodeLoad,
    Snapshot,
}

impl EventKind {
    /// Total number of kinds, i.e. the size a [`DispatchTable`] must have.
    ///
    /// [`DispatchTable`]: crate::dispatch::DispatchTable
    pub const COUNT: usize = 37;

    pub const fn as_index(self) -> usize {
        self as usize
    }

    pub fn payload_kind(payload: &EventPayload) -> Self {
        payload.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCallPayload {
    pub root_depth: u32,
    pub callee: VarTag,
    pub args: Vec<VarTag>,
    pub return_value: VarTag,
    pub has_script_exception: bool,
    pub has_terminal_exception: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallFunctionBeginPayload {
    pub root_depth: u32,
    pub host_callback_id: i64,
    pub wall_clock_time: f64,
    pub callee: VarTag,
    pub args: Vec<VarTag>,
    /// A ready-to-run snapshot attached by `do_rtr_snap_if_needed` so replay
    /// can land immediately before this root call. At most one is ever
    /// attached (see P7).
    pub rtr_snapshot: Option<SnapshotBlob>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallFunctionEndPayload {
    pub root_depth: u32,
    pub host_callback_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeParsePayload {
    pub body_counter: u64,
    pub load_flags: u32,
    pub document_id: u64,
    pub source_uri: String,
    pub source_code: String,
    pub log_dir: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallbackOperationPayload {
    pub create: bool,
    pub repeating: bool,
    pub host_callback_id: i64,
    pub callee: VarTag,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPayload {
    pub blob: SnapshotBlob,
    pub restore_event_time: i64,
    pub restore_log_tag: u64,
}

/// Every host-observable operation the core records, tagged by
/// [`EventKind`]. Variant fields are exactly the recorder/replayer contract
/// of spec §4.7.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Telemetry { message: String, print: bool },
    DateTime { value: f64 },
    DateString { value: String },
    RandomSeed { low: u64, high: u64 },
    PropertyEnum {
        has_property: bool,
        pid: PropertyId,
        attributes: u32,
        name: Option<String>,
    },
    SymbolCreation { pid: PropertyId },
    ExternalCall(ExternalCallPayload),
    ExternalCbRegister { callback_var: VarTag },

    CreateNumber { value: f64, result: VarTag },
    CreateBoolean { value: bool, result: VarTag },
    CreateString { bytes: Vec<u8>, result: VarTag },
    CreateSymbol { description: Option<String>, result: VarTag },
    VarToObject { input: VarTag, result: VarTag },
    AddRootRef { var: VarTag },
    RemoveRootRef { var: VarTag },
    EventLoopYieldPoint,
    AllocateBasicObject { result: VarTag },
    AllocateArray { length: u32, result: VarTag },
    AllocateArrayBuffer { length: u32, result: VarTag },
    AllocateFunction { name: Option<String>, result: VarTag },
    GetAndClearException { had_exception: bool },
    GetProperty { object: VarTag, pid: PropertyId, result: VarTag },
    GetIndex { object: VarTag, index: u32, result: VarTag },
    GetOwnPropertyInfo {
        object: VarTag,
        pid: PropertyId,
        found: bool,
        attributes: u32,
    },
    GetOwnPropertiesInfo { object: VarTag, pids: Vec<PropertyId> },
    DefineProperty { object: VarTag, pid: PropertyId, attributes: u32 },
    DeleteProperty { object: VarTag, pid: PropertyId, result: bool },
    SetPrototype { object: VarTag, prototype: VarTag },
    SetProperty { object: VarTag, pid: PropertyId, value: VarTag },
    SetIndex { object: VarTag, index: u32, value: VarTag },
    GetTypedArrayInfo {
        object: VarTag,
        byte_length: u32,
        byte_offset: u32,
        element_kind: u8,
    },
    ConstructCall { callee: VarTag, args: Vec<VarTag>, result: VarTag },
    CallbackOperation(CallbackOperationPayload),
    CodeParse(CodeParsePayload),
    CallFunctionBegin(CallFunctionBeginPayload),
    CallFunctionEnd(CallFunctionEndPayload),
    CodeLoad { body_counter: u64 },
    Snapshot(SnapshotPayload),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Telemetry { .. } => EventKind::Telemetry,
            Self::DateTime { .. } => EventKind::DateTime,
            Self::DateString { .. } => EventKind::DateString,
            Self::RandomSeed { .. } => EventKind::RandomSeed,
            Self::PropertyEnum { .. } => EventKind::PropertyEnum,
            Self::SymbolCreation { .. } => EventKind::SymbolCreation,
            Self::ExternalCall(_) => EventKind::ExternalCall,
            Self::ExternalCbRegister { .. } => EventKind::ExternalCbRegister,
            Self::CreateNumber { .. } => EventKind::CreateNumber,
            Self::CreateBoolean { .. } => EventKind::CreateBoolean,
            Self::CreateString { .. } => EventKind::CreateString,
            Self::CreateSymbol { .. } => EventKind::CreateSymbol,
            Self::VarToObject { .. } => EventKind::VarToObject,
            Self::AddRootRef { .. } => EventKind::AddRootRef,
            Self::RemoveRootRef { .. } => EventKind::RemoveRootRef,
            Self::EventLoopYieldPoint => EventKind::EventLoopYieldPoint,
            Self::AllocateBasicObject { .. } => EventKind::AllocateBasicObject,
            Self::AllocateArray { .. } => EventKind::AllocateArray,
            Self::AllocateArrayBuffer { .. } => EventKind::AllocateArrayBuffer,
            Self::AllocateFunction { .. } => EventKind::AllocateFunction,
            Self::GetAndClearException { .. } => EventKind::GetAndClearException,
            Self::GetProperty { .. } => EventKind::GetProperty,
            Self::GetIndex { .. } => EventKind::GetIndex,
            Self::GetOwnPropertyInfo { .. } => EventKind::GetOwnPropertyInfo,
            Self::GetOwnPropertiesInfo { .. } => EventKind::GetOwnPropertiesInfo,
            Self::DefineProperty { .. } => EventKind::DefineProperty,
            Self::DeleteProperty { .. } => EventKind::DeleteProperty,
            Self::SetPrototype { .. } => EventKind::SetPrototype,
            Self::SetProperty { .. } => EventKind::SetProperty,
            Self::SetIndex { .. } => EventKind::SetIndex,
            Self::GetTypedArrayInfo { .. } => EventKind::GetTypedArrayInfo,
            Self::ConstructCall { .. } => EventKind::ConstructCall,
            Self::CallbackOperation(_) => EventKind::CallbackOperation,
            Self::CodeParse(_) => EventKind::CodeParse,
            Self::CallFunctionBegin(_) => EventKind::CallFunctionBegin,
            Self::CallFunctionEnd(_) => EventKind::CallFunctionEnd,
            Self::CodeLoad { .. } => EventKind::CodeLoad,
            Self::Snapshot(_) => EventKind::Snapshot,
        }
    }

    /// `true` for the JsRT action kinds that the replay driver's action loop
    /// may dispatch without returning control to the host (i.e. everything
    /// except a root `CallFunctionBegin`).
    pub fn is_non_root_jsrt_action(&self) -> bool {
        !matches!(self, Self::CallFunctionBegin(p) if p.root_depth == 0)
    }

    pub fn as_call_function_begin(&self) -> Option<&CallFunctionBeginPayload> {
        match self {
            Self::CallFunctionBegin(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_call_function_begin_mut(&mut self) -> Option<&mut CallFunctionBeginPayload> {
        match self {
            Self::CallFunctionBegin(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&SnapshotPayload> {
        match self {
            Self::Snapshot(p) => Some(p),
            _ => None,
        }
    }
}

/// A single entry in the event list: a monotone `event_time` plus its
/// kind-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub event_time: u64,
    pub payload: EventPayload,
}

impl EventLogEntry {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// Unused in the data model directly, but kept as the documented type for
/// `function_ref` fields elsewhere in the crate (see `ttd-core::callstack`).
pub type FnRef = FunctionRef;
