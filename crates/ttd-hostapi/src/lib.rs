//! Trait contracts between the time-travel event-log core and the JS engine
//! that embeds it.
//!
//! Everything in this crate is a narrow interface: no logic lives here, only
//! the shapes the core needs from its host. An embedder implements these
//! traits once against its real heap/value representation; the core
//! (`ttd-core`) is generic over them so it never depends on engine internals
//! directly.

use std::path::Path;

/// Opaque handle to a live engine value (object, array, function, symbol...).
///
/// The core never interprets this beyond equality and storage; only the
/// embedder's heap walker and inflater know what it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarTag(pub u64);

/// Opaque handle to a parsed function body (bytecode unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionRef(pub u64);

/// A property id, as assigned by the embedder's property-record registry.
///
/// `PropertyId::NONE` is the sentinel used by `PropertyEnum` to mean "no
/// further property" while still carrying a verbatim name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(pub u32);

impl PropertyId {
    pub const NONE: PropertyId = PropertyId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// A property record as resolved from the registry: its name and attribute
/// bits. The core treats attributes as an opaque bitmask it only round-trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub id: PropertyId,
    pub name: Option<String>,
    pub attributes: u32,
}

/// Counts the inflater needs up front to size its scratch structures before
/// walking a snapshot's object graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cardinalities {
    pub objects: u32,
    pub arrays: u32,
    pub functions: u32,
    pub properties: u32,
}

/// An opaque, engine-defined serialized form of one heap snapshot.
///
/// The core stores this verbatim (via [`LogStream`]) and otherwise never
/// looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotBlob(pub Vec<u8>);

/// Three parallel script-body tables the log format keys script loads
/// against: top-level loaded scripts, `new Function(...)` bodies, and
/// `eval` bodies. Each table is keyed by a monotone body-counter id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTables {
    pub loaded: Vec<ScriptBody>,
    pub new_function: Vec<ScriptBody>,
    pub eval: Vec<ScriptBody>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBody {
    pub body_counter: u64,
    pub document_id: u64,
    pub source_uri: String,
    pub source_code: String,
}

/// A script exception captured at the point it propagated out of script,
/// opaque to the core beyond being stashable and restorable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedException(pub Vec<u8>);

#[derive(Debug, thiserror::Error)]
pub enum HostApiError {
    #[error("I/O error on log stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("heap walk failed: {0}")]
    HeapWalk(String),
    #[error("inflate failed: {0}")]
    Inflate(String),
    #[error("snapshot reports {contexts} script contexts; the core requires exactly one")]
    MultipleContexts { contexts: u32 },
}

/// Extracts a restorable copy of an engine context's heap.
///
/// Implementations must run their own internal allocations (scratch vectors,
/// temporary objects used while walking) without becoming externally
/// observable; the core guarantees the *recording* side is suppressed for
/// the duration (see `ExcludedExecution` in `ttd-core`), but the walker
/// itself must not, say, fire user-visible finalizers mid-walk.
pub trait HeapWalker {
    type Context;
    type WalkState;

    /// Roots to start the mark phase from (globals, the call stack, pinned
    /// vars).
    fn extract_snapshot_roots(&self, ctx: &Self::Context) -> Vec<VarTag>;

    fn begin_snapshot(&mut self, ctx: &Self::Context) -> Self::WalkState;

    /// Mark every object reachable from `roots`, recording them into `state`.
    fn mark_walk(&mut self, state: &mut Self::WalkState, roots: &[VarTag]);

    /// Copy marked objects into the snapshot's own storage.
    fn evacuate(&mut self, state: &mut Self::WalkState);

    /// Finish the walk and hand back the serialized blob plus the
    /// cardinalities an inflater will need.
    fn complete(&mut self, state: Self::WalkState) -> (SnapshotBlob, Cardinalities);
}

/// Rehydrates a live context from a previously extracted snapshot.
pub trait Inflater {
    type Context;
    type InflateMap;

    /// Allocate (or re-prepare in place, if `existing` is `Some`) the
    /// bookkeeping needed to inflate a snapshot with the given shape.
    fn prep_for_inflate(
        &mut self,
        cardinalities: Cardinalities,
        existing: Option<Self::InflateMap>,
    ) -> Self::InflateMap;

    /// Rehydrate `live_ctx` from `snapshot`, consulting `script_tables` to
    /// resolve function bodies. The core assumes exactly one context; an
    /// implementation observing `cardinalities.objects == 0` with a nonzero
    /// context count from the snapshot metadata should surface
    /// [`HostApiError::MultipleContexts`].
    fn inflate_script_context(
        &mut self,
        snapshot: &SnapshotBlob,
        live_ctx: &mut Self::Context,
        map: &mut Self::InflateMap,
        script_tables: &ScriptTables,
    ) -> Result<(), HostApiError>;

    /// Release the inflate map's scratch state once inflation completes.
    fn cleanup_inflate_map(&mut self, map: Self::InflateMap);
}

/// The embedder's property-record registry.
pub trait PropertyRegistry {
    fn enumerate_ids(&self) -> Vec<PropertyId>;
    fn resolve(&self, id: PropertyId) -> Option<PropertyRecord>;

    /// Pin a property record so it cannot move or be collected while the log
    /// lives; called when a var referencing it is rooted.
    fn pin(&mut self, id: PropertyId);
    fn unpin(&mut self, id: PropertyId);
}

/// Durable byte-stream access to the `log_dir` directory — the only external
/// state location the core touches.
pub trait LogStream {
    type Handle;

    fn get_log_stream(&self, dir: &Path, for_read: bool, for_write: bool) -> Result<Self::Handle, HostApiError>;
    fn read_bytes(&self, handle: &mut Self::Handle, buf: &mut [u8]) -> Result<usize, HostApiError>;
    fn write_bytes(&self, handle: &mut Self::Handle, buf: &[u8]) -> Result<usize, HostApiError>;
    fn flush_and_close(&self, handle: Self::Handle) -> Result<(), HostApiError>;
}

/// Lets the replay driver pump follow-on JsRT actions without corrupting the
/// engine's own script-reentrancy counters, and lets `ExternalCall` replay
/// preserve an in-flight script exception across a nested pump.
pub trait ScriptActivityProbe {
    fn is_script_active(&self) -> bool;

    /// Enter a nested "not really script, but don't tell anyone" scope.
    /// Must be exactly balanced with [`Self::leave_script`].
    fn enter_script(&mut self);
    fn leave_script(&mut self);

    fn has_pending_script_exception(&self) -> bool;
    fn take_pending_script_exception(&mut self) -> Option<RecordedException>;
    fn restore_pending_script_exception(&mut self, exception: RecordedException);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_id_none_sentinel() {
        assert!(PropertyId::NONE.is_none());
        assert!(!PropertyId(0).is_none());
    }
}
