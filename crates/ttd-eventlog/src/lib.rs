//! Storage primitives for a single context's time-travel event log: the
//! bump-allocated var/string arena, the event kind catalogue, the
//! append-only chunked event list, the JsRT replay dispatch table, and the
//! on-disk textual log format.
//!
//! This crate has no notion of *when* to record or replay anything — that
//! policy (logical time, the mode state machine, the call-frame stack, the
//! replay driver, snapshot scheduling) lives in `ttd-core`, which is generic
//! over the engine-facing traits in `ttd-hostapi` and uses this crate purely
//! as storage.

pub mod arena;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod format;
pub mod list;

pub use arena::{ArenaIndex, SlabArena};
pub use dispatch::{DispatchError, DispatchTable, ReplayDispatchFn};
pub use error::{EmitError, ParseError};
pub use events::{EventKind, EventLogEntry, EventPayload};
pub use format::{Arch, LogHeader, LogReader, LogWriter};
pub use list::{Cursor, EventList, DEFAULT_CHUNK_CAPACITY};
