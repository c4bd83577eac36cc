//! The kind dispatch table (C3).
//!
//! Emit/parse/unload are exhaustive `match`es elsewhere in this crate (see
//! module docs on [`crate::events`]) since Rust's sum types make a runtime
//! table unnecessary for them. What *does* need to stay a registrable,
//! per-kind table is the JsRT replay dispatcher: an embedder may want to
//! intercept or override how a specific action kind is replayed (for
//! instance, to fuzz-test a single JsRT verb in isolation) without
//! recompiling the driver. [`DispatchTable`] is that table, initialized
//! once per log (see `Log::new` in `ttd-core`).

use thiserror::Error;

use crate::events::{EventKind, EventPayload};

pub type ReplayDispatchFn<Ctx> = fn(&mut Ctx, &EventPayload) -> Result<(), DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no replay dispatcher registered for event kind {0:?}")]
    Unregistered(EventKind),
    #[error("dispatcher for {expected:?} received a payload of kind {actual:?}")]
    KindMismatch { expected: EventKind, actual: EventKind },
}

/// A per-kind table of JsRT replay dispatch function pointers, owned by the
/// log for its whole lifetime (mirrors the original's misc-arena-owned
/// vtable).
pub struct DispatchTable<Ctx> {
    handlers: Vec<Option<ReplayDispatchFn<Ctx>>>,
}

impl<Ctx> DispatchTable<Ctx> {
    pub fn new() -> Self {
        Self {
            handlers: vec![None; EventKind::COUNT],
        }
    }

    /// Register (or replace) the replay dispatcher for `kind`.
    pub fn register(&mut self, kind: EventKind, f: ReplayDispatchFn<Ctx>) {
        self.handlers[kind.as_index()] = Some(f);
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers[kind.as_index()].is_some()
    }

    /// Dispatch `payload` through the handler registered for its kind.
    pub fn dispatch(&self, ctx: &mut Ctx, payload: &EventPayload) -> Result<(), DispatchError> {
        let kind = payload.kind();
        match self.handlers[kind.as_index()] {
            Some(f) => f(ctx, payload),
            None => Err(DispatchError::Unregistered(kind)),
        }
    }
}

impl<Ctx> Default for DispatchTable<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ctx {
        seen: Vec<EventKind>,
    }

    fn record_date_time(ctx: &mut Ctx, payload: &EventPayload) -> Result<(), DispatchError> {
        match payload {
            EventPayload::DateTime { .. } => {
                ctx.seen.push(EventKind::DateTime);
                Ok(())
            }
            other => Err(DispatchError::KindMismatch {
                expected: EventKind::DateTime,
                actual: other.kind(),
            }),
        }
    }

    #[test]
    fn unregistered_kind_errors() {
        let table: DispatchTable<Ctx> = DispatchTable::new();
        let mut ctx = Ctx { seen: Vec::new() };
        let err = table
            .dispatch(&mut ctx, &EventPayload::DateTime { value: 1.0 })
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unregistered(EventKind::DateTime)));
    }

    #[test]
    fn registered_kind_dispatches() {
        let mut table: DispatchTable<Ctx> = DispatchTable::new();
        table.register(EventKind::DateTime, record_date_time);
        let mut ctx = Ctx { seen: Vec::new() };
        table
            .dispatch(&mut ctx, &EventPayload::DateTime { value: 1.0 })
            .unwrap();
        assert_eq!(ctx.seen, vec![EventKind::DateTime]);
    }
}
