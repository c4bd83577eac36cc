//! Minimal mock collaborators for exercising `Log` in unit tests, without
//! pulling in a real JS engine.

use std::path::PathBuf;

use ttd_hostapi::{Cardinalities, HeapWalker, HostApiError, Inflater, LogStream, PropertyId, PropertyRecord, PropertyRegistry, ScriptTables, SnapshotBlob, VarTag};

use crate::config::Options;
use crate::log::Log;

#[derive(Debug, Default)]
pub struct MockContext {
    pub tag_counter: u64,
}

pub struct MockHeapWalker;

impl HeapWalker for MockHeapWalker {
    type Context = MockContext;
    type WalkState = Vec<VarTag>;

    fn extract_snapshot_roots(&self, _ctx: &Self::Context) -> Vec<VarTag> {
        Vec::new()
    }

    fn begin_snapshot(&mut self, _ctx: &Self::Context) -> Self::WalkState {
        Vec::new()
    }

    fn mark_walk(&mut self, state: &mut Self::WalkState, roots: &[VarTag]) {
        state.extend_from_slice(roots);
    }

    fn evacuate(&mut self, _state: &mut Self::WalkState) {}

    fn complete(&mut self, state: Self::WalkState) -> (SnapshotBlob, Cardinalities) {
        (
            SnapshotBlob(state.iter().flat_map(|v| v.0.to_le_bytes()).collect()),
            Cardinalities {
                objects: state.len() as u32,
                ..Default::default()
            },
        )
    }
}

pub struct MockInflater;

impl Inflater for MockInflater {
    type Context = MockContext;
    type InflateMap = ();

    fn prep_for_inflate(&mut self, _cardinalities: Cardinalities, _existing: Option<Self::InflateMap>) -> Self::InflateMap {}

    fn inflate_script_context(
        &mut self,
        _snapshot: &SnapshotBlob,
        _live_ctx: &mut Self::Context,
        _map: &mut Self::InflateMap,
        _script_tables: &ScriptTables,
    ) -> Result<(), HostApiError> {
        Ok(())
    }

    fn cleanup_inflate_map(&mut self, _map: Self::InflateMap) {}
}

#[derive(Default)]
pub struct MockProperties {
    records: Vec<PropertyRecord>,
}

impl PropertyRegistry for MockProperties {
    fn enumerate_ids(&self) -> Vec<PropertyId> {
        self.records.iter().map(|r| r.id).collect()
    }

    fn resolve(&self, id: PropertyId) -> Option<PropertyRecord> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    fn pin(&mut self, _id: PropertyId) {}
    fn unpin(&mut self, _id: PropertyId) {}
}

#[derive(Default)]
pub struct MockStream;

impl LogStream for MockStream {
    type Handle = ();

    fn get_log_stream(&self, _dir: &std::path::Path, _for_read: bool, _for_write: bool) -> Result<Self::Handle, HostApiError> {
        Ok(())
    }

    fn read_bytes(&self, _handle: &mut Self::Handle, _buf: &mut [u8]) -> Result<usize, HostApiError> {
        Ok(0)
    }

    fn write_bytes(&self, _handle: &mut Self::Handle, buf: &[u8]) -> Result<usize, HostApiError> {
        Ok(buf.len())
    }

    fn flush_and_close(&self, _handle: Self::Handle) -> Result<(), HostApiError> {
        Ok(())
    }
}

pub type TestLog = Log<MockHeapWalker, MockInflater, MockProperties, MockStream>;

pub fn test_log() -> TestLog {
    let mut log = Log::new(
        Options::default(),
        PathBuf::from("/tmp/ttd-test-log"),
        MockHeapWalker,
        MockInflater,
        MockProperties::default(),
        MockStream,
    );
    log.start_on(MockContext::default()).unwrap();
    log
}
