//! The append-only, chunked, doubly-linked event list (C2).
//!
//! Structurally this is the same shape as `commitlog::Generic`: a sequence
//! of fixed-capacity segments, written only at the head, read from anywhere,
//! and retired only from the tail. Here the "segment" is an in-memory
//! `Chunk` of size `B` rather than a file, since the event log's own
//! durability is handled one layer up by [`crate::format`] writing the
//! textual log, not by the in-memory list itself.

use std::collections::VecDeque;

use crate::events::EventLogEntry;

/// Recommended chunk capacity (spec §3 `EventList`).
pub const DEFAULT_CHUNK_CAPACITY: usize = 512;

struct Chunk {
    entries: Vec<EventLogEntry>,
    /// Index of the first live entry. Only ever nonzero on the tail chunk,
    /// and only while that chunk is being drained by `pop_oldest`.
    start_pos: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            start_pos: 0,
        }
    }

    fn is_full(&self, capacity: usize) -> bool {
        self.entries.len() >= capacity
    }

    fn live_count(&self) -> usize {
        self.entries.len() - self.start_pos
    }
}

/// The chunked doubly-linked event list.
pub struct EventList {
    chunks: VecDeque<Chunk>,
    chunk_capacity: usize,
    /// Monotone generation counter, bumped whenever a chunk is unlinked from
    /// the front. Cursors capture the generation they were issued under and
    /// refuse to resolve across a generation change, rather than silently
    /// reading the wrong chunk after indices shift.
    generation: u64,
}

impl EventList {
    pub fn new() -> Self {
        Self::with_chunk_capacity(DEFAULT_CHUNK_CAPACITY)
    }

    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        assert!(chunk_capacity > 0, "chunk_capacity must be nonzero");
        Self {
            chunks: VecDeque::new(),
            chunk_capacity,
            generation: 0,
        }
    }

    /// Total number of live entries across all chunks.
    pub fn count(&self) -> usize {
        self.chunks.iter().map(Chunk::live_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Append `entry` to the head chunk, creating a new one if the current
    /// head is full or missing.
    pub fn append(&mut self, entry: EventLogEntry) {
        if self.chunks.back().map_or(true, |c| c.is_full(self.chunk_capacity)) {
            self.chunks.push_back(Chunk::new(self.chunk_capacity));
        }
        self.chunks.back_mut().unwrap().entries.push(entry);
    }

    /// Remove the oldest live entry (the tail chunk's first live slot),
    /// returning it so the caller can run the kind's unload hook. Unlinks
    /// the tail chunk once it is fully drained.
    pub fn pop_oldest(&mut self) -> Option<EventLogEntry> {
        let front = self.chunks.front_mut()?;
        if front.start_pos >= front.entries.len() {
            return None;
        }
        // Entries are never removed from the middle, only advanced past, so
        // cloning out by index then advancing start_pos keeps this O(1)
        // without shifting the vector.
        let popped = front.entries[front.start_pos].clone();
        front.start_pos += 1;
        if front.start_pos == front.entries.len() {
            self.chunks.pop_front();
            self.generation += 1;
            log::trace!("chunk retired, generation now {}", self.generation);
        }
        Some(popped)
    }

    /// A cursor positioned at the oldest live entry, or invalid if empty.
    pub fn iter_first(&self) -> Cursor {
        for (ci, chunk) in self.chunks.iter().enumerate() {
            if chunk.live_count() > 0 {
                return Cursor {
                    generation: self.generation,
                    pos: Some(Position {
                        chunk: ci,
                        slot: chunk.start_pos,
                    }),
                };
            }
        }
        Cursor::invalid(self.generation)
    }

    /// A cursor positioned at the newest live entry, or invalid if empty.
    pub fn iter_last(&self) -> Cursor {
        for (ci, chunk) in self.chunks.iter().enumerate().rev() {
            if chunk.live_count() > 0 {
                return Cursor {
                    generation: self.generation,
                    pos: Some(Position {
                        chunk: ci,
                        slot: chunk.entries.len() - 1,
                    }),
                };
            }
        }
        Cursor::invalid(self.generation)
    }

    pub fn get(&self, cursor: &Cursor) -> Option<&EventLogEntry> {
        let pos = self.resolve(cursor)?;
        self.chunks.get(pos.chunk)?.entries.get(pos.slot)
    }

    /// Mutable access to the entry a cursor resolves to. Used only to
    /// attach a ready-to-run snapshot to an already-appended
    /// `CallFunctionBegin` entry; every other mutation goes through
    /// `append`/`pop_oldest`.
    pub fn get_mut(&mut self, cursor: &Cursor) -> Option<&mut EventLogEntry> {
        let pos = self.resolve(cursor)?;
        self.chunks.get_mut(pos.chunk)?.entries.get_mut(pos.slot)
    }

    /// Advance `cursor` to the next entry, crossing chunk boundaries
    /// transparently. Becomes invalid past the newest entry.
    pub fn next(&self, cursor: &Cursor) -> Cursor {
        let Some(pos) = self.resolve(cursor) else {
            return Cursor::invalid(self.generation);
        };
        let chunk = &self.chunks[pos.chunk];
        if pos.slot + 1 < chunk.entries.len() {
            return Cursor {
                generation: self.generation,
                pos: Some(Position {
                    chunk: pos.chunk,
                    slot: pos.slot + 1,
                }),
            };
        }
        for ci in (pos.chunk + 1)..self.chunks.len() {
            let next_chunk = &self.chunks[ci];
            if next_chunk.live_count() > 0 {
                return Cursor {
                    generation: self.generation,
                    pos: Some(Position {
                        chunk: ci,
                        slot: next_chunk.start_pos,
                    }),
                };
            }
        }
        Cursor::invalid(self.generation)
    }

    /// Advance `cursor` to the previous entry, crossing chunk boundaries
    /// transparently. Becomes invalid before the oldest entry.
    pub fn prev(&self, cursor: &Cursor) -> Cursor {
        let Some(pos) = self.resolve(cursor) else {
            return Cursor::invalid(self.generation);
        };
        let chunk = &self.chunks[pos.chunk];
        if pos.slot > chunk.start_pos {
            return Cursor {
                generation: self.generation,
                pos: Some(Position {
                    chunk: pos.chunk,
                    slot: pos.slot - 1,
                }),
            };
        }
        for ci in (0..pos.chunk).rev() {
            let prev_chunk = &self.chunks[ci];
            if prev_chunk.live_count() > 0 {
                return Cursor {
                    generation: self.generation,
                    pos: Some(Position {
                        chunk: ci,
                        slot: prev_chunk.entries.len() - 1,
                    }),
                };
            }
        }
        Cursor::invalid(self.generation)
    }

    fn resolve(&self, cursor: &Cursor) -> Option<Position> {
        if cursor.generation != self.generation {
            return None;
        }
        cursor.pos
    }
}

impl Default for EventList {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    chunk: usize,
    slot: usize,
}

/// A bidirectional cursor into an [`EventList`]. `is_valid` is false past
/// either end, or after a removal changed the list's generation — in either
/// case the cursor must be re-fetched via `iter_first`/`iter_last`.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    generation: u64,
    pos: Option<Position>,
}

impl Cursor {
    fn invalid(generation: u64) -> Self {
        Self { generation, pos: None }
    }

    pub fn is_valid(&self) -> bool {
        self.pos.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttd_hostapi::VarTag;

    fn entry(t: u64) -> EventLogEntry {
        EventLogEntry {
            event_time: t,
            payload: crate::events::EventPayload::DateTime { value: t as f64 },
        }
    }

    #[test]
    fn empty_list_yields_invalid_iterators() {
        let list = EventList::new();
        assert!(!list.iter_first().is_valid());
        assert!(!list.iter_last().is_valid());
    }

    #[test]
    fn forward_and_backward_agree_p6() {
        let mut list = EventList::with_chunk_capacity(4);
        for t in 0..20 {
            list.append(entry(t));
        }
        let mut forward = Vec::new();
        let mut cur = list.iter_first();
        while cur.is_valid() {
            forward.push(list.get(&cur).unwrap().event_time);
            cur = list.next(&cur);
        }
        let mut backward = Vec::new();
        let mut cur = list.iter_last();
        while cur.is_valid() {
            backward.push(list.get(&cur).unwrap().event_time);
            cur = list.prev(&cur);
        }
        backward.reverse();
        assert_eq!(forward, backward);
        assert_eq!(forward, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn scenario_s5_two_chunk_retirement() {
        let mut list = EventList::with_chunk_capacity(512);
        for t in 0..700u64 {
            list.append(entry(t));
        }
        for _ in 0..512 {
            list.pop_oldest().unwrap();
        }
        assert_eq!(list.count(), 188);
        let mut times = Vec::new();
        let mut cur = list.iter_first();
        while cur.is_valid() {
            times.push(list.get(&cur).unwrap().event_time);
            cur = list.next(&cur);
        }
        assert_eq!(times, (512..700).collect::<Vec<_>>());
        let _ = VarTag(0);
    }

    #[test]
    fn monotone_event_time_p1() {
        let mut list = EventList::new();
        for t in 0..50u64 {
            list.append(entry(t));
        }
        let mut cur = list.iter_first();
        let mut prev: Option<u64> = None;
        while cur.is_valid() {
            let t = list.get(&cur).unwrap().event_time;
            if let Some(p) = prev {
                assert_eq!(p + 1, t);
            }
            prev = Some(t);
            cur = list.next(&cur);
        }
    }
}
