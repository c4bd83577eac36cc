//! Bump-allocating arena with whole-arena release.
//!
//! Mirrors the role of `commitlog::buf::Aligned` one level up: instead of a
//! single raw byte buffer, [`SlabArena`] grows in fixed-capacity blocks and
//! hands out stable indices rather than pointers, so the arena stays safe
//! Rust while keeping the shape the rest of the event log relies on — bulk
//! allocation, O(1) amortized append, and an explicit `unlink` for the one
//! caller (the event list, retiring a chunk) that needs to give a single
//! slot back before the whole arena goes away.

const DEFAULT_BLOCK_CAPACITY: usize = 512;

/// A handle into a [`SlabArena`]. Stable for the lifetime of the arena,
/// except after [`SlabArena::unlink`] is called on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaIndex {
    block: u32,
    slot: u32,
}

/// Bump-allocating arena over a single element type `T`.
///
/// Blocks are allocated lazily as the arena grows; nothing is ever moved
/// once written, so [`ArenaIndex`] handles remain valid until [`unlink`] is
/// called on them or the whole arena is dropped.
///
/// [`unlink`]: SlabArena::unlink
pub struct SlabArena<T> {
    blocks: Vec<Vec<Option<T>>>,
    block_capacity: usize,
    free_list: Vec<ArenaIndex>,
    len: usize,
}

impl<T> SlabArena<T> {
    pub fn new() -> Self {
        Self::with_block_capacity(DEFAULT_BLOCK_CAPACITY)
    }

    pub fn with_block_capacity(block_capacity: usize) -> Self {
        assert!(block_capacity > 0, "block_capacity must be nonzero");
        Self {
            blocks: Vec::new(),
            block_capacity,
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Number of live (non-unlinked) allocations.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate a single struct, copying `value` into the arena.
    pub fn allocate_struct(&mut self, value: T) -> ArenaIndex {
        let idx = if let Some(reused) = self.free_list.pop() {
            reused
        } else {
            self.reserve_slot()
        };
        self.blocks[idx.block as usize][idx.slot as usize] = Some(value);
        self.len += 1;
        idx
    }

    /// Allocate a fixed-size array's worth of contiguous elements, returning
    /// the index of the first one. Callers needing array semantics address
    /// `base.block`/`base.slot + k` directly, or use [`Self::get`] in a loop;
    /// this mirrors the original's "allocate N contiguous slots" primitive
    /// without requiring unsafe pointer arithmetic.
    pub fn allocate_array(&mut self, values: impl IntoIterator<Item = T>) -> Vec<ArenaIndex> {
        values.into_iter().map(|v| self.allocate_struct(v)).collect()
    }

    pub fn get(&self, idx: ArenaIndex) -> Option<&T> {
        self.blocks
            .get(idx.block as usize)
            .and_then(|b| b.get(idx.slot as usize))
            .and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, idx: ArenaIndex) -> Option<&mut T> {
        self.blocks
            .get_mut(idx.block as usize)
            .and_then(|b| b.get_mut(idx.slot as usize))
            .and_then(|s| s.as_mut())
    }

    /// Return an individual allocation to the arena's free pool before the
    /// whole-arena lifetime would otherwise release it. Used only by the
    /// event list when retiring a chunk's oldest entry.
    pub fn unlink(&mut self, idx: ArenaIndex) -> Option<T> {
        let slot = self.blocks.get_mut(idx.block as usize)?.get_mut(idx.slot as usize)?;
        let taken = slot.take();
        if taken.is_some() {
            self.len -= 1;
            self.free_list.push(idx);
        }
        taken
    }

    fn reserve_slot(&mut self) -> ArenaIndex {
        if self.blocks.last().map_or(true, |b| b.len() == self.block_capacity) {
            self.blocks.push(Vec::with_capacity(self.block_capacity));
        }
        let block = (self.blocks.len() - 1) as u32;
        let slot = self.blocks[block as usize].len() as u32;
        self.blocks[block as usize].push(None);
        ArenaIndex { block, slot }
    }
}

impl<T> Default for SlabArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies a byte string into a `String`-backed arena slot, mirroring the
/// original's `copy_string_with_length`.
pub fn copy_string_with_length(arena: &mut SlabArena<String>, bytes: &[u8], len: usize) -> ArenaIndex {
    let s = String::from_utf8_lossy(&bytes[..len.min(bytes.len())]).into_owned();
    arena.allocate_struct(s)
}

/// Copies a NUL-terminated byte string into a `String`-backed arena slot,
/// mirroring the original's `copy_null_terminated_string`.
pub fn copy_null_terminated_string(arena: &mut SlabArena<String>, bytes: &[u8]) -> ArenaIndex {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    copy_string_with_length(arena, bytes, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_fetch() {
        let mut arena: SlabArena<u64> = SlabArena::with_block_capacity(4);
        let idx = arena.allocate_struct(42);
        assert_eq!(arena.get(idx), Some(&42));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn grows_across_blocks() {
        let mut arena: SlabArena<u64> = SlabArena::with_block_capacity(2);
        let idxs: Vec<_> = (0..5).map(|i| arena.allocate_struct(i)).collect();
        assert_eq!(arena.len(), 5);
        for (i, idx) in idxs.iter().enumerate() {
            assert_eq!(arena.get(*idx), Some(&(i as u64)));
        }
    }

    #[test]
    fn unlink_frees_slot_for_reuse() {
        let mut arena: SlabArena<u64> = SlabArena::with_block_capacity(4);
        let a = arena.allocate_struct(1);
        let b = arena.allocate_struct(2);
        assert_eq!(arena.unlink(a), Some(1));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(a), None);
        let c = arena.allocate_struct(3);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(b), Some(&2));
        assert_eq!(arena.get(c), Some(&3));
    }

    #[test]
    fn string_helpers_truncate_at_nul() {
        let mut arena: SlabArena<String> = SlabArena::new();
        let idx = copy_null_terminated_string(&mut arena, b"hello\0world");
        assert_eq!(arena.get(idx).map(String::as_str), Some("hello"));
    }
}
