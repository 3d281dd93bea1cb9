//! Reference fixed-block heap.
//!
//! A small first-fit allocator over an arena of equal-sized blocks, in the
//! spirit of the heaps used on microcontrollers. Block headers live in a side
//! table so the arena bytes are entirely payload and every allocation starts
//! exactly on a block boundary.
//!
//! Block 0 is the list head and the last block is the terminator; neither is
//! ever handed out.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::NonNull;

use super::block::{BlockAllocator, BlockState, BlockTable, HeapGeometry};
use crate::sync::mutex::Mutex;

/// Arena alignment.
const ARENA_ALIGN: usize = 16;

/// Errors building a [`BlockHeap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeapError {
    /// Fewer than three blocks: there must be room for the head, the
    /// terminator, and at least one allocatable block.
    TooFewBlocks(usize),
    /// A stride of zero bytes.
    ZeroStride,
    /// The arena size overflows `usize` or is not a valid layout.
    ArenaTooLarge,
    /// The system allocator could not provide the arena.
    OutOfMemory,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::TooFewBlocks(n) => write!(f, "block heap needs at least 3 blocks, got {}", n),
            HeapError::ZeroStride => write!(f, "block stride must be non-zero"),
            HeapError::ArenaTooLarge => write!(f, "block arena size overflows"),
            HeapError::OutOfMemory => write!(f, "out of memory allocating block arena"),
        }
    }
}

impl std::error::Error for HeapError {}

/// Per-block bookkeeping. Only the first block of each chunk is meaningful.
#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    state: BlockState,
    next: usize,
    prev: usize,
}

impl BlockHeader {
    const UNLINKED: Self = Self {
        state: BlockState::Free,
        next: 0,
        prev: 0,
    };
}

/// A first-fit fixed-block heap.
pub struct BlockHeap {
    /// Base of the arena
    arena: NonNull<u8>,

    /// Layout the arena was allocated with
    layout: Layout,

    /// Bytes per block
    stride: usize,

    /// Block list; the lock is the heap's critical section
    table: Mutex<Vec<BlockHeader>>,
}

impl BlockHeap {
    /// Create a heap of `block_count` blocks of `stride` bytes each.
    pub fn new(block_count: usize, stride: usize) -> Result<Self, HeapError> {
        if block_count < 3 {
            return Err(HeapError::TooFewBlocks(block_count));
        }
        if stride == 0 {
            return Err(HeapError::ZeroStride);
        }

        let size = block_count
            .checked_mul(stride)
            .ok_or(HeapError::ArenaTooLarge)?;
        let layout =
            Layout::from_size_align(size, ARENA_ALIGN).map_err(|_| HeapError::ArenaTooLarge)?;

        // SAFETY: layout has non-zero size
        let arena = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(HeapError::OutOfMemory)?;

        let terminator = block_count - 1;
        let mut table = vec![BlockHeader::UNLINKED; block_count];
        table[0] = BlockHeader {
            state: BlockState::Used,
            next: 1,
            prev: 0,
        };
        table[1] = BlockHeader {
            state: BlockState::Free,
            next: terminator,
            prev: 0,
        };
        table[terminator] = BlockHeader {
            state: BlockState::Used,
            next: 0,
            prev: 1,
        };

        Ok(Self {
            arena,
            layout,
            stride,
            table: Mutex::new(table),
        })
    }

    /// Bytes per block.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Blocks available for allocation (head and terminator excluded).
    pub fn capacity_blocks(&self) -> usize {
        self.block_count() - 2
    }

    /// Number of blocks currently on the free list.
    pub fn free_blocks(&self) -> usize {
        self.count_blocks(BlockState::Free)
    }

    /// Number of blocks currently handed out.
    pub fn used_blocks(&self) -> usize {
        self.count_blocks(BlockState::Used)
    }

    fn block_count(&self) -> usize {
        self.layout.size() / self.stride
    }

    fn terminator(&self) -> usize {
        self.block_count() - 1
    }

    fn count_blocks(&self, state: BlockState) -> usize {
        let table = self.table.lock();
        let terminator = self.terminator();
        let mut total = 0;
        let mut cur = table[0].next;
        while cur != terminator {
            let next = table[cur].next;
            if table[cur].state == state {
                total += next - cur;
            }
            cur = next;
        }
        total
    }

    fn blocks_for(&self, size: usize) -> usize {
        size / self.stride + usize::from(size % self.stride != 0)
    }

    fn block_ptr(&self, index: usize) -> *mut u8 {
        // SAFETY: callers only pass indices inside the arena
        unsafe { self.arena.as_ptr().add(index * self.stride) }
    }

    /// Index of the used chunk starting at `ptr`, if it is one.
    fn chunk_of(&self, ptr: *mut u8, table: &[BlockHeader]) -> Option<usize> {
        let index = self.geometry().block_index(ptr as usize)?;
        let allocatable = index != 0 && index != self.terminator();
        (allocatable && table[index].state == BlockState::Used).then_some(index)
    }

    /// Shrink the chunk at `index` to `blocks`, turning the tail into a free chunk.
    fn split(&self, table: &mut [BlockHeader], index: usize, blocks: usize) {
        let next = table[index].next;
        if next - index <= blocks {
            return;
        }

        let tail = index + blocks;
        table[tail] = BlockHeader {
            state: BlockState::Free,
            next,
            prev: index,
        };
        table[next].prev = tail;
        table[index].next = tail;
        self.merge_next(table, tail);
    }

    /// Absorb the following chunk into `index` if it is free.
    fn merge_next(&self, table: &mut [BlockHeader], index: usize) {
        let next = table[index].next;
        if next == self.terminator() || table[next].state != BlockState::Free {
            return;
        }

        let after = table[next].next;
        table[index].next = after;
        table[after].prev = index;
        table[next] = BlockHeader::UNLINKED;
    }

    fn allocate_locked(&self, table: &mut [BlockHeader], size: usize) -> *mut u8 {
        let blocks = self.blocks_for(size);
        let terminator = self.terminator();

        let mut cur = table[0].next;
        while cur != terminator {
            let header = table[cur];
            if header.state == BlockState::Free && header.next - cur >= blocks {
                table[cur].state = BlockState::Used;
                self.split(table, cur, blocks);
                return self.block_ptr(cur);
            }
            cur = header.next;
        }

        std::ptr::null_mut()
    }

    fn release_locked(&self, table: &mut [BlockHeader], index: usize) {
        table[index].state = BlockState::Free;
        self.merge_next(table, index);

        let prev = table[index].prev;
        if prev != 0 && table[prev].state == BlockState::Free {
            self.merge_next(table, prev);
        }
    }

    /// Caller holds the table lock; `ptr` is null or a live chunk pointer.
    unsafe fn resize_locked(
        &self,
        table: &mut [BlockHeader],
        ptr: *mut u8,
        size: usize,
    ) -> *mut u8 {
        if ptr.is_null() {
            if size == 0 {
                return std::ptr::null_mut();
            }
            return self.allocate_locked(table, size);
        }
        let Some(index) = self.chunk_of(ptr, table) else {
            return std::ptr::null_mut();
        };
        if size == 0 {
            self.release_locked(table, index);
            return std::ptr::null_mut();
        }

        let blocks = self.blocks_for(size);
        let current = table[index].next - index;
        if blocks <= current {
            self.split(table, index, blocks);
            return ptr;
        }

        let next = table[index].next;
        if next != self.terminator()
            && table[next].state == BlockState::Free
            && table[next].next - index >= blocks
        {
            self.merge_next(table, index);
            self.split(table, index, blocks);
            return ptr;
        }

        let moved = self.allocate_locked(table, size);
        if moved.is_null() {
            return moved;
        }

        // SAFETY: distinct chunks of the arena, both at least `current` blocks
        // or `size` bytes long respectively
        std::ptr::copy_nonoverlapping(ptr, moved, (current * self.stride).min(size));
        self.release_locked(table, index);
        moved
    }

    /// Overwrite the successor link of block `index`.
    #[cfg(test)]
    pub(crate) fn corrupt_link(&self, index: usize, next: usize) {
        self.table.lock()[index].next = next;
    }
}

impl BlockAllocator for BlockHeap {
    fn geometry(&self) -> HeapGeometry {
        HeapGeometry {
            base: self.arena.as_ptr() as usize,
            stride: self.stride,
            block_count: self.block_count(),
        }
    }

    fn allocate_with(&self, size: usize, init: impl FnOnce(*mut u8) -> *mut u8) -> *mut u8 {
        let mut table = self.table.lock();
        let raw = if size == 0 {
            std::ptr::null_mut()
        } else {
            self.allocate_locked(&mut table, size)
        };
        init(raw)
    }

    unsafe fn resize_with(
        &self,
        ptr: *mut u8,
        size: usize,
        init: impl FnOnce(*mut u8) -> *mut u8,
    ) -> *mut u8 {
        let mut table = self.table.lock();
        let moved = self.resize_locked(&mut table, ptr, size);
        init(moved)
    }

    unsafe fn release(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let mut table = self.table.lock();
        if let Some(index) = self.chunk_of(ptr, &table) {
            self.release_locked(&mut table, index);
        }
    }

    fn critical<R>(&self, f: impl FnOnce(&dyn BlockTable) -> R) -> R {
        let table = self.table.lock();
        let view = TableView {
            headers: &table,
            geometry: self.geometry(),
        };
        f(&view)
    }
}

impl Drop for BlockHeap {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this layout
        unsafe { dealloc(self.arena.as_ptr(), self.layout) };
    }
}

// SAFETY: the arena is only handed out in disjoint chunks and the block list
// is guarded by the internal mutex
unsafe impl Send for BlockHeap {}
unsafe impl Sync for BlockHeap {}

/// Locked view of the block list.
struct TableView<'a> {
    headers: &'a [BlockHeader],
    geometry: HeapGeometry,
}

impl BlockTable for TableView<'_> {
    fn geometry(&self) -> HeapGeometry {
        self.geometry
    }

    fn successor(&self, index: usize) -> usize {
        self.headers[index].next
    }

    fn state(&self, index: usize) -> BlockState {
        self.headers[index].state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_shapes() {
        assert_eq!(BlockHeap::new(2, 8).err(), Some(HeapError::TooFewBlocks(2)));
        assert_eq!(BlockHeap::new(16, 0).err(), Some(HeapError::ZeroStride));
        assert_eq!(
            BlockHeap::new(usize::MAX, 8).err(),
            Some(HeapError::ArenaTooLarge)
        );
    }

    #[test]
    fn test_zero_size_is_null() {
        let heap = BlockHeap::new(16, 8).unwrap();
        assert!(heap.allocate(0).is_null());
        assert_eq!(heap.used_blocks(), 0);
    }

    #[test]
    fn test_allocations_are_block_aligned_and_disjoint() {
        let heap = BlockHeap::new(32, 8).unwrap();
        let geometry = heap.geometry();

        let a = heap.allocate(20);
        let b = heap.allocate(1);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(geometry.block_index(a as usize), Some(1));
        assert_eq!(geometry.block_index(b as usize), Some(4));
        assert_eq!(heap.used_blocks(), 4);
        assert_eq!(heap.free_blocks(), heap.capacity_blocks() - 4);
    }

    #[test]
    fn test_release_coalesces() {
        let heap = BlockHeap::new(32, 8).unwrap();

        let a = heap.allocate(16);
        let b = heap.allocate(16);
        let c = heap.allocate(16);
        unsafe {
            heap.release(a);
            heap.release(c);
            heap.release(b);
        }

        assert_eq!(heap.used_blocks(), 0);
        heap.critical(|table| {
            assert_eq!(table.successor(0), 1);
            assert_eq!(table.successor(1), 31);
            assert_eq!(table.state(1), BlockState::Free);
        });
    }

    #[test]
    fn test_exhaustion_returns_null() {
        let heap = BlockHeap::new(6, 8).unwrap();
        assert!(!heap.allocate(32).is_null());
        assert!(heap.allocate(1).is_null());
    }

    #[test]
    fn test_resize_in_place_and_relocate() {
        let heap = BlockHeap::new(32, 8).unwrap();

        let a = heap.allocate(8);
        unsafe {
            a.write_bytes(0x11, 8);

            // Grows into the free space behind it
            let grown = heap.resize(a, 24);
            assert_eq!(grown, a);
            assert_eq!(heap.used_blocks(), 3);

            // Shrinks in place
            let shrunk = heap.resize(grown, 8);
            assert_eq!(shrunk, a);
            assert_eq!(heap.used_blocks(), 1);

            // Blocked by a neighbour, so it moves and keeps its bytes
            let blocker = heap.allocate(8);
            let moved = heap.resize(shrunk, 32);
            assert_ne!(moved, a);
            assert_eq!(std::slice::from_raw_parts(moved, 8), &[0x11; 8]);
            assert_eq!(heap.used_blocks(), 5);

            heap.release(blocker);
            heap.release(moved);
        }
        assert_eq!(heap.used_blocks(), 0);
    }

    #[test]
    fn test_resize_null_and_zero() {
        let heap = BlockHeap::new(16, 8).unwrap();
        unsafe {
            let p = heap.resize(std::ptr::null_mut(), 10);
            assert!(!p.is_null());
            assert!(heap.resize(p, 0).is_null());
        }
        assert_eq!(heap.used_blocks(), 0);
    }

    #[test]
    fn test_release_ignores_foreign_pointers() {
        let heap = BlockHeap::new(16, 8).unwrap();
        let p = heap.allocate(8);
        unsafe {
            heap.release(p.add(1));
            heap.release(p);
            heap.release(p);
        }
        assert_eq!(heap.used_blocks(), 0);
    }

    #[test]
    fn test_init_runs_under_the_table_lock() {
        let heap = BlockHeap::new(32, 8).unwrap();

        let p = heap.allocate_with(10, |raw| {
            assert!(!raw.is_null());
            assert!(heap.table.is_locked());
            unsafe { raw.write_bytes(0x42, 10) };
            raw
        });
        assert!(!heap.table.is_locked());
        assert_eq!(heap.used_blocks(), 2);

        let blocker = heap.allocate(8);
        let moved = unsafe {
            heap.resize_with(p, 40, |raw| {
                assert!(heap.table.is_locked());
                assert_eq!(std::slice::from_raw_parts(raw, 10), &[0x42; 10]);
                raw.wrapping_add(1)
            })
        };
        assert!(!moved.is_null());
        assert_ne!(moved.wrapping_sub(1), p);

        let failed = heap.allocate_with(usize::MAX / 2, |raw| {
            assert!(raw.is_null());
            raw
        });
        assert!(failed.is_null());

        unsafe {
            heap.release(moved.wrapping_sub(1));
            heap.release(blocker);
        }
        assert_eq!(heap.used_blocks(), 0);
    }
}
