//! The contract between the poisoning layer and the block allocator beneath it.
//!
//! The allocator owns an arena of fixed-stride slots. An allocation starts at
//! the first byte of a slot and spans every slot up to the next chunk in the
//! block list. The poisoning layer never mutates the list; it only reads it
//! through a [`BlockTable`] handed out inside the allocator's critical section.

use std::fmt;

/// Whether a block is on the free list or handed out to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockState {
    /// Available for allocation.
    Free,
    /// Owned by a caller.
    Used,
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockState::Free => write!(f, "free"),
            BlockState::Used => write!(f, "used"),
        }
    }
}

/// Fixed shape of a block arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapGeometry {
    /// Address of block 0.
    pub base: usize,
    /// Bytes per block.
    pub stride: usize,
    /// Number of blocks in the table, including the list head and terminator.
    pub block_count: usize,
}

impl HeapGeometry {
    /// Address of the first byte of block `index`.
    #[inline]
    pub const fn block_addr(&self, index: usize) -> usize {
        self.base + index * self.stride
    }

    /// Resolve an address to the block it starts.
    ///
    /// Uses truncating division by the stride. Returns `None` when the address
    /// lies outside the arena or is not the first byte of a block.
    pub fn block_index(&self, addr: usize) -> Option<usize> {
        let offset = addr.checked_sub(self.base)?;
        if self.stride == 0 || offset % self.stride != 0 {
            return None;
        }
        let index = offset / self.stride;
        (index < self.block_count).then_some(index)
    }

    /// Total arena size in bytes.
    #[inline]
    pub const fn arena_size(&self) -> usize {
        self.block_count * self.stride
    }
}

/// Read-only view of the allocator's block list.
pub trait BlockTable {
    /// Shape of the arena the table describes.
    fn geometry(&self) -> HeapGeometry;

    /// Index of the block following `index` in the list. The list ends at the
    /// block whose successor is 0.
    fn successor(&self, index: usize) -> usize;

    /// Free/used state of the chunk starting at `index`.
    fn state(&self, index: usize) -> BlockState;

    /// Bytes spanned by the chunk starting at `index`.
    fn extent(&self, index: usize) -> usize {
        self.successor(index).saturating_sub(index) * self.geometry().stride
    }
}

/// A fixed-block allocator the poisoning layer can wrap.
///
/// `allocate`, `resize` and `release` are each expected to be atomic with
/// respect to one another and to [`critical`](Self::critical). Null is the
/// failure value throughout.
pub trait BlockAllocator {
    /// Shape of the arena. Must not change over the allocator's lifetime.
    fn geometry(&self) -> HeapGeometry;

    /// Allocate `size` bytes and run `init` on the result before the
    /// allocation becomes visible to [`critical`](Self::critical).
    ///
    /// `init` receives null on failure (and for the allocator's zero-size
    /// convention); otherwise a pointer valid for `size` bytes. Its return
    /// value is returned to the caller.
    fn allocate_with(&self, size: usize, init: impl FnOnce(*mut u8) -> *mut u8) -> *mut u8;

    /// Resize an allocation, possibly moving it, and run `init` on the result
    /// before it becomes visible to [`critical`](Self::critical).
    ///
    /// A null `ptr` behaves like [`allocate_with`](Self::allocate_with).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    unsafe fn resize_with(
        &self,
        ptr: *mut u8,
        size: usize,
        init: impl FnOnce(*mut u8) -> *mut u8,
    ) -> *mut u8;

    /// Return an allocation to the allocator. Null is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    unsafe fn release(&self, ptr: *mut u8);

    /// Run `f` with the block table locked against concurrent allocation.
    ///
    /// The lock is held for exactly the duration of `f`.
    fn critical<R>(&self, f: impl FnOnce(&dyn BlockTable) -> R) -> R;

    /// Allocate `size` bytes. `allocate(0)` follows the allocator's own
    /// zero-size convention.
    fn allocate(&self, size: usize) -> *mut u8 {
        self.allocate_with(size, |raw| raw)
    }

    /// Resize an allocation, possibly moving it.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this allocator.
    unsafe fn resize(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        self.resize_with(ptr, size, |raw| raw)
    }
}

impl<T: BlockAllocator> BlockAllocator for &T {
    fn geometry(&self) -> HeapGeometry {
        (**self).geometry()
    }

    fn allocate_with(&self, size: usize, init: impl FnOnce(*mut u8) -> *mut u8) -> *mut u8 {
        (**self).allocate_with(size, init)
    }

    unsafe fn resize_with(
        &self,
        ptr: *mut u8,
        size: usize,
        init: impl FnOnce(*mut u8) -> *mut u8,
    ) -> *mut u8 {
        (**self).resize_with(ptr, size, init)
    }

    unsafe fn release(&self, ptr: *mut u8) {
        (**self).release(ptr)
    }

    fn critical<R>(&self, f: impl FnOnce(&dyn BlockTable) -> R) -> R {
        (**self).critical(f)
    }
}
