//! The poisoning allocation facade.

use std::sync::Arc;

use crate::allocators::block::BlockAllocator;
use crate::api::config::PoisonConfig;
use crate::api::stats::{PoisonCounters, PoisonStats};
use crate::api::walker::walk_used_blocks;
use crate::diagnostics::emit::{emit_with_context, DiagnosticSink};
use crate::diagnostics::{GH001, GH002, GH004};
use crate::poison::geometry::{inflate, user_size};
use crate::poison::sentinel::{stamp, verify_block};
use crate::poison::translate::{block_of, user_to_raw};
use crate::poison::violation::{Violation, ViolationKind};

/// A block allocator wrapped with sentinel guards.
///
/// Every allocation is inflated so that a length field and two guard regions
/// surround the caller's bytes. Guards are checked on release and resize, on
/// demand with [`check`](Self::check), and across the whole heap with
/// [`check_all_used_blocks`](Self::check_all_used_blocks).
///
/// Release and resize are fail-open: a damaged guard is reported to the
/// diagnostics output and the installed [`DiagnosticSink`], and the operation
/// goes ahead regardless.
///
/// # Example
///
/// ```rust
/// use guardheap::{BlockHeap, PoisonConfig, PoisonHeap};
///
/// let heap = PoisonHeap::new(BlockHeap::new(256, 8).unwrap(), PoisonConfig::default());
///
/// let p = heap.allocate(10);
/// assert!(!p.is_null());
/// assert!(heap.check_all_used_blocks().is_ok());
///
/// unsafe { heap.release(p) };
/// ```
pub struct PoisonHeap<A: BlockAllocator> {
    /// The allocator doing the real work
    inner: A,

    /// Guard geometry, fixed for the heap's lifetime
    config: PoisonConfig,

    /// Observer for violations
    sink: Option<Arc<dyn DiagnosticSink>>,

    /// Activity counters
    counters: PoisonCounters,
}

impl<A: BlockAllocator> PoisonHeap<A> {
    /// Wrap `inner` with the given guard configuration.
    pub fn new(inner: A, config: PoisonConfig) -> Self {
        Self {
            inner,
            config,
            sink: None,
            counters: PoisonCounters::default(),
        }
    }

    /// Builder pattern: install a sink that sees every violation.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The guard configuration.
    pub fn config(&self) -> &PoisonConfig {
        &self.config
    }

    /// The wrapped allocator.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Unwrap into the underlying allocator.
    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Snapshot of the activity counters.
    pub fn stats(&self) -> PoisonStats {
        self.counters.snapshot()
    }

    /// Zero the activity counters.
    pub fn reset_stats(&self) {
        self.counters.reset();
    }

    /// Allocate `size` bytes surrounded by guards.
    ///
    /// Returns null if the allocator fails. `allocate(0)` passes straight
    /// through to the allocator with no overhead.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        self.counters.allocations.increment();
        if !self.config.enabled {
            return self.inner.allocate(size);
        }

        let Some(total) = self.inflate(size) else {
            return std::ptr::null_mut();
        };
        // Guards go on before the block is visible to a heap check
        self.inner.allocate_with(total, |raw| {
            // SAFETY: a non-null result is valid for `total` bytes
            unsafe { stamp(&self.config, raw, total) }
        })
    }

    /// Allocate `count * item_size` zeroed bytes surrounded by guards.
    ///
    /// Returns null if the multiplication overflows or the allocator fails.
    pub fn zero_allocate(&self, count: usize, item_size: usize) -> *mut u8 {
        self.counters.zero_allocations.increment();

        let Some(size) = count.checked_mul(item_size) else {
            crate::gh_emit!(GH005, "{} items of {} bytes", count, item_size);
            return std::ptr::null_mut();
        };
        let total = if self.config.enabled {
            match self.inflate(size) {
                Some(total) => total,
                None => return std::ptr::null_mut(),
            }
        } else {
            size
        };

        self.inner.allocate_with(total, |raw| {
            if raw.is_null() {
                return raw;
            }

            // SAFETY: `raw` is valid for `total` bytes; guards go on after zeroing
            unsafe {
                raw.write_bytes(0, total);
                if self.config.enabled {
                    stamp(&self.config, raw, total)
                } else {
                    raw
                }
            }
        })
    }

    /// Resize an allocation to `size` bytes, re-stamping its guards.
    ///
    /// The old guards are checked first; a violation is reported and the
    /// resize still happens. A null `ptr` allocates. On failure null is
    /// returned and `ptr` stays valid.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this heap.
    pub unsafe fn resize(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        self.counters.resizes.increment();
        if !self.config.enabled {
            return self.inner.resize(ptr, size);
        }

        let raw = self.to_raw_and_verify(ptr);
        let Some(total) = self.inflate(size) else {
            return std::ptr::null_mut();
        };
        self.inner
            .resize_with(raw, total, |moved| stamp(&self.config, moved, total))
    }

    /// Release an allocation.
    ///
    /// The guards are checked first; a violation is reported and the block
    /// is released regardless. Null is ignored by the allocator.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this heap.
    pub unsafe fn release(&self, ptr: *mut u8) {
        self.counters.releases.increment();
        let raw = if self.config.enabled {
            self.to_raw_and_verify(ptr)
        } else {
            ptr
        };
        self.inner.release(raw);
    }

    /// Check the guards of one live allocation.
    ///
    /// Always passes when poisoning is disabled, for null, and for pointers
    /// that do not map to a block of this heap (the latter are reported).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this heap.
    pub unsafe fn check(&self, ptr: *mut u8) -> Result<(), Violation> {
        if !self.config.enabled || ptr.is_null() {
            return Ok(());
        }

        let raw = user_to_raw(&self.config, ptr);
        match block_of(&self.inner.geometry(), raw) {
            Some(index) => self.verify_index(index),
            None => Ok(()),
        }
    }

    /// User-visible size of a live allocation, recovered from its length field.
    ///
    /// `None` for null or when poisoning is disabled (no length is recorded).
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live pointer returned by this heap.
    pub unsafe fn usable_size(&self, ptr: *mut u8) -> Option<usize> {
        if !self.config.enabled || ptr.is_null() {
            return None;
        }
        let raw = user_to_raw(&self.config, ptr);
        Some(user_size(&self.config, self.config.len_width.read(raw)))
    }

    /// Check the guards of every used block in the heap.
    ///
    /// Runs inside the allocator's critical section and stops at the first
    /// violation, which is reported and returned. Guards are written under the
    /// same lock, so allocations in flight on other threads are never seen
    /// half-stamped.
    pub fn check_all_used_blocks(&self) -> Result<(), Violation> {
        if !self.config.enabled {
            return Ok(());
        }
        self.counters.heap_checks.increment();

        match self.inner.critical(|table| walk_used_blocks(&self.config, table)) {
            Ok(checked) => {
                self.counters.verifications.add(checked);
                #[cfg(feature = "log")]
                log::debug!("heap check passed: {} used blocks", checked);
                Ok(())
            }
            Err(violation) => {
                self.report(&violation);
                Err(violation)
            }
        }
    }

    /// Map a user pointer back to its raw block pointer, checking the block's
    /// guards on the way. The check result is reported, never propagated.
    fn to_raw_and_verify(&self, ptr: *mut u8) -> *mut u8 {
        let raw = user_to_raw(&self.config, ptr);
        if raw.is_null() {
            return raw;
        }

        if let Some(index) = block_of(&self.inner.geometry(), raw) {
            let _ = self.verify_index(index);
        }
        raw
    }

    fn verify_index(&self, index: usize) -> Result<(), Violation> {
        self.counters.verifications.increment();
        let result = self
            .inner
            .critical(|table| verify_block(&self.config, table, index));
        if let Err(violation) = &result {
            self.report(violation);
        }
        result
    }

    fn inflate(&self, size: usize) -> Option<usize> {
        let total = inflate(&self.config, size);
        if total.is_none() {
            crate::gh_emit!(GH005, "{} bytes plus guards", size);
        }
        total
    }

    fn report(&self, violation: &Violation) {
        self.counters.violations.increment();

        let diag = match violation.kind {
            ViolationKind::Guard { .. } => &GH001,
            ViolationKind::LengthField { .. } => &GH002,
            ViolationKind::WalkLimit { .. } | ViolationKind::BadLink { .. } => &GH004,
        };
        emit_with_context(diag, &violation.to_string());

        if let Some(sink) = &self.sink {
            sink.report(violation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocators::block_heap::BlockHeap;
    use crate::api::config::LenWidth;
    use crate::diagnostics::{suppress_diagnostics, CollectingSink};
    use crate::poison::violation::GuardSide;

    fn heap() -> (PoisonHeap<BlockHeap>, Arc<CollectingSink>) {
        suppress_diagnostics(true);
        let sink = Arc::new(CollectingSink::new());
        let heap = PoisonHeap::new(
            BlockHeap::new(128, 8).unwrap(),
            PoisonConfig::new(0xA5, 4, 4, LenWidth::U16),
        )
        .with_sink(sink.clone());
        (heap, sink)
    }

    #[test]
    fn test_allocate_requests_inflated_size() {
        let (heap, _) = heap();
        let p = heap.allocate(10);
        assert!(!p.is_null());

        // 10 + 2 + 4 + 4 = 20 bytes = 3 blocks
        assert_eq!(heap.inner().used_blocks(), 3);
        unsafe {
            assert_eq!(heap.usable_size(p), Some(10));
            assert!(heap.check(p).is_ok());
            let raw = p.sub(6);
            assert_eq!(LenWidth::U16.read(raw), 20);
        }
    }

    #[test]
    fn test_zero_size_passes_through() {
        let (heap, _) = heap();
        assert!(heap.allocate(0).is_null());
        assert!(heap.zero_allocate(0, 16).is_null());
        assert!(heap.zero_allocate(16, 0).is_null());
        assert_eq!(heap.inner().used_blocks(), 0);
    }

    #[test]
    fn test_zero_allocate_zeroes_user_bytes() {
        let (heap, _) = heap();

        // Dirty the arena first so zeroing is observable
        let dirty = heap.allocate(64);
        unsafe {
            dirty.write_bytes(0xEE, 64);
            heap.release(dirty);
        }

        let p = heap.zero_allocate(8, 4);
        assert!(!p.is_null());
        unsafe {
            assert_eq!(std::slice::from_raw_parts(p, 32), &[0u8; 32]);
            assert_eq!(std::slice::from_raw_parts(p.sub(4), 4), &[0xA5; 4]);
            assert_eq!(std::slice::from_raw_parts(p.add(32), 4), &[0xA5; 4]);
            assert!(heap.check(p).is_ok());
        }
    }

    #[test]
    fn test_zero_allocate_overflow_is_null() {
        let (heap, _) = heap();
        assert!(heap.zero_allocate(usize::MAX, 2).is_null());
        assert!(heap.allocate(usize::MAX).is_null());
    }

    #[test]
    fn test_release_is_fail_open() {
        let (heap, sink) = heap();
        let p = heap.allocate(10);
        unsafe {
            p.add(10).write(0x00);
            heap.release(p);
        }

        assert_eq!(heap.inner().used_blocks(), 0);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.violations()[0].side(), Some(GuardSide::After));
        assert_eq!(heap.stats().violations, 1);
    }

    #[test]
    fn test_resize_is_fail_open_and_restamps() {
        let (heap, sink) = heap();
        let p = heap.allocate(10);
        unsafe {
            p.sub(1).write(0x00);
            let q = heap.resize(p, 40);
            assert!(!q.is_null());
            assert_eq!(sink.violations()[0].side(), Some(GuardSide::Before));
            assert!(heap.check(q).is_ok());
            assert_eq!(heap.usable_size(q), Some(40));
        }
        assert!(heap.check_all_used_blocks().is_ok());
    }

    #[test]
    fn test_resize_null_allocates_and_zero_releases() {
        let (heap, sink) = heap();
        unsafe {
            let p = heap.resize(std::ptr::null_mut(), 12);
            assert!(!p.is_null());
            assert!(heap.check(p).is_ok());

            assert!(heap.resize(p, 0).is_null());
        }
        assert_eq!(heap.inner().used_blocks(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_double_release_is_not_corruption() {
        let (heap, sink) = heap();
        let p = heap.allocate(10);
        unsafe {
            heap.release(p);
            heap.release(p);
        }
        assert!(sink.is_empty());
        assert!(heap.stats().is_clean());
    }

    #[test]
    fn test_foreign_pointer_is_skipped() {
        let (heap, sink) = heap();
        let mut local = [0u8; 16];
        unsafe {
            assert!(heap.check(local.as_mut_ptr().add(8)).is_ok());
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_narrow_length_field_truncates() {
        suppress_diagnostics(true);
        let heap = PoisonHeap::new(
            BlockHeap::new(128, 8).unwrap(),
            PoisonConfig::new(0xA5, 4, 4, LenWidth::U8),
        );

        // 300 + 1 + 4 + 4 = 309 bytes, recorded as 309 % 256 = 53
        let p = heap.allocate(300);
        assert!(!p.is_null());
        unsafe {
            assert_eq!(LenWidth::U8.read(p.sub(5)), 53);
            assert_eq!(heap.usable_size(p), Some(44));
            p.write_bytes(0, 300);
            heap.release(p);
        }
        assert_eq!(heap.inner().used_blocks(), 0);
    }

    #[test]
    fn test_misaligned_pointer_is_handed_on_unchanged() {
        let (heap, sink) = heap();
        let p = heap.allocate(10);
        let other = heap.allocate(10);
        let used = heap.inner().used_blocks();

        unsafe {
            // Inside the arena but off a block boundary
            heap.release(p.add(1));
            assert!(heap.resize(other.add(1), 30).is_null());

            assert_eq!(heap.inner().used_blocks(), used);
            assert!(heap.check(p).is_ok());
            assert_eq!(heap.usable_size(other), Some(10));
        }
        assert!(sink.is_empty());
        assert_eq!(heap.stats().violations, 0);
        assert!(heap.check_all_used_blocks().is_ok());
    }

    #[test]
    fn test_disabled_is_pass_through() {
        suppress_diagnostics(true);
        let heap = PoisonHeap::new(BlockHeap::new(64, 8).unwrap(), PoisonConfig::disabled());

        let p = heap.allocate(8);
        assert_eq!(heap.inner().used_blocks(), 1);
        assert_eq!(
            heap.inner().geometry().block_index(p as usize),
            Some(1)
        );
        unsafe {
            p.write_bytes(0, 8);
            assert_eq!(heap.usable_size(p), None);
            assert!(heap.check(p).is_ok());
            heap.release(p);
        }
        assert!(heap.check_all_used_blocks().is_ok());
        assert_eq!(heap.inner().used_blocks(), 0);
    }

    #[test]
    fn test_stats_count_operations() {
        let (heap, _) = heap();
        let a = heap.allocate(4);
        let b = heap.zero_allocate(2, 2);
        unsafe {
            let a = heap.resize(a, 8);
            heap.release(a);
            heap.release(b);
        }
        heap.check_all_used_blocks().unwrap();

        let stats = heap.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.zero_allocations, 1);
        assert_eq!(stats.resizes, 1);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.verifications, 3);
        assert_eq!(stats.heap_checks, 1);

        heap.reset_stats();
        assert_eq!(heap.stats(), PoisonStats::new());
    }
}
