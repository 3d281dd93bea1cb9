//! Poisoning configuration.

/// Integer width of the length field stored at the start of every poisoned block.
///
/// The field records the total block size handed to the allocator. Sizes that
/// do not fit the width are truncated; picking a wide enough field for the
/// heap is the caller's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LenWidth {
    /// One byte.
    U8,
    /// Two bytes.
    U16,
    /// Four bytes.
    U32,
    /// Eight bytes.
    U64,
}

impl LenWidth {
    /// Size of the field in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            LenWidth::U8 => 1,
            LenWidth::U16 => 2,
            LenWidth::U32 => 4,
            LenWidth::U64 => 8,
        }
    }

    /// Largest length the field can hold.
    #[inline]
    pub const fn max(self) -> u64 {
        match self {
            LenWidth::U8 => u8::MAX as u64,
            LenWidth::U16 => u16::MAX as u64,
            LenWidth::U32 => u32::MAX as u64,
            LenWidth::U64 => u64::MAX,
        }
    }

    /// Store `value`, truncated to the field width, in native byte order.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `self.bytes()` writes. No alignment is required.
    #[inline]
    pub(crate) unsafe fn write(self, ptr: *mut u8, value: usize) {
        match self {
            LenWidth::U8 => ptr.write(value as u8),
            LenWidth::U16 => (ptr as *mut u16).write_unaligned(value as u16),
            LenWidth::U32 => (ptr as *mut u32).write_unaligned(value as u32),
            LenWidth::U64 => (ptr as *mut u64).write_unaligned(value as u64),
        }
    }

    /// Load a length written by [`write`](Self::write).
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for `self.bytes()` reads. No alignment is required.
    #[inline]
    pub(crate) unsafe fn read(self, ptr: *const u8) -> usize {
        match self {
            LenWidth::U8 => ptr.read() as usize,
            LenWidth::U16 => (ptr as *const u16).read_unaligned() as usize,
            LenWidth::U32 => (ptr as *const u32).read_unaligned() as usize,
            LenWidth::U64 => (ptr as *const u64).read_unaligned() as usize,
        }
    }
}

/// Configuration for a [`PoisonHeap`](crate::PoisonHeap).
///
/// Fixed once the heap is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoisonConfig {
    /// Byte repeated across both guard regions (default: 0xA5)
    pub sentinel: u8,

    /// Guard bytes between the length field and the user region (default: 4)
    pub before: usize,

    /// Guard bytes after the user region (default: 4)
    pub after: usize,

    /// Width of the length field (default: 2 bytes)
    pub len_width: LenWidth,

    /// Whether poisoning is active. When off, the heap is a pass-through.
    pub enabled: bool,

    /// Maximum blocks a full-heap check visits before declaring the block
    /// list corrupt (default: the block count)
    pub walk_limit: Option<usize>,
}

/// Default sentinel byte.
pub const DEFAULT_SENTINEL: u8 = 0xA5;

impl Default for PoisonConfig {
    fn default() -> Self {
        Self {
            sentinel: DEFAULT_SENTINEL,
            before: 4,
            after: 4,
            len_width: LenWidth::U16,
            enabled: cfg!(feature = "poison"),
            walk_limit: None,
        }
    }
}

impl PoisonConfig {
    /// Poisoning switched on with explicit geometry.
    pub const fn new(sentinel: u8, before: usize, after: usize, len_width: LenWidth) -> Self {
        Self {
            sentinel,
            before,
            after,
            len_width,
            enabled: true,
            walk_limit: None,
        }
    }

    /// Pass-through configuration: no overhead, no checks.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Builder pattern: set the sentinel byte.
    pub fn with_sentinel(mut self, sentinel: u8) -> Self {
        self.sentinel = sentinel;
        self
    }

    /// Builder pattern: set both guard sizes.
    pub fn with_guards(mut self, before: usize, after: usize) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    /// Builder pattern: set the length field width.
    pub fn with_len_width(mut self, len_width: LenWidth) -> Self {
        self.len_width = len_width;
        self
    }

    /// Builder pattern: enable or disable poisoning.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder pattern: bound the number of blocks a heap check visits.
    pub fn with_walk_limit(mut self, limit: usize) -> Self {
        self.walk_limit = Some(limit);
        self
    }

    /// Offset from the start of a block to the user region.
    #[inline]
    pub const fn header_size(&self) -> usize {
        self.len_width.bytes() + self.before
    }
}
