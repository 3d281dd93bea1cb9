//! Writing and checking guard bytes.
//!
//! Fills guard regions with the sentinel byte when a block is handed out and
//! compares them again on release, resize and heap checks.

use super::violation::{GuardSide, Violation, ViolationKind};
use crate::allocators::block::{BlockState, BlockTable};
use crate::api::config::PoisonConfig;

/// Poison a freshly allocated block and return the user pointer.
///
/// Null pointers and zero totals pass through untouched.
///
/// # Safety
///
/// `raw` must be null or valid for `total` bytes of writes, and `total` must
/// be at least the configured overhead. A `total` wider than the length field
/// is truncated.
pub(crate) unsafe fn stamp(config: &PoisonConfig, raw: *mut u8, total: usize) -> *mut u8 {
    if raw.is_null() || total == 0 {
        return raw;
    }

    let len_bytes = config.len_width.bytes();
    raw.add(len_bytes).write_bytes(config.sentinel, config.before);
    raw.add(total - config.after).write_bytes(config.sentinel, config.after);
    config.len_width.write(raw, total);

    raw.add(len_bytes + config.before)
}

/// Compare `len` bytes at `ptr` with the sentinel.
///
/// Returns the region's contents if any byte differs.
///
/// # Safety
///
/// `ptr` must be valid for `len` bytes of reads.
unsafe fn check_guard(ptr: *const u8, len: usize, sentinel: u8) -> Option<Vec<u8>> {
    let guard = std::slice::from_raw_parts(ptr, len);
    if guard.iter().all(|&b| b == sentinel) {
        None
    } else {
        Some(guard.to_vec())
    }
}

/// Check both guards of the poisoned block at `raw`.
///
/// The length field is validated against `capacity` before it is used to
/// locate the trailing guard. The leading guard is checked first and a
/// failure there ends the check.
///
/// # Safety
///
/// `raw` must be valid for `capacity` bytes of reads.
pub(crate) unsafe fn verify_region(
    config: &PoisonConfig,
    raw: *const u8,
    capacity: usize,
) -> Result<(), ViolationKind> {
    if capacity < config.len_width.bytes() {
        return Err(ViolationKind::LengthField { value: 0, capacity });
    }

    let header = config.header_size();
    let total = config.len_width.read(raw);
    if total < header + config.after || total > capacity {
        return Err(ViolationKind::LengthField {
            value: total,
            capacity,
        });
    }

    let before = raw.add(config.len_width.bytes());
    if let Some(actual) = check_guard(before, config.before, config.sentinel) {
        return Err(ViolationKind::Guard {
            side: GuardSide::Before,
            guard_addr: before as usize,
            actual,
        });
    }

    let after = raw.add(total - config.after);
    if let Some(actual) = check_guard(after, config.after, config.sentinel) {
        return Err(ViolationKind::Guard {
            side: GuardSide::After,
            guard_addr: after as usize,
            actual,
        });
    }

    Ok(())
}

/// Check the guards of block `index`, which must be a used chunk.
///
/// A free block is a usage error: it is reported as such and passes.
pub(crate) fn verify_block(
    config: &PoisonConfig,
    table: &dyn BlockTable,
    index: usize,
) -> Result<(), Violation> {
    let block_addr = table.geometry().block_addr(index);

    if table.state(index) == BlockState::Free {
        crate::gh_emit!(GH003, "block {} at {:#010x}", index, block_addr);
        return Ok(());
    }

    let capacity = table.extent(index);
    // SAFETY: a used chunk spans `capacity` bytes of the arena from its first block
    unsafe { verify_region(config, block_addr as *const u8, capacity) }
        .map_err(|kind| Violation::new(index, block_addr, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::LenWidth;

    fn config() -> PoisonConfig {
        PoisonConfig::new(0xA5, 4, 4, LenWidth::U16)
    }

    #[test]
    fn test_stamp_layout() {
        let config = config();
        let mut block = [0u8; 24];
        let raw = block.as_mut_ptr();

        let user = unsafe { stamp(&config, raw, 20) };
        assert_eq!(user as usize - raw as usize, 6);
        assert_eq!(u16::from_ne_bytes([block[0], block[1]]), 20);
        assert_eq!(&block[2..6], &[0xA5; 4]);
        assert_eq!(&block[6..16], &[0; 10]);
        assert_eq!(&block[16..20], &[0xA5; 4]);
        assert_eq!(&block[20..], &[0; 4]);

        assert_eq!(unsafe { verify_region(&config, block.as_ptr(), 24) }, Ok(()));
    }

    #[test]
    fn test_stamp_passes_through_null_and_zero() {
        let config = config();
        let mut block = [0u8; 8];
        unsafe {
            assert!(stamp(&config, std::ptr::null_mut(), 20).is_null());
            assert_eq!(stamp(&config, block.as_mut_ptr(), 0), block.as_mut_ptr());
        }
        assert_eq!(block, [0; 8]);
    }

    #[test]
    fn test_each_guard_byte_is_checked() {
        let config = config();
        for offset in (2..6).chain(16..20) {
            let mut block = [0u8; 20];
            unsafe { stamp(&config, block.as_mut_ptr(), 20) };
            block[offset] = 0x5A;

            let (side, guard_addr, actual) =
                match unsafe { verify_region(&config, block.as_ptr(), 20) } {
                    Err(ViolationKind::Guard { side, guard_addr, actual }) => (side, guard_addr, actual),
                    other => panic!("expected guard violation, got {:?}", other),
                };
            let expected_side = if offset < 6 { GuardSide::Before } else { GuardSide::After };
            let start = if offset < 6 { 2 } else { 16 };
            assert_eq!(side, expected_side);
            assert_eq!(guard_addr, block.as_ptr() as usize + start);
            assert_eq!(actual[offset - start], 0x5A);
            assert_eq!(actual.len(), 4);
        }
    }

    #[test]
    fn test_before_failure_short_circuits() {
        let config = config();
        let mut block = [0u8; 20];
        unsafe { stamp(&config, block.as_mut_ptr(), 20) };
        block[2] = 0;
        block[19] = 0;

        let err = unsafe { verify_region(&config, block.as_ptr(), 20) }.unwrap_err();
        assert!(matches!(err, ViolationKind::Guard { side: GuardSide::Before, .. }));
    }

    #[test]
    fn test_bad_length_field() {
        let config = config();
        let mut block = [0u8; 20];
        unsafe { stamp(&config, block.as_mut_ptr(), 20) };

        block[..2].copy_from_slice(&400u16.to_ne_bytes());
        assert_eq!(
            unsafe { verify_region(&config, block.as_ptr(), 20) },
            Err(ViolationKind::LengthField { value: 400, capacity: 20 })
        );

        block[..2].copy_from_slice(&3u16.to_ne_bytes());
        assert_eq!(
            unsafe { verify_region(&config, block.as_ptr(), 20) },
            Err(ViolationKind::LengthField { value: 3, capacity: 20 })
        );
    }

    #[test]
    fn test_zero_sized_guards() {
        let config = PoisonConfig::new(0xA5, 0, 0, LenWidth::U8);
        let mut block = [0u8; 4];
        let user = unsafe { stamp(&config, block.as_mut_ptr(), 3) };
        assert_eq!(user as usize - block.as_ptr() as usize, 1);
        assert_eq!(block[0], 3);
        assert_eq!(unsafe { verify_region(&config, block.as_ptr(), 4) }, Ok(()));
    }
}
