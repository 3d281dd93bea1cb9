//! Mapping between user pointers, raw block pointers and block indices.

use crate::allocators::block::HeapGeometry;
use crate::api::config::PoisonConfig;

/// Step back from a user pointer to the start of its poisoned block.
///
/// Null stays null.
#[inline]
pub(crate) fn user_to_raw(config: &PoisonConfig, user: *mut u8) -> *mut u8 {
    if user.is_null() {
        return user;
    }
    user.wrapping_sub(config.header_size())
}

/// Resolve a raw block pointer to its index in the block table.
///
/// Raw pointers sit on block boundaries by construction; one that does not
/// is reported and yields `None`.
pub(crate) fn block_of(geometry: &HeapGeometry, raw: *const u8) -> Option<usize> {
    let index = geometry.block_index(raw as usize);
    if index.is_none() {
        crate::gh_emit!(
            GH006,
            "{:#010x} is not a block boundary of the heap at {:#010x} (stride {})",
            raw as usize,
            geometry.base,
            geometry.stride
        );
    }
    index
}
