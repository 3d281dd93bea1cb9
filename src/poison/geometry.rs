//! Size inflation for poisoned blocks.
//!
//! A poisoned block is laid out as
//!
//! ```text
//! [length field][guard before][user region][guard after]
//! ```
//!
//! and the length field holds the size of the whole thing.

use crate::api::config::PoisonConfig;

/// Bytes added to a request of `size` bytes. Zero stays zero.
#[inline]
pub(crate) const fn poison_overhead(config: &PoisonConfig, size: usize) -> usize {
    if size == 0 {
        0
    } else {
        config.len_width.bytes() + config.before + config.after
    }
}

/// Total block size for a user request, or `None` if it overflows.
#[inline]
pub(crate) fn inflate(config: &PoisonConfig, size: usize) -> Option<usize> {
    size.checked_add(poison_overhead(config, size))
}

/// User-visible bytes in a block whose length field reads `total`.
#[inline]
pub(crate) const fn user_size(config: &PoisonConfig, total: usize) -> usize {
    total.saturating_sub(poison_overhead(config, 1))
}
