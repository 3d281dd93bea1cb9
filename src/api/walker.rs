//! Full-heap poison check.
//!
//! Walks the allocator's block list from the head and checks every used
//! chunk, stopping at the first violation. Must run inside the allocator's
//! critical section so the list cannot change underneath it.

use crate::allocators::block::{BlockState, BlockTable, HeapGeometry};
use crate::api::config::PoisonConfig;
use crate::poison::sentinel::verify_block;
use crate::poison::violation::{Violation, ViolationKind};

/// Check every used chunk reachable from block 0.
///
/// Returns the number of chunks checked. The walk gives up with a
/// [`ViolationKind::WalkLimit`] after `config.walk_limit` blocks (default: the
/// table size), which catches cycles in a corrupted list.
pub(crate) fn walk_used_blocks(
    config: &PoisonConfig,
    table: &dyn BlockTable,
) -> Result<u64, Violation> {
    let geometry = table.geometry();
    let limit = config.walk_limit.unwrap_or(geometry.block_count);

    let mut checked = 0;
    let mut steps = 0;
    let mut cur = successor(table, &geometry, 0)?;

    loop {
        let next = successor(table, &geometry, cur)?;
        if next == 0 {
            return Ok(checked);
        }

        if steps == limit {
            return Err(Violation::new(
                cur,
                geometry.block_addr(cur),
                ViolationKind::WalkLimit { steps },
            ));
        }
        steps += 1;

        if table.state(cur) == BlockState::Used {
            verify_block(config, table, cur)?;
            checked += 1;
        }

        cur = next;
    }
}

/// Successor of `index`, rejecting links that leave the table.
fn successor(
    table: &dyn BlockTable,
    geometry: &HeapGeometry,
    index: usize,
) -> Result<usize, Violation> {
    let next = table.successor(index);
    if next < geometry.block_count {
        Ok(next)
    } else {
        Err(Violation::new(
            index,
            geometry.block_addr(index),
            ViolationKind::BadLink { successor: next },
        ))
    }
}
