//! Block allocator backends.
//!
//! [`block`] defines what the poisoning layer needs from an allocator;
//! [`block_heap`] is a self-contained implementation of it.
//! **These are the only modules that should contain allocator `unsafe` code.**

pub mod block;
pub mod block_heap;
