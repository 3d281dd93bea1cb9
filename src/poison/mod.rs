//! The poisoning core: size inflation, guard stamping and checking, and
//! pointer translation.
//!
//! Everything here is internal except the violation types; callers go
//! through [`PoisonHeap`](crate::PoisonHeap).

pub(crate) mod geometry;
pub(crate) mod sentinel;
pub(crate) mod translate;
pub mod violation;
