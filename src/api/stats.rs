//! Poisoning statistics.

use std::fmt;

use crate::sync::atomics::AtomicCounter;

/// Snapshot of a [`PoisonHeap`](crate::PoisonHeap)'s activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoisonStats {
    /// Calls to `allocate`.
    pub allocations: u64,

    /// Calls to `zero_allocate`.
    pub zero_allocations: u64,

    /// Calls to `resize`.
    pub resizes: u64,

    /// Calls to `release`.
    pub releases: u64,

    /// Individual blocks whose guards were checked.
    pub verifications: u64,

    /// Violations reported.
    pub violations: u64,

    /// Full-heap checks run.
    pub heap_checks: u64,
}

impl PoisonStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no violation has been reported.
    pub fn is_clean(&self) -> bool {
        self.violations == 0
    }
}

impl fmt::Display for PoisonStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Poison Statistics:")?;
        writeln!(f, "  Allocations:      {}", self.allocations)?;
        writeln!(f, "  Zero allocations: {}", self.zero_allocations)?;
        writeln!(f, "  Resizes:          {}", self.resizes)?;
        writeln!(f, "  Releases:         {}", self.releases)?;
        writeln!(f, "  Blocks verified:  {}", self.verifications)?;
        writeln!(f, "  Heap checks:      {}", self.heap_checks)?;
        write!(f, "  Violations:       {}", self.violations)
    }
}

/// Live counters behind [`PoisonStats`].
#[derive(Default)]
pub(crate) struct PoisonCounters {
    pub allocations: AtomicCounter,
    pub zero_allocations: AtomicCounter,
    pub resizes: AtomicCounter,
    pub releases: AtomicCounter,
    pub verifications: AtomicCounter,
    pub violations: AtomicCounter,
    pub heap_checks: AtomicCounter,
}

impl PoisonCounters {
    pub fn snapshot(&self) -> PoisonStats {
        PoisonStats {
            allocations: self.allocations.get(),
            zero_allocations: self.zero_allocations.get(),
            resizes: self.resizes.get(),
            releases: self.releases.get(),
            verifications: self.verifications.get(),
            violations: self.violations.get(),
            heap_checks: self.heap_checks.get(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.allocations,
            &self.zero_allocations,
            &self.resizes,
            &self.releases,
            &self.verifications,
            &self.violations,
            &self.heap_checks,
        ] {
            counter.reset();
        }
    }
}
