//! Corruption reports.

use std::fmt;

/// Which guard region a mismatch was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardSide {
    /// Between the length field and the user region.
    Before,
    /// After the user region.
    After,
}

impl fmt::Display for GuardSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardSide::Before => write!(f, "before"),
            GuardSide::After => write!(f, "after"),
        }
    }
}

/// What was found wrong with a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A guard byte differs from the sentinel.
    Guard {
        /// Which guard.
        side: GuardSide,
        /// Address of the first byte of the guard region.
        guard_addr: usize,
        /// Full contents of the guard region as found.
        actual: Vec<u8>,
    },
    /// The recorded length cannot describe this block.
    LengthField {
        /// Value read from the length field.
        value: usize,
        /// Bytes the block actually spans.
        capacity: usize,
    },
    /// The block list did not terminate within the step bound.
    WalkLimit {
        /// Blocks visited before giving up.
        steps: usize,
    },
    /// A successor link points outside the block table.
    BadLink {
        /// The out-of-range successor index.
        successor: usize,
    },
}

/// A corruption detected in one block.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Index of the offending block in the allocator's table.
    pub block_index: usize,
    /// Address of the offending block.
    pub block_addr: usize,
    /// What was wrong.
    pub kind: ViolationKind,
    /// Where the violation was reported from (`debug` feature only).
    pub backtrace: Option<String>,
}

impl Violation {
    /// Create a violation, capturing a backtrace if the `debug` feature is on.
    pub fn new(block_index: usize, block_addr: usize, kind: ViolationKind) -> Self {
        Self {
            block_index,
            block_addr,
            kind,
            backtrace: crate::debug::backtrace::capture(),
        }
    }

    /// The guard side, for guard violations.
    pub fn side(&self) -> Option<GuardSide> {
        match self.kind {
            ViolationKind::Guard { side, .. } => Some(side),
            _ => None,
        }
    }

    /// Whether the allocator's block list itself is damaged.
    pub fn is_list_corruption(&self) -> bool {
        matches!(
            self.kind,
            ViolationKind::WalkLimit { .. } | ViolationKind::BadLink { .. }
        )
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::Guard {
                side,
                guard_addr,
                actual,
            } => {
                write!(
                    f,
                    "no poison {} block {} at: {:#010x}, actual data:",
                    side, self.block_index, guard_addr
                )?;
                for byte in actual {
                    write!(f, " {:#04x}", byte)?;
                }
                Ok(())
            }
            ViolationKind::LengthField { value, capacity } => write!(
                f,
                "bad length field in block {} at: {:#010x}: {} bytes recorded, {} available",
                self.block_index, self.block_addr, value, capacity
            ),
            ViolationKind::WalkLimit { steps } => write!(
                f,
                "block list does not terminate: gave up after {} blocks at block {} ({:#010x})",
                steps, self.block_index, self.block_addr
            ),
            ViolationKind::BadLink { successor } => write!(
                f,
                "block {} at: {:#010x} links to out-of-range block {}",
                self.block_index, self.block_addr, successor
            ),
        }
    }
}

impl std::error::Error for Violation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_display_dumps_bytes() {
        let v = Violation::new(
            3,
            0x2018,
            ViolationKind::Guard {
                side: GuardSide::After,
                guard_addr: 0x202a,
                actual: vec![0x00, 0xa5, 0xa5, 0xa5],
            },
        );
        assert_eq!(
            v.to_string(),
            "no poison after block 3 at: 0x0000202a, actual data: 0x00 0xa5 0xa5 0xa5"
        );
        assert_eq!(v.side(), Some(GuardSide::After));
        assert!(!v.is_list_corruption());
    }

    #[test]
    fn test_list_corruption_kinds() {
        let v = Violation::new(5, 0x1000, ViolationKind::BadLink { successor: 900 });
        assert!(v.is_list_corruption());
        assert_eq!(v.side(), None);
        assert!(v.to_string().contains("out-of-range block 900"));
    }
}
