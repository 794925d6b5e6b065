use crate::reference::Ref;
use crate::utils::{pairing3, MyHash};

/// A decision node: branch on `variable`, follow `low` when it is false
/// and `high` when it is true.
///
/// Canonical form: `high` is never complemented, and `low != high`.
/// Both are enforced by the manager before a node reaches the table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Node {
    pub variable: u32,
    pub low: Ref,
    pub high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(
            self.variable as u64,
            self.low.unsigned() as u64,
            self.high.unsigned() as u64,
        )
    }
}
