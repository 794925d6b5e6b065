use std::fmt;

use crate::reference::Ref;

/// Errors reported at the manager's call boundary.
///
/// These are recoverable: the manager state is unchanged when one of them
/// is returned. Internal structural corruption is *not* reported this way;
/// the hot paths assert their invariants and abort, since continuing after
/// a broken invariant risks silently wrong Boolean answers.
/// [`InvariantViolation`][BddError::InvariantViolation] is produced only by
/// the explicit [`check_invariants`][crate::bdd::Bdd::check_invariants] audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BddError {
    /// An operation referenced a variable index outside the declared range.
    InvalidVariable(u32),
    /// `release` was called on a handle whose external count is already zero.
    ReferenceUnderflow(Ref),
    /// A consistency audit found structural corruption.
    InvariantViolation(String),
    /// The unique table cannot grow past its configured limit.
    ResourceExhaustion { needed: usize, limit: usize },
}

impl fmt::Display for BddError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BddError::InvalidVariable(v) => {
                write!(f, "variable index {} is outside the declared range", v)
            }
            BddError::ReferenceUnderflow(r) => {
                write!(f, "release of {} with zero external references", r)
            }
            BddError::InvariantViolation(msg) => {
                write!(f, "invariant violation: {}", msg)
            }
            BddError::ResourceExhaustion { needed, limit } => {
                write!(
                    f,
                    "unique table exhausted: {} nodes needed, limit is {}",
                    needed, limit
                )
            }
        }
    }
}

impl std::error::Error for BddError {}

pub type Result<T> = std::result::Result<T, BddError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = BddError::InvalidVariable(7);
        assert_eq!(e.to_string(), "variable index 7 is outside the declared range");

        let e = BddError::ResourceExhaustion { needed: 9, limit: 8 };
        assert_eq!(e.to_string(), "unique table exhausted: 9 nodes needed, limit is 8");
    }
}
