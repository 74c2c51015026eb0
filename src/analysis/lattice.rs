//! Lattice trait for the analysis domain.
//!
//! Values flowing through the analyzer form a join semi-lattice: at every control flow merge
//! the incoming approximations are joined into one that is at least as conservative as each
//! of them. The domain used here is flat per slot, so any value reaches the top element after
//! at most one change and the fixed point is reached after a bounded number of visits.

use std::fmt::Debug;

use crate::Result;

/// A join semi-lattice with a fallible join (least upper bound) operation.
///
/// The join must satisfy, for all elements that can be joined at all:
///
/// - **Idempotent**: `x.join(x) = x`
/// - **Commutative**: `x.join(y) = y.join(x)`
/// - **Associative**: `x.join(y.join(z)) = (x.join(y)).join(z)`
/// - **Absorbing top**: `x.join(top) = top`
///
/// Joining elements that do not belong to the same component of the lattice (for example
/// values of different slot widths) is an error rather than a silent widening.
pub trait JoinSemiLattice: Clone + Debug + PartialEq {
    /// Computes the join of two lattice elements.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SizeMismatch`] if the two elements cannot be joined.
    fn join(&self, other: &Self) -> Result<Self>;

    /// Returns `true` if this is the top element ("value unknown").
    fn is_top(&self) -> bool;
}
