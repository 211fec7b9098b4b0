//! Branch-activity masks and their counting.
//!
//! A mask marks which of the `T` branches of the state carry a nonzero
//! difference. Branch 0 maps to the most significant bit of the integer
//! encoding, so a mask's index equals the binary value of its printed bit
//! string and matches the ordering of the transition matrix.

use std::fmt;

use num_bigint::BigUint;
use num_integer::binomial;
use num_traits::One;

/// Activity pattern over `T` branches, encoded as an integer in `0..2^T`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mask {
    bits: u32,
    branches: usize,
}

impl Mask {
    /// Mask from its integer index. Branch `i` is active iff bit
    /// `branches - 1 - i` of `index` is set.
    pub fn from_index(index: usize, branches: usize) -> Self {
        assert!(branches <= 32, "at most 32 branches supported");
        assert!(index < 1usize << branches, "mask index out of range");
        Mask {
            bits: index as u32,
            branches,
        }
    }

    /// Mask from per-branch activity flags, branch 0 first.
    pub fn from_branches(active: &[bool]) -> Self {
        let mut bits = 0u32;
        for &a in active {
            bits = (bits << 1) | a as u32;
        }
        Mask {
            bits,
            branches: active.len(),
        }
    }

    /// Integer encoding; also the row/column index in the table views.
    pub fn index(&self) -> usize {
        self.bits as usize
    }

    /// Number of branches `T`.
    pub fn branches(&self) -> usize {
        self.branches
    }

    /// Number of active branches.
    pub fn weight(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn is_zero(&self) -> bool {
        self.bits == 0
    }

    pub fn branch_active(&self, i: usize) -> bool {
        (self.bits >> (self.branches - 1 - i)) & 1 == 1
    }

    /// Per-branch activity flags, branch 0 first.
    pub fn active(&self) -> Vec<bool> {
        (0..self.branches).map(|i| self.branch_active(i)).collect()
    }

    /// Complemented activity flags: true for the branches the mask leaves
    /// inactive.
    pub fn inactive(&self) -> Vec<bool> {
        (0..self.branches).map(|i| !self.branch_active(i)).collect()
    }

    /// All `2^T` masks in index order.
    pub fn all(branches: usize) -> impl Iterator<Item = Mask> {
        (0..1usize << branches).map(move |i| Mask::from_index(i, branches))
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.branches {
            write!(f, "{}", self.branch_active(i) as u8)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mask({})", self)
    }
}

/// Number of truncated differences with *all* of `j` active branches nonzero,
/// for every `j` in `0..=branches`.
///
/// Starts from the `2^(j*M)` patterns on `j` branches and subtracts the
/// lower-weight contributions: `card[j] -= card[i] * C(j, i)` for `i < j`.
pub fn mask_cardinalities(branches: usize, branch_size: usize) -> Vec<BigUint> {
    let mut card: Vec<BigUint> = (0..=branches)
        .map(|j| BigUint::one() << (j * branch_size))
        .collect();
    for i in 0..=branches {
        for j in (i + 1)..=branches {
            let excess = &card[i] * binomial(BigUint::from(j), BigUint::from(i));
            card[j] -= excess;
        }
    }
    card
}
