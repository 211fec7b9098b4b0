//! Truncated differential analysis of GF(2) diffusion layers.
//!
//! Given a square linear map over GF(2) partitioned into `T` branches of `M`
//! bits, this crate computes the exact probability of every branch-activity
//! transition (input mask -> output mask) and searches for multi-round trails
//! and correlation hulls that beat the generic random-permutation baseline.
//!
//! The pipeline: expand the base matrix to parallel branches, compute one
//! GF(2) rank per mask pair (the loose transition counts), invert the subset
//! sums to exact counts, normalize to a transition table, then run the
//! dynamic-programming trail search or the matrix-power hull search on top.
//! All probabilities are exact big-integer rationals; floating point only
//! appears in the final base-2 logarithms for reporting.
//!
//! # Modules
//!
//! - [`gf2`] - packed GF(2) matrices: parse, rank, inverse, expansion, block submatrices
//! - [`mask`] - branch-activity masks and the exact-weight cardinality recurrence
//! - [`transitions`] - loose rank table, Möbius inversion, [`TransitionTable`]
//! - [`trails`] - best-trail dynamic programming search
//! - [`hulls`] - hull search by transition-matrix powers
//! - [`cache`] - JSON persistence of computed tables

pub mod cache;
pub mod gf2;
pub mod hulls;
pub mod mask;
pub mod trails;
pub mod transitions;

pub use gf2::Gf2Matrix;
pub use hulls::{HullFinding, HullSearch};
pub use mask::Mask;
pub use trails::{TrailFinding, TrailSearch};
pub use transitions::{log2_frac, TransitionTable};

/// Errors reported before or around the core computation. Internal
/// consistency violations (counts out of range, probability vectors not
/// summing to 1) are asserts, not variants: they signal a defect and halt.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("matrix is not square: {rows} x {cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix dimension {n} is not divisible by branch size {m}")]
    BranchSize { n: usize, m: usize },

    #[error("{t} branches exceed the supported maximum of 32")]
    TooManyBranches { t: usize },

    #[error("matrix is singular over GF(2)")]
    Singular,

    #[error("failed to parse matrix: {0}")]
    Parse(String),

    #[error("invalid transition table: {0}")]
    InvalidTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
