//! The truncated transition table.
//!
//! For every ordered pair of activity masks the table holds the exact
//! probability that a difference supported on exactly the input mask's
//! branches maps to a difference supported on exactly the output mask's
//! branches. Built in three steps:
//!
//! 1. *Loose counts*: for each pair, the rank of the submatrix selecting the
//!    active input columns and the *inactive* output rows gives
//!    `2^(weight(in)*M - rank)` inputs whose image avoids the inactive output
//!    branches. This overcounts both coordinates (subset rather than exact
//!    support).
//! 2. *Möbius inversion*: an in-place subset transform over the combined
//!    (input, output) mask lattice turns the loose counts into exact ones.
//! 3. *Normalization*: divide by the number of differences with full support
//!    on the input mask, giving probabilities that sum to 1 per input.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rayon::prelude::*;

use crate::gf2::Gf2Matrix;
use crate::mask::{mask_cardinalities, Mask};
use crate::AnalysisError;

/// Loose transition counts for all `2^T x 2^T` mask pairs, flattened as
/// `input_index * 2^T + output_index`. Each entry needs one independent rank
/// computation, so the input masks are spread across threads.
fn loose_counts(mat: &Gf2Matrix, t: usize, m: usize) -> Vec<BigInt> {
    let inputs: Vec<Mask> = Mask::all(t).collect();
    let per_input: Vec<Vec<BigInt>> = inputs
        .par_iter()
        .map(|input| {
            let active = input.active();
            let dim = input.weight() * m;
            Mask::all(t)
                .map(|output| {
                    let sub = mat.block_submatrix(&output.inactive(), &active);
                    let rank = sub.rank();
                    BigInt::one() << (dim - rank)
                })
                .collect()
        })
        .collect();
    per_input.into_iter().flatten().collect()
}

/// In-place subset Möbius transform: on return, `tab[s]` holds the
/// alternating sum over subsets of `s` of the original values, which inverts
/// a subset (zeta) sum. The table length must be a power of two; a singleton
/// table is left unchanged.
pub(crate) fn subset_moebius(tab: &mut [BigInt]) {
    let n = tab.len();
    assert!(n.is_power_of_two(), "table length {} is not a power of two", n);
    let mut bit = 1;
    while bit < n {
        for i in 0..n {
            if i & bit != 0 {
                let lower = tab[i ^ bit].clone();
                tab[i] -= lower;
            }
        }
        bit <<= 1;
    }
}

/// Exact truncated transition probabilities for a `T*M x T*M` matrix.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    branches: usize,
    branch_size: usize,
    cards: Vec<BigUint>,
    /// Sparse rows indexed by input mask: `(output index, probability)`,
    /// sorted by output index, zero entries omitted.
    rows: Vec<Vec<(usize, BigRational)>>,
}

impl TransitionTable {
    /// Compute the table for `mat` with branch width `branch_size`.
    ///
    /// Rejects non-square matrices and dimensions not divisible by the branch
    /// width before any computation starts. Exact counts falling outside
    /// `[0, card(weight(in))]`, or a row not summing to 1, indicate a defect
    /// in the rank or inversion logic and abort via assert.
    pub fn compute(mat: &Gf2Matrix, branch_size: usize) -> Result<Self, AnalysisError> {
        if mat.nrows() != mat.ncols() {
            return Err(AnalysisError::NotSquare {
                rows: mat.nrows(),
                cols: mat.ncols(),
            });
        }
        if branch_size == 0 || mat.nrows() % branch_size != 0 {
            return Err(AnalysisError::BranchSize {
                n: mat.nrows(),
                m: branch_size,
            });
        }
        let t = mat.nrows() / branch_size;
        if t > 32 {
            return Err(AnalysisError::TooManyBranches { t });
        }

        log::info!(
            "computing transitions of {} x {} matrix ({} branches of {} bits)",
            mat.nrows(),
            mat.ncols(),
            t,
            branch_size
        );

        log::info!("ranks of submatrices ({} mask pairs)", 1usize << (2 * t));
        let mut counts = loose_counts(mat, t, branch_size);

        log::info!("inverting subset sums");
        subset_moebius(&mut counts);

        let cards = mask_cardinalities(t, branch_size);
        let size = 1usize << t;
        let mut rows = Vec::with_capacity(size);
        let mut index = 0;
        for input in Mask::all(t) {
            let card = BigInt::from(cards[input.weight()].clone());
            let mut row = Vec::new();
            let mut total = BigInt::zero();
            for output in Mask::all(t) {
                let exact = &counts[index];
                index += 1;
                assert!(
                    !exact.is_negative(),
                    "negative exact count {} for {} -> {}",
                    exact,
                    input,
                    output
                );
                assert!(
                    *exact <= card,
                    "exact count {} for {} -> {} exceeds input cardinality {}",
                    exact,
                    input,
                    output,
                    card
                );
                if exact.is_zero() {
                    continue;
                }
                total += exact;
                log::debug!("count[{}][{}] = {}", input, output, exact);
                row.push((output.index(), BigRational::new(exact.clone(), card.clone())));
            }
            assert_eq!(
                total, card,
                "transition probabilities for input {} do not sum to 1",
                input
            );
            rows.push(row);
        }

        Ok(TransitionTable {
            branches: t,
            branch_size,
            cards,
            rows,
        })
    }

    /// Rebuild a table from sparse probability rows, e.g. a deserialized
    /// cache. Unlike [`compute`](Self::compute), a failed validation is a
    /// recoverable error: the caller can fall back to recomputation.
    pub fn from_rows(
        branches: usize,
        branch_size: usize,
        mut rows: Vec<Vec<(usize, BigRational)>>,
    ) -> Result<Self, AnalysisError> {
        if branches == 0 || branches > 32 || branch_size == 0 {
            return Err(AnalysisError::InvalidTable(format!(
                "bad shape: {} branches of {} bits",
                branches, branch_size
            )));
        }
        let size = 1usize << branches;
        if rows.len() != size {
            return Err(AnalysisError::InvalidTable(format!(
                "{} rows for {} masks",
                rows.len(),
                size
            )));
        }
        for (input, row) in rows.iter_mut().enumerate() {
            row.sort_by_key(|(output, _)| *output);
            let mut sum = BigRational::zero();
            let mut last: Option<usize> = None;
            for (output, prob) in row.iter() {
                if *output >= size {
                    return Err(AnalysisError::InvalidTable(format!(
                        "output index {} out of range for input {}",
                        output, input
                    )));
                }
                if last == Some(*output) {
                    return Err(AnalysisError::InvalidTable(format!(
                        "duplicate entry {} -> {}",
                        input, output
                    )));
                }
                last = Some(*output);
                if !prob.is_positive() || *prob > BigRational::one() {
                    return Err(AnalysisError::InvalidTable(format!(
                        "probability {} for {} -> {} outside (0, 1]",
                        prob, input, output
                    )));
                }
                sum += prob;
            }
            if !sum.is_one() {
                return Err(AnalysisError::InvalidTable(format!(
                    "probabilities for input {} sum to {}, not 1",
                    input, sum
                )));
            }
        }
        let cards = mask_cardinalities(branches, branch_size);
        Ok(TransitionTable {
            branches,
            branch_size,
            cards,
            rows,
        })
    }

    /// Number of branches `T`.
    pub fn branches(&self) -> usize {
        self.branches
    }

    /// Branch width `M` in bits.
    pub fn branch_size(&self) -> usize {
        self.branch_size
    }

    /// Number of truncated differences with exactly `weight` active branches.
    pub fn cardinality(&self, weight: usize) -> &BigUint {
        &self.cards[weight]
    }

    /// Probability of `input -> output`, if nonzero.
    pub fn prob(&self, input: Mask, output: Mask) -> Option<&BigRational> {
        let row = &self.rows[input.index()];
        row.binary_search_by_key(&output.index(), |(o, _)| *o)
            .ok()
            .map(|i| &row[i].1)
    }

    /// The nonzero transitions out of `input`, in output-index order.
    pub fn transitions_from(&self, input: Mask) -> impl Iterator<Item = (Mask, &BigRational)> {
        let t = self.branches;
        self.rows[input.index()]
            .iter()
            .map(move |(output, prob)| (Mask::from_index(*output, t), prob))
    }

    /// All nonzero entries as `(input index, output index, probability)`.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize, &BigRational)> {
        self.rows
            .iter()
            .enumerate()
            .flat_map(|(input, row)| row.iter().map(move |(output, prob)| (input, *output, prob)))
    }

    /// Probability that a uniformly random permutation of the same block
    /// structure maps a nonzero difference to the given output weight class:
    /// `card(weight) / (2^(T*M) - 1)`. Weight 0 gets 0 (the zero difference
    /// is unreachable from a nonzero input under a permutation).
    pub fn generic_prob(&self, weight: usize) -> BigRational {
        if weight == 0 {
            return BigRational::zero();
        }
        let total = (BigInt::one() << (self.branches * self.branch_size)) - BigInt::one();
        BigRational::new(BigInt::from(self.cards[weight].clone()), total)
    }

    /// Dense `2^T x 2^T` view: entry `[output][input]` is the transition
    /// probability, so a probability column vector evolves by one round per
    /// left-multiplication.
    pub fn as_matrix(&self) -> Vec<Vec<BigRational>> {
        let size = 1usize << self.branches;
        let mut m = vec![vec![BigRational::zero(); size]; size];
        for (input, output, prob) in self.entries() {
            m[output][input] = prob.clone();
        }
        m
    }
}

/// Base-2 logarithm of a non-negative rational, for reporting. Scales
/// numerator and denominator by their bit lengths first, so values far
/// outside f64 range (counts reach `2^(T*M)`) stay accurate.
pub fn log2_frac(r: &BigRational) -> f64 {
    if r.numer().is_zero() {
        return f64::NEG_INFINITY;
    }
    fn log2_bigint(n: &BigInt) -> f64 {
        let shift = n.bits().saturating_sub(53) as usize;
        let top = (n >> shift).to_f64().unwrap_or(f64::MAX);
        top.log2() + shift as f64
    }
    log2_bigint(r.numer()) - log2_bigint(r.denom())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Subset (zeta) sum, the transform `subset_moebius` inverts.
    fn subset_zeta(tab: &mut [BigInt]) {
        let n = tab.len();
        let mut bit = 1;
        while bit < n {
            for i in 0..n {
                if i & bit != 0 {
                    let lower = tab[i ^ bit].clone();
                    tab[i] += lower;
                }
            }
            bit <<= 1;
        }
    }

    #[test]
    fn test_moebius_singleton_is_identity() {
        let mut tab = vec![BigInt::from(7)];
        subset_moebius(&mut tab);
        assert_eq!(tab, vec![BigInt::from(7)]);
    }

    #[test]
    fn test_moebius_two_entries() {
        // loose[1] = exact[0] + exact[1]
        let mut tab = vec![BigInt::from(1), BigInt::from(3)];
        subset_moebius(&mut tab);
        assert_eq!(tab, vec![BigInt::from(1), BigInt::from(2)]);
    }

    #[test]
    fn test_moebius_inverts_zeta() {
        let original: Vec<BigInt> = (0..16).map(|i| BigInt::from((i * 31 + 7) % 13)).collect();
        let mut tab = original.clone();
        subset_zeta(&mut tab);
        subset_moebius(&mut tab);
        assert_eq!(tab, original);
    }

    #[test]
    fn test_identity_matrix_preserves_masks() {
        // Identity map: a difference's activity pattern is unchanged, so
        // every exact count for in == out equals the full input cardinality.
        for (t, m) in [(2usize, 1usize), (3, 2)] {
            let table = TransitionTable::compute(&Gf2Matrix::identity(t * m), m).unwrap();
            for input in Mask::all(t) {
                for output in Mask::all(t) {
                    let prob = table.prob(input, output);
                    if input == output {
                        assert_eq!(prob, Some(&BigRational::one()), "{} -> {}", input, output);
                    } else {
                        assert_eq!(prob, None, "{} -> {}", input, output);
                    }
                }
            }
        }
    }

    #[test]
    fn test_triangular_matrix_t2_m1() {
        // [[1,1],[0,1]]: column 0 = (1,0), column 1 = (1,1).
        let mat = Gf2Matrix::parse("11\n01").unwrap();
        let table = TransitionTable::compute(&mat, 1).unwrap();

        let m = |i| Mask::from_index(i, 2);
        // Input (1,0): only column 0 in play, image stays on branch 0.
        assert_eq!(table.prob(m(0b10), m(0b10)), Some(&BigRational::one()));
        // Input (0,1): image = column 1 = (1,1), both branches active.
        assert_eq!(table.prob(m(0b01), m(0b11)), Some(&BigRational::one()));
        // Input (1,1): the single difference (1,1) maps to (0,1).
        assert_eq!(table.prob(m(0b11), m(0b01)), Some(&BigRational::one()));
        assert_eq!(table.prob(m(0b01), m(0b01)), None);
        assert_eq!(table.prob(m(0b11), m(0b11)), None);
    }

    #[test]
    fn test_rows_sum_to_one() {
        let mat = Gf2Matrix::parse("110\n011\n111").unwrap();
        let table = TransitionTable::compute(&mat, 1).unwrap();
        for input in Mask::all(3) {
            let sum: BigRational = table
                .transitions_from(input)
                .map(|(_, p)| p.clone())
                .sum();
            assert!(sum.is_one(), "input {} sums to {}", input, sum);
        }
    }

    #[test]
    fn test_precondition_errors() {
        let mat = Gf2Matrix::zero(4, 6);
        assert!(matches!(
            TransitionTable::compute(&mat, 2),
            Err(AnalysisError::NotSquare { .. })
        ));
        let mat = Gf2Matrix::identity(6);
        assert!(matches!(
            TransitionTable::compute(&mat, 4),
            Err(AnalysisError::BranchSize { .. })
        ));
    }

    #[test]
    fn test_generic_prob() {
        let table = TransitionTable::compute(&Gf2Matrix::identity(4), 2).unwrap();
        // T = 2, M = 2: card = [1, 3, 9], space size 2^4 - 1 = 15.
        assert_eq!(table.generic_prob(0), BigRational::zero());
        assert_eq!(
            table.generic_prob(1),
            BigRational::new(BigInt::from(3), BigInt::from(15))
        );
        assert_eq!(
            table.generic_prob(2),
            BigRational::new(BigInt::from(9), BigInt::from(15))
        );
    }

    #[test]
    fn test_from_rows_rejects_bad_sums() {
        let table = TransitionTable::compute(&Gf2Matrix::identity(2), 1).unwrap();
        let mut rows: Vec<Vec<(usize, BigRational)>> = vec![Vec::new(); 4];
        for (input, output, prob) in table.entries() {
            rows[input].push((output, prob.clone()));
        }
        assert!(TransitionTable::from_rows(2, 1, rows.clone()).is_ok());

        rows[1].clear();
        assert!(matches!(
            TransitionTable::from_rows(2, 1, rows),
            Err(AnalysisError::InvalidTable(_))
        ));
    }

    #[test]
    fn test_log2_frac() {
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        assert!((log2_frac(&half) + 1.0).abs() < 1e-12);
        let huge = BigRational::new(BigInt::from(1), BigInt::one() << 512);
        assert!((log2_frac(&huge) + 512.0).abs() < 1e-9);
        assert_eq!(log2_frac(&BigRational::zero()), f64::NEG_INFINITY);
    }
}
