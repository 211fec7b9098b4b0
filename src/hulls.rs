//! Best truncated hull search.
//!
//! A hull aggregates every trail between a fixed pair of masks. Because the
//! transition table is a stochastic matrix over mask space, the aggregate
//! after `r` rounds is simply the `r`-th matrix power: either evolve a
//! one-hot probability vector for a single input mask, or raise the full
//! matrix and read off columns for all inputs at once. The stream is
//! unbounded; callers cut it off with a round limit.

use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::mask::Mask;
use crate::transitions::TransitionTable;

/// One mask pair exceeding the generic baseline after some rounds.
#[derive(Debug, Clone)]
pub struct HullFinding {
    pub rounds: usize,
    /// Aggregate probability over all trails from `input` to `output`.
    pub prob: BigRational,
    /// Generic baseline for the output mask's weight.
    pub generic: BigRational,
    pub input: Mask,
    pub output: Mask,
}

enum State {
    /// Probability distribution over output masks for one fixed input.
    Single { input: Mask, dist: Vec<BigRational> },
    /// Running matrix power; column `i` is the distribution for input `i`.
    All { power: Vec<Vec<BigRational>> },
}

/// Iterator over rounds; each item is the batch of hull entries beating the
/// generic baseline that round (possibly empty), the zero input mask skipped,
/// sorted by ascending probability within each input.
pub struct HullSearch {
    branches: usize,
    base: Vec<Vec<BigRational>>,
    generics: Vec<BigRational>,
    state: State,
    rounds: usize,
}

impl HullSearch {
    /// Track the full output distribution of a single input mask.
    pub fn from_input(table: &TransitionTable, input: Mask) -> Self {
        assert_eq!(input.branches(), table.branches(), "mask width mismatch");
        let size = 1usize << table.branches();
        let mut dist = vec![BigRational::zero(); size];
        dist[input.index()] = BigRational::one();
        HullSearch {
            branches: table.branches(),
            base: table.as_matrix(),
            generics: (0..=table.branches())
                .map(|w| table.generic_prob(w))
                .collect(),
            state: State::Single { input, dist },
            rounds: 0,
        }
    }

    /// Track every input mask simultaneously via the running matrix power.
    /// Each round costs one multiplication by the base table, trading
    /// repeated work for bounded memory.
    pub fn all_inputs(table: &TransitionTable) -> Self {
        let size = 1usize << table.branches();
        let mut power = vec![vec![BigRational::zero(); size]; size];
        for (i, row) in power.iter_mut().enumerate() {
            row[i] = BigRational::one();
        }
        HullSearch {
            branches: table.branches(),
            base: table.as_matrix(),
            generics: (0..=table.branches())
                .map(|w| table.generic_prob(w))
                .collect(),
            state: State::All { power },
            rounds: 0,
        }
    }

    /// Entries of `dist` beating the baseline, ascending by probability.
    fn findings(&self, input: Mask, dist: &[BigRational]) -> Vec<HullFinding> {
        let mut order: Vec<usize> = (0..dist.len()).collect();
        order.sort_by(|&a, &b| dist[a].cmp(&dist[b]));
        order
            .into_iter()
            .filter_map(|index| {
                let output = Mask::from_index(index, self.branches);
                let generic = &self.generics[output.weight()];
                if dist[index] > *generic {
                    Some(HullFinding {
                        rounds: self.rounds,
                        prob: dist[index].clone(),
                        generic: generic.clone(),
                        input,
                        output,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

impl Iterator for HullSearch {
    type Item = Vec<HullFinding>;

    fn next(&mut self) -> Option<Vec<HullFinding>> {
        self.rounds += 1;
        match &mut self.state {
            State::Single { input, dist } => {
                let next = mat_vec(&self.base, dist);
                *dist = next;
                let total: BigRational = dist.iter().sum();
                assert!(
                    total.is_one(),
                    "hull distribution for input {} sums to {} after round {}",
                    input,
                    total,
                    self.rounds
                );
                let (input, dist) = (*input, dist.clone());
                Some(self.findings(input, &dist))
            }
            State::All { power } => {
                let next = mat_mul(&*power, &self.base);
                *power = next;
                let power = power.clone();
                let size = power.len();
                let mut batch = Vec::new();
                for index in 0..size {
                    let input = Mask::from_index(index, self.branches);
                    let column: Vec<BigRational> =
                        (0..size).map(|out| power[out][index].clone()).collect();
                    let total: BigRational = column.iter().sum();
                    assert!(
                        total.is_one(),
                        "hull distribution for input {} sums to {} after round {}",
                        input,
                        total,
                        self.rounds
                    );
                    if input.is_zero() {
                        continue;
                    }
                    batch.extend(self.findings(input, &column));
                }
                Some(batch)
            }
        }
    }
}

fn mat_vec(m: &[Vec<BigRational>], v: &[BigRational]) -> Vec<BigRational> {
    m.iter()
        .map(|row| {
            let mut acc = BigRational::zero();
            for (a, b) in row.iter().zip(v) {
                if !a.is_zero() && !b.is_zero() {
                    acc += a * b;
                }
            }
            acc
        })
        .collect()
}

fn mat_mul(a: &[Vec<BigRational>], b: &[Vec<BigRational>]) -> Vec<Vec<BigRational>> {
    let n = a.len();
    let mut out = vec![vec![BigRational::zero(); n]; n];
    for i in 0..n {
        for (k, pivot) in a[i].iter().enumerate() {
            if pivot.is_zero() {
                continue;
            }
            for j in 0..n {
                if !b[k][j].is_zero() {
                    out[i][j] += pivot * &b[k][j];
                }
            }
        }
    }
    out
}
