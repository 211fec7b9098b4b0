//! Best truncated trail search.
//!
//! Round-by-round dynamic programming over the transition table: for every
//! reachable mask keep the highest-probability trail reaching it, and extend
//! all survivors by one round at a time. A candidate survives only if it
//! strictly beats the generic baseline for its output weight, so the search
//! reaches a fixed point (and the stream ends) as soon as no mask anywhere
//! retains a distinguishing advantage.

use num_rational::BigRational;
use num_traits::One;

use crate::mask::Mask;
use crate::transitions::TransitionTable;

/// One trail surviving a round of the search.
#[derive(Debug, Clone)]
pub struct TrailFinding {
    /// Number of rounds covered by the trail.
    pub rounds: usize,
    /// Probability of the trail (product of per-step probabilities).
    pub prob: BigRational,
    /// Generic baseline for the trail's final mask weight.
    pub generic: BigRational,
    /// The masks traversed, `rounds + 1` of them.
    pub trail: Vec<Mask>,
}

/// Iterator over rounds; each item is the batch of surviving trails for that
/// round, sorted by ascending probability. Ends when no extension beats its
/// baseline.
pub struct TrailSearch<'a> {
    table: &'a TransitionTable,
    generics: Vec<BigRational>,
    best: Vec<Option<(BigRational, Vec<Mask>)>>,
    rounds: usize,
    done: bool,
}

impl<'a> TrailSearch<'a> {
    /// Start from every nonzero mask at probability 1.
    pub fn new(table: &'a TransitionTable) -> Self {
        let t = table.branches();
        let best = Mask::all(t)
            .map(|mask| {
                if mask.is_zero() {
                    None
                } else {
                    Some((BigRational::one(), vec![mask]))
                }
            })
            .collect();
        let generics = (0..=t).map(|w| table.generic_prob(w)).collect();
        TrailSearch {
            table,
            generics,
            best,
            rounds: 0,
            done: false,
        }
    }
}

impl Iterator for TrailSearch<'_> {
    type Item = Vec<TrailFinding>;

    fn next(&mut self) -> Option<Vec<TrailFinding>> {
        if self.done {
            return None;
        }
        self.rounds += 1;
        let t = self.table.branches();
        let size = 1usize << t;

        let mut next: Vec<Option<(BigRational, Vec<Mask>)>> = vec![None; size];
        let mut improved = false;
        for index in 0..size {
            let Some((prob, trail)) = &self.best[index] else {
                continue;
            };
            let input = Mask::from_index(index, t);
            for (output, step) in self.table.transitions_from(input) {
                let candidate = prob * step;
                if candidate <= self.generics[output.weight()] {
                    continue;
                }
                improved = true;
                // Strict improvement only: ties keep the first trail found.
                let slot = &mut next[output.index()];
                let replace = match slot {
                    Some((held, _)) => candidate > *held,
                    None => true,
                };
                if replace {
                    let mut extended = trail.clone();
                    extended.push(output);
                    *slot = Some((candidate, extended));
                }
            }
        }

        if !improved {
            self.done = true;
            return None;
        }
        self.best = next;

        let mut batch: Vec<TrailFinding> = self
            .best
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|(prob, trail)| TrailFinding {
                    rounds: self.rounds,
                    prob: prob.clone(),
                    generic: self.generics[Mask::from_index(index, t).weight()].clone(),
                    trail: trail.clone(),
                })
            })
            .collect();
        batch.sort_by(|a, b| a.prob.cmp(&b.prob));
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gf2::Gf2Matrix;

    #[test]
    fn test_single_branch_identity_has_no_distinguisher() {
        // With one branch the only transition is full -> full at probability
        // 1, which equals (does not exceed) the generic baseline of 1, so
        // the search ends before yielding anything.
        for m in [1usize, 3] {
            let table = TransitionTable::compute(&Gf2Matrix::identity(m), m).unwrap();
            let mut search = TrailSearch::new(&table);
            assert!(search.next().is_none());
            assert!(search.next().is_none(), "stream stays exhausted");
        }
    }

    #[test]
    fn test_identity_keeps_perfect_trails() {
        // Two branches: every activity pattern is held with probability 1,
        // which beats its generic baseline every round.
        let table = TransitionTable::compute(&Gf2Matrix::identity(2), 1).unwrap();
        let mut search = TrailSearch::new(&table);
        for round in 1..=3 {
            let batch = search.next().expect("identity trails never die out");
            assert_eq!(batch.len(), 3, "three nonzero masks survive");
            for finding in &batch {
                assert_eq!(finding.rounds, round);
                assert!(finding.prob.is_one());
                assert!(finding.prob > finding.generic);
                assert_eq!(finding.trail.len(), round + 1);
                // The identity map never changes the mask along a trail.
                assert!(finding.trail.windows(2).all(|w| w[0] == w[1]));
            }
        }
    }

    #[test]
    fn test_triangular_trail_routes() {
        let mat = Gf2Matrix::parse("11\n01").unwrap();
        let table = TransitionTable::compute(&mat, 1).unwrap();
        let batch = TrailSearch::new(&table).next().unwrap();

        // Round 1 survivors: (1,0)->(1,0), (0,1)->(1,1), (1,1)->(0,1),
        // all probability 1.
        assert_eq!(batch.len(), 3);
        for finding in &batch {
            assert!(finding.prob.is_one());
        }
        let trails: Vec<Vec<usize>> = batch
            .iter()
            .map(|f| f.trail.iter().map(|m| m.index()).collect())
            .collect();
        assert!(trails.contains(&vec![0b10, 0b10]));
        assert!(trails.contains(&vec![0b01, 0b11]));
        assert!(trails.contains(&vec![0b11, 0b01]));
    }

    #[test]
    fn test_batches_sorted_ascending() {
        let mat = Gf2Matrix::parse("110\n011\n111").unwrap();
        let table = TransitionTable::compute(&mat, 1).unwrap();
        for batch in TrailSearch::new(&table).take(4) {
            for pair in batch.windows(2) {
                assert!(pair[0].prob <= pair[1].prob);
            }
        }
    }
}
