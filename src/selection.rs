//! Primary alignment selection from candidate scores
//!

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SelectionPolicy {
    /// Minimum score advantage over the current primary for a deterministic change
    pub prim_margin_score: f64,

    /// Candidates scoring within this margin of the best candidate are selected at random when no
    /// deterministic change is made
    pub prim_margin_random: f64,

    /// The selected candidate must score at least this value
    pub min_score: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectionDecision {
    NoChange,

    /// The selected index may be the current primary when the selection is randomized
    Selected { index: usize, randomized: bool },
}

/// Index of the highest score, ties are resolved to the first occurrence
///
pub fn get_max_score_index(scores: &[f64]) -> usize {
    let mut max_index = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[max_index] {
            max_index = index;
        }
    }
    max_index
}

impl SelectionPolicy {
    /// Select the primary candidate given the score of each candidate and the current primary
    /// index
    ///
    /// `rng` is only used for selections among near-tied candidates.
    ///
    pub fn select<R: Rng>(&self, scores: &[f64], primary_index: usize, rng: &mut R) -> SelectionDecision {
        assert!(primary_index < scores.len());

        let best_index = get_max_score_index(scores);
        let best_score = scores[best_index];
        let score_diff = best_score - scores[primary_index];

        if best_score < self.min_score {
            return SelectionDecision::NoChange;
        }

        if best_index != primary_index && score_diff >= self.prim_margin_score {
            SelectionDecision::Selected {
                index: best_index,
                randomized: false,
            }
        } else if score_diff.abs() <= self.prim_margin_random {
            let band = scores
                .iter()
                .enumerate()
                .filter(|(_, score)| best_score - *score <= self.prim_margin_random)
                .map(|(index, _)| index)
                .collect::<Vec<_>>();
            let index = band[rng.gen_range(0..band.len())];
            SelectionDecision::Selected {
                index,
                randomized: true,
            }
        } else {
            SelectionDecision::NoChange
        }
    }
}
