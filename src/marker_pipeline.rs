//! Score alignment candidates by consistency at marker positions
//!

use log::debug;

use crate::alignment::AlignmentCandidate;
use crate::baq::apply_baq;
use crate::cli::PipelineConfig;
use crate::confident_blocks::{RefinementOutcome, refine_confident_blocks, set_confident_blocks};
use crate::markers::{
    discover_markers, fill_marker_observations, remove_insertion_markers, remove_low_quality_markers,
    remove_uninformative_markers, score_markers,
};

#[derive(Clone, Debug, PartialEq)]
pub enum MarkerOutcome {
    /// Candidate scores are set from the given number of markers
    Scored {
        marker_count: usize,
        refinement: Option<RefinementOutcome>,
    },

    /// No discriminating marker was found
    NoMarkers,

    /// All markers were removed by the base quality filter
    NoQualifiedMarkers,
}

/// Run marker discovery, filtering and scoring for one alignment group
///
/// Candidate scores are only meaningful when the outcome is `Scored`.
///
pub fn score_by_markers(candidates: &mut [AlignmentCandidate], config: &PipelineConfig) -> MarkerOutcome {
    for candidate in candidates.iter_mut() {
        candidate.reset_scoring_state();
    }

    let mut markers = discover_markers(candidates);
    remove_uninformative_markers(&mut markers);
    fill_marker_observations(candidates, &mut markers);
    remove_insertion_markers(&mut markers);
    if markers.is_empty() {
        return MarkerOutcome::NoMarkers;
    }

    let marker_positions = markers.iter().map(|x| x.read_pos).collect::<Vec<_>>();

    set_confident_blocks(candidates, config.indel_threshold);
    let refinement = if config.consensus {
        Some(refine_confident_blocks(
            candidates,
            &marker_positions,
            &config.refinement_params(),
        ))
    } else {
        None
    };

    if let Some(baq_params) = config.baq_params() {
        for candidate in candidates.iter_mut() {
            apply_baq(candidate, &marker_positions, &baq_params);
        }
    }

    remove_low_quality_markers(candidates, &mut markers, config.min_q);
    if markers.is_empty() {
        return MarkerOutcome::NoQualifiedMarkers;
    }

    score_markers(candidates, &markers);
    for candidate in candidates.iter_mut() {
        candidate.rfe = candidate.conf_blocks.iter().map(|x| x.ref_range.end).max();
    }

    debug!(
        "Scored {} markers, refinement: {refinement:?}",
        markers.len()
    );

    MarkerOutcome::Scored {
        marker_count: markers.len(),
        refinement,
    }
}
