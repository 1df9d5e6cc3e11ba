//! Confident blocks are alignment regions free of large indels, where alignment-based evidence
//! such as markers and recalibrated base qualities can be trusted.
//!

use log::debug;
use rust_htslib::bam::record::Cigar;

use crate::alignment::AlignmentCandidate;
use crate::cigar_utils::cigar_segments;
use crate::int_range::{IntRange, get_overlap_range, get_total_range_size, merge_ranges};
use crate::read_to_ref_map::get_ref_range_for_read_range;

/// A confident region of one alignment, as a read interval and the reference interval it aligns to
///
#[derive(Clone, Debug, PartialEq)]
pub struct ConfidentBlock {
    /// Forward read coordinates
    pub read_range: IntRange,

    pub ref_range: IntRange,
}

/// Find the maximal aligned runs of a candidate not interrupted by an insertion or deletion of at
/// least `indel_threshold` bases
///
/// Smaller indels are included within a block. Reference skips always split blocks.
///
pub fn get_confident_blocks(candidate: &AlignmentCandidate, indel_threshold: u32) -> Vec<ConfidentBlock> {
    use Cigar::*;

    let mut blocks = Vec::new();

    // Alignment read range and reference range of the current block
    let mut block: Option<(IntRange, IntRange)> = None;

    let mut close_block = |block: &mut Option<(IntRange, IntRange)>| {
        if let Some((aln_range, ref_range)) = block.take() {
            blocks.push(ConfidentBlock {
                read_range: candidate.fwd_read_range(&aln_range),
                ref_range,
            });
        }
    };

    for segment in cigar_segments(&candidate.cigar, candidate.ref_start) {
        match segment.op {
            Match(_) | Equal(_) | Diff(_) => {
                let read_end = (segment.read_pos + segment.read_len()) as i64;
                let ref_end = segment.ref_pos + segment.ref_len();
                match block.as_mut() {
                    Some((aln_range, ref_range)) => {
                        aln_range.end = read_end;
                        ref_range.end = ref_end;
                    }
                    None => {
                        block = Some((
                            IntRange::from_pair(segment.read_pos as i64, read_end),
                            IntRange::from_pair(segment.ref_pos, ref_end),
                        ));
                    }
                }
            }
            Ins(len) | Del(len) => {
                if len >= indel_threshold {
                    close_block(&mut block);
                }
            }
            RefSkip(_) => close_block(&mut block),
            _ => {}
        }
    }
    close_block(&mut block);

    blocks
}

/// Set every candidate's confident blocks from its own alignment
///
pub fn set_confident_blocks(candidates: &mut [AlignmentCandidate], indel_threshold: u32) {
    for candidate in candidates.iter_mut() {
        candidate.conf_blocks = get_confident_blocks(candidate, indel_threshold);
    }
}

/// Get the flanking blocks of a candidate: forward read windows extending `flank_margin` on each
/// side of every marker, clipped to the aligned portion of the read and merged
///
pub fn get_flanking_blocks(
    candidate: &AlignmentCandidate,
    marker_positions: &[usize],
    flank_margin: i64,
) -> Vec<IntRange> {
    let aligned_range = candidate.aligned_fwd_read_range();
    let flanks = marker_positions
        .iter()
        .map(|&pos| IntRange::from_pair(pos as i64 - flank_margin, pos as i64 + flank_margin + 1))
        .filter_map(|x| get_overlap_range(&x, &aligned_range))
        .collect::<Vec<_>>();
    merge_ranges(flanks)
}

/// Restrict the candidate's current confident blocks to the given flanking blocks
///
pub fn get_flank_restricted_blocks(
    candidate: &AlignmentCandidate,
    flanking_blocks: &[IntRange],
) -> Vec<ConfidentBlock> {
    let mut blocks = Vec::new();
    for conf_block in candidate.conf_blocks.iter() {
        for flank in flanking_blocks.iter() {
            let Some(read_range) = get_overlap_range(&conf_block.read_range, flank) else {
                continue;
            };
            let aln_range = candidate.aln_range(&read_range);
            if let Some(ref_range) = get_ref_range_for_read_range(&candidate.read_to_ref, &aln_range) {
                blocks.push(ConfidentBlock {
                    read_range,
                    ref_range,
                });
            }
        }
    }
    blocks.sort_by_key(|x| x.ref_range);
    blocks
}

/// Total reference length of the candidate's confident blocks
///
fn get_confident_length(candidate: &AlignmentCandidate) -> i64 {
    let ref_ranges = candidate.conf_blocks.iter().map(|x| x.ref_range).collect();
    get_total_range_size(&merge_ranges(ref_ranges))
}

/// Parameters of the confident block refinement loop
///
#[derive(Clone, Debug)]
pub struct RefinementParams {
    pub initial_flank_margin: f64,

    /// Factor applied to the flank margin after every refinement iteration, must be in (0,1)
    pub shrink_factor: f64,

    /// Groups spanning more reference than this need their confident blocks refined until no
    /// candidate has more confident length than this
    pub span_threshold: i64,

    pub max_iterations: usize,

    /// Refinement stops once the flank margin falls below this value
    pub min_flank_margin: f64,
}

impl RefinementParams {
    pub fn new(span_threshold: i64, max_iterations: usize) -> Self {
        Self {
            initial_flank_margin: 625.0,
            shrink_factor: 0.8,
            span_threshold,
            max_iterations,
            min_flank_margin: 1.0,
        }
    }
}

/// Heuristic to decide whether a group's confident blocks are too broad to be informative
///
/// A group needs refinement when its largest candidate reference span exceeds the span threshold
/// and some candidate's confident blocks still cover more reference than the same threshold,
/// meaning that the confident region has not yet been concentrated around the markers.
///
pub fn needs_refinement(candidates: &[AlignmentCandidate], span_threshold: i64) -> bool {
    let group_span = candidates
        .iter()
        .map(|x| x.get_ref_range().size())
        .max()
        .unwrap_or(0);
    if group_span <= span_threshold {
        return false;
    }
    candidates
        .iter()
        .any(|x| get_confident_length(x) > span_threshold)
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefinementOutcome {
    /// Initial confident blocks were accepted without refinement
    NotNeeded,

    /// Refinement reached blocks satisfying the heuristic
    Converged { iterations: usize },

    /// A refinement iteration yielded no confident blocks, the previous blocks are kept
    Exhausted { iterations: usize },

    /// The iteration cap or minimum flank margin was reached before convergence
    IterationLimit { iterations: usize },
}

enum RefinementState {
    Seeking,
    Refining { flank_margin: f64, iteration: usize },
    Done(RefinementOutcome),
}

/// Iteratively restrict each candidate's confident blocks to shrinking flanks around the markers
///
/// The flank margin shrinks geometrically on every iteration, so the loop terminates within
/// ceil(log(initial/min)/log(1/shrink_factor)) iterations even without the iteration cap.
///
pub fn refine_confident_blocks(
    candidates: &mut [AlignmentCandidate],
    marker_positions: &[usize],
    params: &RefinementParams,
) -> RefinementOutcome {
    assert!(params.shrink_factor > 0.0 && params.shrink_factor < 1.0);

    let mut state = RefinementState::Seeking;
    loop {
        state = match state {
            RefinementState::Seeking => {
                if needs_refinement(candidates, params.span_threshold) {
                    RefinementState::Refining {
                        flank_margin: params.initial_flank_margin,
                        iteration: 0,
                    }
                } else {
                    RefinementState::Done(RefinementOutcome::NotNeeded)
                }
            }
            RefinementState::Refining {
                flank_margin,
                iteration,
            } => {
                if iteration >= params.max_iterations || flank_margin < params.min_flank_margin {
                    RefinementState::Done(RefinementOutcome::IterationLimit {
                        iterations: iteration,
                    })
                } else {
                    let margin = flank_margin.floor() as i64;
                    let refined_blocks = candidates
                        .iter()
                        .map(|x| {
                            let flanking_blocks = get_flanking_blocks(x, marker_positions, margin);
                            get_flank_restricted_blocks(x, &flanking_blocks)
                        })
                        .collect::<Vec<_>>();
                    let refined_block_count = refined_blocks.iter().map(|x| x.len()).sum::<usize>();

                    debug!(
                        "Confident block refinement iteration {iteration} flank margin {margin} block count {refined_block_count}"
                    );

                    if refined_block_count == 0 {
                        RefinementState::Done(RefinementOutcome::Exhausted {
                            iterations: iteration + 1,
                        })
                    } else {
                        for (candidate, blocks) in candidates.iter_mut().zip(refined_blocks) {
                            candidate.conf_blocks = blocks;
                        }
                        if needs_refinement(candidates, params.span_threshold) {
                            RefinementState::Refining {
                                flank_margin: flank_margin * params.shrink_factor,
                                iteration: iteration + 1,
                            }
                        } else {
                            RefinementState::Done(RefinementOutcome::Converged {
                                iterations: iteration + 1,
                            })
                        }
                    }
                }
            }
            RefinementState::Done(outcome) => {
                return outcome;
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{get_test_candidate, get_test_reference};

    #[test]
    fn test_get_confident_blocks() {
        let reference = get_test_reference();
        let candidate = get_test_candidate(&reference, "r", 0, "chr1", 10, "5S20M3I20M12D30M15I10M", None);
        let blocks = get_confident_blocks(&candidate, 10);

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].read_range, IntRange::from_pair(5, 48));
        assert_eq!(blocks[0].ref_range, IntRange::from_pair(10, 50));
        assert_eq!(blocks[1].read_range, IntRange::from_pair(48, 78));
        assert_eq!(blocks[1].ref_range, IntRange::from_pair(62, 92));
        assert_eq!(blocks[2].read_range, IntRange::from_pair(93, 103));
        assert_eq!(blocks[2].ref_range, IntRange::from_pair(92, 102));

        // With a lower threshold the small insertion also splits the first block
        let blocks = get_confident_blocks(&candidate, 3);
        assert_eq!(blocks.len(), 4);
    }

    #[test]
    fn test_get_confident_blocks_reverse() {
        let reference = get_test_reference();
        let candidate = get_test_candidate(&reference, "r", 16, "chr1", 10, "20M12D30M", None);
        let blocks = get_confident_blocks(&candidate, 10);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].read_range, IntRange::from_pair(30, 50));
        assert_eq!(blocks[0].ref_range, IntRange::from_pair(10, 30));
        assert_eq!(blocks[1].read_range, IntRange::from_pair(0, 30));
        assert_eq!(blocks[1].ref_range, IntRange::from_pair(42, 72));
    }

    #[test]
    fn test_get_flanking_blocks() {
        let reference = get_test_reference();
        let candidate = get_test_candidate(&reference, "r", 0, "chr1", 10, "5S100M", None);
        let flanks = get_flanking_blocks(&candidate, &[8, 12, 60], 5);
        assert_eq!(
            flanks,
            vec![IntRange::from_pair(5, 18), IntRange::from_pair(55, 66)]
        );
    }

    #[test]
    fn test_get_flank_restricted_blocks() {
        let reference = get_test_reference();
        let mut candidate = get_test_candidate(&reference, "r", 0, "chr1", 10, "20M12D30M", None);
        set_confident_blocks(std::slice::from_mut(&mut candidate), 10);

        let blocks = get_flank_restricted_blocks(
            &candidate,
            &[IntRange::from_pair(15, 25), IntRange::from_pair(40, 45)],
        );
        assert_eq!(
            blocks,
            vec![
                ConfidentBlock {
                    read_range: IntRange::from_pair(15, 20),
                    ref_range: IntRange::from_pair(25, 30),
                },
                ConfidentBlock {
                    read_range: IntRange::from_pair(20, 25),
                    ref_range: IntRange::from_pair(42, 47),
                },
                ConfidentBlock {
                    read_range: IntRange::from_pair(40, 45),
                    ref_range: IntRange::from_pair(62, 67),
                },
            ]
        );
    }

    #[test]
    fn test_refinement_not_needed() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 10, "100M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 10, "100M", None),
        ];
        set_confident_blocks(&mut candidates, 10);

        let params = RefinementParams::new(5000, 32);
        let outcome = refine_confident_blocks(&mut candidates, &[50], &params);
        assert_eq!(outcome, RefinementOutcome::NotNeeded);
        assert_eq!(candidates[0].conf_blocks.len(), 1);
    }

    #[test]
    fn test_needs_refinement_uses_single_candidate_span() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 10, "50M", None),
            get_test_candidate(&reference, "r", 256, "chr1", 150, "50M", None),
        ];
        set_confident_blocks(&mut candidates, 10);

        // Candidates together cover [10,200), but neither spans more than 50 bases
        assert!(!needs_refinement(&candidates, 60));
        assert!(needs_refinement(&candidates, 40));
    }

    #[test]
    fn test_refinement_converges() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 0, "240M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 0, "240M", None),
        ];
        set_confident_blocks(&mut candidates, 10);

        // Use a small span threshold to force refinement on the short test reference
        let params = RefinementParams::new(100, 32);
        let outcome = refine_confident_blocks(&mut candidates, &[50, 200], &params);

        assert!(matches!(outcome, RefinementOutcome::Converged { .. }));
        for candidate in candidates.iter() {
            assert!(get_confident_length(candidate) <= 100);
            assert!(candidate.conf_blocks.iter().any(|x| x.read_range.intersect_pos(50)));
            assert!(candidate.conf_blocks.iter().any(|x| x.read_range.intersect_pos(200)));
        }
    }

    #[test]
    fn test_refinement_exhausted_keeps_blocks() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 0, "240M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 0, "240M", None),
        ];
        set_confident_blocks(&mut candidates, 10);

        // A marker beyond the aligned read leaves no flanking block to refine within
        let params = RefinementParams::new(100, 32);
        let outcome = refine_confident_blocks(&mut candidates, &[1000], &params);
        assert_eq!(outcome, RefinementOutcome::Exhausted { iterations: 1 });
        assert_eq!(candidates[0].conf_blocks[0].ref_range, IntRange::from_pair(0, 240));
    }

    #[test]
    fn test_refinement_iteration_bound() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 0, "240M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 0, "240M", None),
        ];
        set_confident_blocks(&mut candidates, 10);

        // Refinement can't converge when the threshold is below a single-base window
        let params = RefinementParams::new(0, usize::MAX);
        let outcome = refine_confident_blocks(&mut candidates, &[100], &params);

        let expected_max_iterations = (params.initial_flank_margin.ln()
            / (1.0 / params.shrink_factor).ln())
        .ceil() as usize;
        match outcome {
            RefinementOutcome::IterationLimit { iterations } => {
                assert!(iterations <= expected_max_iterations);
            }
            _ => panic!("Unexpected refinement outcome: {outcome:?}"),
        }
    }
}
