//! Edit distance scoring of alignment candidates over phased variant blocks
//!

use bio::alignment::distance::levenshtein;

use crate::alignment::AlignmentCandidate;
use crate::int_range::{IntRange, get_overlap_range, merge_ranges};
use crate::read_to_ref_map::{get_read_range_for_ref_range, get_ref_range_for_read_range};
use crate::variant_blocks::VariantRefBlocks;

/// Project every variant block overlapped by any candidate into forward read coordinates and merge
/// the results
///
/// Each block is first clipped to the reference span of the candidate overlapping it.
///
pub fn get_merged_variant_read_blocks(
    candidates: &[AlignmentCandidate],
    variant_ref_blocks: &VariantRefBlocks,
) -> Vec<IntRange> {
    let mut read_blocks = Vec::new();
    for candidate in candidates.iter() {
        let ref_range = candidate.get_ref_range();
        for block in variant_ref_blocks.find_overlaps(&candidate.contig, &ref_range) {
            let Some(clipped_block) = get_overlap_range(block, &ref_range) else {
                continue;
            };
            if let Some(aln_range) = get_read_range_for_ref_range(&candidate.read_to_ref, &clipped_block) {
                read_blocks.push(candidate.fwd_read_range(&aln_range));
            }
        }
    }
    merge_ranges(read_blocks)
}

/// Edit distance between the candidate's read and reference over the forward read block, and the
/// reference end of the aligned segment
///
/// Returns None if the candidate doesn't align any part of the read block.
///
fn get_block_edit_distance(candidate: &AlignmentCandidate, read_block: &IntRange) -> Option<(u32, i64)> {
    let read_block = get_overlap_range(read_block, &candidate.aligned_fwd_read_range())?;
    let aln_range = candidate.aln_range(&read_block);
    let ref_range = get_ref_range_for_read_range(&candidate.read_to_ref, &aln_range)?;

    let read_seq = &candidate.seq[aln_range.start as usize..aln_range.end as usize];
    let ref_offset = (ref_range.start - candidate.ref_start) as usize;
    let ref_seq = &candidate.ref_seq[ref_offset..ref_offset + ref_range.size() as usize];
    Some((levenshtein(read_seq, ref_seq), ref_range.end))
}

/// Set each candidate's score to its total edit distance over the merged variant read blocks
///
/// Returns the merged variant read block count.
///
pub fn score_by_edit_distance(
    candidates: &mut [AlignmentCandidate],
    variant_ref_blocks: &VariantRefBlocks,
) -> usize {
    let read_blocks = get_merged_variant_read_blocks(candidates, variant_ref_blocks);
    for candidate in candidates.iter_mut() {
        candidate.reset_scoring_state();
        let mut total_distance = 0;
        for read_block in read_blocks.iter() {
            if let Some((distance, ref_end)) = get_block_edit_distance(candidate, read_block) {
                total_distance += distance;
                candidate.rfe = Some(candidate.rfe.map_or(ref_end, |x| x.max(ref_end)));
            }
        }
        candidate.score = total_distance as f64;
    }
    read_blocks.len()
}

/// Index of the lowest score, ties are resolved to the first occurrence
///
pub fn get_min_score_index(candidates: &[AlignmentCandidate]) -> usize {
    let mut min_index = 0;
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.score < candidates[min_index].score {
            min_index = index;
        }
    }
    min_index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceLookup;
    use crate::test_utils::{get_test_candidate, get_test_reference};
    use crate::variant_blocks::{VariantRecord, extract_variant_ref_blocks};

    fn get_test_variant_blocks(contig: &str, left: i64, right: i64) -> VariantRefBlocks {
        let reference = get_test_reference();
        let variants = [left, right]
            .into_iter()
            .map(|pos| VariantRecord {
                contig: contig.to_string(),
                pos,
                is_phased_het: true,
            })
            .collect::<Vec<_>>();
        extract_variant_ref_blocks(&variants, reference.contigs(), 5).unwrap()
    }

    #[test]
    fn test_merged_variant_read_blocks() {
        let reference = get_test_reference();
        let candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 10, "100M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 20, "100M", None),
        ];

        // Block [45,65) on chr1 projects to read range [35,55)
        let variant_ref_blocks = get_test_variant_blocks("chr1", 50, 60);
        let read_blocks = get_merged_variant_read_blocks(&candidates, &variant_ref_blocks);
        assert_eq!(read_blocks, vec![IntRange::from_pair(35, 55)]);
    }

    #[test]
    fn test_score_by_edit_distance() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 10, "100M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 10, "100M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 10, "100M", None),
        ];

        // Put two mismatches in the first candidate's reference within the variant block, and one
        // mismatch in the second candidate's reference outside of it
        for ref_pos in [48, 52] {
            let base = candidates[0].ref_base(ref_pos);
            candidates[0].ref_seq[(ref_pos - 10) as usize] = if base == b'A' { b'C' } else { b'A' };
        }
        let base = candidates[1].ref_base(80);
        candidates[1].ref_seq[70] = if base == b'A' { b'C' } else { b'A' };

        let variant_ref_blocks = get_test_variant_blocks("chr2", 50, 60);
        let block_count = score_by_edit_distance(&mut candidates, &variant_ref_blocks);
        assert_eq!(block_count, 1);

        assert_eq!(candidates[0].score, 2.0);
        assert_eq!(candidates[1].score, 0.0);
        assert_eq!(candidates[2].score, 0.0);
        assert_eq!(candidates[0].rfe, Some(65));

        // Ties resolve to the first occurrence
        assert_eq!(get_min_score_index(&candidates), 1);
    }

    #[test]
    fn test_score_by_edit_distance_uncovered_block() {
        let reference = get_test_reference();
        let mut candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 10, "60S40M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 10, "100M", None),
        ];

        // The block is aligned only by the second candidate
        let variant_ref_blocks = get_test_variant_blocks("chr2", 20, 30);
        score_by_edit_distance(&mut candidates, &variant_ref_blocks);
        assert_eq!(candidates[0].score, 0.0);
        assert_eq!(candidates[0].rfe, None);
        assert_eq!(candidates[1].rfe, Some(35));
    }
}
