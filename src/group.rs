//! Collect the alignment records of each read into alignment groups
//!

use rust_htslib::bam;
use rust_htslib::bam::record::Cigar;
use rust_htslib::errors::Error as HtslibError;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleError, SimpleResult};
use strum::Display;

use crate::alignment::AlignmentCandidate;
use crate::reference::ReferenceLookup;
use crate::variant_blocks::VariantRefBlocks;

/// Largest group size which can be scored
pub const MAX_GROUP_SIZE: usize = 10;

/// Smallest group size which can be scored
pub const MIN_GROUP_SIZE: usize = 2;

/// All consecutive mapped records sharing a read name
///
pub struct RecordGroup {
    pub read_name: String,

    /// Buffered records, at most `MAX_GROUP_SIZE + 1`
    pub records: Vec<bam::Record>,

    /// Total count of records in the group, including records discarded after the buffer is full
    pub record_count: usize,
}

/// Reasons to skip a group without a decision
///
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum GroupRejection {
    TooSmall,
    TooLarge,
    Supplementary,

    /// The group doesn't have exactly one primary record
    PrimaryCount,

    /// Some record doesn't store its sequence or base qualities
    MissingSequence,

    /// Some record has no read base aligned to the reference, such as an empty cigar string
    NoAlignedBases,
}

#[derive(Default, Deserialize, Serialize)]
pub struct GroupRejectionCounts {
    pub too_small: usize,
    pub too_large: usize,
    pub supplementary: usize,
    pub primary_count: usize,
    pub missing_sequence: usize,
    pub no_aligned_bases: usize,
}

impl GroupRejectionCounts {
    pub fn add(&mut self, rejection: GroupRejection) {
        let count = match rejection {
            GroupRejection::TooSmall => &mut self.too_small,
            GroupRejection::TooLarge => &mut self.too_large,
            GroupRejection::Supplementary => &mut self.supplementary,
            GroupRejection::PrimaryCount => &mut self.primary_count,
            GroupRejection::MissingSequence => &mut self.missing_sequence,
            GroupRejection::NoAlignedBases => &mut self.no_aligned_bases,
        };
        *count += 1;
    }

    pub fn total(&self) -> usize {
        self.too_small
            + self.too_large
            + self.supplementary
            + self.primary_count
            + self.missing_sequence
            + self.no_aligned_bases
    }
}

/// Iterate over the record groups of an alignment record stream
///
/// Records of each read are expected to be consecutive in the stream. Unmapped records are skipped.
/// A failure to read a record is returned as an error, after which iteration ends.
///
pub struct RecordGroupCollector<I> {
    records: I,
    next_record: Option<bam::Record>,
    failed: bool,

    pub unmapped_record_count: usize,
}

impl<I> RecordGroupCollector<I>
where
    I: Iterator<Item = Result<bam::Record, HtslibError>>,
{
    pub fn new(records: I) -> Self {
        Self {
            records,
            next_record: None,
            failed: false,
            unmapped_record_count: 0,
        }
    }

    fn next_mapped_record(&mut self) -> SimpleResult<Option<bam::Record>> {
        for result in self.records.by_ref() {
            let record = result.map_err(|e| SimpleError::with("Failed to read alignment record", e))?;
            if record.is_unmapped() {
                self.unmapped_record_count += 1;
                continue;
            }
            return Ok(Some(record));
        }
        Ok(None)
    }
}

impl<I> Iterator for RecordGroupCollector<I>
where
    I: Iterator<Item = Result<bam::Record, HtslibError>>,
{
    type Item = SimpleResult<RecordGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let pending_record = self.next_record.take();
        let mut next_mapped_record = || {
            let result = self.next_mapped_record();
            if result.is_err() {
                self.failed = true;
            }
            result
        };

        let first_record = match pending_record {
            Some(x) => x,
            None => match next_mapped_record() {
                Ok(Some(x)) => x,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            },
        };

        let qname = first_record.qname().to_vec();
        let mut records = vec![first_record];
        let mut record_count = 1;
        let mut next_record = None;
        loop {
            match next_mapped_record() {
                Ok(Some(record)) => {
                    if record.qname() != qname.as_slice() {
                        next_record = Some(record);
                        break;
                    }
                    record_count += 1;
                    if records.len() <= MAX_GROUP_SIZE {
                        records.push(record);
                    }
                }
                Ok(None) => break,
                Err(e) => return Some(Err(e)),
            }
        }
        self.next_record = next_record;

        Some(Ok(RecordGroup {
            read_name: String::from_utf8_lossy(&qname).to_string(),
            records,
            record_count,
        }))
    }
}

/// Check whether a record group can be scored
///
pub fn check_record_group(group: &RecordGroup) -> Result<(), GroupRejection> {
    if group.record_count < MIN_GROUP_SIZE {
        return Err(GroupRejection::TooSmall);
    }
    if group.record_count > MAX_GROUP_SIZE {
        return Err(GroupRejection::TooLarge);
    }
    if group.records.iter().any(|x| x.is_supplementary()) {
        return Err(GroupRejection::Supplementary);
    }
    let primary_count = group.records.iter().filter(|x| !x.is_secondary()).count();
    if primary_count != 1 {
        return Err(GroupRejection::PrimaryCount);
    }

    // htslib marks missing base qualities with 255 in the first position
    let is_missing_sequence =
        |x: &bam::Record| x.seq_len() == 0 || x.qual().first().is_none_or(|&q| q == 255);
    if group.records.iter().any(is_missing_sequence) {
        return Err(GroupRejection::MissingSequence);
    }

    let has_aligned_bases = |x: &bam::Record| {
        x.cigar()
            .iter()
            .any(|c| matches!(c, Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_)))
    };
    if !group.records.iter().all(has_aligned_bases) {
        return Err(GroupRejection::NoAlignedBases);
    }
    Ok(())
}

/// Convert an accepted record group into alignment candidates
///
pub fn get_group_candidates<R: ReferenceLookup>(
    group: &RecordGroup,
    header: &bam::HeaderView,
    reference: &R,
) -> SimpleResult<Vec<AlignmentCandidate>> {
    group
        .records
        .iter()
        .map(|x| AlignmentCandidate::from_record(x, header, reference))
        .collect()
}

/// Index of the candidate currently marked as primary
///
pub fn get_primary_index(candidates: &[AlignmentCandidate]) -> Option<usize> {
    candidates.iter().position(|x| x.is_primary)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScoringPath {
    EditDistance,
    Marker,
}

/// Route the group to edit distance scoring if any candidate's reference span intersects a
/// variant block
///
pub fn route_group(candidates: &[AlignmentCandidate], variant_ref_blocks: &VariantRefBlocks) -> ScoringPath {
    if candidates
        .iter()
        .any(|x| variant_ref_blocks.intersect(&x.contig, &x.get_ref_range()))
    {
        ScoringPath::EditDistance
    } else {
        ScoringPath::Marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceLookup;
    use crate::test_utils::{get_test_candidate, get_test_record, get_test_reference};
    use crate::variant_blocks::{VariantRecord, extract_variant_ref_blocks};

    fn collect_groups(records: Vec<bam::Record>) -> Vec<RecordGroup> {
        let records = records.into_iter().map(Ok);
        RecordGroupCollector::new(records)
            .collect::<SimpleResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_collect_groups() {
        let reference = get_test_reference();
        let mut records = vec![
            get_test_record(&reference, "r1", 0, "chr1", 10, "50M", None),
            get_test_record(&reference, "r1", 256, "chr2", 10, "50M", None),
            get_test_record(&reference, "r2", 0, "chr1", 20, "50M", None),
        ];
        records.push(get_test_record(&reference, "r2", 4, "chr1", 20, "50M", None));
        for _ in 0..12 {
            records.push(get_test_record(&reference, "r3", 256, "chr1", 30, "50M", None));
        }

        let groups = collect_groups(records);
        assert_eq!(groups.len(), 3);

        assert_eq!(groups[0].read_name, "r1");
        assert_eq!(groups[0].record_count, 2);
        assert_eq!(check_record_group(&groups[0]), Ok(()));

        assert_eq!(groups[1].record_count, 1);
        assert_eq!(check_record_group(&groups[1]), Err(GroupRejection::TooSmall));

        assert_eq!(groups[2].record_count, 12);
        assert_eq!(groups[2].records.len(), MAX_GROUP_SIZE + 1);
        assert_eq!(check_record_group(&groups[2]), Err(GroupRejection::TooLarge));
    }

    #[test]
    fn test_collect_groups_read_failure() {
        let reference = get_test_reference();
        let records = vec![
            Ok(get_test_record(&reference, "r1", 0, "chr1", 10, "50M", None)),
            Ok(get_test_record(&reference, "r1", 256, "chr2", 10, "50M", None)),
            Err(HtslibError::BamTruncatedRecord),
            Ok(get_test_record(&reference, "r2", 0, "chr1", 10, "50M", None)),
        ];
        let mut collector = RecordGroupCollector::new(records.into_iter());
        assert!(collector.next().unwrap().is_err());
        assert!(collector.next().is_none());
    }

    #[test]
    fn test_check_record_group() {
        let reference = get_test_reference();

        let groups = collect_groups(vec![
            get_test_record(&reference, "r1", 0, "chr1", 10, "50M", None),
            get_test_record(&reference, "r1", 2048, "chr2", 10, "50M", None),
            get_test_record(&reference, "r2", 256, "chr1", 10, "50M", None),
            get_test_record(&reference, "r2", 256, "chr2", 10, "50M", None),
            get_test_record(&reference, "r3", 0, "chr1", 10, "50M", None),
            get_test_record(&reference, "r3", 0, "chr2", 10, "50M", None),
        ]);
        assert_eq!(check_record_group(&groups[0]), Err(GroupRejection::Supplementary));
        assert_eq!(check_record_group(&groups[1]), Err(GroupRejection::PrimaryCount));
        assert_eq!(check_record_group(&groups[2]), Err(GroupRejection::PrimaryCount));
    }

    #[test]
    fn test_check_record_group_no_aligned_bases() {
        let reference = get_test_reference();
        let seq = "A".repeat(50);

        let groups = collect_groups(vec![
            get_test_record(&reference, "r1", 0, "chr1", 10, "50M", None),
            get_test_record(&reference, "r1", 256, "chr2", 10, "50S", Some(&seq)),
            get_test_record(&reference, "r2", 0, "chr1", 10, "20S30M", None),
            get_test_record(&reference, "r2", 256, "chr2", 10, "10M40S", None),
        ]);
        assert_eq!(check_record_group(&groups[0]), Err(GroupRejection::NoAlignedBases));
        assert_eq!(check_record_group(&groups[1]), Ok(()));

        let mut counts = GroupRejectionCounts::default();
        counts.add(GroupRejection::NoAlignedBases);
        assert_eq!(counts.no_aligned_bases, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_route_group() {
        let reference = get_test_reference();
        let candidates = vec![
            get_test_candidate(&reference, "r", 0, "chr1", 10, "50M", None),
            get_test_candidate(&reference, "r", 256, "chr2", 100, "50M", None),
        ];

        let variants = [40, 45, 200, 210]
            .into_iter()
            .map(|pos| VariantRecord {
                contig: "chr2".to_string(),
                pos,
                is_phased_het: true,
            })
            .collect::<Vec<_>>();
        let variant_ref_blocks = extract_variant_ref_blocks(&variants, reference.contigs(), 5).unwrap();

        // Blocks on chr2 are [35,50), [40,205) and [195,215), all merged to [35,215)
        assert_eq!(route_group(&candidates, &variant_ref_blocks), ScoringPath::EditDistance);

        let variant_ref_blocks = extract_variant_ref_blocks(&variants[..2], reference.contigs(), 5).unwrap();
        assert_eq!(route_group(&candidates, &variant_ref_blocks), ScoringPath::Marker);

        assert_eq!(
            route_group(&candidates, &VariantRefBlocks::default()),
            ScoringPath::Marker
        );
    }
}
