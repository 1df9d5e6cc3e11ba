//! Marker discovery and filtering for the marker-consistency scoring path
//!
//! A marker is a read position at which the candidate alignments of the read disagree, either
//! because the read base mismatches some candidate's reference or because some candidate places
//! an indel there. Markers are keyed by forward read position, which is shared by all candidates.
//!

use std::collections::BTreeMap;

use rust_htslib::bam::record::Cigar;

use crate::alignment::AlignmentCandidate;
use crate::int_range::{IntRange, get_overlap_range};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObservationKind {
    Match,
    Mismatch,
    Insertion,

    /// Last read base before a deletion in alignment orientation
    Deletion,
}

/// What one candidate alignment shows at a marker
///
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub kind: ObservationKind,

    pub base: u8,

    /// Reference position aligned to the marker's read base, None for inserted bases
    pub ref_pos: Option<i64>,

    /// Index of the observed base in the candidate's sequence and quality arrays
    pub aln_index: usize,
}

#[derive(Clone, Debug)]
pub struct Marker {
    /// Forward read position
    pub read_pos: usize,

    /// One entry per candidate in group order
    pub observations: Vec<Option<Observation>>,
}

impl Marker {
    fn new(read_pos: usize, candidate_count: usize) -> Self {
        Self {
            read_pos,
            observations: vec![None; candidate_count],
        }
    }

    /// True if the marker has an observation of any of the given kind
    ///
    pub fn has_kind(&self, kind: ObservationKind) -> bool {
        self.observations.iter().flatten().any(|x| x.kind == kind)
    }
}

/// Forward read range aligned by every candidate
///
fn get_common_aligned_read_range(candidates: &[AlignmentCandidate]) -> Option<IntRange> {
    let mut candidates = candidates.iter();
    let mut common = candidates.next()?.aligned_fwd_read_range();
    for candidate in candidates {
        common = get_overlap_range(&common, &candidate.aligned_fwd_read_range())?;
    }
    Some(common)
}

/// Find every read position where at least one candidate shows a mismatch, insertion or
/// deletion-adjacent base, restricted to read positions aligned by all candidates
///
/// Observations are only recorded for the candidates showing the difference, the rest are left
/// for [`fill_marker_observations`].
///
pub fn discover_markers(candidates: &[AlignmentCandidate]) -> Vec<Marker> {
    use Cigar::*;

    let Some(common_range) = get_common_aligned_read_range(candidates) else {
        return Vec::new();
    };

    let mut markers = BTreeMap::new();
    let mut add_observation = |candidate_index: usize, read_pos: usize, observation: Observation| {
        if !common_range.intersect_pos(read_pos as i64) {
            return;
        }
        let marker = markers
            .entry(read_pos)
            .or_insert_with(|| Marker::new(read_pos, candidates.len()));
        let entry = &mut marker.observations[candidate_index];
        if entry.is_none() {
            *entry = Some(observation);
        }
    };

    for (candidate_index, candidate) in candidates.iter().enumerate() {
        let mut aln_index = 0usize;
        let mut ref_pos = candidate.ref_start;
        for c in candidate.cigar.iter() {
            match c {
                Match(len) | Equal(len) | Diff(len) => {
                    for _ in 0..*len {
                        let base = candidate.seq[aln_index];
                        if base != candidate.ref_base(ref_pos) {
                            add_observation(
                                candidate_index,
                                candidate.fwd_read_pos(aln_index),
                                Observation {
                                    kind: ObservationKind::Mismatch,
                                    base,
                                    ref_pos: Some(ref_pos),
                                    aln_index,
                                },
                            );
                        }
                        aln_index += 1;
                        ref_pos += 1;
                    }
                }
                Ins(len) => {
                    for _ in 0..*len {
                        add_observation(
                            candidate_index,
                            candidate.fwd_read_pos(aln_index),
                            Observation {
                                kind: ObservationKind::Insertion,
                                base: candidate.seq[aln_index],
                                ref_pos: None,
                                aln_index,
                            },
                        );
                        aln_index += 1;
                    }
                }
                Del(len) => {
                    if aln_index > 0 {
                        let anchor_index = aln_index - 1;
                        add_observation(
                            candidate_index,
                            candidate.fwd_read_pos(anchor_index),
                            Observation {
                                kind: ObservationKind::Deletion,
                                base: candidate.seq[anchor_index],
                                ref_pos: candidate.read_to_ref[anchor_index],
                                aln_index: anchor_index,
                            },
                        );
                    }
                    ref_pos += *len as i64;
                }
                RefSkip(len) => {
                    ref_pos += *len as i64;
                }
                SoftClip(len) => {
                    aln_index += *len as usize;
                }
                _ => {}
            }
        }
    }

    markers.into_values().collect()
}

/// Remove markers where every candidate shows the same difference from its reference
///
pub fn remove_uninformative_markers(markers: &mut Vec<Marker>) {
    markers.retain(|marker| {
        let Some(Some(first)) = marker.observations.first() else {
            return true;
        };
        if first.kind == ObservationKind::Match {
            return true;
        }
        !marker
            .observations
            .iter()
            .all(|x| x.as_ref().is_some_and(|x| x.kind == first.kind))
    });
}

/// Sort markers by read position and resolve every missing observation through the candidate's
/// read to reference mapping
///
/// Markers which can't be resolved for some candidate are removed.
///
pub fn fill_marker_observations(candidates: &[AlignmentCandidate], markers: &mut Vec<Marker>) {
    markers.sort_by_key(|x| x.read_pos);
    markers.retain_mut(|marker| {
        for (candidate, observation) in candidates.iter().zip(marker.observations.iter_mut()) {
            if observation.is_some() {
                continue;
            }
            let Some(aln_index) = candidate.aln_index(marker.read_pos) else {
                return false;
            };
            let base = candidate.seq[aln_index];
            let ref_pos = candidate.read_to_ref[aln_index];
            let kind = match ref_pos {
                Some(x) if candidate.ref_base(x) == base => ObservationKind::Match,
                Some(_) => ObservationKind::Mismatch,
                None => ObservationKind::Insertion,
            };
            *observation = Some(Observation {
                kind,
                base,
                ref_pos,
                aln_index,
            });
        }
        true
    });
}

/// Remove markers anchored on an inserted base in any candidate
///
pub fn remove_insertion_markers(markers: &mut Vec<Marker>) {
    markers.retain(|x| !x.has_kind(ObservationKind::Insertion));
}

/// Remove markers where any candidate's base quality is below `min_q`
///
pub fn remove_low_quality_markers(
    candidates: &[AlignmentCandidate],
    markers: &mut Vec<Marker>,
    min_q: u8,
) {
    markers.retain(|marker| {
        candidates
            .iter()
            .zip(marker.observations.iter())
            .all(|(candidate, observation)| match observation {
                Some(x) => candidate.qual[x.aln_index] >= min_q,
                None => false,
            })
    });
}

/// Accumulate marker scores into each candidate's score
///
/// A matching observation contributes nothing, any other observation contributes minus the
/// candidate's quality at the observed base.
///
pub fn score_markers(candidates: &mut [AlignmentCandidate], markers: &[Marker]) {
    for marker in markers.iter() {
        for (candidate, observation) in candidates.iter_mut().zip(marker.observations.iter()) {
            if let Some(observation) = observation {
                if observation.kind != ObservationKind::Match {
                    candidate.score -= candidate.qual[observation.aln_index] as f64;
                }
            }
        }
    }
}
