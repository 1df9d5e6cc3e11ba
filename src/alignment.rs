//! Alignment candidates for a single read
//!

use rust_htslib::bam::{self, record::Cigar};
use simple_error::{SimpleResult, bail};

use crate::cigar_utils::{get_cigar_ref_span, get_hard_clip_sizes};
use crate::confident_blocks::ConfidentBlock;
use crate::int_range::IntRange;
use crate::read_to_ref_map::get_read_to_ref_pos_map;
use crate::reference::ReferenceLookup;

/// One candidate mapping of a read, owned by the read's alignment group
///
/// There are two read coordinate systems used for each candidate:
/// 1. The alignment index, which indexes the stored read sequence and qualities in alignment
///    orientation, excluding hard-clipped bases
/// 2. The forward read position, which is the position in sequencing orientation including any
///    hard-clipped bases. Forward read positions are comparable across all candidates of a read.
///
pub struct AlignmentCandidate {
    pub contig: String,

    /// Zero-indexed reference start position
    pub ref_start: i64,

    /// Zero-indexed reference end position (exclusive)
    pub ref_end: i64,

    pub cigar: Vec<Cigar>,

    /// Read bases in alignment orientation
    pub seq: Vec<u8>,

    /// Base qualities in alignment orientation, these may be recalibrated in place
    pub qual: Vec<u8>,

    /// Reference bases over [ref_start, ref_end)
    pub ref_seq: Vec<u8>,

    /// Reference position of each alignment index, None for clipped and inserted bases
    pub read_to_ref: Vec<Option<i64>>,

    pub is_reverse: bool,
    pub is_primary: bool,
    pub is_supplementary: bool,

    /// Hard-clipped base count preceding the stored sequence in alignment orientation
    left_hard_clip: usize,

    /// Full read length including hard-clipped bases
    read_length: usize,

    /// Score from the current group's scoring path
    pub score: f64,

    /// Rightmost reference extent of the blocks used to score this candidate
    pub rfe: Option<i64>,

    pub conf_blocks: Vec<ConfidentBlock>,
}

impl AlignmentCandidate {
    /// Create a new candidate from an alignment record and the reference it maps to
    ///
    pub fn from_record<R: ReferenceLookup>(
        record: &bam::Record,
        header: &bam::HeaderView,
        reference: &R,
    ) -> SimpleResult<Self> {
        let qname = String::from_utf8_lossy(record.qname()).to_string();
        if record.tid() < 0 {
            bail!("Can't create alignment candidate from unmapped record '{qname}'");
        }
        let contig = String::from_utf8_lossy(header.tid2name(record.tid() as u32)).to_string();

        let cigar = record.cigar().iter().copied().collect::<Vec<_>>();
        let seq = record.seq().as_bytes().to_ascii_uppercase();
        let qual = record.qual().to_vec();
        if seq.is_empty() {
            bail!("Alignment record for read '{qname}' has no stored sequence");
        }

        let ref_start = record.pos();
        let ref_end = ref_start + get_cigar_ref_span(&cigar);
        let ref_seq = reference.fetch(&contig, &IntRange::from_pair(ref_start, ref_end))?;

        let read_to_ref = get_read_to_ref_pos_map(seq.len(), ref_start, &cigar);
        let (left_hard_clip, right_hard_clip) = get_hard_clip_sizes(&cigar);
        let read_length = left_hard_clip + seq.len() + right_hard_clip;

        Ok(Self {
            contig,
            ref_start,
            ref_end,
            cigar,
            seq,
            qual,
            ref_seq,
            read_to_ref,
            is_reverse: record.is_reverse(),
            is_primary: !record.is_secondary(),
            is_supplementary: record.is_supplementary(),
            left_hard_clip,
            read_length,
            score: 0.0,
            rfe: None,
            conf_blocks: Vec::new(),
        })
    }

    pub fn get_ref_range(&self) -> IntRange {
        IntRange::from_pair(self.ref_start, self.ref_end)
    }

    /// Reference base at the zero-indexed reference position `ref_pos`
    ///
    pub fn ref_base(&self, ref_pos: i64) -> u8 {
        self.ref_seq[(ref_pos - self.ref_start) as usize]
    }

    /// Convert an alignment index into a forward read position
    ///
    pub fn fwd_read_pos(&self, aln_index: usize) -> usize {
        let pos = aln_index + self.left_hard_clip;
        if self.is_reverse {
            self.read_length - 1 - pos
        } else {
            pos
        }
    }

    /// Convert a forward read position into an alignment index
    ///
    /// Returns None if the position is hard-clipped in this alignment.
    ///
    pub fn aln_index(&self, fwd_read_pos: usize) -> Option<usize> {
        if fwd_read_pos >= self.read_length {
            return None;
        }
        let pos = if self.is_reverse {
            self.read_length - 1 - fwd_read_pos
        } else {
            fwd_read_pos
        };
        let index = pos.checked_sub(self.left_hard_clip)?;
        if index < self.seq.len() {
            Some(index)
        } else {
            None
        }
    }

    /// Convert a range of alignment indexes into the corresponding forward read range
    ///
    pub fn fwd_read_range(&self, aln_range: &IntRange) -> IntRange {
        let range = IntRange::from_pair(
            aln_range.start + self.left_hard_clip as i64,
            aln_range.end + self.left_hard_clip as i64,
        );
        if self.is_reverse {
            range.get_reverse_range(self.read_length as i64)
        } else {
            range
        }
    }

    /// Convert a forward read range into the corresponding range of alignment indexes, clipped to
    /// the stored sequence
    ///
    pub fn aln_range(&self, fwd_read_range: &IntRange) -> IntRange {
        let range = if self.is_reverse {
            fwd_read_range.get_reverse_range(self.read_length as i64)
        } else {
            *fwd_read_range
        };
        let offset = self.left_hard_clip as i64;
        let seq_len = self.seq.len() as i64;
        IntRange::from_pair(
            (range.start - offset).clamp(0, seq_len),
            (range.end - offset).clamp(0, seq_len),
        )
    }

    /// Forward read range from the first to the last base aligned to the reference
    ///
    pub fn aligned_fwd_read_range(&self) -> IntRange {
        let first = self.read_to_ref.iter().position(|x| x.is_some()).unwrap_or(0);
        let last = self
            .read_to_ref
            .iter()
            .rposition(|x| x.is_some())
            .map_or(first, |x| x + 1);
        self.fwd_read_range(&IntRange::from_pair(first as i64, last as i64))
    }

    /// Reference position aligned to the given forward read position, if any
    ///
    pub fn ref_pos_at(&self, fwd_read_pos: usize) -> Option<i64> {
        self.aln_index(fwd_read_pos)
            .and_then(|index| self.read_to_ref[index])
    }

    /// Reset all state derived from scoring a group
    ///
    pub fn reset_scoring_state(&mut self) {
        self.score = 0.0;
        self.rfe = None;
        self.conf_blocks.clear();
    }
}
