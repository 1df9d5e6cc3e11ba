//! Walk alignment cigar strings in read and reference coordinates
//!

use rust_htslib::bam::record::Cigar;

/// One cigar element with the read and reference positions where it starts
///
/// Read positions exclude hard-clipped bases, so they index directly into the stored read
/// sequence.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CigarSegment {
    pub op: Cigar,
    pub read_pos: usize,
    pub ref_pos: i64,
}

impl CigarSegment {
    pub fn is_aligned(&self) -> bool {
        matches!(self.op, Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_))
    }

    /// Read bases consumed by this element
    pub fn read_len(&self) -> usize {
        match self.op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) | Cigar::Ins(len) | Cigar::SoftClip(len) => {
                len as usize
            }
            _ => 0,
        }
    }

    /// Reference bases consumed by this element
    pub fn ref_len(&self) -> i64 {
        match self.op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) | Cigar::Del(len) | Cigar::RefSkip(len) => {
                len as i64
            }
            _ => 0,
        }
    }
}

/// Iterate over the segments of `cigar` for an alignment starting at reference position `ref_start`
///
pub fn cigar_segments(cigar: &[Cigar], ref_start: i64) -> impl Iterator<Item = CigarSegment> + '_ {
    cigar.iter().scan((0usize, ref_start), |(read_pos, ref_pos), op| {
        let segment = CigarSegment {
            op: *op,
            read_pos: *read_pos,
            ref_pos: *ref_pos,
        };
        *read_pos += segment.read_len();
        *ref_pos += segment.ref_len();
        Some(segment)
    })
}

/// Length of the reference interval covered by the alignment
///
pub fn get_cigar_ref_span(cigar: &[Cigar]) -> i64 {
    cigar_segments(cigar, 0).map(|x| x.ref_len()).sum()
}

/// Report the total hard-clipped length on the (left, right) side of the alignment
///
pub fn get_hard_clip_sizes(cigar: &[Cigar]) -> (usize, usize) {
    let clip_len = |c: Option<&Cigar>| match c {
        Some(Cigar::HardClip(len)) => *len as usize,
        _ => 0,
    };
    let left = clip_len(cigar.first());
    let right = if cigar.len() > 1 { clip_len(cigar.last()) } else { 0 };
    (left, right)
}

/// Convert CIGAR in string format into rust-htslib's cigar element vector
///
#[cfg(test)]
pub fn get_cigar_from_string(cigar_str: &str) -> Vec<Cigar> {
    use rust_htslib::bam::record::CigarString;
    CigarString::try_from(cigar_str.as_bytes()).unwrap().into()
}
