use rust_htslib::bam::record::Cigar;

use crate::cigar_utils::cigar_segments;
use crate::int_range::IntRange;

/// Create an array of read length, mapping from the read to the reference position for the given
/// read alignment
///
/// Read positions which are not mapped to a reference position are None. Read positions exclude
/// hard-clipped segments, so that the array lines up with the stored read sequence.
///
/// Ref positions are 0-indexed
///
pub fn get_read_to_ref_pos_map(seq_len: usize, ref_start: i64, cigar: &[Cigar]) -> Vec<Option<i64>> {
    let mut read_to_ref = vec![None; seq_len];
    for segment in cigar_segments(cigar, ref_start).filter(|x| x.is_aligned()) {
        let read_positions = segment.read_pos..segment.read_pos + segment.read_len();
        for (offset, read_pos) in read_positions.enumerate() {
            read_to_ref[read_pos] = Some(segment.ref_pos + offset as i64);
        }
    }
    read_to_ref
}

/// Find the read interval aligned within the reference interval `ref_range`
///
/// The read interval spans from the first read position aligned at or after `ref_range.start` to
/// the last read position aligned before `ref_range.end`, so any inserted bases between those
/// positions are included.
///
/// Return None if no read position aligns within `ref_range`.
///
pub fn get_read_range_for_ref_range(
    read_to_ref: &[Option<i64>],
    ref_range: &IntRange,
) -> Option<IntRange> {
    let start = read_to_ref
        .iter()
        .position(|x| x.is_some_and(|p| ref_range.intersect_pos(p)))?;
    let end = read_to_ref
        .iter()
        .rposition(|x| x.is_some_and(|p| ref_range.intersect_pos(p)))?;
    Some(IntRange::from_pair(start as i64, end as i64 + 1))
}

/// Find the reference interval covered by the aligned positions of the read interval `read_range`
///
/// Return None if no position in `read_range` is aligned to the reference.
///
pub fn get_ref_range_for_read_range(
    read_to_ref: &[Option<i64>],
    read_range: &IntRange,
) -> Option<IntRange> {
    let start = read_range.start.max(0) as usize;
    let end = (read_range.end.max(0) as usize).min(read_to_ref.len());
    if start >= end {
        return None;
    }
    let segment = &read_to_ref[start..end];
    let first = segment.iter().flatten().next()?;
    let last = segment.iter().flatten().next_back()?;
    Some(IntRange::from_pair(*first, *last + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar_utils::get_cigar_from_string;

    #[test]
    fn test_get_read_to_ref_pos_map() {
        let cigar = get_cigar_from_string("2H2M1I1M2D2M");
        let rval = get_read_to_ref_pos_map(6, 9, &cigar);
        assert_eq!(
            rval,
            vec![Some(9), Some(10), None, Some(11), Some(14), Some(15)]
        );
    }

    #[test]
    fn test_get_read_range_for_ref_range() {
        let cigar = get_cigar_from_string("1S2M1I1M2D2M");
        let read_to_ref = get_read_to_ref_pos_map(7, 9, &cigar);

        let read_range = get_read_range_for_ref_range(&read_to_ref, &IntRange::from_pair(10, 13));
        assert_eq!(read_range, Some(IntRange::from_pair(2, 5)));

        // Reference interval entirely within the deletion
        let read_range = get_read_range_for_ref_range(&read_to_ref, &IntRange::from_pair(12, 14));
        assert_eq!(read_range, None);
    }

    #[test]
    fn test_get_ref_range_for_read_range() {
        let cigar = get_cigar_from_string("1S2M1I1M2D2M");
        let read_to_ref = get_read_to_ref_pos_map(7, 9, &cigar);

        let ref_range = get_ref_range_for_read_range(&read_to_ref, &IntRange::from_pair(0, 7));
        assert_eq!(ref_range, Some(IntRange::from_pair(9, 16)));

        let ref_range = get_ref_range_for_read_range(&read_to_ref, &IntRange::from_pair(3, 4));
        assert_eq!(ref_range, None);
    }
}
