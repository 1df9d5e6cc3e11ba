//! Base alignment quality recalibration
//!
//! Each recalibrated base quality reflects the probability that the base is aligned to its
//! current reference position, computed with a banded glocal pair HMM over a window of the
//! candidate's confident blocks.
//!

use crate::alignment::AlignmentCandidate;
use crate::int_range::IntRange;
use crate::prob_utils::{error_prob_to_phred, qphred_to_error_prob};
use crate::read_to_ref_map::get_read_range_for_ref_range;

/// Emission probability of an inserted base
const INSERT_EMISSION: f64 = 0.25;

/// Highest quality value produced by the HMM
const MAX_HMM_QUAL: u8 = 99;

#[derive(Clone, Debug)]
pub struct BaqParams {
    /// Gap open probability
    pub gap_open: f64,

    /// Gap extension probability
    pub gap_ext: f64,

    pub bandwidth: usize,

    /// All qualities are reset to this value before recalibration, and recalibrated qualities are
    /// capped to it
    pub init_q: u8,

    /// Maximum reference size of a single HMM window
    pub window_size: i64,
}

/// Maximum posterior state of a query base, with its 0-indexed position in the reference window
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AlignState {
    Match(usize),
    Insert(usize),
}

#[derive(Clone, Debug)]
pub struct BasePosterior {
    pub state: Option<AlignState>,

    /// Phred-scaled probability that `state` is wrong
    pub qual: u8,
}

fn base_code(base: u8) -> u8 {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 4,
    }
}

fn match_emission(ref_code: u8, query_code: u8, error_prob: f64) -> f64 {
    if ref_code > 3 || query_code > 3 {
        1.0
    } else if ref_code == query_code {
        1.0 - error_prob
    } else {
        error_prob / 3.0
    }
}

/// Offset of the (match, insert, delete) cell triplet for query position `i` and reference
/// position `k` within a banded matrix row, both positions 1-indexed
///
fn band_offset(bw: i64, i: i64, k: i64) -> i64 {
    let x = (i - bw).max(0);
    (k - x + 1) * 3
}

/// Run the glocal forward-backward pair HMM for `query` against `ref_seq`, returning the maximum
/// posterior state of every query base
///
/// The query is aligned end-to-end, and may start and end anywhere in the reference. The
/// computation is restricted to a diagonal band of half-width `bandwidth`, widened if needed to
/// cover the length difference of the two sequences.
///
pub fn glocal_forward_backward(
    ref_seq: &[u8],
    query: &[u8],
    query_qual: &[u8],
    gap_open: f64,
    gap_ext: f64,
    bandwidth: usize,
) -> Vec<BasePosterior> {
    assert!(!ref_seq.is_empty() && !query.is_empty());
    assert_eq!(query.len(), query_qual.len());

    let l_ref = ref_seq.len() as i64;
    let l_query = query.len() as i64;
    let lq = query.len();

    // Convert all inputs to 1-indexed arrays
    let reference = std::iter::once(4)
        .chain(ref_seq.iter().map(|&x| base_code(x)))
        .collect::<Vec<_>>();
    let query = std::iter::once(4)
        .chain(query.iter().map(|&x| base_code(x)))
        .collect::<Vec<_>>();
    let error_probs = std::iter::once(0.0)
        .chain(query_qual.iter().map(|&x| qphred_to_error_prob::<f64>(x)))
        .collect::<Vec<_>>();

    let bw = l_ref
        .max(l_query)
        .min(bandwidth as i64)
        .max((l_ref - l_query).abs());
    let bw2 = bw * 2 + 1;
    let row_size = (bw2 * 3 + 6) as usize;
    let in_band = |u: i64| u >= 3 && u < bw2 * 3 + 3;

    let mut f = vec![vec![0.0f64; row_size]; lq + 1];
    let mut b = vec![vec![0.0f64; row_size]; lq + 1];
    let mut s = vec![0.0f64; lq + 2];

    // Transition matrix, indexed by [from * 3 + to] over (match, insert, delete)
    let s_m = 1.0 / (2 * l_query + 2) as f64;
    let s_i = s_m;
    let d = gap_open;
    let e = gap_ext;
    let m = [
        (1.0 - 2.0 * d) * (1.0 - s_m),
        d * (1.0 - s_m),
        d * (1.0 - s_m),
        (1.0 - e) * (1.0 - s_i),
        e * (1.0 - s_i),
        0.0,
        1.0 - e,
        0.0,
        e,
    ];
    let b_m = (1.0 - d) / l_ref as f64;
    let b_i = d / l_ref as f64;

    let band_range = |i: i64| ((i - bw).max(1), l_ref.min(i + bw));

    // Forward
    f[0][band_offset(bw, 0, 0) as usize] = 1.0;
    s[0] = 1.0;
    {
        let end = l_ref.min(bw + 1);
        let mut sum = 0.0;
        let fi = &mut f[1];
        for k in 1..=end {
            let u = band_offset(bw, 1, k) as usize;
            let em = match_emission(reference[k as usize], query[1], error_probs[1]);
            fi[u] = em * b_m;
            fi[u + 1] = INSERT_EMISSION * b_i;
            sum += fi[u] + fi[u + 1];
        }
        s[1] = sum;
        let first = band_offset(bw, 1, 1) as usize;
        let last = band_offset(bw, 1, end) as usize + 2;
        for x in fi[first..=last].iter_mut() {
            *x /= sum;
        }
    }
    for i in 2..=l_query {
        let (prev, cur) = f.split_at_mut(i as usize);
        let fi1 = &prev[i as usize - 1];
        let fi = &mut cur[0];
        let (beg, end) = band_range(i);
        let mut sum = 0.0;
        for k in beg..=end {
            let u = band_offset(bw, i, k) as usize;
            let v11 = band_offset(bw, i - 1, k - 1) as usize;
            let v10 = band_offset(bw, i - 1, k) as usize;
            let v01 = band_offset(bw, i, k - 1) as usize;
            let em = match_emission(reference[k as usize], query[i as usize], error_probs[i as usize]);
            fi[u] = em * (m[0] * fi1[v11] + m[3] * fi1[v11 + 1] + m[6] * fi1[v11 + 2]);
            fi[u + 1] = INSERT_EMISSION * (m[1] * fi1[v10] + m[4] * fi1[v10 + 1]);
            fi[u + 2] = m[2] * fi[v01] + m[8] * fi[v01 + 2];
            sum += fi[u] + fi[u + 1] + fi[u + 2];
        }
        s[i as usize] = sum;
        let first = band_offset(bw, i, beg) as usize;
        let last = band_offset(bw, i, end) as usize + 2;
        for x in fi[first..=last].iter_mut() {
            *x /= sum;
        }
    }
    {
        let mut sum = 0.0;
        for k in 1..=l_ref {
            let u = band_offset(bw, l_query, k);
            if !in_band(u) {
                continue;
            }
            let u = u as usize;
            sum += f[lq][u] * s_m + f[lq][u + 1] * s_i;
        }
        s[lq + 1] = sum;
    }

    // Backward
    for k in 1..=l_ref {
        let u = band_offset(bw, l_query, k);
        if !in_band(u) {
            continue;
        }
        let u = u as usize;
        b[lq][u] = s_m / s[lq] / s[lq + 1];
        b[lq][u + 1] = s_i / s[lq] / s[lq + 1];
    }
    for i in (1..l_query).rev() {
        let (cur, next) = b.split_at_mut(i as usize + 1);
        let bi = &mut cur[i as usize];
        let bi1 = &next[0];
        let (beg, end) = band_range(i);
        let y = if i > 1 { 1.0 } else { 0.0 };
        let query_next = query[i as usize + 1];
        let error_next = error_probs[i as usize + 1];
        for k in (beg..=end).rev() {
            let u = band_offset(bw, i, k) as usize;
            let v11 = band_offset(bw, i + 1, k + 1) as usize;
            let v10 = band_offset(bw, i + 1, k) as usize;
            let v01 = band_offset(bw, i, k + 1) as usize;
            let em = if k >= l_ref {
                0.0
            } else {
                match_emission(reference[k as usize + 1], query_next, error_next) * bi1[v11]
            };
            bi[u] = em * m[0] + INSERT_EMISSION * m[1] * bi1[v10 + 1] + m[2] * bi[v01 + 2];
            bi[u + 1] = em * m[3] + INSERT_EMISSION * m[4] * bi1[v10 + 1];
            bi[u + 2] = (em * m[6] + m[8] * bi[v01 + 2]) * y;
        }
        let first = band_offset(bw, i, beg) as usize;
        let last = band_offset(bw, i, end) as usize + 2;
        let scale = 1.0 / s[i as usize];
        for x in bi[first..=last].iter_mut() {
            *x *= scale;
        }
    }

    // Maximum posterior state of each query base
    (1..=l_query)
        .map(|i| {
            let fi = &f[i as usize];
            let bi = &b[i as usize];
            let (beg, end) = band_range(i);
            let mut sum = 0.0;
            let mut max = 0.0;
            let mut state = None;
            for k in beg..=end {
                let u = band_offset(bw, i, k) as usize;
                let z = fi[u] * bi[u];
                if z > max {
                    max = z;
                    state = Some(AlignState::Match(k as usize - 1));
                }
                sum += z;
                let z = fi[u + 1] * bi[u + 1];
                if z > max {
                    max = z;
                    state = Some(AlignState::Insert(k as usize - 1));
                }
                sum += z;
            }
            if sum <= 0.0 || !sum.is_finite() {
                return BasePosterior { state: None, qual: 0 };
            }
            let posterior = max / sum;
            let qual = error_prob_to_phred(1.0 - posterior)
                .round()
                .min(MAX_HMM_QUAL as f64);
            BasePosterior {
                state,
                qual: qual as u8,
            }
        })
        .collect()
}

/// Get the reference windows to recalibrate for a candidate
///
/// Windows are taken from the confident blocks containing at least one marker. Blocks larger than
/// `window_size` are tiled into windows of at most `window_size` starting from their markers.
///
pub fn get_baq_windows(
    candidate: &AlignmentCandidate,
    marker_positions: &[usize],
    window_size: i64,
) -> Vec<IntRange> {
    let mut windows = Vec::new();
    for block in candidate.conf_blocks.iter() {
        let mut marker_ref_positions = marker_positions
            .iter()
            .filter(|&&x| block.read_range.intersect_pos(x as i64))
            .filter_map(|&x| candidate.ref_pos_at(x))
            .filter(|&x| block.ref_range.intersect_pos(x))
            .collect::<Vec<_>>();
        if marker_ref_positions.is_empty() {
            continue;
        }
        if block.ref_range.size() <= window_size {
            windows.push(block.ref_range);
            continue;
        }

        marker_ref_positions.sort();
        let mut covered_end = i64::MIN;
        for pos in marker_ref_positions {
            if pos < covered_end {
                continue;
            }
            let min_start = block.ref_range.start.max(covered_end);
            let start = (pos - window_size / 2).max(min_start);
            let end = (start + window_size).min(block.ref_range.end);
            let start = (end - window_size).max(min_start);
            windows.push(IntRange::from_pair(start, end));
            covered_end = end;
        }
    }
    windows
}

/// Recalibrate the base qualities of one reference window of the candidate
///
fn recalibrate_window(candidate: &mut AlignmentCandidate, window: &IntRange, params: &BaqParams) {
    let Some(read_range) = get_read_range_for_ref_range(&candidate.read_to_ref, window) else {
        return;
    };

    // Pad the reference window so that the HMM can shift the read
    let pad = (params.bandwidth / 2) as i64;
    let ref_window = IntRange::from_pair(
        (window.start - pad).max(candidate.ref_start),
        (window.end + pad).min(candidate.ref_end),
    );

    let read_start = read_range.start as usize;
    let read_end = read_range.end as usize;
    let ref_offset = (ref_window.start - candidate.ref_start) as usize;
    let ref_seq = &candidate.ref_seq[ref_offset..ref_offset + ref_window.size() as usize];

    let posteriors = glocal_forward_backward(
        ref_seq,
        &candidate.seq[read_start..read_end],
        &candidate.qual[read_start..read_end],
        params.gap_open,
        params.gap_ext,
        params.bandwidth,
    );

    for (aln_index, posterior) in (read_start..read_end).zip(posteriors) {
        let Some(ref_pos) = candidate.read_to_ref[aln_index] else {
            continue;
        };
        let expected_index = (ref_pos - ref_window.start) as usize;
        candidate.qual[aln_index] = match posterior.state {
            Some(AlignState::Match(x)) if x == expected_index => posterior.qual.min(params.init_q),
            _ => 0,
        };
    }
}

/// Reset all candidate base qualities to `init_q`, then recalibrate the bases within the confident
/// block windows around the markers
///
pub fn apply_baq(candidate: &mut AlignmentCandidate, marker_positions: &[usize], params: &BaqParams) {
    candidate.qual.fill(params.init_q);
    let windows = get_baq_windows(candidate, marker_positions, params.window_size);
    for window in windows.iter() {
        recalibrate_window(candidate, window, params);
    }
}
