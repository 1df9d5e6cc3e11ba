//! Shared helpers for unit tests
//!

use rust_htslib::bam::{self, Header, HeaderView, header};

use crate::alignment::AlignmentCandidate;
use crate::cigar_utils::get_cigar_from_string;
use crate::reference::{GenomeRef, ReferenceLookup};

pub const TEST_CHROM_SEQ: &[u8] = b"GCTAAAGACAATTACATAACATACACGTCAGCACGAAACTTGTTGGCCCAGTGTGAATCG\
CTTAAGGGTTAAGTAAGTGTGATGCATACGCCTTTACTTGCTGTGTCCACCCCATCGGAC\
TGGCATTTTTATTACACTCAGAAACAGAACTCGGGTAATTTTGACAGGTCACGCAGAGGC\
GCGCCCTCCTGAAGTGCGTGGACACTCGCTATGAATCTCTGATTTACCCACTCTGCCAAA";

/// Reference with two identical contigs "chr1" and "chr2", and a distinct contig "chr3"
///
pub fn get_test_reference() -> GenomeRef {
    let mut genome_ref = GenomeRef::default();
    genome_ref.add_contig("chr1", TEST_CHROM_SEQ);
    genome_ref.add_contig("chr2", TEST_CHROM_SEQ);
    let chr3 = TEST_CHROM_SEQ.iter().rev().copied().collect::<Vec<_>>();
    genome_ref.add_contig("chr3", &chr3);
    genome_ref
}

pub fn get_test_header<R: ReferenceLookup>(reference: &R) -> HeaderView {
    let mut _header = Header::new();
    for contig in reference.contigs().data.iter() {
        _header.push_record(
            header::HeaderRecord::new(b"SQ")
                .push_tag(b"SN", &contig.label)
                .push_tag(b"LN", contig.length),
        );
    }
    HeaderView::from_header(&_header)
}

/// Build read sequence for the given alignment that exactly matches the reference
///
/// Inserted bases are set to 'T' and soft-clipped bases to 'G'
///
fn get_ref_matching_seq(ref_seq: &[u8], pos: i64, cigar_str: &str) -> String {
    use rust_htslib::bam::record::Cigar::*;

    let mut seq = Vec::new();
    let mut ref_pos = pos as usize;
    for c in get_cigar_from_string(cigar_str) {
        match c {
            Match(len) | Equal(len) | Diff(len) => {
                seq.extend_from_slice(&ref_seq[ref_pos..ref_pos + len as usize]);
                ref_pos += len as usize;
            }
            Del(len) | RefSkip(len) => {
                ref_pos += len as usize;
            }
            Ins(len) => seq.extend(std::iter::repeat_n(b'T', len as usize)),
            SoftClip(len) => seq.extend(std::iter::repeat_n(b'G', len as usize)),
            _ => {}
        }
    }
    String::from_utf8(seq).unwrap()
}

/// Build a bam record from SAM fields. If `seq` is None, the read sequence matches the reference.
///
/// All base qualities are set to 40.
///
pub fn get_test_record(
    reference: &GenomeRef,
    qname: &str,
    flag: u16,
    contig: &str,
    pos: i64,
    cigar_str: &str,
    seq: Option<&str>,
) -> bam::Record {
    let header = get_test_header(reference);
    let seq = match seq {
        Some(x) => x.to_string(),
        None => get_ref_matching_seq(&reference.chroms[contig], pos, cigar_str),
    };
    let qual = "I".repeat(seq.len());
    let sam_line = format!(
        "{qname}\t{flag}\t{contig}\t{}\t60\t{cigar_str}\t*\t0\t0\t{seq}\t{qual}",
        pos + 1
    );
    bam::Record::from_sam(&header, sam_line.as_bytes()).unwrap()
}

/// Build an alignment candidate from SAM fields, see [`get_test_record`]
///
pub fn get_test_candidate(
    reference: &GenomeRef,
    qname: &str,
    flag: u16,
    contig: &str,
    pos: i64,
    cigar_str: &str,
    seq: Option<&str>,
) -> AlignmentCandidate {
    let header = get_test_header(reference);
    let record = get_test_record(reference, qname, flag, contig, pos, cigar_str, seq);
    AlignmentCandidate::from_record(&record, &header, reference).unwrap()
}

/// Replace the read base at the given alignment index of every listed candidate
///
pub fn set_read_base(candidates: &mut [AlignmentCandidate], indexes: &[usize], aln_index: usize, base: u8) {
    for &i in indexes {
        candidates[i].seq[aln_index] = base;
    }
}
