//! Reference blocks anchored on phased heterozygous variant pairs
//!

use std::collections::HashMap;

use camino::Utf8Path;
use itertools::Itertools;
use log::info;
use rust_htslib::bcf::{self, Read, record::GenotypeAllele};
use simple_error::{SimpleError, SimpleResult, bail};
use unwrap::unwrap;

use crate::int_range::{IntRange, merge_ranges};
use crate::reference::ContigList;

/// The subset of variant record content used to build variant blocks
///
#[derive(Clone, Debug)]
pub struct VariantRecord {
    pub contig: String,

    /// Zero-indexed variant position
    pub pos: i64,

    pub is_phased_het: bool,
}

/// Reference blocks for all contigs, each contig's blocks sorted and non-overlapping
///
#[derive(Default)]
pub struct VariantRefBlocks {
    blocks: HashMap<String, Vec<IntRange>>,
}

impl VariantRefBlocks {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.values().map(|x| x.len()).sum()
    }

    /// All blocks on `contig` intersecting `range`
    ///
    pub fn find_overlaps(&self, contig: &str, range: &IntRange) -> &[IntRange] {
        let contig_blocks = match self.blocks.get(contig) {
            Some(x) => x,
            None => return &[],
        };
        let first = contig_blocks.partition_point(|x| x.end <= range.start);
        let last = contig_blocks.partition_point(|x| x.start < range.end);
        if first >= last {
            &[]
        } else {
            &contig_blocks[first..last]
        }
    }

    /// Return true if `range` on `contig` intersects any block
    ///
    pub fn intersect(&self, contig: &str, range: &IntRange) -> bool {
        !self.find_overlaps(contig, range).is_empty()
    }

    /// Write all blocks in BED format, ordered by the contig order of `contigs`
    ///
    pub fn write_bed(&self, filename: &Utf8Path, contigs: &ContigList) {
        use std::fs::File;
        use std::io::{BufWriter, Write};

        info!("Writing variant reference blocks to bed file: '{filename}'");

        let f = unwrap!(
            File::create(filename),
            "Unable to create variant reference blocks bed file: '{filename}'"
        );
        let mut f = BufWriter::new(f);

        for contig in contigs.data.iter() {
            if let Some(contig_blocks) = self.blocks.get(&contig.label) {
                for block in contig_blocks.iter() {
                    unwrap!(
                        writeln!(f, "{}\t{}\t{}", contig.label, block.start, block.end),
                        "Unable to write to variant reference blocks bed file: '{filename}'"
                    );
                }
            }
        }
    }
}

/// Build the variant reference blocks for every contig
///
/// For each adjacent pair of phased heterozygous variants on a contig, a block spans from `margin`
/// before the left variant to `margin` after the right variant, clamped to the contig bounds.
/// Overlapping or abutting blocks are merged.
///
pub fn extract_variant_ref_blocks(
    variants: &[VariantRecord],
    contigs: &ContigList,
    margin: i64,
) -> SimpleResult<VariantRefBlocks> {
    let mut contig_positions: HashMap<&str, Vec<i64>> = HashMap::new();
    for variant in variants.iter().filter(|x| x.is_phased_het) {
        contig_positions
            .entry(variant.contig.as_str())
            .or_default()
            .push(variant.pos);
    }

    let mut variant_ref_blocks = VariantRefBlocks::default();
    for (contig, mut positions) in contig_positions {
        let contig_length = match contigs.get_contig_length(contig) {
            Some(x) => x,
            None => bail!("Variant contig '{contig}' is not found in the reference"),
        };
        positions.sort_unstable();

        let contig_blocks = positions
            .iter()
            .tuple_windows()
            .map(|(&left, &right)| {
                IntRange::from_pair((left - margin).max(0), (right + margin).min(contig_length))
            })
            .collect::<Vec<_>>();

        let contig_blocks = merge_ranges(contig_blocks);
        if !contig_blocks.is_empty() {
            variant_ref_blocks
                .blocks
                .insert(contig.to_string(), contig_blocks);
        }
    }

    Ok(variant_ref_blocks)
}

/// Return true if the genotype is diploid, heterozygous and phased
///
/// htslib represents phasing on the second allele of a diploid genotype, so "0|1" has an unphased
/// first allele and a phased second allele.
///
pub fn is_phased_het_genotype(alleles: &[GenotypeAllele]) -> bool {
    if alleles.len() != 2 {
        return false;
    }
    if !matches!(alleles[1], GenotypeAllele::Phased(_)) {
        return false;
    }
    match (alleles[0].index(), alleles[1].index()) {
        (Some(a0), Some(a1)) => a0 != a1,
        _ => false,
    }
}

/// Read every record of a VCF/BCF file, classifying the first sample's genotype
///
pub fn read_variant_records(filename: &str, contigs: &ContigList) -> SimpleResult<Vec<VariantRecord>> {
    info!("Reading phased variants from file '{filename}'");

    let mut reader = bcf::Reader::from_path(filename)
        .map_err(|e| SimpleError::with(&format!("Unable to open variant file: '{filename}'"), e))?;

    let rid_to_contig = {
        let header = reader.header();
        let mut x = Vec::new();
        for rid in 0..header.contig_count() {
            let contig_bytes = header.rid2name(rid).map_err(|e| {
                SimpleError::with(&format!("Invalid contig header in variant file: '{filename}'"), e)
            })?;
            x.push(String::from_utf8_lossy(contig_bytes).to_string());
        }
        x
    };

    let mut variants = Vec::new();
    for (record_index, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            SimpleError::with(
                &format!("Failed to parse variant record {} in file: '{filename}'", record_index + 1),
                e,
            )
        })?;

        let rid = match record.rid() {
            Some(x) => x as usize,
            None => bail!("Variant record {} has no contig in file: '{filename}'", record_index + 1),
        };
        let contig = match rid_to_contig.get(rid) {
            Some(x) => x.clone(),
            None => bail!("Variant record {} has an unknown contig in file: '{filename}'", record_index + 1),
        };
        if contigs.get_contig_length(&contig).is_none() {
            bail!("Variant record contig '{contig}' is not found in the reference: '{filename}'");
        }

        let genotypes = record.genotypes().map_err(|e| {
            SimpleError::with(
                &format!("Variant record {} has no genotype in file: '{filename}'", record_index + 1),
                e,
            )
        })?;
        let is_phased_het = is_phased_het_genotype(&genotypes.get(0));

        variants.push(VariantRecord {
            contig,
            pos: record.pos(),
            is_phased_het,
        });
    }

    let phased_het_count = variants.iter().filter(|x| x.is_phased_het).count();
    info!(
        "Read {} variant records, {phased_het_count} of which are phased heterozygous",
        variants.len()
    );

    Ok(variants)
}

/// Read the phased variant file and build the variant reference blocks from it
///
pub fn get_variant_ref_blocks(
    filename: &str,
    contigs: &ContigList,
    margin: i64,
) -> SimpleResult<VariantRefBlocks> {
    let variants = read_variant_records(filename, contigs)?;
    let variant_ref_blocks = extract_variant_ref_blocks(&variants, contigs, margin)?;
    info!(
        "Built {} variant reference blocks",
        variant_ref_blocks.block_count()
    );
    Ok(variant_ref_blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_contigs() -> ContigList {
        let mut contigs = ContigList::default();
        contigs.add_contig("chr1", 1000);
        contigs.add_contig("chr2", 500);
        contigs
    }

    fn variant(contig: &str, pos: i64, is_phased_het: bool) -> VariantRecord {
        VariantRecord {
            contig: contig.to_string(),
            pos,
            is_phased_het,
        }
    }

    #[test]
    fn test_extract_variant_ref_blocks() {
        let contigs = get_test_contigs();
        let variants = vec![
            variant("chr1", 100, true),
            variant("chr1", 150, false),
            variant("chr1", 200, true),
            variant("chr1", 600, true),
            variant("chr1", 980, true),
            variant("chr2", 20, true),
            variant("chr2", 30, false),
        ];

        let blocks = extract_variant_ref_blocks(&variants, &contigs, 50).unwrap();

        // chr1 pairs: (100,200) -> [50,250), (200,600) -> [150,650), (600,980) -> [550,1000)
        // all merge into a single block. chr2 has a single phased variant so no block.
        assert_eq!(blocks.block_count(), 1);
        assert_eq!(
            blocks.find_overlaps("chr1", &IntRange::from_pair(0, 1000)),
            &[IntRange::from_pair(50, 1000)]
        );
        assert!(!blocks.intersect("chr2", &IntRange::from_pair(0, 500)));
    }

    #[test]
    fn test_extract_variant_ref_blocks_clamped() {
        let contigs = get_test_contigs();
        let variants = vec![variant("chr2", 10, true), variant("chr2", 490, true)];

        let blocks = extract_variant_ref_blocks(&variants, &contigs, 50).unwrap();
        assert_eq!(
            blocks.find_overlaps("chr2", &IntRange::from_pair(0, 500)),
            &[IntRange::from_pair(0, 500)]
        );
    }

    #[test]
    fn test_extract_variant_ref_blocks_unknown_contig() {
        let contigs = get_test_contigs();
        let variants = vec![variant("chr3", 10, true), variant("chr3", 20, true)];
        assert!(extract_variant_ref_blocks(&variants, &contigs, 50).is_err());
    }

    #[test]
    fn test_find_overlaps() {
        let contigs = get_test_contigs();
        let variants = vec![
            variant("chr1", 100, true),
            variant("chr1", 110, true),
            variant("chr1", 500, true),
            variant("chr1", 510, true),
        ];
        let blocks = extract_variant_ref_blocks(&variants, &contigs, 5).unwrap();

        // Pair blocks [95,115), [105,505) and [495,515) chain into one merged block
        assert_eq!(blocks.block_count(), 1);

        let variants = vec![
            variant("chr1", 100, true),
            variant("chr1", 110, true),
            variant("chr1", 300, false),
            variant("chr1", 500, false),
        ];
        let blocks = extract_variant_ref_blocks(&variants, &contigs, 5).unwrap();
        assert!(blocks.intersect("chr1", &IntRange::from_pair(114, 200)));
        assert!(!blocks.intersect("chr1", &IntRange::from_pair(115, 200)));
        assert!(!blocks.intersect("chr1", &IntRange::from_pair(0, 95)));
        assert!(blocks.intersect("chr1", &IntRange::from_pair(0, 96)));
    }

    #[test]
    fn test_is_phased_het_genotype() {
        use GenotypeAllele::*;
        assert!(is_phased_het_genotype(&[Unphased(0), Phased(1)]));
        assert!(is_phased_het_genotype(&[Unphased(1), Phased(2)]));
        assert!(!is_phased_het_genotype(&[Unphased(0), Unphased(1)]));
        assert!(!is_phased_het_genotype(&[Unphased(1), Phased(1)]));
        assert!(!is_phased_het_genotype(&[Unphased(0), PhasedMissing]));
        assert!(!is_phased_het_genotype(&[Unphased(1)]));
    }

    #[test]
    fn test_read_variant_records() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let vcf_path = dir.path().join("phased.vcf");
        {
            let mut f = std::fs::File::create(&vcf_path).unwrap();
            writeln!(f, "##fileformat=VCFv4.2").unwrap();
            writeln!(f, "##contig=<ID=chr1,length=1000>").unwrap();
            writeln!(
                f,
                "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"
            )
            .unwrap();
            writeln!(f, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1").unwrap();
            writeln!(f, "chr1\t101\t.\tA\tC\t50\tPASS\t.\tGT\t0|1").unwrap();
            writeln!(f, "chr1\t151\t.\tA\tC\t50\tPASS\t.\tGT\t0/1").unwrap();
            writeln!(f, "chr1\t201\t.\tG\tT\t50\tPASS\t.\tGT\t1|0").unwrap();
            writeln!(f, "chr1\t301\t.\tG\tT\t50\tPASS\t.\tGT\t1|1").unwrap();
        }

        let contigs = get_test_contigs();
        let variants = read_variant_records(vcf_path.to_str().unwrap(), &contigs).unwrap();
        assert_eq!(variants.len(), 4);
        assert_eq!(
            variants.iter().map(|x| x.is_phased_het).collect::<Vec<_>>(),
            vec![true, false, true, false]
        );
        assert_eq!(variants[0].pos, 100);

        let blocks = extract_variant_ref_blocks(&variants, &contigs, 50).unwrap();
        assert_eq!(
            blocks.find_overlaps("chr1", &IntRange::from_pair(0, 1000)),
            &[IntRange::from_pair(50, 250)]
        );
    }
}
