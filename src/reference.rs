//! Reference sequence lookup
//!

use std::collections::HashMap;

use log::info;
use rust_htslib::faidx;
use simple_error::{SimpleError, SimpleResult, bail};

use crate::int_range::IntRange;

/// Contig name and length from the reference index
///
#[derive(Clone, Debug)]
pub struct Contig {
    pub label: String,
    pub length: i64,
}

#[derive(Clone, Debug, Default)]
pub struct ContigList {
    pub data: Vec<Contig>,
    pub label_to_index: HashMap<String, usize>,
}

impl ContigList {
    pub fn add_contig(&mut self, label: &str, length: i64) {
        assert!(!self.label_to_index.contains_key(label));
        self.label_to_index.insert(label.to_string(), self.data.len());
        self.data.push(Contig {
            label: label.to_string(),
            length,
        });
    }

    pub fn get_contig_length(&self, label: &str) -> Option<i64> {
        self.label_to_index.get(label).map(|&x| self.data[x].length)
    }
}

/// Random access to reference sequence by contig interval
///
pub trait ReferenceLookup {
    fn contigs(&self) -> &ContigList;

    /// Fetch the upper-case reference sequence for the half-open interval `range` on `contig`
    ///
    fn fetch(&self, contig: &str, range: &IntRange) -> SimpleResult<Vec<u8>>;
}

/// Check that `range` is a valid non-empty interval on `contig`
///
fn check_fetch_range(contigs: &ContigList, contig: &str, range: &IntRange) -> SimpleResult<()> {
    let length = match contigs.get_contig_length(contig) {
        Some(x) => x,
        None => bail!("Contig '{contig}' is not found in the reference"),
    };
    if range.start < 0 || range.end > length || range.is_empty() {
        bail!("Invalid reference interval {range:?} requested on contig '{contig}' of length {length}");
    }
    Ok(())
}

/// Reference lookup backed by an indexed FASTA file
///
pub struct IndexedReference {
    reader: faidx::Reader,
    contigs: ContigList,
}

impl IndexedReference {
    pub fn from_path(filename: &str) -> SimpleResult<Self> {
        info!("Reading reference genome index from file '{filename}'");

        let reader = faidx::Reader::from_path(filename)
            .map_err(|e| SimpleError::with(&format!("Unable to open reference fasta file: '{filename}'"), e))?;
        let names = reader.seq_names().map_err(|e| {
            SimpleError::with(&format!("Unable to read contig names from reference: '{filename}'"), e)
        })?;

        let mut contigs = ContigList::default();
        for name in names.iter() {
            let length = reader.fetch_seq_len(name) as i64;
            contigs.add_contig(name, length);
        }

        info!("Found {} contigs in reference", contigs.data.len());
        Ok(Self { reader, contigs })
    }
}

impl ReferenceLookup for IndexedReference {
    fn contigs(&self) -> &ContigList {
        &self.contigs
    }

    fn fetch(&self, contig: &str, range: &IntRange) -> SimpleResult<Vec<u8>> {
        check_fetch_range(&self.contigs, contig, range)?;

        // htslib uses an inclusive end coordinate
        let seq = self
            .reader
            .fetch_seq(contig, range.start as usize, (range.end - 1) as usize)
            .map_err(|e| {
                SimpleError::with(&format!("Failed to fetch reference interval {contig}:{range:?}"), e)
            })?;
        if seq.len() != range.size() as usize {
            bail!(
                "Reference fetch for {contig}:{range:?} returned {} bases",
                seq.len()
            );
        }
        Ok(seq.to_ascii_uppercase())
    }
}

/// In-memory reference lookup
///
#[cfg(test)]
#[derive(Default)]
pub struct GenomeRef {
    pub chroms: HashMap<String, Vec<u8>>,
    contigs: ContigList,
}

#[cfg(test)]
impl GenomeRef {
    pub fn add_contig(&mut self, label: &str, seq: &[u8]) {
        self.contigs.add_contig(label, seq.len() as i64);
        self.chroms.insert(label.to_string(), seq.to_ascii_uppercase());
    }
}

#[cfg(test)]
impl ReferenceLookup for GenomeRef {
    fn contigs(&self) -> &ContigList {
        &self.contigs
    }

    fn fetch(&self, contig: &str, range: &IntRange) -> SimpleResult<Vec<u8>> {
        check_fetch_range(&self.contigs, contig, range)?;
        let seq = &self.chroms[contig];
        Ok(seq[range.start as usize..range.end as usize].to_vec())
    }
}
