//! Text log of primary alignment changes
//!

use std::fs::File;
use std::io::{BufWriter, Write};

use camino::Utf8Path;
use log::info;
use strum::Display;
use unwrap::unwrap;

use crate::alignment::AlignmentCandidate;

/// Scoring path which produced a primary change
///
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum DecisionMethod {
    #[strum(serialize = "EDIT DISTANCE")]
    EditDistance,

    #[strum(serialize = "MARKER SCORE")]
    MarkerScore,
}

pub struct DecisionLogWriter<W: Write> {
    writer: W,
    label: String,
}

impl DecisionLogWriter<BufWriter<File>> {
    pub fn from_path(filename: &Utf8Path) -> Self {
        info!("Writing primary alignment changes to file: '{filename}'");
        let f = unwrap!(
            File::create(filename),
            "Unable to create primary change log file: '{filename}'"
        );
        Self::new(BufWriter::new(f), filename.as_str())
    }
}

impl<W: Write> DecisionLogWriter<W> {
    pub fn new(writer: W, label: &str) -> Self {
        Self {
            writer,
            label: label.to_string(),
        }
    }

    /// Write one primary change entry, with one row per candidate in group order
    ///
    /// Rows are marked '*' for the demoted primary, '@' for the promoted candidate, and '!' for all
    /// other candidates.
    ///
    pub fn write_decision(
        &mut self,
        method: DecisionMethod,
        read_name: &str,
        candidates: &[AlignmentCandidate],
        old_primary_index: usize,
        new_primary_index: usize,
    ) {
        let label = &self.label;
        let f = &mut self.writer;
        unwrap!(
            writeln!(f, "#{method}\n$\t{read_name}"),
            "Unable to write to primary change log file: '{label}'"
        );
        for (index, candidate) in candidates.iter().enumerate() {
            let marker = if index == old_primary_index {
                '*'
            } else if index == new_primary_index {
                '@'
            } else {
                '!'
            };
            // Marker scores are reported as the non-negative marker penalty
            let score = match method {
                DecisionMethod::EditDistance => format!("{:.2}", candidate.score),
                DecisionMethod::MarkerScore => format!("{}", (-candidate.score) as i64),
            };
            unwrap!(
                writeln!(
                    f,
                    "{marker}\t{score}\t{}\t{}\t{}",
                    candidate.contig,
                    candidate.ref_start,
                    candidate.rfe.unwrap_or(-1)
                ),
                "Unable to write to primary change log file: '{label}'"
            );
        }
        unwrap!(
            writeln!(f),
            "Unable to write to primary change log file: '{label}'"
        );
    }

    pub fn flush(&mut self) {
        let label = &self.label;
        unwrap!(
            self.writer.flush(),
            "Unable to write to primary change log file: '{label}'"
        );
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}
