//! Track stats for the whole run
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use thousands::Separable;
use unwrap::unwrap;

use crate::cli::PipelineConfig;
use crate::group::GroupRejectionCounts;
use crate::marker_pipeline::MarkerOutcome;

#[derive(Default, Deserialize, Serialize)]
pub struct MarkerDeferralCounts {
    pub no_markers: usize,
    pub no_qualified_markers: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct PrimaryChangeCounts {
    pub edit_distance: usize,
    pub marker_score: usize,

    /// Changes made by random selection among near-tied candidates, included in the method counts
    pub randomized: usize,
}

#[derive(Default, Deserialize, Serialize)]
pub struct GroupStats {
    pub alignment_records: usize,
    pub unmapped_records: usize,

    /// Count of read groups
    pub reads: usize,

    pub rejected_groups: GroupRejectionCounts,
    pub edit_distance_groups: usize,
    pub marker_groups: usize,
    pub marker_deferrals: MarkerDeferralCounts,
    pub primary_changes: PrimaryChangeCounts,
}

impl GroupStats {
    pub fn add_marker_outcome(&mut self, outcome: &MarkerOutcome) {
        match outcome {
            MarkerOutcome::Scored { .. } => {}
            MarkerOutcome::NoMarkers => self.marker_deferrals.no_markers += 1,
            MarkerOutcome::NoQualifiedMarkers => self.marker_deferrals.no_qualified_markers += 1,
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Processed {} alignment records in {} reads",
            self.alignment_records.separate_with_commas(),
            self.reads.separate_with_commas()
        );
        info!(
            "Skipped {} reads with alignment groups which can't be scored",
            self.rejected_groups.total().separate_with_commas()
        );
        info!(
            "Scored {} reads by edit distance and {} reads by markers",
            self.edit_distance_groups.separate_with_commas(),
            self.marker_groups.separate_with_commas()
        );
        info!(
            "Changed primary alignment for {} reads by edit distance and {} reads by marker score",
            self.primary_changes.edit_distance.separate_with_commas(),
            self.primary_changes.marker_score.separate_with_commas()
        );
    }
}

#[derive(Deserialize, Serialize)]
pub struct RunStats {
    pub group_stats: GroupStats,
    pub config: PipelineConfig,
    pub total_runtime_secs: f64,
}

/// Write run_stats structure out in json format
pub fn write_run_stats(filename: &Utf8Path, run_stats: &RunStats) {
    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &run_stats),
        "Unable to write run statistics json file: '{filename}'"
    );
}
