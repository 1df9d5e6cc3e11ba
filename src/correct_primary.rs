//! Correct the primary alignment assignment of every read in an alignment file
//!

use std::error;
use std::io::Write;

use camino::Utf8PathBuf;
use log::{debug, info};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_htslib::bam::{self, Read};
use simple_error::{SimpleError, SimpleResult};

use crate::alignment::AlignmentCandidate;
use crate::cli::{PipelineConfig, Settings};
use crate::decision_log::{DecisionLogWriter, DecisionMethod};
use crate::edit_distance::{get_min_score_index, score_by_edit_distance};
use crate::group::{
    GroupRejection, RecordGroup, RecordGroupCollector, ScoringPath, check_record_group,
    get_group_candidates, get_primary_index, route_group,
};
use crate::marker_pipeline::{MarkerOutcome, score_by_markers};
use crate::reference::{IndexedReference, ReferenceLookup};
use crate::run_stats::GroupStats;
use crate::selection::{SelectionDecision, SelectionPolicy};
use crate::variant_blocks::{VariantRefBlocks, get_variant_ref_blocks};

pub const DECISION_LOG_SUFFIX: &str = "out.log";
pub const VARIANT_BLOCKS_BED_SUFFIX: &str = "variant_ref_blocks.bed";
pub const RUN_STATS_SUFFIX: &str = "run_stats.json";

/// Move the primary assignment from `old_primary_index` to `new_primary_index`
///
fn change_primary(candidates: &mut [AlignmentCandidate], old_primary_index: usize, new_primary_index: usize) {
    candidates[old_primary_index].is_primary = false;
    candidates[new_primary_index].is_primary = true;
    debug_assert_eq!(candidates.iter().filter(|x| x.is_primary).count(), 1);
}

/// Primary change decisions for a stream of record groups
///
pub struct PrimaryCorrector<'a, R, G, W: Write> {
    header: &'a bam::HeaderView,
    reference: &'a R,
    variant_ref_blocks: &'a VariantRefBlocks,
    config: &'a PipelineConfig,
    policy: SelectionPolicy,
    rng: G,
    decision_log: DecisionLogWriter<W>,
    pub stats: GroupStats,
}

impl<'a, R, G, W> PrimaryCorrector<'a, R, G, W>
where
    R: ReferenceLookup,
    G: Rng,
    W: Write,
{
    pub fn new(
        header: &'a bam::HeaderView,
        reference: &'a R,
        variant_ref_blocks: &'a VariantRefBlocks,
        config: &'a PipelineConfig,
        rng: G,
        decision_log: DecisionLogWriter<W>,
    ) -> Self {
        Self {
            header,
            reference,
            variant_ref_blocks,
            config,
            policy: config.selection_policy(),
            rng,
            decision_log,
            stats: GroupStats::default(),
        }
    }

    /// Decide whether to change the primary alignment of one read, and log any change
    ///
    /// Returns the new primary index if the primary alignment changed.
    ///
    pub fn process_group(&mut self, group: &RecordGroup) -> SimpleResult<Option<usize>> {
        self.stats.reads += 1;
        self.stats.alignment_records += group.record_count;

        if let Err(rejection) = check_record_group(group) {
            debug!("Skipping read '{}': {rejection}", group.read_name);
            self.stats.rejected_groups.add(rejection);
            return Ok(None);
        }

        let mut candidates = get_group_candidates(group, self.header, self.reference)?;
        let primary_index = match get_primary_index(&candidates) {
            Some(x) => x,
            None => {
                self.stats.rejected_groups.add(GroupRejection::PrimaryCount);
                return Ok(None);
            }
        };

        let (method, new_primary_index) = match route_group(&candidates, self.variant_ref_blocks) {
            ScoringPath::EditDistance => {
                self.stats.edit_distance_groups += 1;
                score_by_edit_distance(&mut candidates, self.variant_ref_blocks);
                (DecisionMethod::EditDistance, get_min_score_index(&candidates))
            }
            ScoringPath::Marker => {
                self.stats.marker_groups += 1;
                let outcome = score_by_markers(&mut candidates, self.config);
                self.stats.add_marker_outcome(&outcome);
                if !matches!(outcome, MarkerOutcome::Scored { .. }) {
                    debug!("No marker score for read '{}': {outcome:?}", group.read_name);
                    return Ok(None);
                }

                let scores = candidates.iter().map(|x| x.score).collect::<Vec<_>>();
                match self.policy.select(&scores, primary_index, &mut self.rng) {
                    SelectionDecision::Selected { index, randomized } => {
                        if randomized && index != primary_index {
                            self.stats.primary_changes.randomized += 1;
                        }
                        (DecisionMethod::MarkerScore, index)
                    }
                    SelectionDecision::NoChange => {
                        return Ok(None);
                    }
                }
            }
        };

        if new_primary_index == primary_index {
            return Ok(None);
        }

        change_primary(&mut candidates, primary_index, new_primary_index);
        match method {
            DecisionMethod::EditDistance => self.stats.primary_changes.edit_distance += 1,
            DecisionMethod::MarkerScore => self.stats.primary_changes.marker_score += 1,
        }
        self.decision_log.write_decision(
            method,
            &group.read_name,
            &candidates,
            primary_index,
            new_primary_index,
        );
        Ok(Some(new_primary_index))
    }

    /// Process every group from the collector, stopping at the first record read failure
    ///
    pub fn process_groups<I>(&mut self, collector: &mut RecordGroupCollector<I>) -> SimpleResult<()>
    where
        I: Iterator<Item = Result<bam::Record, rust_htslib::errors::Error>>,
    {
        for group in collector.by_ref() {
            self.process_group(&group?)?;
        }
        self.stats.unmapped_records = collector.unmapped_record_count;
        self.decision_log.flush();
        Ok(())
    }

    #[cfg(test)]
    fn into_decision_log(self) -> W {
        self.decision_log.into_inner()
    }
}

/// Run primary alignment correction over the whole alignment file
///
pub fn run_correct_primary(
    settings: &Settings,
    config: &PipelineConfig,
) -> Result<GroupStats, Box<dyn error::Error>> {
    let reference = IndexedReference::from_path(&settings.ref_filename)?;

    let variant_ref_blocks = match &settings.vcf_filename {
        Some(filename) => get_variant_ref_blocks(filename, reference.contigs(), config.min_variant_margin)?,
        None => VariantRefBlocks::default(),
    };
    if variant_ref_blocks.is_empty() {
        info!("No variant reference blocks, all reads will be scored by markers");
    }
    if config.debug {
        let filename = Utf8PathBuf::from(settings.get_output_filename(VARIANT_BLOCKS_BED_SUFFIX));
        variant_ref_blocks.write_bed(&filename, reference.contigs());
    }

    let decision_log_filename = Utf8PathBuf::from(settings.get_output_filename(DECISION_LOG_SUFFIX));
    let decision_log = DecisionLogWriter::from_path(&decision_log_filename);

    info!("Reading alignments from file '{}'", settings.bam_filename);
    let mut reader = bam::Reader::from_path(&settings.bam_filename).map_err(|e| {
        SimpleError::with(
            &format!("Unable to open alignment file: '{}'", settings.bam_filename),
            e,
        )
    })?;
    let header = reader.header().clone();

    let rng = StdRng::seed_from_u64(config.seed);
    let mut corrector = PrimaryCorrector::new(
        &header,
        &reference,
        &variant_ref_blocks,
        config,
        rng,
        decision_log,
    );
    let mut collector = RecordGroupCollector::new(reader.records());
    corrector.process_groups(&mut collector)?;

    corrector.stats.log_summary();
    Ok(corrector.stats)
}
