mod defaults;
mod utils;

use clap::Parser;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail};

use self::defaults::{DEFAULT_PRESET, HIFI_PRESET, MIN_VARIANT_MARGIN, ONT_PRESET, Preset};
use self::utils::{check_input_file, check_probability};
use crate::baq::BaqParams;
use crate::confident_blocks::RefinementParams;
use crate::selection::SelectionPolicy;

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}"
)]
#[clap(rename_all = "kebab_case")]
pub struct Settings {
    /// Alignment file in BAM or SAM format, with all records of each read adjacent
    #[arg(long = "bam", value_name = "FILE")]
    pub bam_filename: String,

    /// Genome reference in FASTA format
    #[arg(long = "ref", value_name = "FILE")]
    pub ref_filename: String,

    /// Phased small variants in VCF or BCF format
    ///
    /// Groups aligned across a block of adjacent phased heterozygous variants are scored by edit
    /// distance. Without this file all groups are scored by markers.
    ///
    #[arg(long = "vcf", value_name = "FILE")]
    pub vcf_filename: Option<String>,

    /// Recalibrate base qualities with a banded pair HMM before marker filtering
    #[arg(long)]
    pub baq: bool,

    /// Gap open probability for base quality recalibration
    #[arg(long, value_name = "PROB")]
    pub gap_open: Option<f64>,

    /// Gap extension probability for base quality recalibration
    #[arg(long, value_name = "PROB")]
    pub gap_ext: Option<f64>,

    /// Band width for base quality recalibration
    #[arg(long)]
    pub bandwidth: Option<usize>,

    /// Refine confident blocks around markers
    #[arg(long)]
    pub consensus: bool,

    /// Minimum indel size which splits confident blocks
    #[arg(long)]
    pub indel_threshold: Option<u32>,

    /// Base quality assigned to all bases before recalibration
    #[arg(long)]
    pub init_q: Option<u8>,

    /// Minimum base quality for a marker to be used
    #[arg(long)]
    pub min_q: Option<u8>,

    /// Minimum score margin for a secondary alignment to become the primary
    #[arg(long, allow_hyphen_values = true)]
    pub prim_margin_score: Option<f64>,

    /// Maximum score margin among alignments for a random primary selection
    #[arg(long, allow_hyphen_values = true)]
    pub prim_margin_random: Option<f64>,

    /// Minimum score of a selected primary alignment
    #[arg(long, allow_hyphen_values = true)]
    pub min_score: Option<f64>,

    /// Use presets for PacBio HiFi reads
    #[arg(long)]
    pub hifi: bool,

    /// Use presets for ONT reads
    #[arg(long)]
    pub ont: bool,

    /// Margin added to both sides of each phased variant pair to build variant blocks
    #[arg(long, default_value_t = MIN_VARIANT_MARGIN)]
    pub min_variant_margin: i64,

    /// Prefix for all output file names
    #[arg(long, default_value = env!("CARGO_PKG_NAME"))]
    pub prefix: String,

    /// Turn on debug logging and write variant blocks in BED format
    #[arg(long)]
    pub debug: bool,

    /// Seed for random primary selection among similarly scored alignments
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Groups spanning more than this reference length have their confident blocks refined until
    /// no alignment's confident blocks cover more than this length
    #[arg(hide = true, long, default_value_t = 5000)]
    pub refine_span_threshold: i64,

    /// Maximum confident block refinement iterations
    #[arg(hide = true, long, default_value_t = 32)]
    pub refine_max_iterations: usize,

    /// Maximum reference size of a single base quality recalibration window
    #[arg(hide = true, long, default_value_t = 1000)]
    pub baq_window_size: i64,
}

impl Settings {
    pub fn get_output_filename(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.prefix)
    }
}

/// Resolved parameters for the whole pipeline, fixed for the run
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub baq: bool,
    pub gap_open: f64,
    pub gap_ext: f64,
    pub bandwidth: usize,
    pub consensus: bool,
    pub indel_threshold: u32,
    pub init_q: u8,
    pub min_q: u8,
    pub prim_margin_score: f64,
    pub prim_margin_random: f64,
    pub min_score: f64,
    pub min_variant_margin: i64,
    pub seed: u64,
    pub refine_span_threshold: i64,
    pub refine_max_iterations: usize,
    pub baq_window_size: i64,
    pub debug: bool,
}

impl PipelineConfig {
    /// Base quality recalibration parameters, if recalibration is enabled
    ///
    pub fn baq_params(&self) -> Option<BaqParams> {
        if !self.baq {
            return None;
        }
        Some(BaqParams {
            gap_open: self.gap_open,
            gap_ext: self.gap_ext,
            bandwidth: self.bandwidth,
            init_q: self.init_q,
            window_size: self.baq_window_size,
        })
    }

    pub fn refinement_params(&self) -> RefinementParams {
        RefinementParams::new(self.refine_span_threshold, self.refine_max_iterations)
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            prim_margin_score: self.prim_margin_score,
            prim_margin_random: self.prim_margin_random,
            min_score: self.min_score,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        from_preset(&DEFAULT_PRESET)
    }
}

fn from_preset(preset: &Preset) -> PipelineConfig {
    PipelineConfig {
        baq: preset.baq,
        gap_open: preset.gap_open,
        gap_ext: preset.gap_ext,
        bandwidth: preset.bandwidth,
        consensus: preset.consensus,
        indel_threshold: preset.indel_threshold,
        init_q: preset.init_q,
        min_q: preset.min_q,
        prim_margin_score: preset.prim_margin_score,
        prim_margin_random: preset.prim_margin_random,
        min_score: preset.min_score,
        min_variant_margin: MIN_VARIANT_MARGIN,
        seed: 0,
        refine_span_threshold: 5000,
        refine_max_iterations: 32,
        baq_window_size: 1000,
        debug: false,
    }
}

/// Resolve each pipeline parameter from the explicit setting if given, then the selected preset,
/// then the default
///
fn resolve_pipeline_config(settings: &Settings) -> SimpleResult<PipelineConfig> {
    let preset = match (settings.hifi, settings.ont) {
        (true, true) => bail!("--hifi and --ont presets can't be used together"),
        (true, false) => &HIFI_PRESET,
        (false, true) => &ONT_PRESET,
        (false, false) => &DEFAULT_PRESET,
    };

    let mut config = from_preset(preset);
    config.baq |= settings.baq;
    config.consensus |= settings.consensus;
    config.gap_open = settings.gap_open.unwrap_or(config.gap_open);
    config.gap_ext = settings.gap_ext.unwrap_or(config.gap_ext);
    config.bandwidth = settings.bandwidth.unwrap_or(config.bandwidth);
    config.indel_threshold = settings.indel_threshold.unwrap_or(config.indel_threshold);
    config.init_q = settings.init_q.unwrap_or(config.init_q);
    config.min_q = settings.min_q.unwrap_or(config.min_q);
    config.prim_margin_score = settings.prim_margin_score.unwrap_or(config.prim_margin_score);
    config.prim_margin_random = settings.prim_margin_random.unwrap_or(config.prim_margin_random);
    config.min_score = settings.min_score.unwrap_or(config.min_score);
    config.min_variant_margin = settings.min_variant_margin;
    config.seed = settings.seed;
    config.refine_span_threshold = settings.refine_span_threshold;
    config.refine_max_iterations = settings.refine_max_iterations;
    config.baq_window_size = settings.baq_window_size;
    config.debug = settings.debug;
    Ok(config)
}

fn check_pipeline_config(config: &PipelineConfig) -> SimpleResult<()> {
    check_probability(config.gap_open, "--gap-open")?;
    check_probability(config.gap_ext, "--gap-ext")?;
    if config.bandwidth == 0 {
        bail!("--bandwidth must be greater than 0");
    }
    if config.indel_threshold == 0 {
        bail!("--indel-threshold must be greater than 0");
    }
    if config.prim_margin_random < 0.0 {
        bail!("--prim-margin-random can't be negative");
    }
    if config.min_variant_margin < 0 {
        bail!("--min-variant-margin can't be negative");
    }
    if config.baq_window_size <= 0 {
        bail!("--baq-window-size must be greater than 0");
    }
    Ok(())
}

/// Validate settings and resolve them into the pipeline configuration
///
/// Assumes that the logger is not setup
///
pub fn validate_settings_impl(settings: &Settings) -> SimpleResult<PipelineConfig> {
    check_input_file(&settings.bam_filename, "--bam")?;
    check_input_file(&settings.ref_filename, "--ref")?;
    if let Some(filename) = &settings.vcf_filename {
        check_input_file(filename, "--vcf")?;
    }
    if settings.prefix.is_empty() {
        bail!("--prefix can't be empty");
    }

    let config = resolve_pipeline_config(settings)?;
    check_pipeline_config(&config)?;
    Ok(config)
}

/// Validate settings and resolve them into the pipeline configuration, exiting the process with a
/// usage error if the settings are invalid
///
pub fn validate_settings(settings: &Settings) -> PipelineConfig {
    match validate_settings_impl(settings) {
        Ok(x) => x,
        Err(msg) => {
            eprintln!("Invalid command-line setting: {msg}");
            std::process::exit(exitcode::USAGE);
        }
    }
}

pub fn parse_settings() -> Settings {
    Settings::parse()
}
