mod alignment;
mod baq;
mod cigar_utils;
mod cli;
mod confident_blocks;
mod correct_primary;
mod decision_log;
mod edit_distance;
mod globals;
mod group;
mod int_range;
mod logger;
mod marker_pipeline;
mod markers;
mod prob_utils;
mod read_to_ref_map;
mod reference;
mod run_stats;
mod selection;
mod variant_blocks;

#[cfg(test)]
mod test_utils;

use std::{error, process};

use camino::Utf8PathBuf;
use hhmmss::Hhmmss;
use log::info;
use unwrap::unwrap;

use crate::cli::{PipelineConfig, Settings};
use crate::correct_primary::{RUN_STATS_SUFFIX, run_correct_primary};
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::{create_output_prefix_dir, setup_logger};
use crate::run_stats::{RunStats, write_run_stats};

fn run(settings: &Settings, config: &PipelineConfig) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );

    let start = std::time::Instant::now();

    let group_stats = run_correct_primary(settings, config)?;

    let run_stats = RunStats {
        group_stats,
        config: config.clone(),
        total_runtime_secs: start.elapsed().as_secs_f64(),
    };
    let filename = Utf8PathBuf::from(settings.get_output_filename(RUN_STATS_SUFFIX));
    write_run_stats(&filename, &run_stats);

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::parse_settings();
    let config = cli::validate_settings(&settings);

    if let Err(err) = create_output_prefix_dir(&settings.prefix) {
        eprintln!("{err}");
        process::exit(2);
    }
    unwrap!(setup_logger(settings.debug), "Unable to initialize logger");

    if let Err(err) = run(&settings, &config) {
        eprintln!("{err}");
        process::exit(2);
    }
}
