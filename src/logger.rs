//! Logger setup, and creation of the output location the run writes to
//!

use camino::Utf8Path;
use simple_error::{SimpleError, SimpleResult};

use crate::globals::PROGRAM_NAME;

/// Create the directory component of the output prefix, if it has one and it doesn't exist yet
///
/// A bare prefix like "sample1" writes into the working directory and needs nothing created.
///
pub fn create_output_prefix_dir(output_prefix: &str) -> SimpleResult<()> {
    let output_dir = match Utf8Path::new(output_prefix).parent() {
        Some(x) if !x.as_str().is_empty() => x,
        _ => return Ok(()),
    };
    if output_dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(output_dir).map_err(|e| {
        SimpleError::with(
            &format!("Can't create output directory '{output_dir}' for prefix '{output_prefix}'"),
            e,
        )
    })
}

/// Send all log messages to stderr
///
/// Debug messages are only included when `debug` is set.
///
pub fn setup_logger(debug: bool) -> Result<(), fern::InitError> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{PROGRAM_NAME}][{}] {message}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
