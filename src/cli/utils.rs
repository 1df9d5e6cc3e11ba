use camino::Utf8Path;
use simple_error::{SimpleResult, bail};

/// Check that an input file option names an existing regular file
///
/// `option` is the command-line option the filename was given with, for error messages.
///
pub fn check_input_file(filename: &str, option: &str) -> SimpleResult<()> {
    if filename.is_empty() {
        bail!("{option} requires a filename");
    }
    match Utf8Path::new(filename).metadata() {
        Ok(x) if x.is_file() => Ok(()),
        Ok(_) => bail!("{option} path is not a regular file: '{filename}'"),
        Err(e) => bail!("Can't access {option} file '{filename}': {e}"),
    }
}

/// Check that a probability option is in the open interval (0,1)
///
pub fn check_probability(value: f64, label: &str) -> SimpleResult<()> {
    if !(value > 0.0 && value < 1.0) {
        bail!("{label} must be greater than 0 and less than 1, found {value}");
    }
    Ok(())
}
