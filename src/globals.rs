pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");
