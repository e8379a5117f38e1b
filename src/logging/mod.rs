//! Logging for the balancer binary
//!
//! - Bracketed event formatting
//! - Dual output (file + stdout)
//! - Timestamped log files

mod formatter;
mod setup;

pub use formatter::BracketedFormatter;
pub use setup::{default_log_dir, setup_logging, DEFAULT_FILTER};
