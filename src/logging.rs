//! Tracing subscriber setup.
//!
//! stdout is reserved for answers, so diagnostics never go there. `RUST_LOG`
//! overrides the default `info` level.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const APP_DIR: &str = "chinook-ask";
const LOG_NAME: &str = "chinook-ask.log";

/// Where diagnostics are written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// Picks the target from the `--log-file` flag.
    pub fn from_flag(log_file: bool) -> Self {
        if log_file {
            Self::File(log_path())
        } else {
            Self::Stderr
        }
    }
}

/// Installs the global subscriber. A log file that cannot be opened degrades
/// to stderr with a warning.
pub fn init(target: LogTarget) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match target {
        LogTarget::Stderr => builder.with_writer(io::stderr).init(),
        LogTarget::File(path) => match open_log_file(&path) {
            Ok(file) => builder.with_writer(file).with_ansi(false).init(),
            Err(e) => {
                eprintln!("Warning: logging to stderr, {}: {e}", path.display());
                builder.with_writer(io::stderr).init();
            }
        },
    }
}

/// Creates the parent directory and truncates the file for this run.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)
}

/// State directory on Linux, config directory elsewhere, temp as last resort.
pub fn log_path() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::config_dir)
        .map(|base| base.join(APP_DIR).join(LOG_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_NAME))
}
