//! Store provisioning.
//!
//! Guarantees that a local copy of the store file exists before a query runs.
//! The check happens at startup and again before every execution; a store
//! that cannot be provisioned is fatal for the process.

use crate::error::{AskError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// How the store file came to be available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provisioned {
    /// The file was already at the target path.
    AlreadyPresent,
    /// The file was copied from the given source.
    CopiedFrom(PathBuf),
}

/// Ensures the store file exists at `path`, copying it from `source` if needed.
pub fn ensure_store(path: &Path, source: Option<&Path>) -> Result<Provisioned> {
    if path.is_file() {
        return Ok(Provisioned::AlreadyPresent);
    }

    let Some(source) = source else {
        error!("Store not found at {} and no source configured", path.display());
        return Err(AskError::provision(format!(
            "Store not found at {} and no source is configured. Use --source or set store.source.",
            path.display()
        )));
    };

    if !source.is_file() {
        error!(
            "Local database not found at {}. Please ensure the path is correct.",
            source.display()
        );
        return Err(AskError::provision(format!(
            "Source database not found at {}",
            source.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AskError::provision(format!(
                "Failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    fs::copy(source, path).map_err(|e| {
        AskError::provision(format!(
            "Failed to copy {} to {}: {e}",
            source.display(),
            path.display()
        ))
    })?;

    info!(
        "Database copied from {} to {} successfully.",
        source.display(),
        path.display()
    );
    Ok(Provisioned::CopiedFrom(source.to_path_buf()))
}

/// Makes the store file available before a connection is opened.
pub trait StoreProvisioner: Send + Sync {
    /// Ensures the store exists. An error here is fatal for the process.
    fn ensure(&self) -> Result<Provisioned>;
}

/// Provisions a store file at `path` from an optional `source` copy.
#[derive(Debug, Clone)]
pub struct FileProvisioner {
    path: PathBuf,
    source: Option<PathBuf>,
}

impl FileProvisioner {
    pub fn new(path: impl Into<PathBuf>, source: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

impl StoreProvisioner for FileProvisioner {
    fn ensure(&self) -> Result<Provisioned> {
        ensure_store(&self.path, self.source.as_deref())
    }
}
