//! Error kinds for the configuration mutation core.
//!
//! The orchestration layer (mutators, CLI) works with `anyhow` and converts
//! at the boundary; the parsers, the disk resolver and the backup store
//! return these typed kinds so callers can tell "nothing to merge" apart
//! from "refuse to touch this system".

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TuneError {
    /// An expected config file is absent. Often non-fatal: mutators treat
    /// this as "nothing to merge".
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    /// A file could not be read or decoded at all. Fatal to the mutator
    /// that needed it, never to the whole run.
    #[error("unreadable config file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// No node in the block-device tree is mounted at `/`.
    #[error("root filesystem not found in the block device tree")]
    RootNotFound,

    /// The root filesystem sits somewhere the resolver refuses to guess
    /// about (raw disk, LVM stack). Aborts the disk operation only.
    #[error("unsupported disk topology: {0}")]
    UnsupportedTopology(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A post-write reload action failed. Callers downgrade this to a
    /// warning; the written file stays in place.
    #[error("reload action failed: {0}")]
    ReloadFailed(String),
}

pub type Result<T> = std::result::Result<T, TuneError>;

impl TuneError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        TuneError::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
