//! Error taxonomy (spec.md §7). Transactional-state misuse, corruption, I/O,
//! and validation are distinguishable variants rather than one opaque error,
//! so callers can branch on `AlreadyInTransaction` vs `CorruptSegment`.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("a writer is already active for this index")]
    AlreadyInTransaction,

    #[error("no active transaction on this session")]
    NotInTransaction,

    #[error("corrupt segment {path}: {reason}")]
    CorruptSegment { path: PathBuf, reason: String },

    #[error("corrupt manifest {path}: {reason}")]
    CorruptManifest { path: PathBuf, reason: String },

    #[error("invalid attribute {name:?}: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn corrupt_segment(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptSegment {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt_manifest(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptManifest {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_attribute(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
