use crate::store::StoreError;
use crate::wxr::ParseError;
use std::path::PathBuf;
use thiserror::Error;

/// Run-level failures. Image and markup problems never surface here; they become warnings.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Staged file {path} is no longer available ({reason}). Stage it again.")]
    SelectionMismatch { path: PathBuf, reason: String },
}
