//! Per-image failures. None of these abort a post; each collapses to an [`AssetStatus`].

use crate::model::AssetStatus;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid image URL: {url}")]
    InvalidUrl { url: String },

    #[error("Unsupported image type '{filename}' at {url}")]
    UnsupportedType { url: String, filename: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Cannot create temporary file for {url}: {source}")]
    TempFile {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image at {url} is corrupt: {reason}")]
    Corrupt { url: String, reason: String },

    #[error("Could not store image from {url}: {source}")]
    Persist {
        url: String,
        #[source]
        source: StoreError,
    },
}

impl FetchError {
    pub fn status(&self) -> AssetStatus {
        match self {
            FetchError::InvalidUrl { .. } | FetchError::UnsupportedType { .. } => {
                AssetStatus::UnsupportedType
            }
            FetchError::Network { .. }
            | FetchError::HttpStatus { .. }
            | FetchError::TempFile { .. } => AssetStatus::DownloadFailed,
            FetchError::Corrupt { .. } => AssetStatus::Corrupt,
            FetchError::Persist { .. } => AssetStatus::PersistFailed,
        }
    }
}
