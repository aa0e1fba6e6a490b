//! Document-level parse failures. Any of these aborts staging or commit before a record is written.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Cannot read export file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("This does not appear to be a WXR file: {reason}")]
    NotWxr { reason: String },

    #[error("This does not appear to be a WXR file: missing or invalid WXR version number.")]
    MissingWxrVersion,

    #[error("Item {index} has no <wp:post_id>.")]
    MissingPostId { index: usize },

    #[error("Document ended before <{name}> was closed.")]
    UnclosedElement { name: String },
}
