//! Collaborator interfaces the importer writes through, plus reference implementations.
//!
//! The importer never touches storage directly: records and terms go through
//! [`ContentStore`] and [`TermStore`], downloaded images through [`AssetStore`].

mod dir;
mod memory;

pub use dir::{BookDir, MediaDir};
pub use memory::{MemoryStore, Record, StoredTerm};

use crate::model::{ParsedTerm, PostStatus, PostType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identifier of a record created in the destination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown record {0}.")]
    UnknownRecord(RecordId),

    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid book file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fields of a record about to be created.
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub post_type: &'a PostType,
    pub title: &'a str,
    /// `None` for records that carry no body (parts).
    pub content: Option<&'a str>,
    pub parent: Option<RecordId>,
    pub status: PostStatus,
}

pub trait ContentStore {
    fn create_record(&mut self, record: NewRecord<'_>) -> Result<RecordId, StoreError>;

    /// The single book-level metadata record, created on first use.
    fn get_or_create_metadata_record(&mut self) -> Result<RecordId, StoreError>;

    /// Multi-valued keys append; single-valued keys replace every existing value.
    fn set_record_meta(
        &mut self,
        id: RecordId,
        key: &str,
        value: &str,
        multivalued: bool,
    ) -> Result<(), StoreError>;

    fn clear_meta_by_prefix(&mut self, id: RecordId, prefix: &str) -> Result<(), StoreError>;

    /// Append `slugs` to the record's terms in `taxonomy`.
    fn associate_terms(
        &mut self,
        id: RecordId,
        slugs: &[&str],
        taxonomy: &str,
    ) -> Result<(), StoreError>;

    /// Post-insert consolidation hook.
    fn reorder_record(&mut self, id: RecordId) -> Result<(), StoreError>;

    /// Parent given to chapters that are imported before any part.
    fn default_chapter_parent(&self) -> Option<RecordId> {
        None
    }
}

pub trait TermStore {
    fn term_exists(&self, name: &str, taxonomy: &str) -> bool;
    fn create_term(&mut self, term: &ParsedTerm) -> Result<(), StoreError>;
}

/// A destination holding both records and terms.
pub trait BookStore: ContentStore + TermStore {}

impl<T: ContentStore + TermStore> BookStore for T {}

pub trait AssetStore {
    /// Copy the file at `temp_path` into durable storage as `filename` and return its reference.
    fn persist(&mut self, temp_path: &Path, filename: &str) -> Result<String, StoreError>;
}
