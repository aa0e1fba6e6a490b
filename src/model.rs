//! Data model for a parsed WXR export and the import run built on top of it.
//!
//! The parser produces a [`ParsedDocument`]; staging turns it into an
//! [`ImportSelection`]; the asset fetcher reports one [`RewrittenAsset`] per image URL.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

/// Content type of a post. Book-structural types are named; anything else
/// (`post`, `page`, plugin types) is carried as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PostType {
    FrontMatter,
    Chapter,
    Part,
    BackMatter,
    Metadata,
    Other(String),
}

impl PostType {
    pub fn as_str(&self) -> &str {
        match self {
            PostType::FrontMatter => "front-matter",
            PostType::Chapter => "chapter",
            PostType::Part => "part",
            PostType::BackMatter => "back-matter",
            PostType::Metadata => "metadata",
            PostType::Other(s) => s,
        }
    }

    /// True for the closed set of types that make up a book's structure.
    pub fn is_structural(&self) -> bool {
        !matches!(self, PostType::Other(_))
    }
}

impl From<&str> for PostType {
    fn from(s: &str) -> Self {
        match s {
            "front-matter" => PostType::FrontMatter,
            "chapter" => PostType::Chapter,
            "part" => PostType::Part,
            "back-matter" => PostType::BackMatter,
            "metadata" => PostType::Metadata,
            other => PostType::Other(other.to_string()),
        }
    }
}

impl From<String> for PostType {
    fn from(s: String) -> Self {
        PostType::from(s.as_str())
    }
}

impl From<PostType> for String {
    fn from(t: PostType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One `<wp:postmeta>` entry. Keys may repeat within a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

/// A `<category domain=".." nicename="..">` reference on an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRef {
    pub slug: String,
    pub domain: String,
}

/// One `<item>` of the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPost {
    pub id: String,
    pub post_type: PostType,
    pub title: String,
    /// Raw HTML fragment from `content:encoded`.
    pub content: String,
    pub excerpt: String,
    pub parent_id: Option<String>,
    pub order: i64,
    pub status: String,
    pub slug: String,
    pub meta: Vec<MetaEntry>,
    pub terms: Vec<TermRef>,
}

impl ParsedPost {
    /// First non-empty value stored under `key`, if any.
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|m| m.key == key && !m.value.is_empty())
            .map(|m| m.value.as_str())
    }
}

/// A taxonomy term declared at channel level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTerm {
    pub name: String,
    pub taxonomy: String,
    pub description: String,
    pub slug: String,
}

/// Whole export, in file order. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub title: String,
    pub base_site_url: Option<String>,
    pub wxr_version: String,
    pub posts: Vec<ParsedPost>,
    pub terms: Vec<ParsedTerm>,
}

/// Publication status given to created records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    #[default]
    Draft,
    Private,
    Pending,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Publish => "publish",
            PostStatus::Draft => "draft",
            PostStatus::Private => "private",
            PostStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "publish" | "published" => Some(PostStatus::Publish),
            "draft" => Some(PostStatus::Draft),
            "private" => Some(PostStatus::Private),
            "pending" => Some(PostStatus::Pending),
            _ => None,
        }
    }
}

/// A post that survived staging, kept for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedPost {
    pub id: String,
    pub title: String,
    pub post_type: PostType,
}

/// The operator's choice of what to import from a staged file. Consumed by one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSelection {
    pub source_file: PathBuf,
    pub mime_type: String,
    /// Posts eligible for import, in staged (sorted) order.
    pub staged: Vec<StagedPost>,
    pub selected_ids: HashSet<String>,
    #[serde(default)]
    pub type_overrides: HashMap<String, PostType>,
    #[serde(default)]
    pub default_status: PostStatus,
}

impl ImportSelection {
    pub fn is_staged(&self, id: &str) -> bool {
        self.staged.iter().any(|p| p.id == id)
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_ids.contains(id)
    }

    /// Declared type for `id`: override first, then the type recorded at staging.
    pub fn effective_type(&self, id: &str) -> Option<PostType> {
        if let Some(t) = self.type_overrides.get(id) {
            return Some(t.clone());
        }
        self.staged
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.post_type.clone())
    }

    /// Keep only the given ids selected.
    pub fn select_only<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let keep: HashSet<&str> = ids.into_iter().collect();
        self.selected_ids.retain(|id| keep.contains(id.as_str()));
    }

    pub fn deselect<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        for id in ids {
            self.selected_ids.remove(id);
        }
    }
}

/// Outcome of one image fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetStatus {
    Ok,
    UnsupportedType,
    DownloadFailed,
    Corrupt,
    PersistFailed,
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetStatus::Ok => "ok",
            AssetStatus::UnsupportedType => "unsupported type",
            AssetStatus::DownloadFailed => "download failed",
            AssetStatus::Corrupt => "corrupt",
            AssetStatus::PersistFailed => "could not be stored",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenAsset {
    pub source_url: String,
    /// Present only when `status` is `Ok`.
    pub local_reference: Option<String>,
    pub status: AssetStatus,
}

impl RewrittenAsset {
    pub fn ok(source_url: &str, local_reference: String) -> Self {
        Self {
            source_url: source_url.to_string(),
            local_reference: Some(local_reference),
            status: AssetStatus::Ok,
        }
    }

    pub fn failed(source_url: &str, status: AssetStatus) -> Self {
        Self {
            source_url: source_url.to_string(),
            local_reference: None,
            status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AssetStatus::Ok && self.local_reference.is_some()
    }
}
