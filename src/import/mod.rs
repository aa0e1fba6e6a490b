//! Two-step import: [`stage`] builds a reviewable selection, [`Importer::commit`] replays it
//! into the destination store.
//!
//! Both steps parse the source file independently. A document-level parse failure aborts
//! before anything is written; image and markup problems only produce warnings.

mod error;
mod report;

pub use error::ImportError;
pub use report::{ImportReport, ImportWarning, Totals};

use crate::assets::{AssetFetcher, Downloader};
use crate::config::ImportConfig;
use crate::model::{ImportSelection, ParsedPost, ParsedTerm, PostStatus, PostType, StagedPost};
use crate::rewrite::{rewrite_content, strip_tags};
use crate::store::{AssetStore, BookStore, NewRecord, RecordId, StoreError};
use crate::structure;
use crate::wxr;
use std::collections::HashSet;
use std::path::Path;

/// MIME type recorded for staged WXR files.
pub const WXR_MIME_TYPE: &str = "application/xml";

/// Parse `path` and list the posts that can be imported, all of them selected.
pub fn stage(path: &Path, config: &ImportConfig) -> Result<ImportSelection, ImportError> {
    let doc = wxr::parse_file(path)?;
    let (posts, own_format) = book_order(doc.posts, config);

    let staged: Vec<StagedPost> = posts
        .into_iter()
        .filter(|p| config.is_supported(&p.post_type))
        .filter(|p| {
            let placeholder = config.is_placeholder(&p.content);
            if placeholder {
                tracing::debug!(post = %p.id, "Skipping placeholder content");
            }
            !placeholder
        })
        .map(|p| StagedPost {
            title: strip_tags(&p.title),
            id: p.id,
            post_type: p.post_type,
        })
        .collect();
    tracing::info!(
        file = %path.display(),
        own_format,
        staged = staged.len(),
        "Staged import"
    );

    let source_file = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    Ok(ImportSelection {
        source_file,
        mime_type: WXR_MIME_TYPE.to_string(),
        selected_ids: staged.iter().map(|p| p.id.clone()).collect(),
        staged,
        type_overrides: Default::default(),
        default_status: PostStatus::default(),
    })
}

/// Canonical book order for self-produced exports; file order otherwise.
/// The flag says which one was applied.
fn book_order(posts: Vec<ParsedPost>, config: &ImportConfig) -> (Vec<ParsedPost>, bool) {
    if structure::is_own_format(&posts) {
        (structure::sort_book_order(&posts, &config.custom_post_types), true)
    } else {
        (posts, false)
    }
}

/// Chapter parent assignment, folded over posts in book order.
///
/// A chapter goes under the most recently created part; chapters seen before any part
/// get the store's default parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentTracker {
    current_part: Option<RecordId>,
}

impl ParentTracker {
    pub fn new(default_parent: Option<RecordId>) -> Self {
        Self {
            current_part: default_parent,
        }
    }

    pub fn parent_for(&self, post_type: &PostType) -> Option<RecordId> {
        match post_type {
            PostType::Chapter => self.current_part,
            _ => None,
        }
    }

    /// State after `created` of type `post_type` has been stored.
    pub fn after(self, post_type: &PostType, created: RecordId) -> Self {
        match post_type {
            PostType::Part => Self {
                current_part: Some(created),
            },
            _ => self,
        }
    }
}

/// Replays a staged selection into a book store. Image downloads go through `downloader`
/// and land in `assets`.
pub struct Importer<'a> {
    config: &'a ImportConfig,
    store: &'a mut dyn BookStore,
    assets: &'a mut dyn AssetStore,
    downloader: &'a mut dyn Downloader,
    progress: Option<&'a dyn Fn(u32, u32)>,
}

impl<'a> Importer<'a> {
    pub fn new(
        config: &'a ImportConfig,
        store: &'a mut dyn BookStore,
        assets: &'a mut dyn AssetStore,
        downloader: &'a mut dyn Downloader,
    ) -> Self {
        Self {
            config,
            store,
            assets,
            downloader,
            progress: None,
        }
    }

    /// Called with (posts done, posts to import) after each post.
    pub fn with_progress(mut self, progress: &'a dyn Fn(u32, u32)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Import the selected posts. The selection is consumed; stage again to re-import.
    pub fn commit(&mut self, selection: ImportSelection) -> Result<ImportReport, ImportError> {
        if selection.mime_type != WXR_MIME_TYPE {
            return Err(ImportError::SelectionMismatch {
                path: selection.source_file,
                reason: format!("unexpected type {}", selection.mime_type),
            });
        }
        if !selection.source_file.is_file() {
            return Err(ImportError::SelectionMismatch {
                path: selection.source_file,
                reason: "file not found".to_string(),
            });
        }

        let doc = wxr::parse_file(&selection.source_file)?;
        let (posts, _) = book_order(doc.posts, self.config);

        import_terms(&mut *self.store, &doc.terms)?;

        let queue: Vec<(&ParsedPost, PostType)> = posts
            .iter()
            .filter(|p| selection.is_staged(&p.id) && selection.is_selected(&p.id))
            .filter_map(|p| selection.effective_type(&p.id).map(|t| (p, t)))
            .collect();
        let total = queue.len() as u32;
        tracing::info!(
            file = %selection.source_file.display(),
            posts = total,
            "Committing import"
        );

        let mut report = ImportReport::default();
        let mut fetcher = AssetFetcher::new(&mut *self.downloader, &mut *self.assets);
        let mut parents = ParentTracker::new(self.store.default_chapter_parent());

        for (done, (post, post_type)) in queue.into_iter().enumerate() {
            let outcome = rewrite_content(&post.content, &mut fetcher);
            report.collect(&post.id, &outcome);

            let id = if post_type == PostType::Metadata {
                self.store.get_or_create_metadata_record()?
            } else {
                let title = strip_tags(&post.title);
                let id = self.store.create_record(NewRecord {
                    post_type: &post_type,
                    title: &title,
                    content: (post_type != PostType::Part).then_some(outcome.html.as_str()),
                    parent: parents.parent_for(&post_type),
                    status: status_for(&post_type, selection.default_status),
                })?;
                parents = parents.after(&post_type, id);
                id
            };
            tracing::debug!(post = %post.id, record = %id, post_type = %post_type, "Imported post");

            if self.config.is_supported(&post_type) {
                associate_terms(&mut *self.store, self.config, id, post)?;
            }
            propagate_meta(&mut *self.store, self.config, id, &post_type, post)?;
            self.store.reorder_record(id)?;
            report.totals.add(&post_type);

            if let Some(progress) = self.progress {
                progress(done as u32 + 1, total);
            }
        }

        tracing::info!(
            images = fetcher.cached(),
            warnings = report.warnings.len(),
            "{}",
            report.totals
        );
        Ok(report)
    }
}

fn status_for(post_type: &PostType, default_status: PostStatus) -> PostStatus {
    match post_type {
        PostType::Part => PostStatus::Publish,
        _ => default_status,
    }
}

/// Create every term the store does not know yet. Existing terms are left alone.
fn import_terms(store: &mut dyn BookStore, terms: &[ParsedTerm]) -> Result<(), StoreError> {
    let mut created = 0;
    for term in terms {
        if store.term_exists(&term.name, &term.taxonomy) {
            continue;
        }
        store.create_term(term)?;
        created += 1;
    }
    tracing::debug!(created, known = terms.len() - created, "Imported terms");
    Ok(())
}

fn associate_terms(
    store: &mut dyn BookStore,
    config: &ImportConfig,
    id: RecordId,
    post: &ParsedPost,
) -> Result<(), StoreError> {
    let mut domains: Vec<&str> = Vec::new();
    let mut seen = HashSet::new();
    for t in &post.terms {
        if config.allows_taxonomy(&t.domain) && seen.insert(t.domain.as_str()) {
            domains.push(&t.domain);
        }
    }
    for domain in domains {
        let slugs: Vec<&str> = post
            .terms
            .iter()
            .filter(|t| t.domain == domain)
            .map(|t| t.slug.as_str())
            .collect();
        store.associate_terms(id, &slugs, domain)?;
    }
    Ok(())
}

/// Metadata posts replace every prefixed key on the book record; other posts copy the
/// configured keys.
fn propagate_meta(
    store: &mut dyn BookStore,
    config: &ImportConfig,
    id: RecordId,
    post_type: &PostType,
    post: &ParsedPost,
) -> Result<(), StoreError> {
    if post.meta.is_empty() {
        return Ok(());
    }
    if *post_type == PostType::Metadata {
        let prefix = config.metadata_key_prefix.as_str();
        store.clear_meta_by_prefix(id, prefix)?;
        for m in post.meta.iter().filter(|m| m.key.starts_with(prefix)) {
            store.set_record_meta(id, &m.key, &m.value, config.is_multi_valued(&m.key))?;
        }
    } else {
        for key in &config.post_meta_keys {
            if let Some(value) = post.meta_value(key) {
                store.set_record_meta(id, key, value, false)?;
            }
        }
    }
    Ok(())
}
