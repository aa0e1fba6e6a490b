//! What a commit did: per-type totals plus the problems it swallowed.

use crate::model::{AssetStatus, PostType};
use crate::rewrite::RewriteOutcome;
use serde::Serialize;
use std::fmt;

/// Records created per type. Metadata is never counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub front_matter: u32,
    pub parts: u32,
    pub chapters: u32,
    pub back_matter: u32,
    /// Posts, pages and custom types.
    pub other: u32,
}

impl Totals {
    pub fn add(&mut self, post_type: &PostType) {
        match post_type {
            PostType::FrontMatter => self.front_matter += 1,
            PostType::Part => self.parts += 1,
            PostType::Chapter => self.chapters += 1,
            PostType::BackMatter => self.back_matter += 1,
            PostType::Metadata => {}
            PostType::Other(_) => self.other += 1,
        }
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Imported {} front matter, {}, {}, and {} back matter.",
            self.front_matter,
            plural(self.parts, "part"),
            plural(self.chapters, "chapter"),
            self.back_matter
        )
    }
}

fn plural(n: u32, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ImportWarning {
    BrokenImage {
        post_id: String,
        url: String,
        status: AssetStatus,
    },
    Markup {
        post_id: String,
        message: String,
    },
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportWarning::BrokenImage {
                post_id,
                url,
                status,
            } => write!(f, "post {}: image {} {}", post_id, url, status),
            ImportWarning::Markup { post_id, message } => {
                write!(f, "post {}: markup: {}", post_id, message)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub totals: Totals,
    pub warnings: Vec<ImportWarning>,
}

impl ImportReport {
    /// Keep the broken images and markup errors of one rewritten post.
    pub fn collect(&mut self, post_id: &str, outcome: &RewriteOutcome) {
        for image in outcome.broken_images() {
            tracing::warn!(post = post_id, url = %image.source_url, status = %image.status, "Broken image");
            self.warnings.push(ImportWarning::BrokenImage {
                post_id: post_id.to_string(),
                url: image.source_url.clone(),
                status: image.status,
            });
        }
        if !outcome.markup_errors.is_empty() {
            tracing::warn!(
                post = post_id,
                errors = outcome.markup_errors.len(),
                "Recovered from malformed markup"
            );
        }
        self.warnings
            .extend(outcome.markup_errors.iter().map(|m| ImportWarning::Markup {
                post_id: post_id.to_string(),
                message: m.clone(),
            }));
    }

    pub fn broken_images(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, ImportWarning::BrokenImage { .. }))
            .count()
    }
}
