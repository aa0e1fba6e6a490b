//! Remote image harvesting. Downloads each distinct image URL at most once per run,
//! checks that the bytes really are an image, and hands the file to the asset store.

mod client;
mod error;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::FetchError;

use crate::model::{AssetStatus, RewrittenAsset};
use crate::store::AssetStore;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Raster extensions accepted for import.
const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "gif", "png"];

/// Characters dropped from downloaded file names.
const SPECIAL_CHARS: &[char] = &[
    '?', '[', ']', '/', '\\', '=', '<', '>', ':', ';', ',', '\'', '"', '&', '$', '#', '*', '(',
    ')', '|', '~', '`', '!', '{', '}', '%', '+', '\u{2019}', '\u{ab}', '\u{bb}', '\u{201d}',
    '\u{201c}', '\0',
];

/// Source of image bytes. Implemented by [`PoliteClient`]; tests substitute their own.
pub trait Downloader {
    /// Write the body at `url` into `dest`, returning the byte count.
    fn download(&mut self, url: &str, dest: &mut File) -> Result<u64, FetchError>;
}

/// Something that can turn an image URL into a local reference.
pub trait ImageResolver {
    fn resolve(&mut self, url: &str) -> RewrittenAsset;
}

/// Image formats recognised from their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageKind::Jpeg)
        } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageKind::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageKind::Gif)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
        }
    }

    fn matches_extension(&self, ext: &str) -> bool {
        match self {
            ImageKind::Jpeg => ext == "jpg" || ext == "jpeg",
            ImageKind::Png => ext == "png",
            ImageKind::Gif => ext == "gif",
        }
    }
}

/// Per-run image fetcher. The cache lives and dies with this value.
pub struct AssetFetcher<'a> {
    downloader: &'a mut dyn Downloader,
    store: &'a mut dyn AssetStore,
    cache: HashMap<String, RewrittenAsset>,
}

impl<'a> AssetFetcher<'a> {
    pub fn new(downloader: &'a mut dyn Downloader, store: &'a mut dyn AssetStore) -> Self {
        Self {
            downloader,
            store,
            cache: HashMap::new(),
        }
    }

    /// Fetch `url`, or return the result of an earlier fetch of the identical string.
    pub fn fetch(&mut self, url: &str) -> RewrittenAsset {
        if let Some(hit) = self.cache.get(url) {
            tracing::debug!(url, status = %hit.status, "image cache hit");
            return hit.clone();
        }

        let parsed = match parse_image_url(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!("{}", e);
                return RewrittenAsset::failed(url, AssetStatus::UnsupportedType);
            }
        };

        let asset = match self.fetch_uncached(url, &parsed) {
            Ok(reference) => {
                tracing::debug!(url, reference = %reference, "image imported");
                RewrittenAsset::ok(url, reference)
            }
            Err(e) => {
                tracing::warn!("{}", e);
                RewrittenAsset::failed(url, e.status())
            }
        };
        self.cache.insert(url.to_string(), asset.clone());
        asset
    }

    /// Number of distinct URLs that reached the cache.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn fetch_uncached(&mut self, url: &str, parsed: &Url) -> Result<String, FetchError> {
        let filename = image_filename(parsed);
        if !has_allowed_extension(&filename) {
            return Err(FetchError::UnsupportedType {
                url: url.to_string(),
                filename,
            });
        }

        // Removed when dropped, whichever way this function returns.
        let mut tmp = tempfile::NamedTempFile::new().map_err(|e| FetchError::TempFile {
            url: url.to_string(),
            source: e,
        })?;
        self.downloader.download(url, tmp.as_file_mut())?;

        let filename = validated_filename(tmp.path(), filename, url)?;

        self.store
            .persist(tmp.path(), &filename)
            .map_err(|e| FetchError::Persist {
                url: url.to_string(),
                source: e,
            })
    }
}

impl ImageResolver for AssetFetcher<'_> {
    fn resolve(&mut self, url: &str) -> RewrittenAsset {
        self.fetch(url)
    }
}

/// Absolute URL with a host; anything else is not fetchable.
fn parse_image_url(url: &str) -> Result<Url, FetchError> {
    let invalid = || FetchError::InvalidUrl {
        url: url.to_string(),
    };
    let parsed = Url::parse(url.trim()).map_err(|_| invalid())?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    Ok(parsed)
}

/// Last path segment, percent-decoded and sanitized. The query string never contributes.
pub fn image_filename(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let decoded = percent_decode_str(last).decode_utf8_lossy();
    sanitize_file_name(&decoded)
}

/// Strip characters that are unsafe in file names and collapse whitespace into dashes.
pub fn sanitize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if SPECIAL_CHARS.contains(&c) {
            continue;
        }
        if c.is_whitespace() || c == '-' {
            if !last_dash {
                out.push('-');
            }
            last_dash = true;
        } else {
            out.push(c);
            last_dash = false;
        }
    }
    out.trim_matches(|c| c == '.' || c == '-' || c == '_')
        .to_string()
}

fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

fn has_allowed_extension(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

fn sniff_file(path: &Path) -> std::io::Result<Option<ImageKind>> {
    let mut header = [0u8; 8];
    let mut file = File::open(path)?;
    let mut read = 0;
    while read < header.len() {
        let n = file.read(&mut header[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    Ok(ImageKind::sniff(&header[..read]))
}

fn is_valid_image(path: &Path, filename: &str) -> std::io::Result<bool> {
    let kind = sniff_file(path)?;
    Ok(match (kind, extension_of(filename)) {
        (Some(k), Some(ext)) => k.matches_extension(&ext),
        _ => false,
    })
}

/// Rename `filename` so its extension matches what the bytes really are.
fn proper_image_extension(path: &Path, filename: &str, url: &str) -> Result<String, FetchError> {
    let corrupt = |reason: String| FetchError::Corrupt {
        url: url.to_string(),
        reason,
    };
    let kind = sniff_file(path)
        .map_err(|e| corrupt(e.to_string()))?
        .ok_or_else(|| corrupt("content is not a JPEG, PNG, or GIF image".to_string()))?;
    let stem = filename
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(filename);
    Ok(format!("{}.{}", stem, kind.extension()))
}

/// Accept the file as-is, or after one extension correction; otherwise it is corrupt.
fn validated_filename(path: &Path, filename: String, url: &str) -> Result<String, FetchError> {
    let check = |name: &str| {
        is_valid_image(path, name).map_err(|e| FetchError::Corrupt {
            url: url.to_string(),
            reason: e.to_string(),
        })
    };
    if check(&filename)? {
        return Ok(filename);
    }
    let corrected = proper_image_extension(path, &filename, url)?;
    if check(&corrected)? {
        tracing::debug!(url, from = %filename, to = %corrected, "corrected image extension");
        Ok(corrected)
    } else {
        Err(FetchError::Corrupt {
            url: url.to_string(),
            reason: "image is corrupt and its extension matches its content type".to_string(),
        })
    }
}
