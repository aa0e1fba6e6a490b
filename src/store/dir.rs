//! Directory-backed destination: `book.json` for records and terms, `media/` for images.

use super::{AssetStore, MemoryStore, StoreError};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const BOOK_FILE: &str = "book.json";
const SELECTION_FILE: &str = "selection.json";
const MEDIA_DIR: &str = "media";

/// A book persisted in an output directory. Reopening the same directory reuses its terms and records.
#[derive(Debug)]
pub struct BookDir {
    root: PathBuf,
    pub store: MemoryStore,
}

impl BookDir {
    /// Open `root`, loading `book.json` if present. The directory is created if missing.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::Io {
            path: root.clone(),
            source: e,
        })?;
        let book_path = root.join(BOOK_FILE);
        let store = match std::fs::File::open(&book_path) {
            Ok(f) => serde_json::from_reader(std::io::BufReader::new(f)).map_err(|e| {
                StoreError::Json {
                    path: book_path.clone(),
                    source: e,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => {
                return Err(StoreError::Io {
                    path: book_path,
                    source: e,
                })
            }
        };
        Ok(Self { root, store })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn book_path(&self) -> PathBuf {
        self.root.join(BOOK_FILE)
    }

    /// Where a staged selection for this book is kept between `stage` and `commit`.
    pub fn selection_path(&self) -> PathBuf {
        self.root.join(SELECTION_FILE)
    }

    pub fn media(&self, base_url: Option<String>) -> MediaDir {
        MediaDir::new(self.root.join(MEDIA_DIR), base_url)
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.book_path();
        let f = std::fs::File::create(&path).map_err(|e| StoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        write_book(f, &path, &self.store)
    }
}

fn write_book(out: impl Write, path: &Path, store: &MemoryStore) -> Result<(), StoreError> {
    let mut writer = BufWriter::new(out);
    serde_json::to_writer_pretty(&mut writer, store).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    writer.flush().map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Asset store that copies images into a directory, never overwriting an existing file.
#[derive(Debug, Clone)]
pub struct MediaDir {
    dir: PathBuf,
    base_url: Option<String>,
}

impl MediaDir {
    /// References are `<base_url>/<name>` when a base URL is set, else `media/<name>`.
    pub fn new(dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url,
        }
    }

    fn unique_name(&self, filename: &str) -> String {
        if !self.dir.join(filename).exists() {
            return filename.to_string();
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((s, e)) => (s, format!(".{}", e)),
            None => (filename, String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = format!("{}-{}{}", stem, n, ext);
            if !self.dir.join(&candidate).exists() {
                return candidate;
            }
            n += 1;
        }
    }
}

impl AssetStore for MediaDir {
    fn persist(&mut self, temp_path: &Path, filename: &str) -> Result<String, StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let name = self.unique_name(filename);
        let dest = self.dir.join(&name);
        std::fs::copy(temp_path, &dest).map_err(|e| StoreError::Io {
            path: dest.clone(),
            source: e,
        })?;
        Ok(match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), name),
            None => format!("{}/{}", MEDIA_DIR, name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParsedTerm;
    use crate::store::TermStore;
    use std::error::Error;

    /// Accepts nothing; every write reports a full disk.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "no space left"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_book_reports_failed_flush() {
        let err = write_book(FullDisk, Path::new("book.json"), &MemoryStore::default());
        assert!(matches!(err, Err(StoreError::Io { .. })));
    }

    #[test]
    fn media_dir_never_overwrites() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("download.tmp");
        std::fs::write(&src, b"GIF89a")?;
        let mut media = MediaDir::new(tmp.path().join("media"), None);
        assert_eq!(media.persist(&src, "cat.gif")?, "media/cat.gif");
        assert_eq!(media.persist(&src, "cat.gif")?, "media/cat-1.gif");
        assert_eq!(media.persist(&src, "cat.gif")?, "media/cat-2.gif");
        assert!(tmp.path().join("media/cat-2.gif").exists());
        Ok(())
    }

    #[test]
    fn media_dir_uses_base_url() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let src = tmp.path().join("download.tmp");
        std::fs::write(&src, b"GIF89a")?;
        let mut media = MediaDir::new(
            tmp.path().join("m"),
            Some("https://cdn.example.com/book/".to_string()),
        );
        assert_eq!(
            media.persist(&src, "dog.png")?,
            "https://cdn.example.com/book/dog.png"
        );
        Ok(())
    }

    #[test]
    fn book_dir_round_trips_through_book_json() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("out");
        let mut book = BookDir::open(&root)?;
        assert!(book.store.terms.is_empty());
        book.store.create_term(&ParsedTerm {
            name: "Standard".into(),
            taxonomy: "chapter-type".into(),
            description: String::new(),
            slug: "standard".into(),
        })?;
        book.save()?;

        let reopened = BookDir::open(&root)?;
        assert!(reopened.store.term_exists("Standard", "chapter-type"));
        assert_eq!(reopened.selection_path(), root.join("selection.json"));
        Ok(())
    }

    #[test]
    fn book_dir_rejects_corrupt_book_json() -> Result<(), Box<dyn Error>> {
        let tmp = tempfile::tempdir()?;
        std::fs::write(tmp.path().join("book.json"), "{not json")?;
        let result = BookDir::open(tmp.path());
        assert!(matches!(result, Err(StoreError::Json { .. })));
        Ok(())
    }
}
