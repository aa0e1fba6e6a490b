//! wxrbook: import a WordPress WXR export as a structured book.

pub mod assets;
pub mod cli;
pub mod config;
pub mod import;
pub mod logging;
pub mod model;
pub mod rewrite;
pub mod store;
pub mod structure;
pub mod wxr;

// Re-exports for CLI and consumers.
pub use assets::{
    AssetFetcher, Downloader, FetchError, ImageResolver, PoliteClient, PoliteClientBuilder,
};
pub use config::ImportConfig;
pub use import::{stage, ImportError, ImportReport, Importer, Totals};
pub use store::{AssetStore, BookStore, ContentStore, StoreError, TermStore};
pub use wxr::ParseError;
