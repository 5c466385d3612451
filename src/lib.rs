//! biblionetka-meta - book metadata from biblioNETka.pl.
//!
//! This library provides:
//! - Searching the catalog by title and authors and matching the results
//! - Extracting metadata records from book detail pages
//! - Cover URL caching and bounded concurrent cover downloads

pub mod comments;
pub mod config;
pub mod console;
pub mod covers;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod matcher;
pub mod names;
pub mod page;
pub mod record;
pub mod session;
pub mod sources;

// Re-export commonly used types
pub use config::Config;
pub use console::Console;
pub use covers::{CoverCache, CoverDownload, CoverEntry, MemoryCoverCache};
pub use error::{ConfigError, FetchError, ParseError, SourceError};
pub use fetcher::{HttpFetcher, PageFetcher};
pub use record::{IDENTIFIER, MetadataRecord, SeriesEntry};
pub use session::{SearchQuery, Session};
pub use sources::{Biblionetka, BookSource};
