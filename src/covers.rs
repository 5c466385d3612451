//! Cover URL cache contract and cover image downloads.
//!
//! The cache belongs to the host. Identify runs write to it (discovered URLs,
//! or a "no cover" marker), cover downloads read from it.

use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What is known about a book's covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverEntry {
    /// Cover image URLs found on the detail page.
    Urls(Vec<String>),
    /// The detail page has no cover; don't look again.
    NoCover,
}

/// Host-owned cache of cover URLs, keyed by book id.
pub trait CoverCache: Send + Sync {
    /// What was last recorded for `book_id`, if anything.
    fn cached_cover_urls(&self, book_id: &str) -> Option<CoverEntry>;

    /// Replaces whatever was recorded for `book_id`.
    fn cache_cover_urls(&self, book_id: &str, entry: CoverEntry);
}

/// Process-local cover cache.
#[derive(Debug, Default)]
pub struct MemoryCoverCache {
    entries: RwLock<HashMap<String, CoverEntry>>,
}

impl MemoryCoverCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoverCache for MemoryCoverCache {
    fn cached_cover_urls(&self, book_id: &str) -> Option<CoverEntry> {
        self.entries.read().get(book_id).cloned()
    }

    fn cache_cover_urls(&self, book_id: &str, entry: CoverEntry) {
        self.entries.write().insert(book_id.to_string(), entry);
    }
}

/// Outcome of one cover download.
#[derive(Debug)]
pub struct CoverDownload {
    pub url: String,
    pub result: Result<Vec<u8>, FetchError>,
}

/// Downloads covers one after another, stopping early on cancellation.
pub async fn download_covers_sequentially(
    fetcher: &dyn PageFetcher,
    urls: &[String],
    cancel: &CancellationToken,
) -> Vec<CoverDownload> {
    let mut downloads = Vec::with_capacity(urls.len());

    for url in urls {
        if cancel.is_cancelled() {
            break;
        }
        downloads.push(CoverDownload {
            url: url.clone(),
            result: fetcher.fetch_bytes(url).await,
        });
    }

    downloads
}

/// Downloads covers with at most `max_workers` requests in flight.
///
/// Download `i` starts no earlier than `i * start_delay` after the call.
/// Results arrive in completion order. Cancellation drops pending downloads
/// and returns what has finished.
pub async fn download_covers_concurrently(
    fetcher: &dyn PageFetcher,
    urls: &[String],
    max_workers: usize,
    start_delay: Duration,
    cancel: &CancellationToken,
) -> Vec<CoverDownload> {
    let start = tokio::time::Instant::now();

    futures::stream::iter(urls.iter().enumerate())
        .map(|(index, url)| async move {
            let launch_at = start + start_delay * u32::try_from(index).unwrap_or(u32::MAX);
            tokio::time::sleep_until(launch_at).await;

            tracing::debug!(url = %url, "downloading cover");
            CoverDownload {
                url: url.clone(),
                result: fetcher.fetch_bytes(url).await,
            }
        })
        .buffer_unordered(max_workers.max(1))
        .take_until(cancel.cancelled())
        .collect()
        .await
}
