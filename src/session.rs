//! Identify and cover-download runs against one book source.

use crate::config::{Config, SearchConfig};
use crate::covers::{self, CoverCache, CoverDownload, CoverEntry};
use crate::error::{ParseError, SourceError};
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::matcher;
use crate::names;
use crate::page;
use crate::record::{IDENTIFIER, MetadataRecord, RecordBuilder};
use crate::sources::{self, Biblionetka, BookSource};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Normalized search input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub title: String,
    /// Authors with placeholders removed.
    pub authors: Vec<String>,
    pub only_first_author: bool,
    /// Authors take part in the search phrase and in matching.
    pub use_authors: bool,
}

impl SearchQuery {
    pub fn new(title: &str, authors: &[String], config: &SearchConfig) -> Self {
        let authors = names::without_placeholders(authors);
        Self {
            title: title.trim().to_string(),
            use_authors: config.authors_search && !authors.is_empty(),
            authors,
            only_first_author: config.only_first_author,
        }
    }

    pub fn title_tokens(&self) -> BTreeSet<String> {
        names::title_tokens(&self.title)
    }

    /// Tokens of every author. `only_first_author` narrows the search
    /// phrase, not the matching.
    pub fn author_tokens(&self) -> BTreeSet<String> {
        if !self.use_authors {
            return BTreeSet::new();
        }
        names::tokenize(&self.authors)
    }

    /// Author part of the search phrase, when authors are searched.
    pub fn author_phrase(&self) -> Option<String> {
        self.use_authors
            .then(|| names::join_names(&self.authors, self.only_first_author))
            .filter(|phrase| !phrase.is_empty())
    }
}

/// Everything an identify run needs: settings, the site, an HTTP client and
/// the host's cover cache.
pub struct Session {
    config: Config,
    source: Arc<dyn BookSource>,
    fetcher: Arc<dyn PageFetcher>,
    cover_cache: Arc<dyn CoverCache>,
}

impl Session {
    /// Creates a session talking to the configured site over HTTP.
    pub fn new(config: Config, cover_cache: Arc<dyn CoverCache>) -> Result<Self, reqwest::Error> {
        let fetcher = HttpFetcher::new(Duration::from_secs(config.search.timeout_sec))?;
        let source = Biblionetka::new(&config.search.base_url);
        Ok(Self::with_parts(
            config,
            Arc::new(source),
            Arc::new(fetcher),
            cover_cache,
        ))
    }

    pub fn with_parts(
        config: Config,
        source: Arc<dyn BookSource>,
        fetcher: Arc<dyn PageFetcher>,
        cover_cache: Arc<dyn CoverCache>,
    ) -> Self {
        Self {
            config,
            source,
            fetcher,
            cover_cache,
        }
    }

    /// Runs an identify and collects the records in result order.
    pub async fn identify(
        &self,
        title: &str,
        authors: &[String],
        identifiers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Vec<MetadataRecord> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.identify_into(title, authors, identifiers, &tx, cancel)
            .await;
        drop(tx);

        let mut records = Vec::new();
        while let Some(record) = rx.recv().await {
            records.push(record);
        }
        records
    }

    /// Runs an identify, pushing each record onto `results` as soon as it is
    /// built. Returns the number of records produced.
    ///
    /// Pages that fail to download or don't look like a detail page are
    /// logged and skipped. Cancellation is checked before every detail page
    /// fetch; records already pushed stay pushed.
    pub async fn identify_into(
        &self,
        title: &str,
        authors: &[String],
        identifiers: &BTreeMap<String, String>,
        results: &mpsc::UnboundedSender<MetadataRecord>,
        cancel: &CancellationToken,
    ) -> usize {
        let query = SearchQuery::new(title, authors, &self.config.search);
        tracing::info!(
            source = self.source.name(),
            title = %query.title,
            authors = ?query.authors,
            "identifying"
        );

        let mut urls = self.find_book_urls(&query).await;
        if let Some(book_id) = identifiers.get(IDENTIFIER) {
            urls.insert(0, self.source.book_url(book_id));
        }

        let mut seen = HashSet::new();
        urls.retain(|url| seen.insert(url.clone()));
        urls.truncate(self.config.search.max_results);

        if urls.is_empty() {
            tracing::info!(title = %query.title, "no matching books found");
            return 0;
        }

        let mut produced = 0;
        for url in &urls {
            if cancel.is_cancelled() {
                tracing::info!(produced, "identify cancelled");
                break;
            }

            match self.fetch_record(url, &query, authors).await {
                Ok(record) => {
                    self.remember_covers(url, &record);
                    if results.send(record).is_err() {
                        tracing::debug!("result receiver dropped, stopping");
                        break;
                    }
                    produced += 1;
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "skipping book page"),
            }
        }

        produced
    }

    /// Downloads cover images for a book.
    ///
    /// Uses the cached cover URLs for a known id, running an identify when
    /// nothing is cached. A book cached as having no cover yields nothing.
    pub async fn download_cover(
        &self,
        title: &str,
        authors: &[String],
        identifiers: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Vec<CoverDownload> {
        let settings = &self.config.covers;
        if !settings.covers {
            tracing::info!("cover download disabled");
            return Vec::new();
        }

        let cached = identifiers
            .get(IDENTIFIER)
            .and_then(|book_id| self.cover_cache.cached_cover_urls(book_id));

        let mut urls = match cached {
            Some(CoverEntry::Urls(urls)) if !urls.is_empty() => {
                tracing::info!(count = urls.len(), "using cached cover urls");
                urls
            }
            Some(CoverEntry::NoCover) => {
                tracing::warn!(title = %title, "book has no cover");
                return Vec::new();
            }
            _ => {
                tracing::info!("no cached cover urls, running identify");
                let records = self.identify(title, authors, identifiers, cancel).await;
                let mut seen = HashSet::new();
                records
                    .into_iter()
                    .flat_map(|record| record.cover_urls)
                    .filter(|url| seen.insert(url.clone()))
                    .collect()
            }
        };

        if urls.is_empty() {
            tracing::info!(title = %title, "no covers found");
            return Vec::new();
        }
        urls.truncate(settings.max_covers);

        if settings.threads {
            let delay = Duration::try_from_secs_f64(settings.thread_delay).unwrap_or_default();
            covers::download_covers_concurrently(
                self.fetcher.as_ref(),
                &urls,
                settings.max_threads,
                delay,
                cancel,
            )
            .await
        } else {
            covers::download_covers_sequentially(self.fetcher.as_ref(), &urls, cancel).await
        }
    }

    /// Search-result URLs matching the query.
    ///
    /// The author-narrowed search goes first; when it yields nothing the
    /// title-only search is tried.
    async fn find_book_urls(&self, query: &SearchQuery) -> Vec<String> {
        if let Some(phrase) = query.author_phrase()
            && let Some(url) = self.source.search_url(&query.title, Some(&phrase))
        {
            let urls = self.search(&url, query).await;
            if !urls.is_empty() {
                return urls;
            }
            tracing::debug!("author search found nothing, trying title only");
        }

        match self.source.search_url(&query.title, None) {
            Some(url) => self.search(&url, query).await,
            None => Vec::new(),
        }
    }

    async fn search(&self, url: &str, query: &SearchQuery) -> Vec<String> {
        let body = match self.fetcher.fetch_text(url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "search failed");
                return Vec::new();
            }
        };

        let candidates = self.source.parse_search_page(&page::parse(&body));
        tracing::debug!(url = %url, candidates = candidates.len(), "search page parsed");

        matcher::match_candidates(
            &candidates,
            &query.title_tokens(),
            &query.author_tokens(),
            query.use_authors,
        )
    }

    async fn fetch_record(
        &self,
        url: &str,
        query: &SearchQuery,
        request_authors: &[String],
    ) -> Result<MetadataRecord, SourceError> {
        let body = self.fetcher.fetch_text(url).await?;
        Ok(self.build_record(&body, url, query, request_authors)?)
    }

    /// Parses a detail page body into a record.
    fn build_record(
        &self,
        body: &str,
        url: &str,
        query: &SearchQuery,
        request_authors: &[String],
    ) -> Result<MetadataRecord, ParseError> {
        let doc = page::parse(body);
        let book_page = self.source.locate_book(&doc, url)?;
        let fields = sources::extract_fields(
            self.source.as_ref(),
            &book_page,
            &self.config.fields,
            self.config.covers.covers,
        )?;

        let mut builder = RecordBuilder::new(&query.title, request_authors, url);
        for field in fields {
            builder.apply(field);
        }
        builder.build(self.config.fields.comments)
    }

    fn remember_covers(&self, url: &str, record: &MetadataRecord) {
        if !self.config.covers.covers {
            return;
        }
        let Ok(book_id) = self.source.book_id(url) else {
            return;
        };

        let entry = if record.cover_urls.is_empty() {
            CoverEntry::NoCover
        } else {
            CoverEntry::Urls(record.cover_urls.clone())
        };
        self.cover_cache.cache_cover_urls(&book_id, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldsConfig;
    use crate::covers::MemoryCoverCache;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    const BASE: &str = "http://www.biblionetka.pl";

    const SEARCH_PAGE: &str = r#"
<html><body>
<div id="ctl00_MCP_booksSection">
  <ul>
    <li><a href="book.aspx?id=123">Przykład</a> - <a href="author.aspx?id=7">Kowalski Jan (1900-1980)</a></li>
    <li><a href="book.aspx?id=124">Przykład drugi</a> - <a href="author.aspx?id=7">Kowalski Jan</a></li>
    <li><a href="book.aspx?id=125">Przykład trzeci</a> - <a href="author.aspx?id=7">Kowalski Jan</a></li>
    <li><a href="book.aspx?id=900">Coś innego</a> - <a href="author.aspx?id=8">Nowak Anna</a></li>
  </ul>
</div>
</body></html>
"#;

    fn detail_page(title: &str, with_cover: bool) -> String {
        let cover = if with_cover {
            r#"<div id="bookShopCoverContent"><img src="/covers/123.jpg"/></div>"#
        } else {
            ""
        };
        format!(
            r#"
<html><body>
<div class="hReview-aggregate">
  <h1 class="fn">{title}</h1>
  <p>
    <strong>Autor:</strong> <a href="author.aspx?id=7">Kowalski Jan (1900-1980)</a><br/>
    <strong>Rok pierwszego wydania:</strong> 1999<br/>
    <strong>Gatunek:</strong> powieść<br/>
  </p>
  <span class="rating"><span class="average">4,8</span></span>
</div>
{cover}
<div>
  <strong>Cykle:</strong>
  <ul><li>Seria testowa<ul>
    <li><a href="bookSerie.aspx?id=5">Seria testowa</a> (tom: 2)</li>
  </ul></li></ul>
</div>
<span><h2>Noty wydawców</h2></span>
<div><p>Opis książki.</p></div>
</body></html>
"#
        )
    }

    /// Serves canned pages and records what was requested.
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
        cancel_on_detail: Option<CancellationToken>,
    }

    impl StubFetcher {
        fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
            self.pages.insert(url.into(), body.into());
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
            self.requested.lock().push(url.to_string());
            if url.contains("book.aspx")
                && let Some(cancel) = &self.cancel_on_detail
            {
                cancel.cancel();
            }
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.fetch_text(url).await.map(String::into_bytes)
        }
    }

    fn book(id: u32) -> String {
        format!("{BASE}/book.aspx?id={id}")
    }

    fn author_search() -> String {
        Biblionetka::default()
            .search_url("Przykład", Some("Jan Kowalski"))
            .unwrap()
    }

    fn title_search() -> String {
        Biblionetka::default().search_url("Przykład", None).unwrap()
    }

    fn session(config: Config, fetcher: StubFetcher) -> (Session, Arc<StubFetcher>, Arc<MemoryCoverCache>) {
        let fetcher = Arc::new(fetcher);
        let cache = Arc::new(MemoryCoverCache::new());
        let session = Session::with_parts(
            config,
            Arc::new(Biblionetka::default()),
            fetcher.clone(),
            cache.clone(),
        );
        (session, fetcher, cache)
    }

    fn authors() -> Vec<String> {
        vec!["Jan Kowalski".to_string()]
    }

    #[test]
    fn test_query_drops_placeholder_authors() {
        let config = Config::default();
        let query = SearchQuery::new(
            " Przykład ",
            &["Unknown".to_string(), "Jan Kowalski".to_string()],
            &config.search,
        );
        assert_eq!(query.title, "Przykład");
        assert_eq!(query.authors, vec!["Jan Kowalski"]);
        assert_eq!(query.author_phrase().as_deref(), Some("Jan Kowalski"));

        let query = SearchQuery::new("Przykład", &["Nieznany".to_string()], &config.search);
        assert!(!query.use_authors);
        assert_eq!(query.author_phrase(), None);
        assert!(query.author_tokens().is_empty());
    }

    #[tokio::test]
    async fn test_identify_builds_record() {
        let fetcher = StubFetcher::default()
            .with_page(author_search(), SEARCH_PAGE)
            .with_page(book(123), detail_page("Przykład", true))
            .with_page(book(124), detail_page("Przykład drugi", false));
        let (session, _, cache) = session(Config::default(), fetcher);

        let records = session
            .identify("Przykład", &authors(), &BTreeMap::new(), &CancellationToken::new())
            .await;

        assert_eq!(records.len(), 2);
        let record = &records[0];
        assert_eq!(record.title, "Przykład");
        assert_eq!(record.authors, vec!["Jan Kowalski"]);
        assert_eq!(record.series.as_deref(), Some("Seria testowa"));
        assert_eq!(record.series_index, Some(2));
        assert_eq!(record.rating, Some(4));
        assert_eq!(record.book_id(), Some("123"));
        assert!(record.has_cover);

        let comments = record.comments.as_deref().unwrap();
        assert!(comments.starts_with("<p>Opis książki.</p>"));
        assert!(comments.contains(r#"<p id="gatunek">Gatunek: powieść</p>"#));
        assert!(comments.contains(r#"<p id="cykl">Cykle: Seria testowa[2]</p>"#));

        assert_eq!(
            cache.cached_cover_urls("123"),
            Some(CoverEntry::Urls(vec![format!("{BASE}/covers/123.jpg")]))
        );
        assert_eq!(cache.cached_cover_urls("124"), Some(CoverEntry::NoCover));
    }

    #[tokio::test]
    async fn test_cancel_after_first_detail_fetch() {
        let cancel = CancellationToken::new();
        let fetcher = StubFetcher {
            cancel_on_detail: Some(cancel.clone()),
            ..StubFetcher::default()
        }
        .with_page(author_search(), SEARCH_PAGE)
        .with_page(book(123), detail_page("Przykład", true))
        .with_page(book(124), detail_page("Przykład drugi", true))
        .with_page(book(125), detail_page("Przykład trzeci", true));

        let mut config = Config::default();
        config.search.max_results = 3;
        let (session, fetcher, _) = session(config, fetcher);

        let records = session
            .identify("Przykład", &authors(), &BTreeMap::new(), &cancel)
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Przykład");
        assert_eq!(fetcher.requested(), vec![author_search(), book(123)]);
    }

    #[test]
    fn test_only_first_author_narrows_phrase_not_matching() {
        let mut config = Config::default();
        config.search.only_first_author = true;
        let query = SearchQuery::new(
            "Przykład",
            &["Jan Kowalski".to_string(), "Anna Nowak".to_string()],
            &config.search,
        );

        assert_eq!(query.author_phrase().as_deref(), Some("Jan Kowalski"));
        let tokens = query.author_tokens();
        assert!(tokens.contains("kowalski"));
        assert!(tokens.contains("nowak"));
    }

    #[tokio::test]
    async fn test_known_id_goes_first() {
        let fetcher = StubFetcher::default()
            .with_page(author_search(), SEARCH_PAGE)
            .with_page(book(555), detail_page("Przykład znany", false))
            .with_page(book(123), detail_page("Przykład", false));
        let (session, _, _) = session(Config::default(), fetcher);

        let identifiers = BTreeMap::from([(IDENTIFIER.to_string(), "555".to_string())]);
        let records = session
            .identify("Przykład", &authors(), &identifiers, &CancellationToken::new())
            .await;

        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Przykład znany", "Przykład"]);
    }

    #[tokio::test]
    async fn test_known_id_in_results_fetched_once() {
        let mut config = Config::default();
        config.search.max_results = 3;
        let fetcher = StubFetcher::default()
            .with_page(author_search(), SEARCH_PAGE)
            .with_page(book(123), detail_page("Przykład", false))
            .with_page(book(124), detail_page("Przykład drugi", false))
            .with_page(book(125), detail_page("Przykład trzeci", false));
        let (session, fetcher, _) = session(config, fetcher);

        let identifiers = BTreeMap::from([(IDENTIFIER.to_string(), "124".to_string())]);
        let records = session
            .identify("Przykład", &authors(), &identifiers, &CancellationToken::new())
            .await;

        let titles: Vec<&str> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Przykład drugi", "Przykład", "Przykład trzeci"]);
        assert_eq!(
            fetcher.requested(),
            vec![author_search(), book(124), book(123), book(125)]
        );
    }

    #[tokio::test]
    async fn test_failed_page_is_skipped() {
        let mut config = Config::default();
        config.search.max_results = 3;
        let fetcher = StubFetcher::default()
            .with_page(author_search(), SEARCH_PAGE)
            .with_page(book(123), "<html><body><p>Błąd serwera</p></body></html>")
            .with_page(book(125), detail_page("Przykład trzeci", false));
        let (session, _, _) = session(config, fetcher);

        let records = session
            .identify("Przykład", &authors(), &BTreeMap::new(), &CancellationToken::new())
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Przykład trzeci");
    }

    #[tokio::test]
    async fn test_falls_back_to_title_search() {
        let fetcher = StubFetcher::default()
            .with_page(title_search(), SEARCH_PAGE)
            .with_page(book(123), detail_page("Przykład", false));
        let mut config = Config::default();
        config.search.max_results = 1;
        let (session, fetcher, _) = session(config, fetcher);

        let records = session
            .identify("Przykład", &authors(), &BTreeMap::new(), &CancellationToken::new())
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(
            fetcher.requested(),
            vec![author_search(), title_search(), book(123)]
        );
    }

    #[tokio::test]
    async fn test_disabled_fields_fall_back_to_query() {
        let mut config = Config::default();
        config.fields = FieldsConfig::all(false);
        config.search.max_results = 1;
        let fetcher = StubFetcher::default()
            .with_page(author_search(), SEARCH_PAGE)
            .with_page(book(123), detail_page("Inny tytuł", true));
        let (session, _, _) = session(config, fetcher);

        let records = session
            .identify("Przykład", &authors(), &BTreeMap::new(), &CancellationToken::new())
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Przykład");
        assert_eq!(records[0].authors, authors());
        assert_eq!(records[0].comments, None);
        assert!(records[0].identifiers.is_empty());
    }

    #[tokio::test]
    async fn test_download_cover_uses_cache() {
        let cover_url = format!("{BASE}/covers/123.jpg");
        let fetcher = StubFetcher::default().with_page(cover_url.clone(), "JPEG");
        let (session, fetcher, cache) = session(Config::default(), fetcher);
        cache.cache_cover_urls("123", CoverEntry::Urls(vec![cover_url.clone()]));

        let identifiers = BTreeMap::from([(IDENTIFIER.to_string(), "123".to_string())]);
        let downloads = session
            .download_cover("Przykład", &authors(), &identifiers, &CancellationToken::new())
            .await;

        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].url, cover_url);
        assert_eq!(downloads[0].result.as_deref().unwrap(), b"JPEG");
        assert_eq!(fetcher.requested(), vec![cover_url]);
    }

    #[tokio::test]
    async fn test_download_cover_respects_no_cover_marker() {
        let (session, fetcher, cache) = session(Config::default(), StubFetcher::default());
        cache.cache_cover_urls("123", CoverEntry::NoCover);

        let identifiers = BTreeMap::from([(IDENTIFIER.to_string(), "123".to_string())]);
        let downloads = session
            .download_cover("Przykład", &authors(), &identifiers, &CancellationToken::new())
            .await;

        assert!(downloads.is_empty());
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_download_cover_runs_identify_when_uncached() {
        let cover_url = format!("{BASE}/covers/123.jpg");
        let mut config = Config::default();
        config.search.max_results = 1;
        config.covers.threads = false;
        let fetcher = StubFetcher::default()
            .with_page(author_search(), SEARCH_PAGE)
            .with_page(book(123), detail_page("Przykład", true))
            .with_page(cover_url.clone(), "JPEG");
        let (session, _, _) = session(config, fetcher);

        let downloads = session
            .download_cover("Przykład", &authors(), &BTreeMap::new(), &CancellationToken::new())
            .await;

        assert_eq!(downloads.len(), 1);
        assert_eq!(downloads[0].url, cover_url);
        assert!(downloads[0].result.is_ok());
    }
}
