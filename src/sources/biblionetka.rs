//! biblioNETka.pl source implementation.
//!
//! Search results come from `search.aspx`, book facts from `book.aspx?id=N`.
//! All field labels on the site are Polish.

use super::BookSource;
use crate::config::DEFAULT_BASE_URL;
use crate::error::ParseError;
use crate::matcher::CandidateLink;
use crate::names;
use crate::page::{self, BookPage};
use crate::record::SeriesEntry;
use chrono::{DateTime, TimeZone, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Regex to extract the book id from a detail-page URL.
static BOOK_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"id=(\d+)").unwrap());

/// Regex for the position suffix after a series link, e.g. "(tom: 2)".
static SERIES_ORDINAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(tom:\s*(\d+)\)").unwrap());

/// Characters left unescaped in search phrases.
const PHRASE_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'/');

/// Rescales the site's 0-6 rating to 0-5.
const RATING_SCALE: f64 = 0.83333;

const AUTHOR_LABEL: &str = "Autor";
const PUBDATE_LABEL: &str = "Rok pierwszego wydania:";
const TRANSLATOR_LABEL: &str = "umacz:";
const ORIGINAL_TITLE_LABEL: &str = "oryginalny:";
/// "Język oryginalny:" also contains the original-title label.
const ORIGINAL_LANGUAGE_LABEL: &str = "k oryginalny:";
const CATEGORY_LABEL: &str = "Kategoria:";
const GENRE_LABEL: &str = "Gatunek:";
const SERIES_LABEL: &str = "Cykle:";
const PUBLISHER_NOTE_HEADING: &str = "Noty wydaw";

/// CSS selectors used for parsing.
struct Selectors {
    /// The single node holding the book's details.
    book: Selector,
    /// One entry per search result.
    search_entry: Selector,
    /// Title inside the book node.
    title: Selector,
    /// Average rating text.
    rating: Selector,
    /// Tag links.
    tag: Selector,
    /// Series links on older page layouts.
    series_fallback: Selector,
    /// Cover image.
    cover: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            book: Selector::parse(r#"[class="hReview-aggregate"]"#).unwrap(),
            search_entry: Selector::parse("div#ctl00_MCP_booksSection > ul > li").unwrap(),
            title: Selector::parse(".fn").unwrap(),
            rating: Selector::parse(r#"span[class="rating"] span[class="average"]"#).unwrap(),
            tag: Selector::parse(r#"a[class="tag"]"#).unwrap(),
            series_fallback: Selector::parse(r#"li a[href*="bookSerie.aspx"]"#).unwrap(),
            cover: Selector::parse("div#bookShopCoverContent img").unwrap(),
        }
    }
}

/// biblioNETka.pl catalog.
pub struct Biblionetka {
    base_url: String,
    selectors: Selectors,
}

impl Default for Biblionetka {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Biblionetka {
    /// Creates a source rooted at `base_url` (normally the public site).
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            selectors: Selectors::new(),
        }
    }

    /// Extracts the book id from a URL.
    pub fn book_id_from_url(url: &str) -> Result<String, ParseError> {
        BOOK_ID_REGEX
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ParseError::InvalidUrl(url.to_string()))
    }

    /// Resolves a link found on a page against that page's URL.
    fn resolve(&self, page_url: &str, href: &str) -> String {
        url::Url::parse(page_url)
            .or_else(|_| url::Url::parse(&format!("{}/", self.base_url)))
            .and_then(|base| base.join(href))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| href.to_string())
    }

    /// Series links in document order: nested list links after the series
    /// label, or any series link on older layouts.
    fn series_anchors<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        let mut after_label = false;
        let mut anchors = Vec::new();

        for elem in doc.root_element().descendants().filter_map(ElementRef::wrap) {
            match elem.value().name() {
                "strong" if !after_label && page::own_text(elem).contains(SERIES_LABEL) => {
                    after_label = true;
                }
                "a" if after_label && is_nested_list_link(elem) => anchors.push(elem),
                _ => {}
            }
        }

        if anchors.is_empty() {
            anchors = doc.select(&self.selectors.series_fallback).collect();
        }

        anchors
    }
}

/// True for `li > ul > li > a`.
fn is_nested_list_link(anchor: ElementRef<'_>) -> bool {
    let chain: Vec<String> = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(3)
        .map(|elem| elem.value().name().to_string())
        .collect();
    chain == ["li", "ul", "li"]
}

/// Converts a comma-decimal rating on the site's 0-6 scale to 0-5.
///
/// Rounds half away from zero.
pub fn rescale_rating(text: &str) -> Option<u8> {
    let value: f64 = text.trim().replace(',', ".").parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value * RATING_SCALE).round().clamp(0.0, 5.0) as u8)
}

/// Series ordinal from the text following a series link.
fn series_ordinal(tail: &str) -> Option<u32> {
    SERIES_ORDINAL_REGEX
        .captures(tail)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Text before the first parenthesis, trimmed. Author lines carry life
/// dates in parentheses.
fn before_parenthesis(text: &str) -> &str {
    text.split('(').next().unwrap_or_default().trim()
}

impl BookSource for Biblionetka {
    fn name(&self) -> &'static str {
        "biblioNETka.pl"
    }

    fn search_url(&self, title: &str, authors: Option<&str>) -> Option<String> {
        if title.is_empty() {
            return None;
        }

        let mut url = format!(
            "{}/search.aspx?searchType=book_catalog&searchPhrase={}",
            self.base_url,
            utf8_percent_encode(title, PHRASE_SAFE)
        );

        if let Some(authors) = authors.filter(|a| !a.is_empty()) {
            url.push_str("%20-%20");
            url.push_str(&utf8_percent_encode(authors, PHRASE_SAFE).to_string());
        }

        Some(url)
    }

    fn book_url(&self, book_id: &str) -> String {
        format!("{}/book.aspx?id={}", self.base_url, book_id)
    }

    fn book_id(&self, url: &str) -> Result<String, ParseError> {
        Self::book_id_from_url(url)
    }

    fn parse_search_page(&self, doc: &Html) -> Vec<CandidateLink> {
        let site_root = format!("{}/", self.base_url);

        doc.select(&self.selectors.search_entry)
            .filter_map(|entry| {
                let mut links = entry
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|elem| elem.value().name() == "a");

                let (Some(title_link), Some(author_link)) = (links.next(), links.next()) else {
                    tracing::debug!("search entry without title and author links, skipping");
                    return None;
                };

                let href = title_link.value().attr("href")?;
                Some(CandidateLink {
                    display_title: page::text_of(title_link),
                    display_author_text: before_parenthesis(&page::text_of(author_link))
                        .to_string(),
                    target_url: self.resolve(&site_root, href),
                })
            })
            .collect()
    }

    fn locate_book<'a>(&self, doc: &'a Html, url: &'a str) -> Result<BookPage<'a>, ParseError> {
        let book = page::locate_single(doc, &self.selectors.book)?;
        Ok(BookPage { doc, book, url })
    }

    fn parse_title(&self, page: &BookPage<'_>) -> Option<String> {
        page.book
            .select(&self.selectors.title)
            .next()
            .map(page::text_of)
            .filter(|title| !title.is_empty())
    }

    fn parse_authors(&self, page: &BookPage<'_>) -> Option<Vec<String>> {
        let label = page::find_label(page.book, AUTHOR_LABEL, &[])?;
        let text = page::text_of(page::next_element(label)?);
        let authors = before_parenthesis(&text);
        if authors.is_empty() {
            return None;
        }
        Some(names::split_reversed(authors))
    }

    fn parse_pubdate(&self, page: &BookPage<'_>) -> Option<DateTime<Utc>> {
        let year: i32 = page::labelled_value(page.book, PUBDATE_LABEL, &[])?
            .parse()
            .ok()?;
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()
    }

    fn parse_languages(&self, _page: &BookPage<'_>) -> Option<Vec<String>> {
        Some(vec!["pl".to_string()])
    }

    fn parse_rating(&self, page: &BookPage<'_>) -> Option<u8> {
        let node = page.doc.select(&self.selectors.rating).next()?;
        let rating = rescale_rating(&page::own_text(node));
        if let Some(value) = rating {
            tracing::info!(rating = value, "found rating");
        }
        rating
    }

    fn parse_tags(&self, page: &BookPage<'_>) -> Option<BTreeSet<String>> {
        let tags: BTreeSet<String> = page
            .doc
            .select(&self.selectors.tag)
            .map(page::text_of)
            .filter(|tag| !tag.is_empty())
            .collect();
        (!tags.is_empty()).then_some(tags)
    }

    fn parse_series(&self, page: &BookPage<'_>) -> Option<Vec<SeriesEntry>> {
        let series: Vec<SeriesEntry> = self
            .series_anchors(page.doc)
            .into_iter()
            .filter_map(|anchor| {
                let name = page::text_of(anchor);
                if name.is_empty() {
                    return None;
                }
                let ordinal = page::tail_text(anchor).and_then(|tail| series_ordinal(&tail));
                Some(SeriesEntry::new(name, ordinal))
            })
            .collect();
        (!series.is_empty()).then_some(series)
    }

    fn parse_translators(&self, page: &BookPage<'_>) -> Option<Vec<String>> {
        page::labelled_value(page.book, TRANSLATOR_LABEL, &[]).map(|t| names::split_reversed(&t))
    }

    fn parse_original_title(&self, page: &BookPage<'_>) -> Option<String> {
        page::labelled_value(page.book, ORIGINAL_TITLE_LABEL, &[ORIGINAL_LANGUAGE_LABEL])
    }

    fn parse_category(&self, page: &BookPage<'_>) -> Option<String> {
        page::labelled_value(page.book, CATEGORY_LABEL, &[])
    }

    fn parse_genre(&self, page: &BookPage<'_>) -> Option<String> {
        page::labelled_value(page.book, GENRE_LABEL, &[])
    }

    fn parse_covers(&self, page: &BookPage<'_>) -> Option<Vec<String>> {
        let src = page
            .doc
            .select(&self.selectors.cover)
            .next()?
            .value()
            .attr("src")
            .filter(|src| !src.trim().is_empty())?;
        Some(vec![self.resolve(page.url, src.trim())])
    }

    fn parse_identifier(&self, page: &BookPage<'_>) -> Result<String, ParseError> {
        self.book_id(page.url)
    }

    fn parse_publisher_note(&self, page: &BookPage<'_>) -> Option<String> {
        let mut heading_seen = false;

        for elem in page.doc.root_element().descendants().filter_map(ElementRef::wrap) {
            match elem.value().name() {
                "h2" if !heading_seen => {
                    let under_span = elem
                        .parent()
                        .and_then(ElementRef::wrap)
                        .is_some_and(|parent| parent.value().name() == "span");
                    heading_seen =
                        under_span && page::own_text(elem).contains(PUBLISHER_NOTE_HEADING);
                }
                "div" if heading_seen => {
                    let note = elem
                        .children()
                        .filter_map(ElementRef::wrap)
                        .find(|child| child.value().name() == "p")?;
                    return Some(page::outer_html_without_style(note));
                }
                _ => {}
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOK_URL: &str = "http://www.biblionetka.pl/book.aspx?id=123";

    const DETAIL_PAGE: &str = r#"
<html><body>
<div class="hReview-aggregate">
  <h1 class="fn">Przykład</h1>
  <p>
    <strong>Autor:</strong> <a href="author.aspx?id=7">Jan Kowalski (1900-1980)</a><br/>
    <strong>Tłumacz:</strong> Anna Nowak, Piotr Wiśniewski<br/>
    <strong>Tytuł oryginalny:</strong> Example<br/>
    <strong>Język oryginalny:</strong> angielski<br/>
    <strong>Rok pierwszego wydania:</strong> 1999<br/>
    <strong>Kategoria:</strong> literatura piękna<br/>
    <strong>Gatunek:</strong> powieść<br/>
  </p>
  <span class="rating"><span class="value"><span class="average">4,8</span></span></span>
</div>
<div id="bookShopCoverContent"><a href="/sklep/123"><img src="/covers/123.jpg"/></a></div>
<a class="tag" href="tag.aspx?id=1">fantastyka</a>
<a class="tag" href="tag.aspx?id=2">magia</a>
<a class="tag" href="tag.aspx?id=1">fantastyka</a>
<div>
  <strong>Cykle:</strong>
  <ul>
    <li>Seria testowa
      <ul>
        <li><a href="bookSerie.aspx?id=5">Seria testowa</a> (tom: 2)</li>
        <li><a href="bookSerie.aspx?id=6">Inny cykl</a></li>
      </ul>
    </li>
  </ul>
</div>
<span><h2>Noty wydawców</h2></span>
<div><p style="margin: 0" class="note">Opis <b>książki</b>.</p></div>
</body></html>
"#;

    const SEARCH_PAGE: &str = r#"
<html><body>
<div id="ctl00_MCP_booksSection">
  <ul>
    <li><a href="book.aspx?id=1">Lalka</a> - <a href="author.aspx?id=9">Bolesław Prus (1847-1912)</a></li>
    <li><a href="book.aspx?id=2">Lalka i inne</a></li>
    <li><a href="book.aspx?id=3">Potop</a> - <a href="author.aspx?id=4">Henryk Sienkiewicz</a></li>
  </ul>
</div>
</body></html>
"#;

    fn with_page<T>(html: &str, url: &str, f: impl FnOnce(&Biblionetka, &BookPage<'_>) -> T) -> T {
        let source = Biblionetka::default();
        let doc = page::parse(html);
        let page = source.locate_book(&doc, url).unwrap();
        f(&source, &page)
    }

    #[test]
    fn test_search_urls() {
        let source = Biblionetka::default();
        assert_eq!(
            source.search_url("Pan Tadeusz", None).unwrap(),
            "http://www.biblionetka.pl/search.aspx?searchType=book_catalog&searchPhrase=Pan%20Tadeusz"
        );
        assert_eq!(
            source.search_url("Lalka", Some("Bolesław Prus")).unwrap(),
            "http://www.biblionetka.pl/search.aspx?searchType=book_catalog&searchPhrase=Lalka%20-%20Boles%C5%82aw%20Prus"
        );
        assert_eq!(source.search_url("", Some("Prus")), None);
    }

    #[test]
    fn test_book_url_and_id() {
        let source = Biblionetka::new("http://localhost:8080/");
        assert_eq!(source.book_url("55"), "http://localhost:8080/book.aspx?id=55");
        assert_eq!(Biblionetka::book_id_from_url(BOOK_URL).unwrap(), "123");
        assert!(matches!(
            Biblionetka::book_id_from_url("http://www.biblionetka.pl/book.aspx"),
            Err(ParseError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_parse_search_page() {
        let source = Biblionetka::default();
        let candidates = source.parse_search_page(&page::parse(SEARCH_PAGE));

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].display_title, "Lalka");
        assert_eq!(candidates[0].display_author_text, "Bolesław Prus");
        assert_eq!(
            candidates[0].target_url,
            "http://www.biblionetka.pl/book.aspx?id=1"
        );
        assert_eq!(candidates[1].display_author_text, "Henryk Sienkiewicz");
    }

    #[test]
    fn test_locate_book_requires_single_node() {
        let source = Biblionetka::default();
        let doc = page::parse("<html><body><p>Nic</p></body></html>");
        assert!(matches!(
            source.locate_book(&doc, BOOK_URL),
            Err(ParseError::AmbiguousStructure { count: 0 })
        ));

        let doc = page::parse(
            r#"<div class="hReview-aggregate"></div><div class="hReview-aggregate"></div>"#,
        );
        assert!(matches!(
            source.locate_book(&doc, BOOK_URL),
            Err(ParseError::AmbiguousStructure { count: 2 })
        ));
    }

    #[test]
    fn test_detail_fields() {
        with_page(DETAIL_PAGE, BOOK_URL, |source, page| {
            assert_eq!(source.parse_title(page).as_deref(), Some("Przykład"));
            assert_eq!(
                source.parse_authors(page).unwrap(),
                vec!["Kowalski Jan".to_string()]
            );
            assert_eq!(
                source.parse_translators(page).unwrap(),
                vec!["Nowak Anna".to_string(), "Wiśniewski Piotr".to_string()]
            );
            assert_eq!(source.parse_original_title(page).as_deref(), Some("Example"));
            assert_eq!(
                source.parse_category(page).as_deref(),
                Some("literatura piękna")
            );
            assert_eq!(source.parse_genre(page).as_deref(), Some("powieść"));
            assert_eq!(source.parse_identifier(page).unwrap(), "123");
            assert_eq!(source.parse_rating(page), Some(4));
        });
    }

    #[test]
    fn test_pubdate_is_january_first_utc() {
        with_page(DETAIL_PAGE, BOOK_URL, |source, page| {
            let date = source.parse_pubdate(page).unwrap();
            assert_eq!(date, Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap());
        });
    }

    #[test]
    fn test_tags_deduplicated() {
        with_page(DETAIL_PAGE, BOOK_URL, |source, page| {
            let tags = source.parse_tags(page).unwrap();
            assert_eq!(
                tags.into_iter().collect::<Vec<_>>(),
                vec!["fantastyka".to_string(), "magia".to_string()]
            );
        });
    }

    #[test]
    fn test_series_with_and_without_ordinal() {
        with_page(DETAIL_PAGE, BOOK_URL, |source, page| {
            assert_eq!(
                source.parse_series(page).unwrap(),
                vec![
                    SeriesEntry::new("Seria testowa", Some(2)),
                    SeriesEntry::new("Inny cykl", None),
                ]
            );
        });
    }

    #[test]
    fn test_series_fallback_layout() {
        let html = r#"
<div class="hReview-aggregate"><h1 class="fn">X</h1></div>
<ul><li><a href="bookSerie.aspx?id=9">Stary cykl</a> (tom: x)</li></ul>
"#;
        with_page(html, BOOK_URL, |source, page| {
            assert_eq!(
                source.parse_series(page).unwrap(),
                vec![SeriesEntry::new("Stary cykl", None)]
            );
        });
    }

    #[test]
    fn test_cover_resolved_against_page() {
        with_page(DETAIL_PAGE, BOOK_URL, |source, page| {
            assert_eq!(
                source.parse_covers(page).unwrap(),
                vec!["http://www.biblionetka.pl/covers/123.jpg".to_string()]
            );
        });
    }

    #[test]
    fn test_publisher_note_without_style() {
        with_page(DETAIL_PAGE, BOOK_URL, |source, page| {
            assert_eq!(
                source.parse_publisher_note(page).as_deref(),
                Some(r#"<p class="note">Opis <b>książki</b>.</p>"#)
            );
        });
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let html = r#"<div class="hReview-aggregate"><p>Brak danych</p></div>"#;
        with_page(html, BOOK_URL, |source, page| {
            assert_eq!(source.parse_title(page), None);
            assert_eq!(source.parse_authors(page), None);
            assert_eq!(source.parse_pubdate(page), None);
            assert_eq!(source.parse_rating(page), None);
            assert_eq!(source.parse_tags(page), None);
            assert_eq!(source.parse_series(page), None);
            assert_eq!(source.parse_translators(page), None);
            assert_eq!(source.parse_covers(page), None);
            assert_eq!(source.parse_publisher_note(page), None);
        });
    }

    #[test]
    fn test_rescale_rating() {
        assert_eq!(rescale_rating("6,0"), Some(5));
        assert_eq!(rescale_rating("3,0"), Some(2));
        assert_eq!(rescale_rating("4,8"), Some(4));
        assert_eq!(rescale_rating("5,4"), Some(4));
        assert_eq!(rescale_rating("0"), Some(0));
        assert_eq!(rescale_rating("brak"), None);
    }

    #[test]
    fn test_series_ordinal() {
        assert_eq!(series_ordinal(" (tom: 2)"), Some(2));
        assert_eq!(series_ordinal("(tom:12)"), Some(12));
        assert_eq!(series_ordinal(" (tom: II)"), None);
        assert_eq!(series_ordinal(""), None);
    }
}
