//! Book source trait and the field dispatch shared by all sources.
//!
//! A source knows how to build search and detail URLs for one catalog site
//! and how to pull individual facts out of its pages. Extractors are pure:
//! they never fetch and never look at configuration.

mod biblionetka;

pub use biblionetka::{Biblionetka, rescale_rating};

use crate::config::FieldsConfig;
use crate::error::ParseError;
use crate::matcher::CandidateLink;
use crate::page::BookPage;
use crate::record::{ExtractedField, SeriesEntry};
use chrono::{DateTime, Utc};
use scraper::Html;
use std::collections::BTreeSet;

/// Capability set of a catalog site.
pub trait BookSource: Send + Sync {
    /// Returns the human-readable name of this source.
    fn name(&self) -> &'static str;

    /// Search-result URL for a title, optionally narrowed by an author string.
    /// `None` when there is nothing to search for.
    fn search_url(&self, title: &str, authors: Option<&str>) -> Option<String>;

    /// Detail-page URL for a known book id.
    fn book_url(&self, book_id: &str) -> String;

    /// Book id carried by a detail-page URL.
    fn book_id(&self, url: &str) -> Result<String, ParseError>;

    /// Entries of a search-result listing.
    fn parse_search_page(&self, doc: &Html) -> Vec<CandidateLink>;

    /// Locates the book detail node of a detail page.
    fn locate_book<'a>(&self, doc: &'a Html, url: &'a str) -> Result<BookPage<'a>, ParseError>;

    /// Book title from the detail node.
    fn parse_title(&self, page: &BookPage<'_>) -> Option<String>;

    /// Authors, first name first.
    fn parse_authors(&self, page: &BookPage<'_>) -> Option<Vec<String>>;

    /// First publication year, as January 1st UTC.
    fn parse_pubdate(&self, page: &BookPage<'_>) -> Option<DateTime<Utc>>;

    /// Language codes of the edition.
    fn parse_languages(&self, page: &BookPage<'_>) -> Option<Vec<String>>;

    /// Rating on a 0-5 scale.
    fn parse_rating(&self, page: &BookPage<'_>) -> Option<u8>;

    /// Distinct reader tags.
    fn parse_tags(&self, page: &BookPage<'_>) -> Option<BTreeSet<String>>;

    /// Series memberships in page order, with ordinals when shown.
    fn parse_series(&self, page: &BookPage<'_>) -> Option<Vec<SeriesEntry>>;

    /// Translators, first name first.
    fn parse_translators(&self, page: &BookPage<'_>) -> Option<Vec<String>>;

    /// Title of the original edition.
    fn parse_original_title(&self, page: &BookPage<'_>) -> Option<String>;

    /// Catalog category.
    fn parse_category(&self, page: &BookPage<'_>) -> Option<String>;

    /// Literary genre.
    fn parse_genre(&self, page: &BookPage<'_>) -> Option<String>;

    /// Absolute cover image URLs.
    fn parse_covers(&self, page: &BookPage<'_>) -> Option<Vec<String>>;

    /// Book id from the page URL. A URL without one is a caller error.
    fn parse_identifier(&self, page: &BookPage<'_>) -> Result<String, ParseError>;

    /// Publisher's note, as an HTML fragment.
    fn parse_publisher_note(&self, page: &BookPage<'_>) -> Option<String>;
}

/// Runs every extractor enabled in `fields` (plus covers when `covers` is
/// set) and returns their outputs in a fixed order.
pub fn extract_fields(
    source: &dyn BookSource,
    page: &BookPage<'_>,
    fields: &FieldsConfig,
    covers: bool,
) -> Result<Vec<ExtractedField>, ParseError> {
    let mut extracted = Vec::new();

    if fields.title {
        extracted.push(ExtractedField::Title(source.parse_title(page)));
    }
    if fields.authors {
        extracted.push(ExtractedField::Authors(source.parse_authors(page)));
    }
    if fields.languages {
        extracted.push(ExtractedField::Languages(source.parse_languages(page)));
    }
    if fields.rating {
        extracted.push(ExtractedField::Rating(source.parse_rating(page)));
    }
    if fields.tags {
        extracted.push(ExtractedField::Tags(source.parse_tags(page)));
    }
    if fields.identifier {
        extracted.push(ExtractedField::Identifier(Some(source.parse_identifier(page)?)));
    }
    if fields.pubdate {
        extracted.push(ExtractedField::PubDate(source.parse_pubdate(page)));
    }
    if covers {
        extracted.push(ExtractedField::CoverUrls(source.parse_covers(page)));
    }
    if fields.series {
        extracted.push(ExtractedField::Series(source.parse_series(page)));
    }
    if fields.translators {
        extracted.push(ExtractedField::Translators(source.parse_translators(page)));
    }
    if fields.original_title {
        extracted.push(ExtractedField::OriginalTitle(source.parse_original_title(page)));
    }
    if fields.categories {
        extracted.push(ExtractedField::Category(source.parse_category(page)));
    }
    if fields.genres {
        extracted.push(ExtractedField::Genre(source.parse_genre(page)));
    }
    if fields.comments {
        extracted.push(ExtractedField::PublisherNote(source.parse_publisher_note(page)));
    }

    for field in &extracted {
        if field_is_absent(field) {
            tracing::debug!(url = page.url, field = ?field, "field not found on page");
        }
    }

    Ok(extracted)
}

fn field_is_absent(field: &ExtractedField) -> bool {
    match field {
        ExtractedField::Title(v) | ExtractedField::OriginalTitle(v) => v.is_none(),
        ExtractedField::Category(v) | ExtractedField::Genre(v) => v.is_none(),
        ExtractedField::Identifier(v) | ExtractedField::PublisherNote(v) => v.is_none(),
        ExtractedField::Authors(v) | ExtractedField::Translators(v) => v.is_none(),
        ExtractedField::Languages(v) | ExtractedField::CoverUrls(v) => v.is_none(),
        ExtractedField::PubDate(v) => v.is_none(),
        ExtractedField::Rating(v) => v.is_none(),
        ExtractedField::Tags(v) => v.is_none(),
        ExtractedField::Series(v) => v.is_none(),
    }
}
