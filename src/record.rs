//! Metadata records and the builder that folds extracted fields into them.

use crate::comments::{self, AuxFacts};
use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Namespace of the site's book id in a record's identifiers.
pub const IDENTIFIER: &str = "biblionetka";

/// A book's membership in a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesEntry {
    pub name: String,
    /// Position within the series, when the page states one.
    pub ordinal: Option<u32>,
}

impl SeriesEntry {
    pub fn new(name: impl Into<String>, ordinal: Option<u32>) -> Self {
        Self {
            name: name.into(),
            ordinal,
        }
    }
}

impl fmt::Display for SeriesEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "{}[{}]", self.name, ordinal),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Output of a single extractor. `None` means the page lacks the fact.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedField {
    Title(Option<String>),
    Authors(Option<Vec<String>>),
    PubDate(Option<DateTime<Utc>>),
    Languages(Option<Vec<String>>),
    Rating(Option<u8>),
    Tags(Option<BTreeSet<String>>),
    Series(Option<Vec<SeriesEntry>>),
    Translators(Option<Vec<String>>),
    OriginalTitle(Option<String>),
    Category(Option<String>),
    Genre(Option<String>),
    CoverUrls(Option<Vec<String>>),
    Identifier(Option<String>),
    PublisherNote(Option<String>),
}

/// A finished metadata record for one detail page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataRecord {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_index: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub identifiers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub has_cover: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cover_urls: Vec<String>,
    /// Detail page the record was built from.
    pub source_url: String,
}

impl MetadataRecord {
    /// The site's book id, if the identifier field was extracted.
    pub fn book_id(&self) -> Option<&str> {
        self.identifiers.get(IDENTIFIER).map(String::as_str)
    }
}

/// Accumulates extracted fields for one page.
///
/// Title and authors fall back to the query values when extraction was
/// disabled or found nothing.
#[derive(Debug)]
pub struct RecordBuilder {
    fallback_title: String,
    fallback_authors: Vec<String>,
    source_url: String,
    title: Option<String>,
    authors: Option<Vec<String>>,
    pubdate: Option<DateTime<Utc>>,
    languages: Vec<String>,
    rating: Option<u8>,
    tags: BTreeSet<String>,
    series: Vec<SeriesEntry>,
    identifier: Option<String>,
    cover_urls: Vec<String>,
    publisher_note: Option<String>,
    aux: AuxFacts,
}

impl RecordBuilder {
    pub fn new(fallback_title: &str, fallback_authors: &[String], source_url: &str) -> Self {
        Self {
            fallback_title: fallback_title.to_string(),
            fallback_authors: fallback_authors.to_vec(),
            source_url: source_url.to_string(),
            title: None,
            authors: None,
            pubdate: None,
            languages: Vec::new(),
            rating: None,
            tags: BTreeSet::new(),
            series: Vec::new(),
            identifier: None,
            cover_urls: Vec::new(),
            publisher_note: None,
            aux: AuxFacts::default(),
        }
    }

    /// Folds one extracted field into the record under construction.
    pub fn apply(&mut self, field: ExtractedField) -> &mut Self {
        match field {
            ExtractedField::Title(value) => self.title = value,
            ExtractedField::Authors(value) => self.authors = value,
            ExtractedField::PubDate(value) => self.pubdate = value,
            ExtractedField::Languages(value) => self.languages = value.unwrap_or_default(),
            ExtractedField::Rating(value) => self.rating = value,
            ExtractedField::Tags(value) => self.tags = value.unwrap_or_default(),
            ExtractedField::Series(value) => {
                let series = value.unwrap_or_default();
                self.aux.series = series.clone();
                self.series = series;
            }
            ExtractedField::Translators(value) => self.aux.translators = value.unwrap_or_default(),
            ExtractedField::OriginalTitle(value) => self.aux.original_title = value,
            ExtractedField::Category(value) => self.aux.category = value,
            ExtractedField::Genre(value) => self.aux.genre = value,
            ExtractedField::CoverUrls(value) => self.cover_urls = value.unwrap_or_default(),
            ExtractedField::Identifier(value) => self.identifier = value,
            ExtractedField::PublisherNote(value) => self.publisher_note = value,
        }
        self
    }

    /// Finishes the record. With `embed_comments` the publisher note and the
    /// auxiliary facts are assembled into `comments`.
    pub fn build(self, embed_comments: bool) -> Result<MetadataRecord, ParseError> {
        let title = self
            .title
            .filter(|title| !title.is_empty())
            .unwrap_or(self.fallback_title);
        if title.is_empty() {
            return Err(ParseError::MissingField("title"));
        }

        let authors = self
            .authors
            .filter(|authors| authors.iter().any(|a| !a.is_empty()))
            .unwrap_or(self.fallback_authors);
        if authors.is_empty() {
            return Err(ParseError::MissingField("authors"));
        }

        let comments = if embed_comments {
            let base = self.publisher_note.unwrap_or_default();
            Some(comments::assemble(&base, &self.aux)).filter(|c| !c.is_empty())
        } else {
            None
        };

        let (series, series_index) = match self.series.into_iter().next() {
            Some(first) => (Some(first.name), first.ordinal),
            None => (None, None),
        };

        let identifiers = self
            .identifier
            .map(|id| BTreeMap::from([(IDENTIFIER.to_string(), id)]))
            .unwrap_or_default();

        Ok(MetadataRecord {
            title,
            authors,
            pubdate: self.pubdate,
            languages: self.languages,
            rating: self.rating,
            tags: self.tags,
            series,
            series_index,
            identifiers,
            comments,
            has_cover: !self.cover_urls.is_empty(),
            cover_urls: self.cover_urls,
            source_url: self.source_url,
        })
    }
}
