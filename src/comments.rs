//! Assembly of the rich-text comment from the publisher note and
//! auxiliary facts that have no dedicated metadata field.

use crate::record::SeriesEntry;

/// Facts embedded in the comment after the publisher note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxFacts {
    pub original_title: Option<String>,
    pub translators: Vec<String>,
    pub category: Option<String>,
    pub genre: Option<String>,
    pub series: Vec<SeriesEntry>,
}

impl AuxFacts {
    /// Returns true if nothing would be appended.
    pub fn is_empty(&self) -> bool {
        self.original_title.is_none()
            && self.translators.is_empty()
            && self.category.is_none()
            && self.genre.is_none()
            && self.series.is_empty()
    }
}

/// Appends one paragraph per present fact to `base`.
///
/// The order is fixed: original title, translators, category, genre, series.
pub fn assemble(base: &str, facts: &AuxFacts) -> String {
    let mut comments = base.to_string();
    if facts.is_empty() {
        return comments;
    }

    if let Some(original_title) = &facts.original_title {
        comments.push_str(&format!(
            r#"<p id="tytul_oryginalu">Tytuł oryginału: <em>{}</em></p>"#,
            escape_html(original_title)
        ));
        tracing::debug!("embedded original title in comment");
    }

    if !facts.translators.is_empty() {
        comments.push_str(&format!(
            r#"<p id="tlumaczenie">Tłumaczenie: {}</p>"#,
            escape_html(&facts.translators.join(", "))
        ));
        tracing::debug!("embedded translators in comment");
    }

    if let Some(category) = &facts.category {
        comments.push_str(&format!(
            r#"<p id="kategoria">Kategoria: {}</p>"#,
            escape_html(category)
        ));
        tracing::debug!("embedded category in comment");
    }

    if let Some(genre) = &facts.genre {
        comments.push_str(&format!(
            r#"<p id="gatunek">Gatunek: {}</p>"#,
            escape_html(genre)
        ));
        tracing::debug!("embedded genre in comment");
    }

    if !facts.series.is_empty() {
        let series: Vec<String> = facts.series.iter().map(SeriesEntry::to_string).collect();
        comments.push_str(&format!(
            r#"<p id="cykl">Cykle: {}</p>"#,
            escape_html(&series.join(", "))
        ));
        tracing::debug!("embedded series in comment");
    }

    comments
}

/// Escapes text for inclusion in HTML element content.
pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
