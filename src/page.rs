//! Parsed pages and small DOM helpers shared by the extractors.
//!
//! Detail pages present most facts as a `<strong>` label followed by a bare
//! text node, e.g. `<strong>Kategoria:</strong> literatura piękna<br/>`.
//! The helpers here locate such labels and read the text after them.

use crate::error::ParseError;
use scraper::{ElementRef, Html, Selector};

/// Parses a response body into a document tree.
pub fn parse(body: &str) -> Html {
    Html::parse_document(body)
}

/// Returns the only element matching `selector`.
///
/// Zero or several matches mean the page is not the expected shape.
pub fn locate_single<'a>(doc: &'a Html, selector: &Selector) -> Result<ElementRef<'a>, ParseError> {
    let mut matches = doc.select(selector);
    match (matches.next(), matches.next()) {
        (Some(node), None) => Ok(node),
        (None, _) => Err(ParseError::AmbiguousStructure { count: 0 }),
        (Some(_), Some(_)) => Err(ParseError::AmbiguousStructure {
            count: 2 + matches.count(),
        }),
    }
}

/// A detail page together with its located book node.
#[derive(Clone, Copy)]
pub struct BookPage<'a> {
    /// Whole document, for facts that live outside the book node.
    pub doc: &'a Html,
    /// The single book detail node.
    pub book: ElementRef<'a>,
    /// URL the page was fetched from.
    pub url: &'a str,
}

/// Trimmed text content of an element and all its descendants.
pub fn text_of(elem: ElementRef<'_>) -> String {
    elem.text().collect::<String>().trim().to_string()
}

/// Text of the element's own text-node children, ignoring nested elements.
pub fn own_text(elem: ElementRef<'_>) -> String {
    elem.children()
        .filter_map(|child| child.value().as_text())
        .map(|text| &**text)
        .collect()
}

/// The text node directly following `elem`, trimmed. `None` when the next
/// sibling is an element or there is no sibling.
pub fn tail_text(elem: ElementRef<'_>) -> Option<String> {
    let text = elem.next_sibling()?.value().as_text()?.trim().to_string();
    Some(text)
}

/// The next sibling that is an element.
pub fn next_element(elem: ElementRef<'_>) -> Option<ElementRef<'_>> {
    elem.next_siblings().find_map(ElementRef::wrap)
}

/// Finds the first `<strong>` under `scope` whose own text contains `needle`
/// and none of `excluded`.
pub fn find_label<'a>(
    scope: ElementRef<'a>,
    needle: &str,
    excluded: &[&str],
) -> Option<ElementRef<'a>> {
    scope
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|elem| elem.value().name() == "strong")
        .find(|elem| {
            let text = own_text(*elem);
            text.contains(needle) && !excluded.iter().any(|ex| text.contains(ex))
        })
}

/// Non-empty tail text of the label containing `needle`.
pub fn labelled_value(scope: ElementRef<'_>, needle: &str, excluded: &[&str]) -> Option<String> {
    find_label(scope, needle, excluded)
        .and_then(tail_text)
        .filter(|value| !value.is_empty())
}

/// Serializes an element as HTML without its `style` attribute.
pub fn outer_html_without_style(elem: ElementRef<'_>) -> String {
    let name = elem.value().name();
    let mut html = format!("<{name}");
    for (attr, value) in elem.value().attrs() {
        if attr.eq_ignore_ascii_case("style") {
            continue;
        }
        html.push_str(&format!(
            " {}=\"{}\"",
            attr,
            value.replace('&', "&amp;").replace('"', "&quot;")
        ));
    }
    html.push('>');
    html.push_str(&elem.inner_html());
    html.push_str(&format!("</{name}>"));
    html
}
