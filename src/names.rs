//! Name normalization: splitting, reordering, joining and tokenizing
//! person names as they appear on the site and in queries.

use std::collections::BTreeSet;

/// Separator between names in a list, both on the site and in queries.
pub const NAMES_DELIMITER: &str = ", ";

/// Author names that carry no information and are dropped before searching.
pub const SKIP_AUTHORS: &[&str] = &["Unknown", "Nieznany"];

/// Splits a delimiter-joined list of names.
pub fn split_names(text: &str) -> Vec<String> {
    text.split(NAMES_DELIMITER).map(str::to_string).collect()
}

/// Moves the first space-separated token to the end.
///
/// The site lists people surname first ("Kowalski Jan"); records carry
/// "Jan Kowalski".
/// This is a rotation, so it is only its own inverse for two-token names.
pub fn reverse_tokens(name: &str) -> String {
    match name.split_once(' ') {
        Some((first, rest)) => format!("{rest} {first}"),
        None => name.to_string(),
    }
}

/// Splits a list of names and rotates every entry with [`reverse_tokens`].
pub fn split_reversed(text: &str) -> Vec<String> {
    split_names(text)
        .iter()
        .map(|name| reverse_tokens(name))
        .collect()
}

/// Joins names for a search phrase, optionally keeping only the first one.
pub fn join_names(names: &[String], only_first: bool) -> String {
    let names = if only_first {
        &names[..names.len().min(1)]
    } else {
        names
    };
    names.join(NAMES_DELIMITER)
}

/// Lowercase word tokens of the given names.
///
/// Single characters and tokens ending in a period are initials and would
/// match almost anything, so they are dropped.
pub fn tokenize(names: &[String]) -> BTreeSet<String> {
    names
        .iter()
        .flat_map(|name| name.split(' '))
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() > 1 && !token.ends_with('.'))
        .collect()
}

/// Lowercase word tokens of a title, ignoring one-character words.
pub fn title_tokens(title: &str) -> BTreeSet<String> {
    title
        .to_lowercase()
        .split(' ')
        .filter(|token| token.chars().count() > 1)
        .map(str::to_string)
        .collect()
}

/// Drops placeholder authors such as "Unknown".
pub fn without_placeholders(authors: &[String]) -> Vec<String> {
    authors
        .iter()
        .filter(|author| !SKIP_AUTHORS.contains(&author.as_str()))
        .cloned()
        .collect()
}
