//! Matching search-result entries against a query.

use std::collections::BTreeSet;

/// One entry of a search-result listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateLink {
    /// Title as shown in the listing.
    pub display_title: String,
    /// Author line as shown in the listing, cut before any parenthesis.
    pub display_author_text: String,
    /// Absolute URL of the detail page.
    pub target_url: String,
}

/// Returns the detail-page URLs of matching candidates, in listing order.
///
/// A candidate matches when its title contains any title token and, if
/// `require_author_match` is set, its author line contains any author token.
/// When the author-constrained pass finds nothing, a single title-only pass
/// is run instead.
pub fn match_candidates(
    candidates: &[CandidateLink],
    title_tokens: &BTreeSet<String>,
    author_tokens: &BTreeSet<String>,
    require_author_match: bool,
) -> Vec<String> {
    let results = match_pass(candidates, title_tokens, author_tokens, require_author_match);

    if results.is_empty() && require_author_match {
        tracing::debug!("no author match, retrying search results with title only");
        return match_pass(candidates, title_tokens, author_tokens, false);
    }

    results
}

fn match_pass(
    candidates: &[CandidateLink],
    title_tokens: &BTreeSet<String>,
    author_tokens: &BTreeSet<String>,
    require_author_match: bool,
) -> Vec<String> {
    candidates
        .iter()
        .filter(|candidate| {
            let title = candidate.display_title.to_lowercase();
            let authors = candidate.display_author_text.to_lowercase();

            let title_match = title_tokens.iter().any(|token| title.contains(token.as_str()));
            let author_match = !require_author_match
                || author_tokens.is_empty()
                || author_tokens.iter().any(|token| authors.contains(token.as_str()));

            if title_match && author_match {
                tracing::info!(title = %title, authors = %authors, "match found");
                true
            } else {
                tracing::debug!(title = %title, authors = %authors, "no match");
                false
            }
        })
        .map(|candidate| candidate.target_url.clone())
        .collect()
}
