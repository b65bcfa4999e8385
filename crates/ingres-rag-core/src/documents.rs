//! Lexical matching over ingested document text.
//!
//! A document matches when any whitespace-delimited term of the lower-cased
//! query occurs as a substring of the lower-cased document text. A hit is
//! rendered as the leading characters of the lower-cased text, labelled with
//! the document's original filename.

/// Default maximum number of document hits returned per query.
pub const DEFAULT_DOCUMENT_LIMIT: usize = 3;
/// Default snippet length, in characters, for a document hit.
pub const DEFAULT_SNIPPET_CHARS: usize = 400;

/// Splits a query into lower-cased terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Whether any term occurs in the (already lower-cased) text.
pub fn text_matches(text_lower: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| text_lower.contains(t.as_str()))
}

/// Returns at most `max_chars` leading characters of `text`.
///
/// Counts `char`s, not bytes, so multi-byte text is never split mid-character.
pub fn prefix_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Renders one document hit as a line of context.
pub fn format_document_hit(filename: &str, text_lower: &str, snippet_chars: usize) -> String {
    format!("From {}: {}", filename, prefix_chars(text_lower, snippet_chars))
}
