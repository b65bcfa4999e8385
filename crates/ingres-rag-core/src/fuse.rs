//! Context fusion: merges retriever outputs into one context block.

/// Substituted when neither retriever contributed anything.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Joins structured results and document results (each already
/// newline-joined) with a newline, trimming surrounding whitespace.
///
/// Never returns an empty string: empty input yields [`NO_CONTEXT`]. No
/// truncation happens here; upstream retrievers cap their own output.
pub fn fuse_context(structured: &str, documents: &str) -> String {
    let fused = format!("{}\n{}", structured, documents);
    let fused = fused.trim();
    if fused.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        fused.to_string()
    }
}
