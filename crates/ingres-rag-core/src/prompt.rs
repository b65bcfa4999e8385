//! Prompt template for the groundwater assistant model.
//!
//! The model was fine-tuned on transcripts of the form
//!
//! ```text
//! ### Context:
//! <retrieved context>
//!
//! ### Human: <question>
//! ### Assistant: <answer>
//! ```
//!
//! so generation continues after the trailing assistant marker. The decoded
//! output echoes the whole prompt; [`extract_answer`] keeps only what follows
//! the last assistant marker.

pub const CONTEXT_MARKER: &str = "### Context:";
pub const HUMAN_MARKER: &str = "### Human:";
pub const ASSISTANT_MARKER: &str = "### Assistant:";

/// Builds the generation prompt for a question grounded in `context`.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "{}\n{}\n\n{} {}\n{}",
        CONTEXT_MARKER, context, HUMAN_MARKER, question, ASSISTANT_MARKER
    )
}

/// Returns the text after the last assistant marker, trimmed.
///
/// If the marker is missing entirely (e.g. the tokenizer mangled it), the
/// whole decoded text is returned trimmed.
pub fn extract_answer(decoded: &str) -> String {
    match decoded.rfind(ASSISTANT_MARKER) {
        Some(idx) => decoded[idx + ASSISTANT_MARKER.len()..].trim().to_string(),
        None => decoded.trim().to_string(),
    }
}
