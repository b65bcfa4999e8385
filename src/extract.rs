//! Page-by-page text extraction for uploaded documents.
//!
//! PDFs go through `pdf-extract`; plain-text uploads pass through as a single
//! page. The caller joins non-empty pages with newlines. Pages that yield no
//! text are dropped without error.

/// Supported document kinds.
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

/// Extraction error. Malformed input the parser can report comes back as
/// one of these; parser panics are contained by the ingest pipeline.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Text(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Text(e) => write!(f, "text decoding failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Guesses the content type from the filename extension, falling back to
/// the PDF magic bytes.
pub fn detect_content_type(filename: &str, bytes: &[u8]) -> Option<&'static str> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".pdf") || bytes.starts_with(b"%PDF") {
        Some(MIME_PDF)
    } else if lower.ends_with(".txt") || lower.ends_with(".md") {
        Some(MIME_TEXT)
    } else {
        None
    }
}

/// Extracts text per page. Empty pages are omitted.
pub fn extract_pages(bytes: &[u8], content_type: &str) -> Result<Vec<String>, ExtractError> {
    let pages = match content_type {
        MIME_PDF => extract_pdf_pages(bytes)?,
        MIME_TEXT => vec![String::from_utf8(bytes.to_vec())
            .map_err(|e| ExtractError::Text(e.to_string()))?],
        _ => {
            return Err(ExtractError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    };
    Ok(pages
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect())
}

/// Joins extracted pages the way they are persisted: each page followed by
/// a newline.
pub fn join_pages(pages: &[String]) -> String {
    let mut out = String::new();
    for page in pages {
        out.push_str(page);
        out.push('\n');
    }
    out
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_pages(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pages(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_utf8_text_returns_error() {
        let err = extract_pages(&[0xff, 0xfe, 0x00], MIME_TEXT).unwrap_err();
        assert!(matches!(err, ExtractError::Text(_)));
    }

    #[test]
    fn blank_text_has_no_pages() {
        assert!(extract_pages(b"  \n ", MIME_TEXT).unwrap().is_empty());
    }

    #[test]
    fn detects_types() {
        assert_eq!(detect_content_type("Report.PDF", b""), Some(MIME_PDF));
        assert_eq!(detect_content_type("upload", b"%PDF-1.4"), Some(MIME_PDF));
        assert_eq!(detect_content_type("notes.md", b"# hi"), Some(MIME_TEXT));
        assert_eq!(detect_content_type("sheet.xlsx", b"PK"), None);
    }

    #[test]
    fn pages_are_newline_terminated() {
        let pages = vec!["one".to_string(), "two".to_string()];
        assert_eq!(join_pages(&pages), "one\ntwo\n");
        assert_eq!(join_pages(&[]), "");
    }
}
