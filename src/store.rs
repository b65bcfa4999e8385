//! Document store retriever.
//!
//! Enumerates the [`DocumentIndex`] and, for every document, reads its text
//! artifact from disk, lower-cases it, and tests the query terms against it.
//! There is no in-memory text cache: each query costs one file read per
//! indexed document, stopping early once `limit` documents have matched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use ingres_rag_core::documents::{format_document_hit, query_terms, text_matches};
use ingres_rag_core::retriever::Retriever;

use crate::index::DocumentIndex;

pub struct DocumentStore {
    index: Arc<DocumentIndex>,
    limit: usize,
    snippet_chars: usize,
}

impl DocumentStore {
    pub fn new(index: Arc<DocumentIndex>, limit: usize, snippet_chars: usize) -> Self {
        Self {
            index,
            limit,
            snippet_chars,
        }
    }

    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }
}

#[async_trait]
impl Retriever for DocumentStore {
    fn name(&self) -> &str {
        "documents"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self.index.list()?;
        let mut hits = Vec::new();
        for doc in &docs {
            if hits.len() >= self.limit {
                break;
            }
            let text = std::fs::read_to_string(&doc.meta.path).with_context(|| {
                format!(
                    "Failed to read text artifact for {} ({})",
                    doc.id, doc.meta.path
                )
            })?;
            let text_lower = text.to_lowercase();
            if text_matches(&text_lower, &terms) {
                hits.push(format_document_hit(
                    &doc.meta.filename,
                    &text_lower,
                    self.snippet_chars,
                ));
            }
        }

        tracing::debug!(
            documents = docs.len(),
            hits = hits.len(),
            "document retrieval"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingres_rag_core::models::DocumentMeta;
    use tempfile::TempDir;

    fn add_doc(index: &DocumentIndex, dir: &std::path::Path, id: &str, name: &str, text: &str) {
        let path = dir.join(format!("{}.txt", id));
        std::fs::write(&path, text).unwrap();
        index
            .insert(
                id,
                DocumentMeta {
                    filename: name.to_string(),
                    path: path.to_string_lossy().into_owned(),
                    ingested_at: Some(format!("2024-01-01T00:00:0{}Z", id)),
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn matches_and_labels_by_filename() {
        let tmp = TempDir::new().unwrap();
        let index = Arc::new(DocumentIndex::open(tmp.path().join("index.json")).unwrap());
        add_doc(&index, tmp.path(), "1", "aquifers.pdf", "Confined AQUIFERS store water.");
        add_doc(&index, tmp.path(), "2", "rainfall.pdf", "Monsoon rainfall totals.");

        let store = DocumentStore::new(index, 3, 400);
        let hits = store.search("aquifer depth").await.unwrap();
        assert_eq!(hits, vec!["From aquifers.pdf: confined aquifers store water."]);
    }

    #[tokio::test]
    async fn results_are_capped() {
        let tmp = TempDir::new().unwrap();
        let index = Arc::new(DocumentIndex::open(tmp.path().join("index.json")).unwrap());
        for i in 0..6 {
            add_doc(
                &index,
                tmp.path(),
                &i.to_string(),
                &format!("r{}.pdf", i),
                "water table",
            );
        }
        let store = DocumentStore::new(index, 3, 400);
        let hits = store.search("water").await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].starts_with("From r0.pdf"));
    }

    #[tokio::test]
    async fn snippet_is_a_prefix() {
        let tmp = TempDir::new().unwrap();
        let index = Arc::new(DocumentIndex::open(tmp.path().join("index.json")).unwrap());
        add_doc(&index, tmp.path(), "1", "long.pdf", &"x".repeat(2000));
        let store = DocumentStore::new(index, 3, 400);
        let hits = store.search("x").await.unwrap();
        assert_eq!(hits[0], format!("From long.pdf: {}", "x".repeat(400)));
    }

    #[tokio::test]
    async fn missing_artifact_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let index = Arc::new(DocumentIndex::open(tmp.path().join("index.json")).unwrap());
        index
            .insert(
                "gone",
                DocumentMeta {
                    filename: "gone.pdf".to_string(),
                    path: tmp.path().join("gone.txt").to_string_lossy().into_owned(),
                    ingested_at: None,
                },
            )
            .unwrap();
        let store = DocumentStore::new(index, 3, 400);
        assert!(store.search("anything").await.is_err());
    }
}
