//! Structured record retriever.
//!
//! Reads the JSON record collection from disk on every query and scans it
//! with [`ingres_rag_core::structured::search_records`]. A missing collection
//! is not an error: it simply contributes no context.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use ingres_rag_core::models::StructuredRecord;
use ingres_rag_core::retriever::Retriever;
use ingres_rag_core::structured::search_records;

pub struct StructuredRetriever {
    path: PathBuf,
    limit: usize,
}

impl StructuredRetriever {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Loads the whole record collection.
///
/// Returns an empty collection if the file does not exist. A file that
/// exists but is not a JSON array of records is an error.
pub fn load_records(path: &Path) -> Result<Vec<StructuredRecord>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read records: {}", path.display()))
        }
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse records: {}", path.display()))
}

#[async_trait]
impl Retriever for StructuredRetriever {
    fn name(&self) -> &str {
        "records"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let records = load_records(&self.path)?;
        let hits = search_records(query, &records, self.limit);
        tracing::debug!(
            records = records.len(),
            hits = hits.len(),
            "structured retrieval"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_collection_is_empty() {
        let tmp = TempDir::new().unwrap();
        let r = StructuredRetriever::new(tmp.path().join("absent.json"), 5);
        assert!(r.search("pune 2021").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_collection_each_query() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("groundwater.json");
        let r = StructuredRetriever::new(&path, 5);

        std::fs::write(&path, "[]").unwrap();
        assert!(r.search("pune").await.unwrap().is_empty());

        std::fs::write(
            &path,
            r#"[{"district": "Pune", "season": "Monsoon 2021", "gwl": 3.1, "pH": 7.4, "TDS": 290, "Classification": "Safe"}]"#,
        )
        .unwrap();
        let hits = r.search("pune").await.unwrap();
        assert_eq!(
            hits,
            vec!["In Pune (Monsoon 2021): GWL=3.1 m, pH=7.4, TDS=290 mg/L, Classification=Safe."]
        );
    }

    #[tokio::test]
    async fn malformed_collection_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("groundwater.json");
        std::fs::write(&path, "{not json").unwrap();
        let r = StructuredRetriever::new(&path, 5);
        assert!(r.search("pune").await.is_err());
    }
}
