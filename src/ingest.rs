//! Document ingestion pipeline.
//!
//! Turns an uploaded document into a searchable text artifact:
//!
//! 1. Assign a fresh id (UUID v4, hex without dashes).
//! 2. Write the raw bytes to `<store>/<id>.<ext>` (transient).
//! 3. Extract text page by page; empty pages contribute nothing.
//! 4. Write the newline-joined text to `<store>/<id>.txt`.
//! 5. Remove the raw bytes (also on failure or panic).
//! 6. Insert `<id> → {filename, path, ingested_at}` into the index.
//!
//! The index is touched last, so a failed extraction or write never leaves
//! an index entry behind. Ingestion is not idempotent: uploading the same
//! file twice creates two documents.

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use ingres_rag_core::documents::prefix_chars;
use ingres_rag_core::models::{DocumentMeta, IngestReceipt};

use crate::config::Config;
use crate::error::IngestError;
use crate::extract::{detect_content_type, extract_pages, join_pages, MIME_PDF};
use crate::index::DocumentIndex;

#[derive(Clone)]
pub struct IngestPipeline {
    index: Arc<DocumentIndex>,
    store_dir: PathBuf,
    receipt_snippet_chars: usize,
    max_upload_bytes: usize,
}

impl IngestPipeline {
    pub fn new(config: &Config, index: Arc<DocumentIndex>) -> Self {
        Self {
            index,
            store_dir: config.store.dir.clone(),
            receipt_snippet_chars: config.ingest.receipt_snippet_chars,
            max_upload_bytes: config.ingest.max_upload_bytes,
        }
    }

    /// Ingests one document and returns its receipt.
    ///
    /// Extraction is CPU-bound and runs on the blocking pool. A panic inside
    /// the PDF parser is reported as an extraction failure.
    pub async fn ingest(&self, bytes: Vec<u8>, filename: &str) -> Result<IngestReceipt, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::EmptyUpload);
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(IngestError::TooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let filename = match filename.trim() {
            "" => "upload".to_string(),
            name => name.to_string(),
        };
        let pipeline = self.clone();
        let name = filename.clone();
        let receipt = tokio::task::spawn_blocking(move || pipeline.ingest_blocking(&bytes, &name))
            .await
            .map_err(|e| IngestError::Extraction(format!("extractor aborted: {}", e)))??;

        tracing::info!(
            id = %receipt.id,
            filename = %receipt.filename,
            "document ingested"
        );
        Ok(receipt)
    }

    fn ingest_blocking(&self, bytes: &[u8], filename: &str) -> Result<IngestReceipt, IngestError> {
        let content_type = detect_content_type(filename, bytes)
            .ok_or_else(|| IngestError::Unsupported(filename.to_string()))?;

        std::fs::create_dir_all(&self.store_dir)
            .with_context(|| format!("Failed to create store dir: {}", self.store_dir.display()))
            .map_err(IngestError::Storage)?;

        let id = Uuid::new_v4().simple().to_string();
        let ext = if content_type == MIME_PDF { "pdf" } else { "upload" };

        let text = {
            let raw = TransientFile::write(self.store_dir.join(format!("{}.{}", id, ext)), bytes)
                .map_err(IngestError::Storage)?;
            let persisted = std::fs::read(raw.path())
                .with_context(|| format!("Failed to read back {}", raw.path().display()))
                .map_err(IngestError::Storage)?;
            let pages = extract_pages(&persisted, content_type)
                .map_err(|e| IngestError::Extraction(e.to_string()))?;
            tracing::debug!(id = %id, pages = pages.len(), "extracted text");
            join_pages(&pages)
        };

        let txt_path = self.store_dir.join(format!("{}.txt", id));
        std::fs::write(&txt_path, &text)
            .with_context(|| format!("Failed to write text artifact: {}", txt_path.display()))
            .map_err(IngestError::Storage)?;

        let meta = DocumentMeta {
            filename: filename.to_string(),
            path: txt_path.to_string_lossy().into_owned(),
            ingested_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
        };
        if let Err(e) = self.index.insert(&id, meta) {
            // An artifact without an index entry is invisible, but don't leave it around.
            let _ = std::fs::remove_file(&txt_path);
            return Err(IngestError::Storage(e));
        }

        Ok(IngestReceipt {
            id,
            filename: filename.to_string(),
            snippet: prefix_chars(&text, self.receipt_snippet_chars).to_string(),
        })
    }
}

/// A file that is deleted when dropped, including during unwinding.
struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    fn write(path: PathBuf, bytes: &[u8]) -> anyhow::Result<Self> {
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write upload: {}", path.display()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove raw upload");
        }
    }
}
