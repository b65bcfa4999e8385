//! Request-facing error taxonomy.
//!
//! Internal plumbing uses `anyhow`; the chat and ingest operations surface
//! one of these variants so callers (HTTP, CLI) can tell a bad request from
//! a broken document from an engine that is not there.

use thiserror::Error;

/// Failure of a chat or ingest operation.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The question was empty after trimming. Rejected before any work.
    #[error("question must not be empty")]
    EmptyQuestion,

    /// The uploaded document could not be turned into indexed text.
    #[error(transparent)]
    Ingestion(#[from] IngestError),

    /// A retriever failed (unreadable record collection, missing artifact).
    #[error("retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    /// The generation engine is not loaded, still loading, or has stopped.
    #[error("generation engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine was reachable but inference itself failed.
    #[error("generation failed: {0:#}")]
    Generation(anyhow::Error),
}

/// Ingestion failures. None of them leaves an entry in the document index.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("uploaded document is empty")]
    EmptyUpload,

    #[error("document too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("document storage failed: {0:#}")]
    Storage(anyhow::Error),
}

impl IngestError {
    /// Whether the failure is the caller's document rather than our storage.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, IngestError::Storage(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
