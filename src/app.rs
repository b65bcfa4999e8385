//! Wiring of the assistant's components from a [`Config`].
//!
//! Both the HTTP server and the one-shot CLI commands build the same
//! [`App`]: the document index, the ingestion pipeline, both retrievers, and
//! the chat service sitting on a generation engine.

use anyhow::Result;
use std::sync::Arc;

use ingres_rag_core::retriever::Retriever;

use crate::chat::ChatService;
use crate::config::Config;
use crate::engine::{load_model, GenerationEngine, GenerationSettings};
use crate::index::DocumentIndex;
use crate::ingest::IngestPipeline;
use crate::records::StructuredRetriever;
use crate::store::DocumentStore;

/// Everything a request handler needs. Cheap to clone.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub index: Arc<DocumentIndex>,
    pub ingest: IngestPipeline,
    pub chat: Arc<ChatService>,
}

impl App {
    /// Builds the app on an already started engine.
    pub fn open(config: &Config, engine: Arc<GenerationEngine>) -> Result<Self> {
        let index = Arc::new(DocumentIndex::open(config.index_path())?);
        let (structured, documents) = retrievers(config, &index);
        let chat = Arc::new(ChatService::new(structured, documents, engine));

        Ok(Self {
            config: Arc::new(config.clone()),
            ingest: IngestPipeline::new(config, Arc::clone(&index)),
            index,
            chat,
        })
    }

    /// Builds the app and starts loading the configured model in the background.
    pub fn open_with_model(config: &Config) -> Result<Self> {
        let model_config = config.model.clone();
        let engine = GenerationEngine::spawn(GenerationSettings::from(&config.model), move || {
            load_model(&model_config)
        })?;
        Self::open(config, Arc::new(engine))
    }

    pub fn engine(&self) -> &Arc<GenerationEngine> {
        self.chat.engine()
    }
}

/// The structured-record and document retrievers, in fusion order.
pub fn retrievers(
    config: &Config,
    index: &Arc<DocumentIndex>,
) -> (Arc<dyn Retriever>, Arc<dyn Retriever>) {
    let structured: Arc<dyn Retriever> = Arc::new(StructuredRetriever::new(
        config.data.records_path.clone(),
        config.retrieval.structured_limit,
    ));
    let documents: Arc<dyn Retriever> = Arc::new(DocumentStore::new(
        Arc::clone(index),
        config.retrieval.document_limit,
        config.retrieval.document_snippet_chars,
    ));
    (structured, documents)
}
