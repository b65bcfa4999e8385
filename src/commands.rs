//! One-shot CLI commands: `ingest`, `ask`, `context`, and `documents`.
//!
//! Each runs the same pipeline as the HTTP server against the configured
//! store and prints the result to stdout.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use ingres_rag_core::models::{ChatRequest, IngestReceipt};

use crate::app::{retrievers, App};
use crate::chat::gather_context;
use crate::config::Config;
use crate::index::DocumentIndex;
use crate::ingest::IngestPipeline;

/// Ingests a file from disk and returns its receipt.
pub async fn ingest_file(config: &Config, path: &Path) -> Result<IngestReceipt> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let index = Arc::new(DocumentIndex::open(config.index_path())?);
    let pipeline = IngestPipeline::new(config, index);
    Ok(pipeline.ingest(bytes, &filename).await?)
}

pub async fn run_ingest(config: &Config, path: &Path) -> Result<()> {
    let receipt = ingest_file(config, path).await?;
    println!("id:       {}", receipt.id);
    println!("filename: {}", receipt.filename);
    println!("snippet:  {}", receipt.snippet.replace('\n', " "));
    Ok(())
}

/// Loads the model, waits for it, and answers one question.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let app = App::open_with_model(config)?;
    app.engine().wait_ready().await?;

    let response = app
        .chat
        .chat(&ChatRequest {
            question: question.to_string(),
        })
        .await?;

    println!("{}", response.reply);
    println!();
    println!("--- context ---");
    println!("{}", response.context_used);
    Ok(())
}

/// Prints the fused retrieval context without loading the model.
pub async fn run_context(config: &Config, question: &str) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }
    let index = Arc::new(DocumentIndex::open(config.index_path())?);
    let (structured, documents) = retrievers(config, &index);
    let context = gather_context(structured.as_ref(), documents.as_ref(), question).await?;
    println!("{}", context);
    Ok(())
}

pub fn run_documents(config: &Config) -> Result<()> {
    let index = DocumentIndex::open(config.index_path())?;
    let docs = index.list()?;
    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    println!("{:<34} {:<27} FILENAME", "ID", "INGESTED");
    for doc in docs {
        println!(
            "{:<34} {:<27} {}",
            doc.id,
            doc.meta.ingested_at.as_deref().unwrap_or("-"),
            doc.meta.filename
        );
    }
    Ok(())
}
