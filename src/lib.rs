//! # ingres-rag
//!
//! Retrieval-augmented question answering over groundwater data.
//!
//! Each question is answered from two sources: a JSON collection of
//! structured groundwater records (district, season, level, pH, TDS,
//! classification) and the text of reports uploaded as PDFs. The matching
//! snippets are fused into a context block and handed to a locally loaded
//! causal language model, which runs one generation at a time.
//!
//! ## Architecture
//!
//! ```text
//!  POST /ingest ──▶ Ingest ──▶ pdf_texts/<id>.txt + index.json
//!                                          │
//!  POST /chat ──▶ Chat ──┬─▶ StructuredRetriever (records JSON)
//!                        ├─▶ DocumentStore (index + artifacts)
//!                        └─▶ fuse ──▶ GenerationEngine (single flight)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`app`] | Component wiring shared by server and CLI |
//! | [`records`] | Structured record retriever |
//! | [`index`] | Persistent document index |
//! | [`store`] | Document text retriever |
//! | [`extract`] | PDF / plain-text extraction |
//! | [`ingest`] | Upload ingestion pipeline |
//! | [`engine`] | Model loading and single-flight generation |
//! | [`chat`] | Chat orchestration |
//! | [`server`] | HTTP server |
//!
//! Pure matching, fusion, prompting, and sampling logic lives in
//! `ingres-rag-core`.

pub mod app;
pub mod chat;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod records;
pub mod server;
pub mod store;
