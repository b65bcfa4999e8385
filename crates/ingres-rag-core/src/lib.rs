//! # ingres-rag core
//!
//! Pure logic shared by the ingres-rag service: data models, the
//! [`retriever::Retriever`] capability, lexical matching over structured
//! records and ingested documents, context fusion, the prompt template, and
//! token sampling.
//!
//! This crate performs no filesystem I/O and does not depend on tokio. The
//! service crate supplies record collections, document text, and model
//! logits, and calls into these functions.

pub mod documents;
pub mod fuse;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod sampling;
pub mod structured;
