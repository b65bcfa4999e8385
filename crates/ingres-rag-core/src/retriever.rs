//! The retrieval capability shared by every context source.
//!
//! A [`Retriever`] turns a query into an ordered list of already-formatted
//! text snippets. The chat orchestrator only ever sees this trait, so a
//! lexical retriever can be replaced by an embedding-backed one without
//! touching orchestration.

use anyhow::Result;
use async_trait::async_trait;

/// A context source that can be searched with a natural-language query.
///
/// Implementations must be `Send + Sync`; the orchestrator holds them behind
/// `Arc<dyn Retriever>` and may drive several concurrently.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use ingres_rag_core::retriever::Retriever;
///
/// struct Glossary;
///
/// #[async_trait]
/// impl Retriever for Glossary {
///     fn name(&self) -> &str { "glossary" }
///
///     async fn search(&self, query: &str) -> Result<Vec<String>> {
///         Ok(if query.contains("aquifer") {
///             vec!["An aquifer is a body of water-bearing rock.".to_string()]
///         } else {
///             Vec::new()
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Short identifier used in logs (e.g. `"records"`, `"documents"`).
    fn name(&self) -> &str;

    /// Returns matching snippets, best-first, already capped by the
    /// implementation's own limit.
    async fn search(&self, query: &str) -> Result<Vec<String>>;
}

/// A retriever over a fixed list of snippets, matching case-insensitive
/// substrings of the query. Handy for wiring tests and demos.
pub struct StaticRetriever {
    name: String,
    snippets: Vec<String>,
}

impl StaticRetriever {
    pub fn new(name: impl Into<String>, snippets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            snippets,
        }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let query = query.to_lowercase();
        Ok(self
            .snippets
            .iter()
            .filter(|s| {
                query
                    .split_whitespace()
                    .any(|term| s.to_lowercase().contains(term))
            })
            .cloned()
            .collect())
    }
}
