//! Chat orchestrator.
//!
//! Per request:
//!
//! ```text
//! Received ──▶ Validated ──▶ Retrieving ──▶ Fusing ──▶ Generating ──▶ Responded
//!     │
//!     └──▶ Rejected   (question empty after trimming)
//! ```
//!
//! Both retrievers run concurrently and must both succeed. Retrieval always
//! completes before generation starts; generation goes through the engine's
//! single-flight queue. Nothing is retried: the first failure is returned.

use std::sync::Arc;

use ingres_rag_core::fuse::fuse_context;
use ingres_rag_core::models::{ChatRequest, ChatResponse};
use ingres_rag_core::retriever::Retriever;

use crate::engine::GenerationEngine;
use crate::error::{ServiceError, ServiceResult};

/// Stage of a chat request, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Received,
    Validated,
    Rejected,
    Retrieving,
    Fusing,
    Generating,
    Responded,
}

pub struct ChatService {
    structured: Arc<dyn Retriever>,
    documents: Arc<dyn Retriever>,
    engine: Arc<GenerationEngine>,
}

impl ChatService {
    pub fn new(
        structured: Arc<dyn Retriever>,
        documents: Arc<dyn Retriever>,
        engine: Arc<GenerationEngine>,
    ) -> Self {
        Self {
            structured,
            documents,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<GenerationEngine> {
        &self.engine
    }

    /// Trims and validates a question. Empty questions are rejected.
    pub fn validate(request: &ChatRequest) -> ServiceResult<&str> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(ServiceError::EmptyQuestion);
        }
        Ok(question)
    }

    /// Runs both retrievers and fuses their output.
    pub async fn retrieve_context(&self, question: &str) -> ServiceResult<String> {
        gather_context(self.structured.as_ref(), self.documents.as_ref(), question).await
    }

    /// Answers one chat request.
    pub async fn chat(&self, request: &ChatRequest) -> ServiceResult<ChatResponse> {
        trace_stage(ChatStage::Received);
        let question = match Self::validate(request) {
            Ok(q) => q,
            Err(e) => {
                trace_stage(ChatStage::Rejected);
                return Err(e);
            }
        };
        trace_stage(ChatStage::Validated);

        let context = self.retrieve_context(question).await?;

        trace_stage(ChatStage::Generating);
        let reply = self.engine.generate(question, &context).await?;

        trace_stage(ChatStage::Responded);
        Ok(ChatResponse {
            reply,
            context_used: context,
        })
    }
}

/// Queries both retrievers concurrently and fuses the hits, structured first.
///
/// Both must succeed; there is no partial context.
pub async fn gather_context(
    structured: &dyn Retriever,
    documents: &dyn Retriever,
    question: &str,
) -> ServiceResult<String> {
    trace_stage(ChatStage::Retrieving);
    let (structured_hits, document_hits) =
        tokio::try_join!(structured.search(question), documents.search(question))
            .map_err(ServiceError::Retrieval)?;

    tracing::debug!(
        structured = structured_hits.len(),
        documents = document_hits.len(),
        "retrieved context"
    );

    trace_stage(ChatStage::Fusing);
    Ok(fuse_context(
        &structured_hits.join("\n"),
        &document_hits.join("\n"),
    ))
}

fn trace_stage(stage: ChatStage) {
    tracing::trace!(stage = ?stage, "chat");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GenerationSettings, LanguageModel};
    use anyhow::Result;
    use async_trait::async_trait;
    use ingres_rag_core::fuse::NO_CONTEXT;
    use ingres_rag_core::retriever::StaticRetriever;
    use ingres_rag_core::sampling::SamplingParams;

    /// Emits EOS straight away, so every answer is empty.
    struct SilentModel;

    impl LanguageModel for SilentModel {
        fn encode(&self, text: &str) -> Result<Vec<u32>> {
            Ok(text.bytes().map(u32::from).collect())
        }
        fn decode(&self, ids: &[u32]) -> Result<String> {
            let bytes: Vec<u8> = ids.iter().filter(|&&i| i < 256).map(|&i| i as u8).collect();
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        fn eos_token_id(&self) -> u32 {
            256
        }
        fn next_token_logits(&mut self, _ids: &[u32]) -> Result<Vec<f32>> {
            let mut logits = vec![0.0; 257];
            logits[256] = 50.0;
            Ok(logits)
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        fn name(&self) -> &str {
            "failing"
        }
        async fn search(&self, _query: &str) -> Result<Vec<String>> {
            anyhow::bail!("records unreadable")
        }
    }

    async fn service(structured: Arc<dyn Retriever>, documents: Arc<dyn Retriever>) -> ChatService {
        let settings = GenerationSettings {
            sampling: SamplingParams::default(),
            max_new_tokens: 8,
            max_context_tokens: 1024,
            seed: Some(1),
        };
        let engine = GenerationEngine::spawn(settings, || {
            Ok(Box::new(SilentModel) as Box<dyn LanguageModel>)
        })
        .unwrap();
        engine.wait_ready().await.unwrap();
        ChatService::new(structured, documents, Arc::new(engine))
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let svc = service(
            Arc::new(StaticRetriever::new("s", vec![])),
            Arc::new(StaticRetriever::new("d", vec![])),
        )
        .await;
        let err = svc
            .chat(&ChatRequest {
                question: "   ".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::EmptyQuestion));
    }

    #[tokio::test]
    async fn context_orders_structured_before_documents() {
        let svc = service(
            Arc::new(StaticRetriever::new(
                "s",
                vec!["In Pune (2021): ok.".to_string()],
            )),
            Arc::new(StaticRetriever::new(
                "d",
                vec!["From pune.pdf: notes".to_string()],
            )),
        )
        .await;
        let resp = svc
            .chat(&ChatRequest {
                question: "  pune  ".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(resp.context_used, "In Pune (2021): ok.\nFrom pune.pdf: notes");
        assert_eq!(resp.reply, "");
    }

    #[tokio::test]
    async fn no_matches_yields_sentinel() {
        let svc = service(
            Arc::new(StaticRetriever::new("s", vec![])),
            Arc::new(StaticRetriever::new("d", vec![])),
        )
        .await;
        let ctx = svc.retrieve_context("anything").await.unwrap();
        assert_eq!(ctx, NO_CONTEXT);
    }

    #[tokio::test]
    async fn retrieval_failure_surfaces() {
        let svc = service(
            Arc::new(FailingRetriever),
            Arc::new(StaticRetriever::new("d", vec![])),
        )
        .await;
        let err = svc
            .chat(&ChatRequest {
                question: "pune".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Retrieval(_)));
    }
}
