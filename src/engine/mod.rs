//! Generation engine: one loaded language model behind a single-flight gate.
//!
//! The model lives on a dedicated OS thread. Callers submit prompts over an
//! unbounded FIFO channel and await a oneshot reply, so the async runtime
//! never blocks on inference and generations run strictly one at a time, in
//! arrival order. There is no batching, timeout, or cancellation: a job that
//! has been queued runs to completion.
//!
//! ```text
//!  chat request ─┐
//!  chat request ─┼─▶ mpsc (FIFO) ─▶ worker thread ─▶ LanguageModel
//!  chat request ─┘        ▲               │
//!                         └── oneshot ◀───┘
//! ```
//!
//! # Lifecycle
//!
//! [`GenerationEngine::spawn`] returns immediately in [`EngineState::Loading`];
//! the worker runs the loader and moves to `Ready` or `Failed`. Requests that
//! arrive while not `Ready` fail fast with
//! [`ServiceError::EngineUnavailable`] instead of queueing behind the load.

#[cfg(feature = "tract-model")]
mod tract_model;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};

use ingres_rag_core::prompt::{build_prompt, extract_answer};
use ingres_rag_core::sampling::{sample_next_token, SamplingParams};

use crate::config::ModelConfig;
use crate::error::ServiceError;

/// An autoregressive language model with its tokenizer.
///
/// Implementations need not be reentrant: the engine calls them from a
/// single thread only.
pub trait LanguageModel: Send {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decodes ids to text, skipping special tokens.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// End-of-sequence id; generation stops after sampling it.
    fn eos_token_id(&self) -> u32;

    /// Logits over the vocabulary for the token following `ids`.
    fn next_token_logits(&mut self, ids: &[u32]) -> Result<Vec<f32>>;
}

/// Loads the configured on-disk model.
#[cfg(feature = "tract-model")]
pub fn load_model(config: &ModelConfig) -> Result<Box<dyn LanguageModel>> {
    Ok(Box::new(tract_model::TractCausalLm::load(config)?))
}

#[cfg(not(feature = "tract-model"))]
pub fn load_model(_config: &ModelConfig) -> Result<Box<dyn LanguageModel>> {
    anyhow::bail!("ingres was built without a model backend (enable the `tract-model` feature)")
}

/// Fixed decoding settings, chosen once at startup.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub sampling: SamplingParams,
    pub max_new_tokens: usize,
    pub max_context_tokens: usize,
    pub seed: Option<u64>,
}

impl From<&ModelConfig> for GenerationSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            sampling: config.sampling(),
            max_new_tokens: config.max_new_tokens,
            max_context_tokens: config.max_context_tokens,
            seed: config.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Loading,
    Ready,
    Failed(String),
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Loading => "loading",
            EngineState::Ready => "ready",
            EngineState::Failed(_) => "failed",
            EngineState::Stopped => "stopped",
        }
    }
}

struct Job {
    prompt: String,
    reply: oneshot::Sender<Result<String>>,
}

/// Handle to the generation worker. Cheap to share behind an `Arc`.
pub struct GenerationEngine {
    jobs: mpsc::UnboundedSender<Job>,
    state: watch::Receiver<EngineState>,
}

impl GenerationEngine {
    /// Starts the worker thread, which calls `loader` and then serves jobs.
    pub fn spawn<F>(settings: GenerationSettings, loader: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn LanguageModel>> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(EngineState::Loading);

        std::thread::Builder::new()
            .name("ingres-generate".to_string())
            .spawn(move || run_worker(settings, loader, jobs_rx, state_tx))?;

        Ok(Self {
            jobs: jobs_tx,
            state: state_rx,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    /// Waits until the model has loaded. Errors if loading failed.
    pub async fn wait_ready(&self) -> Result<(), ServiceError> {
        let mut rx = self.state.clone();
        loop {
            let state = rx.borrow_and_update().clone();
            match state {
                EngineState::Ready => return Ok(()),
                EngineState::Failed(e) => return Err(ServiceError::EngineUnavailable(e)),
                EngineState::Stopped => {
                    return Err(ServiceError::EngineUnavailable(
                        "engine worker has stopped".to_string(),
                    ))
                }
                EngineState::Loading => {}
            }
            rx.changed().await.map_err(|_| {
                ServiceError::EngineUnavailable("engine worker exited while loading".to_string())
            })?;
        }
    }

    /// Generates an answer to `question` grounded in `context`.
    ///
    /// Queues behind any generation already in flight.
    pub async fn generate(&self, question: &str, context: &str) -> Result<String, ServiceError> {
        match self.state() {
            EngineState::Ready => {}
            EngineState::Loading => {
                return Err(ServiceError::EngineUnavailable(
                    "model is still loading".to_string(),
                ))
            }
            EngineState::Failed(e) => return Err(ServiceError::EngineUnavailable(e)),
            EngineState::Stopped => {
                return Err(ServiceError::EngineUnavailable(
                    "engine worker has stopped".to_string(),
                ))
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send(Job {
                prompt: build_prompt(question, context),
                reply: reply_tx,
            })
            .map_err(|_| ServiceError::EngineUnavailable("engine worker has stopped".to_string()))?;

        reply_rx
            .await
            .map_err(|_| {
                ServiceError::EngineUnavailable("engine worker dropped the request".to_string())
            })?
            .map_err(ServiceError::Generation)
    }
}

fn run_worker<F>(
    settings: GenerationSettings,
    loader: F,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    state: watch::Sender<EngineState>,
) where
    F: FnOnce() -> Result<Box<dyn LanguageModel>>,
{
    let started = Instant::now();
    let mut model = match loader() {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to load model");
            state.send_replace(EngineState::Failed(format!("{:#}", e)));
            return;
        }
    };
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "model loaded"
    );
    state.send_replace(EngineState::Ready);
    let _stopped = StoppedOnExit(&state);

    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    while let Some(job) = jobs.blocking_recv() {
        let started = Instant::now();
        let result = generate_once(model.as_mut(), &settings, &mut rng, &job.prompt);
        match &result {
            Ok(answer) => tracing::debug!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                answer_chars = answer.chars().count(),
                "generation finished"
            ),
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "generation failed"),
        }
        // The caller may have gone away; nothing to do then.
        let _ = job.reply.send(result);
    }
}

/// Publishes `Stopped` when the worker exits, including by panic.
struct StoppedOnExit<'a>(&'a watch::Sender<EngineState>);

impl Drop for StoppedOnExit<'_> {
    fn drop(&mut self) {
        self.0.send_replace(EngineState::Stopped);
    }
}

/// One full generation: encode, sample up to `max_new_tokens`, decode, and
/// strip the echoed prompt.
pub fn generate_once(
    model: &mut dyn LanguageModel,
    settings: &GenerationSettings,
    rng: &mut StdRng,
    prompt: &str,
) -> Result<String> {
    let mut ids = model.encode(prompt)?;

    let budget = settings
        .max_context_tokens
        .saturating_sub(settings.max_new_tokens);
    if ids.len() > budget {
        let excess = ids.len() - budget;
        tracing::warn!(
            prompt_tokens = ids.len(),
            dropped = excess,
            "prompt exceeds context window, dropping oldest tokens"
        );
        ids.drain(..excess);
    }

    let eos = model.eos_token_id();
    for _ in 0..settings.max_new_tokens {
        let logits = model.next_token_logits(&ids)?;
        let Some(next) = sample_next_token(&logits, &settings.sampling, rng) else {
            break;
        };
        ids.push(next);
        if next == eos {
            break;
        }
    }

    let decoded = model.decode(&ids)?;
    Ok(extract_answer(&decoded))
}
