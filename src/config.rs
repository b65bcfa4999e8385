//! TOML configuration for the ingres service.
//!
//! Every section is optional; missing values fall back to the defaults the
//! assistant was tuned with (5 record hits, 3 document hits, 400-character
//! document snippets, 120 new tokens at temperature 0.7 / top-k 50 / top-p 0.9).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use ingres_rag_core::sampling::SamplingParams;

/// Environment variable that overrides `[model].dir`.
pub const MODEL_DIR_ENV: &str = "MODEL_DIR";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// JSON array of structured groundwater records.
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
        }
    }
}

fn default_records_path() -> PathBuf {
    PathBuf::from("./data/groundwater.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding `index.json` and one `.txt` artifact per document.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./pdf_texts")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_structured_limit")]
    pub structured_limit: usize,
    #[serde(default = "default_document_limit")]
    pub document_limit: usize,
    #[serde(default = "default_document_snippet_chars")]
    pub document_snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            structured_limit: default_structured_limit(),
            document_limit: default_document_limit(),
            document_snippet_chars: default_document_snippet_chars(),
        }
    }
}

fn default_structured_limit() -> usize {
    ingres_rag_core::structured::DEFAULT_RECORD_LIMIT
}
fn default_document_limit() -> usize {
    ingres_rag_core::documents::DEFAULT_DOCUMENT_LIMIT
}
fn default_document_snippet_chars() -> usize {
    ingres_rag_core::documents::DEFAULT_SNIPPET_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_receipt_snippet_chars")]
    pub receipt_snippet_chars: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            receipt_snippet_chars: default_receipt_snippet_chars(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_receipt_snippet_chars() -> usize {
    300
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Directory containing `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_model_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
    /// End-of-sequence token; also used as padding.
    #[serde(default = "default_eos_token")]
    pub eos_token: String,
    /// Model context window; the prompt is left-truncated to fit.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    /// Fixed RNG seed for reproducible sampling.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            device: default_device(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_k: default_top_k(),
            top_p: default_top_p(),
            do_sample: default_do_sample(),
            eos_token: default_eos_token(),
            max_context_tokens: default_max_context_tokens(),
            seed: None,
        }
    }
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("./gpt2-groundwater")
}
fn default_device() -> String {
    "cpu".to_string()
}
fn default_max_new_tokens() -> usize {
    120
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_k() -> usize {
    50
}
fn default_top_p() -> f32 {
    0.9
}
fn default_do_sample() -> bool {
    true
}
fn default_eos_token() -> String {
    "<|endoftext|>".to_string()
}
fn default_max_context_tokens() -> usize {
    1024
}

impl ModelConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            do_sample: self.do_sample,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Answer bare greetings with a canned reply instead of running the model.
    #[serde(default)]
    pub greetings: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            greetings: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// A fully defaulted configuration, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Path of the document index inside the store directory.
    pub fn index_path(&self) -> PathBuf {
        self.store.dir.join("index.json")
    }
}

/// Reads, parses, and validates a config file.
///
/// A missing file is not an error: the defaults are used, as the service
/// ran before it had a config file at all. `MODEL_DIR` overrides
/// `[model].dir` either way.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::minimal()
    };

    if let Ok(dir) = std::env::var(MODEL_DIR_ENV) {
        if !dir.trim().is_empty() {
            config.model.dir = PathBuf::from(dir);
        }
    }

    validate(&config)?;
    Ok(config)
}

/// Rejects configurations the pipeline cannot honour.
pub fn validate(config: &Config) -> Result<()> {
    // Retrieval
    if config.retrieval.structured_limit == 0 {
        anyhow::bail!("retrieval.structured_limit must be >= 1");
    }
    if config.retrieval.document_limit == 0 {
        anyhow::bail!("retrieval.document_limit must be >= 1");
    }
    if config.retrieval.document_snippet_chars == 0 {
        anyhow::bail!("retrieval.document_snippet_chars must be > 0");
    }

    // Ingest
    if config.ingest.max_upload_bytes == 0 {
        anyhow::bail!("ingest.max_upload_bytes must be > 0");
    }

    // Model
    let model = &config.model;
    if model.device != "cpu" {
        anyhow::bail!(
            "Unsupported model.device: '{}'. Only 'cpu' is available.",
            model.device
        );
    }
    if model.max_new_tokens == 0 {
        anyhow::bail!("model.max_new_tokens must be > 0");
    }
    if model.max_new_tokens >= model.max_context_tokens {
        anyhow::bail!(
            "model.max_new_tokens ({}) must be smaller than model.max_context_tokens ({})",
            model.max_new_tokens,
            model.max_context_tokens
        );
    }
    if model.temperature.is_nan() || model.temperature <= 0.0 {
        anyhow::bail!("model.temperature must be > 0.0");
    }
    if !(0.0..=1.0).contains(&model.top_p) || model.top_p == 0.0 {
        anyhow::bail!("model.top_p must be in (0.0, 1.0]");
    }
    if model.eos_token.is_empty() {
        anyhow::bail!("model.eos_token must not be empty");
    }

    Ok(())
}
