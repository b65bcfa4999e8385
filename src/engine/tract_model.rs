//! Tract-based causal language model (GPT-2 style ONNX export).
//!
//! Pure-Rust path: loads `model.onnx` with tract-onnx and `tokenizer.json`
//! with the tokenizers crate. There is no KV cache; every step runs the
//! full sequence and reads the logits of the last position, which is fine
//! for the short answers this service produces.

use anyhow::{anyhow, bail, Context, Result};
use tract_onnx::prelude::*;

use super::LanguageModel;
use crate::config::ModelConfig;

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

#[derive(Debug, Clone, Copy)]
enum InputKind {
    InputIds,
    AttentionMask,
    PositionIds,
}

type RunFn = Box<dyn FnMut(TVec<TValue>) -> TractResult<TVec<TValue>> + Send>;

pub struct TractCausalLm {
    run: RunFn,
    inputs: Vec<InputKind>,
    tokenizer: tokenizers::Tokenizer,
    eos: u32,
}

impl TractCausalLm {
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let onnx_path = config.dir.join(MODEL_FILE);
        let tokenizer_path = config.dir.join(TOKENIZER_FILE);
        if !onnx_path.exists() {
            bail!("Model file not found: {}", onnx_path.display());
        }

        tracing::info!(dir = %config.dir.display(), device = %config.device, "loading model");

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Load tokenizer {}: {}", tokenizer_path.display(), e))?;
        let eos = tokenizer
            .token_to_id(&config.eos_token)
            .ok_or_else(|| anyhow!("EOS token '{}' not in tokenizer vocabulary", config.eos_token))?;

        let model = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .with_context(|| format!("Load ONNX: {}", onnx_path.display()))?
            .into_optimized()
            .map_err(|e| anyhow!("Optimize: {}", e))?;

        let mut inputs = Vec::new();
        for outlet in model.input_outlets()? {
            let name = model.node(outlet.node).name.as_str();
            let kind = if name.contains("input_ids") {
                InputKind::InputIds
            } else if name.contains("attention_mask") {
                InputKind::AttentionMask
            } else if name.contains("position_ids") {
                InputKind::PositionIds
            } else {
                bail!("Unsupported model input '{}'", name);
            };
            inputs.push(kind);
        }

        let plan = model
            .into_runnable()
            .map_err(|e| anyhow!("Build tract runnable: {}", e))?;

        Ok(Self {
            run: Box::new(move |values| plan.run(values)),
            inputs,
            tokenizer,
            eos,
        })
    }
}

fn row_tensor(values: Vec<i64>) -> Result<Tensor> {
    let len = values.len();
    let array = ndarray::Array2::from_shape_vec((1, len), values)
        .map_err(|e| anyhow!("Input shape: {}", e))?;
    Ok(array.into())
}

impl LanguageModel for TractCausalLm {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenize: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| anyhow!("Detokenize: {}", e))
    }

    fn eos_token_id(&self) -> u32 {
        self.eos
    }

    fn next_token_logits(&mut self, ids: &[u32]) -> Result<Vec<f32>> {
        if ids.is_empty() {
            bail!("Cannot run the model on an empty sequence");
        }
        let seq_len = ids.len();

        let mut values: TVec<TValue> = TVec::new();
        for kind in &self.inputs {
            let tensor = match kind {
                InputKind::InputIds => row_tensor(ids.iter().map(|&i| i64::from(i)).collect())?,
                InputKind::AttentionMask => row_tensor(vec![1; seq_len])?,
                InputKind::PositionIds => row_tensor((0..seq_len as i64).collect())?,
            };
            values.push(tensor.into());
        }

        let outputs = (self.run)(values)?;
        let logits = outputs
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No output tensor"))?;
        let view = logits
            .to_array_view::<f32>()
            .map_err(|e| anyhow!("Output to array: {}", e))?;

        // Expected [batch, seq_len, vocab]; take the last position.
        let shape = view.shape().to_vec();
        match shape.len() {
            3 => Ok(view
                .slice(ndarray::s![0, shape[1] - 1, ..])
                .iter()
                .copied()
                .collect()),
            2 => Ok(view.slice(ndarray::s![0, ..]).iter().copied().collect()),
            _ => bail!("Unexpected logits shape: {:?}", shape),
        }
    }
}
