//! Next-token selection from raw logits.
//!
//! Stochastic decoding applies, in order: temperature scaling, top-k
//! truncation, nucleus (top-p) truncation, then draws from the renormalized
//! distribution. With `do_sample = false` the highest logit is taken.

use rand::Rng;

/// Decoding parameters for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    /// Keep only the `top_k` highest logits. `0` disables the filter.
    pub top_k: usize,
    /// Keep the smallest set of tokens whose probability mass reaches `top_p`.
    pub top_p: f32,
    pub do_sample: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 50,
            top_p: 0.9,
            do_sample: true,
        }
    }
}

/// Picks the next token id, or `None` if no logit is finite.
pub fn sample_next_token<R: Rng + ?Sized>(
    logits: &[f32],
    params: &SamplingParams,
    rng: &mut R,
) -> Option<u32> {
    if !params.do_sample {
        return argmax(logits);
    }

    let mut candidates: Vec<(u32, f32)> = logits
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .map(|(i, &l)| (i as u32, l / params.temperature))
        .collect();
    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    if params.top_k > 0 {
        candidates.truncate(params.top_k);
    }

    let max = candidates[0].1;
    let mut probs: Vec<(u32, f32)> = candidates
        .into_iter()
        .map(|(id, l)| (id, (l - max).exp()))
        .collect();
    let total: f32 = probs.iter().map(|(_, p)| p).sum();
    for (_, p) in probs.iter_mut() {
        *p /= total;
    }

    // Nucleus: keep tokens until the cumulative mass reaches top_p; the token
    // that crosses the threshold is kept, so at least one always survives.
    let mut cumulative = 0.0f32;
    let mut keep = probs.len();
    for (i, (_, p)) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= params.top_p {
            keep = i + 1;
            break;
        }
    }
    probs.truncate(keep);

    let kept_mass: f32 = probs.iter().map(|(_, p)| p).sum();
    let mut draw = rng.random::<f32>() * kept_mass;
    for (id, p) in &probs {
        if draw < *p {
            return Some(*id);
        }
        draw -= p;
    }
    probs.last().map(|(id, _)| *id)
}

fn argmax(logits: &[f32]) -> Option<u32> {
    logits
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_finite())
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i as u32)
}
