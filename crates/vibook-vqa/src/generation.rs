/*
    Greedy autoregressive decoding on top of a vision-language model session.
*/

use std::time::Instant;

use candle_core::Tensor;
use candle_transformers::generation::{LogitsProcessor, Sampling};

use crate::error::VqaError;
use crate::model::VisionLanguageModel;
use crate::processor::ModelInputs;

/// Configuration of a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationConfig {
    /// Upper bound on the number of generated tokens.
    pub max_new_tokens: usize,
    /// Seed of the logits processor. Argmax decoding does not draw from it.
    pub seed: u64,
    /// Generation stops after this token.
    pub eos_token_id: u32,
    /// Token used to pad sequences, never part of an answer.
    pub pad_token_id: u32,
}

impl GenerationConfig {
    /// The new-token budget of a single answer.
    pub const MAX_NEW_TOKENS: usize = 128;

    /// Create a configuration with the default token budget.
    pub fn new(eos_token_id: u32, pad_token_id: u32) -> Self {
        Self {
            max_new_tokens: Self::MAX_NEW_TOKENS,
            seed: 299792458,
            eos_token_id,
            pad_token_id,
        }
    }
}

/// The output of a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// The prompt tokens followed by the generated ones.
    pub tokens: Vec<u32>,
    /// The number of prompt tokens at the start of `tokens`.
    pub prompt_len: usize,
}

impl Generation {
    /// The tokens produced by the model, without the prompt.
    pub fn new_tokens(&self) -> &[u32] {
        &self.tokens[self.prompt_len..]
    }

    /// The generated tokens that make up the answer, without end of sequence or padding.
    pub fn answer_tokens(&self, config: &GenerationConfig) -> Vec<u32> {
        self.new_tokens()
            .iter()
            .copied()
            .filter(|&t| t != config.eos_token_id && t != config.pad_token_id)
            .collect()
    }
}

/// Run deterministic (argmax) decoding.
///
/// # Arguments
///
/// * `model` - The model to open a decoding session on.
/// * `inputs` - The prompt tokens and pixel values.
/// * `config` - The token budget and the special token ids.
///
/// # Returns
///
/// The full token sequence, stopping at the first end of sequence token or after
/// `config.max_new_tokens` new tokens.
pub fn generate(
    model: &dyn VisionLanguageModel,
    inputs: &ModelInputs,
    config: &GenerationConfig,
) -> Result<Generation, VqaError> {
    let mut tokens = inputs.input_ids.squeeze(0)?.to_vec1::<u32>()?;
    let prompt_len = tokens.len();
    if prompt_len == 0 {
        return Err(VqaError::EmptyPrompt);
    }

    let mut session = model.new_session();
    let mut logits_processor = LogitsProcessor::from_sampling(config.seed, Sampling::ArgMax);

    let start_gen = Instant::now();
    for index in 0..config.max_new_tokens {
        let logits = if index == 0 {
            session.prefill(&inputs.pixel_values, &inputs.input_ids)?
        } else {
            let last = tokens[tokens.len() - 1];
            let input = Tensor::new(&[last], model.device())?.unsqueeze(0)?;
            session.step(&input)?
        };

        let next_token = logits_processor.sample(&logits)?;
        tokens.push(next_token);
        if next_token == config.eos_token_id {
            break;
        }
    }

    let generated_tokens = tokens.len() - prompt_len;
    let dt = start_gen.elapsed();
    log::debug!(
        "{generated_tokens} tokens generated ({:.2} token/s)",
        generated_tokens as f64 / dt.as_secs_f64(),
    );

    Ok(Generation { tokens, prompt_len })
}
