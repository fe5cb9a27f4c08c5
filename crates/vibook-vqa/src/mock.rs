//! Weight-free stand-ins for the model and processor.
//!
//! The scripted model replays a fixed token sequence and the word-level tokenizer covers a
//! small vocabulary, which is enough to drive the whole inference path in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use tokenizers::Tokenizer;

use crate::chat::ChatTemplate;
use crate::error::VqaError;
use crate::host::{ModelHandle, ModelHost};
use crate::imgproc::ImagePreprocessConfig;
use crate::model::{DecodeSession, VisionLanguageModel};
use crate::paligemma::Paligemma;
use crate::processor::{Processor, SpecialTokens};

/// Id of `<pad>` in the mock vocabulary.
pub const PAD_TOKEN_ID: u32 = 0;
/// Id of `<eos>` in the mock vocabulary.
pub const EOS_TOKEN_ID: u32 = 1;
/// Id of `<bos>` in the mock vocabulary.
pub const BOS_TOKEN_ID: u32 = 2;
/// Id of `<unk>` in the mock vocabulary.
pub const UNK_TOKEN_ID: u32 = 3;

const SPECIAL_TOKENS: [&str; 4] = ["<pad>", "<eos>", "<bos>", "<unk>"];

const WORDS: [&str; 21] = [
    "answer", "en", "What", "is", "the", "title", "of", "this", "book", "?", "Namiya",
    "General", "Store", "Dr", "Stone", "a", "cat", "The", "Miracles", "color", "red",
];

/// A small image size that keeps the preprocessing cheap.
pub const IMAGE_CONFIG: ImagePreprocessConfig = ImagePreprocessConfig {
    image_size: 8,
    ..Paligemma::IMAGE_CONFIG
};

/// The number of entries in the mock vocabulary.
pub fn vocab_size() -> usize {
    SPECIAL_TOKENS.len() + WORDS.len()
}

/// A word-level tokenizer over the mock vocabulary that prepends `<bos>`.
pub fn tokenizer() -> Result<Tokenizer, VqaError> {
    let vocab: serde_json::Map<String, serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .chain(WORDS.iter())
        .enumerate()
        .map(|(id, token)| (token.to_string(), id.into()))
        .collect();

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| {
            serde_json::json!({
                "id": id,
                "content": token,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true,
            })
        })
        .collect();

    let config = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": {
            "type": "TemplateProcessing",
            "single": [
                {"SpecialToken": {"id": "<bos>", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
            ],
            "pair": [
                {"SpecialToken": {"id": "<bos>", "type_id": 0}},
                {"Sequence": {"id": "A", "type_id": 0}},
                {"Sequence": {"id": "B", "type_id": 1}},
            ],
            "special_tokens": {
                "<bos>": {"id": "<bos>", "ids": [BOS_TOKEN_ID], "tokens": ["<bos>"]},
            },
        },
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "<unk>",
        },
    });

    Ok(Tokenizer::from_bytes(serde_json::to_vec(&config)?)?)
}

/// A processor built on the mock tokenizer and the PaliGemma chat template.
pub fn processor() -> Result<Processor, VqaError> {
    Processor::new(
        tokenizer()?,
        ChatTemplate::new(Paligemma::CHAT_TEMPLATE)?,
        IMAGE_CONFIG,
        SpecialTokens::default(),
    )
}

/// A ready host around the given model and the mock processor.
pub fn ready_host(model: ScriptedModel) -> Result<ModelHost, VqaError> {
    Ok(ModelHost::from_parts(ModelHandle::new(model), processor()?))
}

/// A model that greedily "predicts" a fixed token sequence.
///
/// Every forward pass puts all the probability mass on the next scripted token. Once the
/// script runs out the last token is repeated.
#[derive(Clone)]
pub struct ScriptedModel {
    script: Vec<u32>,
    device: Device,
    forward_calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    /// Replay the given token ids.
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            script,
            device: Device::Cpu,
            forward_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer with the given words followed by `<eos>`.
    pub fn answering(answer: &str) -> Result<Self, VqaError> {
        let mut script = processor()?.tokenize(answer)?;
        script.push(EOS_TOKEN_ID);
        Ok(Self::new(script))
    }

    /// A shared counter of the forward passes run by every session of this model.
    pub fn forward_calls(&self) -> Arc<AtomicUsize> {
        self.forward_calls.clone()
    }
}

impl VisionLanguageModel for ScriptedModel {
    fn device(&self) -> &Device {
        &self.device
    }

    fn dtype(&self) -> DType {
        DType::F32
    }

    fn new_session(&self) -> Box<dyn DecodeSession + '_> {
        Box::new(ScriptedSession {
            model: self,
            position: 0,
        })
    }
}

struct ScriptedSession<'a> {
    model: &'a ScriptedModel,
    position: usize,
}

impl ScriptedSession<'_> {
    fn next_logits(&mut self) -> candle_core::Result<Tensor> {
        self.model.forward_calls.fetch_add(1, Ordering::SeqCst);

        let token = self
            .model
            .script
            .get(self.position)
            .or(self.model.script.last())
            .copied()
            .unwrap_or(UNK_TOKEN_ID);
        self.position += 1;

        let mut logits = vec![0f32; vocab_size()];
        logits[token as usize] = 1.0;
        Tensor::from_vec(logits, vocab_size(), &self.model.device)
    }
}

impl DecodeSession for ScriptedSession<'_> {
    fn prefill(&mut self, pixel_values: &Tensor, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        let (_batch, _channels, _height, _width) = pixel_values.dims4()?;
        let (_batch, _seq_len) = input_ids.dims2()?;
        self.position = 0;
        self.next_logits()
    }

    fn step(&mut self, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        let (_batch, seq_len) = input_ids.dims2()?;
        if seq_len != 1 {
            candle_core::bail!("expected a single token per step, got {seq_len}")
        }
        self.next_logits()
    }
}
