use std::fs;

use candle_core::{DType, Device, Tensor};
use image::RgbImage;
use tokenizers::Tokenizer;

use crate::chat::{template_from_config, ChatTemplate, Message};
use crate::error::VqaError;
use crate::hub::ModelFiles;
use crate::imgproc::{to_pixel_values, ImagePreprocessConfig};

/// The special tokens a processor needs to know by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    /// Beginning of sequence, exposed to chat templates.
    pub bos: Option<String>,
    /// End of sequence, stops generation.
    pub eos: String,
    /// Padding; the end of sequence token stands in when absent.
    pub pad: Option<String>,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            bos: Some("<bos>".to_string()),
            eos: "<eos>".to_string(),
            pad: Some("<pad>".to_string()),
        }
    }
}

impl SpecialTokens {
    /// Read the special tokens from a `tokenizer_config.json` document.
    ///
    /// Tokens may be plain strings or objects with a `content` field. Missing entries keep
    /// their default value.
    pub fn from_tokenizer_config(config: &serde_json::Value) -> Self {
        let token = |key: &str| match &config[key] {
            serde_json::Value::String(token) => Some(token.clone()),
            serde_json::Value::Object(token) => token
                .get("content")
                .and_then(|c| c.as_str())
                .map(str::to_owned),
            _ => None,
        };

        let defaults = Self::default();
        Self {
            bos: token("bos_token").or(defaults.bos),
            eos: token("eos_token").unwrap_or(defaults.eos),
            pad: token("pad_token").or(defaults.pad),
        }
    }
}

/// The tensors fed to the model for one request.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    /// The prompt tokens with shape [1, L].
    pub input_ids: Tensor,
    /// The preprocessed image with shape [1, 3, S, S].
    pub pixel_values: Tensor,
}

impl ModelInputs {
    /// The number of prompt tokens.
    pub fn prompt_len(&self) -> Result<usize, VqaError> {
        Ok(self.input_ids.dim(1)?)
    }
}

/// Converts (image, text) into model inputs and generated tokens back into text.
pub struct Processor {
    tokenizer: Tokenizer,
    template: ChatTemplate,
    image_config: ImagePreprocessConfig,
    eos_token_id: u32,
    pad_token_id: u32,
}

impl Processor {
    /// Create a processor from its parts.
    ///
    /// # Arguments
    ///
    /// * `tokenizer` - The tokenizer of the checkpoint.
    /// * `template` - The chat template used to build prompts.
    /// * `image_config` - The pixel preprocessing of the vision tower.
    /// * `special_tokens` - The names of the end of sequence and padding tokens.
    pub fn new(
        tokenizer: Tokenizer,
        template: ChatTemplate,
        image_config: ImagePreprocessConfig,
        special_tokens: SpecialTokens,
    ) -> Result<Self, VqaError> {
        let eos_token_id = tokenizer
            .token_to_id(&special_tokens.eos)
            .ok_or_else(|| VqaError::TokenNotFound(special_tokens.eos.clone()))?;

        let pad_token_id = match &special_tokens.pad {
            Some(pad) => tokenizer
                .token_to_id(pad)
                .ok_or_else(|| VqaError::TokenNotFound(pad.clone()))?,
            None => eos_token_id,
        };

        let template = template.with_special_tokens(special_tokens.bos, Some(special_tokens.eos));

        Ok(Self {
            tokenizer,
            template,
            image_config,
            eos_token_id,
            pad_token_id,
        })
    }

    /// Load the processor matching a model artifact.
    ///
    /// The chat template is taken from `tokenizer_config.json`, then `chat_template.json`,
    /// then falls back to `default_template`.
    pub fn load(
        files: &ModelFiles,
        image_config: ImagePreprocessConfig,
        default_template: &str,
    ) -> Result<Self, VqaError> {
        let tokenizer = Tokenizer::from_file(&files.tokenizer)?;

        let tokenizer_config = match &files.tokenizer_config {
            Some(path) => serde_json::from_str::<serde_json::Value>(&fs::read_to_string(path)?)?,
            None => serde_json::Value::Null,
        };

        let chat_template = match &files.chat_template {
            Some(path) => serde_json::from_str::<serde_json::Value>(&fs::read_to_string(path)?)?,
            None => serde_json::Value::Null,
        };

        let template_source = template_from_config(&tokenizer_config)
            .or_else(|| template_from_config(&chat_template))
            .unwrap_or_else(|| {
                log::debug!("No chat template shipped with the model, using the built-in one");
                default_template.to_string()
            });

        Self::new(
            tokenizer,
            ChatTemplate::new(template_source)?,
            image_config,
            SpecialTokens::from_tokenizer_config(&tokenizer_config),
        )
    }

    /// The id of the end of sequence token.
    #[inline]
    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    /// The id of the padding token.
    #[inline]
    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    /// Render messages into a prompt string without tokenizing it.
    pub fn apply_chat_template(
        &self,
        messages: &[Message],
        add_generation_prompt: bool,
    ) -> Result<String, VqaError> {
        self.template.render(messages, add_generation_prompt)
    }

    /// Encode a rendered prompt and its image into model inputs.
    ///
    /// # Arguments
    ///
    /// * `prompt` - The rendered prompt.
    /// * `image` - The rgb8 image the prompt refers to.
    /// * `dtype` - The dtype of the model weights.
    /// * `device` - The device the model lives on.
    pub fn encode(
        &self,
        prompt: &str,
        image: &RgbImage,
        dtype: DType,
        device: &Device,
    ) -> Result<ModelInputs, VqaError> {
        let encoding = self.tokenizer.encode(prompt, true)?;
        let ids = encoding.get_ids();
        if ids.is_empty() {
            return Err(VqaError::EmptyPrompt);
        }

        let input_ids = Tensor::new(ids, device)?.unsqueeze(0)?;
        let pixel_values = to_pixel_values(image, &self.image_config, dtype, device)?;

        Ok(ModelInputs {
            input_ids,
            pixel_values,
        })
    }

    /// Decode tokens into text.
    pub fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, VqaError> {
        Ok(self.tokenizer.decode(tokens, skip_special_tokens)?)
    }

    /// Decode generated tokens into the final answer, without special tokens or surrounding
    /// whitespace.
    pub fn decode_answer(&self, tokens: &[u32]) -> Result<String, VqaError> {
        Ok(self.decode(tokens, true)?.trim().to_string())
    }

    /// Encode plain text without special tokens.
    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>, VqaError> {
        Ok(self.tokenizer.encode(text, false)?.get_ids().to_vec())
    }
}
