use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::chat::Message;
use crate::error::VqaError;
use crate::generation::{generate, GenerationConfig};
use crate::host::{LoadedModel, ModelHost};
use crate::imgproc::ensure_rgb;

/// A question about an image.
#[derive(Debug, Clone)]
pub struct VqaRequest {
    /// The question, expected to be non-empty.
    pub question: String,
    /// The decoded image in any color layout.
    pub image: DynamicImage,
}

/// A question paired with the model's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VqaResponse {
    /// The question as it was asked.
    pub question: String,
    /// The generated answer, possibly empty.
    pub answer: String,
}

impl VqaRequest {
    /// Answer the request with the host's model.
    pub fn answer(self, host: &ModelHost) -> Result<VqaResponse, VqaError> {
        let answer = answer_question(host, self.image, &self.question)?;
        Ok(VqaResponse {
            question: self.question,
            answer,
        })
    }
}

/// Answer a question about an image.
///
/// The image is converted to rgb if needed, the question is wrapped in a single user turn
/// after an image placeholder and rendered with the chat template, and the answer is decoded
/// greedily within the token budget.
///
/// # Arguments
///
/// * `host` - The model host, which must be ready.
/// * `image` - The image the question is about.
/// * `question` - The question, expected to be non-empty.
///
/// # Returns
///
/// The generated answer without special tokens or surrounding whitespace.
pub fn answer_question(
    host: &ModelHost,
    image: DynamicImage,
    question: &str,
) -> Result<String, VqaError> {
    let LoadedModel { model, processor } = host.resources()?;

    let image = ensure_rgb(image);

    let messages = [Message::user_with_image(question)];
    let prompt = processor.apply_chat_template(&messages, true)?;
    log::debug!("Prompt: {prompt:?}");

    let inputs = processor.encode(&prompt, &image, model.dtype(), model.device())?;

    let config = GenerationConfig::new(processor.eos_token_id(), processor.pad_token_id());
    let generation = generate(model.model(), &inputs, &config)?;

    processor.decode_answer(&generation.answer_tokens(&config))
}
