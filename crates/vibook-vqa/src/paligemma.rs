use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::paligemma::{Config, Model};

use crate::error::VqaError;
use crate::imgproc::ImagePreprocessConfig;
use crate::model::{last_position_logits, DecodeSession, VisionLanguageModel};

/// The Google PaliGemma model
///
/// This struct holds the PaliGemma 3B (224px) weights used to answer questions about an image.
/// The vision tower prepends the image embeddings to the text embeddings itself, so the prompt
/// does not need any image tokens.
pub struct Paligemma {
    model: Model,
    device: Device,
    dtype: DType,
}

impl Paligemma {
    /// Pixel preprocessing expected by the SigLIP vision tower.
    pub const IMAGE_CONFIG: ImagePreprocessConfig = ImagePreprocessConfig {
        image_size: 224,
        rescale_factor: 1.0 / 255.0,
        image_mean: 0.5,
        image_std: 0.5,
    };

    /// PaliGemma ships without a chat template. This one renders the user text behind the
    /// `answer en` task prefix of the mix checkpoints, and the generation cue is the newline
    /// that separates the prefix from the answer.
    pub const CHAT_TEMPLATE: &'static str = "{% for message in messages %}{% if message['role'] == 'user' %}{% for line in message['content'] %}{% if line['type'] == 'text' %}answer en {{ line['text'] }}{% endif %}{% endfor %}{% endif %}{% endfor %}{% if add_generation_prompt %}{{ '\\n' }}{% endif %}";

    /// Load the model from safetensors weight files.
    ///
    /// # Arguments
    ///
    /// * `weights` - The safetensors shards of the checkpoint.
    /// * `dtype` - The precision to load the weights with.
    /// * `device` - The device to place the weights on.
    pub fn load<P: AsRef<Path>>(
        weights: &[P],
        dtype: DType,
        device: &Device,
    ) -> Result<Self, VqaError> {
        let config = Config::paligemma_3b_224();

        // the weight files must not change while they are mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights, dtype, device)? };
        let model = Model::new(&config, vb)?;

        Ok(Self {
            model,
            device: device.clone(),
            dtype,
        })
    }
}

impl VisionLanguageModel for Paligemma {
    fn device(&self) -> &Device {
        &self.device
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn new_session(&self) -> Box<dyn DecodeSession + '_> {
        // the weights are reference counted, cloning only copies the handles and an empty cache
        Box::new(PaligemmaSession {
            model: self.model.clone(),
        })
    }
}

struct PaligemmaSession {
    model: Model,
}

impl DecodeSession for PaligemmaSession {
    fn prefill(&mut self, pixel_values: &Tensor, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        let logits = self.model.setup(pixel_values, input_ids)?;
        last_position_logits(&logits)
    }

    fn step(&mut self, input_ids: &Tensor) -> candle_core::Result<Tensor> {
        let logits = self.model.forward(input_ids)?;
        last_position_logits(&logits)
    }
}
