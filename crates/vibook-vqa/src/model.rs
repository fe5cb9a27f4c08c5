use candle_core::{DType, Device, IndexOp, Tensor};

/// A loaded vision-language model.
///
/// The weights are read-only once loaded. All mutable decoding state, such as the key/value
/// cache, lives in the [`DecodeSession`] opened for each generation, so a single model can be
/// shared by concurrent requests without locking.
pub trait VisionLanguageModel: Send + Sync {
    /// The device the weights live on.
    fn device(&self) -> &Device;

    /// The dtype of the weights.
    fn dtype(&self) -> DType;

    /// Open a fresh decoding session with an empty cache.
    fn new_session(&self) -> Box<dyn DecodeSession + '_>;
}

/// The mutable state of a single autoregressive generation.
pub trait DecodeSession: Send {
    /// Run the image and the prompt through the model.
    ///
    /// # Arguments
    ///
    /// * `pixel_values` - The preprocessed image with shape [1, 3, S, S].
    /// * `input_ids` - The prompt tokens with shape [1, L].
    ///
    /// # Returns
    ///
    /// The f32 logits of the next token with shape [vocab_size].
    fn prefill(&mut self, pixel_values: &Tensor, input_ids: &Tensor) -> candle_core::Result<Tensor>;

    /// Feed back the last generated token with shape [1, 1].
    ///
    /// # Returns
    ///
    /// The f32 logits of the next token with shape [vocab_size].
    fn step(&mut self, input_ids: &Tensor) -> candle_core::Result<Tensor>;
}

/// Reduce model logits of shape [1, L, vocab_size] to the last position as f32.
pub(crate) fn last_position_logits(logits: &Tensor) -> candle_core::Result<Tensor> {
    let (_batch, seq_len, _vocab) = logits.dims3()?;
    logits.i((0, seq_len - 1))?.to_dtype(DType::F32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_position_is_selected() -> candle_core::Result<()> {
        let logits = Tensor::arange(0f32, 12f32, &Device::Cpu)?.reshape((1, 3, 4))?;
        let last = last_position_logits(&logits)?;
        assert_eq!(last.to_vec1::<f32>()?, vec![8.0, 9.0, 10.0, 11.0]);
        Ok(())
    }
}
