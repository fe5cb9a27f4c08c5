/// An error type for the vqa crate.
#[derive(thiserror::Error, Debug)]
pub enum VqaError {
    /// The model host is not ready to serve inference.
    #[error("Model and/or processor are not loaded. Cannot perform inference.")]
    ModelUnavailable,

    /// Error fetching model files from the hub.
    #[error(transparent)]
    FailedToLoadModel(#[from] hf_hub::api::sync::ApiError),

    /// Error from the tensor backend.
    #[error(transparent)]
    CandleError(#[from] candle_core::Error),

    /// Error from the tokenizer.
    #[error(transparent)]
    TokenizerError(#[from] tokenizers::Error),

    /// Error reading a local file.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Error compiling or rendering the chat template.
    #[error(transparent)]
    JinjaError(#[from] minijinja::Error),

    /// Error parsing a json configuration file.
    #[error(transparent)]
    SerializationError(#[from] serde_json::Error),

    /// The uploaded payload could not be decoded into an image.
    #[error("Failed to decode the image. {0}")]
    ImageDecode(#[from] image::ImageError),

    /// A required file is missing from the model source.
    #[error("Missing model file: {0}")]
    MissingModelFile(String),

    /// A special token required for generation is not in the vocabulary.
    #[error("Cannot find the {0} token")]
    TokenNotFound(String),

    /// The rendered prompt encoded to zero tokens.
    #[error("The prompt encoded to an empty token sequence")]
    EmptyPrompt,

    /// The string could not be parsed into a configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),
}
