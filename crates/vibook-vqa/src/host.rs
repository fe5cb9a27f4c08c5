use candle_core::{DType, Device};

use crate::config::HostConfig;
use crate::error::VqaError;
use crate::hub::resolve_model_files;
use crate::model::VisionLanguageModel;
use crate::paligemma::Paligemma;
use crate::processor::Processor;

/// An opaque handle to a loaded generation model.
pub struct ModelHandle {
    model: Box<dyn VisionLanguageModel>,
}

impl ModelHandle {
    /// Wrap a loaded model.
    pub fn new(model: impl VisionLanguageModel + 'static) -> Self {
        Self {
            model: Box::new(model),
        }
    }

    /// The device the model is pinned to.
    #[inline]
    pub fn device(&self) -> &Device {
        self.model.device()
    }

    /// The precision of the weights.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.model.dtype()
    }

    /// The model itself.
    #[inline]
    pub fn model(&self) -> &dyn VisionLanguageModel {
        self.model.as_ref()
    }
}

/// A model together with the processor of the same checkpoint.
pub struct LoadedModel {
    /// The generation model.
    pub model: ModelHandle,
    /// The matching processor.
    pub processor: Processor,
}

/// Owns the model and processor for the lifetime of the process.
///
/// The host is either ready, holding both the model and its processor, or unavailable,
/// holding neither. It is never mutated after construction and is meant to be shared behind
/// an `Arc`.
pub struct ModelHost {
    loaded: Option<LoadedModel>,
}

impl ModelHost {
    /// Load the model and its processor.
    ///
    /// Failures are logged and produce an unavailable host instead of an error, so the
    /// service can start in a degraded mode.
    pub fn load(config: &HostConfig) -> Self {
        match Self::try_load(config) {
            Ok(host) => host,
            Err(e) => {
                log::error!("Failed to load the model and processor from {}: {e}", config.source);
                Self::unavailable()
            }
        }
    }

    /// Load the model and its processor, returning the first error.
    pub fn try_load(config: &HostConfig) -> Result<Self, VqaError> {
        let device = config.device.device();
        let dtype = config.precision.dtype();
        log::info!(
            "Loading model '{}' and processor on {device:?} ({dtype:?})",
            config.source
        );

        let files = resolve_model_files(&config.source)?;
        let model = Paligemma::load(&files.weights, dtype, &device)?;
        let processor = Processor::load(&files, Paligemma::IMAGE_CONFIG, Paligemma::CHAT_TEMPLATE)?;

        log::info!("Model and processor loaded on {device:?}");

        Ok(Self::from_parts(ModelHandle::new(model), processor))
    }

    /// A ready host around an already loaded model and processor.
    pub fn from_parts(model: ModelHandle, processor: Processor) -> Self {
        Self {
            loaded: Some(LoadedModel { model, processor }),
        }
    }

    /// A host with nothing loaded.
    pub fn unavailable() -> Self {
        Self { loaded: None }
    }

    /// Whether the model and processor are both loaded.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.loaded.is_some()
    }

    /// The loaded model and processor.
    pub fn resources(&self) -> Result<&LoadedModel, VqaError> {
        self.loaded.as_ref().ok_or(VqaError::ModelUnavailable)
    }
}
