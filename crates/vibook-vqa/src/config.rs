use std::path::PathBuf;
use std::str::FromStr;

use candle_core::{DType, Device};

use crate::error::VqaError;

/// Where the model weights and processor files are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A local directory holding the model files.
    Local(PathBuf),
    /// A Hugging Face Hub repository at a given revision.
    Hub {
        /// The repository identifier, e.g. `google/paligemma-3b-mix-224`.
        repo_id: String,
        /// The branch, tag or commit to download.
        revision: String,
    },
}

impl ModelSource {
    /// Resolve an identifier into a model source.
    ///
    /// An identifier naming an existing directory is read locally, anything else is
    /// looked up on the hub.
    pub fn resolve(identifier: &str, revision: &str) -> Self {
        let path = PathBuf::from(identifier);
        if path.is_dir() {
            ModelSource::Local(path)
        } else {
            ModelSource::Hub {
                repo_id: identifier.to_string(),
                revision: revision.to_string(),
            }
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSource::Local(path) => write!(f, "{}", path.display()),
            ModelSource::Hub { repo_id, revision } => write!(f, "{repo_id}@{revision}"),
        }
    }
}

/// The device the model is pinned to at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// Run on the host cpu.
    #[default]
    Cpu,
    /// Run on the first cuda device, falling back to cpu when unavailable.
    Cuda,
}

impl DeviceKind {
    /// Create the candle device, falling back to the cpu when cuda cannot be used.
    pub fn device(&self) -> Device {
        match self {
            DeviceKind::Cpu => Device::Cpu,
            DeviceKind::Cuda => {
                #[cfg(feature = "cuda")]
                let device = match Device::cuda_if_available(0) {
                    Ok(device) => device,
                    Err(e) => {
                        log::warn!("CUDA not available, defaulting to CPU: {e}");
                        Device::Cpu
                    }
                };

                #[cfg(not(feature = "cuda"))]
                let device = {
                    log::warn!("Built without the `cuda` feature, defaulting to CPU");
                    Device::Cpu
                };

                device
            }
        }
    }
}

impl FromStr for DeviceKind {
    type Err = VqaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" | "gpu" => Ok(DeviceKind::Cuda),
            other => Err(VqaError::InvalidConfig(format!("unknown device `{other}`"))),
        }
    }
}

/// The numeric precision the weights are loaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// 32-bit floats.
    #[default]
    F32,
    /// 16-bit floats.
    F16,
    /// 16-bit brain floats.
    Bf16,
}

impl Precision {
    /// The candle dtype for this precision.
    pub fn dtype(&self) -> DType {
        match self {
            Precision::F32 => DType::F32,
            Precision::F16 => DType::F16,
            Precision::Bf16 => DType::BF16,
        }
    }
}

impl FromStr for Precision {
    type Err = VqaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float32" => Ok(Precision::F32),
            "f16" | "float16" => Ok(Precision::F16),
            "bf16" | "bfloat16" => Ok(Precision::Bf16),
            other => Err(VqaError::InvalidConfig(format!(
                "unknown precision `{other}`"
            ))),
        }
    }
}

/// Configuration for loading the model host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Where the model files live.
    pub source: ModelSource,
    /// The device the model is pinned to.
    pub device: DeviceKind,
    /// The precision of the weights.
    pub precision: Precision,
}

impl HostConfig {
    /// The model used by the Vibook deployment.
    pub const DEFAULT_MODEL_ID: &'static str = "google/paligemma-3b-mix-224";

    /// Create a configuration for the given source on the cpu at full precision.
    pub fn new(source: ModelSource) -> Self {
        Self {
            source,
            device: DeviceKind::default(),
            precision: Precision::default(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new(ModelSource::Hub {
            repo_id: Self::DEFAULT_MODEL_ID.to_string(),
            revision: "main".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_local_directory() -> Result<(), VqaError> {
        let dir = tempfile::tempdir()?;
        let identifier = dir.path().to_string_lossy().into_owned();
        assert_eq!(
            ModelSource::resolve(&identifier, "main"),
            ModelSource::Local(dir.path().to_path_buf())
        );
        Ok(())
    }

    #[test]
    fn resolve_hub_identifier() {
        let source = ModelSource::resolve("sunbv56/qwen2.5-vl-vqa-vibook", "main");
        assert_eq!(
            source,
            ModelSource::Hub {
                repo_id: "sunbv56/qwen2.5-vl-vqa-vibook".to_string(),
                revision: "main".to_string(),
            }
        );
        assert_eq!(source.to_string(), "sunbv56/qwen2.5-vl-vqa-vibook@main");
    }

    #[test]
    fn parse_precision_and_device() -> Result<(), VqaError> {
        assert_eq!("f16".parse::<Precision>()?, Precision::F16);
        assert_eq!("BF16".parse::<Precision>()?, Precision::Bf16);
        assert_eq!(Precision::default().dtype(), DType::F32);
        assert_eq!("cpu".parse::<DeviceKind>()?, DeviceKind::Cpu);
        assert!("tpu".parse::<DeviceKind>().is_err());
        assert!("int4".parse::<Precision>().is_err());
        Ok(())
    }
}
