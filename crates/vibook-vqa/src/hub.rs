use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use hf_hub::{
    api::sync::{Api, ApiRepo},
    Cache, CacheRepo, Repo, RepoType,
};

use crate::config::ModelSource;
use crate::error::VqaError;

const TOKENIZER: &str = "tokenizer.json";
const TOKENIZER_CONFIG: &str = "tokenizer_config.json";
const CHAT_TEMPLATE: &str = "chat_template.json";
const WEIGHTS_INDEX: &str = "model.safetensors.index.json";
const WEIGHTS: &str = "model.safetensors";

/// The files making up a model artifact, resolved to local paths.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    /// The serialized `tokenizers` tokenizer.
    pub tokenizer: PathBuf,
    /// The tokenizer configuration, which may embed the chat template.
    pub tokenizer_config: Option<PathBuf>,
    /// A standalone chat template document.
    pub chat_template: Option<PathBuf>,
    /// The safetensors weight shards.
    pub weights: Vec<PathBuf>,
}

enum Fetcher {
    Local(PathBuf),
    Hub { api: ApiRepo, cache: CacheRepo },
}

impl Fetcher {
    fn get(&self, file: &str) -> Result<PathBuf, VqaError> {
        match self {
            Fetcher::Local(dir) => {
                let path = dir.join(file);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(VqaError::MissingModelFile(path.display().to_string()))
                }
            }
            Fetcher::Hub { api, .. } => Ok(api.get(file)?),
        }
    }

    /// Whether the model source has the file, without downloading it.
    ///
    /// Files already in the hub cache count as present, so cached models load offline.
    fn contains(&self, file: &str) -> Result<bool, VqaError> {
        match self {
            Fetcher::Local(dir) => Ok(dir.join(file).is_file()),
            Fetcher::Hub { api, cache } => {
                if cache.get(file).is_some() {
                    return Ok(true);
                }
                let info = api.info()?;
                Ok(info.siblings.iter().any(|sibling| sibling.rfilename == file))
            }
        }
    }

    fn get_optional(&self, file: &str) -> Option<PathBuf> {
        match self.get(file) {
            Ok(path) => Some(path),
            Err(e) => {
                log::debug!("Optional model file {file} not available: {e}");
                None
            }
        }
    }
}

/// Resolve every file of the model artifact, downloading from the hub when needed.
///
/// Hub downloads go through the `hf-hub` cache, so repeated calls do not hit the network.
pub fn resolve_model_files(source: &ModelSource) -> Result<ModelFiles, VqaError> {
    let fetcher = match source {
        ModelSource::Local(dir) => Fetcher::Local(dir.clone()),
        ModelSource::Hub { repo_id, revision } => {
            log::debug!("Loading model from HuggingFace Hub: {source}");
            let repo = Repo::with_revision(repo_id.clone(), RepoType::Model, revision.clone());
            Fetcher::Hub {
                api: Api::new()?.repo(repo.clone()),
                cache: Cache::default().repo(repo),
            }
        }
    };

    Ok(ModelFiles {
        tokenizer: fetcher.get(TOKENIZER)?,
        tokenizer_config: fetcher.get_optional(TOKENIZER_CONFIG),
        chat_template: fetcher.get_optional(CHAT_TEMPLATE),
        weights: weight_files(&fetcher)?,
    })
}

// only a missing index means a single-file checkpoint, any other failure is reported as is
fn weight_files(fetcher: &Fetcher) -> Result<Vec<PathBuf>, VqaError> {
    if !fetcher.contains(WEIGHTS_INDEX)? {
        return Ok(vec![fetcher.get(WEIGHTS)?]);
    }

    let index = fetcher.get(WEIGHTS_INDEX)?;
    shard_names(&index)?
        .iter()
        .map(|shard| fetcher.get(shard))
        .collect()
}

/// Read the unique shard file names listed in a safetensors index.
fn shard_names(index: &Path) -> Result<BTreeSet<String>, VqaError> {
    let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(index)?)?;
    let weight_map = index["weight_map"]
        .as_object()
        .ok_or_else(|| VqaError::MissingModelFile(format!("weight_map in {WEIGHTS_INDEX}")))?;

    Ok(weight_map
        .values()
        .filter_map(|file| file.as_str().map(str::to_owned))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str, contents: &str) -> std::io::Result<()> {
        std::fs::write(dir.join(name), contents)
    }

    #[test]
    fn resolve_sharded_local_model() -> Result<(), VqaError> {
        let dir = tempfile::tempdir()?;
        touch(dir.path(), TOKENIZER, "{}")?;
        touch(dir.path(), TOKENIZER_CONFIG, "{}")?;
        touch(
            dir.path(),
            WEIGHTS_INDEX,
            r#"{"weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            }}"#,
        )?;
        touch(dir.path(), "model-00001-of-00002.safetensors", "")?;
        touch(dir.path(), "model-00002-of-00002.safetensors", "")?;

        let files = resolve_model_files(&ModelSource::Local(dir.path().to_path_buf()))?;
        assert_eq!(files.tokenizer, dir.path().join(TOKENIZER));
        assert_eq!(files.tokenizer_config, Some(dir.path().join(TOKENIZER_CONFIG)));
        assert_eq!(files.chat_template, None);
        assert_eq!(
            files.weights,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
        Ok(())
    }

    #[test]
    fn resolve_single_file_local_model() -> Result<(), VqaError> {
        let dir = tempfile::tempdir()?;
        touch(dir.path(), TOKENIZER, "{}")?;
        touch(dir.path(), WEIGHTS, "")?;

        let files = resolve_model_files(&ModelSource::Local(dir.path().to_path_buf()))?;
        assert_eq!(files.weights, vec![dir.path().join(WEIGHTS)]);
        assert_eq!(files.tokenizer_config, None);
        Ok(())
    }

    #[test]
    fn missing_single_file_weights_are_named() -> Result<(), VqaError> {
        let dir = tempfile::tempdir()?;
        touch(dir.path(), TOKENIZER, "{}")?;

        let err = resolve_model_files(&ModelSource::Local(dir.path().to_path_buf())).unwrap_err();
        assert!(matches!(&err, VqaError::MissingModelFile(path) if path.ends_with(WEIGHTS)));
        Ok(())
    }

    #[test]
    fn unreadable_index_is_not_a_single_file_model() -> Result<(), VqaError> {
        let dir = tempfile::tempdir()?;
        touch(dir.path(), TOKENIZER, "{}")?;
        touch(dir.path(), WEIGHTS_INDEX, "not json")?;
        touch(dir.path(), WEIGHTS, "")?;

        assert!(matches!(
            resolve_model_files(&ModelSource::Local(dir.path().to_path_buf())),
            Err(VqaError::SerializationError(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_files_are_reported() -> Result<(), VqaError> {
        let dir = tempfile::tempdir()?;
        let source = ModelSource::Local(dir.path().to_path_buf());
        assert!(matches!(
            resolve_model_files(&source),
            Err(VqaError::MissingModelFile(_))
        ));

        // tokenizer present, a listed shard missing
        touch(dir.path(), TOKENIZER, "{}")?;
        touch(
            dir.path(),
            WEIGHTS_INDEX,
            r#"{"weight_map": {"a.weight": "model-00001-of-00001.safetensors"}}"#,
        )?;
        assert!(matches!(
            resolve_model_files(&source),
            Err(VqaError::MissingModelFile(_))
        ));
        Ok(())
    }
}
