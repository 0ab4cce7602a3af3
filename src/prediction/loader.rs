//! Loads the sequence model and its scaler from the first usable candidate directory.

use crate::prediction::PredictionError;
use crate::prediction::features::{NormalizationParams, SEQUENCE_LENGTH};
use crate::prediction::model::{LstmModel, ModelDefinition, SequenceModel};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const MODEL_FILE: &str = "model.json";
pub const SCALER_FILE: &str = "scaler_params.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid artifact {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Model and scaler loaded from one candidate directory.
#[derive(Debug)]
pub struct LoadedArtifacts {
    pub model: Box<dyn SequenceModel>,
    pub params: NormalizationParams,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ModelLoader {
    candidates: Vec<PathBuf>,
    feature_width: usize,
}

impl ModelLoader {
    pub fn new(candidates: Vec<PathBuf>, feature_width: usize) -> Self {
        Self {
            candidates,
            feature_width,
        }
    }

    /// Tries every candidate in order; the first complete, valid pair wins.
    pub async fn load(&self) -> Result<LoadedArtifacts, PredictionError> {
        let mut last_error: Option<ArtifactError> = None;

        for base in &self.candidates {
            match self.load_candidate(base).await {
                Ok(artifacts) => {
                    info!(
                        path = %base.display(),
                        features = artifacts.params.n_features,
                        "Sequence model loaded"
                    );
                    return Ok(artifacts);
                }
                Err(err) => {
                    warn!(path = %base.display(), error = %err, "Could not load model candidate");
                    last_error = Some(err);
                }
            }
        }

        let last = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no candidate paths configured".to_string());
        Err(PredictionError::ModelLoad(format!(
            "no candidate path produced a usable model; last error: {last}"
        )))
    }

    async fn load_candidate(&self, base: &Path) -> Result<LoadedArtifacts, ArtifactError> {
        let model_path = base.join(MODEL_FILE);
        let definition: ModelDefinition = read_json(&model_path).await?;
        let model = LstmModel::from_definition(definition).map_err(|reason| {
            ArtifactError::Invalid {
                path: model_path.clone(),
                reason,
            }
        })?;
        if model.sequence_length() != SEQUENCE_LENGTH {
            return Err(ArtifactError::Invalid {
                path: model_path,
                reason: format!(
                    "model trained on {} steps, pipeline feeds {SEQUENCE_LENGTH}",
                    model.sequence_length()
                ),
            });
        }

        let scaler_path = base.join(SCALER_FILE);
        let params: NormalizationParams = read_json(&scaler_path).await?;
        params
            .validate(self.feature_width)
            .map_err(|reason| ArtifactError::Invalid {
                path: scaler_path.clone(),
                reason,
            })?;

        if model.input_features() != params.n_features {
            return Err(ArtifactError::Invalid {
                path: model_path,
                reason: format!(
                    "model expects {} input features, scaler provides {}",
                    model.input_features(),
                    params.n_features
                ),
            });
        }

        Ok(LoadedArtifacts {
            model: Box::new(model),
            params,
            source: base.to_path_buf(),
        })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ArtifactError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&contents).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
