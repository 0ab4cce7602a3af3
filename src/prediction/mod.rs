//! Hybrid fill prediction: sequence model behind a plausibility gate, with a
//! regression fallback, safety clamps, confidence scoring and interpretation.

use crate::readings::Reading;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

pub mod confidence;
pub mod features;
pub mod heuristic;
pub mod interpretation;
pub mod loader;
pub mod model;
pub mod result;

use features::{FeaturePipeline, NormalizationParams, SEQUENCE_LENGTH};
use heuristic::HeuristicOutput;
use interpretation::FillProjection;
use loader::{LoadedArtifacts, ModelLoader};
use model::{InferenceError, SequenceModel, SequenceTensor, TensorPool};
use result::{ModelDetail, PredictionMetadata, PredictionMethod, PredictionResult};

/// Model deltas below this are an impossible weight loss.
pub const DECREASE_TOLERANCE_KG: f64 = -0.1;
/// Level from which a near-zero model delta is considered implausible.
pub const NEARLY_FULL_LEVEL_PERCENT: f64 = 95.0;
pub const CONSERVATIVE_DELTA_KG: f64 = 0.05;
/// Level treated as a full container by the safety clamp.
pub const FULL_LEVEL_PERCENT: f64 = 99.5;
/// Minimum delta reported for a full container so it is flagged as urgent.
pub const FULL_CONTAINER_MIN_DELTA_KG: f64 = 0.25;

pub const DEFAULT_PROJECTION_HOURS: f64 = 1.0;
pub const DEFAULT_MAX_CAPACITY_KG: f64 = 10.0;
pub const DEFAULT_FILL_TARGET_RATIO: f64 = 0.9;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("model unavailable: {0}")]
    ModelLoad(String),
    #[error("model not initialized; call initialize() first")]
    NotInitialized,
    #[error("at least {required} readings are required, received {received}")]
    InsufficientData { required: usize, received: usize },
}

/// Tunables of the engine that are not part of the trained model.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSettings {
    /// Horizon of the heuristic projection, in hours.
    pub projection_hours: f64,
    pub max_capacity_kg: f64,
    /// Share of capacity treated as "full" for the fill projection.
    pub fill_target_ratio: f64,
    /// Container ids one-hot encoded by the model, in training order.
    pub known_containers: Vec<u32>,
}

impl Default for PredictionSettings {
    fn default() -> Self {
        Self {
            projection_hours: DEFAULT_PROJECTION_HOURS,
            max_capacity_kg: DEFAULT_MAX_CAPACITY_KG,
            fill_target_ratio: DEFAULT_FILL_TARGET_RATIO,
            known_containers: vec![1],
        }
    }
}

impl PredictionSettings {
    pub fn fill_target_kg(&self) -> f64 {
        self.max_capacity_kg * self.fill_target_ratio
    }

    /// Projects when `current_weight` reaches `target_weight` (default: the fill target).
    pub fn estimate_fill_date(
        &self,
        current_weight: f64,
        rate: f64,
        target_weight: Option<f64>,
        now: OffsetDateTime,
    ) -> FillProjection {
        let target = target_weight.unwrap_or_else(|| self.fill_target_kg());
        interpretation::estimate_fill_date(current_weight, rate, target, now)
    }
}

/// Model output after denormalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOutput {
    pub scaled: f64,
    pub predicted_weight: f64,
    pub delta: f64,
}

/// Result of the plausibility gate. A rejection is a normal outcome that
/// carries the heuristic estimate to use instead.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Accepted(ModelOutput),
    Rejected {
        reason: String,
        /// Present when the model ran but its output was implausible.
        model: Option<ModelOutput>,
        heuristic: HeuristicOutput,
    },
}

#[derive(Debug, Error)]
enum ModelFailure {
    #[error("{0}")]
    Features(#[from] PredictionError),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
}

/// Returns the rejection reason when a model delta is physically implausible.
pub fn check_plausibility(model_delta: f64, current_level: f64) -> Option<&'static str> {
    if model_delta < DECREASE_TOLERANCE_KG {
        return Some("model predicts a weight decrease");
    }
    if current_level >= NEARLY_FULL_LEVEL_PERCENT && model_delta < CONSERVATIVE_DELTA_KG {
        return Some("model too conservative for a nearly full container");
    }
    None
}

/// Long-lived prediction service shared by the HTTP layer and the refresh task.
#[derive(Debug)]
pub struct PredictionEngine {
    settings: PredictionSettings,
    pipeline: FeaturePipeline,
    loader: ModelLoader,
    artifacts: Option<LoadedArtifacts>,
    tensors: TensorPool,
}

impl PredictionEngine {
    /// Creates an engine that loads its model from `candidates` on [`initialize`](Self::initialize).
    pub fn new(settings: PredictionSettings, candidates: Vec<PathBuf>) -> Self {
        let pipeline = FeaturePipeline::new(settings.known_containers.clone());
        let loader = ModelLoader::new(candidates, pipeline.feature_width());
        Self {
            settings,
            pipeline,
            loader,
            artifacts: None,
            tensors: TensorPool::new(),
        }
    }

    /// Creates a ready engine around an already constructed model.
    pub fn with_model(
        settings: PredictionSettings,
        model: Box<dyn SequenceModel>,
        params: NormalizationParams,
    ) -> Result<Self, PredictionError> {
        let mut engine = Self::new(settings, Vec::new());
        params
            .validate(engine.pipeline.feature_width())
            .map_err(PredictionError::ModelLoad)?;
        if model.input_features() != params.n_features {
            return Err(PredictionError::ModelLoad(format!(
                "model expects {} input features, scaler provides {}",
                model.input_features(),
                params.n_features
            )));
        }
        if model.sequence_length() != SEQUENCE_LENGTH {
            return Err(PredictionError::ModelLoad(format!(
                "model trained on {} steps, pipeline feeds {SEQUENCE_LENGTH}",
                model.sequence_length()
            )));
        }
        engine.artifacts = Some(LoadedArtifacts {
            model,
            params,
            source: PathBuf::new(),
        });
        Ok(engine)
    }

    /// Loads model and scaler from the configured candidates.
    pub async fn initialize(&mut self) -> Result<(), PredictionError> {
        if self.artifacts.is_some() {
            return Ok(());
        }
        let artifacts = self.loader.load().await?;
        self.artifacts = Some(artifacts);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Directory the model was loaded from, if any.
    pub fn model_source(&self) -> Option<&Path> {
        self.artifacts
            .as_ref()
            .map(|artifacts| artifacts.source.as_path())
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Inference buffers currently leased; zero whenever no call is running.
    pub fn leased_buffers(&self) -> usize {
        self.tensors.live()
    }

    pub fn predict(
        &self,
        readings: &[Reading],
        container_id: u32,
    ) -> Result<PredictionResult, PredictionError> {
        self.predict_at(readings, container_id, OffsetDateTime::now_utc())
    }

    pub fn predict_at(
        &self,
        readings: &[Reading],
        container_id: u32,
        now: OffsetDateTime,
    ) -> Result<PredictionResult, PredictionError> {
        let artifacts = self.artifacts.as_ref().ok_or(PredictionError::NotInitialized)?;
        let insufficient = PredictionError::InsufficientData {
            required: SEQUENCE_LENGTH,
            received: readings.len(),
        };
        if readings.len() < SEQUENCE_LENGTH {
            return Err(insufficient);
        }
        let Some(last) = readings.last() else {
            return Err(insufficient);
        };
        let current_weight = last.weight();
        let current_level = last.level();

        info!(
            container_id,
            samples = readings.len(),
            current_weight,
            current_level,
            "Starting hybrid prediction"
        );

        let outcome = self.run_gate(artifacts, readings, container_id, current_weight, current_level);

        let mut detail = ModelDetail::default();
        let (method, mut predicted_weight, mut delta, growth_rate) = match outcome {
            GateOutcome::Accepted(output) => {
                record_model_output(&mut detail, &output);
                info!(delta = output.delta, "Model prediction accepted");
                let rate = if self.settings.projection_hours > 0.0 {
                    output.delta.max(0.0) / self.settings.projection_hours
                } else {
                    0.0
                };
                (PredictionMethod::Model, output.predicted_weight, output.delta, rate)
            }
            GateOutcome::Rejected {
                reason,
                model,
                heuristic,
            } => {
                if let Some(output) = model.as_ref() {
                    record_model_output(&mut detail, output);
                }
                warn!(reason = %reason, "Model output not trusted, using heuristic estimate");
                detail.fallback_reason = Some(reason);
                detail.growth_rate = Some(heuristic.growth_rate);
                (
                    PredictionMethod::Heuristic,
                    heuristic.predicted_weight,
                    heuristic.delta,
                    heuristic.growth_rate,
                )
            }
        };

        let confidence =
            confidence::confidence(readings, method == PredictionMethod::Model);

        if predicted_weight < current_weight {
            warn!(
                predicted_weight,
                current_weight, "Predicted weight below current weight, clamping"
            );
            predicted_weight = current_weight;
            delta = 0.0;
        }

        if current_level >= FULL_LEVEL_PERCENT && delta < FULL_CONTAINER_MIN_DELTA_KG {
            let original = delta;
            delta = delta.max(FULL_CONTAINER_MIN_DELTA_KG);
            warn!(
                current_level,
                original_delta = original,
                forced_delta = delta,
                "Full container detected, forcing alert delta"
            );
            detail.delta_adjusted = true;
            detail.original_delta = Some(original);
            detail.forced_delta = Some(delta);
        }

        let fill_at = self
            .settings
            .estimate_fill_date(current_weight, growth_rate, None, now)
            .date();
        let predicted_at = Duration::checked_seconds_f64(self.settings.projection_hours * 3600.0)
            .and_then(|horizon| now.checked_add(horizon))
            .unwrap_or(now);

        info!(
            method = method.label(),
            current_weight,
            predicted_weight,
            delta,
            confidence,
            "Prediction complete"
        );

        Ok(PredictionResult {
            predicted_weight,
            delta_weight: delta,
            current_weight,
            current_level,
            confidence,
            timestamp: now,
            predicted_at,
            fill_at,
            interpretation: interpretation::interpret(delta, current_level),
            metadata: PredictionMetadata {
                samples_used: readings.len(),
                data_quality: confidence::DataQuality::from_confidence(confidence),
                method,
                growth_rate,
                detail,
            },
        })
    }

    fn run_gate(
        &self,
        artifacts: &LoadedArtifacts,
        readings: &[Reading],
        container_id: u32,
        current_weight: f64,
        current_level: f64,
    ) -> GateOutcome {
        let (reason, model) = match self.run_model(artifacts, readings, container_id, current_weight) {
            Ok(output) => match check_plausibility(output.delta, current_level) {
                None => return GateOutcome::Accepted(output),
                Some(reason) => (reason.to_string(), Some(output)),
            },
            Err(err) => (err.to_string(), None),
        };

        GateOutcome::Rejected {
            reason,
            model,
            heuristic: heuristic::predict(readings, self.settings.projection_hours),
        }
    }

    fn run_model(
        &self,
        artifacts: &LoadedArtifacts,
        readings: &[Reading],
        container_id: u32,
        current_weight: f64,
    ) -> Result<ModelOutput, ModelFailure> {
        let sequence = self.pipeline.prepare_sequence(readings, container_id)?;
        let normalized = artifacts.params.normalize(&sequence);
        let input = SequenceTensor::from_rows(&normalized, &self.tensors)?;
        let scaled = artifacts.model.predict(&input, &self.tensors)?;
        let predicted_weight = artifacts.params.denormalize_prediction(scaled);
        let delta = predicted_weight - current_weight;

        debug!(
            scaled_output = scaled,
            predicted_weight,
            current_weight,
            delta,
            "Sequence model output"
        );

        Ok(ModelOutput {
            scaled,
            predicted_weight,
            delta,
        })
    }
}

fn record_model_output(detail: &mut ModelDetail, output: &ModelOutput) {
    detail.scaled_output = Some(output.scaled);
    detail.denormalized_output = Some(output.predicted_weight);
    detail.model_delta = Some(output.delta);
}
