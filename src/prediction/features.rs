//! Feature pipeline: readings to the fixed-width sequence the model was trained on.
//!
//! Column order is `[weight, level, hour_of_day, day_of_week, one-hot containers...]`
//! and must match the training pipeline.

use crate::prediction::PredictionError;
use crate::readings::Reading;
use serde::{Deserialize, Serialize};

/// Number of readings fed to the sequence model.
pub const SEQUENCE_LENGTH: usize = 12;
/// Weight, level, hour of day and day of week.
pub const BASE_FEATURES: usize = 4;

/// Min/scale parameters of the scaler fitted at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    pub min: Vec<f64>,
    pub scale: Vec<f64>,
    pub n_features: usize,
}

impl NormalizationParams {
    /// Checks the parameters against the feature width the pipeline produces.
    pub fn validate(&self, expected_width: usize) -> Result<(), String> {
        if self.n_features != expected_width {
            return Err(format!(
                "scaler expects {} features, pipeline produces {expected_width}",
                self.n_features
            ));
        }
        if self.min.len() != self.n_features || self.scale.len() != self.n_features {
            return Err(format!(
                "scaler arrays have {} min and {} scale entries for {} features",
                self.min.len(),
                self.scale.len(),
                self.n_features
            ));
        }
        if let Some(index) = self
            .scale
            .iter()
            .position(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(format!("scale[{index}] must be finite and non-zero"));
        }
        if let Some(index) = self.min.iter().position(|m| !m.is_finite()) {
            return Err(format!("min[{index}] must be finite"));
        }
        Ok(())
    }

    /// Applies `(value - min[j]) * scale[j]` to every column.
    pub fn normalize(&self, sequence: &[Vec<f64>]) -> Vec<Vec<f64>> {
        sequence
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.min.iter().zip(&self.scale))
                    .map(|(value, (min, scale))| (value - min) * scale)
                    .collect()
            })
            .collect()
    }

    /// Inverts the scaling of the weight column, the model's only output.
    pub fn denormalize_prediction(&self, scaled: f64) -> f64 {
        match (self.min.first(), self.scale.first()) {
            (Some(min), Some(scale)) => scaled / scale + min,
            _ => scaled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    known_containers: Vec<u32>,
}

impl FeaturePipeline {
    pub fn new(known_containers: Vec<u32>) -> Self {
        Self { known_containers }
    }

    pub fn feature_width(&self) -> usize {
        BASE_FEATURES + self.known_containers.len()
    }

    /// Builds the feature matrix for the most recent [`SEQUENCE_LENGTH`] readings.
    pub fn prepare_sequence(
        &self,
        readings: &[Reading],
        container_id: u32,
    ) -> Result<Vec<Vec<f64>>, PredictionError> {
        if readings.len() < SEQUENCE_LENGTH {
            return Err(PredictionError::InsufficientData {
                required: SEQUENCE_LENGTH,
                received: readings.len(),
            });
        }

        let window = &readings[readings.len() - SEQUENCE_LENGTH..];
        Ok(window
            .iter()
            .map(|reading| self.feature_vector(reading, container_id))
            .collect())
    }

    fn feature_vector(&self, reading: &Reading, container_id: u32) -> Vec<f64> {
        let mut features = Vec::with_capacity(self.feature_width());
        features.push(reading.weight());
        features.push(reading.level());
        features.push(f64::from(reading.timestamp.hour()));
        features.push(f64::from(reading.timestamp.weekday().number_days_from_sunday()));
        features.extend(
            self.known_containers
                .iter()
                .map(|id| if *id == container_id { 1.0 } else { 0.0 }),
        );
        features
    }
}
