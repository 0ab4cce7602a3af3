//! Sensor readings as delivered by the backend's historical endpoint.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One weight/fill sample for a container.
///
/// Raw values may be missing on the wire; the smoothed variants are preferred
/// whenever they carry a usable (non-zero) value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "peso", default)]
    pub weight_kg: Option<f64>,
    #[serde(rename = "nivel", default)]
    pub level_percent: Option<f64>,
    #[serde(rename = "peso_suave", default, skip_serializing_if = "Option::is_none")]
    pub smoothed_weight_kg: Option<f64>,
    #[serde(rename = "nivel_suave", default, skip_serializing_if = "Option::is_none")]
    pub smoothed_level_percent: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: OffsetDateTime, weight_kg: f64, level_percent: f64) -> Self {
        Self {
            timestamp,
            weight_kg: Some(weight_kg),
            level_percent: Some(level_percent),
            smoothed_weight_kg: None,
            smoothed_level_percent: None,
        }
    }

    pub fn with_smoothed(mut self, weight_kg: f64, level_percent: f64) -> Self {
        self.smoothed_weight_kg = Some(weight_kg);
        self.smoothed_level_percent = Some(level_percent);
        self
    }

    /// Weight used for prediction: smoothed when usable, raw otherwise.
    pub fn weight(&self) -> f64 {
        preferred(self.smoothed_weight_kg, self.weight_kg)
    }

    /// Fill level used for prediction: smoothed when usable, raw otherwise.
    pub fn level(&self) -> f64 {
        preferred(self.smoothed_level_percent, self.level_percent)
    }

    /// True when the raw weight or level is missing, zero or negative.
    pub fn has_invalid_values(&self) -> bool {
        !is_positive(self.weight_kg) || !is_positive(self.level_percent)
    }
}

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0 && !v.is_nan())
}

fn preferred(smoothed: Option<f64>, raw: Option<f64>) -> f64 {
    usable(smoothed).or(usable(raw)).unwrap_or(0.0)
}

fn is_positive(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v > 0.0)
}

/// Hours elapsed between two readings' timestamps.
pub fn hours_between(from: OffsetDateTime, to: OffsetDateTime) -> f64 {
    (to - from).as_seconds_f64() / 3600.0
}
