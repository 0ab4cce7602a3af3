use crate::prediction::confidence::DataQuality;
use crate::prediction::interpretation::Interpretation;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionMethod {
    #[serde(rename = "LSTM")]
    Model,
    #[serde(rename = "Heurística (Regresión Lineal)")]
    Heuristic,
}

impl PredictionMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PredictionMethod::Model => "LSTM",
            PredictionMethod::Heuristic => "Heurística (Regresión Lineal)",
        }
    }
}

/// Diagnostics describing how the final numbers were reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDetail {
    /// Scaled model output.
    #[serde(rename = "output_raw", skip_serializing_if = "Option::is_none", default)]
    pub scaled_output: Option<f64>,
    #[serde(rename = "output_denorm", skip_serializing_if = "Option::is_none", default)]
    pub denormalized_output: Option<f64>,
    #[serde(rename = "delta_calculado", skip_serializing_if = "Option::is_none", default)]
    pub model_delta: Option<f64>,
    #[serde(rename = "razon_heuristica", skip_serializing_if = "Option::is_none", default)]
    pub fallback_reason: Option<String>,
    #[serde(rename = "tasa_crecimiento", skip_serializing_if = "Option::is_none", default)]
    pub growth_rate: Option<f64>,
    #[serde(rename = "delta_ajustado", default)]
    pub delta_adjusted: bool,
    #[serde(rename = "delta_original", skip_serializing_if = "Option::is_none", default)]
    pub original_delta: Option<f64>,
    #[serde(rename = "delta_forzado", skip_serializing_if = "Option::is_none", default)]
    pub forced_delta: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    #[serde(rename = "muestras_usadas")]
    pub samples_used: usize,
    #[serde(rename = "calidad_datos")]
    pub data_quality: DataQuality,
    #[serde(rename = "metodo_usado")]
    pub method: PredictionMethod,
    /// kg per hour used for the fill projection.
    #[serde(rename = "tasa_crecimiento")]
    pub growth_rate: f64,
    #[serde(rename = "detalle_modelo")]
    pub detail: ModelDetail,
}

/// Outcome of one prediction call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "peso_predicho")]
    pub predicted_weight: f64,
    #[serde(rename = "delta_peso")]
    pub delta_weight: f64,
    #[serde(rename = "peso_actual")]
    pub current_weight: f64,
    #[serde(rename = "nivel_actual")]
    pub current_level: f64,
    #[serde(rename = "confianza")]
    pub confidence: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(rename = "fecha_prediccion", with = "time::serde::rfc3339")]
    pub predicted_at: OffsetDateTime,
    #[serde(rename = "fecha_llenado", with = "time::serde::rfc3339::option")]
    pub fill_at: Option<OffsetDateTime>,
    #[serde(rename = "interpretacion")]
    pub interpretation: Interpretation,
    #[serde(rename = "metadatos")]
    pub metadata: PredictionMetadata,
}
