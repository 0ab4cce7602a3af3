//! Client side of the dashboard's REST backend: historical readings in,
//! prediction records out.

use crate::prediction::result::PredictionResult;
use crate::readings::Reading;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod mock;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns error: {0}")]
    Dns(String),
    #[error("connect error: {0}")]
    Connect(std::io::Error),
    #[error("io error: {0}")]
    Io(std::io::Error),
    #[error("http status {0} ({1})")]
    Http(u16, String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

/// Operations the host needs from the backend.
pub trait PredictionBackend: Send + Sync {
    /// Most recent `limit` readings for a container, oldest first.
    fn fetch_historical(&self, container_id: u32, limit: usize) -> Result<Vec<Reading>, BackendError>;

    fn save_prediction(&self, record: &SavePredictionRequest) -> Result<(), BackendError>;
}

/// `{ success, data }` envelope used by the backend.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> Result<T, BackendError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(BackendError::Rejected(
                self.error
                    .or(self.message)
                    .unwrap_or_else(|| "request unsuccessful".to_string()),
            )),
        }
    }
}

/// Body of `POST /predictions/save`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavePredictionRequest {
    pub id_contenedor: u32,
    pub prediccion_peso: f64,
    pub delta_peso: f64,
    pub peso_actual: f64,
    pub confianza: f64,
    pub modelo: String,
    pub estado: String,
    pub decision_auditable: String,
}

impl SavePredictionRequest {
    pub fn from_result(container_id: u32, result: &PredictionResult) -> Self {
        Self {
            id_contenedor: container_id,
            prediccion_peso: result.predicted_weight,
            delta_peso: result.delta_weight,
            peso_actual: result.current_weight,
            confianza: result.confidence,
            modelo: format!("{} (Híbrido)", result.metadata.method.label()),
            estado: result.interpretation.state.clone(),
            decision_auditable: result.interpretation.decision.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_returns_data_on_success() -> Result<(), BackendError> {
        let envelope: Envelope<Vec<u32>> =
            serde_json::from_str(r#"{"success": true, "data": [1, 2]}"#)?;

        assert_eq!(envelope.into_data()?, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn envelope_failure_surfaces_backend_message() -> Result<(), BackendError> {
        let envelope: Envelope<Vec<u32>> =
            serde_json::from_str(r#"{"success": false, "error": "Contenedor no encontrado"}"#)?;

        let err = envelope.into_data().expect_err("unsuccessful envelope");
        assert_eq!(err.to_string(), "backend rejected request: Contenedor no encontrado");
        Ok(())
    }
}
