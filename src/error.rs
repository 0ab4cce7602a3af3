use crate::backend::BackendError;
use crate::prediction::PredictionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("prediction failed: {0}")]
    Prediction(#[from] PredictionError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("state lock poisoned")]
    StateLock,
}
