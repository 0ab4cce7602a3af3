use crate::api::ApiState;
use crate::api::responses::{
    ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse, PredictRequest,
};
use crate::prediction::PredictionError;
use crate::prediction::result::PredictionResult;
use crate::readings::Reading;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const MODEL_UNAVAILABLE_MESSAGE: &str = "Prediction model unavailable";

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub enum PredictionResponse {
    Success(Box<PredictionResult>),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl IntoResponse for PredictionResponse {
    fn into_response(self) -> Response {
        match self {
            PredictionResponse::Success(body) => (StatusCode::OK, Json(*body)).into_response(),
            PredictionResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    build_health_response(&state, OffsetDateTime::now_utc())
}

pub async fn post_prediction(
    State(state): State<ApiState>,
    Path(container_id): Path<u32>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    build_prediction_response(&state, container_id, &request.readings, OffsetDateTime::now_utc())
}

pub async fn get_latest_prediction(
    State(state): State<ApiState>,
    Path(container_id): Path<u32>,
) -> impl IntoResponse {
    build_latest_response(&state, container_id, OffsetDateTime::now_utc())
}

fn build_health_response(state: &ApiState, now: OffsetDateTime) -> HealthResponse {
    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return HealthResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error_body("/api/health", "timestamp formatting failure"),
            };
        }
    };

    let model_ready = state.engine.is_ready();
    let (status, status_code) = if model_ready {
        (HealthStatus::Ok, StatusCode::OK)
    } else {
        (HealthStatus::Ko, StatusCode::SERVICE_UNAVAILABLE)
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            model_ready,
            model_path: state
                .engine
                .model_source()
                .map(|path| path.display().to_string()),
            timestamp,
        },
    }
}

fn build_prediction_response(
    state: &ApiState,
    container_id: u32,
    readings: &[Reading],
    now: OffsetDateTime,
) -> PredictionResponse {
    let result = match state.engine.predict_at(readings, container_id, now) {
        Ok(result) => result,
        Err(err) => return prediction_error(err, now),
    };

    match state.store.write() {
        Ok(mut guard) => guard.set_prediction(container_id, result.clone()),
        Err(_) => {
            return PredictionResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error_body(
                    "/api/containers/{id}/predictions",
                    "state lock poisoned while storing prediction",
                ),
            };
        }
    }

    PredictionResponse::Success(Box::new(result))
}

fn build_latest_response(
    state: &ApiState,
    container_id: u32,
    now: OffsetDateTime,
) -> PredictionResponse {
    let latest = match state.store.read() {
        Ok(guard) => guard.latest_prediction(container_id).cloned(),
        Err(_) => {
            return PredictionResponse::Error {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: internal_error_body(
                    "/api/containers/{id}/predictions/latest",
                    "state lock poisoned while reading prediction",
                ),
            };
        }
    };

    match latest {
        Some(result) => PredictionResponse::Success(Box::new(result)),
        None => error_response(
            StatusCode::NOT_FOUND,
            ErrorCode::NoData,
            format!("No prediction available for container {container_id}"),
            now,
        ),
    }
}

fn prediction_error(err: PredictionError, now: OffsetDateTime) -> PredictionResponse {
    match err {
        PredictionError::NotInitialized | PredictionError::ModelLoad(_) => {
            warn!(error = %err, "Prediction requested while model unavailable");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::ModelUnavailable,
                MODEL_UNAVAILABLE_MESSAGE.to_string(),
                now,
            )
        }
        PredictionError::InsufficientData { .. } => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::InsufficientData,
            err.to_string(),
            now,
        ),
    }
}

fn error_response(
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: OffsetDateTime,
) -> PredictionResponse {
    match format_timestamp(now) {
        Ok(timestamp) => PredictionResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message,
                timestamp,
            },
        },
        Err(_) => PredictionResponse::Error {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: internal_error_body("prediction handler", "timestamp formatting failure"),
        },
    }
}

fn internal_error_body(route: &str, message: &str) -> ErrorResponse {
    error!(route, message, "Internal error while handling request");
    let timestamp = format_timestamp(OffsetDateTime::now_utc())
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
    ErrorResponse {
        error_code: ErrorCode::InternalError,
        error_message: INTERNAL_ERROR_MESSAGE.to_string(),
        timestamp,
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    timestamp.format(&Rfc3339)
}
