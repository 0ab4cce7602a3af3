use smartbin_forecast::backend::mock::MockBackend;
use smartbin_forecast::error::AppError;
use smartbin_forecast::prediction::features::NormalizationParams;
use smartbin_forecast::prediction::model::{LstmModel, ModelDefinition};
use smartbin_forecast::prediction::{PredictionEngine, PredictionSettings};
use smartbin_forecast::readings::Reading;
use smartbin_forecast::refresh::{refresh_container, run_refresh_cycle};
use smartbin_forecast::state::AppState;
use std::sync::{Arc, RwLock};
use time::{Duration, OffsetDateTime};

const MODEL_JSON: &str = r#"{
  "sequence_length": 12,
  "input_features": 5,
  "layers": [
    {"type": "lstm", "units": 1,
     "kernel": [[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],
     "recurrent_kernel": [[0,0,0,0]],
     "bias": [0,0,0,0]},
    {"type": "dense", "units": 1, "kernel": [[0]], "bias": [0.45]}
  ]
}"#;

fn engine() -> Result<PredictionEngine, Box<dyn std::error::Error>> {
    let definition: ModelDefinition = serde_json::from_str(MODEL_JSON)?;
    let model = LstmModel::from_definition(definition)?;
    let params = NormalizationParams {
        min: vec![0.0; 5],
        scale: vec![0.1, 0.01, 1.0 / 23.0, 1.0 / 6.0, 1.0],
        n_features: 5,
    };
    Ok(PredictionEngine::with_model(
        PredictionSettings::default(),
        Box::new(model),
        params,
    )?)
}

/// Readings ending now, growing 0.1 kg per hour from 2.0 kg.
fn history(count: i64) -> Vec<Reading> {
    let start = OffsetDateTime::now_utc() - Duration::hours(count);
    (0..count)
        .map(|i| Reading::new(start + Duration::hours(i), 2.0 + 0.1 * i as f64, 40.0 + i as f64))
        .collect()
}

#[test]
fn refresh_stores_and_saves_prediction() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let receiver = {
        let guard = state.read().map_err(|_| AppError::StateLock)?;
        guard.subscribe_predictions()
    };
    let backend = MockBackend::new().with_readings(1, history(30));

    let result = refresh_container(&engine, &state, &backend, 1, 20)?;

    // Only the last 20 readings are fetched; the model output is 4.5 kg.
    assert_eq!(result.metadata.samples_used, 20);
    assert!((result.predicted_weight - 4.5).abs() < 1e-9);

    let saved = backend.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].id_contenedor, 1);
    assert!((saved[0].prediccion_peso - 4.5).abs() < 1e-9);
    assert_eq!(saved[0].modelo, "LSTM (Híbrido)");

    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.latest_prediction(1), Some(&result));
    assert!(receiver.borrow().contains_key(&1));
    Ok(())
}

#[test]
fn failed_save_still_updates_state() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let backend = MockBackend::new()
        .with_readings(2, history(15))
        .failing_save();

    let result = refresh_container(&engine, &state, &backend, 2, 20);

    assert!(matches!(result, Err(AppError::Backend(_))));
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert!(guard.latest_prediction(2).is_some());
    assert!(backend.saved().is_empty());
    Ok(())
}

#[test]
fn cycle_counts_only_successful_containers() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let backend = MockBackend::new()
        .with_readings(1, history(20))
        .with_readings(2, history(5));

    // 2 has too little history, 3 is unknown to the backend
    let refreshed = run_refresh_cycle(&engine, &state, &backend, &[1, 2, 3], 20);

    assert_eq!(refreshed, 1);
    assert_eq!(backend.saved().len(), 1);
    let guard = state.read().map_err(|_| AppError::StateLock)?;
    assert_eq!(guard.predictions().len(), 1);
    assert!(guard.latest_prediction(2).is_none());
    Ok(())
}

#[test]
fn fetch_failure_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let engine = engine()?;
    let state = Arc::new(RwLock::new(AppState::new()));
    let backend = MockBackend::new().with_readings(1, history(20)).failing_fetch();

    let result = refresh_container(&engine, &state, &backend, 1, 20);

    assert!(matches!(result, Err(AppError::Backend(_))));
    assert!(backend.saved().is_empty());
    Ok(())
}
