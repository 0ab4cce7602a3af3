//! Periodic fetch → predict → store → save loop for configured containers.

use crate::backend::{PredictionBackend, SavePredictionRequest};
use crate::error::AppError;
use crate::prediction::PredictionEngine;
use crate::prediction::result::PredictionResult;
use crate::state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs one prediction for `container_id` and persists it.
///
/// The result is stored locally before it is sent to the backend, so a failed
/// save still leaves the latest prediction visible through the API.
pub fn refresh_container<B: PredictionBackend + ?Sized>(
    engine: &PredictionEngine,
    state: &Arc<RwLock<AppState>>,
    backend: &B,
    container_id: u32,
    history_limit: usize,
) -> Result<PredictionResult, AppError> {
    let readings = backend.fetch_historical(container_id, history_limit)?;
    let result = engine.predict(&readings, container_id)?;

    {
        let mut guard = state.write().map_err(|_| AppError::StateLock)?;
        guard.set_prediction(container_id, result.clone());
    }

    backend.save_prediction(&SavePredictionRequest::from_result(container_id, &result))?;
    Ok(result)
}

/// Refreshes every container, logging failures; returns how many succeeded.
pub fn run_refresh_cycle<B: PredictionBackend + ?Sized>(
    engine: &PredictionEngine,
    state: &Arc<RwLock<AppState>>,
    backend: &B,
    containers: &[u32],
    history_limit: usize,
) -> usize {
    let mut refreshed = 0;
    for &container_id in containers {
        match refresh_container(engine, state, backend, container_id, history_limit) {
            Ok(result) => {
                refreshed += 1;
                info!(
                    container_id,
                    method = result.metadata.method.label(),
                    delta = result.delta_weight,
                    confidence = result.confidence,
                    "Container prediction refreshed"
                );
            }
            Err(err) => {
                warn!(container_id, error = %err, "Container refresh failed");
            }
        }
    }
    refreshed
}

pub fn spawn_refresh_thread<B>(
    engine: Arc<PredictionEngine>,
    state: Arc<RwLock<AppState>>,
    backend: B,
    containers: Vec<u32>,
    history_limit: usize,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()>
where
    B: PredictionBackend + 'static,
{
    std::thread::spawn(move || {
        if containers.is_empty() {
            warn!("Refresh thread started with no containers configured");
        }

        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            if engine.is_ready() {
                run_refresh_cycle(&engine, &state, &backend, &containers, history_limit);
            } else {
                warn!("Model not ready, skipping refresh cycle");
            }

            sleep_with_stop(interval, &stop, cycle_start);
        }
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(100);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step);
        slept += step;
    }
}
