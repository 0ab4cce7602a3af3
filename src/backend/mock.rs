use crate::backend::{BackendError, PredictionBackend, SavePredictionRequest};
use crate::readings::Reading;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory backend for tests and offline runs.
#[derive(Debug, Default)]
pub struct MockBackend {
    readings: HashMap<u32, Vec<Reading>>,
    fail_fetch: bool,
    fail_save: bool,
    saved: Mutex<Vec<SavePredictionRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_readings(mut self, container_id: u32, readings: Vec<Reading>) -> Self {
        self.readings.insert(container_id, readings);
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    /// Records accepted by [`PredictionBackend::save_prediction`] so far.
    pub fn saved(&self) -> Vec<SavePredictionRequest> {
        match self.saved.lock() {
            Ok(saved) => saved.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PredictionBackend for MockBackend {
    fn fetch_historical(&self, container_id: u32, limit: usize) -> Result<Vec<Reading>, BackendError> {
        if self.fail_fetch {
            return Err(BackendError::Http(503, "mock fetch failure".to_string()));
        }
        let readings = self
            .readings
            .get(&container_id)
            .ok_or_else(|| BackendError::Rejected(format!("unknown container {container_id}")))?;
        Ok(readings[readings.len().saturating_sub(limit)..].to_vec())
    }

    fn save_prediction(&self, record: &SavePredictionRequest) -> Result<(), BackendError> {
        if self.fail_save {
            return Err(BackendError::Http(500, "mock save failure".to_string()));
        }
        match self.saved.lock() {
            Ok(mut saved) => saved.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
        Ok(())
    }
}
