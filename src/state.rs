use crate::prediction::result::PredictionResult;
use std::collections::HashMap;
use tokio::sync::watch;

/// Latest prediction per container.
#[derive(Debug)]
pub struct AppState {
    predictions: HashMap<u32, PredictionResult>,
    predictions_tx: watch::Sender<HashMap<u32, PredictionResult>>,
}

impl AppState {
    pub fn new() -> Self {
        let (predictions_tx, _predictions_rx) = watch::channel(HashMap::new());
        Self {
            predictions: HashMap::new(),
            predictions_tx,
        }
    }

    pub fn latest_prediction(&self, container_id: u32) -> Option<&PredictionResult> {
        self.predictions.get(&container_id)
    }

    pub fn predictions(&self) -> &HashMap<u32, PredictionResult> {
        &self.predictions
    }

    pub fn subscribe_predictions(&self) -> watch::Receiver<HashMap<u32, PredictionResult>> {
        self.predictions_tx.subscribe()
    }

    /// Stores the result and notifies subscribers, whether or not any are listening.
    pub fn set_prediction(&mut self, container_id: u32, prediction: PredictionResult) {
        self.predictions.insert(container_id, prediction);
        self.predictions_tx.send_replace(self.predictions.clone());
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::confidence::DataQuality;
    use crate::prediction::interpretation::interpret;
    use crate::prediction::result::{ModelDetail, PredictionMetadata, PredictionMethod};
    use time::macros::datetime;

    fn prediction(delta: f64) -> PredictionResult {
        let now = datetime!(2025-11-20 12:00 UTC);
        PredictionResult {
            predicted_weight: 2.0 + delta,
            delta_weight: delta,
            current_weight: 2.0,
            current_level: 40.0,
            confidence: 90.0,
            timestamp: now,
            predicted_at: now,
            fill_at: None,
            interpretation: interpret(delta, 40.0),
            metadata: PredictionMetadata {
                samples_used: 20,
                data_quality: DataQuality::High,
                method: PredictionMethod::Model,
                growth_rate: delta,
                detail: ModelDetail::default(),
            },
        }
    }

    #[test]
    fn set_prediction_updates_state_and_watch() {
        let mut state = AppState::new();
        let receiver = state.subscribe_predictions();

        state.set_prediction(1, prediction(0.1));

        assert_eq!(state.latest_prediction(1), Some(&prediction(0.1)));
        assert_eq!(receiver.borrow().get(&1), Some(&prediction(0.1)));
    }

    #[test]
    fn set_prediction_without_subscribers_still_stores() {
        let mut state = AppState::new();

        state.set_prediction(3, prediction(0.0));
        state.set_prediction(3, prediction(0.3));

        assert_eq!(state.predictions().len(), 1);
        assert_eq!(state.latest_prediction(3).map(|p| p.delta_weight), Some(0.3));
        assert!(state.latest_prediction(1).is_none());
    }
}
