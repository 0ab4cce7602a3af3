//! Linear-regression growth estimator used when the sequence model is not trusted.

use crate::readings::{Reading, hours_between};
use tracing::debug;

/// Most recent readings considered by the regression.
pub const HEURISTIC_WINDOW: usize = 8;

const DEGENERATE_DENOMINATOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicOutput {
    pub predicted_weight: f64,
    pub delta: f64,
    /// kg per hour
    pub growth_rate: f64,
}

/// Least-squares slope of weight against elapsed hours, in kg/h, never negative.
///
/// When every sample shares a timestamp the slope is undefined and the plain
/// first-to-last difference is used instead.
pub fn growth_rate(weights: &[f64], hours: &[f64]) -> f64 {
    let n = weights.len().min(hours.len());
    if n < 2 {
        return 0.0;
    }
    let (weights, hours) = (&weights[..n], &hours[..n]);

    let count = n as f64;
    let sum_x: f64 = hours.iter().sum();
    let sum_y: f64 = weights.iter().sum();
    let sum_xy: f64 = hours.iter().zip(weights).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = hours.iter().map(|x| x * x).sum();

    let denominator = count * sum_x2 - sum_x * sum_x;
    if denominator.abs() < DEGENERATE_DENOMINATOR {
        let elapsed = hours[n - 1] - hours[0];
        return (weights[n - 1] - weights[0]) / elapsed.max(1.0);
    }

    let slope = (count * sum_xy - sum_x * sum_y) / denominator;
    slope.max(0.0)
}

/// Projects the current weight `projection_hours` ahead using the recent trend.
pub fn predict(readings: &[Reading], projection_hours: f64) -> HeuristicOutput {
    let window = &readings[readings.len().saturating_sub(HEURISTIC_WINDOW)..];
    let Some(first) = window.first() else {
        return HeuristicOutput {
            predicted_weight: 0.0,
            delta: 0.0,
            growth_rate: 0.0,
        };
    };

    let weights: Vec<f64> = window.iter().map(Reading::weight).collect();
    let hours: Vec<f64> = window
        .iter()
        .map(|reading| hours_between(first.timestamp, reading.timestamp))
        .collect();

    let rate = growth_rate(&weights, &hours);
    let current = weights.last().copied().unwrap_or(0.0);
    let delta = rate * projection_hours;

    debug!(
        samples = window.len(),
        rate_kg_per_hour = rate,
        projection_hours,
        delta,
        "Heuristic projection computed"
    );

    HeuristicOutput {
        predicted_weight: current + delta,
        delta,
        growth_rate: rate,
    }
}
