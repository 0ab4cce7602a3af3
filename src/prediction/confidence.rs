//! Data-quality confidence score in `[0, 100]`.

use crate::readings::Reading;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Readings needed before the sample-count penalty stops applying.
pub const FULL_CONFIDENCE_SAMPLES: usize = 15;
/// Ceiling for predictions produced by the heuristic estimator.
pub const HEURISTIC_CONFIDENCE_CAP: f64 = 65.0;

const FROZEN_SENSOR_WINDOW: usize = 5;
const FULL_LEVEL_PERCENT: f64 = 99.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataQuality {
    #[serde(rename = "Alta")]
    High,
    #[serde(rename = "Media")]
    Medium,
    #[serde(rename = "Baja")]
    Low,
}

impl DataQuality {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 80.0 {
            DataQuality::High
        } else if confidence >= 60.0 {
            DataQuality::Medium
        } else {
            DataQuality::Low
        }
    }
}

/// Scores the readings, starting from 100 and subtracting quality penalties.
pub fn confidence(readings: &[Reading], used_model: bool) -> f64 {
    if readings.is_empty() {
        return 0.0;
    }

    let mut score = 100.0;
    let mut issues: Vec<String> = Vec::new();

    if readings.len() < FULL_CONFIDENCE_SAMPLES {
        let penalty = 3.0 * (FULL_CONFIDENCE_SAMPLES - readings.len()) as f64;
        score -= penalty;
        issues.push(format!("limited samples (-{penalty})"));
    }

    let weights: Vec<f64> = readings.iter().map(Reading::weight).collect();
    let levels: Vec<f64> = readings.iter().map(Reading::level).collect();

    let recent = &weights[weights.len().saturating_sub(FROZEN_SENSOR_WINDOW)..];
    if recent.windows(2).all(|pair| pair[0] == pair[1]) {
        score -= 25.0;
        issues.push("frozen weight sensor (-25)".to_string());
    }

    if std_dev(&weights) < 0.01 {
        score -= 10.0;
        issues.push("very low weight variability (-10)".to_string());
    }
    if std_dev(&levels) < 0.5 {
        score -= 10.0;
        issues.push("very low level variability (-10)".to_string());
    }

    let saturated = levels.iter().filter(|l| **l >= FULL_LEVEL_PERCENT).count();
    if saturated as f64 > readings.len() as f64 * 0.5 {
        score -= 20.0;
        issues.push("level pinned at 100% (-20)".to_string());
    }

    let invalid = readings.iter().filter(|r| r.has_invalid_values()).count();
    if invalid > 0 {
        let penalty = 5.0 * invalid as f64;
        score -= penalty;
        issues.push(format!("missing or invalid values (-{penalty})"));
    }

    if has_large_gap(readings) {
        score -= 15.0;
        issues.push("large time gaps (-15)".to_string());
    }

    if !used_model {
        score = f64::min(score, HEURISTIC_CONFIDENCE_CAP);
        issues.push("heuristic estimate (capped at 65)".to_string());
    }

    if !issues.is_empty() {
        warn!(issues = ?issues, "Data quality issues detected");
    }

    score.clamp(0.0, 100.0)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
    variance.sqrt()
}

fn has_large_gap(readings: &[Reading]) -> bool {
    let gaps: Vec<f64> = readings
        .windows(2)
        .map(|pair| (pair[1].timestamp - pair[0].timestamp).as_seconds_f64())
        .collect();
    if gaps.is_empty() {
        return false;
    }
    let average = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let max = gaps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max > average * 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::datetime;

    fn healthy(count: usize) -> Vec<Reading> {
        let start = datetime!(2025-11-20 00:00 UTC);
        (0..count)
            .map(|i| {
                Reading::new(
                    start + Duration::minutes(15 * i as i64),
                    1.0 + 0.05 * i as f64,
                    10.0 + 2.0 * i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn clean_data_scores_full_confidence() {
        assert_eq!(confidence(&healthy(20), true), 100.0);
    }

    #[test]
    fn few_samples_are_penalized_three_points_each() {
        assert_eq!(confidence(&healthy(12), true), 91.0);
    }

    #[test]
    fn heuristic_is_capped() {
        assert_eq!(confidence(&healthy(20), false), 65.0);
    }

    #[test]
    fn frozen_sensor_is_penalized() {
        let mut readings = healthy(20);
        for reading in readings.iter_mut().skip(15) {
            reading.weight_kg = Some(1.75);
        }

        assert_eq!(confidence(&readings, true), 75.0);
    }

    #[test]
    fn static_series_stacks_penalties() {
        let start = datetime!(2025-11-20 00:00 UTC);
        let readings: Vec<Reading> = (0..15)
            .map(|i| Reading::new(start + Duration::minutes(10 * i), 3.0, 100.0))
            .collect();

        // frozen -25, weight std -10, level std -10, saturated level -20
        assert_eq!(confidence(&readings, true), 35.0);
    }

    #[test]
    fn invalid_values_cost_five_points_each() {
        let mut readings = healthy(20);
        readings[3].weight_kg = None;
        readings[4].level_percent = Some(-1.0);

        assert_eq!(confidence(&readings, true), 90.0);
    }

    #[test]
    fn large_gap_is_penalized() {
        let mut readings = healthy(20);
        let shift = Duration::hours(3);
        for reading in readings.iter_mut().skip(10) {
            reading.timestamp += shift;
        }

        assert_eq!(confidence(&readings, true), 85.0);
    }

    #[test]
    fn score_never_drops_below_zero() {
        let start = datetime!(2025-11-20 00:00 UTC);
        let readings: Vec<Reading> = [0, 1, 2, 12]
            .into_iter()
            .map(|minute| Reading {
                timestamp: start + Duration::minutes(minute),
                weight_kg: None,
                level_percent: None,
                smoothed_weight_kg: None,
                smoothed_level_percent: None,
            })
            .collect();

        assert_eq!(confidence(&readings, true), 0.0);
    }

    #[test]
    fn empty_input_has_no_confidence() {
        assert_eq!(confidence(&[], true), 0.0);
    }

    #[test]
    fn std_dev_divides_by_population() {
        let value = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);

        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn quality_labels_follow_thresholds() {
        assert_eq!(DataQuality::from_confidence(80.0), DataQuality::High);
        assert_eq!(DataQuality::from_confidence(79.9), DataQuality::Medium);
        assert_eq!(DataQuality::from_confidence(60.0), DataQuality::Medium);
        assert_eq!(DataQuality::from_confidence(59.0), DataQuality::Low);
    }
}
