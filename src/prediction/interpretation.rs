//! Operational interpretation of a prediction and time-to-threshold projection.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Growth below this (kg/h) is treated as no growth.
pub const MIN_PROJECTABLE_RATE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertColor {
    Red,
    Orange,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "URGENTE")]
    Urgent,
    #[serde(rename = "ALTA")]
    High,
    #[serde(rename = "MEDIA-ALTA")]
    MediumHigh,
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "BAJA")]
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    #[serde(rename = "estado")]
    pub state: String,
    pub decision: String,
    pub color: AlertColor,
    #[serde(rename = "prioridad")]
    pub priority: Priority,
}

impl Interpretation {
    fn new(state: &str, decision: &str, color: AlertColor, priority: Priority) -> Self {
        Self {
            state: state.to_string(),
            decision: decision.to_string(),
            color,
            priority,
        }
    }
}

/// Maps the predicted delta and current level to a recommendation.
///
/// Level thresholds take precedence over the deposit rate.
pub fn interpret(delta: f64, current_level: f64) -> Interpretation {
    if current_level >= 99.5 {
        return Interpretation::new(
            "🔴 CONTENEDOR LLENO",
            "CRÍTICO: Recolección INMEDIATA requerida. Contenedor al 100%.",
            AlertColor::Red,
            Priority::Urgent,
        );
    }
    if current_level >= 90.0 {
        return Interpretation::new(
            "🟠 CONTENEDOR CASI LLENO",
            "IMPORTANTE: Programar recolección pronto. Nivel > 90%.",
            AlertColor::Orange,
            Priority::High,
        );
    }
    if delta >= 0.2 {
        return Interpretation::new(
            "🔴 Alto Ritmo de Depósito",
            "ALERTA: Alto ritmo detectado. Evaluar recolección anticipada.",
            AlertColor::Red,
            Priority::MediumHigh,
        );
    }
    if delta >= 0.05 {
        return Interpretation::new(
            "🟢 Ritmo Normal",
            "Operación normal. Continuar monitoreo estándar.",
            AlertColor::Green,
            Priority::Normal,
        );
    }
    Interpretation::new(
        "🟡 Bajo Ritmo",
        "Ritmo bajo de depósito. Considerar optimización de ruta.",
        AlertColor::Orange,
        Priority::Low,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillProjection {
    /// Growth too slow (or the horizon too far) to project.
    Unknown,
    AlreadyReached { at: OffsetDateTime },
    Projected {
        at: OffsetDateTime,
        hours_remaining: f64,
    },
}

impl FillProjection {
    pub fn date(&self) -> Option<OffsetDateTime> {
        match self {
            FillProjection::Unknown => None,
            FillProjection::AlreadyReached { at } | FillProjection::Projected { at, .. } => {
                Some(*at)
            }
        }
    }

    pub fn hours_remaining(&self) -> Option<f64> {
        match self {
            FillProjection::Unknown => None,
            FillProjection::AlreadyReached { .. } => Some(0.0),
            FillProjection::Projected {
                hours_remaining, ..
            } => Some(*hours_remaining),
        }
    }
}

/// Projects when `current_weight` reaches `target_weight` growing at `rate` kg/h.
pub fn estimate_fill_date(
    current_weight: f64,
    rate: f64,
    target_weight: f64,
    now: OffsetDateTime,
) -> FillProjection {
    if !(rate >= MIN_PROJECTABLE_RATE) {
        return FillProjection::Unknown;
    }
    if current_weight >= target_weight {
        return FillProjection::AlreadyReached { at: now };
    }

    let hours_remaining = (target_weight - current_weight) / rate;
    let at = Duration::checked_seconds_f64(hours_remaining * 3600.0)
        .and_then(|offset| now.checked_add(offset));
    match at {
        Some(at) => FillProjection::Projected {
            at,
            hours_remaining,
        },
        None => FillProjection::Unknown,
    }
}
