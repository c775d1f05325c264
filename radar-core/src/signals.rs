//! Scoring signals
//!
//! A signal is one independently computable contribution to a quality
//! score. Signals are recomputed on every scoring pass and only persisted
//! as the flattened audit line in a profile's rationale.

use serde::{Deserialize, Serialize};

use crate::MAX_SIGNAL_VALUE;

/// A named contribution to the quality score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSignal {
    pub name: String,
    /// Raw attribute value the signal was computed from
    pub raw_value: f64,
    /// Normalized value in 0..=100
    pub normalized_value: f64,
    /// Configured weight
    pub weight: f64,
    /// Weight after redistribution over computable signals
    pub effective_weight: f64,
}

impl ScoringSignal {
    pub fn new(name: &str, raw_value: f64, normalized_value: f64, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            raw_value,
            normalized_value: normalized_value.clamp(0.0, MAX_SIGNAL_VALUE),
            weight,
            effective_weight: weight,
        }
    }

    /// Weighted contribution on the 0..=100 scale
    pub fn contribution(&self) -> f64 {
        self.normalized_value * self.effective_weight
    }

    /// e.g. `rating=4.5->87.5@0.30`
    pub fn audit(&self) -> String {
        format!(
            "{}={}->{:.1}@{:.2}",
            self.name,
            trim_float(self.raw_value),
            self.normalized_value,
            self.effective_weight
        )
    }
}

/// Flatten signals into one audit line
pub fn audit_trail(signals: &[ScoringSignal]) -> String {
    signals
        .iter()
        .map(ScoringSignal::audit)
        .collect::<Vec<_>>()
        .join("; ")
}

fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}
