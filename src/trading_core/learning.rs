//! Adaptive per-pattern confidence weighting

use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use super::patterns::PatternId;

pub const DEFAULT_WEIGHT: f64 = 1.0;
pub const MIN_WEIGHT: f64 = 0.2;
pub const MAX_WEIGHT: f64 = 3.0;
/// Adjustment applied per settled trade
pub const WEIGHT_STEP: f64 = 0.1;

/// Weight of one pattern, for presentation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightEntry {
    pub pattern: PatternId,
    pub weight: f64,
}

/// Multiplier per pattern, nudged up on wins and down on losses.
/// Lives for the process lifetime only.
#[derive(Debug, Clone)]
pub struct PatternWeights {
    weights: HashMap<PatternId, f64>,
}

impl Default for PatternWeights {
    fn default() -> Self {
        Self {
            weights: PatternId::ALL.iter().map(|p| (*p, DEFAULT_WEIGHT)).collect(),
        }
    }
}

impl PatternWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight(&self, pattern: PatternId) -> f64 {
        self.weights.get(&pattern).copied().unwrap_or(DEFAULT_WEIGHT)
    }

    /// Move the weight one step toward the outcome, clamped to
    /// [MIN_WEIGHT, MAX_WEIGHT]. Returns the new weight.
    pub fn update_weight(&mut self, pattern: PatternId, is_win: bool) -> f64 {
        let current = self.weight(pattern);
        let delta = if is_win { WEIGHT_STEP } else { -WEIGHT_STEP };
        let updated = (current + delta).clamp(MIN_WEIGHT, MAX_WEIGHT);
        self.weights.insert(pattern, updated);

        info!(
            "Weight {} {}: {:.2} -> {:.2}",
            pattern,
            if is_win { "WIN" } else { "LOSS" },
            current,
            updated
        );
        updated
    }

    /// Weighted confidence, clamped to [0, 100]
    pub fn apply(&self, pattern: PatternId, base_confidence: f64) -> f64 {
        (base_confidence * self.weight(pattern)).clamp(0.0, 100.0)
    }

    /// All weights in catalogue order
    pub fn snapshot(&self) -> Vec<WeightEntry> {
        PatternId::ALL
            .iter()
            .map(|p| WeightEntry {
                pattern: *p,
                weight: self.weight(*p),
            })
            .collect()
    }
}
