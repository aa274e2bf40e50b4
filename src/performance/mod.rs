//! Model performance tracking
//!
//! Maintains a bounded, time-windowed error history per sub-model of the
//! forecasting ensemble and derives normalized weights from recent MAPE.
//! State is purely in-process; weights re-converge from fresh observations
//! after a restart.

use crate::error::FeedbackError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use tracing::debug;

/// Share of the final weight taken from learned performance; the rest
/// comes from the caller-supplied defaults so a single noisy window
/// cannot swing ensemble composition abruptly.
const LEARNED_BLEND: f64 = 0.7;

/// One sub-model prediction scored against the observed actual
#[derive(Debug, Clone)]
pub struct ModelPerformanceSample {
    pub at: DateTime<Utc>,
    pub predicted: f64,
    pub actual: f64,
    pub mae: f64,
    pub mape: f64,
    pub error: f64,
    pub error_percent: f64,
}

/// Snapshot of a model's tracked performance
#[derive(Debug, Clone, Serialize)]
pub struct ModelPerformance {
    pub sample_count: usize,
    pub avg_mape: f64,
    pub avg_mae: f64,
    pub current_weight: f64,
}

struct TrackerState {
    /// Insertion-ordered windows per model name
    windows: HashMap<String, VecDeque<ModelPerformanceSample>>,
    /// Last computed blended weights
    current_weights: HashMap<String, f64>,
    /// Defaults supplied on the most recent weights() call
    default_weights: HashMap<String, f64>,
}

pub struct ModelPerformanceTracker {
    window: Duration,
    min_samples: usize,
    state: RwLock<TrackerState>,
}

impl ModelPerformanceTracker {
    pub fn new(window_days: i64, min_samples: usize) -> Self {
        Self {
            window: Duration::days(window_days),
            min_samples,
            state: RwLock::new(TrackerState {
                windows: HashMap::new(),
                current_weights: HashMap::new(),
                default_weights: HashMap::new(),
            }),
        }
    }

    /// Append a sample to the model's window, evicting entries older than
    /// the rolling window, and recompute weights once the model qualifies.
    /// The lock serializes concurrent appends for the same model so the
    /// window reflects insertion order.
    pub fn record_sample(
        &self,
        model: &str,
        at: DateTime<Utc>,
        predicted: f64,
        actual: f64,
        mae: f64,
        mape: f64,
    ) -> Result<(), FeedbackError> {
        for (name, value) in [
            ("predicted", predicted),
            ("actual", actual),
            ("mae", mae),
            ("mape", mape),
        ] {
            if !value.is_finite() {
                return Err(FeedbackError::InvalidInput(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        let error = (predicted - actual).abs();
        let error_percent = if actual.abs() > f64::EPSILON {
            error / actual.abs() * 100.0
        } else {
            0.0
        };

        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        let cutoff = at - self.window;
        let window = state.windows.entry(model.to_string()).or_default();
        window.push_back(ModelPerformanceSample {
            at,
            predicted,
            actual,
            mae,
            mape,
            error,
            error_percent,
        });
        while window.front().map(|s| s.at < cutoff).unwrap_or(false) {
            window.pop_front();
        }

        if window.len() >= self.min_samples {
            let qualified = Self::recompute(&mut state, self.min_samples);
            debug!(model, samples = qualified, "model weights recomputed");
        }
        Ok(())
    }

    /// Blend learned weights with caller-supplied defaults. The returned
    /// map sums to 1.0; with zero qualifying models the defaults are
    /// returned unchanged.
    pub fn weights(&self, defaults: &HashMap<String, f64>) -> HashMap<String, f64> {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        state.default_weights = defaults.clone();
        let qualified = Self::recompute(&mut state, self.min_samples);
        if qualified == 0 {
            return defaults.clone();
        }
        state.current_weights.clone()
    }

    /// Tracked performance for one model, None if no samples remain in
    /// its window
    pub fn performance(&self, model: &str) -> Option<ModelPerformance> {
        let state = self.state.read().unwrap_or_else(|p| p.into_inner());
        let window = state.windows.get(model)?;
        if window.is_empty() {
            return None;
        }
        let count = window.len() as f64;
        Some(ModelPerformance {
            sample_count: window.len(),
            avg_mape: window.iter().map(|s| s.mape).sum::<f64>() / count,
            avg_mae: window.iter().map(|s| s.mae).sum::<f64>() / count,
            current_weight: state.current_weights.get(model).copied().unwrap_or(0.0),
        })
    }

    /// Recompute the blended weight map from scratch. Returns the number
    /// of qualifying models.
    fn recompute(state: &mut TrackerState, min_samples: usize) -> usize {
        let qualifying: Vec<(String, f64)> = state
            .windows
            .iter()
            .filter(|(_, window)| window.len() >= min_samples)
            .map(|(name, window)| {
                let avg_mape =
                    window.iter().map(|s| s.mape).sum::<f64>() / window.len() as f64;
                (name.clone(), avg_mape)
            })
            .collect();

        if qualifying.is_empty() {
            state.current_weights = state.default_weights.clone();
            return 0;
        }

        // 1/(1 + mape/10) bounds the influence of very large MAPE without
        // ever producing a zero or negative weight.
        let raw: Vec<(String, f64)> = qualifying
            .iter()
            .map(|(name, avg_mape)| (name.clone(), 1.0 / (1.0 + avg_mape / 10.0)))
            .collect();
        let raw_total: f64 = raw.iter().map(|(_, w)| w).sum();
        let learned: HashMap<String, f64> = raw
            .into_iter()
            .map(|(name, w)| (name, w / raw_total))
            .collect();

        let default_total: f64 = state.default_weights.values().sum();
        let mut names: Vec<String> = state.default_weights.keys().cloned().collect();
        for name in learned.keys() {
            if !state.default_weights.contains_key(name) {
                names.push(name.clone());
            }
        }

        let mut blended: HashMap<String, f64> = HashMap::new();
        for name in names {
            let default_norm = if default_total > 0.0 {
                state.default_weights.get(&name).copied().unwrap_or(0.0) / default_total
            } else {
                0.0
            };
            // Models below min_samples keep their default weight, diluted
            // proportionally by the final renormalization.
            let weight = match learned.get(&name) {
                Some(l) => LEARNED_BLEND * l + (1.0 - LEARNED_BLEND) * default_norm,
                None => default_norm,
            };
            blended.insert(name, weight);
        }

        let total: f64 = blended.values().sum();
        if total > 0.0 {
            for weight in blended.values_mut() {
                *weight /= total;
            }
        }

        state.current_weights = blended;
        qualifying.len()
    }
}
