//! Configuration management for the feedback subsystem
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main feedback configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    pub performance: PerformanceConfig,
    pub drift: DriftConfig,
    pub scheduler: SchedulerConfig,
    pub retrain: RetrainConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    /// Rolling sample window per model in days
    pub window_days: i64,
    /// Samples required before a model's learned weight participates
    pub min_samples: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriftConfig {
    /// Minimum records required before any evaluation
    pub min_records: usize,
    /// Average error percent that triggers the absolute rule
    pub error_percent_threshold: f64,
    /// Lookback window for the absolute rule in days
    pub window_days: i64,
    /// Record cap for the absolute rule
    pub max_records: usize,
    /// Recent/older ratio triggering degradation over the wide window
    pub degradation_ratio_30d: f64,
    /// Steeper ratio for the narrow recent-record window
    pub degradation_ratio_7d: f64,
    /// Width of the narrow degradation window in days
    pub degradation_window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Ticket drain interval in minutes
    pub interval_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrainConfig {
    /// Retrain endpoint of the forecasting service
    pub endpoint: String,
    /// Upper bound on a single retrain trigger call in seconds
    pub timeout_secs: u64,
    /// Request a fresh (non-cached) model fit
    pub force_fresh: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Data directory for the CSV store
    pub data_dir: String,
    /// Accuracy files older than this are pruned by the store
    pub retention_days: i64,
}

impl FeedbackConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Performance defaults
            .set_default("performance.window_days", 30)?
            .set_default("performance.min_samples", 5)?
            // Drift defaults
            .set_default("drift.min_records", 10)?
            .set_default("drift.error_percent_threshold", 15.0)?
            .set_default("drift.window_days", 30)?
            .set_default("drift.max_records", 50)?
            .set_default("drift.degradation_ratio_30d", 1.2)?
            .set_default("drift.degradation_ratio_7d", 1.3)?
            .set_default("drift.degradation_window_days", 7)?
            // Scheduler defaults
            .set_default("scheduler.interval_minutes", 360)?
            // Retrain defaults
            .set_default("retrain.endpoint", "http://localhost:8000/retrain")?
            .set_default("retrain.timeout_secs", 45)?
            .set_default("retrain.force_fresh", true)?
            // Store defaults
            .set_default("store.data_dir", "./data")?
            .set_default("store.retention_days", 90)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FEEDBACK_*)
            .add_source(Environment::with_prefix("FEEDBACK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let feedback_config: FeedbackConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(feedback_config)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "window={}d min_samples={} drift_threshold={:.1}% interval={}m data_dir={}",
            self.performance.window_days,
            self.performance.min_samples,
            self.drift.error_percent_threshold,
            self.scheduler.interval_minutes,
            self.store.data_dir
        )
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            performance: PerformanceConfig::default(),
            drift: DriftConfig::default(),
            scheduler: SchedulerConfig::default(),
            retrain: RetrainConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            min_samples: 5,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            min_records: 10,
            error_percent_threshold: 15.0,
            window_days: 30,
            max_records: 50,
            degradation_ratio_30d: 1.2,
            degradation_ratio_7d: 1.3,
            degradation_window_days: 7,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 360,
        }
    }
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/retrain".to_string(),
            timeout_secs: 45,
            force_fresh: true,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            retention_days: 90,
        }
    }
}

impl std::fmt::Display for FeedbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
