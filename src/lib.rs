//! Forecast Feedback Library
//!
//! Accuracy feedback loop for a price-forecasting engine: records
//! predicted-vs-actual outcomes, adapts ensemble model weights from
//! recent error history, detects forecast drift and manages retrain
//! tickets through their lifecycle.

pub mod accuracy;
pub mod config;
pub mod coordinator;
pub mod drift;
pub mod error;
pub mod performance;
pub mod retrain;
pub mod store;
pub mod types;

pub use config::FeedbackConfig;
pub use coordinator::{FeedbackCoordinator, OutcomeReport, StageStatus};
pub use error::FeedbackError;
