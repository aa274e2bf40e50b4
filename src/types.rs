//! Core types used throughout the feedback subsystem
//!
//! Defines common data structures for entities, accuracy records and
//! retrain tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// The (asset, currency) pair an accuracy record or ticket pertains to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Asset symbol, e.g. "BTC"
    pub asset: String,
    /// Quote currency, e.g. "USD"
    pub currency: String,
}

impl EntityKey {
    /// Create a key with normalized (uppercase, trimmed) components
    pub fn new(asset: &str, currency: &str) -> Self {
        Self {
            asset: asset.trim().to_uppercase(),
            currency: currency.trim().to_uppercase(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.asset, self.currency)
    }
}

/// Metadata captured when a forecast was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastMeta {
    /// When the forecasting engine generated the prediction
    pub generated_at: DateTime<Utc>,
    /// Version label of the ensemble that produced it
    pub model_version: String,
    /// Per sub-model predicted prices at the forecast horizon
    /// (e.g. Prophet, LSTM, XGBoost, RandomForest, ARIMA, Sentiment)
    #[serde(default)]
    pub model_predictions: HashMap<String, f64>,
}

/// One finalized forecast paired with its later-observed actual price.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyRecord {
    pub id: Uuid,
    pub asset: String,
    pub currency: String,
    /// When the forecast was generated
    pub forecast_at: DateTime<Utc>,
    /// When the actual price was observed
    pub observed_at: DateTime<Utc>,
    pub predicted_price: f64,
    pub actual_price: f64,
    /// |predicted - actual|
    pub error: f64,
    /// error / actual * 100
    pub error_percent: f64,
    pub model_version: String,
    pub created_at: DateTime<Utc>,
}

impl AccuracyRecord {
    pub fn entity(&self) -> EntityKey {
        EntityKey::new(&self.asset, &self.currency)
    }
}

/// Aggregated accuracy statistics for an entity over a lookback window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyStats {
    pub count: usize,
    pub avg_error: f64,
    pub avg_error_percent: f64,
    /// Lowest error percent in the window
    pub best_error_percent: f64,
    /// Highest error percent in the window
    pub worst_error_percent: f64,
}

/// Who requested a retrain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Requester {
    /// Automated request from drift detection
    System,
    /// Explicit request by a user
    User(String),
}

impl From<Requester> for String {
    fn from(requester: Requester) -> Self {
        requester.to_string()
    }
}

impl TryFrom<String> for Requester {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "system" {
            return Ok(Requester::System);
        }
        if let Some(id) = value.strip_prefix("user:") {
            if !id.is_empty() {
                return Ok(Requester::User(id.to_string()));
            }
        }
        Err(format!("unrecognized requester '{}'", value))
    }
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requester::System => write!(f, "system"),
            Requester::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Retrain ticket lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TicketStatus {
    /// Completed and failed tickets never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Completed | TicketStatus::Failed)
    }

    /// Open tickets block new tickets for the same entity
    pub fn is_open(&self) -> bool {
        matches!(self, TicketStatus::Pending | TicketStatus::InProgress)
    }

    /// Valid lifecycle: pending -> in_progress -> completed | failed
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Pending, TicketStatus::InProgress)
                | (TicketStatus::InProgress, TicketStatus::Completed)
                | (TicketStatus::InProgress, TicketStatus::Failed)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Pending => write!(f, "pending"),
            TicketStatus::InProgress => write!(f, "in_progress"),
            TicketStatus::Completed => write!(f, "completed"),
            TicketStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of work requesting model retraining
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainTicket {
    pub id: Uuid,
    pub asset: String,
    pub currency: String,
    pub requested_at: DateTime<Utc>,
    /// Human-readable trigger description
    pub reason: String,
    pub status: TicketStatus,
    pub requested_by: Requester,
    /// Set when the ticket reaches completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Failure detail for failed tickets
    pub notes: Option<String>,
}

impl RetrainTicket {
    pub fn new(entity: &EntityKey, reason: &str, requested_by: Requester) -> Self {
        Self {
            id: Uuid::new_v4(),
            asset: entity.asset.clone(),
            currency: entity.currency.clone(),
            requested_at: Utc::now(),
            reason: reason.to_string(),
            status: TicketStatus::Pending,
            requested_by,
            completed_at: None,
            notes: None,
        }
    }

    pub fn entity(&self) -> EntityKey {
        EntityKey::new(&self.asset, &self.currency)
    }
}
