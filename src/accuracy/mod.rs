//! Accuracy recording
//!
//! Pairs a finalized forecast with its later-observed actual price,
//! computes error metrics and persists the immutable record.

use crate::error::FeedbackError;
use crate::store::Store;
use crate::types::{AccuracyRecord, AccuracyStats, EntityKey, ForecastMeta};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct AccuracyRecorder {
    store: Arc<dyn Store>,
}

impl AccuracyRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Compute error metrics for an observed outcome and persist the
    /// record. The save must complete, or surface a failure, before this
    /// returns; there are no silent drops.
    pub async fn record_outcome(
        &self,
        entity: &EntityKey,
        meta: &ForecastMeta,
        predicted_price: f64,
        actual_price: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<AccuracyRecord, FeedbackError> {
        validate_price(predicted_price, "predicted_price")?;
        validate_price(actual_price, "actual_price")?;
        if observed_at < meta.generated_at {
            return Err(FeedbackError::InvalidInput(format!(
                "observation at {} precedes forecast at {}",
                observed_at, meta.generated_at
            )));
        }

        let error = (predicted_price - actual_price).abs();
        let error_percent = error / actual_price * 100.0;

        let record = AccuracyRecord {
            id: Uuid::new_v4(),
            asset: entity.asset.clone(),
            currency: entity.currency.clone(),
            forecast_at: meta.generated_at,
            observed_at,
            predicted_price,
            actual_price,
            error,
            error_percent,
            model_version: meta.model_version.clone(),
            created_at: Utc::now(),
        };

        self.store
            .save_accuracy_record(&record)
            .await
            .map_err(FeedbackError::Persistence)?;
        debug!(entity = %entity, error_percent, "accuracy record saved");
        Ok(record)
    }

    /// Aggregate accuracy over the last `days` of records for an entity
    pub async fn stats(
        &self,
        entity: &EntityKey,
        days: i64,
    ) -> Result<AccuracyStats, FeedbackError> {
        let since = Utc::now() - Duration::days(days);
        let records = self
            .store
            .query_accuracy_records(entity, since, usize::MAX)
            .await
            .map_err(FeedbackError::Persistence)?;
        Ok(aggregate(&records))
    }
}

fn validate_price(value: f64, field: &str) -> Result<(), FeedbackError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(FeedbackError::InvalidInput(format!(
            "{} must be a positive finite number, got {}",
            field, value
        )));
    }
    Ok(())
}

fn aggregate(records: &[AccuracyRecord]) -> AccuracyStats {
    if records.is_empty() {
        return AccuracyStats {
            count: 0,
            avg_error: 0.0,
            avg_error_percent: 0.0,
            best_error_percent: 0.0,
            worst_error_percent: 0.0,
        };
    }

    let count = records.len();
    let avg_error = records.iter().map(|r| r.error).sum::<f64>() / count as f64;
    let avg_error_percent = records.iter().map(|r| r.error_percent).sum::<f64>() / count as f64;
    let best_error_percent = records
        .iter()
        .map(|r| r.error_percent)
        .fold(f64::INFINITY, f64::min);
    let worst_error_percent = records
        .iter()
        .map(|r| r.error_percent)
        .fold(f64::NEG_INFINITY, f64::max);

    AccuracyStats {
        count,
        avg_error,
        avg_error_percent,
        best_error_percent,
        worst_error_percent,
    }
}
