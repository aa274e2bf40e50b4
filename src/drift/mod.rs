//! Drift detection
//!
//! Watches an entity's recent accuracy history for sustained degradation
//! and requests retraining when a trigger rule fires. One-off noise never
//! triggers: evaluation needs a minimum record count, and an already-open
//! ticket for the entity suppresses new ones.

use crate::config::DriftConfig;
use crate::error::FeedbackError;
use crate::retrain::RetrainTicketQueue;
use crate::store::Store;
use crate::types::{AccuracyRecord, EntityKey, Requester, RetrainTicket};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Outcome of one drift evaluation
#[derive(Debug, Clone)]
pub enum DriftEvaluation {
    /// Fewer records than the evaluation minimum
    InsufficientData { records: usize },
    /// A ticket for this entity is already pending or in progress
    OpenTicket { ticket_id: Uuid },
    /// Recent accuracy is within thresholds
    Healthy,
    /// A trigger rule fired and a ticket was enqueued
    Triggered { ticket: RetrainTicket },
}

pub struct DriftDetector {
    store: Arc<dyn Store>,
    queue: Arc<RetrainTicketQueue>,
    config: DriftConfig,
}

impl DriftDetector {
    pub fn new(store: Arc<dyn Store>, queue: Arc<RetrainTicketQueue>, config: DriftConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    /// Evaluate the entity's recent history. At most one ticket is created
    /// per call; the absolute-error rule wins when both rules fire.
    pub async fn evaluate(&self, entity: &EntityKey) -> Result<DriftEvaluation, FeedbackError> {
        // De-duplicate before any rule runs: one open ticket per entity.
        if let Some(open) = self
            .store
            .find_open_ticket(entity)
            .await
            .map_err(FeedbackError::Persistence)?
        {
            return Ok(DriftEvaluation::OpenTicket { ticket_id: open.id });
        }

        let since = Utc::now() - Duration::days(self.config.window_days);
        let records = self
            .store
            .query_accuracy_records(entity, since, self.config.max_records)
            .await
            .map_err(FeedbackError::Persistence)?;

        if records.len() < self.config.min_records {
            return Ok(DriftEvaluation::InsufficientData {
                records: records.len(),
            });
        }

        let reason = self
            .absolute_error_reason(&records)
            .or_else(|| self.degradation_reason(&records));

        match reason {
            Some(reason) => {
                let ticket = self.queue.enqueue(entity, &reason, Requester::System).await?;
                info!(
                    entity = %entity,
                    ticket_id = %ticket.id,
                    reason = %ticket.reason,
                    "drift detected, retrain requested"
                );
                Ok(DriftEvaluation::Triggered { ticket })
            }
            None => Ok(DriftEvaluation::Healthy),
        }
    }

    /// Rule 1: average error percent across the capped recent window
    fn absolute_error_reason(&self, records: &[AccuracyRecord]) -> Option<String> {
        let avg = mean(records.iter().map(|r| r.error_percent));
        if avg > self.config.error_percent_threshold {
            return Some(format!(
                "average forecast error {:.2}% over the last {} records exceeds {:.1}%",
                avg,
                records.len(),
                self.config.error_percent_threshold
            ));
        }
        None
    }

    /// Rule 2: recent half of the history materially worse than the older
    /// half. The wide framing compares halves of the most recent 20
    /// records; the narrow framing restricts to the last few days with a
    /// steeper ratio.
    fn degradation_reason(&self, records: &[AccuracyRecord]) -> Option<String> {
        // Records arrive most recent first.
        if records.len() >= 20 {
            let recent = mean(records[..10].iter().map(|r| r.error_percent));
            let older = mean(records[10..20].iter().map(|r| r.error_percent));
            if older > 0.0 && recent > older * self.config.degradation_ratio_30d {
                return Some(format!(
                    "recent forecast error {:.2}% degraded beyond {:.1}x the prior {:.2}% ({}-day window)",
                    recent, self.config.degradation_ratio_30d, older, self.config.window_days
                ));
            }
        }

        let cutoff = Utc::now() - Duration::days(self.config.degradation_window_days);
        let narrow: Vec<&AccuracyRecord> =
            records.iter().filter(|r| r.observed_at >= cutoff).collect();
        if narrow.len() >= self.config.min_records {
            let half = narrow.len() / 2;
            let recent = mean(narrow[..half].iter().map(|r| r.error_percent));
            let older = mean(narrow[half..half * 2].iter().map(|r| r.error_percent));
            if older > 0.0 && recent > older * self.config.degradation_ratio_7d {
                return Some(format!(
                    "recent forecast error {:.2}% degraded beyond {:.1}x the prior {:.2}% ({}-day window)",
                    recent,
                    self.config.degradation_ratio_7d,
                    older,
                    self.config.degradation_window_days
                ));
            }
        }
        None
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedbackConfig;
    use crate::store::MemoryStore;
    use crate::types::TicketStatus;
    use chrono::DateTime;
    use std::time::Duration as StdDuration;

    fn detector(store: Arc<MemoryStore>) -> DriftDetector {
        let config = FeedbackConfig::default();
        let queue = Arc::new(RetrainTicketQueue::new(
            store.clone(),
            StdDuration::from_secs(config.retrain.timeout_secs),
            config.retrain.force_fresh,
        ));
        DriftDetector::new(store, queue, config.drift)
    }

    async fn seed(
        store: &MemoryStore,
        entity: &EntityKey,
        observed_at: DateTime<Utc>,
        error_percent: f64,
    ) {
        let record = AccuracyRecord {
            id: Uuid::new_v4(),
            asset: entity.asset.clone(),
            currency: entity.currency.clone(),
            forecast_at: observed_at - Duration::hours(24),
            observed_at,
            predicted_price: 100.0 + error_percent,
            actual_price: 100.0,
            error: error_percent,
            error_percent,
            model_version: "test".to_string(),
            created_at: observed_at,
        };
        store.save_accuracy_record(&record).await.unwrap();
    }

    #[tokio::test]
    async fn never_triggers_below_minimum_record_count() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());
        let entity = EntityKey::new("BTC", "USD");
        let now = Utc::now();

        // 9 records with hopeless accuracy still must not trigger
        for i in 0..9 {
            seed(&store, &entity, now - Duration::hours(i), 80.0).await;
        }

        let result = detector.evaluate(&entity).await.unwrap();
        assert!(matches!(
            result,
            DriftEvaluation::InsufficientData { records: 9 }
        ));
        assert!(store.all_tickets().await.is_empty());
    }

    #[tokio::test]
    async fn absolute_error_rule_triggers_at_ten_records() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());
        let entity = EntityKey::new("BTC", "USD");
        let now = Utc::now();

        for i in 0..10 {
            seed(&store, &entity, now - Duration::hours(i), 20.0).await;
        }

        let result = detector.evaluate(&entity).await.unwrap();
        let DriftEvaluation::Triggered { ticket } = result else {
            panic!("expected trigger, got {:?}", result);
        };
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert_eq!(ticket.requested_by, Requester::System);
        assert!(ticket.reason.contains("exceeds"));
    }

    #[tokio::test]
    async fn degradation_rule_fires_on_doubled_recent_error() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());
        let entity = EntityKey::new("ETH", "USD");
        let now = Utc::now();

        // Older half at 4%, recent half at 8%; absolute average stays
        // well under the 15% threshold
        for i in 0..10 {
            seed(&store, &entity, now - Duration::days(11 + i), 4.0).await;
        }
        for i in 0..10 {
            seed(&store, &entity, now - Duration::days(1 + i), 8.0).await;
        }

        let result = detector.evaluate(&entity).await.unwrap();
        let DriftEvaluation::Triggered { ticket } = result else {
            panic!("expected trigger, got {:?}", result);
        };
        assert!(ticket.reason.contains("degraded"));
    }

    #[tokio::test]
    async fn narrow_window_degradation_uses_steeper_ratio() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());
        let entity = EntityKey::new("SOL", "USD");
        let now = Utc::now();

        // Only 10 records, all inside the narrow window: older five at
        // 4%, recent five at 5% (1.25x) stays under the 1.3x ratio
        for i in 0..5 {
            seed(&store, &entity, now - Duration::hours(48 + i), 4.0).await;
        }
        for i in 0..5 {
            seed(&store, &entity, now - Duration::hours(i), 5.0).await;
        }
        let result = detector.evaluate(&entity).await.unwrap();
        assert!(matches!(result, DriftEvaluation::Healthy));

        // Push the recent half past 1.3x
        let entity2 = EntityKey::new("XRP", "USD");
        for i in 0..5 {
            seed(&store, &entity2, now - Duration::hours(48 + i), 4.0).await;
        }
        for i in 0..5 {
            seed(&store, &entity2, now - Duration::hours(i), 6.0).await;
        }
        let result = detector.evaluate(&entity2).await.unwrap();
        assert!(matches!(result, DriftEvaluation::Triggered { .. }));
    }

    #[tokio::test]
    async fn open_ticket_suppresses_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());
        let entity = EntityKey::new("BTC", "USD");
        let now = Utc::now();

        for i in 0..10 {
            seed(&store, &entity, now - Duration::hours(i), 20.0).await;
        }

        let first = detector.evaluate(&entity).await.unwrap();
        assert!(matches!(first, DriftEvaluation::Triggered { .. }));

        let second = detector.evaluate(&entity).await.unwrap();
        assert!(matches!(second, DriftEvaluation::OpenTicket { .. }));
        assert_eq!(store.all_tickets().await.len(), 1);
    }

    #[tokio::test]
    async fn healthy_history_enqueues_nothing() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());
        let entity = EntityKey::new("BTC", "USD");
        let now = Utc::now();

        for i in 0..30 {
            seed(&store, &entity, now - Duration::hours(i * 6), 3.0).await;
        }

        let result = detector.evaluate(&entity).await.unwrap();
        assert!(matches!(result, DriftEvaluation::Healthy));
        assert!(store.all_tickets().await.is_empty());
    }
}
