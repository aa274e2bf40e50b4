//! Feedback pipeline composition root
//!
//! Wires the recorder, the performance tracker, the drift detector and
//! the retrain queue together. Each pipeline stage is error-isolated: a
//! failed save never blocks the in-memory weight update, and a tracker
//! problem never blocks drift evaluation.

use crate::accuracy::AccuracyRecorder;
use crate::config::FeedbackConfig;
use crate::drift::{DriftDetector, DriftEvaluation};
use crate::error::FeedbackError;
use crate::performance::{ModelPerformance, ModelPerformanceTracker};
use crate::retrain::{RetrainScheduler, RetrainTicketQueue, RetrainTrigger};
use crate::store::Store;
use crate::types::{AccuracyRecord, AccuracyStats, EntityKey, ForecastMeta, Requester, RetrainTicket};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Outcome of one pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Ok,
    /// Stage did not apply to this outcome
    Skipped(String),
    /// Stage ran and failed; later stages still ran
    Failed(String),
}

impl StageStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StageStatus::Ok)
    }
}

/// Per-stage report for one observed outcome
#[derive(Debug)]
pub struct OutcomeReport {
    pub recorded: StageStatus,
    pub tracked: StageStatus,
    pub drift: StageStatus,
    pub record: Option<AccuracyRecord>,
    pub evaluation: Option<DriftEvaluation>,
}

pub struct FeedbackCoordinator {
    recorder: AccuracyRecorder,
    tracker: ModelPerformanceTracker,
    detector: DriftDetector,
    queue: Arc<RetrainTicketQueue>,
    trigger: Arc<dyn RetrainTrigger>,
    scheduler_interval: Duration,
}

impl FeedbackCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        trigger: Arc<dyn RetrainTrigger>,
        config: &FeedbackConfig,
    ) -> Self {
        let queue = Arc::new(RetrainTicketQueue::new(
            store.clone(),
            Duration::from_secs(config.retrain.timeout_secs),
            config.retrain.force_fresh,
        ));
        Self {
            recorder: AccuracyRecorder::new(store.clone()),
            tracker: ModelPerformanceTracker::new(
                config.performance.window_days,
                config.performance.min_samples,
            ),
            detector: DriftDetector::new(store, queue.clone(), config.drift.clone()),
            queue,
            trigger,
            scheduler_interval: Duration::from_secs(config.scheduler.interval_minutes * 60),
        }
    }

    /// Feed one observed outcome through record -> track -> detect.
    ///
    /// An invalid input skips the whole pipeline (the sample is dropped);
    /// a persistence failure in one stage is reported and the next stage
    /// still runs.
    pub async fn record_observed_outcome(
        &self,
        entity: &EntityKey,
        meta: &ForecastMeta,
        predicted: f64,
        actual: f64,
        observed_at: DateTime<Utc>,
    ) -> OutcomeReport {
        let mut report = OutcomeReport {
            recorded: StageStatus::Ok,
            tracked: StageStatus::Ok,
            drift: StageStatus::Ok,
            record: None,
            evaluation: None,
        };

        match self
            .recorder
            .record_outcome(entity, meta, predicted, actual, observed_at)
            .await
        {
            Ok(record) => report.record = Some(record),
            Err(FeedbackError::InvalidInput(msg)) => {
                warn!(entity = %entity, reason = %msg, "outcome dropped");
                let skipped = StageStatus::Skipped(msg);
                report.recorded = skipped.clone();
                report.tracked = skipped.clone();
                report.drift = skipped;
                return report;
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "accuracy record not persisted");
                report.recorded = StageStatus::Failed(e.to_string());
            }
        }

        report.tracked = self.track_sub_models(entity, meta, actual, observed_at);

        report.drift = match self.detector.evaluate(entity).await {
            Ok(evaluation) => {
                report.evaluation = Some(evaluation);
                StageStatus::Ok
            }
            Err(e) => {
                warn!(entity = %entity, error = %e, "drift evaluation failed");
                StageStatus::Failed(e.to_string())
            }
        };

        report
    }

    /// One performance sample per sub-model prediction captured with the
    /// forecast
    fn track_sub_models(
        &self,
        entity: &EntityKey,
        meta: &ForecastMeta,
        actual: f64,
        observed_at: DateTime<Utc>,
    ) -> StageStatus {
        if meta.model_predictions.is_empty() {
            return StageStatus::Skipped("no sub-model predictions on forecast".to_string());
        }

        let mut failures = Vec::new();
        for (model, predicted) in &meta.model_predictions {
            let error = (predicted - actual).abs();
            let error_percent = error / actual * 100.0;
            if let Err(e) =
                self.tracker
                    .record_sample(model, observed_at, *predicted, actual, error, error_percent)
            {
                warn!(entity = %entity, model, error = %e, "sample rejected");
                failures.push(format!("{}: {}", model, e));
            }
        }
        if failures.is_empty() {
            StageStatus::Ok
        } else {
            StageStatus::Failed(failures.join("; "))
        }
    }

    /// Blended weights for the forecasting engine's next ensemble run
    pub fn model_weights(&self, defaults: &HashMap<String, f64>) -> HashMap<String, f64> {
        self.tracker.weights(defaults)
    }

    /// Tracked performance for one sub-model
    pub fn model_performance(&self, model: &str) -> Option<ModelPerformance> {
        self.tracker.performance(model)
    }

    /// Aggregate accuracy over the last `days` for an entity
    pub async fn accuracy_stats(
        &self,
        entity: &EntityKey,
        days: i64,
    ) -> Result<AccuracyStats, FeedbackError> {
        self.recorder.stats(entity, days).await
    }

    /// Request a retrain outside drift detection, e.g. operator-initiated
    pub async fn request_retrain(
        &self,
        entity: &EntityKey,
        reason: &str,
        requested_by: Requester,
    ) -> Result<RetrainTicket, FeedbackError> {
        self.queue.enqueue(entity, reason, requested_by).await
    }

    /// Drain pending tickets once, outside the scheduler cadence
    pub async fn drain_tickets(&self) -> Result<Option<RetrainTicket>, FeedbackError> {
        self.queue.drain_one(self.trigger.as_ref()).await
    }

    /// Spawn the periodic drain loop; the first tick fires immediately
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        RetrainScheduler::new(
            self.queue.clone(),
            self.trigger.clone(),
            self.scheduler_interval,
        )
        .start()
    }
}
