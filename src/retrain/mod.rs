//! Retrain request queue
//!
//! Holds retrain requests as tickets with an explicit lifecycle and
//! drains them one at a time against the external retrain trigger.
//! Retraining is expensive and non-reentrant, so at most one ticket is
//! in progress system-wide at any moment.

mod http;
mod scheduler;

pub use self::http::HttpRetrainTrigger;
pub use self::scheduler::RetrainScheduler;

use crate::error::FeedbackError;
use crate::store::{Store, TicketUpdate};
use crate::types::{EntityKey, Requester, RetrainTicket, TicketStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// External collaborator that performs the actual retraining.
///
/// The call may take tens of seconds; the queue bounds it with a
/// timeout. How retraining is implemented is not this crate's concern.
#[async_trait]
pub trait RetrainTrigger: Send + Sync {
    async fn request(&self, entity: &EntityKey, force_fresh: bool) -> Result<()>;
}

pub struct RetrainTicketQueue {
    store: Arc<dyn Store>,
    trigger_timeout: Duration,
    force_fresh: bool,
    /// Single permit: the in-progress invariant under concurrent drains
    in_flight: Semaphore,
}

impl RetrainTicketQueue {
    pub fn new(store: Arc<dyn Store>, trigger_timeout: Duration, force_fresh: bool) -> Self {
        Self {
            store,
            trigger_timeout,
            force_fresh,
            in_flight: Semaphore::new(1),
        }
    }

    /// Create a pending ticket. Callers that need de-duplication against
    /// open tickets check the store first; the queue itself accepts every
    /// request.
    pub async fn enqueue(
        &self,
        entity: &EntityKey,
        reason: &str,
        requested_by: Requester,
    ) -> Result<RetrainTicket, FeedbackError> {
        let ticket = RetrainTicket::new(entity, reason, requested_by);
        self.store
            .save_ticket(&ticket)
            .await
            .map_err(FeedbackError::Persistence)?;
        info!(
            ticket_id = %ticket.id,
            entity = %entity,
            requested_by = %ticket.requested_by,
            "retrain ticket enqueued"
        );
        Ok(ticket)
    }

    /// Process the oldest pending ticket: move it to in-progress, invoke
    /// the trigger under the timeout and finalize as completed or failed.
    /// Returns `None` when there is nothing to do or another drain is
    /// already running. Failures are terminal for the ticket; a fresh
    /// drift evaluation must create a new one.
    pub async fn drain_one(
        &self,
        trigger: &dyn RetrainTrigger,
    ) -> Result<Option<RetrainTicket>, FeedbackError> {
        let Ok(_permit) = self.in_flight.try_acquire() else {
            // A retrain is running; the next tick will pick the ticket up.
            return Ok(None);
        };

        let pending = self
            .store
            .query_pending_tickets(1)
            .await
            .map_err(FeedbackError::Persistence)?;
        let Some(ticket) = pending.into_iter().next() else {
            return Ok(None);
        };

        let entity = ticket.entity();
        let ticket = self
            .store
            .update_ticket(ticket.id, TicketUpdate::status(TicketStatus::InProgress))
            .await
            .map_err(FeedbackError::Persistence)?;
        info!(ticket_id = %ticket.id, entity = %entity, "retrain started");

        let outcome = tokio::time::timeout(
            self.trigger_timeout,
            trigger.request(&entity, self.force_fresh),
        )
        .await;

        let update = match outcome {
            Ok(Ok(())) => TicketUpdate {
                status: TicketStatus::Completed,
                completed_at: Some(Utc::now()),
                notes: None,
            },
            Ok(Err(e)) => {
                let failure = FeedbackError::RetrainTrigger(format!("{:#}", e));
                warn!(ticket_id = %ticket.id, error = %failure, "retrain trigger failed");
                TicketUpdate {
                    status: TicketStatus::Failed,
                    completed_at: None,
                    notes: Some(failure.to_string()),
                }
            }
            Err(_) => {
                let failure = FeedbackError::RetrainTimeout(self.trigger_timeout);
                warn!(ticket_id = %ticket.id, error = %failure, "retrain trigger timed out");
                TicketUpdate {
                    status: TicketStatus::Failed,
                    completed_at: None,
                    notes: Some(failure.to_string()),
                }
            }
        };

        // The ticket must leave in-progress even if this write fails,
        // otherwise a stuck ticket blocks all future retraining.
        let finalized = match self.store.update_ticket(ticket.id, update).await {
            Ok(t) => t,
            Err(e) => {
                error!(ticket_id = %ticket.id, error = %e, "failed to finalize ticket");
                return Err(FeedbackError::Persistence(e));
            }
        };
        info!(
            ticket_id = %finalized.id,
            status = %finalized.status,
            "retrain finished"
        );
        Ok(Some(finalized))
    }
}
