//! Periodic ticket drainage
//!
//! A spawned task that drains pending retrain tickets one at a time on a
//! fixed interval. The first tick fires immediately so tickets left over
//! from a previous run are picked up at startup.

use super::{RetrainTicketQueue, RetrainTrigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct RetrainScheduler {
    queue: Arc<RetrainTicketQueue>,
    trigger: Arc<dyn RetrainTrigger>,
    interval: Duration,
}

impl RetrainScheduler {
    pub fn new(
        queue: Arc<RetrainTicketQueue>,
        trigger: Arc<dyn RetrainTrigger>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            trigger,
            interval,
        }
    }

    /// Spawn the drain loop. Runs until the returned handle is aborted.
    pub fn start(self) -> JoinHandle<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            "retrain scheduler started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.drain_all().await;
            }
        })
    }

    /// Drain until no pending ticket remains. Errors end the tick, not
    /// the loop.
    pub async fn drain_all(&self) {
        let mut drained = 0usize;
        loop {
            match self.queue.drain_one(self.trigger.as_ref()).await {
                Ok(Some(ticket)) => {
                    drained += 1;
                    debug!(ticket_id = %ticket.id, status = %ticket.status, "ticket drained");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "ticket drain failed, ending tick");
                    break;
                }
            }
        }
        if drained > 0 {
            info!(drained, "scheduler tick finished");
        }
    }
}
