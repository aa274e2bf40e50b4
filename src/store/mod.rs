//! Persistence interface for accuracy records and retrain tickets
//!
//! The feedback pipeline only talks to the store through this narrow
//! save/query surface; adapters own their consistency guarantees.

mod csv;
mod memory;

pub use self::csv::CsvStore;
pub use self::memory::MemoryStore;

use crate::types::{AccuracyRecord, EntityKey, RetrainTicket, TicketStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Narrow field set applied when a ticket changes state
#[derive(Debug, Clone)]
pub struct TicketUpdate {
    pub status: TicketStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl TicketUpdate {
    pub fn status(status: TicketStatus) -> Self {
        Self {
            status,
            completed_at: None,
            notes: None,
        }
    }
}

/// Store for accuracy records and retrain tickets.
///
/// All calls are treated as potentially-failing remote operations.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist an immutable accuracy record
    async fn save_accuracy_record(&self, record: &AccuracyRecord) -> Result<()>;

    /// Records for an entity observed at or after `since`, most recent
    /// first, capped at `limit`
    async fn query_accuracy_records(
        &self,
        entity: &EntityKey,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AccuracyRecord>>;

    /// Persist a newly created ticket
    async fn save_ticket(&self, ticket: &RetrainTicket) -> Result<()>;

    /// Apply a state change; transitions outside the ticket lifecycle
    /// are rejected
    async fn update_ticket(&self, id: Uuid, update: TicketUpdate) -> Result<RetrainTicket>;

    /// Pending tickets in FIFO order by request time
    async fn query_pending_tickets(&self, limit: usize) -> Result<Vec<RetrainTicket>>;

    /// Open (pending or in-progress) ticket for an entity, if any
    async fn find_open_ticket(&self, entity: &EntityKey) -> Result<Option<RetrainTicket>>;
}
