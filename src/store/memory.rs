//! In-process store
//!
//! Default wiring for tests and embedded use; state is lost on restart.

use super::{Store, TicketUpdate};
use crate::types::{AccuracyRecord, EntityKey, RetrainTicket, TicketStatus};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<AccuracyRecord>>,
    tickets: RwLock<Vec<RetrainTicket>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All tickets regardless of status, for inspection
    pub async fn all_tickets(&self) -> Vec<RetrainTicket> {
        self.tickets.read().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_accuracy_record(&self, record: &AccuracyRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn query_accuracy_records(
        &self,
        entity: &EntityKey,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AccuracyRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<AccuracyRecord> = records
            .iter()
            .filter(|r| r.entity() == *entity && r.observed_at >= since)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn save_ticket(&self, ticket: &RetrainTicket) -> Result<()> {
        self.tickets.write().await.push(ticket.clone());
        Ok(())
    }

    async fn update_ticket(&self, id: Uuid, update: TicketUpdate) -> Result<RetrainTicket> {
        let mut tickets = self.tickets.write().await;
        let Some(ticket) = tickets.iter_mut().find(|t| t.id == id) else {
            bail!("ticket {} not found", id);
        };
        if !ticket.status.can_transition_to(update.status) {
            bail!(
                "invalid ticket transition {} -> {} for {}",
                ticket.status,
                update.status,
                id
            );
        }
        ticket.status = update.status;
        if update.completed_at.is_some() {
            ticket.completed_at = update.completed_at;
        }
        if update.notes.is_some() {
            ticket.notes = update.notes;
        }
        Ok(ticket.clone())
    }

    async fn query_pending_tickets(&self, limit: usize) -> Result<Vec<RetrainTicket>> {
        let tickets = self.tickets.read().await;
        let mut pending: Vec<RetrainTicket> = tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn find_open_ticket(&self, entity: &EntityKey) -> Result<Option<RetrainTicket>> {
        let tickets = self.tickets.read().await;
        Ok(tickets
            .iter()
            .find(|t| t.status.is_open() && t.entity() == *entity)
            .cloned())
    }
}
