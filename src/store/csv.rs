//! CSV/JSON durable store
//!
//! Accuracy records append to daily CSV files under
//! `<data_dir>/accuracy/accuracy_YYYY-MM-DD.csv`; tickets live in a JSON
//! ledger rewritten on every mutation. Retention pruning of old accuracy
//! files is this adapter's concern.

use super::{Store, TicketUpdate};
use crate::types::{AccuracyRecord, EntityKey, RetrainTicket, TicketStatus};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const LEDGER_VERSION: &str = "1.0";

/// On-disk ticket ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TicketLedger {
    version: String,
    tickets: Vec<RetrainTicket>,
    saved_at: i64,
}

pub struct CsvStore {
    data_dir: PathBuf,
    retention_days: i64,
    tickets: RwLock<Vec<RetrainTicket>>,
}

impl CsvStore {
    /// Open the store, loading any existing ticket ledger and pruning
    /// accuracy files older than the retention window
    pub fn new(data_dir: &str, retention_days: i64) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);
        fs::create_dir_all(data_dir.join("accuracy")).context("Failed to create data directory")?;

        let ledger_path = data_dir.join("tickets.json");
        let tickets = if ledger_path.exists() {
            let json = fs::read_to_string(&ledger_path)
                .with_context(|| format!("Failed to read {}", ledger_path.display()))?;
            let ledger: TicketLedger =
                serde_json::from_str(&json).context("Failed to parse ticket ledger")?;
            info!(
                count = ledger.tickets.len(),
                version = %ledger.version,
                "ticket ledger loaded"
            );
            ledger.tickets
        } else {
            Vec::new()
        };

        let store = Self {
            data_dir,
            retention_days,
            tickets: RwLock::new(tickets),
        };
        let pruned = store.prune_expired()?;
        if pruned > 0 {
            info!(pruned, "expired accuracy files removed");
        }
        Ok(store)
    }

    fn accuracy_dir(&self) -> PathBuf {
        self.data_dir.join("accuracy")
    }

    fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("tickets.json")
    }

    fn daily_file(&self, date: NaiveDate) -> PathBuf {
        self.accuracy_dir()
            .join(format!("accuracy_{}.csv", date.format("%Y-%m-%d")))
    }

    fn append_record(&self, record: &AccuracyRecord) -> Result<()> {
        let path = self.daily_file(Utc::now().date_naive());
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let mut writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);
        writer
            .serialize(record)
            .context("Failed to write accuracy record")?;
        writer.flush().context("Failed to flush accuracy writer")?;
        Ok(())
    }

    fn write_ledger(&self, tickets: &[RetrainTicket]) -> Result<()> {
        let ledger = TicketLedger {
            version: LEDGER_VERSION.to_string(),
            tickets: tickets.to_vec(),
            saved_at: Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string_pretty(&ledger)?;
        fs::write(self.ledger_path(), json)
            .with_context(|| format!("Failed to write {}", self.ledger_path().display()))?;
        Ok(())
    }

    fn load_day(&self, path: &Path) -> Result<Vec<AccuracyRecord>> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut records = Vec::new();
        for result in reader.deserialize() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    file = %path.display(),
                    error = %e,
                    "skipping malformed accuracy row"
                ),
            }
        }
        Ok(records)
    }

    /// Remove accuracy files older than the retention window. Returns the
    /// number of files deleted.
    pub fn prune_expired(&self) -> Result<usize> {
        let cutoff = Utc::now().date_naive() - chrono::Duration::days(self.retention_days);
        let dir = self.accuracy_dir();
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0usize;
        for entry in
            fs::read_dir(&dir).with_context(|| format!("Failed reading {}", dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(date_part) = name
                .strip_prefix("accuracy_")
                .and_then(|rest| rest.strip_suffix(".csv"))
            else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed removing {}", path.display()))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl Store for CsvStore {
    async fn save_accuracy_record(&self, record: &AccuracyRecord) -> Result<()> {
        self.append_record(record)
    }

    async fn query_accuracy_records(
        &self,
        entity: &EntityKey,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AccuracyRecord>> {
        let days = (Utc::now() - since).num_days().max(0);
        let mut records = Vec::new();

        // Files are named by creation date, which is never before the
        // observation date, so sweeping since..today covers the window.
        for i in 0..=days {
            let date = (Utc::now() - chrono::Duration::days(i)).date_naive();
            let path = self.daily_file(date);
            if !path.exists() {
                continue;
            }
            for record in self.load_day(&path)? {
                if record.entity() == *entity && record.observed_at >= since {
                    records.push(record);
                }
            }
        }

        records.sort_by(|a, b| b.observed_at.cmp(&a.observed_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn save_ticket(&self, ticket: &RetrainTicket) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        tickets.push(ticket.clone());
        self.write_ledger(&tickets)
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
        let updated = ticket.clone();
        self.write_ledger(&tickets)?;
        Ok(updated)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Requester, TicketStatus};
    use chrono::Duration;

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "feedback_store_{}_{}",
            test_name,
            Uuid::new_v4()
        ))
    }

    fn sample_record(entity: &EntityKey, observed_at: DateTime<Utc>) -> AccuracyRecord {
        AccuracyRecord {
            id: Uuid::new_v4(),
            asset: entity.asset.clone(),
            currency: entity.currency.clone(),
            forecast_at: observed_at - Duration::hours(24),
            observed_at,
            predicted_price: 101.5,
            actual_price: 100.0,
            error: 1.5,
            error_percent: 1.5,
            model_version: "enhanced-ensemble-1.0".to_string(),
            created_at: observed_at,
        }
    }

    #[tokio::test]
    async fn records_round_trip_through_daily_files() {
        let dir = temp_data_dir("records");
        let store = CsvStore::new(dir.to_str().unwrap(), 90).unwrap();
        let entity = EntityKey::new("BTC", "USD");
        let now = Utc::now();

        store
            .save_accuracy_record(&sample_record(&entity, now - Duration::hours(2)))
            .await
            .unwrap();
        store
            .save_accuracy_record(&sample_record(&entity, now - Duration::hours(1)))
            .await
            .unwrap();
        // Different entity must not leak into queries
        store
            .save_accuracy_record(&sample_record(&EntityKey::new("ETH", "USD"), now))
            .await
            .unwrap();

        let records = store
            .query_accuracy_records(&entity, now - Duration::days(7), 10)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].observed_at > records[1].observed_at);
        assert_eq!(records[0].predicted_price, 101.5);
        assert_eq!(records[0].model_version, "enhanced-ensemble-1.0");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn ticket_ledger_survives_reopen() {
        let dir = temp_data_dir("ledger");
        let entity = EntityKey::new("BTC", "USD");
        let ticket = RetrainTicket::new(&entity, "degradation", Requester::System);

        {
            let store = CsvStore::new(dir.to_str().unwrap(), 90).unwrap();
            store.save_ticket(&ticket).await.unwrap();
            store
                .update_ticket(ticket.id, TicketUpdate::status(TicketStatus::InProgress))
                .await
                .unwrap();
            store
                .update_ticket(
                    ticket.id,
                    TicketUpdate {
                        status: TicketStatus::Failed,
                        completed_at: None,
                        notes: Some("trigger unreachable".to_string()),
                    },
                )
                .await
                .unwrap();
        }

        let reopened = CsvStore::new(dir.to_str().unwrap(), 90).unwrap();
        assert!(reopened.find_open_ticket(&entity).await.unwrap().is_none());
        let pending = reopened.query_pending_tickets(10).await.unwrap();
        assert!(pending.is_empty());

        let json = fs::read_to_string(dir.join("tickets.json")).unwrap();
        let ledger: TicketLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(ledger.tickets.len(), 1);
        assert_eq!(ledger.tickets[0].status, TicketStatus::Failed);
        assert_eq!(
            ledger.tickets[0].notes.as_deref(),
            Some("trigger unreachable")
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn prune_removes_files_outside_retention() {
        let dir = temp_data_dir("prune");
        fs::create_dir_all(dir.join("accuracy")).unwrap();
        let old = dir.join("accuracy").join("accuracy_2020-01-01.csv");
        fs::write(&old, "id\n").unwrap();
        let recent_name = format!(
            "accuracy_{}.csv",
            Utc::now().date_naive().format("%Y-%m-%d")
        );
        let recent = dir.join("accuracy").join(&recent_name);
        fs::write(&recent, "id\n").unwrap();
        // Unrelated files are left alone
        let other = dir.join("accuracy").join("notes.txt");
        fs::write(&other, "keep").unwrap();

        let _store = CsvStore::new(dir.to_str().unwrap(), 30).unwrap();

        assert!(!old.exists(), "expired file should be pruned");
        assert!(recent.exists(), "recent file should be kept");
        assert!(other.exists(), "non-accuracy file should be kept");

        let _ = fs::remove_dir_all(&dir);
    }
}
