//! Durable job queue stored in its own SQLite file.
//!
//! A claimed job is leased to one worker. If it is not acked before the lease
//! runs out it becomes claimable again, which gives at-least-once delivery
//! across worker crashes and restarts.

use super::job::{Delivery, Job, QueueError};
use super::queue::JobQueue;
use crate::sqlite_column;
use crate::sqlite_persistence::{format_timestamp, SqlType, Table, VersionedSchema};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const JOB_QUEUE_TABLE: Table = Table {
    name: "job_queue",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        // "pending" or "claimed"
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("attempts", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("enqueued_at", &SqlType::Text, non_null = true),
        sqlite_column!("claimed_at", &SqlType::Text),
    ],
    indices: &[("idx_job_queue_status_enqueued", "status, enqueued_at")],
};

pub const JOB_QUEUE_SCHEMA: VersionedSchema = VersionedSchema {
    version: 1,
    tables: &[JOB_QUEUE_TABLE],
};

const STATUS_PENDING: &str = "pending";
const STATUS_CLAIMED: &str = "claimed";

pub struct SqliteJobQueue {
    conn: Arc<Mutex<Connection>>,
    notify: Notify,
    lease: Duration,
    poll_interval: Duration,
}

impl SqliteJobQueue {
    /// Opens (or creates) the queue database.
    ///
    /// The file must not be shared with the review database.
    pub fn new<P: AsRef<Path>>(db_path: P, lease: Duration, poll_interval: Duration) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open job queue database at {:?}", path))?;
        JOB_QUEUE_SCHEMA
            .create_or_validate(&conn)
            .with_context(|| format!("Job queue database at {:?} has an unexpected schema", path))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on job queue database")?;

        let pending: i64 = conn.query_row("SELECT COUNT(*) FROM job_queue", [], |row| row.get(0))?;
        info!("Job queue ready at {:?}: {} job(s) carried over", path, pending);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            notify: Notify::new(),
            lease,
            poll_interval,
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, QueueError> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Backend("job queue lock poisoned".to_string()))
    }

    /// Claims the oldest pending job, or one whose lease ran out.
    fn try_claim(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.conn()?;
        loop {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = Utc::now();
            let lease = chrono::Duration::from_std(self.lease)
                .map_err(|e| QueueError::Backend(format!("invalid lease: {}", e)))?;
            let lease_cutoff = format_timestamp(&(now - lease));

            let candidate: Option<(String, String, u32)> = tx
                .query_row(
                    "SELECT id, payload, attempts FROM job_queue
                     WHERE status = ?1 OR (status = ?2 AND claimed_at < ?3)
                     ORDER BY enqueued_at, rowid
                     LIMIT 1",
                    params![STATUS_PENDING, STATUS_CLAIMED, lease_cutoff],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((id, payload, attempts)) = candidate else {
                return Ok(None);
            };

            let job = match Job::from_payload(&payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Dropping undecodable job {}: {}", id, e);
                    tx.execute("DELETE FROM job_queue WHERE id = ?1", params![id])?;
                    tx.commit()?;
                    continue;
                }
            };

            tx.execute(
                "UPDATE job_queue SET status = ?1, claimed_at = ?2, attempts = attempts + 1
                 WHERE id = ?3",
                params![STATUS_CLAIMED, format_timestamp(&now), id],
            )?;
            tx.commit()?;

            return Ok(Some(Delivery {
                id,
                job,
                attempt: attempts + 1,
            }));
        }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        let payload = job.to_payload()?;
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT INTO job_queue (id, payload, status, attempts, enqueued_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    payload,
                    STATUS_PENDING,
                    format_timestamp(&Utc::now())
                ],
            )?;
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn next_delivery(&self, token: &CancellationToken) -> Option<Delivery> {
        loop {
            if token.is_cancelled() {
                return None;
            }
            let notified = self.notify.notified();
            match self.try_claim() {
                Ok(Some(delivery)) => return Some(delivery),
                Ok(None) => {}
                Err(e) => warn!("Failed to claim job: {}", e),
            }
            tokio::select! {
                _ = token.cancelled() => return None,
                _ = notified => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM job_queue WHERE id = ?1", params![delivery.id])?;
        Ok(())
    }

    async fn pending_count(&self) -> Result<usize, QueueError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM job_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
