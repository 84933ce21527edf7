use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use sqlx::SqlitePool;

use crate::shared::error::{AppError, Result};

/// One durable pending-operation record. Never mutated in place: created on
/// write failure, deleted on successful replay.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub id: i64,
    pub operation: String,
    pub payload: Value,
    pub enqueued_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub attempted: u32,
    pub replayed: u32,
    pub remaining: u32,
}

/// Durable FIFO queue over one named slot of the `pending_operations` table.
/// Insertion order (rowid) is replay order.
#[derive(Clone)]
pub struct PendingQueue {
    pool: SqlitePool,
    slot: String,
}

impl PendingQueue {
    pub fn new(pool: SqlitePool, slot: impl Into<String>) -> Self {
        Self {
            pool,
            slot: slot.into(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub async fn enqueue(&self, operation: &str, payload: &Value) -> Result<i64> {
        let serialized = serde_json::to_string(payload)?;
        let enqueued_at = Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO pending_operations (slot, operation, payload, enqueued_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&self.slot)
        .bind(operation)
        .bind(&serialized)
        .bind(enqueued_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Current records in replay order, for diagnostics.
    pub async fn peek_all(&self) -> Result<Vec<OperationRecord>> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, operation, payload, enqueued_at
            FROM pending_operations
            WHERE slot = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(&self.slot)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, operation, payload, enqueued_at)| {
                Ok(OperationRecord {
                    id,
                    operation,
                    payload: serde_json::from_str(&payload)?,
                    enqueued_at,
                })
            })
            .collect()
    }

    pub async fn len(&self) -> Result<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pending_operations WHERE slot = ?1")
                .bind(&self.slot)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Replays the records pending at the start of the call, in insertion
    /// order, and deletes exactly those whose replay succeeded (by rowid, so
    /// duplicate payloads are safe). Failures stay queued; records enqueued
    /// while the drain runs are untouched until the next cycle.
    pub async fn drain<F>(&self, mut replay: F) -> Result<DrainOutcome>
    where
        F: for<'a> FnMut(&'a OperationRecord) -> BoxFuture<'a, Result<()>>,
    {
        let snapshot = self.peek_all().await?;
        let attempted = snapshot.len() as u32;
        let mut replayed = 0u32;

        for record in &snapshot {
            match replay(record).await {
                Ok(()) => {
                    sqlx::query("DELETE FROM pending_operations WHERE id = ?1")
                        .bind(record.id)
                        .execute(&self.pool)
                        .await?;
                    replayed += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        slot = %self.slot,
                        operation = %record.operation,
                        record_id = record.id,
                        "replay failed, keeping record queued: {}",
                        err
                    );
                }
            }
        }

        Ok(DrainOutcome {
            attempted,
            replayed,
            remaining: self.len().await?,
        })
    }
}
