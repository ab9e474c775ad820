use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use kiradopay_core::{EventCode, LocalReceiptId};
use kiradopay_ledger::ReceiptInput;

use super::{BufferError, BufferedReceipt, ReceiptBuffer};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS buffered_receipts (
    event_code  TEXT NOT NULL,
    id          TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    payload     TEXT NOT NULL,
    PRIMARY KEY (event_code, id)
)
"#;

/// Durable buffer in a local SQLite file.
///
/// Append order is the table's rowid order.
#[derive(Debug, Clone)]
pub struct SqliteReceiptBuffer {
    pool: SqlitePool,
}

impl SqliteReceiptBuffer {
    /// Open (creating if needed) the buffer file at `path`.
    pub async fn open(path: &Path) -> Result<Self, BufferError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BufferError::Storage(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        debug!(path = %path.display(), "opened receipt buffer");
        Self::with_pool(pool).await
    }

    /// A buffer that lives as long as this handle (one shared connection).
    pub async fn in_memory() -> Result<Self, BufferError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, BufferError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl ReceiptBuffer for SqliteReceiptBuffer {
    async fn append(&self, receipt: BufferedReceipt) -> Result<(), BufferError> {
        let result = sqlx::query(
            r#"
            INSERT INTO buffered_receipts (event_code, id, created_at, payload)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(receipt.event_code.as_str())
        .bind(receipt.local_id.to_string())
        .bind(receipt.created_at)
        .bind(Json(&receipt.input))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(BufferError::Duplicate(receipt.local_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_local(&self, event: &EventCode) -> Result<Vec<BufferedReceipt>, BufferError> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at, payload
            FROM buffered_receipts
            WHERE event_code = ?1
            ORDER BY rowid
            "#,
        )
        .bind(event.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<BufferedReceipt, BufferError> {
                let id: String = row.try_get("id")?;
                let created_at: DateTime<Utc> = row.try_get("created_at")?;
                let Json(input): Json<ReceiptInput> = row.try_get("payload")?;
                let local_id = Uuid::parse_str(&id)
                    .map(LocalReceiptId::from_uuid)
                    .map_err(|e| BufferError::Corrupt(format!("id {id:?}: {e}")))?;
                Ok(BufferedReceipt {
                    local_id,
                    event_code: event.clone(),
                    created_at,
                    input,
                })
            })
            .collect()
    }

    async fn remove(&self, event: &EventCode, ids: &[LocalReceiptId]) -> Result<u64, BufferError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM buffered_receipts WHERE event_code = ?1 AND id = ?2")
                .bind(event.as_str())
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        debug!(event_code = %event, removed, "evicted buffered receipts");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::contract;

    #[tokio::test]
    async fn keeps_append_order_per_event() {
        let buffer = SqliteReceiptBuffer::in_memory().await.unwrap();
        contract::keeps_append_order_per_event(&buffer).await;
    }

    #[tokio::test]
    async fn rejects_duplicate_local_ids() {
        let buffer = SqliteReceiptBuffer::in_memory().await.unwrap();
        contract::rejects_duplicate_local_ids(&buffer).await;
    }

    #[tokio::test]
    async fn removes_only_within_event() {
        let buffer = SqliteReceiptBuffer::in_memory().await.unwrap();
        contract::removes_only_within_event(&buffer).await;
    }

    #[tokio::test]
    async fn entries_survive_reopening_the_file() {
        let dir = std::env::temp_dir().join(format!("kiradopay-buffer-{}", Uuid::now_v7()));
        let path = dir.join("buffer.db");

        let entry = contract::sale("EXPO24", "A", 2);
        {
            let buffer = SqliteReceiptBuffer::open(&path).await.unwrap();
            buffer.append(entry.clone()).await.unwrap();
            buffer.pool.close().await;
        }

        let reopened = SqliteReceiptBuffer::open(&path).await.unwrap();
        assert_eq!(
            reopened.list_local(&contract::event("EXPO24")).await.unwrap(),
            vec![entry]
        );

        reopened.pool.close().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
