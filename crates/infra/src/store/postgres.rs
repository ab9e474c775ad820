//! Postgres-backed store.
//!
//! Each write runs in one transaction that first locks the target event row
//! (`SELECT ... FOR UPDATE`), so concurrent writers to the same event are
//! serialized and every call commits all of its writes or none of them.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StorageError | Scenario |
//! |------------|-----------------|--------------|----------|
//! | Database | `23505` | `UniqueViolation` | Duplicate code or client id |
//! | Database | `23503` | `ForeignKeyViolation` | Undisplayed item, unknown item, sold item |
//! | Database | `40001`, `40P01` | `SerializationFailure` | Lost a concurrent write |
//! | Database | `08xxx`, `57P01`..`57P03` | `Unavailable` | Connection lost, server shutting down |
//! | PoolTimedOut, PoolClosed, Io, Tls | N/A | `Unavailable` | Database unreachable |
//! | RowNotFound | N/A | `RowNotFound` | |
//! | Other | N/A | `Other` | |
//!
//! The display constraint lives in the schema: every record references its
//! `(event, item)` display row, so deleting a display row that has been sold
//! raises `23503`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use kiradopay_catalog::{DisplayPlan, Event, EventUpdate, Item};
use kiradopay_core::{DomainError, EventCode, ItemCode, LocalReceiptId, ReceiptId, UserId};
use kiradopay_ledger::{Receipt, Record};

use super::r#trait::{PosStore, StorageError};

/// Schema applied by [`PostgresPosStore::migrate`]. Idempotent.
pub const SCHEMA: &str = include_str!("schema.sql");

/// Postgres-backed store.
///
/// `Send + Sync` and cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PostgresPosStore {
    pool: Arc<PgPool>,
}

impl PostgresPosStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, StorageError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

#[async_trait::async_trait]
impl PosStore for PostgresPosStore {
    #[instrument(skip(self), fields(item_count = tracing::field::Empty), err)]
    async fn list_items(&self) -> Result<Vec<Item>, StorageError> {
        let rows = sqlx::query("SELECT code, name, picture FROM items ORDER BY code")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_items", e))?;

        let items = rows
            .iter()
            .map(|row| ItemRow::from_row(row).map_err(decode_error)?.try_into())
            .collect::<Result<Vec<Item>, StorageError>>()?;

        Span::current().record("item_count", items.len());
        Ok(items)
    }

    #[instrument(skip(self, item), fields(item_code = %item.code), err)]
    async fn insert_item(&self, item: Item) -> Result<Item, StorageError> {
        sqlx::query("INSERT INTO items (code, name, picture) VALUES ($1, $2, $3)")
            .bind(item.code.as_str())
            .bind(&item.name)
            .bind(&item.picture)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_item", e))?;
        Ok(item)
    }

    #[instrument(skip(self), fields(event_count = tracing::field::Empty), err)]
    async fn list_events(&self) -> Result<Vec<Event>, StorageError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;

        let rows = sqlx::query(
            r#"
            SELECT code, name, date, calculator
            FROM events
            ORDER BY date DESC, code ASC
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?;

        let display_rows = sqlx::query(
            r#"
            SELECT d.event_code, i.code, i.name, i.picture
            FROM displays d
            JOIN items i ON i.code = d.item_code
            ORDER BY d.event_code, d.position
            "#,
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_displays", e))?;

        let mut displays: HashMap<String, Vec<Item>> = HashMap::new();
        for row in &display_rows {
            let event_code: String = row.try_get("event_code").map_err(decode_error)?;
            let item: Item = ItemRow::from_row(row).map_err(decode_error)?.try_into()?;
            displays.entry(event_code).or_default().push(item);
        }

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let event_row = EventRow::from_row(row).map_err(decode_error)?;
            let items = displays.remove(&event_row.code).unwrap_or_default();
            events.push(event_row.into_event(items)?);
        }

        Span::current().record("event_count", events.len());
        Ok(events)
    }

    #[instrument(skip(self), fields(event_code = %code), err)]
    async fn get_event(&self, code: &EventCode) -> Result<Option<Event>, StorageError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        load_event(&mut conn, code, false).await
    }

    #[instrument(skip(self, event), fields(event_code = %event.code), err)]
    async fn insert_event(&self, event: Event) -> Result<Event, StorageError> {
        sqlx::query("INSERT INTO events (code, name, date, calculator) VALUES ($1, $2, $3, $4)")
            .bind(event.code.as_str())
            .bind(&event.name)
            .bind(event.date)
            .bind(event.calculator.as_deref())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;

        Ok(Event {
            items: Vec::new(),
            ..event
        })
    }

    #[instrument(
        skip(self, update),
        fields(event_code = %code, rename = update.code.is_some(), display = update.items.is_some()),
        err
    )]
    async fn update_event(&self, code: &EventCode, update: &EventUpdate) -> Result<Event, StorageError> {
        let mut tx = self.begin().await?;

        let mut event = lock_event(&mut tx, code).await?;
        event.apply_fields(update);

        sqlx::query(
            r#"
            UPDATE events
            SET code = $2, name = $3, date = $4, calculator = $5
            WHERE code = $1
            "#,
        )
        .bind(code.as_str())
        .bind(event.code.as_str())
        .bind(&event.name)
        .bind(event.date)
        .bind(event.calculator.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_event", e))?;

        if let Some(target) = update.display_target() {
            replace_display(&mut tx, &event.code, &target).await?;
        }

        let updated = load_event(&mut tx, &event.code, false)
            .await?
            .ok_or_else(|| StorageError::RowNotFound(format!("event not found: {}", event.code)))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(updated)
    }

    #[instrument(skip(self), fields(event_code = %event, receipt_count = tracing::field::Empty), err)]
    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, StorageError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;

        if load_event(&mut conn, event, false).await?.is_none() {
            return Err(StorageError::RowNotFound(format!("event not found: {event}")));
        }

        let receipt_rows = sqlx::query(
            r#"
            SELECT id, event_code, user_id, created_at, total, client_id
            FROM receipts
            WHERE event_code = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(event.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_receipts", e))?;

        let record_rows = sqlx::query(
            r#"
            SELECT r.receipt_id, r.line_index, r.item_code, r.count, r.dedication
            FROM records r
            JOIN receipts rc ON rc.id = r.receipt_id
            WHERE rc.event_code = $1
            ORDER BY r.receipt_id, r.line_index
            "#,
        )
        .bind(event.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        let mut records: HashMap<Uuid, Vec<Record>> = HashMap::new();
        for row in &record_rows {
            let record_row = RecordRow::from_row(row).map_err(decode_error)?;
            let receipt_id = record_row.receipt_id;
            records.entry(receipt_id).or_default().push(record_row.try_into()?);
        }

        let mut receipts = Vec::with_capacity(receipt_rows.len());
        for row in &receipt_rows {
            let receipt_row = ReceiptRow::from_row(row).map_err(decode_error)?;
            let lines = records.remove(&receipt_row.id).unwrap_or_default();
            receipts.push(receipt_row.into_receipt(lines)?);
        }

        Span::current().record("receipt_count", receipts.len());
        Ok(receipts)
    }

    #[instrument(skip(self, receipts), fields(event_code = %event, receipt_count = receipts.len()), err)]
    async fn insert_receipts(
        &self,
        event: &EventCode,
        receipts: Vec<Receipt>,
    ) -> Result<Vec<Receipt>, StorageError> {
        let mut tx = self.begin().await?;
        lock_event(&mut tx, event).await?;

        for receipt in &receipts {
            if &receipt.event_code != event {
                return Err(StorageError::Other(format!(
                    "receipt {} targets event {}",
                    receipt.id, receipt.event_code
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO receipts (id, event_code, user_id, created_at, total, client_id)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(receipt.id.as_uuid())
            .bind(event.as_str())
            .bind(receipt.user_id.as_str())
            .bind(receipt.created_at)
            .bind(receipt.total)
            .bind(receipt.client_id.map(Uuid::from))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_receipt", e))?;

            for record in &receipt.records {
                let line_index = i32::try_from(record.index)
                    .map_err(|_| StorageError::Other(format!("record index out of range: {}", record.index)))?;

                sqlx::query(
                    r#"
                    INSERT INTO records (receipt_id, line_index, event_code, item_code, count, dedication)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(receipt.id.as_uuid())
                .bind(line_index)
                .bind(event.as_str())
                .bind(record.item_code.as_str())
                .bind(record.count)
                .bind(record.dedication)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        StorageError::ForeignKeyViolation(format!("item not displayed: {}", record.item_code))
                    } else {
                        map_sqlx_error("insert_record", e)
                    }
                })?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(receipts)
    }

    #[instrument(skip(self, ids), fields(event_code = %event, requested = ids.len(), deleted = tracing::field::Empty), err)]
    async fn delete_receipts(&self, event: &EventCode, ids: &[ReceiptId]) -> Result<u64, StorageError> {
        let mut tx = self.begin().await?;
        lock_event(&mut tx, event).await?;

        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM receipts WHERE event_code = $1 AND id = ANY($2)")
            .bind(event.as_str())
            .bind(uuids)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_receipts", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let deleted = result.rows_affected();
        Span::current().record("deleted", deleted);
        Ok(deleted)
    }
}

/// Lock the event row for the rest of the transaction and load it.
async fn lock_event(tx: &mut Transaction<'_, Postgres>, code: &EventCode) -> Result<Event, StorageError> {
    load_event(tx, code, true)
        .await?
        .ok_or_else(|| StorageError::RowNotFound(format!("event not found: {code}")))
}

async fn load_event(
    conn: &mut PgConnection,
    code: &EventCode,
    for_update: bool,
) -> Result<Option<Event>, StorageError> {
    let sql = if for_update {
        "SELECT code, name, date, calculator FROM events WHERE code = $1 FOR UPDATE"
    } else {
        "SELECT code, name, date, calculator FROM events WHERE code = $1"
    };
    let Some(row) = sqlx::query(sql)
        .bind(code.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_event", e))?
    else {
        return Ok(None);
    };
    let event_row = EventRow::from_row(&row).map_err(decode_error)?;

    let item_rows = sqlx::query(
        r#"
        SELECT i.code, i.name, i.picture
        FROM displays d
        JOIN items i ON i.code = d.item_code
        WHERE d.event_code = $1
        ORDER BY d.position
        "#,
    )
    .bind(code.as_str())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_display", e))?;

    let items = item_rows
        .iter()
        .map(|row| ItemRow::from_row(row).map_err(decode_error)?.try_into())
        .collect::<Result<Vec<Item>, StorageError>>()?;

    event_row.into_event(items).map(Some)
}

/// Move the display of a locked event to `target`.
///
/// Additions go first so an unknown item fails before anything is removed;
/// the whole transaction is discarded on any failure either way.
async fn replace_display(
    tx: &mut Transaction<'_, Postgres>,
    event: &EventCode,
    target: &[ItemCode],
) -> Result<(), StorageError> {
    let rows = sqlx::query("SELECT item_code, position FROM displays WHERE event_code = $1 ORDER BY position")
        .bind(event.as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_display", e))?;

    let mut current = Vec::with_capacity(rows.len());
    let mut next_position = 0i32;
    for row in &rows {
        let code: String = row.try_get("item_code").map_err(decode_error)?;
        let position: i32 = row.try_get("position").map_err(decode_error)?;
        current.push(parse_code(&code)?);
        next_position = next_position.max(position + 1);
    }

    let plan = DisplayPlan::between(&current, target);
    if plan.is_noop() {
        return Ok(());
    }

    for code in &plan.to_add {
        sqlx::query("INSERT INTO displays (event_code, item_code, position) VALUES ($1, $2, $3)")
            .bind(event.as_str())
            .bind(code.as_str())
            .bind(next_position)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::ForeignKeyViolation(format!("item not in catalog: {code}"))
                } else {
                    map_sqlx_error("insert_display", e)
                }
            })?;
        next_position += 1;
    }

    for code in &plan.to_remove {
        sqlx::query("DELETE FROM displays WHERE event_code = $1 AND item_code = $2")
            .bind(event.as_str())
            .bind(code.as_str())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::ForeignKeyViolation(format!("item already sold: {code}"))
                } else {
                    map_sqlx_error("delete_display", e)
                }
            })?;
    }

    Ok(())
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code() {
                Some(code) => StorageError::from_sqlstate(code.as_ref(), msg),
                None => StorageError::Other(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StorageError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StorageError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Io(e) => StorageError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StorageError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::RowNotFound => StorageError::RowNotFound(format!("no row in {operation}")),
        other => StorageError::Other(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23503";
        }
    }
    false
}

fn decode_error(err: sqlx::Error) -> StorageError {
    StorageError::Other(format!("failed to decode row: {err}"))
}

fn parse_code<T: FromStr<Err = DomainError>>(value: &str) -> Result<T, StorageError> {
    value
        .parse()
        .map_err(|e| StorageError::Other(format!("stored code is invalid: {e}")))
}

// SQLx row types

#[derive(Debug)]
struct ItemRow {
    code: String,
    name: String,
    picture: String,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            picture: row.try_get("picture")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = StorageError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            code: parse_code(&row.code)?,
            name: row.name,
            picture: row.picture,
        })
    }
}

#[derive(Debug)]
struct EventRow {
    code: String,
    name: String,
    date: NaiveDate,
    calculator: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            date: row.try_get("date")?,
            calculator: row.try_get("calculator")?,
        })
    }
}

impl EventRow {
    fn into_event(self, items: Vec<Item>) -> Result<Event, StorageError> {
        Ok(Event {
            code: parse_code(&self.code)?,
            name: self.name,
            date: self.date,
            calculator: self.calculator,
            items,
        })
    }
}

#[derive(Debug)]
struct ReceiptRow {
    id: Uuid,
    event_code: String,
    user_id: String,
    created_at: DateTime<Utc>,
    total: i64,
    client_id: Option<Uuid>,
}

impl<'r> FromRow<'r, PgRow> for ReceiptRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReceiptRow {
            id: row.try_get("id")?,
            event_code: row.try_get("event_code")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            total: row.try_get("total")?,
            client_id: row.try_get("client_id")?,
        })
    }
}

impl ReceiptRow {
    fn into_receipt(self, records: Vec<Record>) -> Result<Receipt, StorageError> {
        Ok(Receipt {
            id: ReceiptId::from_uuid(self.id),
            event_code: parse_code(&self.event_code)?,
            user_id: UserId::new(self.user_id),
            created_at: self.created_at,
            total: self.total,
            client_id: self.client_id.map(LocalReceiptId::from_uuid),
            records,
        })
    }
}

#[derive(Debug)]
struct RecordRow {
    receipt_id: Uuid,
    line_index: i32,
    item_code: String,
    count: i64,
    dedication: bool,
}

impl<'r> FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RecordRow {
            receipt_id: row.try_get("receipt_id")?,
            line_index: row.try_get("line_index")?,
            item_code: row.try_get("item_code")?,
            count: row.try_get("count")?,
            dedication: row.try_get("dedication")?,
        })
    }
}

impl TryFrom<RecordRow> for Record {
    type Error = StorageError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let index = u32::try_from(row.line_index)
            .map_err(|_| StorageError::Other(format!("negative record index: {}", row.line_index)))?;
        Ok(Record {
            item_code: parse_code(&row.item_code)?,
            count: row.count,
            dedication: row.dedication,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_are_unavailable() {
        assert!(matches!(
            map_sqlx_error("list_items", sqlx::Error::PoolTimedOut),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("list_items", sqlx::Error::PoolClosed),
            StorageError::Unavailable(_)
        ));
    }

    #[test]
    fn row_not_found_keeps_its_meaning() {
        assert!(matches!(
            map_sqlx_error("load_event", sqlx::Error::RowNotFound),
            StorageError::RowNotFound(_)
        ));
    }

    #[test]
    fn schema_declares_display_reference_from_records() {
        assert!(SCHEMA.contains("REFERENCES displays (event_code, item_code)"));
        assert!(SCHEMA.contains("UNIQUE (event_code, client_id)"));
    }
}
