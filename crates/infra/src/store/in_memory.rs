use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;

use kiradopay_catalog::{DisplayPlan, Event, EventUpdate, Item};
use kiradopay_core::{EventCode, ItemCode, ReceiptId};
use kiradopay_ledger::Receipt;

use super::r#trait::{PosStore, StorageError};

#[derive(Debug, Clone)]
struct EventRow {
    name: String,
    date: NaiveDate,
    calculator: Option<String>,
    display: Vec<ItemCode>,
}

#[derive(Debug, Default)]
struct Tables {
    items: BTreeMap<ItemCode, Item>,
    events: BTreeMap<EventCode, EventRow>,
    receipts: Vec<Receipt>,
}

impl Tables {
    fn event(&self, code: &EventCode) -> Result<&EventRow, StorageError> {
        self.events
            .get(code)
            .ok_or_else(|| StorageError::RowNotFound(format!("event not found: {code}")))
    }

    fn materialize(&self, code: &EventCode, row: &EventRow) -> Event {
        Event {
            code: code.clone(),
            name: row.name.clone(),
            date: row.date,
            calculator: row.calculator.clone(),
            items: row
                .display
                .iter()
                .filter_map(|item| self.items.get(item).cloned())
                .collect(),
        }
    }

    fn receipts_of<'a>(&'a self, event: &'a EventCode) -> impl Iterator<Item = &'a Receipt> + 'a {
        self.receipts.iter().filter(move |r| &r.event_code == event)
    }
}

/// In-memory store with the same constraint behavior as the Postgres store.
///
/// Intended for tests/dev. Every write checks all constraints before touching
/// the tables, so a failed call leaves no partial state.
#[derive(Debug, Default)]
pub struct InMemoryPosStore {
    tables: RwLock<Tables>,
}

impl InMemoryPosStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StorageError> {
        self.tables
            .read()
            .map_err(|_| StorageError::Other("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StorageError> {
        self.tables
            .write()
            .map_err(|_| StorageError::Other("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl PosStore for InMemoryPosStore {
    async fn list_items(&self) -> Result<Vec<Item>, StorageError> {
        Ok(self.read()?.items.values().cloned().collect())
    }

    async fn insert_item(&self, item: Item) -> Result<Item, StorageError> {
        let mut tables = self.write()?;
        if tables.items.contains_key(&item.code) {
            return Err(StorageError::UniqueViolation(format!(
                "item code already exists: {}",
                item.code
            )));
        }
        tables.items.insert(item.code.clone(), item.clone());
        Ok(item)
    }

    async fn list_events(&self) -> Result<Vec<Event>, StorageError> {
        let tables = self.read()?;
        let mut events: Vec<Event> = tables
            .events
            .iter()
            .map(|(code, row)| tables.materialize(code, row))
            .collect();
        events.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.code.cmp(&b.code)));
        Ok(events)
    }

    async fn get_event(&self, code: &EventCode) -> Result<Option<Event>, StorageError> {
        let tables = self.read()?;
        Ok(tables
            .events
            .get(code)
            .map(|row| tables.materialize(code, row)))
    }

    async fn insert_event(&self, event: Event) -> Result<Event, StorageError> {
        let mut tables = self.write()?;
        if tables.events.contains_key(&event.code) {
            return Err(StorageError::UniqueViolation(format!(
                "event code already exists: {}",
                event.code
            )));
        }
        let row = EventRow {
            name: event.name,
            date: event.date,
            calculator: event.calculator,
            display: Vec::new(),
        };
        let created = tables.materialize(&event.code, &row);
        tables.events.insert(event.code, row);
        Ok(created)
    }

    async fn update_event(&self, code: &EventCode, update: &EventUpdate) -> Result<Event, StorageError> {
        let mut tables = self.write()?;
        let mut row = tables.event(code)?.clone();

        let new_code = update.code.clone().unwrap_or_else(|| code.clone());
        if &new_code != code && tables.events.contains_key(&new_code) {
            return Err(StorageError::UniqueViolation(format!(
                "event code already exists: {new_code}"
            )));
        }

        if let Some(target) = update.display_target() {
            let plan = DisplayPlan::between(&row.display, &target);
            if let Some(missing) = plan.to_add.iter().find(|c| !tables.items.contains_key(*c)) {
                return Err(StorageError::ForeignKeyViolation(format!(
                    "item not in catalog: {missing}"
                )));
            }
            if let Some(sold) = plan
                .to_remove
                .iter()
                .find(|c| tables.receipts_of(code).any(|r| r.sells(c)))
            {
                return Err(StorageError::ForeignKeyViolation(format!(
                    "item already sold: {sold}"
                )));
            }
            row.display = plan.apply(&row.display);
        }

        if let Some(name) = &update.name {
            row.name = name.clone();
        }
        if let Some(date) = update.date {
            row.date = date;
        }
        if let Some(calculator) = update.calculator_change() {
            row.calculator = calculator;
        }

        if &new_code != code {
            tables.events.remove(code);
            for receipt in tables.receipts.iter_mut().filter(|r| &r.event_code == code) {
                receipt.event_code = new_code.clone();
            }
        }
        let updated = tables.materialize(&new_code, &row);
        tables.events.insert(new_code, row);
        Ok(updated)
    }

    async fn list_receipts(&self, event: &EventCode) -> Result<Vec<Receipt>, StorageError> {
        let tables = self.read()?;
        tables.event(event)?;

        let mut receipts: Vec<Receipt> = tables.receipts_of(event).cloned().collect();
        receipts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        for receipt in &mut receipts {
            receipt.records.sort_by_key(|r| r.index);
        }
        Ok(receipts)
    }

    async fn insert_receipts(
        &self,
        event: &EventCode,
        receipts: Vec<Receipt>,
    ) -> Result<Vec<Receipt>, StorageError> {
        let mut tables = self.write()?;
        let row = tables.event(event)?;

        let mut client_ids: HashSet<_> = tables
            .receipts_of(event)
            .filter_map(|r| r.client_id)
            .collect();
        let mut ids: HashSet<ReceiptId> = tables.receipts.iter().map(|r| r.id).collect();

        for receipt in &receipts {
            if &receipt.event_code != event {
                return Err(StorageError::Other(format!(
                    "receipt {} targets event {}",
                    receipt.id, receipt.event_code
                )));
            }
            if !ids.insert(receipt.id) {
                return Err(StorageError::UniqueViolation(format!(
                    "receipt id already exists: {}",
                    receipt.id
                )));
            }
            if let Some(client_id) = receipt.client_id {
                if !client_ids.insert(client_id) {
                    return Err(StorageError::UniqueViolation(format!(
                        "client id already submitted: {client_id}"
                    )));
                }
            }
            if let Some(record) = receipt
                .records
                .iter()
                .find(|r| !row.display.contains(&r.item_code))
            {
                return Err(StorageError::ForeignKeyViolation(format!(
                    "item not displayed: {}",
                    record.item_code
                )));
            }
        }

        tables.receipts.extend(receipts.iter().cloned());
        Ok(receipts)
    }

    async fn delete_receipts(&self, event: &EventCode, ids: &[ReceiptId]) -> Result<u64, StorageError> {
        let mut tables = self.write()?;
        tables.event(event)?;

        let targets: HashSet<&ReceiptId> = ids.iter().collect();
        let before = tables.receipts.len();
        tables
            .receipts
            .retain(|r| !(&r.event_code == event && targets.contains(&r.id)));
        Ok((before - tables.receipts.len()) as u64)
    }
}
