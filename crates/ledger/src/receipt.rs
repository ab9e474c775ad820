use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kiradopay_calculator::{CalculatorState, RecordState};
use kiradopay_core::{DomainError, Entity, EventCode, ItemCode, LocalReceiptId, ReceiptId, UserId};

/// Upper bound on lines in a single receipt.
pub const MAX_RECORDS_PER_RECEIPT: usize = 1000;

/// One line of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub item_code: ItemCode,
    pub count: i64,
    #[serde(default)]
    pub dedication: bool,
    /// Zero-based position in the submitted line list.
    pub index: u32,
}

/// A confirmed sale. Immutable once created; only deletion is possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub event_code: EventCode,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Total in the smallest currency unit.
    pub total: i64,
    /// Identifier the submitting client assigned, if the receipt was buffered offline.
    #[serde(default)]
    pub client_id: Option<LocalReceiptId>,
    /// Ordered by `index`.
    pub records: Vec<Record>,
}

impl Entity for Receipt {
    type Id = ReceiptId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Receipt {
    /// Rebuild the calculator input this receipt was priced from.
    pub fn calculator_state(&self) -> CalculatorState {
        self.records
            .iter()
            .map(|r| (r.item_code.clone(), record_state(r.count, r.dedication)))
            .collect()
    }

    /// Sold count per item.
    pub fn item_counts(&self) -> BTreeMap<ItemCode, i64> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.item_code.clone()).or_insert(0) += record.count;
        }
        counts
    }

    pub fn sells(&self, item: &ItemCode) -> bool {
        self.records.iter().any(|r| &r.item_code == item)
    }
}

fn record_state(count: i64, dedication: bool) -> RecordState {
    let state = RecordState::new(count);
    if dedication {
        state.with_dedication(true)
    } else {
        state
    }
}

/// A line as submitted by a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInput {
    pub item_code: ItemCode,
    pub count: i64,
    #[serde(default)]
    pub dedication: bool,
}

/// A receipt as submitted by a register, before the server stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptInput {
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<LocalReceiptId>,
    pub records: Vec<RecordInput>,
}

impl ReceiptInput {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.records.is_empty() {
            return Err(DomainError::validation("receipt must contain at least one record"));
        }
        if self.records.len() > MAX_RECORDS_PER_RECEIPT {
            return Err(DomainError::validation(format!(
                "receipt must contain at most {MAX_RECORDS_PER_RECEIPT} records"
            )));
        }

        let mut seen = HashSet::new();
        for record in &self.records {
            if record.count <= 0 {
                return Err(DomainError::validation(format!(
                    "count for item {} must be positive",
                    record.item_code
                )));
            }
            if !seen.insert(&record.item_code) {
                return Err(DomainError::validation(format!(
                    "item {} appears more than once",
                    record.item_code
                )));
            }
        }
        Ok(())
    }

    pub fn item_codes(&self) -> impl Iterator<Item = &ItemCode> {
        self.records.iter().map(|r| &r.item_code)
    }

    pub fn calculator_state(&self) -> CalculatorState {
        self.records
            .iter()
            .map(|r| (r.item_code.clone(), record_state(r.count, r.dedication)))
            .collect()
    }

    /// Stamp a validated input into a receipt, indexing records in submission order.
    pub fn into_receipt(
        self,
        id: ReceiptId,
        event_code: EventCode,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Receipt, DomainError> {
        self.validate()?;

        let records = self
            .records
            .into_iter()
            .enumerate()
            .map(|(index, r)| {
                let index = u32::try_from(index)
                    .map_err(|_| DomainError::validation("too many records"))?;
                Ok(Record {
                    item_code: r.item_code,
                    count: r.count,
                    dedication: r.dedication,
                    index,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(Receipt {
            id,
            event_code,
            user_id,
            created_at,
            total: self.total,
            client_id: self.client_id,
            records,
        })
    }
}

/// Validate a whole batch before anything is written.
///
/// Client ids must also be unique within the batch.
pub fn validate_batch(inputs: &[ReceiptInput]) -> Result<(), DomainError> {
    let mut client_ids = HashSet::new();
    for input in inputs {
        input.validate()?;
        if let Some(client_id) = input.client_id {
            if !client_ids.insert(client_id) {
                return Err(DomainError::validation(format!(
                    "client id {client_id} appears more than once in batch"
                )));
            }
        }
    }
    Ok(())
}
