//! Combined view of confirmed and buffered receipts.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kiradopay_core::{ItemCode, LocalReceiptId, ReceiptId};
use kiradopay_ledger::{Receipt, RecordInput};

use crate::buffer::BufferedReceipt;

/// One logical receipt and whether the server holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedReceipt {
    /// Server identifier; `None` while only buffered.
    pub id: Option<ReceiptId>,
    pub local_id: Option<LocalReceiptId>,
    pub created_at: DateTime<Utc>,
    pub total: i64,
    pub records: Vec<RecordInput>,
    pub on_server: bool,
}

impl FlaggedReceipt {
    pub fn confirmed(receipt: &Receipt) -> Self {
        Self {
            id: Some(receipt.id),
            local_id: receipt.client_id,
            created_at: receipt.created_at,
            total: receipt.total,
            records: receipt
                .records
                .iter()
                .map(|r| RecordInput {
                    item_code: r.item_code.clone(),
                    count: r.count,
                    dedication: r.dedication,
                })
                .collect(),
            on_server: true,
        }
    }

    pub fn pending(entry: &BufferedReceipt) -> Self {
        Self {
            id: None,
            local_id: Some(entry.local_id),
            created_at: entry.created_at,
            total: entry.input.total,
            records: entry.input.records.clone(),
            on_server: false,
        }
    }

    /// Sold count per item, for one row of a receipt table.
    pub fn item_counts(&self) -> BTreeMap<ItemCode, i64> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.item_code.clone()).or_insert(0) += record.count;
        }
        counts
    }
}

/// Local entries the server already holds (matched on `client_id`).
pub fn confirmed_local_ids(server: &[Receipt], local: &[BufferedReceipt]) -> Vec<LocalReceiptId> {
    let on_server: HashSet<LocalReceiptId> = server.iter().filter_map(|r| r.client_id).collect();
    local
        .iter()
        .map(|e| e.local_id)
        .filter(|id| on_server.contains(id))
        .collect()
}

/// Present each logical receipt exactly once.
///
/// Server receipts come first in the order given, followed by buffered
/// entries the server does not hold yet, in buffer order.
pub fn merge(server: &[Receipt], local: &[BufferedReceipt]) -> Vec<FlaggedReceipt> {
    let on_server: HashSet<LocalReceiptId> = server.iter().filter_map(|r| r.client_id).collect();

    server
        .iter()
        .map(FlaggedReceipt::confirmed)
        .chain(
            local
                .iter()
                .filter(|e| !on_server.contains(&e.local_id))
                .map(FlaggedReceipt::pending),
        )
        .collect()
}
