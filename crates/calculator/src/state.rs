use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use kiradopay_core::ItemCode;

use crate::eval::Value;

/// Per-item input to a calculator: how many were sold and whether the sale
/// was a dedication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordState {
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedication: Option<bool>,
}

impl RecordState {
    pub fn new(count: i64) -> Self {
        Self {
            count,
            dedication: None,
        }
    }

    pub fn with_dedication(mut self, dedication: bool) -> Self {
        self.dedication = Some(dedication);
        self
    }
}

/// The in-progress sale as seen by a calculator: item code -> [`RecordState`].
///
/// Serializes as a plain JSON object, the shape calculators read via `state`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalculatorState(BTreeMap<ItemCode, RecordState>);

impl CalculatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: ItemCode, state: RecordState) -> Option<RecordState> {
        self.0.insert(item, state)
    }

    pub fn get(&self, item: &ItemCode) -> Option<&RecordState> {
        self.0.get(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemCode, &RecordState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn to_value(&self) -> Value {
        let entries = self
            .0
            .iter()
            .map(|(code, record)| {
                let mut fields = BTreeMap::new();
                fields.insert("count".to_string(), Value::Number(record.count as f64));
                if let Some(dedication) = record.dedication {
                    fields.insert("dedication".to_string(), Value::Bool(dedication));
                }
                (code.as_str().to_string(), Value::Object(Rc::new(fields)))
            })
            .collect();
        Value::Object(Rc::new(entries))
    }
}

impl FromIterator<(ItemCode, RecordState)> for CalculatorState {
    fn from_iter<I: IntoIterator<Item = (ItemCode, RecordState)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
