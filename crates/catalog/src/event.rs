use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kiradopay_calculator::{Calculator, CompileError};
use kiradopay_core::{DomainError, Entity, EventCode, ItemCode};

use crate::item::{validate_name, Item};

/// An event (a sales booth on a given date) and the items it currently displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub code: EventCode,
    pub name: String,
    pub date: NaiveDate,
    /// Body of the pricing function; `None` prices every sale at zero.
    #[serde(default)]
    pub calculator: Option<String>,
    /// Displayed items, in display order.
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Event {
    /// Compile this event's pricing function.
    pub fn calculator(&self) -> Result<Calculator, CompileError> {
        Calculator::from_optional(self.calculator.as_deref())
    }

    pub fn displays(&self, item: &ItemCode) -> bool {
        self.items.iter().any(|i| &i.code == item)
    }

    pub fn item_codes(&self) -> Vec<ItemCode> {
        self.items.iter().map(|i| i.code.clone()).collect()
    }

    /// Apply the scalar fields of an update (everything except the display set).
    ///
    /// The update must already be validated.
    pub fn apply_fields(&mut self, update: &EventUpdate) {
        if let Some(code) = &update.code {
            self.code = code.clone();
        }
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(date) = update.date {
            self.date = date;
        }
        if let Some(calculator) = update.calculator_change() {
            self.calculator = calculator;
        }
    }
}

impl Entity for Event {
    type Id = EventCode;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

/// Blank calculator source is stored as "no calculator".
fn normalize_calculator(source: Option<&str>) -> Option<String> {
    source
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn validate_calculator(source: Option<&str>) -> Result<(), DomainError> {
    Calculator::from_optional(source)?;
    Ok(())
}

/// Input for creating an event. New events display no items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub code: EventCode,
    pub name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub calculator: Option<String>,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_name("event", &self.name)?;
        validate_calculator(self.calculator.as_deref())
    }

    pub fn into_event(self) -> Result<Event, DomainError> {
        self.validate()?;
        Ok(Event {
            code: self.code,
            name: self.name,
            date: self.date,
            calculator: normalize_calculator(self.calculator.as_deref()),
            items: Vec::new(),
        })
    }
}

/// Partial update of an event. Absent fields are left unchanged.
///
/// `calculator: Some("")` clears the calculator; `items` replaces the display set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<EventCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemCode>>,
}

impl EventUpdate {
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.name.is_none()
            && self.date.is_none()
            && self.calculator.is_none()
            && self.items.is_none()
    }

    /// Checks every provided field; nothing may be written if this fails.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            validate_name("event", name)?;
        }
        validate_calculator(self.calculator.as_deref())
    }

    /// `None`: leave unchanged. `Some(None)`: clear. `Some(Some(src))`: replace.
    pub fn calculator_change(&self) -> Option<Option<String>> {
        self.calculator
            .as_deref()
            .map(|source| normalize_calculator(Some(source)))
    }

    /// The target display set with duplicates removed (first occurrence wins).
    pub fn display_target(&self) -> Option<Vec<ItemCode>> {
        self.items.as_ref().map(|items| {
            let mut seen = std::collections::HashSet::new();
            items
                .iter()
                .filter(|code| seen.insert((*code).clone()))
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expo() -> NewEvent {
        NewEvent {
            code: EventCode::parse("EXPO24").unwrap(),
            name: "Expo 2024".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
            calculator: None,
        }
    }

    #[test]
    fn new_event_without_calculator_prices_at_zero() {
        let event = expo().into_event().unwrap();
        assert!(event.items.is_empty());
        assert!(event.calculator().unwrap().is_zero());
    }

    #[test]
    fn new_event_rejects_invalid_calculator() {
        let mut input = expo();
        input.calculator = Some("return (".to_string());
        let err = input.into_event().unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("invalid calculator")),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn blank_calculator_is_stored_as_none() {
        let mut input = expo();
        input.calculator = Some("  ".to_string());
        assert_eq!(input.into_event().unwrap().calculator, None);
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut event = expo().into_event().unwrap();
        let update = EventUpdate {
            name: Some("Expo".to_string()),
            calculator: Some("return 100;".to_string()),
            ..EventUpdate::default()
        };
        update.validate().unwrap();
        event.apply_fields(&update);

        assert_eq!(event.name, "Expo");
        assert_eq!(event.code.as_str(), "EXPO24");
        assert_eq!(event.calculator.as_deref(), Some("return 100;"));

        let clear = EventUpdate {
            calculator: Some(String::new()),
            ..EventUpdate::default()
        };
        assert_eq!(clear.calculator_change(), Some(None));
        event.apply_fields(&clear);
        assert_eq!(event.calculator, None);
    }

    #[test]
    fn update_rejects_unknown_identifiers_in_calculator() {
        let update = EventUpdate {
            calculator: Some("return fetch;".to_string()),
            ..EventUpdate::default()
        };
        assert!(matches!(update.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn display_target_drops_duplicates() {
        let a = ItemCode::parse("A").unwrap();
        let b = ItemCode::parse("B").unwrap();
        let update = EventUpdate {
            items: Some(vec![b.clone(), a.clone(), b.clone()]),
            ..EventUpdate::default()
        };
        assert_eq!(update.display_target(), Some(vec![b, a]));
    }

    #[test]
    fn partial_update_deserializes_from_sparse_json() {
        let update: EventUpdate = serde_json::from_str(r#"{"items":["A"]}"#).unwrap();
        assert!(update.name.is_none());
        assert_eq!(update.items.as_ref().map(Vec::len), Some(1));
        assert!(!update.is_empty());
        assert!(EventUpdate::default().is_empty());
    }
}
