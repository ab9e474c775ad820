//! Catalog and event service: items, events and the display policy.

use tracing::{error, info, warn};

use kiradopay_catalog::{Event, EventUpdate, Item, NewEvent, NewItem};
use kiradopay_core::{DomainError, DomainResult, ErrorClass, EventCode, ItemCode};

use crate::store::{PosStore, StorageError};

#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: PosStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn list_items(&self) -> DomainResult<Vec<Item>> {
        self.store
            .list_items()
            .await
            .map_err(|e| lift(e, "list_items"))
    }

    pub async fn create_item(&self, input: NewItem) -> DomainResult<Item> {
        let item = input.into_item()?;
        let created = self
            .store
            .insert_item(item)
            .await
            .map_err(|e| lift(e, "create_item"))?;
        info!(item_code = %created.code, "item created");
        Ok(created)
    }

    /// Events ordered by date (newest first), then code.
    pub async fn list_events(&self) -> DomainResult<Vec<Event>> {
        self.store
            .list_events()
            .await
            .map_err(|e| lift(e, "list_events"))
    }

    pub async fn get_event(&self, code: &EventCode) -> DomainResult<Event> {
        self.store
            .get_event(code)
            .await
            .map_err(|e| lift(e, "get_event"))?
            .ok_or_else(|| DomainError::not_found(format!("event not found: {code}")))
    }

    pub async fn create_event(&self, input: NewEvent) -> DomainResult<Event> {
        let event = input.into_event()?;
        let created = self
            .store
            .insert_event(event)
            .await
            .map_err(|e| lift(e, "create_event"))?;
        info!(event_code = %created.code, "event created");
        Ok(created)
    }

    /// Apply a partial update in one atomic step.
    ///
    /// Every provided field is validated first; a calculator that does not
    /// compile writes nothing. Removing an item already sold at this event
    /// fails with `Conflict` and leaves the event unchanged.
    pub async fn update_event(&self, code: &EventCode, update: EventUpdate) -> DomainResult<Event> {
        update.validate()?;
        if update.is_empty() {
            return self.get_event(code).await;
        }

        let updated = self
            .store
            .update_event(code, &update)
            .await
            .map_err(|e| lift(e, "update_event"))?;

        info!(
            event_code = %code,
            new_code = %updated.code,
            displayed = updated.items.len(),
            "event updated"
        );
        Ok(updated)
    }

    /// Replace the display set of an event. Idempotent.
    pub async fn set_display(&self, code: &EventCode, items: Vec<ItemCode>) -> DomainResult<Event> {
        self.update_event(
            code,
            EventUpdate {
                items: Some(items),
                ..EventUpdate::default()
            },
        )
        .await
    }
}

fn lift(err: StorageError, operation: &str) -> DomainError {
    let class = err.classify();
    let message = match &err {
        StorageError::UniqueViolation(_) => "code already in use".to_string(),
        other => other.message().to_string(),
    };

    match class {
        ErrorClass::Unknown => error!(operation, error = %err, "storage failure"),
        ErrorClass::Conflict | ErrorClass::Transient => {
            warn!(operation, class = %class, error = %err, "catalog write rejected")
        }
        ErrorClass::NotFound => {}
    }

    DomainError::from_class(class, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::store::InMemoryPosStore;

    fn new_event(code: &str) -> NewEvent {
        NewEvent {
            code: EventCode::parse(code).unwrap(),
            name: "Expo".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 11, 3).unwrap(),
            calculator: None,
        }
    }

    #[tokio::test]
    async fn duplicate_event_code_reports_code_in_use() {
        let service = CatalogService::new(InMemoryPosStore::new());
        service.create_event(new_event("EXPO24")).await.unwrap();

        let err = service.create_event(new_event("EXPO24")).await.unwrap_err();
        match err {
            DomainError::Conflict(msg) => assert_eq!(msg, "code already in use"),
            other => panic!("Expected Conflict error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_calculator_writes_nothing() {
        let service = CatalogService::new(InMemoryPosStore::new());
        let code = service.create_event(new_event("EXPO24")).await.unwrap().code;

        let update = EventUpdate {
            name: Some("Renamed".to_string()),
            calculator: Some("return window.fetch;".to_string()),
            ..EventUpdate::default()
        };
        assert!(matches!(
            service.update_event(&code, update).await,
            Err(DomainError::Validation(_))
        ));
        assert_eq!(service.get_event(&code).await.unwrap().name, "Expo");
    }

    #[tokio::test]
    async fn adding_unknown_item_conflicts() {
        let service = CatalogService::new(InMemoryPosStore::new());
        let code = service.create_event(new_event("EXPO24")).await.unwrap().code;

        let err = service
            .set_display(&code, vec![ItemCode::parse("GHOST").unwrap()])
            .await
            .unwrap_err();
        match err {
            DomainError::Conflict(msg) => assert_eq!(msg, "item not in catalog: GHOST"),
            other => panic!("Expected Conflict error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let service = CatalogService::new(InMemoryPosStore::new());
        let code = EventCode::parse("NOPE").unwrap();

        assert!(matches!(service.get_event(&code).await, Err(DomainError::NotFound(_))));
        assert!(matches!(
            service.set_display(&code, vec![]).await,
            Err(DomainError::NotFound(_))
        ));
    }
}
