use serde::{Deserialize, Serialize};

use kiradopay_core::{DomainError, Entity, ItemCode};

/// Maximum length (in characters) of a display name.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum length of an item picture reference (URL or path).
pub const MAX_PICTURE_LEN: usize = 2048;

/// Validate a human-readable name (event or item).
pub fn validate_name(kind: &str, name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation(format!("{kind} name cannot be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{kind} name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// A catalog item. Catalog-wide; events choose which items they display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub code: ItemCode,
    pub name: String,
    pub picture: String,
}

impl Entity for Item {
    type Id = ItemCode;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

/// Input for creating a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub code: ItemCode,
    pub name: String,
    #[serde(default)]
    pub picture: String,
}

impl NewItem {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_name("item", &self.name)?;
        if self.picture.len() > MAX_PICTURE_LEN {
            return Err(DomainError::validation(format!(
                "item picture must be at most {MAX_PICTURE_LEN} bytes"
            )));
        }
        Ok(())
    }

    pub fn into_item(self) -> Result<Item, DomainError> {
        self.validate()?;
        Ok(Item {
            code: self.code,
            name: self.name,
            picture: self.picture,
        })
    }
}
