//! Catalog domain module.
//!
//! Items, events and the display policy that decides which items an event
//! sells, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage).

pub mod display;
pub mod event;
pub mod item;

pub use display::DisplayPlan;
pub use event::{Event, EventUpdate, NewEvent};
pub use item::{validate_name, Item, NewItem, MAX_NAME_LEN};
