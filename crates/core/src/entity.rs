//! Stable identity of stored records.

/// A record with an identity that outlives changes to its other fields.
///
/// Items and events are identified by their code, receipts by their id. An
/// event rename is the one identity change; stores carry it through to the
/// event's display rows and receipts.
pub trait Entity {
    type Id: Clone + Eq + Ord + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}
