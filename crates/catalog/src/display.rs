//! Display policy: which items an event sells.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use kiradopay_core::{DomainError, ItemCode};

/// The change needed to move an event's display from one set to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPlan {
    /// Codes in the target but not currently displayed, in target order.
    pub to_add: Vec<ItemCode>,
    /// Codes currently displayed but not in the target, in display order.
    pub to_remove: Vec<ItemCode>,
}

impl DisplayPlan {
    pub fn between(current: &[ItemCode], target: &[ItemCode]) -> Self {
        let current_set: HashSet<&ItemCode> = current.iter().collect();
        let target_set: HashSet<&ItemCode> = target.iter().collect();

        let mut seen = HashSet::new();
        let to_add = target
            .iter()
            .filter(|code| !current_set.contains(code) && seen.insert(*code))
            .cloned()
            .collect();
        let to_remove = current
            .iter()
            .filter(|code| !target_set.contains(code))
            .cloned()
            .collect();

        Self { to_add, to_remove }
    }

    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Fail if any code slated for removal has been sold at this event.
    pub fn ensure_removable(&self, is_sold: impl Fn(&ItemCode) -> bool) -> Result<(), DomainError> {
        match self.to_remove.iter().find(|code| is_sold(*code)) {
            Some(code) => Err(DomainError::conflict(format!("item already sold: {code}"))),
            None => Ok(()),
        }
    }

    /// The resulting display: kept items in their current order, then additions.
    pub fn apply(&self, current: &[ItemCode]) -> Vec<ItemCode> {
        current
            .iter()
            .filter(|code| !self.to_remove.contains(*code))
            .chain(self.to_add.iter())
            .cloned()
            .collect()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn code_set() -> impl Strategy<Value = Vec<ItemCode>> {
        proptest::collection::btree_set("[A-F]", 0..6).prop_map(|set| {
            set.into_iter()
                .map(|c| ItemCode::parse(c).unwrap())
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        /// Applying a plan reaches the target set, and planning again from there is a no-op.
        #[test]
        fn plan_reaches_target_and_is_idempotent(current in code_set(), target in code_set()) {
            let plan = DisplayPlan::between(&current, &target);
            let next = plan.apply(&current);

            let next_set: HashSet<_> = next.iter().collect();
            let target_set: HashSet<_> = target.iter().collect();
            prop_assert_eq!(next_set, target_set);
            prop_assert!(DisplayPlan::between(&next, &target).is_noop());
        }
    }
}
