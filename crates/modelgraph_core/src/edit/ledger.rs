//! Per-record edit sets.
//!
//! # Invariants
//! - A side is listed once per record, in first-touch order.
//! - Entries are dropped by rollback, commit and unload.

use crate::graph::state::SideKey;
use crate::model::record::RecordLid;
use std::collections::HashMap;

/// Sides touched by one record's uncommitted edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditSet {
    sides: Vec<SideKey>,
}

impl EditSet {
    pub fn sides(&self) -> &[SideKey] {
        &self.sides
    }

    pub fn is_empty(&self) -> bool {
        self.sides.is_empty()
    }

    fn touch(&mut self, side: &SideKey) {
        if !self.sides.contains(side) {
            self.sides.push(side.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct EditLedger {
    entries: HashMap<RecordLid, EditSet>,
}

impl EditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sides` under the record that initiated the edit.
    pub(crate) fn touch<'a>(
        &mut self,
        initiator: RecordLid,
        sides: impl IntoIterator<Item = &'a SideKey>,
    ) {
        let mut sides = sides.into_iter().peekable();
        if sides.peek().is_none() {
            return;
        }
        let entry = self.entries.entry(initiator).or_default();
        for side in sides {
            entry.touch(side);
        }
    }

    pub fn get(&self, record: RecordLid) -> Option<&EditSet> {
        self.entries.get(&record)
    }

    pub(crate) fn take(&mut self, record: RecordLid) -> EditSet {
        self.entries.remove(&record).unwrap_or_default()
    }

    /// Drops the record's entry and every mention of its sides elsewhere.
    pub(crate) fn forget(&mut self, record: RecordLid) {
        self.entries.remove(&record);
        for entry in self.entries.values_mut() {
            entry.sides.retain(|side| side.record != record);
        }
        self.entries.retain(|_, entry| !entry.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::EditLedger;
    use crate::graph::state::SideKey;
    use uuid::Uuid;

    #[test]
    fn touch_keeps_first_order_without_duplicates() {
        let mut ledger = EditLedger::new();
        let owner = Uuid::new_v4();
        let own = SideKey::new(owner, "job");
        let other = SideKey::new(Uuid::new_v4(), "user");

        ledger.touch(owner, [&own, &other]);
        ledger.touch(owner, [&own]);
        assert_eq!(
            ledger.get(owner).map(|set| set.sides().to_vec()),
            Some(vec![own.clone(), other.clone()])
        );

        ledger.forget(other.record);
        assert_eq!(ledger.take(owner).sides(), &[own]);
        assert!(ledger.get(owner).is_none());
    }
}
