//! Propagation engine shared by canonical and local mutations.
//!
//! # Responsibility
//! - Replace the members of one side in one layer.
//! - Mirror every added/dropped member into the inverse side, severing a
//!   third party when a one-valued inverse already points elsewhere.
//! - Report the ordered set of sides whose members changed.
//!
//! # Invariants
//! - After any call, for every resolved edge in the touched layer:
//!   `B in A.members` iff `A in B.inverse.members`.
//! - A side appears at most once in a `ChangeSet`; the recorded `before`
//!   is the value prior to the whole operation.

use crate::graph::state::{Layer, Members, RelationshipState, SideKey};
use crate::model::record::RecordLid;
use crate::schema::Schema;
use log::warn;
use std::collections::BTreeMap;

/// One side touched by an operation, with its members before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideChange {
    pub side: SideKey,
    pub before: Members,
}

/// Ordered, de-duplicated sides touched by one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<SideChange>,
}

impl ChangeSet {
    fn record(&mut self, side: &SideKey, before: &Members) {
        if !self.contains(side) {
            self.changes.push(SideChange {
                side: side.clone(),
                before: before.clone(),
            });
        }
    }

    pub fn contains(&self, side: &SideKey) -> bool {
        self.changes.iter().any(|change| change.side == *side)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SideChange> {
        self.changes.iter()
    }

    pub fn sides(&self) -> impl Iterator<Item = &SideKey> {
        self.changes.iter().map(|change| &change.side)
    }

    /// Appends sides not seen yet; the earlier `before` wins.
    pub fn merge(&mut self, other: ChangeSet) {
        for change in other.changes {
            self.record(&change.side, &change.before);
        }
    }
}

/// All relationship sides known to one store.
#[derive(Debug, Default)]
pub struct RelationshipGraph {
    sides: BTreeMap<SideKey, RelationshipState>,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, side: &SideKey) -> Option<&RelationshipState> {
        self.sides.get(side)
    }

    pub(crate) fn get_mut(&mut self, side: &SideKey) -> Option<&mut RelationshipState> {
        self.sides.get_mut(side)
    }

    pub fn len(&self) -> usize {
        self.sides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sides.is_empty()
    }

    /// Sides owned by one record, ordered by field name.
    pub fn sides_of(
        &self,
        record: RecordLid,
    ) -> impl Iterator<Item = (&SideKey, &RelationshipState)> {
        self.sides
            .range(SideKey::new(record, String::new())..)
            .take_while(move |(key, _)| key.record == record)
    }

    /// Returns the side, creating an empty one from the schema if needed.
    pub(crate) fn ensure_side(
        &mut self,
        schema: &Schema,
        side: &SideKey,
        model: &str,
    ) -> Option<&mut RelationshipState> {
        if !self.sides.contains_key(side) {
            let definition = schema.relationship(model, &side.field)?;
            let inverse = schema.inverse_of(model, &side.field).map(str::to_string);
            self.sides
                .insert(side.clone(), RelationshipState::new(definition, inverse));
        }
        self.sides.get_mut(side)
    }

    /// Replaces the members of `side` in `layer` and propagates to inverses.
    pub(crate) fn replace(
        &mut self,
        schema: &Schema,
        layer: Layer,
        side: &SideKey,
        model: &str,
        members: Members,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();
        self.replace_into(schema, layer, side, model, members, &mut changes);
        changes
    }

    pub(crate) fn add_member(
        &mut self,
        schema: &Schema,
        layer: Layer,
        side: &SideKey,
        model: &str,
        lid: RecordLid,
    ) -> ChangeSet {
        let next = match self.ensure_side(schema, side, model) {
            Some(state) => state.members(layer).with(lid),
            None => return ChangeSet::default(),
        };
        self.replace(schema, layer, side, model, next)
    }

    pub(crate) fn remove_member(
        &mut self,
        schema: &Schema,
        layer: Layer,
        side: &SideKey,
        model: &str,
        lid: RecordLid,
    ) -> ChangeSet {
        let next = match self.ensure_side(schema, side, model) {
            Some(state) => state.members(layer).without(lid),
            None => return ChangeSet::default(),
        };
        self.replace(schema, layer, side, model, next)
    }

    fn replace_into(
        &mut self,
        schema: &Schema,
        layer: Layer,
        side: &SideKey,
        model: &str,
        members: Members,
        changes: &mut ChangeSet,
    ) {
        let Some(state) = self.ensure_side(schema, side, model) else {
            warn!(
                "event=side_missing module=graph status=skipped model={} field={}",
                model, side.field
            );
            return;
        };
        let before = state.members(layer).clone();
        if before == members {
            return;
        }
        let inverse = state.inverse().map(str::to_string);
        let target = state.target().to_string();
        let dropped = before
            .as_slice()
            .iter()
            .filter(|lid| !members.contains(lid))
            .copied()
            .collect::<Vec<_>>();
        let added = members
            .as_slice()
            .iter()
            .filter(|lid| !before.contains(lid))
            .copied()
            .collect::<Vec<_>>();

        changes.record(side, &before);
        *state.members_mut(layer) = members;
        if layer == Layer::Local {
            state.mark_local_data();
        }

        let Some(inverse) = inverse else {
            return;
        };
        for lid in dropped {
            let inverse_side = SideKey::new(lid, inverse.clone());
            self.unlink(schema, layer, &inverse_side, &target, side.record, changes);
        }
        for lid in added {
            let inverse_side = SideKey::new(lid, inverse.clone());
            self.link(schema, layer, &inverse_side, &target, side, model, changes);
        }
    }

    /// Removes `partner` from `side` without further propagation.
    fn unlink(
        &mut self,
        schema: &Schema,
        layer: Layer,
        side: &SideKey,
        model: &str,
        partner: RecordLid,
        changes: &mut ChangeSet,
    ) {
        let Some(state) = self.ensure_side(schema, side, model) else {
            return;
        };
        let before = state.members(layer).clone();
        if !before.contains(&partner) {
            return;
        }
        changes.record(side, &before);
        *state.members_mut(layer) = before.without(partner);
        if layer == Layer::Local {
            state.mark_local_data();
        }
    }

    /// Adds `partner.record` to `side`; a one-valued side that pointed at a
    /// third record drops that record's back-reference too.
    #[allow(clippy::too_many_arguments)]
    fn link(
        &mut self,
        schema: &Schema,
        layer: Layer,
        side: &SideKey,
        model: &str,
        partner: &SideKey,
        partner_model: &str,
        changes: &mut ChangeSet,
    ) {
        let previous = {
            let Some(state) = self.ensure_side(schema, side, model) else {
                return;
            };
            let before = state.members(layer).clone();
            if before.contains(&partner.record) {
                return;
            }
            changes.record(side, &before);
            *state.members_mut(layer) = before.with(partner.record);
            if layer == Layer::Local {
                state.mark_local_data();
            }
            match before {
                Members::One(Some(previous)) => Some(previous),
                _ => None,
            }
        };

        if let Some(previous) = previous {
            let severed = SideKey::new(previous, partner.field.clone());
            self.unlink(schema, layer, &severed, partner_model, side.record, changes);
        }
    }

    pub(crate) fn mark_received(&mut self, side: &SideKey) {
        if let Some(state) = self.sides.get_mut(side) {
            state.mark_received();
        }
    }

    /// Drops every side of `record` and every reference to it.
    ///
    /// Returns the other records' sides whose local members changed.
    pub(crate) fn remove_record(&mut self, record: RecordLid) -> ChangeSet {
        let owned = self
            .sides_of(record)
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in owned {
            self.sides.remove(&key);
        }

        let mut changes = ChangeSet::default();
        for (key, state) in self.sides.iter_mut() {
            let local_before = state.local().clone();
            for layer in [Layer::Canonical, Layer::Local] {
                if state.members(layer).contains(&record) {
                    let next = state.members(layer).without(record);
                    *state.members_mut(layer) = next;
                }
            }
            if *state.local() != local_before {
                changes.record(key, &local_before);
            }
        }
        changes
    }
}
