//! Local edits: record creation, relationship sets, attribute writes.
//!
//! # Invariants
//! - Local edits never touch canonical state.
//! - Every side changed by an edit is recorded under the initiating record
//!   so rollback can restore it.
//! - A rejected edit leaves the store untouched.

use crate::fetch::coordinator::PendingAssignment;
use crate::fetch::{DerefToken, FetchTicket, ReadStatus};
use crate::graph::{ChangeSet, Layer, Members, SideKey};
use crate::model::record::{AttrValue, Attributes, Record, RecordLid};
use crate::schema::definition::{RelationshipDefinition, RelationshipKind};
use crate::store::{Store, StoreError, StoreResult};
use log::{debug, info};
use std::collections::BTreeMap;

/// Value assigned to a relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetValue {
    One(Option<RecordLid>),
    Many(Vec<RecordLid>),
    /// The eventual value of a relationship read.
    Read(DerefToken),
}

impl From<RecordLid> for SetValue {
    fn from(value: RecordLid) -> Self {
        Self::One(Some(value))
    }
}

impl From<Option<RecordLid>> for SetValue {
    fn from(value: Option<RecordLid>) -> Self {
        Self::One(value)
    }
}

impl From<Vec<RecordLid>> for SetValue {
    fn from(value: Vec<RecordLid>) -> Self {
        Self::Many(value)
    }
}

impl From<DerefToken> for SetValue {
    fn from(value: DerefToken) -> Self {
        Self::Read(value)
    }
}

/// Input of `Store::create_record`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    /// Client-supplied id; `None` waits for the remote to assign one.
    pub id: Option<String>,
    pub attributes: Attributes,
    pub relationships: BTreeMap<String, SetValue>,
}

impl NewRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn relationship(mut self, field: impl Into<String>, value: impl Into<SetValue>) -> Self {
        self.relationships.insert(field.into(), value.into());
        self
    }
}

/// A validated assignment.
enum Assignment {
    Now(Members),
    Defer(FetchTicket),
}

impl Store {
    /// Creates a `New` record and applies its relationships as local sets.
    ///
    /// # Errors
    /// - `UnknownType`, `UnknownAttribute`, `UnknownRelationship`.
    /// - `IdentityConflict` when the client id is already taken.
    /// - Any error `set_relationship` reports for one of the values; the
    ///   record is not created in that case.
    pub fn create_record(&mut self, model: &str, new: NewRecord) -> StoreResult<RecordLid> {
        self.ensure_model(model)?;
        for name in new.attributes.keys() {
            self.ensure_attribute(model, name)?;
        }
        let mut assignments = Vec::with_capacity(new.relationships.len());
        for (field, value) in new.relationships {
            let definition = self.definition(model, &field)?;
            let assignment = self.validate_set(&definition, value)?;
            assignments.push((field, assignment));
        }

        let mut record = Record::new_local(model, new.id);
        for (name, value) in new.attributes {
            record.set_local_attribute(name, value);
        }
        let lid = self.identity.insert_new(record)?;
        for (field, assignment) in assignments {
            self.apply_assignment(lid, model, &field, assignment);
        }
        info!(
            "event=record_create module=store status=ok model={} lid={}",
            model, lid
        );
        Ok(lid)
    }

    /// Sets a relationship locally and propagates to the inverse side.
    ///
    /// # Errors
    /// - `InvalidReference` for a token this store did not mint (or no
    ///   longer retains); the store is left untouched.
    /// - `SupersededReference` / `Fetch` for tokens of dead reads.
    /// - `KindMismatch`, `TypeMismatch`, `UnknownRecord`, `InvalidState`.
    pub fn set_relationship(
        &mut self,
        lid: RecordLid,
        field: &str,
        value: impl Into<SetValue>,
    ) -> StoreResult<()> {
        let model = self.ensure_editable(lid, "edit")?.model().to_string();
        let definition = self.definition(&model, field)?;
        let assignment = self.validate_set(&definition, value.into())?;
        self.apply_assignment(lid, &model, field, assignment);
        Ok(())
    }

    pub fn set_belongs_to(
        &mut self,
        lid: RecordLid,
        field: &str,
        value: Option<RecordLid>,
    ) -> StoreResult<()> {
        self.set_relationship(lid, field, SetValue::One(value))
    }

    pub fn set_has_many(
        &mut self,
        lid: RecordLid,
        field: &str,
        members: Vec<RecordLid>,
    ) -> StoreResult<()> {
        self.set_relationship(lid, field, SetValue::Many(members))
    }

    pub fn add_to_has_many(
        &mut self,
        lid: RecordLid,
        field: &str,
        member: RecordLid,
    ) -> StoreResult<()> {
        let (model, definition) = self.has_many_target(lid, field)?;
        self.check_member(&definition, member)?;
        let side = SideKey::new(lid, field);
        self.settle_pending_for(&side);
        let changes = self
            .graph
            .add_member(&self.schema, Layer::Local, &side, &model, member);
        self.record_local_edit(lid, &side, &changes);
        Ok(())
    }

    pub fn remove_from_has_many(
        &mut self,
        lid: RecordLid,
        field: &str,
        member: RecordLid,
    ) -> StoreResult<()> {
        let (model, _) = self.has_many_target(lid, field)?;
        let side = SideKey::new(lid, field);
        self.settle_pending_for(&side);
        let changes = self
            .graph
            .remove_member(&self.schema, Layer::Local, &side, &model, member);
        self.record_local_edit(lid, &side, &changes);
        Ok(())
    }

    /// Writes one attribute into the local overlay.
    pub fn set_attribute(
        &mut self,
        lid: RecordLid,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> StoreResult<()> {
        let model = self.ensure_editable(lid, "edit")?.model().to_string();
        self.ensure_attribute(&model, name)?;
        if let Some(record) = self.identity.get_mut(lid) {
            record.set_local_attribute(name, value.into());
        }
        Ok(())
    }

    /// Marks a side stale so the next read fetches again.
    pub fn mark_stale(&mut self, lid: RecordLid, field: &str) -> StoreResult<()> {
        let side = self.invalidation_side(lid, field)?;
        if let Some(state) = self.graph.get_mut(&side) {
            state.mark_stale();
        }
        self.fetches.supersede(&side);
        Ok(())
    }

    /// Forces the next read of a side to fetch even if data is loaded.
    pub fn mark_for_reload(&mut self, lid: RecordLid, field: &str) -> StoreResult<()> {
        let side = self.invalidation_side(lid, field)?;
        if let Some(state) = self.graph.get_mut(&side) {
            state.mark_force_reload();
        }
        self.fetches.supersede(&side);
        Ok(())
    }

    fn invalidation_side(&mut self, lid: RecordLid, field: &str) -> StoreResult<SideKey> {
        let model = self.model_of(lid)?;
        self.definition(&model, field)?;
        let side = SideKey::new(lid, field);
        self.graph.ensure_side(&self.schema, &side, &model);
        Ok(side)
    }

    fn ensure_attribute(&self, model: &str, name: &str) -> StoreResult<()> {
        let declared = self
            .schema
            .model(model)
            .is_some_and(|definition| definition.has_attribute(name));
        if declared {
            Ok(())
        } else {
            Err(StoreError::UnknownAttribute {
                model: model.to_string(),
                field: name.to_string(),
            })
        }
    }

    fn has_many_target(
        &self,
        lid: RecordLid,
        field: &str,
    ) -> StoreResult<(String, RelationshipDefinition)> {
        let model = self.ensure_editable(lid, "edit")?.model().to_string();
        let definition = self.definition(&model, field)?;
        if definition.kind != RelationshipKind::HasMany {
            return Err(StoreError::KindMismatch {
                field: field.to_string(),
                expected: definition.kind,
            });
        }
        Ok((model, definition))
    }

    fn check_member(&self, definition: &RelationshipDefinition, member: RecordLid) -> StoreResult<()> {
        let record = self.record(member)?;
        if record.model() != definition.target {
            return Err(StoreError::TypeMismatch {
                field: definition.name.clone(),
                expected: definition.target.clone(),
                found: record.model().to_string(),
            });
        }
        // Deleted and discarded records cannot gain edges.
        if record.is_deleted() {
            return Err(StoreError::InvalidState {
                lid: member,
                status: record.status(),
                operation: "relate",
            });
        }
        Ok(())
    }

    fn validate_set(
        &self,
        definition: &RelationshipDefinition,
        value: SetValue,
    ) -> StoreResult<Assignment> {
        let kind_mismatch = || StoreError::KindMismatch {
            field: definition.name.clone(),
            expected: definition.kind,
        };
        match value {
            SetValue::One(member) => {
                if definition.kind != RelationshipKind::BelongsTo {
                    return Err(kind_mismatch());
                }
                if let Some(member) = member {
                    self.check_member(definition, member)?;
                }
                Ok(Assignment::Now(Members::One(member)))
            }
            SetValue::Many(members) => {
                if definition.kind != RelationshipKind::HasMany {
                    return Err(kind_mismatch());
                }
                for member in &members {
                    self.check_member(definition, *member)?;
                }
                Ok(Assignment::Now(Members::from_lids(
                    RelationshipKind::HasMany,
                    members,
                )))
            }
            SetValue::Read(token) => {
                let entry = self
                    .fetches
                    .lookup(&token)
                    .ok_or(StoreError::InvalidReference)?;
                let source = self
                    .graph
                    .get(&entry.side)
                    .ok_or(StoreError::InvalidReference)?;
                if source.kind() != definition.kind {
                    return Err(kind_mismatch());
                }
                if source.target() != definition.target {
                    return Err(StoreError::TypeMismatch {
                        field: definition.name.clone(),
                        expected: definition.target.clone(),
                        found: source.target().to_string(),
                    });
                }
                match entry.status {
                    ReadStatus::Fetching => Ok(Assignment::Defer(token.ticket())),
                    ReadStatus::Resolved => Ok(Assignment::Now(
                        entry
                            .value
                            .clone()
                            .unwrap_or_else(|| Members::empty(definition.kind)),
                    )),
                    ReadStatus::Superseded => Err(StoreError::SupersededReference(token.ticket())),
                    ReadStatus::Failed => match &entry.failure {
                        Some(failure) => Err(StoreError::Fetch(failure.clone())),
                        None => Err(StoreError::SupersededReference(token.ticket())),
                    },
                }
            }
        }
    }

    fn apply_assignment(&mut self, lid: RecordLid, model: &str, field: &str, assignment: Assignment) {
        let side = SideKey::new(lid, field);
        match assignment {
            Assignment::Now(members) => {
                self.settle_pending_for(&side);
                self.apply_local(&side, model, members, lid);
            }
            Assignment::Defer(ticket) => {
                if self.fetches.in_flight(&side) != Some(ticket) {
                    self.fetches.supersede(&side);
                }
                debug!(
                    "event=set_deferred module=store status=ok ticket={} field={}",
                    ticket, field
                );
                self.fetches.defer(
                    ticket,
                    PendingAssignment {
                        target: side,
                        model: model.to_string(),
                        initiator: lid,
                    },
                );
            }
        }
    }

    /// The newest operation on a side wins over anything pending for it.
    fn settle_pending_for(&mut self, side: &SideKey) {
        self.fetches.cancel_deferred(side);
        self.fetches.supersede(side);
    }

    /// Applies a local set and records it for rollback.
    pub(crate) fn apply_local(
        &mut self,
        side: &SideKey,
        model: &str,
        members: Members,
        initiator: RecordLid,
    ) -> ChangeSet {
        let changes = self
            .graph
            .replace(&self.schema, Layer::Local, side, model, members);
        self.record_local_edit(initiator, side, &changes);
        changes
    }

    fn record_local_edit(&mut self, initiator: RecordLid, side: &SideKey, changes: &ChangeSet) {
        self.edits.touch(initiator, changes.sides());
        self.publish_changes(changes, std::slice::from_ref(side));
    }
}
