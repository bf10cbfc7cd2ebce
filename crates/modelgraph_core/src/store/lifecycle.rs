//! Delete, rollback, commit, save and unload.
//!
//! # Invariants
//! - Rollback restores `local = canonical` on every side the record's edits
//!   touched; propagation re-establishes the inverse sides.
//! - Commit folds `local` into `canonical` on the same sides.
//! - Rollback or commit of a clean record is a no-op.
//! - A failed save changes nothing; the record stays dirty.

use crate::graph::{ChangeSet, Layer, Members, SideKey};
use crate::model::payload::Document;
use crate::model::record::{RecordIdentity, RecordLid, RecordStatus};
use crate::notify::Notification;
use crate::store::{RecordSnapshot, Store, StoreError, StoreResult};
use log::{debug, info, warn};
use std::collections::BTreeMap;

impl Store {
    /// Deletes a record locally: every side of it is severed in `local`.
    ///
    /// Canonical state is untouched until the delete is committed.
    pub fn delete_record(&mut self, lid: RecordLid) -> StoreResult<()> {
        let record = self.record(lid)?;
        match record.status() {
            RecordStatus::Deleted => return Ok(()),
            RecordStatus::Discarded | RecordStatus::Empty => {
                return Err(StoreError::InvalidState {
                    lid,
                    status: record.status(),
                    operation: "delete",
                })
            }
            RecordStatus::Loaded | RecordStatus::New => {}
        }
        let model = record.model().to_string();
        let definitions = self
            .schema
            .relationships_of(&model)
            .map(|definition| (definition.name.clone(), definition.kind))
            .collect::<Vec<_>>();

        if let Some(record) = self.identity.get_mut(lid) {
            record.mark_deleted();
        }
        let mut changes = ChangeSet::default();
        let mut origins = Vec::new();
        for (field, kind) in definitions {
            let side = SideKey::new(lid, field);
            self.fetches.cancel_deferred(&side);
            self.fetches.supersede(&side);
            let severed =
                self.graph
                    .replace(&self.schema, Layer::Local, &side, &model, Members::empty(kind));
            self.edits.touch(lid, severed.sides());
            changes.merge(severed);
            origins.push(side);
        }
        self.publish_changes(&changes, &origins);
        info!(
            "event=record_delete module=store status=ok model={} lid={} sides={}",
            model,
            lid,
            changes.len()
        );
        Ok(())
    }

    /// Discards uncommitted edits of one record.
    ///
    /// A deleted record returns to its previous state; a new record becomes
    /// `Discarded` and loses every relationship it gained since creation.
    pub fn rollback(&mut self, lid: RecordLid) -> StoreResult<()> {
        let record = self.record(lid)?;
        let status = record.status();
        let has_attribute_changes = record.has_attribute_changes();
        if status == RecordStatus::Discarded {
            return Ok(());
        }
        let edits = self.edits.take(lid);
        let dirty = !edits.is_empty()
            || has_attribute_changes
            || matches!(status, RecordStatus::New | RecordStatus::Deleted);
        if !dirty {
            debug!(
                "event=rollback module=store status=skipped lid={} reason=clean",
                lid
            );
            return Ok(());
        }

        let mut changes = ChangeSet::default();
        for side in edits.sides() {
            changes.merge(self.restore_side(side, Layer::Local));
        }
        if let Some(record) = self.identity.get_mut(lid) {
            record.rollback_attributes();
            record.rollback_status();
        }
        let discarded = self
            .identity
            .get(lid)
            .is_some_and(|record| record.status() == RecordStatus::Discarded);
        if discarded {
            self.fetches.forget_record(lid);
            self.identity.release_id(lid);
        }

        self.publish_changes(&changes, &[]);
        self.bus
            .publish(Notification::RecordRolledBack { record: lid });
        info!(
            "event=rollback module=store status=ok lid={} sides={} discarded={}",
            lid,
            changes.len(),
            discarded
        );
        Ok(())
    }

    /// Accepts the record's local state as canonical without a remote call.
    ///
    /// Committing a deleted record unloads it.
    pub fn commit(&mut self, lid: RecordLid) -> StoreResult<()> {
        let record = self.record(lid)?;
        match record.status() {
            RecordStatus::Discarded => {
                return Err(StoreError::InvalidState {
                    lid,
                    status: record.status(),
                    operation: "commit",
                })
            }
            RecordStatus::Deleted => {
                self.edits.take(lid);
                self.unload_record(lid)?;
                self.bus.publish(Notification::RecordDeleted { record: lid });
                return Ok(());
            }
            RecordStatus::Empty => return Ok(()),
            RecordStatus::Loaded | RecordStatus::New => {}
        }

        let edits = self.edits.take(lid);
        let mut changes = ChangeSet::default();
        for side in edits.sides() {
            changes.merge(self.restore_side(side, Layer::Canonical));
        }
        if let Some(record) = self.identity.get_mut(lid) {
            record.commit_attributes();
            record.mark_committed();
        }
        self.publish_changes(&changes, &[]);
        debug!(
            "event=commit module=store status=ok lid={} sides={}",
            lid,
            changes.len()
        );
        Ok(())
    }

    /// Persists one record through the `Persistence` collaborator.
    ///
    /// # Errors
    /// - `SaveFailed` when persistence rejects the record; nothing changes
    ///   and rollback remains available.
    /// - `IdentityConflict` when the returned id is bound elsewhere.
    /// - `InvalidPayload` when a new record ends up without an id, or the
    ///   returned document cannot be applied.
    pub fn save(&mut self, lid: RecordLid) -> StoreResult<()> {
        let status = self.record(lid)?.status();
        if matches!(status, RecordStatus::Discarded | RecordStatus::Empty) {
            return Err(StoreError::InvalidState {
                lid,
                status,
                operation: "save",
            });
        }
        let snapshot = self.snapshot(lid)?;
        let payload = match self.persistence.save(&snapshot) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(
                    "event=save module=store status=error lid={} error={}",
                    lid, err
                );
                return Err(StoreError::SaveFailed(err));
            }
        };

        if status == RecordStatus::Deleted {
            self.commit(lid)?;
            info!("event=save module=store status=ok lid={} op=delete", lid);
            return Ok(());
        }

        if let Some(document) = &payload {
            self.validate_document(document)?;
        }
        let was_new = status == RecordStatus::New;
        if was_new {
            self.adopt_saved_id(lid, &snapshot.identity, payload.as_ref())?;
        }

        self.commit(lid)?;
        if let Some(document) = &payload {
            self.apply_document(document);
        }
        let event = if was_new {
            Notification::RecordCreated { record: lid }
        } else {
            Notification::RecordUpdated { record: lid }
        };
        self.bus.publish(event);
        info!(
            "event=save module=store status=ok lid={} op={}",
            lid,
            if was_new { "create" } else { "update" }
        );
        Ok(())
    }

    /// Registers the remote-assigned id of a record created without one.
    ///
    /// # Errors
    /// - `IdentityConflict` when the id is bound to another record or the
    ///   record already carries a different id.
    pub fn assign_id(&mut self, lid: RecordLid, id: &str) -> StoreResult<()> {
        let status = self.record(lid)?.status();
        if status == RecordStatus::Discarded {
            return Err(StoreError::InvalidState {
                lid,
                status,
                operation: "assign_id",
            });
        }
        self.identity.assign_id(lid, id)?;
        debug!("event=assign_id module=store status=ok lid={} id={}", lid, id);
        Ok(())
    }

    /// Forgets a record and every reference to it.
    pub fn unload_record(&mut self, lid: RecordLid) -> StoreResult<()> {
        self.record(lid)?;
        self.fetches.forget_record(lid);
        self.edits.forget(lid);
        let changes = self.graph.remove_record(lid);
        self.identity.remove(lid);
        self.publish_changes(&changes, &[]);
        debug!("event=unload module=store status=ok lid={}", lid);
        Ok(())
    }

    /// Current effective state of one record, as handed to persistence.
    pub fn snapshot(&self, lid: RecordLid) -> StoreResult<RecordSnapshot> {
        let record = self.record(lid)?;
        let mut relationships = BTreeMap::new();
        for definition in self.schema.relationships_of(record.model()) {
            let side = SideKey::new(lid, definition.name.clone());
            let members = self
                .graph
                .get(&side)
                .map(|state| state.local().as_slice().to_vec())
                .unwrap_or_default();
            let identities = members
                .into_iter()
                .filter_map(|member| self.identity.get(member).map(|related| related.identity()))
                .collect::<Vec<RecordIdentity>>();
            relationships.insert(definition.name.clone(), identities);
        }
        Ok(RecordSnapshot {
            identity: record.identity(),
            status: record.status(),
            attributes: record.attributes(),
            changed_attributes: record.changed_attributes().clone(),
            relationships,
        })
    }

    /// Sets one layer of `side` to the other layer's members.
    fn restore_side(&mut self, side: &SideKey, layer: Layer) -> ChangeSet {
        let source = match layer {
            Layer::Local => Layer::Canonical,
            Layer::Canonical => Layer::Local,
        };
        let Some(members) = self
            .graph
            .get(side)
            .map(|state| state.members(source).clone())
        else {
            return ChangeSet::default();
        };
        let Ok(model) = self.model_of(side.record) else {
            return ChangeSet::default();
        };
        self.graph
            .replace(&self.schema, layer, side, &model, members)
    }

    /// Binds the id the remote assigned to a new record.
    fn adopt_saved_id(
        &mut self,
        lid: RecordLid,
        identity: &RecordIdentity,
        payload: Option<&Document>,
    ) -> StoreResult<()> {
        let returned = payload
            .and_then(|document| document.primary().first())
            .filter(|resource| resource.model == identity.model)
            .map(|resource| resource.id.clone());
        match (returned, identity.id.as_deref()) {
            (Some(id), _) => {
                self.identity.assign_id(lid, &id)?;
                Ok(())
            }
            (None, Some(_)) => Ok(()),
            (None, None) => Err(StoreError::InvalidPayload(format!(
                "saved {} record has no id",
                identity.model
            ))),
        }
    }
}
