//! Canonical updates from remote payloads.
//!
//! # Invariants
//! - A document is validated as a whole before any record changes.
//! - `local` follows a canonical change only on sides that had no pending
//!   override before the change.

use crate::graph::{ChangeSet, Layer, Members, SideKey};
use crate::model::payload::{Document, RelationshipData};
use crate::model::record::RecordLid;
use crate::notify::Notification;
use crate::schema::definition::RelationshipKind;
use crate::store::{Store, StoreError, StoreResult};
use log::{debug, info};

impl Store {
    /// Merges a document into the cache and reconciles relationships.
    ///
    /// Returns the lids of the primary data, in payload order.
    ///
    /// # Errors
    /// - `UnknownType` when any resource names an unregistered model.
    /// - `KindMismatch`/`TypeMismatch` when linkage does not fit the
    ///   relationship definition.
    pub fn push(&mut self, document: Document) -> StoreResult<Vec<RecordLid>> {
        self.validate_document(&document)?;
        let lids = self.apply_document(&document);
        info!(
            "event=push module=store status=ok primary={} included={}",
            document.primary().len(),
            document.included.len()
        );
        Ok(lids)
    }

    pub(crate) fn validate_document(&self, document: &Document) -> StoreResult<()> {
        for resource in document.resources() {
            self.ensure_model(&resource.model)?;
            for (field, payload) in &resource.relationships {
                let Some(definition) = self.schema.relationship(&resource.model, field) else {
                    continue;
                };
                let Some(data) = &payload.data else {
                    continue;
                };
                let shape_ok = !matches!(
                    (definition.kind, data),
                    (RelationshipKind::BelongsTo, RelationshipData::Many(_))
                        | (RelationshipKind::HasMany, RelationshipData::One(_))
                );
                if !shape_ok {
                    return Err(StoreError::KindMismatch {
                        field: field.clone(),
                        expected: definition.kind,
                    });
                }
                if let Some(reference) = data
                    .refs()
                    .iter()
                    .find(|reference| reference.model != definition.target)
                {
                    return Err(StoreError::TypeMismatch {
                        field: field.clone(),
                        expected: definition.target.clone(),
                        found: reference.model.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Applies an already-validated document and publishes notifications.
    pub(crate) fn apply_document(&mut self, document: &Document) -> Vec<RecordLid> {
        let mut record_events = Vec::new();
        let mut lids = Vec::new();
        for resource in document.resources() {
            let (lid, _) = self.identity.materialize(&resource.model, &resource.id);
            let declared = self.schema.model(&resource.model);
            if let Some(record) = self.identity.get_mut(lid) {
                let was_loaded = record.is_loaded();
                let before = record.attributes();
                let attributes = resource
                    .attributes
                    .iter()
                    .filter(|(name, _)| {
                        declared.is_some_and(|definition| definition.has_attribute(name))
                    })
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                record.merge_canonical_attributes(attributes);
                record.mark_loaded();
                if !was_loaded {
                    record_events.push(Notification::RecordLoaded { record: lid });
                } else if record.attributes() != before {
                    record_events.push(Notification::RecordUpdated { record: lid });
                }
            }
            lids.push(lid);
        }

        let mut changes = ChangeSet::default();
        let mut origins = Vec::new();
        for (resource, lid) in document.resources().zip(lids.iter().copied()) {
            for (field, payload) in &resource.relationships {
                let Some(definition) = self.schema.relationship(&resource.model, field).cloned()
                else {
                    debug!(
                        "event=push_relationship module=store status=skipped model={} field={}",
                        resource.model, field
                    );
                    continue;
                };
                let side = SideKey::new(lid, field.clone());
                let related = payload
                    .links
                    .as_ref()
                    .and_then(|links| links.related.clone());
                if let Some(state) = self.graph.ensure_side(&self.schema, &side, &resource.model) {
                    state.set_related_link(related);
                }
                let Some(data) = &payload.data else {
                    continue;
                };
                let related_lids = data
                    .refs()
                    .iter()
                    .map(|reference| self.identity.materialize(&reference.model, &reference.id).0)
                    .collect();
                let members = Members::from_lids(definition.kind, related_lids);
                changes.merge(self.apply_canonical(&side, &resource.model, members));
                origins.push(side);
            }
        }

        self.publish_changes(&changes, &origins);
        for event in record_events {
            self.bus.publish(event);
        }
        let primary = document.primary().len();
        lids.truncate(primary);
        lids
    }

    /// Sets canonical members of `side` and lets clean sides follow locally.
    pub(crate) fn apply_canonical(
        &mut self,
        side: &SideKey,
        model: &str,
        members: Members,
    ) -> ChangeSet {
        let mut all = self
            .graph
            .replace(&self.schema, Layer::Canonical, side, model, members);
        self.graph.mark_received(side);

        let mut clean = Vec::new();
        for change in all.iter() {
            self.graph.mark_received(&change.side);
            let follows = self
                .graph
                .get(&change.side)
                .is_some_and(|state| *state.local() == change.before);
            if follows {
                clean.push(change.side.clone());
            }
        }

        for follower in clean {
            let Ok(follower_model) = self.model_of(follower.record) else {
                continue;
            };
            let Some(canonical) = self
                .graph
                .get(&follower)
                .map(|state| state.canonical().clone())
            else {
                continue;
            };
            let followed = self.graph.replace(
                &self.schema,
                Layer::Local,
                &follower,
                &follower_model,
                canonical,
            );
            all.merge(followed);
        }
        all
    }
}
