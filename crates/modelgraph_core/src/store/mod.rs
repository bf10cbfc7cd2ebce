//! Store facade.
//!
//! # Responsibility
//! - Own every piece of cache state for one store: identity map,
//!   relationship graph, fetch coordinator, edit ledger, notification bus.
//! - Route every public operation through one explicit context object.
//!
//! # Invariants
//! - Every mutating entry point takes `&mut Store` and runs to completion;
//!   the only suspension point is a deferred loader reply.
//! - State of one store never leaks into another: tokens and subscriptions
//!   are tagged with the owning `StoreId`.

mod error;
mod lifecycle;
mod mutate;
pub mod persistence;
mod push;
mod read;

pub use error::{StoreError, StoreResult};
pub use mutate::{NewRecord, SetValue};
pub use persistence::{OfflinePersistence, Persistence, PersistenceError, RecordSnapshot};

use crate::config::{ConfigError, StoreConfig};
use crate::edit::{EditLedger, EditSet};
use crate::fetch::{FetchCoordinator, Loader, OfflineLoader};
use crate::graph::{ChangeSet, RelationshipGraph, RelationshipState, RelationshipView, SideKey};
use crate::identity::IdentityMap;
use crate::model::record::{Record, RecordLid, RecordStatus};
use crate::notify::{Notification, NotificationBus, NotificationFilter, Subscription};
use crate::schema::definition::{RelationshipDefinition, RelationshipKind};
use crate::schema::Schema;
use log::info;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique store tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StoreId(u64);

impl StoreId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct Store {
    id: StoreId,
    schema: Schema,
    config: StoreConfig,
    identity: IdentityMap,
    graph: RelationshipGraph,
    fetches: FetchCoordinator,
    edits: EditLedger,
    bus: NotificationBus,
    loader: Box<dyn Loader>,
    persistence: Box<dyn Persistence>,
}

impl Store {
    /// Creates a store with default config and offline collaborators.
    ///
    /// The config's inverse policy is taken from `schema`.
    pub fn new(schema: Schema) -> Self {
        let config = StoreConfig {
            inverse_policy: schema.inverse_policy(),
            ..StoreConfig::default()
        };
        Self::build(schema, config)
    }

    /// # Errors
    /// - Returns `ConfigError::Invalid` when `config` fails validation, or
    ///   when its inverse policy differs from the one `schema` was built
    ///   with (build the schema through `SchemaBuilder::with_config`).
    pub fn with_config(schema: Schema, config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.inverse_policy != schema.inverse_policy() {
            return Err(ConfigError::Invalid(format!(
                "inverse_policy {:?} does not match the schema's {:?}",
                config.inverse_policy,
                schema.inverse_policy()
            )));
        }
        Ok(Self::build(schema, config))
    }

    fn build(schema: Schema, config: StoreConfig) -> Self {
        let id = StoreId::next();
        info!(
            "event=store_open module=store status=ok store={} models={}",
            id,
            schema.model_names().count()
        );
        Self {
            id,
            fetches: FetchCoordinator::new(id, config.retain_settled_reads),
            bus: NotificationBus::new(id, config.notification_queue_limit),
            schema,
            config,
            identity: IdentityMap::new(),
            graph: RelationshipGraph::new(),
            edits: EditLedger::new(),
            loader: Box::new(OfflineLoader),
            persistence: Box::new(OfflinePersistence),
        }
    }

    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn with_persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Box::new(persistence);
        self
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn record(&self, lid: RecordLid) -> StoreResult<&Record> {
        self.identity.get(lid).ok_or(StoreError::UnknownRecord(lid))
    }

    /// Lid bound to `(model, id)`, loaded or not.
    pub fn lid_for(&self, model: &str, id: &str) -> Option<RecordLid> {
        self.identity.lid_for(model, id)
    }

    /// Lid bound to `(model, id)` only if its data is available.
    pub fn peek_record(&self, model: &str, id: &str) -> Option<RecordLid> {
        let lid = self.identity.lid_for(model, id)?;
        self.identity
            .get(lid)
            .filter(|record| record.is_loaded())
            .map(Record::lid)
    }

    /// Returns the lid for `(model, id)`, materializing an empty placeholder.
    pub fn record_for(&mut self, model: &str, id: &str) -> StoreResult<RecordLid> {
        self.ensure_model(model)?;
        Ok(self.identity.materialize(model, id).0)
    }

    pub fn relationship(&self, lid: RecordLid, field: &str) -> StoreResult<RelationshipView> {
        let record = self.record(lid)?;
        let definition = self.definition(record.model(), field)?;
        let side = SideKey::new(lid, field);
        Ok(match self.graph.get(&side) {
            Some(state) => RelationshipView::from_state(&side, state),
            None => {
                let inverse = self
                    .schema
                    .inverse_of(record.model(), field)
                    .map(str::to_string);
                RelationshipView::from_state(&side, &RelationshipState::new(&definition, inverse))
            }
        })
    }

    /// Effective belongs-to value, without fetching.
    pub fn peek_belongs_to(&self, lid: RecordLid, field: &str) -> StoreResult<Option<RecordLid>> {
        let view = self.relationship(lid, field)?;
        if view.kind != RelationshipKind::BelongsTo {
            return Err(StoreError::KindMismatch {
                field: field.to_string(),
                expected: view.kind,
            });
        }
        Ok(view.value())
    }

    /// Effective has-many members, without fetching.
    pub fn peek_has_many(&self, lid: RecordLid, field: &str) -> StoreResult<Vec<RecordLid>> {
        let view = self.relationship(lid, field)?;
        if view.kind != RelationshipKind::HasMany {
            return Err(StoreError::KindMismatch {
                field: field.to_string(),
                expected: view.kind,
            });
        }
        Ok(view.members().to_vec())
    }

    /// Returns whether the record has uncommitted state.
    ///
    /// A side changed by propagation makes its record dirty, but the edit
    /// belongs to the record that initiated it: only that record's
    /// `rollback`/`commit` resolves it (see `pending_edits`).
    pub fn is_dirty(&self, lid: RecordLid) -> StoreResult<bool> {
        let record = self.record(lid)?;
        if matches!(record.status(), RecordStatus::New | RecordStatus::Deleted)
            || record.has_attribute_changes()
        {
            return Ok(true);
        }
        Ok(self
            .graph
            .sides_of(lid)
            .any(|(_, state)| state.has_local_override()))
    }

    /// Sides touched by the record's uncommitted relationship edits.
    pub fn pending_edits(&self, lid: RecordLid) -> Option<&EditSet> {
        self.edits.get(lid)
    }

    pub fn subscribe(&mut self, filter: NotificationFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        self.bus.unsubscribe(subscription)
    }

    pub fn drain(&mut self, subscription: &Subscription) -> Vec<Notification> {
        self.bus.drain(subscription)
    }

    fn ensure_model(&self, model: &str) -> StoreResult<()> {
        if self.schema.has_model(model) {
            Ok(())
        } else {
            Err(StoreError::UnknownType(model.to_string()))
        }
    }

    fn definition(&self, model: &str, field: &str) -> StoreResult<RelationshipDefinition> {
        self.schema
            .relationship(model, field)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRelationship {
                model: model.to_string(),
                field: field.to_string(),
            })
    }

    fn model_of(&self, lid: RecordLid) -> StoreResult<String> {
        Ok(self.record(lid)?.model().to_string())
    }

    /// Rejects edits on records that are gone or being deleted.
    fn ensure_editable(&self, lid: RecordLid, operation: &'static str) -> StoreResult<&Record> {
        let record = self.record(lid)?;
        if record.is_deleted() {
            return Err(StoreError::InvalidState {
                lid,
                status: record.status(),
                operation,
            });
        }
        Ok(record)
    }

    /// Announces changed sides: propagated sides first, `origins` last.
    fn publish_changes(&mut self, changes: &ChangeSet, origins: &[SideKey]) {
        let propagated = changes.sides().filter(|side| !origins.contains(side));
        let initiating = origins.iter().filter(|side| changes.contains(side));
        let mut ordered: Vec<SideKey> = Vec::with_capacity(changes.len());
        for side in propagated.chain(initiating) {
            if !ordered.contains(side) {
                ordered.push(side.clone());
            }
        }
        for side in ordered {
            self.bus.publish(Notification::RelationshipChanged {
                record: side.record,
                field: side.field,
            });
        }
    }
}
