//! Relationship state machine.
//!
//! # Responsibility
//! - Hold canonical and local members plus flags for every relationship side.
//! - Keep both ends of each resolved edge in agreement in both layers.
//!
//! # Invariants
//! - All member changes go through `RelationshipGraph::replace` (or the
//!   add/remove helpers built on it); nothing writes members directly.
//! - `local` equals `canonical` unless an uncommitted edit is pending.

pub mod engine;
pub mod state;

pub use engine::{ChangeSet, RelationshipGraph, SideChange};
pub use state::{Layer, Members, RelationshipFlags, RelationshipState, SideKey};

use crate::model::record::RecordLid;
use crate::schema::definition::RelationshipKind;
use serde::Serialize;

/// Read-only snapshot of one side handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipView {
    pub record: RecordLid,
    pub field: String,
    pub kind: RelationshipKind,
    pub target: String,
    pub inverse: Option<String>,
    pub canonical: Members,
    pub local: Members,
    pub flags: RelationshipFlags,
    pub related_link: Option<String>,
}

impl RelationshipView {
    pub(crate) fn from_state(side: &SideKey, state: &RelationshipState) -> Self {
        Self {
            record: side.record,
            field: side.field.clone(),
            kind: state.kind(),
            target: state.target().to_string(),
            inverse: state.inverse().map(str::to_string),
            canonical: state.canonical().clone(),
            local: state.local().clone(),
            flags: state.flags(),
            related_link: state.related_link().map(str::to_string),
        }
    }

    /// Effective belongs-to value.
    pub fn value(&self) -> Option<RecordLid> {
        self.local.one()
    }

    /// Effective has-many members.
    pub fn members(&self) -> &[RecordLid] {
        self.local.as_slice()
    }
}
