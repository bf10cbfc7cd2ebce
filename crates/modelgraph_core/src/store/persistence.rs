//! Persistence collaborator contract used by `Store::save`.

use crate::model::payload::Document;
use crate::model::record::{Attributes, RecordIdentity, RecordStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// What the store hands to `Persistence::save`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSnapshot {
    pub identity: RecordIdentity,
    pub status: RecordStatus,
    /// Effective attributes (canonical overlaid with local edits).
    pub attributes: Attributes,
    pub changed_attributes: Attributes,
    /// Effective members per relationship field.
    pub relationships: BTreeMap<String, Vec<RecordIdentity>>,
}

impl RecordSnapshot {
    pub fn is_new(&self) -> bool {
        self.status == RecordStatus::New
    }

    pub fn is_deleted(&self) -> bool {
        self.status == RecordStatus::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    Rejected(String),
    Transport(String),
    Unavailable,
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(message) => write!(f, "remote rejected the record: {message}"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Unavailable => write!(f, "no persistence configured"),
        }
    }
}

impl Error for PersistenceError {}

pub trait Persistence: Send {
    /// Persists one record. `Ok(Some(document))` carries the remote's view
    /// of the record; `Ok(None)` confirms the local state as-is.
    fn save(&mut self, snapshot: &RecordSnapshot) -> Result<Option<Document>, PersistenceError>;
}

/// Persistence used when the host configures none: every save fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflinePersistence;

impl Persistence for OfflinePersistence {
    fn save(&mut self, _snapshot: &RecordSnapshot) -> Result<Option<Document>, PersistenceError> {
        Err(PersistenceError::Unavailable)
    }
}
