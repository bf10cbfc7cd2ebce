//! Record domain model.
//!
//! # Responsibility
//! - Define the single in-memory shape shared by every cached entity.
//! - Keep canonical (remote-confirmed) attributes apart from local edits.
//!
//! # Invariants
//! - `lid` is stable for the record lifetime and never reused.
//! - `id` is assigned at most once; a new record gets it when the remote
//!   confirms creation.
//! - `attribute()` reads local edits first, then canonical values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Process-unique local identifier for one cached record.
///
/// Stays valid while the remote id is still unknown (new records).
pub type RecordLid = Uuid;

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Attribute map keyed by declared attribute name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Record lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Referenced by a payload, no data received yet.
    Empty,
    /// Data received from the remote.
    Loaded,
    /// Created locally, creation not confirmed by the remote.
    New,
    /// Deleted locally, deletion not committed.
    Deleted,
    /// New record whose creation was rolled back.
    Discarded,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::New => "new",
            Self::Deleted => "deleted",
            Self::Discarded => "discarded",
        }
    }
}

impl Display for RecordStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity triple handed to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordIdentity {
    pub lid: RecordLid,
    pub model: String,
    pub id: Option<String>,
}

/// Cached entity record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    lid: RecordLid,
    model: String,
    id: Option<String>,
    status: RecordStatus,
    /// Status to restore when an uncommitted delete is rolled back.
    status_before_delete: Option<RecordStatus>,
    canonical_attributes: Attributes,
    local_attributes: Attributes,
}

impl Record {
    /// Creates a placeholder for a record only known by reference.
    pub fn placeholder(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::with_status(model.into(), Some(id.into()), RecordStatus::Empty)
    }

    /// Creates a locally-new record, optionally with a client-supplied id.
    pub fn new_local(model: impl Into<String>, id: Option<String>) -> Self {
        Self::with_status(model.into(), id, RecordStatus::New)
    }

    fn with_status(model: String, id: Option<String>, status: RecordStatus) -> Self {
        Self {
            lid: Uuid::new_v4(),
            model,
            id,
            status,
            status_before_delete: None,
            canonical_attributes: Attributes::new(),
            local_attributes: Attributes::new(),
        }
    }

    pub fn lid(&self) -> RecordLid {
        self.lid
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity {
            lid: self.lid,
            model: self.model.clone(),
            id: self.id.clone(),
        }
    }

    /// Returns whether record data is available (anything but a placeholder).
    pub fn is_loaded(&self) -> bool {
        self.status != RecordStatus::Empty
    }

    pub fn is_new(&self) -> bool {
        self.status == RecordStatus::New
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.status, RecordStatus::Deleted | RecordStatus::Discarded)
    }

    /// Reads one attribute, local edit first.
    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.local_attributes
            .get(name)
            .or_else(|| self.canonical_attributes.get(name))
    }

    /// Returns the effective attribute map (canonical overlaid with local edits).
    pub fn attributes(&self) -> Attributes {
        let mut merged = self.canonical_attributes.clone();
        merged.extend(
            self.local_attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        merged
    }

    /// Local attribute edits not yet committed.
    pub fn changed_attributes(&self) -> &Attributes {
        &self.local_attributes
    }

    pub fn has_attribute_changes(&self) -> bool {
        !self.local_attributes.is_empty()
    }

    pub(crate) fn set_local_attribute(&mut self, name: impl Into<String>, value: AttrValue) {
        let name = name.into();
        if self.canonical_attributes.get(&name) == Some(&value) {
            self.local_attributes.remove(&name);
        } else {
            self.local_attributes.insert(name, value);
        }
    }

    /// Merges remote attributes; a local edit equal to the new canonical
    /// value stops being an edit.
    pub(crate) fn merge_canonical_attributes(&mut self, attributes: Attributes) {
        for (name, value) in attributes {
            if self.local_attributes.get(&name) == Some(&value) {
                self.local_attributes.remove(&name);
            }
            self.canonical_attributes.insert(name, value);
        }
    }

    pub(crate) fn commit_attributes(&mut self) {
        let edits = std::mem::take(&mut self.local_attributes);
        self.canonical_attributes.extend(edits);
    }

    pub(crate) fn rollback_attributes(&mut self) {
        self.local_attributes.clear();
    }

    pub(crate) fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }

    pub(crate) fn mark_loaded(&mut self) {
        if self.status == RecordStatus::Empty {
            self.status = RecordStatus::Loaded;
        }
    }

    pub(crate) fn mark_deleted(&mut self) {
        if !self.is_deleted() {
            self.status_before_delete = Some(self.status);
            self.status = RecordStatus::Deleted;
        }
    }

    /// Reverts an uncommitted delete, or discards an uncommitted creation.
    pub(crate) fn rollback_status(&mut self) {
        self.status = match (self.status, self.status_before_delete.take()) {
            (RecordStatus::New, _) | (RecordStatus::Deleted, Some(RecordStatus::New)) => {
                RecordStatus::Discarded
            }
            (RecordStatus::Deleted, Some(previous)) => previous,
            (current, _) => current,
        };
    }

    pub(crate) fn mark_committed(&mut self) {
        if matches!(self.status, RecordStatus::New | RecordStatus::Empty) {
            self.status = RecordStatus::Loaded;
        }
    }
}
