//! `(type, id)` → local identifier → record.
//!
//! # Invariants
//! - At most one record per `(type, id)`.
//! - A record without an id is reachable by lid only until `assign_id`.

use crate::model::record::{Record, RecordLid};
use log::debug;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// `(type, id)` is already bound to another record, or the record
    /// already carries a different id.
    Conflict {
        model: String,
        id: String,
        existing: RecordLid,
    },
    UnknownRecord(RecordLid),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict {
                model,
                id,
                existing,
            } => write!(f, "{model}:{id} is already bound to record {existing}"),
            Self::UnknownRecord(lid) => write!(f, "record not found: {lid}"),
        }
    }
}

impl Error for IdentityError {}

/// One store's identity map.
#[derive(Debug, Default)]
pub struct IdentityMap {
    records: HashMap<RecordLid, Record>,
    index: HashMap<(String, String), RecordLid>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lid_for(&self, model: &str, id: &str) -> Option<RecordLid> {
        self.index
            .get(&(model.to_string(), id.to_string()))
            .copied()
    }

    pub fn get(&self, lid: RecordLid) -> Option<&Record> {
        self.records.get(&lid)
    }

    pub(crate) fn get_mut(&mut self, lid: RecordLid) -> Option<&mut Record> {
        self.records.get_mut(&lid)
    }

    /// Returns the lid for `(model, id)`, creating an `Empty` placeholder
    /// when the pair is unknown. The flag tells whether it was created.
    pub(crate) fn materialize(&mut self, model: &str, id: &str) -> (RecordLid, bool) {
        if let Some(lid) = self.lid_for(model, id) {
            return (lid, false);
        }
        let record = Record::placeholder(model, id);
        let lid = record.lid();
        self.index.insert((model.to_string(), id.to_string()), lid);
        self.records.insert(lid, record);
        debug!(
            "event=record_materialized module=identity status=ok model={} lid={}",
            model, lid
        );
        (lid, true)
    }

    /// Registers a locally created record.
    pub(crate) fn insert_new(&mut self, record: Record) -> IdentityResult<RecordLid> {
        let lid = record.lid();
        if let Some(id) = record.id() {
            let key = (record.model().to_string(), id.to_string());
            if let Some(existing) = self.index.get(&key) {
                return Err(IdentityError::Conflict {
                    model: key.0,
                    id: key.1,
                    existing: *existing,
                });
            }
            self.index.insert(key, lid);
        }
        self.records.insert(lid, record);
        Ok(lid)
    }

    /// Binds a remote id to a record that does not have one yet.
    ///
    /// Re-assigning the same id is a no-op.
    pub(crate) fn assign_id(&mut self, lid: RecordLid, id: &str) -> IdentityResult<()> {
        let record = self
            .records
            .get(&lid)
            .ok_or(IdentityError::UnknownRecord(lid))?;
        let key = (record.model().to_string(), id.to_string());
        match record.id() {
            Some(current) if current == id => return Ok(()),
            Some(current) => {
                return Err(IdentityError::Conflict {
                    model: key.0,
                    id: current.to_string(),
                    existing: lid,
                })
            }
            None => {}
        }
        if let Some(existing) = self.index.get(&key) {
            return Err(IdentityError::Conflict {
                model: key.0,
                id: key.1,
                existing: *existing,
            });
        }

        self.index.insert(key, lid);
        if let Some(record) = self.records.get_mut(&lid) {
            record.assign_id(id.to_string());
        }
        Ok(())
    }

    /// Frees the `(type, id)` binding but keeps the record addressable by lid.
    pub(crate) fn release_id(&mut self, lid: RecordLid) {
        if let Some(record) = self.records.get(&lid) {
            if let Some(id) = record.id() {
                self.index
                    .remove(&(record.model().to_string(), id.to_string()));
            }
        }
    }

    pub(crate) fn remove(&mut self, lid: RecordLid) -> Option<Record> {
        self.release_id(lid);
        self.records.remove(&lid)
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityError, IdentityMap};
    use crate::model::record::{Record, RecordStatus};

    #[test]
    fn materialize_returns_one_lid_per_type_and_id() {
        let mut map = IdentityMap::new();
        let (first, created) = map.materialize("user", "1");
        assert!(created);
        let (again, created) = map.materialize("user", "1");
        assert!(!created);
        assert_eq!(first, again);
        let (job, _) = map.materialize("job", "1");
        assert_ne!(first, job);
        assert_eq!(
            map.get(first).map(Record::status),
            Some(RecordStatus::Empty)
        );
    }

    #[test]
    fn assign_id_binds_new_records_once() {
        let mut map = IdentityMap::new();
        let lid = map
            .insert_new(Record::new_local("job", None))
            .expect("insert should succeed");
        map.assign_id(lid, "99").expect("first assignment binds");
        map.assign_id(lid, "99").expect("same id again is a no-op");
        assert_eq!(map.lid_for("job", "99"), Some(lid));

        let err = map.assign_id(lid, "100").expect_err("different id conflicts");
        assert!(matches!(err, IdentityError::Conflict { .. }));

        let other = map
            .insert_new(Record::new_local("job", None))
            .expect("insert should succeed");
        let err = map.assign_id(other, "99").expect_err("taken id conflicts");
        assert_eq!(
            err,
            IdentityError::Conflict {
                model: "job".to_string(),
                id: "99".to_string(),
                existing: lid,
            }
        );
    }

    #[test]
    fn remove_frees_the_identity() {
        let mut map = IdentityMap::new();
        let (lid, _) = map.materialize("user", "1");
        assert!(map.remove(lid).is_some());
        assert_eq!(map.lid_for("user", "1"), None);
        let (fresh, created) = map.materialize("user", "1");
        assert!(created);
        assert_ne!(fresh, lid);
    }
}
