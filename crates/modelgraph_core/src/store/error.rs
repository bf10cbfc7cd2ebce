//! Store-level errors.

use crate::fetch::{FetchFailure, FetchTicket};
use crate::identity::IdentityError;
use crate::model::record::{RecordLid, RecordStatus};
use crate::schema::definition::RelationshipKind;
use crate::store::persistence::PersistenceError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    UnknownType(String),
    UnknownRecord(RecordLid),
    UnknownRelationship {
        model: String,
        field: String,
    },
    UnknownAttribute {
        model: String,
        field: String,
    },
    KindMismatch {
        field: String,
        expected: RelationshipKind,
    },
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
    /// The value did not come from this store's read path.
    InvalidReference,
    /// The read behind the token was superseded by a newer operation.
    SupersededReference(FetchTicket),
    /// `complete_fetch` named a read that is not waiting for data.
    UnknownFetch(FetchTicket),
    IdentityConflict {
        model: String,
        id: String,
        existing: RecordLid,
    },
    RelationshipNotLoaded {
        model: String,
        field: String,
    },
    InvalidState {
        lid: RecordLid,
        status: RecordStatus,
        operation: &'static str,
    },
    Fetch(FetchFailure),
    SaveFailed(PersistenceError),
    InvalidPayload(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(model) => write!(f, "unknown model type: {model}"),
            Self::UnknownRecord(lid) => write!(f, "record not found: {lid}"),
            Self::UnknownRelationship { model, field } => {
                write!(f, "{model} has no relationship `{field}`")
            }
            Self::UnknownAttribute { model, field } => {
                write!(f, "{model} has no attribute `{field}`")
            }
            Self::KindMismatch { field, expected } => {
                write!(f, "`{field}` is a {expected} relationship")
            }
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(f, "`{field}` expects `{expected}` records, got `{found}`"),
            Self::InvalidReference => {
                write!(f, "value did not originate from a belongsTo/hasMany read")
            }
            Self::SupersededReference(ticket) => {
                write!(f, "read {ticket} was superseded by a newer operation")
            }
            Self::UnknownFetch(ticket) => write!(f, "no fetch in flight for ticket {ticket}"),
            Self::IdentityConflict {
                model,
                id,
                existing,
            } => write!(f, "{model}:{id} is already bound to record {existing}"),
            Self::RelationshipNotLoaded { model, field } => write!(
                f,
                "{model}.{field} references records that are not loaded; declare it async or push them first"
            ),
            Self::InvalidState {
                lid,
                status,
                operation,
            } => write!(f, "cannot {operation} record {lid} in state {status}"),
            Self::Fetch(failure) => write!(f, "{failure}"),
            Self::SaveFailed(err) => write!(f, "save failed: {err}"),
            Self::InvalidPayload(message) => write!(f, "invalid payload: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Fetch(failure) => Some(failure),
            Self::SaveFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<IdentityError> for StoreError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::Conflict {
                model,
                id,
                existing,
            } => Self::IdentityConflict {
                model,
                id,
                existing,
            },
            IdentityError::UnknownRecord(lid) => Self::UnknownRecord(lid),
        }
    }
}

impl From<FetchFailure> for StoreError {
    fn from(value: FetchFailure) -> Self {
        Self::Fetch(value)
    }
}

impl From<PersistenceError> for StoreError {
    fn from(value: PersistenceError) -> Self {
        Self::SaveFailed(value)
    }
}
