//! Loader collaborator contract.
//!
//! # Responsibility
//! - Describe what the store asks for when a relationship must be fetched.
//! - Let the host answer inline or later through `Store::complete_fetch`.

use crate::fetch::coordinator::FetchTicket;
use crate::model::payload::{Document, ResourceRef};
use crate::model::record::RecordIdentity;
use crate::schema::definition::RelationshipKind;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Error reported by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport or adapter failure.
    Transport(String),
    /// The remote does not know the owner or the relationship.
    NotFound,
    /// The loader returned data the store could not apply.
    InvalidPayload(String),
    /// No loader is configured.
    Unavailable,
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::NotFound => write!(f, "related data not found"),
            Self::InvalidPayload(message) => write!(f, "invalid fetch payload: {message}"),
            Self::Unavailable => write!(f, "no loader configured"),
        }
    }
}

impl Error for FetchError {}

/// One relationship fetch issued by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub ticket: FetchTicket,
    pub owner: RecordIdentity,
    pub relationship: String,
    pub kind: RelationshipKind,
    pub target: String,
    pub related_link: Option<String>,
    /// References currently known for the side, loaded or not.
    pub known: Vec<ResourceRef>,
}

/// Loader answer to a `FetchRequest`.
#[derive(Debug, Clone, PartialEq)]
pub enum LoaderReply {
    /// The answer is available now. `Ok(None)` means "no related data".
    Ready(Result<Option<Document>, FetchError>),
    /// The answer will be delivered through `Store::complete_fetch`.
    Deferred,
}

pub trait Loader: Send {
    fn fetch_related(&mut self, request: &FetchRequest) -> LoaderReply;
}

/// Loader used when the host configures none: every fetch fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineLoader;

impl Loader for OfflineLoader {
    fn fetch_related(&mut self, _request: &FetchRequest) -> LoaderReply {
        LoaderReply::Ready(Err(FetchError::Unavailable))
    }
}
