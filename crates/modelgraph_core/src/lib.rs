//! Relationship-tracking core of a client-side model-graph cache.
//! Keeps normalized records and both ends of every relationship consistent
//! under local edits, remote pushes, async fetches and rollback.

pub mod config;
pub mod edit;
pub mod fetch;
pub mod graph;
pub mod identity;
pub mod logging;
pub mod model;
pub mod notify;
pub mod schema;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use fetch::{
    DerefToken, FetchError, FetchFailure, FetchRequest, FetchTicket, Loader, LoaderReply,
    OfflineLoader, ReadOutcome, ReadStatus,
};
pub use graph::{Members, RelationshipFlags, RelationshipView, SideKey};
pub use logging::{
    init_logging, log_store_identity, logging_status, LogLevel, LogSettings, LoggingError,
    LoggingResult,
};
pub use model::payload::{
    Document, PrimaryData, RelationshipData, RelationshipLinks, RelationshipPayload, Resource,
    ResourceRef,
};
pub use model::record::{AttrValue, Attributes, Record, RecordIdentity, RecordLid, RecordStatus};
pub use notify::{Notification, NotificationFilter, NotificationKind, Subscription};
pub use schema::definition::{
    InverseSpec, ModelDefinition, RelationshipDefinition, RelationshipKind, RelationshipOptions,
};
pub use schema::{InversePolicy, Schema, SchemaBuilder, SchemaError, SchemaResult};
pub use store::{
    NewRecord, OfflinePersistence, Persistence, PersistenceError, RecordSnapshot, SetValue, Store,
    StoreError, StoreId, StoreResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
