//! Identity map.
//!
//! # Responsibility
//! - Guarantee one in-memory record per `(type, id)`.
//! - Hand out stable local identifiers (`RecordLid`) for new records.

pub mod map;

pub use map::{IdentityError, IdentityMap, IdentityResult};
