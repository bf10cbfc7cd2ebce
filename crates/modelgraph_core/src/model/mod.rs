//! Record and payload domain model.
//!
//! # Responsibility
//! - Define the cached record shape and its lifecycle states.
//! - Define the already-parsed payload shapes the store consumes.
//!
//! # Invariants
//! - Every cached record is addressed by a stable `RecordLid`.
//! - Payload linkage keeps "no information" apart from "explicitly empty".

pub mod payload;
pub mod record;
