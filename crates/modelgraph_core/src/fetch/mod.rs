//! Asynchronous relationship fetch coordination.
//!
//! # Responsibility
//! - Issue at most one loader request per side and chain repeated reads.
//! - Decide which deferred assignment wins when reads resolve out of order.
//!
//! # Invariants
//! - Suspension happens only here: callers hold a `DerefToken` and the host
//!   resumes the store with `Store::complete_fetch`.
//! - Superseded results are dropped silently; there is no cancel API.

pub mod coordinator;
pub mod loader;

pub use coordinator::{
    DerefToken, FetchCoordinator, FetchFailure, FetchTicket, ReadOutcome, ReadStatus,
};
pub use loader::{FetchError, FetchRequest, Loader, LoaderReply, OfflineLoader};
