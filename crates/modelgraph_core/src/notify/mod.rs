//! Typed notification bus.
//!
//! # Responsibility
//! - Queue store notifications per subscriber until the host drains them.
//!
//! # Invariants
//! - Exactly one `RelationshipChanged` per side per store operation.
//! - Within one operation, propagated sides precede the initiating side and
//!   record-level notifications follow relationship ones.

pub mod bus;

pub use bus::{Notification, NotificationBus, NotificationFilter, NotificationKind, Subscription};
