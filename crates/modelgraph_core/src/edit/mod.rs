//! Rollback/commit bookkeeping.
//!
//! # Responsibility
//! - Remember which relationship sides each record's local edits touched,
//!   inverse sides included, so rollback and commit know what to restore.
//!
//! Attribute snapshots live on the record itself (canonical vs local
//! attributes); this module only tracks relationship sides.

pub mod ledger;

pub use ledger::{EditLedger, EditSet};
