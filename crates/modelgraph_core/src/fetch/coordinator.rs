//! In-flight relationship reads and deferred assignments.
//!
//! # Responsibility
//! - Track one read entry per issued token and its terminal outcome.
//! - De-duplicate reads of a side and keep the newest deferred assignment
//!   per target side authoritative.
//!
//! # Invariants
//! - At most one `Fetching` read per side.
//! - At most one deferred assignment per target side; replacing or
//!   cancelling it drops the older one.
//! - Terminal reads never return to `Fetching`.

use crate::fetch::loader::FetchError;
use crate::graph::state::{Members, SideKey};
use crate::model::record::RecordLid;
use crate::store::StoreId;
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-local read number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Display for FetchTicket {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a relationship read, minted only by `Store::read`.
///
/// Tagged with the minting store; other stores reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerefToken {
    store: StoreId,
    read: FetchTicket,
}

impl DerefToken {
    pub fn store(&self) -> StoreId {
        self.store
    }

    pub fn ticket(&self) -> FetchTicket {
        self.read
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Fetching,
    Resolved,
    Superseded,
    Failed,
}

impl ReadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Resolved => "resolved",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Fetching
    }
}

/// Failed relationship read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub ticket: FetchTicket,
    pub record: RecordLid,
    pub field: String,
    pub error: FetchError,
}

impl Display for FetchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "fetch {} of {}.{} failed: {}",
            self.ticket, self.record, self.field, self.error
        )
    }
}

impl Error for FetchFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.error)
    }
}

/// Result of polling a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Pending,
    Ready(Members),
    Superseded,
    Failed(FetchFailure),
}

/// Assignment waiting for a read to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingAssignment {
    pub target: SideKey,
    pub model: String,
    pub initiator: RecordLid,
}

#[derive(Debug, Clone)]
pub(crate) struct ReadEntry {
    pub side: SideKey,
    pub status: ReadStatus,
    pub value: Option<Members>,
    pub failure: Option<FetchFailure>,
    waiters: Vec<PendingAssignment>,
}

impl ReadEntry {
    pub fn outcome(&self) -> ReadOutcome {
        match self.status {
            ReadStatus::Fetching => ReadOutcome::Pending,
            ReadStatus::Superseded => ReadOutcome::Superseded,
            ReadStatus::Resolved => match &self.value {
                Some(value) => ReadOutcome::Ready(value.clone()),
                None => ReadOutcome::Pending,
            },
            ReadStatus::Failed => match &self.failure {
                Some(failure) => ReadOutcome::Failed(failure.clone()),
                None => ReadOutcome::Superseded,
            },
        }
    }
}

#[derive(Debug)]
pub struct FetchCoordinator {
    store: StoreId,
    next_ticket: u64,
    reads: HashMap<FetchTicket, ReadEntry>,
    in_flight: HashMap<SideKey, FetchTicket>,
    deferred: HashMap<SideKey, FetchTicket>,
    settled: VecDeque<FetchTicket>,
    retain_settled: usize,
}

impl FetchCoordinator {
    pub fn new(store: StoreId, retain_settled: usize) -> Self {
        Self {
            store,
            next_ticket: 1,
            reads: HashMap::new(),
            in_flight: HashMap::new(),
            deferred: HashMap::new(),
            settled: VecDeque::new(),
            retain_settled,
        }
    }

    pub fn in_flight(&self, side: &SideKey) -> Option<FetchTicket> {
        self.in_flight.get(side).copied()
    }

    pub fn deferred_for(&self, side: &SideKey) -> Option<FetchTicket> {
        self.deferred.get(side).copied()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn token(&self, ticket: FetchTicket) -> DerefToken {
        DerefToken {
            store: self.store,
            read: ticket,
        }
    }

    /// Entry behind a token of this store, if still retained.
    pub(crate) fn lookup(&self, token: &DerefToken) -> Option<&ReadEntry> {
        if token.store != self.store {
            return None;
        }
        self.reads.get(&token.read)
    }

    pub(crate) fn entry(&self, ticket: FetchTicket) -> Option<&ReadEntry> {
        self.reads.get(&ticket)
    }

    /// Opens a `Fetching` read of `side`.
    pub(crate) fn begin(&mut self, side: &SideKey) -> FetchTicket {
        let ticket = self.mint(side, ReadStatus::Fetching, None);
        self.in_flight.insert(side.clone(), ticket);
        ticket
    }

    /// Records a read answered from the cache.
    pub(crate) fn resolved(&mut self, side: &SideKey, value: Members) -> FetchTicket {
        let ticket = self.mint(side, ReadStatus::Resolved, Some(value));
        self.settle(ticket);
        ticket
    }

    fn mint(&mut self, side: &SideKey, status: ReadStatus, value: Option<Members>) -> FetchTicket {
        let ticket = FetchTicket(self.next_ticket);
        self.next_ticket += 1;
        self.reads.insert(
            ticket,
            ReadEntry {
                side: side.clone(),
                status,
                value,
                failure: None,
                waiters: Vec::new(),
            },
        );
        ticket
    }

    /// Queues `assignment` behind `ticket`, replacing any older deferred
    /// assignment of the same target side.
    pub(crate) fn defer(&mut self, ticket: FetchTicket, assignment: PendingAssignment) {
        self.cancel_deferred(&assignment.target);
        self.deferred.insert(assignment.target.clone(), ticket);
        if let Some(entry) = self.reads.get_mut(&ticket) {
            entry.waiters.push(assignment);
        }
    }

    /// Drops the deferred assignment targeting `side`, if any.
    pub(crate) fn cancel_deferred(&mut self, side: &SideKey) -> Option<FetchTicket> {
        let ticket = self.deferred.remove(side)?;
        if let Some(entry) = self.reads.get_mut(&ticket) {
            entry.waiters.retain(|waiter| waiter.target != *side);
        }
        debug!(
            "event=deferred_set_superseded module=fetch status=ok ticket={} field={}",
            ticket, side.field
        );
        Some(ticket)
    }

    /// Marks the in-flight read of `side` superseded.
    pub(crate) fn supersede(&mut self, side: &SideKey) -> Option<FetchTicket> {
        let ticket = self.in_flight.remove(side)?;
        self.drop_waiters(ticket);
        if let Some(entry) = self.reads.get_mut(&ticket) {
            entry.status = ReadStatus::Superseded;
        }
        self.settle(ticket);
        debug!(
            "event=read_superseded module=fetch status=ok ticket={} field={}",
            ticket, side.field
        );
        Some(ticket)
    }

    /// Resolves a fetching read; returns the assignments still authoritative.
    pub(crate) fn resolve(&mut self, ticket: FetchTicket, value: Members) -> Vec<PendingAssignment> {
        let Some(entry) = self.reads.get_mut(&ticket) else {
            return Vec::new();
        };
        if entry.status != ReadStatus::Fetching {
            return Vec::new();
        }
        entry.status = ReadStatus::Resolved;
        entry.value = Some(value);
        let side = entry.side.clone();
        let waiters = std::mem::take(&mut entry.waiters);
        if self.in_flight.get(&side) == Some(&ticket) {
            self.in_flight.remove(&side);
        }
        self.settle(ticket);

        waiters
            .into_iter()
            .filter(|waiter| {
                if self.deferred.get(&waiter.target) == Some(&ticket) {
                    self.deferred.remove(&waiter.target);
                    true
                } else {
                    false
                }
            })
            .collect()
    }

    /// Fails a fetching read and drops its assignments.
    pub(crate) fn fail(&mut self, ticket: FetchTicket, failure: FetchFailure) {
        self.drop_waiters(ticket);
        let Some(entry) = self.reads.get_mut(&ticket) else {
            return;
        };
        if entry.status != ReadStatus::Fetching {
            return;
        }
        entry.status = ReadStatus::Failed;
        entry.failure = Some(failure);
        let side = entry.side.clone();
        if self.in_flight.get(&side) == Some(&ticket) {
            self.in_flight.remove(&side);
        }
        self.settle(ticket);
    }

    /// Forgets reads and deferred assignments involving `record`'s sides.
    pub(crate) fn forget_record(&mut self, record: RecordLid) {
        let sides = self
            .in_flight
            .keys()
            .chain(self.deferred.keys())
            .filter(|side| side.record == record)
            .cloned()
            .collect::<Vec<_>>();
        for side in sides {
            self.supersede(&side);
            self.cancel_deferred(&side);
        }
    }

    fn drop_waiters(&mut self, ticket: FetchTicket) {
        let Some(entry) = self.reads.get_mut(&ticket) else {
            return;
        };
        for waiter in entry.waiters.drain(..) {
            if self.deferred.get(&waiter.target) == Some(&ticket) {
                self.deferred.remove(&waiter.target);
            }
        }
    }

    fn settle(&mut self, ticket: FetchTicket) {
        self.settled.push_back(ticket);
        while self.settled.len() > self.retain_settled {
            if let Some(evicted) = self.settled.pop_front() {
                self.reads.remove(&evicted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchCoordinator, PendingAssignment, ReadOutcome, ReadStatus};
    use crate::graph::state::{Members, SideKey};
    use crate::store::StoreId;
    use uuid::Uuid;

    fn assignment(target: &SideKey) -> PendingAssignment {
        PendingAssignment {
            target: target.clone(),
            model: "user".to_string(),
            initiator: target.record,
        }
    }

    #[test]
    fn newer_deferred_assignment_wins() {
        let mut coordinator = FetchCoordinator::new(StoreId::next(), 16);
        let first = coordinator.begin(&SideKey::new(Uuid::new_v4(), "bestFriend"));
        let second = coordinator.begin(&SideKey::new(Uuid::new_v4(), "bestFriend"));
        let target = SideKey::new(Uuid::new_v4(), "bestFriend");

        coordinator.defer(first, assignment(&target));
        coordinator.defer(second, assignment(&target));

        let value = Members::One(Some(Uuid::new_v4()));
        assert!(coordinator.resolve(first, value.clone()).is_empty());
        assert_eq!(coordinator.resolve(second, value).len(), 1);
        assert_eq!(coordinator.deferred_for(&target), None);
    }

    #[test]
    fn superseded_read_reports_superseded_and_frees_the_side() {
        let mut coordinator = FetchCoordinator::new(StoreId::next(), 16);
        let side = SideKey::new(Uuid::new_v4(), "bestFriend");
        let ticket = coordinator.begin(&side);
        let token = coordinator.token(ticket);

        assert_eq!(coordinator.supersede(&side), Some(ticket));
        assert_eq!(coordinator.in_flight(&side), None);
        let entry = coordinator.lookup(&token).expect("entry is retained");
        assert_eq!(entry.status, ReadStatus::Superseded);
        assert_eq!(entry.outcome(), ReadOutcome::Superseded);
        assert!(coordinator.resolve(ticket, Members::One(None)).is_empty());
    }

    #[test]
    fn settled_reads_are_evicted_oldest_first() {
        let mut coordinator = FetchCoordinator::new(StoreId::next(), 2);
        let side = SideKey::new(Uuid::new_v4(), "bestFriend");
        let first = coordinator.resolved(&side, Members::One(None));
        let second = coordinator.resolved(&side, Members::One(None));
        let third = coordinator.resolved(&side, Members::One(None));

        assert!(coordinator.entry(first).is_none());
        assert!(coordinator.entry(second).is_some());
        assert!(coordinator.entry(third).is_some());
    }

    #[test]
    fn tokens_from_another_store_are_unknown() {
        let mut ours = FetchCoordinator::new(StoreId::next(), 16);
        let mut theirs = FetchCoordinator::new(StoreId::next(), 16);
        let side = SideKey::new(Uuid::new_v4(), "bestFriend");
        ours.resolved(&side, Members::One(None));
        let ticket = theirs.resolved(&side, Members::One(None));
        let foreign = theirs.token(ticket);
        assert!(ours.lookup(&foreign).is_none());
    }
}
