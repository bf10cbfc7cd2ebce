//! Per-side relationship state.
//!
//! # Invariants
//! - `canonical` and `local` always have the side's kind (`One` for
//!   belongs-to, `Many` for has-many).
//! - `has_local_override` is derived: `local != canonical`.

use crate::model::record::RecordLid;
use crate::schema::definition::{RelationshipDefinition, RelationshipKind};
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// One end of an edge: a relationship field on one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SideKey {
    pub record: RecordLid,
    pub field: String,
}

impl SideKey {
    pub fn new(record: RecordLid, field: impl Into<String>) -> Self {
        Self {
            record,
            field: field.into(),
        }
    }
}

impl Display for SideKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.record, self.field)
    }
}

/// Which view of a side an operation mutates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Server-confirmed state.
    Canonical,
    /// Effective state including uncommitted edits.
    Local,
}

impl Layer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::Local => "local",
        }
    }
}

/// Related records referenced by one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Members {
    One(Option<RecordLid>),
    Many(Vec<RecordLid>),
}

impl Members {
    pub fn empty(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::BelongsTo => Self::One(None),
            RelationshipKind::HasMany => Self::Many(Vec::new()),
        }
    }

    /// Builds members of `kind`; a belongs-to keeps the first lid only.
    pub fn from_lids(kind: RelationshipKind, lids: Vec<RecordLid>) -> Self {
        match kind {
            RelationshipKind::BelongsTo => Self::One(lids.into_iter().next()),
            RelationshipKind::HasMany => {
                let mut unique = Vec::with_capacity(lids.len());
                for lid in lids {
                    if !unique.contains(&lid) {
                        unique.push(lid);
                    }
                }
                Self::Many(unique)
            }
        }
    }

    pub fn kind(&self) -> RelationshipKind {
        match self {
            Self::One(_) => RelationshipKind::BelongsTo,
            Self::Many(_) => RelationshipKind::HasMany,
        }
    }

    pub fn as_slice(&self) -> &[RecordLid] {
        match self {
            Self::One(None) => &[],
            Self::One(Some(lid)) => std::slice::from_ref(lid),
            Self::Many(lids) => lids,
        }
    }

    /// The single related record of a belongs-to (first member otherwise).
    pub fn one(&self) -> Option<RecordLid> {
        self.as_slice().first().copied()
    }

    pub fn contains(&self, lid: &RecordLid) -> bool {
        self.as_slice().contains(lid)
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn with(&self, lid: RecordLid) -> Self {
        match self {
            Self::One(_) => Self::One(Some(lid)),
            Self::Many(lids) if lids.contains(&lid) => self.clone(),
            Self::Many(lids) => {
                let mut next = lids.clone();
                next.push(lid);
                Self::Many(next)
            }
        }
    }

    pub fn without(&self, lid: RecordLid) -> Self {
        match self {
            Self::One(Some(current)) if *current == lid => Self::One(None),
            Self::One(_) => self.clone(),
            Self::Many(lids) => Self::Many(lids.iter().copied().filter(|l| *l != lid).collect()),
        }
    }
}

/// Observable flags of one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RelationshipFlags {
    pub is_empty: bool,
    pub is_stale: bool,
    pub should_force_reload: bool,
    pub has_received_data: bool,
    pub has_local_override: bool,
}

/// Canonical and local state of one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipState {
    kind: RelationshipKind,
    target: String,
    inverse: Option<String>,
    is_async: bool,
    canonical: Members,
    local: Members,
    has_received_data: bool,
    /// Set by any local-layer write; the side's value is known even
    /// before a canonical payload arrives.
    has_local_data: bool,
    is_stale: bool,
    should_force_reload: bool,
    related_link: Option<String>,
}

impl RelationshipState {
    pub fn new(definition: &RelationshipDefinition, inverse: Option<String>) -> Self {
        Self {
            kind: definition.kind,
            target: definition.target.clone(),
            inverse,
            is_async: definition.is_async,
            canonical: Members::empty(definition.kind),
            local: Members::empty(definition.kind),
            has_received_data: false,
            has_local_data: false,
            is_stale: false,
            should_force_reload: false,
            related_link: None,
        }
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn inverse(&self) -> Option<&str> {
        self.inverse.as_deref()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn canonical(&self) -> &Members {
        &self.canonical
    }

    pub fn local(&self) -> &Members {
        &self.local
    }

    pub fn members(&self, layer: Layer) -> &Members {
        match layer {
            Layer::Canonical => &self.canonical,
            Layer::Local => &self.local,
        }
    }

    pub(crate) fn members_mut(&mut self, layer: Layer) -> &mut Members {
        match layer {
            Layer::Canonical => &mut self.canonical,
            Layer::Local => &mut self.local,
        }
    }

    pub fn related_link(&self) -> Option<&str> {
        self.related_link.as_deref()
    }

    pub fn has_received_data(&self) -> bool {
        self.has_received_data
    }

    /// Whether the side holds data from a payload or from a local edit.
    pub fn has_any_data(&self) -> bool {
        self.has_received_data || self.has_local_data
    }

    pub fn needs_reload(&self) -> bool {
        self.is_stale || self.should_force_reload
    }

    pub fn has_local_override(&self) -> bool {
        self.local != self.canonical
    }

    pub fn flags(&self) -> RelationshipFlags {
        RelationshipFlags {
            is_empty: self.local.is_empty(),
            is_stale: self.is_stale,
            should_force_reload: self.should_force_reload,
            has_received_data: self.has_received_data,
            has_local_override: self.has_local_override(),
        }
    }

    pub(crate) fn mark_received(&mut self) {
        self.has_received_data = true;
        self.is_stale = false;
        self.should_force_reload = false;
    }

    pub(crate) fn mark_local_data(&mut self) {
        self.has_local_data = true;
    }

    pub(crate) fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    pub(crate) fn mark_force_reload(&mut self) {
        self.should_force_reload = true;
    }

    pub(crate) fn set_related_link(&mut self, href: Option<String>) {
        if href.is_some() {
            self.related_link = href;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Members;
    use crate::schema::definition::RelationshipKind;
    use uuid::Uuid;

    #[test]
    fn belongs_to_members_replace_and_clear() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let members = Members::empty(RelationshipKind::BelongsTo).with(a);
        assert_eq!(members.one(), Some(a));
        assert_eq!(members.with(b).one(), Some(b));
        assert!(members.without(b).contains(&a));
        assert!(members.without(a).is_empty());
    }

    #[test]
    fn has_many_members_keep_order_without_duplicates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let members = Members::from_lids(RelationshipKind::HasMany, vec![a, b, a]);
        assert_eq!(members.as_slice(), &[a, b]);
        assert_eq!(members.with(a).len(), 2);
        assert_eq!(members.without(a).as_slice(), &[b]);
    }
}
