//! Model and relationship declarations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Closed set of relationship kinds.
///
/// `BelongsTo` is the one-side of an edge (one-to-one, or many-to-one when
/// the inverse is `HasMany`); `HasMany` is the many-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    BelongsTo,
    HasMany,
}

impl RelationshipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelongsTo => "belongs_to",
            Self::HasMany => "has_many",
        }
    }
}

impl Display for RelationshipKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the inverse of a relationship is determined.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverseSpec {
    /// Infer from the target model's relationships.
    #[default]
    Infer,
    /// Use the named field on the target model.
    Named(String),
    /// One-sided edge.
    None,
}

/// Declaration options for one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationshipOptions {
    pub is_async: bool,
    pub inverse: InverseSpec,
}

impl RelationshipOptions {
    /// Related records are always expected in the cache.
    pub fn sync() -> Self {
        Self::default()
    }

    /// Related records may be fetched lazily through the loader.
    pub fn lazy() -> Self {
        Self {
            is_async: true,
            inverse: InverseSpec::Infer,
        }
    }

    pub fn inverse(mut self, field: impl Into<String>) -> Self {
        self.inverse = InverseSpec::Named(field.into());
        self
    }

    pub fn no_inverse(mut self) -> Self {
        self.inverse = InverseSpec::None;
        self
    }
}

/// Static descriptor of one relationship field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    pub kind: RelationshipKind,
    /// Target model name.
    pub target: String,
    pub is_async: bool,
    pub inverse: InverseSpec,
}

/// Static descriptor of one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    pub attributes: BTreeSet<String>,
    pub relationships: BTreeMap<String, RelationshipDefinition>,
    /// Field names declared more than once; rejected at schema build.
    #[serde(skip)]
    pub(crate) duplicate_fields: Vec<String>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeSet::new(),
            relationships: BTreeMap::new(),
            duplicate_fields: Vec::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if self.relationships.contains_key(&name) || !self.attributes.insert(name.clone()) {
            self.duplicate_fields.push(name);
        }
        self
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: RelationshipOptions,
    ) -> Self {
        self.relationship(name.into(), RelationshipKind::BelongsTo, target.into(), options)
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        options: RelationshipOptions,
    ) -> Self {
        self.relationship(name.into(), RelationshipKind::HasMany, target.into(), options)
    }

    fn relationship(
        mut self,
        name: String,
        kind: RelationshipKind,
        target: String,
        options: RelationshipOptions,
    ) -> Self {
        if self.attributes.contains(&name) || self.relationships.contains_key(&name) {
            self.duplicate_fields.push(name);
            return self;
        }
        self.relationships.insert(
            name.clone(),
            RelationshipDefinition {
                name,
                kind,
                target,
                is_async: options.is_async,
                inverse: options.inverse,
            },
        );
        self
    }

    pub fn relationship_def(&self, name: &str) -> Option<&RelationshipDefinition> {
        self.relationships.get(name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }
}
