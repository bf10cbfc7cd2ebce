//! Schema registration and inverse resolution.
//!
//! # Responsibility
//! - Register model definitions once, validate names and targets.
//! - Resolve every relationship's inverse at build time.
//!
//! # Invariants
//! - A built `Schema` is immutable; lookups never re-resolve inverses.
//! - Ambiguous or non-mutual inverse pairs fail the build.

pub mod definition;
mod inverse;

use crate::config::StoreConfig;
use crate::schema::definition::{ModelDefinition, RelationshipDefinition};
use crate::schema::inverse::{resolve_inverses, InverseTable};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][A-Za-z0-9_-]*$").expect("valid model name regex"));
static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][A-Za-z0-9_]*$").expect("valid field name regex"));

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Behavior when inverse inference finds no candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InversePolicy {
    /// Keep the edge one-sided (updates do not propagate).
    #[default]
    OneSided,
    /// Fail the schema build with `MissingInverse`.
    Reject,
}

/// Schema registration errors. All of them are fatal at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidName {
        kind: &'static str,
        name: String,
    },
    DuplicateModel(String),
    DuplicateField {
        model: String,
        field: String,
    },
    UnknownTarget {
        model: String,
        field: String,
        target: String,
    },
    InvalidInverse {
        model: String,
        field: String,
        inverse: String,
        reason: &'static str,
    },
    AmbiguousInverse {
        model: String,
        field: String,
        candidates: Vec<String>,
    },
    MissingInverse {
        model: String,
        field: String,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName { kind, name } => write!(f, "invalid {kind} name: `{name}`"),
            Self::DuplicateModel(name) => write!(f, "model already registered: {name}"),
            Self::DuplicateField { model, field } => {
                write!(f, "field declared twice on {model}: {field}")
            }
            Self::UnknownTarget {
                model,
                field,
                target,
            } => write!(f, "{model}.{field} targets unregistered model `{target}`"),
            Self::InvalidInverse {
                model,
                field,
                inverse,
                reason,
            } => write!(f, "{model}.{field} has invalid inverse `{inverse}`: {reason}"),
            Self::AmbiguousInverse {
                model,
                field,
                candidates,
            } => write!(
                f,
                "{model}.{field} has ambiguous inverse; candidates: {}",
                candidates.join(", ")
            ),
            Self::MissingInverse { model, field } => {
                write!(f, "{model}.{field} has no inverse candidate")
            }
        }
    }
}

impl Error for SchemaError {}

/// Immutable, resolved schema.
#[derive(Debug, Clone)]
pub struct Schema {
    models: BTreeMap<String, ModelDefinition>,
    inverses: InverseTable,
    policy: InversePolicy,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    /// Policy the inverses were resolved under.
    pub fn inverse_policy(&self) -> InversePolicy {
        self.policy
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn relationship(&self, model: &str, field: &str) -> Option<&RelationshipDefinition> {
        self.models.get(model)?.relationship_def(field)
    }

    /// Returns the resolved inverse field, `None` for one-sided edges.
    pub fn inverse_of(&self, model: &str, field: &str) -> Option<&str> {
        self.inverses
            .get(&(model.to_string(), field.to_string()))?
            .as_deref()
    }

    pub fn relationships_of(&self, model: &str) -> impl Iterator<Item = &RelationshipDefinition> {
        self.models
            .get(model)
            .into_iter()
            .flat_map(|definition| definition.relationships.values())
    }
}

/// Collects model definitions and builds a resolved `Schema`.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    models: Vec<ModelDefinition>,
    policy: InversePolicy,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, definition: ModelDefinition) -> Self {
        self.models.push(definition);
        self
    }

    pub fn inverse_policy(mut self, policy: InversePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_config(self, config: &StoreConfig) -> Self {
        self.inverse_policy(config.inverse_policy)
    }

    /// Validates declarations and resolves inverses.
    ///
    /// # Errors
    /// - Names that do not match the model/field patterns.
    /// - Duplicate models or fields, unknown targets.
    /// - Invalid, ambiguous or (under `InversePolicy::Reject`) missing inverses.
    pub fn build(self) -> SchemaResult<Schema> {
        let mut models = BTreeMap::new();
        for definition in self.models {
            validate_definition(&definition)?;
            if models.contains_key(&definition.name) {
                return Err(SchemaError::DuplicateModel(definition.name));
            }
            models.insert(definition.name.clone(), definition);
        }

        let inverses = resolve_inverses(&models, self.policy)?;
        info!(
            "event=schema_built module=schema status=ok models={} relationships={}",
            models.len(),
            inverses.len()
        );
        Ok(Schema {
            models,
            inverses,
            policy: self.policy,
        })
    }
}

fn validate_definition(definition: &ModelDefinition) -> SchemaResult<()> {
    if !MODEL_NAME_RE.is_match(&definition.name) {
        return Err(SchemaError::InvalidName {
            kind: "model",
            name: definition.name.clone(),
        });
    }
    if let Some(field) = definition.duplicate_fields.first() {
        return Err(SchemaError::DuplicateField {
            model: definition.name.clone(),
            field: field.clone(),
        });
    }
    let fields = definition
        .attributes
        .iter()
        .chain(definition.relationships.keys());
    for field in fields {
        if !FIELD_NAME_RE.is_match(field) {
            return Err(SchemaError::InvalidName {
                kind: "field",
                name: field.clone(),
            });
        }
    }
    Ok(())
}
