//! Inverse relationship resolution.
//!
//! # Responsibility
//! - Pair every relationship with the field that mirrors it on the target.
//! - Reject schemas whose pairing is ambiguous or not mutual.
//!
//! # Invariants
//! - Runs once per schema build; the result is immutable afterwards.
//! - A resolved pair is mutual: `inverse(inverse(side)) == side`.

use crate::schema::definition::{InverseSpec, ModelDefinition, RelationshipDefinition};
use crate::schema::{InversePolicy, SchemaError, SchemaResult};
use log::debug;
use std::collections::BTreeMap;

/// `(model, field) -> inverse field` (None = one-sided).
pub(crate) type InverseTable = BTreeMap<(String, String), Option<String>>;

pub(crate) fn resolve_inverses(
    models: &BTreeMap<String, ModelDefinition>,
    policy: InversePolicy,
) -> SchemaResult<InverseTable> {
    let mut table = InverseTable::new();
    for model in models.values() {
        for relationship in model.relationships.values() {
            let inverse = resolve_one(models, model, relationship, policy)?;
            debug!(
                "event=inverse_resolved module=schema status=ok model={} field={} inverse={}",
                model.name,
                relationship.name,
                inverse.as_deref().unwrap_or("none")
            );
            table.insert((model.name.clone(), relationship.name.clone()), inverse);
        }
    }
    ensure_mutual(models, &table)?;
    Ok(table)
}

fn resolve_one(
    models: &BTreeMap<String, ModelDefinition>,
    owner: &ModelDefinition,
    relationship: &RelationshipDefinition,
    policy: InversePolicy,
) -> SchemaResult<Option<String>> {
    let target = models
        .get(&relationship.target)
        .ok_or_else(|| SchemaError::UnknownTarget {
            model: owner.name.clone(),
            field: relationship.name.clone(),
            target: relationship.target.clone(),
        })?;

    match &relationship.inverse {
        InverseSpec::None => Ok(None),
        InverseSpec::Named(name) => {
            let inverse = target
                .relationship_def(name)
                .ok_or_else(|| SchemaError::InvalidInverse {
                    model: owner.name.clone(),
                    field: relationship.name.clone(),
                    inverse: name.clone(),
                    reason: "inverse is not declared on the target model",
                })?;
            if inverse.target != owner.name {
                return Err(SchemaError::InvalidInverse {
                    model: owner.name.clone(),
                    field: relationship.name.clone(),
                    inverse: name.clone(),
                    reason: "inverse does not point back at this model",
                });
            }
            Ok(Some(name.clone()))
        }
        InverseSpec::Infer => {
            let candidates = inverse_candidates(owner, relationship, target);
            match candidates.as_slice() {
                [] => match policy {
                    InversePolicy::OneSided => Ok(None),
                    InversePolicy::Reject => Err(SchemaError::MissingInverse {
                        model: owner.name.clone(),
                        field: relationship.name.clone(),
                    }),
                },
                [only] => Ok(Some(only.name.clone())),
                several => {
                    // A candidate naming this field explicitly is canonical.
                    let named_back = several
                        .iter()
                        .filter(|candidate| {
                            candidate.inverse == InverseSpec::Named(relationship.name.clone())
                        })
                        .collect::<Vec<_>>();
                    if let [canonical] = named_back.as_slice() {
                        return Ok(Some(canonical.name.clone()));
                    }
                    Err(SchemaError::AmbiguousInverse {
                        model: owner.name.clone(),
                        field: relationship.name.clone(),
                        candidates: several.iter().map(|c| c.name.clone()).collect(),
                    })
                }
            }
        }
    }
}

fn inverse_candidates<'a>(
    owner: &ModelDefinition,
    relationship: &RelationshipDefinition,
    target: &'a ModelDefinition,
) -> Vec<&'a RelationshipDefinition> {
    target
        .relationships
        .values()
        .filter(|candidate| candidate.target == owner.name)
        // A reflexive self-inverse must be declared explicitly.
        .filter(|candidate| !(target.name == owner.name && candidate.name == relationship.name))
        .filter(|candidate| match &candidate.inverse {
            InverseSpec::Infer => true,
            InverseSpec::Named(name) => *name == relationship.name,
            InverseSpec::None => false,
        })
        .collect()
}

fn ensure_mutual(
    models: &BTreeMap<String, ModelDefinition>,
    table: &InverseTable,
) -> SchemaResult<()> {
    for ((model, field), inverse) in table {
        let Some(inverse) = inverse else {
            continue;
        };
        let target = models
            .get(model)
            .and_then(|definition| definition.relationship_def(field))
            .map(|definition| definition.target.clone())
            .unwrap_or_default();
        let back = table.get(&(target, inverse.clone())).cloned().flatten();
        if back.as_deref() != Some(field.as_str()) {
            return Err(SchemaError::InvalidInverse {
                model: model.clone(),
                field: field.clone(),
                inverse: inverse.clone(),
                reason: "inverse is not mutual",
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::resolve_inverses;
    use crate::schema::definition::{ModelDefinition, RelationshipOptions};
    use crate::schema::{InversePolicy, SchemaError};
    use std::collections::BTreeMap;

    fn models(definitions: Vec<ModelDefinition>) -> BTreeMap<String, ModelDefinition> {
        definitions
            .into_iter()
            .map(|definition| (definition.name.clone(), definition))
            .collect()
    }

    #[test]
    fn infers_single_candidate_both_ways() {
        let table = resolve_inverses(
            &models(vec![
                ModelDefinition::new("user").belongs_to("job", "job", RelationshipOptions::sync()),
                ModelDefinition::new("job").belongs_to("user", "user", RelationshipOptions::sync()),
            ]),
            InversePolicy::OneSided,
        )
        .expect("schema should resolve");

        assert_eq!(
            table[&("user".to_string(), "job".to_string())].as_deref(),
            Some("user")
        );
        assert_eq!(
            table[&("job".to_string(), "user".to_string())].as_deref(),
            Some("job")
        );
    }

    #[test]
    fn candidate_naming_the_field_breaks_ambiguity() {
        let table = resolve_inverses(
            &models(vec![
                ModelDefinition::new("post")
                    .belongs_to("author", "user", RelationshipOptions::sync())
                    .belongs_to("reviewer", "user", RelationshipOptions::sync().inverse("drafts")),
                ModelDefinition::new("user")
                    .has_many("posts", "post", RelationshipOptions::sync().inverse("author"))
                    .has_many("drafts", "post", RelationshipOptions::sync()),
            ]),
            InversePolicy::OneSided,
        )
        .expect("schema should resolve");

        assert_eq!(
            table[&("post".to_string(), "author".to_string())].as_deref(),
            Some("posts")
        );
        assert_eq!(
            table[&("user".to_string(), "drafts".to_string())].as_deref(),
            Some("reviewer")
        );
    }

    #[test]
    fn reports_ambiguous_candidates() {
        let err = resolve_inverses(
            &models(vec![
                ModelDefinition::new("post").belongs_to("author", "user", RelationshipOptions::sync()),
                ModelDefinition::new("user")
                    .has_many("posts", "post", RelationshipOptions::sync())
                    .has_many("drafts", "post", RelationshipOptions::sync()),
            ]),
            InversePolicy::OneSided,
        )
        .expect_err("two candidates must be ambiguous");

        assert!(matches!(
            err,
            SchemaError::AmbiguousInverse { ref candidates, .. } if candidates.len() == 2
        ));
    }

    #[test]
    fn zero_candidates_follow_policy() {
        let definitions = models(vec![
            ModelDefinition::new("comment").belongs_to("post", "post", RelationshipOptions::sync()),
            ModelDefinition::new("post"),
        ]);

        let table = resolve_inverses(&definitions, InversePolicy::OneSided)
            .expect("one-sided policy should accept");
        assert_eq!(table[&("comment".to_string(), "post".to_string())], None);

        let err = resolve_inverses(&definitions, InversePolicy::Reject)
            .expect_err("reject policy should fail");
        assert!(matches!(err, SchemaError::MissingInverse { .. }));
    }

    #[test]
    fn reflexive_inverse_must_be_explicit() {
        let implicit = resolve_inverses(
            &models(vec![ModelDefinition::new("user").belongs_to(
                "bestFriend",
                "user",
                RelationshipOptions::lazy(),
            )]),
            InversePolicy::OneSided,
        )
        .expect("implicit reflexive relationship is one-sided");
        assert_eq!(
            implicit[&("user".to_string(), "bestFriend".to_string())],
            None
        );

        let explicit = resolve_inverses(
            &models(vec![ModelDefinition::new("user").belongs_to(
                "bestFriend",
                "user",
                RelationshipOptions::lazy().inverse("bestFriend"),
            )]),
            InversePolicy::OneSided,
        )
        .expect("explicit reflexive relationship resolves");
        assert_eq!(
            explicit[&("user".to_string(), "bestFriend".to_string())].as_deref(),
            Some("bestFriend")
        );
    }

    #[test]
    fn rejects_non_mutual_explicit_inverse() {
        let err = resolve_inverses(
            &models(vec![
                ModelDefinition::new("user")
                    .belongs_to("job", "job", RelationshipOptions::sync().inverse("owner"))
                    .belongs_to("managedJob", "job", RelationshipOptions::sync().no_inverse()),
                ModelDefinition::new("job")
                    .belongs_to("owner", "user", RelationshipOptions::sync().inverse("managedJob")),
            ]),
            InversePolicy::OneSided,
        )
        .expect_err("pairs must be mutual");
        assert!(matches!(err, SchemaError::InvalidInverse { .. }));
    }
}
