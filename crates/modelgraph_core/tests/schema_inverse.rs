mod common;

use common::push_one;
use modelgraph_core::{
    ConfigError, InversePolicy, ModelDefinition, RelationshipOptions, Schema, SchemaError, Store,
    StoreConfig,
};
use serde_json::json;

fn tagged_models() -> Schema {
    Schema::builder()
        .model(ModelDefinition::new("tag"))
        .model(
            ModelDefinition::new("note")
                .attr("title")
                .belongs_to("tag", "tag", RelationshipOptions::sync()),
        )
        .build()
        .expect("one-sided schema should build")
}

#[test]
fn one_sided_edges_do_not_propagate() {
    let schema = tagged_models();
    assert_eq!(schema.inverse_of("note", "tag"), None);

    let mut store = Store::new(schema);
    let note = push_one(
        &mut store,
        json!({
            "data": {
                "type": "note",
                "id": "1",
                "relationships": { "tag": { "data": { "type": "tag", "id": "7" } } }
            },
            "included": [{ "type": "tag", "id": "7" }]
        }),
    );
    let tag = store.lid_for("tag", "7").expect("tag is cached");

    assert_eq!(store.peek_belongs_to(note, "tag").expect("peek"), Some(tag));
    assert_eq!(store.relationship(note, "tag").expect("view").inverse, None);
}

#[test]
fn config_policy_rejects_missing_inverses() {
    let config = StoreConfig::from_json_str(r#"{ "inverse_policy": "reject" }"#)
        .expect("config should parse");
    assert_eq!(config.inverse_policy, InversePolicy::Reject);

    let err = Schema::builder()
        .with_config(&config)
        .model(ModelDefinition::new("tag"))
        .model(ModelDefinition::new("note").belongs_to("tag", "tag", RelationshipOptions::sync()))
        .build()
        .expect_err("missing inverse must be rejected");
    assert!(matches!(err, SchemaError::MissingInverse { .. }));
}

#[test]
fn explicit_inverse_must_exist_on_the_target() {
    let err = Schema::builder()
        .model(ModelDefinition::new("tag").has_many("notes", "note", RelationshipOptions::sync()))
        .model(ModelDefinition::new("note").belongs_to(
            "tag",
            "tag",
            RelationshipOptions::sync().inverse("labels"),
        ))
        .build()
        .expect_err("labels is not declared on tag");
    assert!(matches!(err, SchemaError::InvalidInverse { .. }));
}

#[test]
fn registration_errors_are_reported() {
    let duplicate = Schema::builder()
        .model(ModelDefinition::new("tag"))
        .model(ModelDefinition::new("tag"))
        .build()
        .expect_err("duplicate model");
    assert_eq!(duplicate, SchemaError::DuplicateModel("tag".to_string()));

    let unknown = Schema::builder()
        .model(ModelDefinition::new("note").belongs_to("tag", "tag", RelationshipOptions::sync()))
        .build()
        .expect_err("unknown target");
    assert!(matches!(unknown, SchemaError::UnknownTarget { ref target, .. } if target == "tag"));

    let invalid = Schema::builder()
        .model(ModelDefinition::new("Bad Name"))
        .build()
        .expect_err("invalid model name");
    assert!(matches!(invalid, SchemaError::InvalidName { kind: "model", .. }));
}

#[test]
fn unknown_config_fields_are_rejected() {
    assert!(StoreConfig::from_json_str(r#"{ "retain_settled_reads": 8 }"#).is_ok());
    assert!(StoreConfig::from_json_str(r#"{ "retain_reads": 8 }"#).is_err());
    let zero = StoreConfig {
        notification_queue_limit: 0,
        ..StoreConfig::default()
    };
    assert!(Store::with_config(tagged_models(), zero).is_err());
}

#[test]
fn store_config_must_match_the_schema_policy() {
    let reject = StoreConfig {
        inverse_policy: InversePolicy::Reject,
        ..StoreConfig::default()
    };
    let err = Store::with_config(tagged_models(), reject.clone())
        .err()
        .expect("schema was built one-sided");
    assert!(matches!(err, ConfigError::Invalid(_)));

    let strict = Schema::builder()
        .with_config(&reject)
        .model(ModelDefinition::new("tag").has_many("notes", "note", RelationshipOptions::sync()))
        .model(ModelDefinition::new("note").belongs_to("tag", "tag", RelationshipOptions::sync()))
        .build()
        .expect("every edge has an inverse");
    assert_eq!(strict.inverse_policy(), InversePolicy::Reject);
    let store = Store::new(strict);
    assert_eq!(store.config().inverse_policy, InversePolicy::Reject);
}
