mod common;

use common::{doc, name_of, people_schema, push_one, ScriptedPersistence};
use modelgraph_core::{
    NewRecord, Notification, NotificationFilter, NotificationKind, PersistenceError, RecordStatus,
    Store, StoreError,
};
use serde_json::json;

#[test]
fn created_event_fires_once_after_the_payload_assigns_an_id() {
    let persistence = ScriptedPersistence::new();
    persistence.respond(Ok(Some(doc(json!({
        "data": { "type": "person", "id": 99, "attributes": { "name": "Yehuda Katz" } }
    })))));
    let mut store = Store::new(people_schema()).with_persistence(persistence.clone());
    let created = store.subscribe(NotificationFilter::kinds([NotificationKind::RecordCreated]));

    let person = store
        .create_record("person", NewRecord::new().attr("name", "Yehuda Katz"))
        .expect("create person");
    assert!(store.drain(&created).is_empty());

    store.save(person).expect("save person");

    assert_eq!(
        store.drain(&created),
        vec![Notification::RecordCreated { record: person }]
    );
    let record = store.record(person).expect("person");
    assert_eq!(record.id(), Some("99"));
    assert_eq!(record.status(), RecordStatus::Loaded);
    assert_eq!(name_of(&store, person).as_deref(), Some("Yehuda Katz"));
    assert_eq!(store.lid_for("person", "99"), Some(person));
    assert!(!store.is_dirty(person).expect("dirty"));

    let saved = persistence.saved();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].identity.id, None);
    assert_eq!(saved[0].status, RecordStatus::New);
}

#[test]
fn created_event_fires_once_without_a_payload() {
    let persistence = ScriptedPersistence::new();
    let mut store = Store::new(people_schema()).with_persistence(persistence.clone());
    let created = store.subscribe(NotificationFilter::kinds([NotificationKind::RecordCreated]));

    let person = store
        .create_record("person", NewRecord::new().id("99").attr("name", "Yehuda Katz"))
        .expect("create person");
    store.save(person).expect("save person");

    assert_eq!(
        store.drain(&created),
        vec![Notification::RecordCreated { record: person }]
    );
    assert_eq!(store.record(person).expect("person").id(), Some("99"));
    assert_eq!(name_of(&store, person).as_deref(), Some("Yehuda Katz"));
    assert_eq!(persistence.saved()[0].identity.id.as_deref(), Some("99"));
}

#[test]
fn new_record_without_any_id_cannot_be_saved_silently() {
    let mut store = Store::new(people_schema()).with_persistence(ScriptedPersistence::new());
    let person = store
        .create_record("person", NewRecord::new())
        .expect("create person");

    let err = store.save(person).expect_err("no id anywhere");
    assert!(matches!(err, StoreError::InvalidPayload(_)));
    assert!(store.record(person).expect("person").is_new());
}

#[test]
fn failed_save_keeps_the_record_dirty() {
    let persistence = ScriptedPersistence::new();
    persistence.respond(Err(PersistenceError::Rejected("name taken".to_string())));
    let mut store = Store::new(people_schema()).with_persistence(persistence);
    let person = push_one(
        &mut store,
        json!({ "data": { "type": "person", "id": "1", "attributes": { "name": "Tom" } } }),
    );
    store
        .set_attribute(person, "name", "Tomster")
        .expect("edit name");

    let err = store.save(person).expect_err("save rejected");
    assert!(matches!(err, StoreError::SaveFailed(_)));
    assert!(store.is_dirty(person).expect("dirty"));
    assert_eq!(name_of(&store, person).as_deref(), Some("Tomster"));

    store.rollback(person).expect("rollback");
    assert_eq!(name_of(&store, person).as_deref(), Some("Tom"));
    assert!(!store.is_dirty(person).expect("dirty"));
}

#[test]
fn saving_an_update_announces_it() {
    let mut store = Store::new(people_schema()).with_persistence(ScriptedPersistence::new());
    let person = push_one(
        &mut store,
        json!({ "data": { "type": "person", "id": "1", "attributes": { "name": "Tom" } } }),
    );
    let updates = store.subscribe(NotificationFilter::kinds([NotificationKind::RecordUpdated]));
    store
        .set_attribute(person, "name", "Tomster")
        .expect("edit name");

    store.save(person).expect("save");

    assert_eq!(
        store.drain(&updates),
        vec![Notification::RecordUpdated { record: person }]
    );
    assert!(!store.is_dirty(person).expect("dirty"));
}

#[test]
fn saving_a_delete_unloads_the_record() {
    let persistence = ScriptedPersistence::new();
    let mut store = Store::new(people_schema()).with_persistence(persistence.clone());
    let person = push_one(&mut store, json!({ "data": { "type": "person", "id": "1" } }));
    let deleted = store.subscribe(NotificationFilter::kinds([NotificationKind::RecordDeleted]));

    store.delete_record(person).expect("delete");
    store.save(person).expect("save delete");

    assert_eq!(
        store.drain(&deleted),
        vec![Notification::RecordDeleted { record: person }]
    );
    assert_eq!(persistence.saved()[0].status, RecordStatus::Deleted);
    assert!(matches!(
        store.record(person),
        Err(StoreError::UnknownRecord(_))
    ));
    assert_eq!(store.lid_for("person", "1"), None);
}

#[test]
fn operations_on_discarded_records_are_rejected() {
    let mut store = Store::new(people_schema()).with_persistence(ScriptedPersistence::new());
    let person = store
        .create_record("person", NewRecord::new().id("5"))
        .expect("create person");
    store.rollback(person).expect("rollback");

    assert_eq!(store.record(person).expect("person").status(), RecordStatus::Discarded);
    assert_eq!(store.lid_for("person", "5"), None);
    assert!(matches!(
        store.save(person),
        Err(StoreError::InvalidState { .. })
    ));
    assert!(matches!(
        store.set_attribute(person, "name", "ghost"),
        Err(StoreError::InvalidState { .. })
    ));
    store.rollback(person).expect("second rollback is a no-op");
}

#[test]
fn assigning_a_taken_id_is_a_conflict() {
    let mut store = Store::new(people_schema());
    let existing = push_one(&mut store, json!({ "data": { "type": "person", "id": "1" } }));
    let person = store
        .create_record("person", NewRecord::new())
        .expect("create person");

    let err = store.assign_id(person, "1").expect_err("id 1 is taken");
    assert!(matches!(
        err,
        StoreError::IdentityConflict { existing: bound, .. } if bound == existing
    ));

    store.assign_id(person, "2").expect("free id");
    store.assign_id(person, "2").expect("same id again");
    assert_eq!(store.lid_for("person", "2"), Some(person));
    assert!(matches!(
        store.assign_id(person, "3"),
        Err(StoreError::IdentityConflict { .. })
    ));
}

#[test]
fn unknown_attributes_are_rejected() {
    let mut store = Store::new(people_schema());
    let err = store
        .create_record("person", NewRecord::new().attr("age", 3_i64))
        .expect_err("age is not declared");
    assert!(matches!(err, StoreError::UnknownAttribute { .. }));

    let err = store
        .create_record("robot", NewRecord::new())
        .expect_err("robot is not a model");
    assert!(matches!(err, StoreError::UnknownType(_)));
}
