mod common;

use common::{blog_schema, doc, lid, push_one, ScriptedLoader};
use modelgraph_core::{LoaderReply, Members, NewRecord, ReadOutcome, Store, StoreError};
use serde_json::json;

fn post_with_two_comments(store: &mut Store) {
    store
        .push(doc(json!({
            "data": {
                "type": "post",
                "id": "1",
                "attributes": { "title": "Hello" },
                "relationships": {
                    "comments": { "data": [
                        { "type": "comment", "id": "1" },
                        { "type": "comment", "id": "2" }
                    ] }
                }
            },
            "included": [
                { "type": "comment", "id": "1", "attributes": { "body": "first" } },
                { "type": "comment", "id": "2", "attributes": { "body": "second" } }
            ]
        })))
        .expect("push post");
}

#[test]
fn pushed_members_point_back_to_their_owner() {
    let mut store = Store::new(blog_schema());
    post_with_two_comments(&mut store);
    let post = lid(&store, "post", "1");
    let first = lid(&store, "comment", "1");
    let second = lid(&store, "comment", "2");

    assert_eq!(
        store.peek_has_many(post, "comments").expect("peek"),
        vec![first, second]
    );
    assert_eq!(store.peek_belongs_to(first, "post").expect("peek"), Some(post));
    assert_eq!(store.peek_belongs_to(second, "post").expect("peek"), Some(post));
}

#[test]
fn setting_the_belongs_to_side_appends_to_the_owner() {
    let mut store = Store::new(blog_schema());
    post_with_two_comments(&mut store);
    let post = lid(&store, "post", "1");
    let third = push_one(&mut store, json!({ "data": { "type": "comment", "id": "3" } }));

    store.set_belongs_to(third, "post", Some(post)).expect("set post");

    let members = store.peek_has_many(post, "comments").expect("peek");
    assert_eq!(members.len(), 3);
    assert_eq!(members.last().copied(), Some(third));
}

#[test]
fn moving_a_member_between_owners_removes_it_from_the_old_one() {
    let mut store = Store::new(blog_schema());
    post_with_two_comments(&mut store);
    let post = lid(&store, "post", "1");
    let first = lid(&store, "comment", "1");
    let second = lid(&store, "comment", "2");
    let other = push_one(&mut store, json!({ "data": { "type": "post", "id": "2" } }));

    store
        .add_to_has_many(other, "comments", first)
        .expect("add to other post");

    assert_eq!(store.peek_has_many(post, "comments").expect("peek"), vec![second]);
    assert_eq!(store.peek_has_many(other, "comments").expect("peek"), vec![first]);
    assert_eq!(store.peek_belongs_to(first, "post").expect("peek"), Some(other));

    store.rollback(other).expect("rollback");
    assert_eq!(
        store.peek_has_many(post, "comments").expect("peek"),
        vec![first, second]
    );
    assert!(store.peek_has_many(other, "comments").expect("peek").is_empty());
}

#[test]
fn replacing_members_severs_the_dropped_ones() {
    let mut store = Store::new(blog_schema());
    post_with_two_comments(&mut store);
    let post = lid(&store, "post", "1");
    let first = lid(&store, "comment", "1");
    let second = lid(&store, "comment", "2");

    store
        .set_has_many(post, "comments", vec![second])
        .expect("replace members");
    assert_eq!(store.peek_belongs_to(first, "post").expect("peek"), None);
    assert_eq!(store.peek_belongs_to(second, "post").expect("peek"), Some(post));

    store
        .remove_from_has_many(post, "comments", second)
        .expect("remove member");
    assert_eq!(store.peek_belongs_to(second, "post").expect("peek"), None);
    assert!(store.peek_has_many(post, "comments").expect("peek").is_empty());

    store.commit(post).expect("commit");
    assert!(!store.is_dirty(post).expect("dirty"));
    assert!(!store.is_dirty(first).expect("dirty"));
    let view = store.relationship(first, "post").expect("view");
    assert_eq!(view.canonical, Members::One(None));
}

#[test]
fn canonical_push_keeps_local_additions() {
    let mut store = Store::new(blog_schema());
    post_with_two_comments(&mut store);
    let post = lid(&store, "post", "1");
    let first = lid(&store, "comment", "1");
    let second = lid(&store, "comment", "2");
    let draft = store
        .create_record("comment", NewRecord::new().attr("body", "draft"))
        .expect("create draft");
    store.add_to_has_many(post, "comments", draft).expect("add draft");

    store
        .push(doc(json!({
            "data": {
                "type": "post",
                "id": "1",
                "relationships": { "comments": { "data": [{ "type": "comment", "id": "1" }] } }
            }
        })))
        .expect("push trimmed post");

    assert_eq!(
        store.peek_has_many(post, "comments").expect("peek"),
        vec![first, draft]
    );
    assert_eq!(store.peek_belongs_to(second, "post").expect("peek"), None);
    assert_eq!(store.peek_belongs_to(draft, "post").expect("peek"), Some(post));
    let view = store.relationship(post, "comments").expect("view");
    assert_eq!(view.canonical, Members::Many(vec![first]));
}

#[test]
fn lazy_has_many_is_fetched_through_its_link() {
    let loader = ScriptedLoader::new();
    loader.reply(
        "1",
        "comments",
        LoaderReply::Ready(Ok(Some(doc(json!({
            "data": [
                { "type": "comment", "id": "1", "attributes": { "body": "first" } },
                { "type": "comment", "id": "2", "attributes": { "body": "second" } }
            ]
        }))))),
    );
    let mut store = Store::new(blog_schema()).with_loader(loader.clone());
    let post = push_one(
        &mut store,
        json!({
            "data": {
                "type": "post",
                "id": "1",
                "relationships": { "comments": { "links": { "related": "/posts/1/comments" } } }
            }
        }),
    );
    assert!(store.peek_has_many(post, "comments").expect("peek").is_empty());

    let token = store.read(post, "comments").expect("read comments");

    let first = lid(&store, "comment", "1");
    let second = lid(&store, "comment", "2");
    assert_eq!(
        store.poll_read(&token).expect("poll"),
        ReadOutcome::Ready(Members::Many(vec![first, second]))
    );
    assert_eq!(store.peek_belongs_to(second, "post").expect("peek"), Some(post));
    let requests = loader.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].related_link.as_deref(), Some("/posts/1/comments"));

    store.read(post, "comments").expect("second read");
    assert_eq!(loader.requests().len(), 1);
}

#[test]
fn kind_and_type_mismatches_are_rejected() {
    let mut store = Store::new(blog_schema());
    post_with_two_comments(&mut store);
    let post = lid(&store, "post", "1");
    let other = push_one(&mut store, json!({ "data": { "type": "post", "id": "2" } }));

    let err = store
        .set_has_many(post, "comments", vec![other])
        .expect_err("a post is not a comment");
    assert!(matches!(err, StoreError::TypeMismatch { .. }));

    let err = store
        .set_belongs_to(post, "comments", None)
        .expect_err("comments is has-many");
    assert!(matches!(err, StoreError::KindMismatch { .. }));

    let err = store
        .push(doc(json!({
            "data": {
                "type": "post",
                "id": "1",
                "relationships": { "comments": { "data": { "type": "comment", "id": "9" } } }
            }
        })))
        .expect_err("has-many linkage must be a list");
    assert!(matches!(err, StoreError::KindMismatch { .. }));
    assert_eq!(store.lid_for("comment", "9"), None);
}
