#![allow(dead_code)]

use modelgraph_core::{
    Document, FetchRequest, Loader, LoaderReply, ModelDefinition, Persistence, PersistenceError,
    RecordLid, RecordSnapshot, RelationshipOptions, Schema, Store,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// `user.bestFriend` (async, reflexive) and `user.job` <-> `job.user` (sync).
pub fn friends_schema() -> Schema {
    Schema::builder()
        .model(
            ModelDefinition::new("user")
                .attr("name")
                .belongs_to(
                    "bestFriend",
                    "user",
                    RelationshipOptions::lazy().inverse("bestFriend"),
                )
                .belongs_to("job", "job", RelationshipOptions::sync()),
        )
        .model(
            ModelDefinition::new("job")
                .attr("name")
                .attr("isGood")
                .belongs_to("user", "user", RelationshipOptions::sync()),
        )
        .build()
        .expect("friends schema should build")
}

/// `post.comments` (async has-many) <-> `comment.post` (sync belongs-to).
pub fn blog_schema() -> Schema {
    Schema::builder()
        .model(
            ModelDefinition::new("post")
                .attr("title")
                .has_many("comments", "comment", RelationshipOptions::lazy()),
        )
        .model(
            ModelDefinition::new("comment")
                .attr("body")
                .belongs_to("post", "post", RelationshipOptions::sync()),
        )
        .build()
        .expect("blog schema should build")
}

pub fn people_schema() -> Schema {
    Schema::builder()
        .model(ModelDefinition::new("person").attr("name"))
        .build()
        .expect("people schema should build")
}

pub fn doc(value: Value) -> Document {
    serde_json::from_value(value).expect("fixture document should decode")
}

pub fn push_one(store: &mut Store, value: Value) -> RecordLid {
    let lids = store.push(doc(value)).expect("push should succeed");
    lids.first().copied().expect("push should return the primary record")
}

pub fn lid(store: &Store, model: &str, id: &str) -> RecordLid {
    store
        .lid_for(model, id)
        .unwrap_or_else(|| panic!("{model}:{id} should be cached"))
}

pub fn name_of(store: &Store, lid: RecordLid) -> Option<String> {
    store
        .record(lid)
        .expect("record should exist")
        .attribute("name")
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

#[derive(Default)]
struct LoaderState {
    replies: HashMap<(String, String), LoaderReply>,
    requests: Vec<FetchRequest>,
}

/// Loader answering from a script keyed by `(owner id, relationship)`.
/// Unscripted requests are deferred.
#[derive(Clone, Default)]
pub struct ScriptedLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, owner_id: &str, relationship: &str, reply: LoaderReply) {
        self.state
            .lock()
            .expect("loader state lock")
            .replies
            .insert((owner_id.to_string(), relationship.to_string()), reply);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.state.lock().expect("loader state lock").requests.clone()
    }
}

impl Loader for ScriptedLoader {
    fn fetch_related(&mut self, request: &FetchRequest) -> LoaderReply {
        let mut state = self.state.lock().expect("loader state lock");
        state.requests.push(request.clone());
        let key = (
            request.owner.id.clone().unwrap_or_default(),
            request.relationship.clone(),
        );
        state
            .replies
            .get(&key)
            .cloned()
            .unwrap_or(LoaderReply::Deferred)
    }
}

#[derive(Default)]
struct PersistenceState {
    responses: VecDeque<Result<Option<Document>, PersistenceError>>,
    saved: Vec<RecordSnapshot>,
}

/// Persistence answering queued responses; `Ok(None)` once the queue is empty.
#[derive(Clone, Default)]
pub struct ScriptedPersistence {
    state: Arc<Mutex<PersistenceState>>,
}

impl ScriptedPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, response: Result<Option<Document>, PersistenceError>) {
        self.state
            .lock()
            .expect("persistence state lock")
            .responses
            .push_back(response);
    }

    pub fn saved(&self) -> Vec<RecordSnapshot> {
        self.state.lock().expect("persistence state lock").saved.clone()
    }
}

impl Persistence for ScriptedPersistence {
    fn save(&mut self, snapshot: &RecordSnapshot) -> Result<Option<Document>, PersistenceError> {
        let mut state = self.state.lock().expect("persistence state lock");
        state.saved.push(snapshot.clone());
        state.responses.pop_front().unwrap_or(Ok(None))
    }
}
