//! Already-parsed resource payloads consumed by push/fetch/save.
//!
//! # Responsibility
//! - Describe resources, resource references and relationship linkage.
//! - Keep "key absent" distinct from "explicitly empty" linkage.
//!
//! # Invariants
//! - `RelationshipPayload::data == None` means no information.
//! - `Some(RelationshipData::Null)` and `Some(RelationshipData::Many(vec![]))`
//!   mean the relationship is known to be empty.

use crate::model::record::{AttrValue, Attributes};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// `(type, id)` reference to one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub model: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

impl ResourceRef {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
        }
    }
}

impl Display for ResourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.model, self.id)
    }
}

/// Relationship linkage carried by a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipData {
    /// Explicit `null`.
    Null,
    One(ResourceRef),
    Many(Vec<ResourceRef>),
}

impl RelationshipData {
    pub fn refs(&self) -> &[ResourceRef] {
        match self {
            Self::Null => &[],
            Self::One(reference) => std::slice::from_ref(reference),
            Self::Many(references) => references,
        }
    }
}

/// Links advertised for one relationship.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationshipLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
}

/// One `relationships.<name>` entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelationshipPayload {
    #[serde(
        default,
        deserialize_with = "deserialize_linkage",
        serialize_with = "serialize_linkage",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<RelationshipData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<RelationshipLinks>,
}

/// One resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub model: String,
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub relationships: BTreeMap<String, RelationshipPayload>,
}

impl Resource {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            id: id.into(),
            attributes: Attributes::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef::new(self.model.clone(), self.id.clone())
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_belongs_to(mut self, name: impl Into<String>, related: Option<ResourceRef>) -> Self {
        let data = match related {
            Some(reference) => RelationshipData::One(reference),
            None => RelationshipData::Null,
        };
        self.relationships.insert(
            name.into(),
            RelationshipPayload {
                data: Some(data),
                links: None,
            },
        );
        self
    }

    pub fn with_has_many(mut self, name: impl Into<String>, related: Vec<ResourceRef>) -> Self {
        self.relationships.insert(
            name.into(),
            RelationshipPayload {
                data: Some(RelationshipData::Many(related)),
                links: None,
            },
        );
        self
    }

    /// Advertises a related link without linkage data.
    pub fn with_related_link(mut self, name: impl Into<String>, href: impl Into<String>) -> Self {
        let entry = self.relationships.entry(name.into()).or_default();
        entry.links.get_or_insert_with(RelationshipLinks::default).related = Some(href.into());
        self
    }
}

/// Primary data of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Resource),
    Many(Vec<Resource>),
}

/// Top-level payload: primary data plus side-loaded resources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub data: Option<PrimaryData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
}

impl Document {
    pub fn single(resource: Resource) -> Self {
        Self {
            data: Some(PrimaryData::One(resource)),
            included: Vec::new(),
        }
    }

    pub fn many(resources: Vec<Resource>) -> Self {
        Self {
            data: Some(PrimaryData::Many(resources)),
            included: Vec::new(),
        }
    }

    pub fn with_included(mut self, resource: Resource) -> Self {
        self.included.push(resource);
        self
    }

    pub fn primary(&self) -> &[Resource] {
        match &self.data {
            None => &[],
            Some(PrimaryData::One(resource)) => std::slice::from_ref(resource),
            Some(PrimaryData::Many(resources)) => resources,
        }
    }

    /// Primary resources followed by included ones.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.primary().iter().chain(self.included.iter())
    }

    /// Primary data as relationship linkage.
    pub fn linkage(&self) -> RelationshipData {
        match &self.data {
            None => RelationshipData::Null,
            Some(PrimaryData::One(resource)) => RelationshipData::One(resource.reference()),
            Some(PrimaryData::Many(resources)) => {
                RelationshipData::Many(resources.iter().map(Resource::reference).collect())
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(value) => value,
        RawId::Int(value) => value.to_string(),
    })
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Linkage {
    One(ResourceRef),
    Many(Vec<ResourceRef>),
}

fn deserialize_linkage<'de, D>(deserializer: D) -> Result<Option<RelationshipData>, D::Error>
where
    D: Deserializer<'de>,
{
    // Only reached when the key is present, so `null` is explicit emptiness.
    Ok(Some(match Option::<Linkage>::deserialize(deserializer)? {
        None => RelationshipData::Null,
        Some(Linkage::One(reference)) => RelationshipData::One(reference),
        Some(Linkage::Many(references)) => RelationshipData::Many(references),
    }))
}

fn serialize_linkage<S>(data: &Option<RelationshipData>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match data {
        None | Some(RelationshipData::Null) => serializer.serialize_none(),
        Some(RelationshipData::One(reference)) => {
            serializer.serialize_some(&Linkage::One(reference.clone()))
        }
        Some(RelationshipData::Many(references)) => {
            serializer.serialize_some(&Linkage::Many(references.clone()))
        }
    }
}
