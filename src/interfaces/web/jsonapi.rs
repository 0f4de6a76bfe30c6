//! Minimal JSON-API document model: primary data, relationships, included
//! resources, links and meta.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const MEDIA_TYPE: &str = "application/vnd.api+json";

#[derive(Debug, thiserror::Error)]
pub enum MarshalError {
    #[error("marshaling JSON-API document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("resource attributes must serialize to an object, got {0}")]
    NotAnObject(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub data: Vec<ResourceIdentifier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<&'static str, Relationship>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    One(Box<Resource>),
    Many(Vec<Resource>),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Links {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Something that renders as a JSON-API resource.
pub trait ToResource {
    fn resource(&self) -> Result<Resource, MarshalError>;

    /// Related resources carried in the document's `included` member.
    fn included(&self) -> Result<Vec<Resource>, MarshalError> {
        Ok(Vec::new())
    }
}

/// Serializes `value` into an attribute map, dropping the `id` member that
/// JSON-API keeps at the resource level.
pub fn attributes_of<T: Serialize>(value: &T) -> Result<Map<String, Value>, MarshalError> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        other => Err(MarshalError::NotAnObject(other.to_string())),
    }
}

pub fn marshal_one<R: ToResource>(item: &R) -> Result<Document, MarshalError> {
    Ok(Document {
        data: PrimaryData::One(Box::new(item.resource()?)),
        included: item.included()?,
        links: None,
        meta: None,
    })
}

pub fn marshal_many<R: ToResource>(
    items: &[R],
    links: Links,
    meta: Value,
) -> Result<Document, MarshalError> {
    let data = items
        .iter()
        .map(ToResource::resource)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Document {
        data: PrimaryData::Many(data),
        included: Vec::new(),
        links: Some(links),
        meta: Some(meta),
    })
}

/// `{"errors":[{"detail": ...}]}`
pub fn error_document(details: &[String]) -> Value {
    let errors: Vec<Value> = details
        .iter()
        .map(|d| serde_json::json!({ "detail": d }))
        .collect();
    serde_json::json!({ "errors": errors })
}
