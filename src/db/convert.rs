//! JSON <-> BSON conversion at the handler boundary
//!
//! Incoming JSON goes through bson's extended-JSON parser so `{"$oid": ...}`
//! and `{"$date": ...}` reach the database as native values. Outgoing
//! documents are rendered as relaxed extended JSON with `_id` stringified.

use bson::{Bson, Document};
use serde_json::Value;

use crate::types::{DispatchError, Result};

/// Identifier field assigned by the database
pub const ID_FIELD: &str = "_id";

/// Convert a JSON value that must be an object into a BSON document
pub fn to_document(value: Value, what: &str) -> Result<Document> {
    match Bson::try_from(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(DispatchError::InvalidRequest(format!(
            "{} must be a JSON object, got {}",
            what,
            type_name(&other)
        ))),
    }
}

/// Convert an optional find filter, treating absence and `null` as match-all
pub fn to_filter(value: Option<Value>) -> Result<Document> {
    match value {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(v) => to_document(v, "query"),
    }
}

/// String form of an identifier as returned to callers
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Render a stored document for output with its identifier as a string
pub fn document_to_json(mut doc: Document) -> Value {
    if let Some(id) = doc.get(ID_FIELD) {
        let rendered = id_to_string(id);
        doc.insert(ID_FIELD, rendered);
    }
    Bson::Document(doc).into_relaxed_extjson()
}

fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Array(_) => "an array",
        Bson::String(_) => "a string",
        Bson::Boolean(_) => "a boolean",
        Bson::Null => "null",
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => "a number",
        _ => "a non-object value",
    }
}
