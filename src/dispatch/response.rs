//! Response envelope
//!
//! The runtime expects `{statusCode, headers?, body}` where `body` is JSON
//! text, so structured results are encoded twice on the wire.

use bson::Document;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::db::convert::{document_to_json, ID_FIELD};
use crate::db::UpdateCounts;

/// Error text for an unrecognized action
pub const INVALID_ACTION_MESSAGE: &str = "Invalid action. Use: insert, find, update, delete";

/// Error text for an undecodable request body
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON in request body";

/// Uniform response returned to the function runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    pub body: String,
}

impl Envelope {
    /// Envelope whose body is the JSON encoding of `body`
    pub fn json<T: Serialize>(status_code: u16, body: &T) -> Self {
        let body = serde_json::to_string(body)
            .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());
        Self {
            status_code,
            headers: None,
            body,
        }
    }

    /// `{"error": message}` with the given status
    pub fn error(status_code: u16, message: &str) -> Self {
        Self::json(status_code, &json!({ "error": message }))
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Decode the body back into a JSON value
    pub fn body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.body)
    }
}

/// Headers attached to every API-gateway response
pub fn gateway_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Access-Control-Allow-Origin".to_string(), "*".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}

/// Headers attached to every REST proxy response
pub fn proxy_headers() -> BTreeMap<String, String> {
    let mut headers = gateway_headers();
    headers.insert(
        "Access-Control-Allow-Headers".to_string(),
        "Content-Type,X-Amz-Date,Authorization,X-Api-Key,X-Amz-Security-Token".to_string(),
    );
    headers.insert(
        "Access-Control-Allow-Methods".to_string(),
        "GET,POST,PUT,DELETE,OPTIONS".to_string(),
    );
    headers
}

/// Result of a dispatched request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Stringified identifier plus the document as submitted
    Inserted { id: String, document: Document },
    /// Documents already rendered with string identifiers
    Found(Vec<Value>),
    Modified(UpdateCounts),
    Deleted(u64),
    InvalidAction,
}

impl Outcome {
    /// Body shape shared by every variant, with `find` as a bare array
    pub fn into_body(self) -> Value {
        match self {
            Self::Inserted { id, .. } => json!({ "inserted_id": id }),
            Self::Found(documents) => Value::Array(documents),
            Self::Modified(counts) => json!({ "modified_count": counts.modified }),
            Self::Deleted(count) => json!({ "deleted_count": count }),
            Self::InvalidAction => json!({ "error": INVALID_ACTION_MESSAGE }),
        }
    }

    /// Body shape for gateway-style responses, where `find` is wrapped
    pub fn into_wrapped_body(self) -> Value {
        match self {
            Self::Found(documents) => json!({ "documents": documents }),
            other => other.into_body(),
        }
    }

    /// Body shape for the REST proxy: wrapped `find` plus a confirmation
    /// message, the created document and the matched count
    pub fn into_proxy_body(self) -> Value {
        match self {
            Self::Inserted { id, document } => {
                let mut document = document_to_json(document);
                if let Value::Object(fields) = &mut document {
                    fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                }
                json!({
                    "message": "Document created successfully",
                    "inserted_id": id,
                    "document": document,
                })
            }
            Self::Modified(counts) => json!({
                "message": "Documents updated successfully",
                "matched_count": counts.matched,
                "modified_count": counts.modified,
            }),
            Self::Deleted(count) => json!({
                "message": "Documents deleted successfully",
                "deleted_count": count,
            }),
            other => other.into_wrapped_body(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let envelope = Envelope::error(400, INVALID_JSON_MESSAGE).with_headers(gateway_headers());
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["statusCode"], 400);
        assert_eq!(wire["headers"]["Access-Control-Allow-Origin"], "*");
        assert_eq!(wire["headers"]["Content-Type"], "application/json");
        // Body is JSON text, not a nested object
        assert!(wire["body"].is_string());
        assert_eq!(
            envelope.body_json().unwrap(),
            json!({ "error": "Invalid JSON in request body" })
        );
    }

    #[test]
    fn test_headers_omitted_when_absent() {
        let wire = serde_json::to_value(Envelope::json(200, &json!([]))).unwrap();
        assert!(wire.get("headers").is_none());
        assert_eq!(wire["body"], "[]");
    }

    #[test]
    fn test_find_body_shapes() {
        let docs = vec![json!({ "_id": "abc" })];
        assert_eq!(Outcome::Found(docs.clone()).into_body(), json!([{ "_id": "abc" }]));
        assert_eq!(
            Outcome::Found(docs).into_wrapped_body(),
            json!({ "documents": [{ "_id": "abc" }] })
        );
    }

    #[test]
    fn test_counts() {
        let counts = UpdateCounts { matched: 4, modified: 3 };
        assert_eq!(Outcome::Modified(counts).into_wrapped_body(), json!({ "modified_count": 3 }));
        assert_eq!(Outcome::Deleted(0).into_body(), json!({ "deleted_count": 0 }));
    }

    #[test]
    fn test_proxy_bodies() {
        let counts = UpdateCounts { matched: 4, modified: 3 };
        assert_eq!(
            Outcome::Modified(counts).into_proxy_body(),
            json!({ "message": "Documents updated successfully", "matched_count": 4, "modified_count": 3 })
        );

        let inserted = Outcome::Inserted {
            id: "abc".to_string(),
            document: bson::doc! { "title": "first" },
        };
        assert_eq!(
            inserted.into_proxy_body(),
            json!({
                "message": "Document created successfully",
                "inserted_id": "abc",
                "document": { "title": "first", "_id": "abc" },
            })
        );

        assert_eq!(
            Outcome::Found(vec![]).into_proxy_body(),
            json!({ "documents": [] })
        );
    }
}
