//! Request payloads
//!
//! A payload is a JSON object with an `action` and action-specific fields.
//! Query and update documents are passed through to the store untouched.

use bson::Bson;
use serde_json::{Map, Value};
use std::fmt;

use crate::db::convert::{to_document, to_filter};
use crate::db::UpdateSpec;
use crate::types::{DispatchError, Result};

/// The four supported actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Find,
    Update,
    Delete,
}

impl Action {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "insert" => Some(Self::Insert),
            "find" => Some(Self::Find),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Find => "find",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One database operation, ready to run
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert { document: bson::Document },
    Find { filter: bson::Document },
    Update { filter: bson::Document, update: UpdateSpec },
    Delete { filter: bson::Document },
}

impl Operation {
    pub fn action(&self) -> Action {
        match self {
            Self::Insert { .. } => Action::Insert,
            Self::Find { .. } => Action::Find,
            Self::Update { .. } => Action::Update,
            Self::Delete { .. } => Action::Delete,
        }
    }

    /// Build the operation for `action` from the remaining payload fields
    ///
    /// `data` (insert), `query` and `update` (update) are required; `query` is
    /// optional for find and delete and defaults to match-all. A null `query`
    /// matches everything for find but is rejected for delete.
    pub fn from_payload(action: Action, payload: &mut Map<String, Value>) -> Result<Self> {
        match action {
            Action::Insert => {
                let data = payload.remove("data").ok_or(DispatchError::MissingField("data"))?;
                Ok(Self::Insert {
                    document: to_document(data, "data")?,
                })
            }
            Action::Find => Ok(Self::Find {
                filter: to_filter(payload.remove("query"))?,
            }),
            Action::Update => {
                let query = payload.remove("query").ok_or(DispatchError::MissingField("query"))?;
                let update = payload.remove("update").ok_or(DispatchError::MissingField("update"))?;
                Ok(Self::Update {
                    filter: to_document(query, "query")?,
                    update: to_update_spec(update)?,
                })
            }
            // Only an absent query matches everything; null is rejected
            Action::Delete => match payload.remove("query") {
                None => Ok(Self::Delete {
                    filter: bson::Document::new(),
                }),
                Some(Value::Null) => Err(DispatchError::InvalidRequest(
                    "query must not be null for delete".to_string(),
                )),
                Some(query) => Ok(Self::Delete {
                    filter: to_document(query, "query")?,
                }),
            },
        }
    }
}

/// What a payload asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Execute(Operation),
    /// Missing, non-string or unknown `action`
    InvalidAction,
}

impl Plan {
    /// Interpret a request payload
    ///
    /// A payload that is not a JSON object, or a recognised action with
    /// missing or malformed fields, is an operation failure.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let mut payload = match payload {
            Value::Object(map) => map,
            other => {
                return Err(DispatchError::InvalidRequest(format!(
                    "request payload must be a JSON object, got {}",
                    json_type(&other)
                )))
            }
        };

        let action = match payload.get("action").and_then(Value::as_str).and_then(Action::parse) {
            Some(action) => action,
            None => return Ok(Self::InvalidAction),
        };

        Operation::from_payload(action, &mut payload).map(Self::Execute)
    }
}

/// Convert an `update` field: an operator document or a pipeline array
pub fn to_update_spec(value: Value) -> Result<UpdateSpec> {
    match Bson::try_from(value)? {
        Bson::Document(doc) => Ok(UpdateSpec::Modifiers(doc)),
        Bson::Array(stages) => stages
            .into_iter()
            .map(|stage| match stage {
                Bson::Document(doc) => Ok(doc),
                _ => Err(DispatchError::InvalidRequest(
                    "update pipeline stages must be JSON objects".to_string(),
                )),
            })
            .collect::<Result<Vec<_>>>()
            .map(UpdateSpec::Pipeline),
        _ => Err(DispatchError::InvalidRequest(
            "update must be a JSON object or an array of pipeline stages".to_string(),
        )),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
