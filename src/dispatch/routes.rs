//! REST proxy variant
//!
//! Routes proxy events on `httpMethod` and `path`:
//! - `GET /api/health` - database connectivity check
//! - `GET|POST|PUT|DELETE /api/documents` - find, insert, update, delete
//!
//! Every response carries the full CORS header set.

use bson::Document;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::handler::{failure, guarded, Dispatcher};
use super::ingest::{is_truthy, parse_body};
use super::request::{json_type, Action, Operation, Plan};
use super::response::{proxy_headers, Envelope, INVALID_JSON_MESSAGE};
use crate::db::convert::{to_document, to_filter};
use crate::types::{DispatchError, Result};

pub const HEALTH_PATH: &str = "/api/health";
pub const DOCUMENTS_PATH: &str = "/api/documents";

const BODY_REQUIRED_MESSAGE: &str = "Request body is required";
const UPDATE_FIELDS_MESSAGE: &str = "Request body must contain \"query\" and \"update\" fields";
const DELETE_QUERY_MESSAGE: &str = "Query is required for delete operation";
const INVALID_FILTER_MESSAGE: &str = "Invalid JSON in filter parameter";

const AVAILABLE_ENDPOINTS: [&str; 5] = [
    "GET /api/health",
    "GET /api/documents",
    "POST /api/documents",
    "PUT /api/documents",
    "DELETE /api/documents",
];

/// Health check body
#[derive(Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: &'static str,
    pub timestamp: String,
    /// "connected" or "disconnected"
    pub mongodb: &'static str,
    pub version: &'static str,
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handle a REST proxy event
pub async fn handle_proxy(dispatcher: &Dispatcher, event: Value) -> Envelope {
    let envelope = match event {
        Value::Object(event) => route(dispatcher, &event).await,
        other => {
            warn!("Proxy event is {}, expected an object", json_type(&other));
            Envelope::json(
                500,
                &json!({
                    "error": "Internal server error",
                    "message": "proxy event must be a JSON object",
                }),
            )
        }
    };
    envelope.with_headers(proxy_headers())
}

async fn route(dispatcher: &Dispatcher, event: &Map<String, Value>) -> Envelope {
    let method = event.get("httpMethod").and_then(Value::as_str).unwrap_or("");
    let path = event.get("path").and_then(Value::as_str).unwrap_or("");

    info!(method, path, "Proxy request");

    match path {
        HEALTH_PATH => health_check(dispatcher).await,
        DOCUMENTS_PATH => handle_documents(dispatcher, method, event).await,
        _ => Envelope::json(
            404,
            &json!({
                "error": "Endpoint not found",
                "available_endpoints": AVAILABLE_ENDPOINTS,
            }),
        ),
    }
}

/// Ping the database: 200 when a session opens and answers a ping, 503 otherwise
pub async fn health_check(dispatcher: &Dispatcher) -> Envelope {
    let check = match dispatcher.open().await {
        Ok(session) => {
            let ping = guarded(session.store().ping()).await;
            session.close().await;
            ping
        }
        Err(e) => Err(e),
    };

    let (status_code, response) = match check {
        Ok(()) => (200, health_response("healthy", "connected", None)),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (503, health_response("unhealthy", "disconnected", Some(e.to_string())))
        }
    };

    Envelope::json(status_code, &response)
}

fn health_response(status: &'static str, mongodb: &'static str, error: Option<String>) -> HealthResponse {
    HealthResponse {
        status,
        timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        mongodb,
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        error,
    }
}

async fn handle_documents(dispatcher: &Dispatcher, method: &str, event: &Map<String, Value>) -> Envelope {
    match method {
        "GET" | "POST" | "PUT" | "DELETE" => {}
        "OPTIONS" => return Envelope::json(200, &json!({})),
        other => {
            return Envelope::error(405, &format!("Method {} not allowed", other));
        }
    }

    // Undecodable input is answered before any database work
    let operation = match documents_operation(method, event) {
        Err(e @ DispatchError::BadRequest(_)) => return failure(e),
        other => other,
    };

    let status_code = if method == "POST" { 201 } else { 200 };
    match dispatcher.run(operation.map(Plan::Execute)).await {
        Ok(outcome) => Envelope::json(status_code, &outcome.into_proxy_body()),
        Err(e) => failure(e),
    }
}

/// Map a documents request onto one of the four operations
///
/// Missing inserts, incomplete updates and unfiltered deletes are refused
/// with 400 before any database work.
fn documents_operation(method: &str, event: &Map<String, Value>) -> Result<Operation> {
    let body = request_body(event)?;
    let params = event.get("queryStringParameters").and_then(Value::as_object);

    match method {
        "GET" => Ok(Operation::Find {
            filter: filter_parameter(params)?.unwrap_or_default(),
        }),
        "POST" => {
            let document = body
                .filter(is_truthy)
                .ok_or_else(|| DispatchError::BadRequest(BODY_REQUIRED_MESSAGE.to_string()))?;
            Ok(Operation::Insert {
                document: to_document(document, "body")?,
            })
        }
        "PUT" => match body {
            Some(Value::Object(mut fields)) if fields.contains_key("query") && fields.contains_key("update") => {
                Operation::from_payload(Action::Update, &mut fields)
            }
            _ => Err(DispatchError::BadRequest(UPDATE_FIELDS_MESSAGE.to_string())),
        },
        // DELETE
        _ => {
            let from_body = match body {
                Some(Value::Object(mut fields)) => fields.remove("query"),
                _ => None,
            };
            let filter = match from_body {
                Some(Value::Null) => None,
                Some(query) => Some(to_document(query, "query")?),
                None => filter_parameter(params)?,
            };
            match filter {
                Some(filter) if !filter.is_empty() => Ok(Operation::Delete { filter }),
                _ => Err(DispatchError::BadRequest(DELETE_QUERY_MESSAGE.to_string())),
            }
        }
    }
}

fn request_body(event: &Map<String, Value>) -> Result<Option<Value>> {
    match event.get("body") {
        Some(body) if is_truthy(body) => match body {
            Value::String(text) => {
                let encoded = event.get("isBase64Encoded").is_some_and(is_truthy);
                parse_body(text, encoded).map(Some)
            }
            _ => Err(DispatchError::BadRequest(INVALID_JSON_MESSAGE.to_string())),
        },
        _ => Ok(None),
    }
}

/// The `filter` query-string parameter as a filter document, if given
fn filter_parameter(params: Option<&Map<String, Value>>) -> Result<Option<Document>> {
    match params.and_then(|p| p.get("filter")).and_then(Value::as_str) {
        Some(text) => {
            let value: Value = serde_json::from_str(text).map_err(|e| {
                warn!("Invalid filter parameter: {}", e);
                DispatchError::BadRequest(INVALID_FILTER_MESSAGE.to_string())
            })?;
            to_filter(Some(value)).map(Some)
        }
        None => Ok(None),
    }
}
