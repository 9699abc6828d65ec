//! REST proxy variant through the local HTTP event translation

use docdispatch::config::Variant;
use docdispatch::db::MemoryConnector;
use docdispatch::server::{build_event, into_response};
use docdispatch::Dispatcher;
use hyper::{Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

async fn send(dispatcher: &Dispatcher, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let (parts, ()) = Request::builder()
        .method(method)
        .uri(uri)
        .body(())
        .unwrap()
        .into_parts();

    let event = build_event(&parts, body.as_bytes());
    let envelope = dispatcher.handle(Variant::Proxy, event).await;
    let body = envelope.body_json().unwrap();
    let response = into_response(envelope);
    assert_eq!(response.headers()["content-type"], "application/json");
    (response.status(), body)
}

#[tokio::test]
async fn test_documents_lifecycle_over_http_events() {
    let connector = MemoryConnector::new();
    let dispatcher = Dispatcher::new(Arc::new(connector.clone()));

    let (status, created) = send(&dispatcher, "POST", "/api/documents", r#"{"title":"first"}"#).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["inserted_id"].as_str().unwrap().to_string();

    send(&dispatcher, "POST", "/api/documents", r#"{"title":"second"}"#).await;

    let (status, listed) = send(&dispatcher, "GET", "/api/documents", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["documents"].as_array().unwrap().len(), 2);
    assert_eq!(listed["documents"][0]["_id"], json!(id));

    let (_, updated) = send(
        &dispatcher,
        "PUT",
        "/api/documents",
        r#"{"query":{"title":"first"},"update":{"$set":{"title":"renamed"}}}"#,
    )
    .await;
    assert_eq!(updated["matched_count"], 1);
    assert_eq!(updated["modified_count"], 1);

    let (_, deleted) = send(
        &dispatcher,
        "DELETE",
        "/api/documents?filter=%7B%22title%22%3A%22renamed%22%7D",
        "",
    )
    .await;
    assert_eq!(deleted["deleted_count"], 1);

    assert_eq!(connector.documents().await.len(), 1);
    assert_eq!(connector.sessions_opened(), connector.sessions_closed());
}

#[tokio::test]
async fn test_malformed_body_over_http_events() {
    let connector = MemoryConnector::new();
    let dispatcher = Dispatcher::new(Arc::new(connector.clone()));

    let (status, body) = send(&dispatcher, "PUT", "/api/documents", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid JSON in request body" }));
    assert_eq!(connector.sessions_opened(), 0);
}

#[tokio::test]
async fn test_unfiltered_delete_over_http_events() {
    let connector = MemoryConnector::new();
    let dispatcher = Dispatcher::new(Arc::new(connector.clone()));
    for title in ["a", "b", "c"] {
        send(&dispatcher, "POST", "/api/documents", &json!({ "title": title }).to_string()).await;
    }

    let (status, body) = send(&dispatcher, "DELETE", "/api/documents", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Query is required for delete operation");
    assert_eq!(connector.documents().await.len(), 3);

    let (status, body) = send(&dispatcher, "POST", "/api/documents", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Request body is required");
}

#[tokio::test]
async fn test_gateway_variant_over_http_events() {
    let connector = MemoryConnector::new();
    let dispatcher = Dispatcher::new(Arc::new(connector));

    let (parts, ()) = Request::builder()
        .method("POST")
        .uri("/")
        .body(())
        .unwrap()
        .into_parts();
    let event = build_event(&parts, br#"{"action":"insert","data":{"x":1}}"#);

    let envelope = dispatcher.handle(Variant::Gateway, event).await;
    assert_eq!(envelope.status_code, 200);
    assert!(envelope.body_json().unwrap()["inserted_id"].is_string());
}
