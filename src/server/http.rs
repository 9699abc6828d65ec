//! Local HTTP emulation
//!
//! Uses hyper http1 with TokioIo. Each HTTP request is turned into the
//! proxy-shaped event the function runtime would deliver, handled by the
//! configured variant, and the envelope is mapped back onto the response.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Variant;
use crate::dispatch::{Dispatcher, Envelope};
use crate::types::DispatchError;

/// Accept connections until the process is stopped
pub async fn run(dispatcher: Dispatcher, variant: Variant, listen: SocketAddr) -> Result<(), DispatchError> {
    let listener = TcpListener::bind(listen).await?;

    info!("docdispatch listening on {} ({} variant)", listen, variant);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let dispatcher = dispatcher.clone();
                        async move { handle_request(dispatcher, variant, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_request(
    dispatcher: Dispatcher,
    variant: Variant,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Request body error: {}", e);
            return Ok(plain_error(StatusCode::BAD_REQUEST, "Failed to read request body"));
        }
    };

    debug!(method = %parts.method, path = parts.uri.path(), "HTTP request");

    let event = build_event(&parts, &body);
    let envelope = dispatcher.handle(variant, event).await;
    Ok(into_response(envelope))
}

/// Build the proxy-shaped event for an HTTP request
pub fn build_event(parts: &Parts, body: &[u8]) -> Value {
    let query = parts
        .uri
        .query()
        .and_then(|q| serde_urlencoded::from_str::<BTreeMap<String, String>>(q).ok())
        .filter(|params| !params.is_empty());

    let headers: Map<String, Value> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();

    let (body, base64_encoded) = if body.is_empty() {
        (Value::Null, false)
    } else {
        match std::str::from_utf8(body) {
            Ok(text) => (Value::String(text.to_string()), false),
            Err(_) => (Value::String(STANDARD.encode(body)), true),
        }
    };

    json!({
        "httpMethod": parts.method.as_str(),
        "path": parts.uri.path(),
        "queryStringParameters": query,
        "headers": headers,
        "body": body,
        "isBase64Encoded": base64_encoded,
    })
}

/// Map an envelope onto an HTTP response
pub fn into_response(envelope: Envelope) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(envelope.status_code);
    for (name, value) in envelope.headers.iter().flatten() {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.body(Full::new(Bytes::from(envelope.body))) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build response: {}", e);
            plain_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        }
    }
}

fn plain_error(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = json!({ "error": message });
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(method: &str, uri: &str) -> Parts {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_event_from_get_with_filter() {
        let event = build_event(
            &parts("GET", "/api/documents?filter=%7B%22a%22%3A1%7D"),
            b"",
        );
        assert_eq!(event["httpMethod"], "GET");
        assert_eq!(event["path"], "/api/documents");
        assert_eq!(event["queryStringParameters"]["filter"], "{\"a\":1}");
        assert_eq!(event["headers"]["content-type"], "application/json");
        assert!(event["body"].is_null());
    }

    #[test]
    fn test_event_body_text_and_binary() {
        let event = build_event(&parts("POST", "/api/documents"), br#"{"x":1}"#);
        assert_eq!(event["body"], "{\"x\":1}");
        assert_eq!(event["isBase64Encoded"], false);
        assert!(event["queryStringParameters"].is_null());

        let event = build_event(&parts("POST", "/api/documents"), &[0xff, 0xfe]);
        assert_eq!(event["isBase64Encoded"], true);
    }

    #[test]
    fn test_envelope_to_response() {
        let envelope = Envelope::error(400, "Invalid JSON in request body")
            .with_headers(crate::dispatch::response::gateway_headers());
        let response = into_response(envelope);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
