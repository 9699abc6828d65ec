//! API-gateway event unwrapping
//!
//! A gateway event carries the request as JSON text in `body`. An empty body
//! means the event itself is the request.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use tracing::warn;

use super::response::INVALID_JSON_MESSAGE;
use crate::types::{DispatchError, Result};

/// Extract the request payload from a gateway event
pub fn unwrap_gateway_event(event: Value) -> Result<Value> {
    let Value::Object(mut fields) = event else {
        warn!("Gateway event is not a JSON object");
        return Err(malformed());
    };

    if !fields.get("body").is_some_and(is_truthy) {
        return Ok(Value::Object(fields));
    }

    let encoded = fields.get("isBase64Encoded").is_some_and(is_truthy);
    match fields.remove("body") {
        Some(Value::String(text)) => parse_body(&text, encoded),
        _ => {
            warn!("Gateway body is present but is not a string");
            Err(malformed())
        }
    }
}

/// Decode request body text, base64-decoding first when the gateway says so
pub fn parse_body(text: &str, base64_encoded: bool) -> Result<Value> {
    let parsed = if base64_encoded {
        let bytes = STANDARD.decode(text.trim()).map_err(|e| {
            warn!("Request body is not valid base64: {}", e);
            malformed()
        })?;
        serde_json::from_slice(&bytes)
    } else {
        serde_json::from_str(text)
    };

    parsed.map_err(|e| {
        warn!("Request body is not valid JSON: {}", e);
        malformed()
    })
}

/// Truthiness as the gateway contract defines "has a body": empty strings,
/// containers, zero, false and null all count as absent
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn malformed() -> DispatchError {
    DispatchError::BadRequest(INVALID_JSON_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_text_is_parsed() {
        let event = json!({ "body": "{\"action\":\"find\"}" });
        assert_eq!(unwrap_gateway_event(event).unwrap(), json!({ "action": "find" }));
    }

    #[test]
    fn test_event_is_payload_without_body() {
        let event = json!({ "action": "find", "query": {} });
        assert_eq!(unwrap_gateway_event(event.clone()).unwrap(), event);

        let event = json!({ "action": "find", "body": null });
        assert_eq!(unwrap_gateway_event(event.clone()).unwrap(), event);

        let event = json!({ "action": "find", "body": "" });
        assert_eq!(unwrap_gateway_event(event.clone()).unwrap(), event);
    }

    #[test]
    fn test_malformed_body() {
        let err = unwrap_gateway_event(json!({ "body": "{not json" })).unwrap_err();
        assert_eq!(err.to_string(), "Invalid JSON in request body");
        assert_eq!(err.status_code().as_u16(), 400);

        let err = unwrap_gateway_event(json!({ "body": { "action": "find" } })).unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);

        assert!(unwrap_gateway_event(json!("body")).is_err());
    }

    #[test]
    fn test_base64_body() {
        let encoded = STANDARD.encode(r#"{"action":"delete"}"#);
        let event = json!({ "body": encoded, "isBase64Encoded": true });
        assert_eq!(unwrap_gateway_event(event).unwrap(), json!({ "action": "delete" }));

        let event = json!({ "body": "%%%", "isBase64Encoded": true });
        assert!(unwrap_gateway_event(event).is_err());
    }
}
