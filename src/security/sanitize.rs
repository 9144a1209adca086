// Strips HTML tags from JSON request bodies before handlers see them

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::ApiError;

/// Bodies above this size are refused
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"</?[^>]+(>|$)").expect("tag pattern is valid"))
}

pub fn strip_tags(input: &str) -> String {
    tag_regex().replace_all(input, "").into_owned()
}

/// Clean the top-level string fields of an object. Nested values are left alone.
pub fn sanitize_value(value: &mut Value) {
    if let Value::Object(fields) = value {
        for field in fields.values_mut() {
            if let Value::String(text) = field {
                *text = strip_tags(text);
            }
        }
    }
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.starts_with("application/json"))
}

pub async fn sanitize_body(request: Request, next: Next) -> Result<Response, ApiError> {
    if !is_json(&request) {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::validation(format!("Unreadable request body: {}", e)))?;

    // Malformed JSON goes through untouched so the extractor can report it
    let bytes = match serde_json::from_slice::<Value>(&bytes) {
        Ok(mut value) => {
            sanitize_value(&mut value);
            let cleaned = serde_json::to_vec(&value)
                .map_err(|e| ApiError::InternalError(format!("Re-encoding body: {}", e)))?;
            Bytes::from(cleaned)
        }
        Err(_) => bytes,
    };

    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    Ok(next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await)
}
