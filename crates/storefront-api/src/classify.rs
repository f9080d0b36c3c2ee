//! Error classification for non-2xx API responses
//!
//! The upstream API uses three incompatible error body shapes:
//! - business errors: `{"code": ..., "message": "...", "description": "..."}`
//! - parse errors on malformed requests (400): `{"error": "..."}`
//! - field validation on some 422s: `{"field": ["msg", ...]}`
//!
//! `classify` never fails: bodies that are not JSON, or that match no known
//! shape, degrade to a `Generic` error with an empty message.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ApiError;

/// Keys whose presence marks a business error, even on a 422.
const RESERVED_KEYS: &[&str] = &["code", "message"];

/// Classify a failed response by HTTP status and raw body.
pub fn classify(status: u16, body: &[u8]) -> ApiError {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    let message = error_message(parsed.as_ref());

    match status {
        401 => return ApiError::Auth { message },
        402 => return ApiError::PaymentRequired { message },
        403 => return ApiError::PermissionDenied { message },
        404 => return ApiError::NotFound { message },
        _ => {}
    }

    if status == 422 {
        if let Some(fields) = validation_fields(body) {
            return ApiError::Validation { status, fields };
        }
    }

    ApiError::Generic {
        status,
        code: error_code(parsed.as_ref()),
        message,
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

/// Human-readable text: `message`, then `description`, then `error`.
fn error_message(body: Option<&Value>) -> String {
    let Some(Value::Object(map)) = body else {
        return String::new();
    };

    ["message", "description", "error"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .unwrap_or_default()
        .to_owned()
}

/// Business error code. The API sends it as a string or a number.
fn error_code(body: Option<&Value>) -> String {
    match body.and_then(|v| v.get("code")) {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Number(code)) => code.to_string(),
        _ => String::new(),
    }
}

/// Parse a `{"field": ["msg", ...]}` body.
///
/// Returns `None` for anything else, including an empty map or a map carrying
/// the reserved business-error keys.
fn validation_fields(body: &[u8]) -> Option<BTreeMap<String, Vec<String>>> {
    let fields: BTreeMap<String, Vec<String>> = serde_json::from_slice(body).ok()?;
    if fields.is_empty() || RESERVED_KEYS.iter().any(|key| fields.contains_key(*key)) {
        return None;
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_statuses_map_to_dedicated_variants() {
        let body = br#"{"code":"unauthorized","message":"Invalid access token"}"#;
        assert_eq!(
            classify(401, body),
            ApiError::Auth {
                message: "Invalid access token".into()
            }
        );
        assert!(matches!(classify(402, b""), ApiError::PaymentRequired { .. }));
        assert!(matches!(
            classify(403, b"{}"),
            ApiError::PermissionDenied { .. }
        ));
        assert!(matches!(classify(404, b"not json"), ApiError::NotFound { .. }));
    }

    #[test]
    fn field_map_on_422_is_validation() {
        let err = classify(422, br#"{"name": ["required"]}"#);
        match err {
            ApiError::Validation { status, fields } => {
                assert_eq!(status, 422);
                assert_eq!(fields["name"], vec!["required".to_string()]);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn business_shape_on_422_is_generic_never_validation() {
        let err = classify(422, br#"{"code": 422, "message": "x"}"#);
        match err {
            ApiError::Generic {
                status,
                code,
                message,
                ..
            } => {
                assert_eq!(status, 422);
                assert_eq!(code, "422");
                assert_eq!(message, "x");
            }
            other => panic!("expected Generic, got {other:?}"),
        }
    }

    #[test]
    fn field_map_with_reserved_key_is_not_validation() {
        let err = classify(422, br#"{"message": ["oops"], "name": ["required"]}"#);
        assert!(matches!(err, ApiError::Generic { .. }), "got {err:?}");
    }

    #[test]
    fn empty_field_map_is_not_validation() {
        let err = classify(422, b"{}");
        assert!(matches!(err, ApiError::Generic { status: 422, .. }));
    }

    #[test]
    fn field_map_outside_422_is_generic() {
        let err = classify(400, br#"{"name": ["required"]}"#);
        assert!(matches!(err, ApiError::Generic { status: 400, .. }));
    }

    #[test]
    fn description_used_when_message_missing() {
        let err = classify(
            409,
            br#"{"code":"conflict","description":"Order already closed"}"#,
        );
        assert_eq!(
            err,
            ApiError::Generic {
                status: 409,
                code: "conflict".into(),
                message: "Order already closed".into(),
                body: r#"{"code":"conflict","description":"Order already closed"}"#.into(),
            }
        );
    }

    #[test]
    fn bare_parse_error_shape() {
        let err = classify(400, br#"{"error": "Invalid JSON: unexpected token"}"#);
        match err {
            ApiError::Generic { message, code, .. } => {
                assert_eq!(message, "Invalid JSON: unexpected token");
                assert!(code.is_empty());
            }
            other => panic!("expected Generic, got {other:?}"),
        }
    }

    #[test]
    fn non_json_and_empty_bodies_yield_empty_message() {
        for body in [&b""[..], b"<html>Bad Gateway</html>", b"[1,2,3]", b"\"text\""] {
            match classify(502, body) {
                ApiError::Generic {
                    status, message, ..
                } => {
                    assert_eq!(status, 502);
                    assert!(message.is_empty(), "body {body:?} gave {message:?}");
                }
                other => panic!("expected Generic, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_string_message_is_ignored() {
        let err = classify(400, br#"{"message": {"nested": true}, "error": "fallback"}"#);
        match err {
            ApiError::Generic { message, .. } => assert_eq!(message, "fallback"),
            other => panic!("expected Generic, got {other:?}"),
        }
    }
}
