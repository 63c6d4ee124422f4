//! Wire types exchanged with the remote service.
//!
//! The request body uses camelCase keys; the response is passed through as
//! opaque JSON without schema validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body POSTed to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardRequest {
    /// Caller-supplied subject identifier.
    pub subject_id: String,
    /// Caller-supplied finger code.
    pub finger_code: String,
    /// Encoded artifact extracted from the capture program.
    pub payload: String,
}

/// A 2xx answer from the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardResult {
    /// HTTP status returned by the remote service.
    pub status: u16,
    /// Response body, `null` when empty, a JSON string when not JSON.
    pub body: Value,
}

/// Interprets a raw response body: empty is `None`, JSON is parsed, anything
/// else is kept verbatim as a JSON string.
pub fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_uses_camel_case_keys() {
        let req = ForwardRequest {
            subject_id: "A1".into(),
            finger_code: "F1".into(),
            payload: "QUJD".into(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"subjectId": "A1", "fingerCode": "F1", "payload": "QUJD"})
        );
    }

    #[test]
    fn parse_body_variants() {
        assert_eq!(parse_body(""), None);
        assert_eq!(parse_body("  \n"), None);
        assert_eq!(parse_body(r#"{"ok":true}"#), Some(json!({"ok": true})));
        assert_eq!(
            parse_body("<html>bad gateway</html>"),
            Some(Value::String("<html>bad gateway</html>".into()))
        );
    }
}
