use crate::error::EngineError;
use serde_json::Value;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.split_once('\n').map(|(_, rest)| rest) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Decodes raw advisory text into a JSON object.
///
/// Fails before any normalisation is attempted when the text is not JSON or the JSON is not
/// an object.
pub fn parse_payload(text: &str) -> Result<Value, EngineError> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let value = serde_json::from_str::<Value>(&json_str)
        .map_err(|e| EngineError::malformed(format!("not valid JSON ({e})")))?;
    ensure_object(value)
}

pub fn ensure_object(value: Value) -> Result<Value, EngineError> {
    match value {
        Value::Object(_) => Ok(value),
        other => Err(EngineError::malformed(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

pub fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_payload_accepts_wrapped_object() {
        let text = "Here is the plan:\n```json\n{\"summary\": \"x\", \"allocations\": []}\n```";
        let v = parse_payload(text).unwrap();
        assert_eq!(v, json!({"summary": "x", "allocations": []}));
    }

    #[test]
    fn parse_payload_rejects_invalid_json() {
        let err = parse_payload("{\"summary\": \"x\",,}").unwrap_err();
        assert!(matches!(err, EngineError::MalformedAdvisoryPayload { .. }));
    }

    #[test]
    fn parse_payload_rejects_non_objects() {
        assert!(parse_payload("[1, 2, 3]").is_err());
        assert!(parse_payload("just prose, no braces").is_err());
        assert!(ensure_object(json!("text")).is_err());
        assert!(ensure_object(json!({})).is_ok());
    }
}
