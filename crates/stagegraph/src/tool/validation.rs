//! Argument validation against a minimal JSON Schema.
//!
//! Only `required` keys are checked. Errors become
//! `ToolError::ValidationFailed` via `ValidationError`.

use serde_json::Value;

use crate::error::ValidationError;

/// Ensures `args` is an object holding every key listed in `schema["required"]`.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ValidationError> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    let Some(obj) = args.as_object() else {
        return Err(ValidationError("args must be an object".into()));
    };
    for key in required.iter().filter_map(Value::as_str) {
        if !obj.contains_key(key) {
            return Err(ValidationError(format!("missing required field: {}", key)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn no_required_accepts_anything() {
        assert!(validate_args(&json!({"type": "object"}), &json!({})).is_ok());
    }

    #[test]
    fn missing_field_is_named() {
        let schema = json!({"required": ["order_id"]});
        let e = validate_args(&schema, &json!({"id": 1})).unwrap_err();
        assert!(e.0.contains("order_id"));
    }

    #[test]
    fn non_object_args_rejected() {
        let schema = json!({"required": ["query"]});
        let e = validate_args(&schema, &json!(["query"])).unwrap_err();
        assert!(e.0.contains("object"));
    }
}
