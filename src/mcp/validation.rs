//! Tool argument validation using JSON Schema.
//!
//! Schemas are compiled once when the tool registry is built. Validation
//! collects every violation as a `(path, message)` pair so the caller gets a
//! complete list instead of the first failure.

use jsonschema::{Draft, Validator};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::mcp::error::McpError;

/// One invalid field in a tool call's arguments
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    /// JSON pointer to the offending value (empty for the arguments object itself)
    pub path: String,
    /// Human-readable error message
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "arguments: {}", self.message)
        } else {
            write!(f, "arguments{}: {}", self.path, self.message)
        }
    }
}

/// Compiled input schema of a single tool
#[derive(Debug, Clone)]
pub struct ArgumentValidator {
    validator: Arc<Validator>,
}

impl ArgumentValidator {
    /// Compile `schema`. Fails when the schema itself is malformed.
    pub fn compile(tool: &str, schema: &Value) -> Result<Self, McpError> {
        if !schema.is_object() {
            return Err(McpError::InvalidToolDefinition {
                tool: tool.to_string(),
                message: "input schema must be a JSON object".to_string(),
            });
        }

        let validator = Validator::options().with_draft(Draft::Draft7).build(schema).map_err(
            |e| McpError::InvalidToolDefinition {
                tool: tool.to_string(),
                message: e.to_string(),
            },
        )?;

        Ok(Self { validator: Arc::new(validator) })
    }

    /// Check `arguments`, returning every violation
    pub fn validate(&self, arguments: &Value) -> Result<(), Vec<FieldError>> {
        let errors: Vec<FieldError> = self
            .validator
            .iter_errors(arguments)
            .map(|e| FieldError { path: e.instance_path.to_string(), message: e.to_string() })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Render validation failures as tool output, one line per field
pub fn format_field_errors(tool: &str, errors: &[FieldError]) -> String {
    let mut text = format!("Invalid arguments for tool '{}':", tool);
    for error in errors {
        text.push_str("\n- ");
        text.push_str(&error.to_string());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "model": {"type": "string", "pattern": "^[^/]+/[^/]+$"},
                "input": {"type": "object"},
                "count": {"type": "integer", "minimum": 1}
            },
            "required": ["model", "input"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_valid_arguments_pass() {
        let validator = ArgumentValidator::compile("t", &image_schema()).unwrap();
        assert!(validator.validate(&json!({"model": "a/b", "input": {"prompt": "x"}})).is_ok());
    }

    #[test]
    fn test_one_error_per_invalid_field() {
        let validator = ArgumentValidator::compile("t", &image_schema()).unwrap();
        let errors = validator
            .validate(&json!({"model": "no-slash", "input": "text", "count": 0}))
            .unwrap_err();

        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(errors.len(), 3);
        assert!(paths.contains(&"/model"));
        assert!(paths.contains(&"/input"));
        assert!(paths.contains(&"/count"));
    }

    #[test]
    fn test_missing_required_reports_at_root() {
        let validator = ArgumentValidator::compile("t", &image_schema()).unwrap();
        let errors = validator.validate(&json!({"model": "a/b"})).unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "");
        assert!(errors[0].message.contains("input"));
        assert!(errors[0].to_string().starts_with("arguments: "));
    }

    #[test]
    fn test_format_field_errors_lines() {
        let errors = vec![
            FieldError { path: "/model".to_string(), message: "bad model".to_string() },
            FieldError { path: "".to_string(), message: "\"input\" is a required property".to_string() },
        ];
        let text = format_field_errors("generate_image", &errors);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Invalid arguments for tool 'generate_image':");
        assert_eq!(lines[1], "- arguments/model: bad model");
        assert_eq!(lines[2], "- arguments: \"input\" is a required property");
    }

    #[test]
    fn test_malformed_schema_is_rejected() {
        let err = ArgumentValidator::compile("t", &json!({"type": 12})).unwrap_err();
        assert!(matches!(err, McpError::InvalidToolDefinition { .. }));

        let err = ArgumentValidator::compile("t", &json!("not an object")).unwrap_err();
        assert!(matches!(err, McpError::InvalidToolDefinition { .. }));
    }
}
