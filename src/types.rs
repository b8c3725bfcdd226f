//! Core types shared by conversion, transformation and compilation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pointer prefix for schemas hoisted into an OpenAPI document.
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Pointer prefix for fragment-local definitions.
pub const DEFS_PREFIX: &str = "#/$defs/";

/// OpenAPI version assumed when a document does not declare one.
pub const DEFAULT_OPENAPI_VERSION: &str = "3.0.3";

/// Routes served by the documentation UI itself, hidden by default.
pub const DEFAULT_SKIP_LIST: &[&str] = &[
    "/documentation/",
    "/documentation/initOAuth",
    "/documentation/json",
    "/documentation/uiConfig",
    "/documentation/yaml",
    "/documentation/*",
    "/documentation/static/*",
];

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Direction a schema is used in.
///
/// Request-bound schemas are converted as `Input`, response-bound ones as
/// `Output`. The two may render differently (defaults, dates, closed objects).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    /// Component name for a registered id in this direction.
    ///
    /// Input components carry an `Input` suffix so both renderings of the same
    /// registered schema can coexist in one document.
    pub fn component_name(&self, id: &str) -> String {
        match self {
            Direction::Input => format!("{id}Input"),
            Direction::Output => id.to_string(),
        }
    }

    /// `$ref` pointer to a registered id in this direction.
    pub fn reference_uri(&self, id: &str) -> String {
        format!("{}{}", COMPONENTS_PREFIX, self.component_name(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn component_name_suffixes_input() {
        assert_eq!(Direction::Input.component_name("User"), "UserInput");
        assert_eq!(Direction::Output.component_name("User"), "User");
    }

    #[test]
    fn reference_uri_points_into_components() {
        assert_eq!(
            Direction::Input.reference_uri("Token"),
            "#/components/schemas/TokenInput"
        );
        assert_eq!(
            Direction::Output.reference_uri("Token"),
            "#/components/schemas/Token"
        );
    }

    #[test]
    fn json_type_names() {
        assert_eq!(json_type_name(&json!(null)), "null");
        assert_eq!(json_type_name(&json!(1.5)), "number");
        assert_eq!(json_type_name(&json!([])), "array");
        assert_eq!(json_type_name(&json!({})), "object");
    }
}
