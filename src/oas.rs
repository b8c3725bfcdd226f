//! OpenAPI version detection and schema adaptation.
//!
//! OpenAPI 3.1 embeds JSON Schema draft 2020-12 as-is. OpenAPI 3.0 uses an
//! older dialect, so fragments are rewritten: no `null` type, no tuples, no
//! `const`, boolean exclusive bounds, and a handful of keywords removed.

use serde_json::{json, Map, Value};

use crate::error::TransformError;
use crate::types::DEFAULT_OPENAPI_VERSION;

/// Keywords a 3.0 SchemaObject does not allow.
const UNSUPPORTED_IN_3_0: &[&str] = &[
    "$schema",
    "$id",
    "unevaluatedProperties",
    "dependentSchemas",
    "patternProperties",
    "propertyNames",
    "contentEncoding",
    "contentMediaType",
];

/// Keywords holding a subschema or a list of subschemas.
const SUBSCHEMA_KEYS: &[&str] = &[
    "items",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "then",
    "else",
    "if",
    "contains",
    "additionalProperties",
];

/// OpenAPI major.minor line a document targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OasVersion {
    V3_0,
    V3_1,
}

impl OasVersion {
    /// Detect the target version from a document's `openapi` field.
    ///
    /// A missing field means 3.0.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::SwaggerUnsupported` for Swagger 2.0 documents
    /// and `TransformError::UnsupportedVersion` for any other version line.
    pub fn detect(document: &Value) -> Result<Self, TransformError> {
        if document.get("swagger").is_some() {
            return Err(TransformError::SwaggerUnsupported);
        }
        let declared = document
            .get("openapi")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_OPENAPI_VERSION);
        Self::parse(declared)
    }

    /// Parse a version string such as `3.0.3` or `3.1.0`.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::UnsupportedVersion` outside `3.0.x` / `3.1.x`.
    pub fn parse(version: &str) -> Result<Self, TransformError> {
        if version.starts_with("3.1") {
            Ok(OasVersion::V3_1)
        } else if version.starts_with("3.0") {
            Ok(OasVersion::V3_0)
        } else if version.starts_with('2') {
            Err(TransformError::SwaggerUnsupported)
        } else {
            Err(TransformError::UnsupportedVersion {
                version: version.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OasVersion::V3_0 => "3.0",
            OasVersion::V3_1 => "3.1",
        }
    }
}

/// Rewrite a JSON Schema fragment into a valid SchemaObject for `version`.
pub fn json_schema_to_oas(schema: &Value, version: OasVersion) -> Value {
    match version {
        OasVersion::V3_0 => to_oas_3_0(schema),
        OasVersion::V3_1 => schema.clone(),
    }
}

fn to_oas_3_0(schema: &Value) -> Value {
    let Value::Object(source) = schema else {
        return schema.clone();
    };
    let mut map = source.clone();

    for key in UNSUPPORTED_IN_3_0 {
        map.remove(*key);
    }

    if map.get("type").and_then(Value::as_str) == Some("null") {
        map.remove("type");
        map.remove("const");
        map.insert("nullable".into(), json!(true));
        map.insert("enum".into(), json!([null]));
    }

    if let Some(value) = map.remove("const") {
        map.insert("enum".into(), json!([value]));
    }

    for (exclusive, inclusive) in [
        ("exclusiveMinimum", "minimum"),
        ("exclusiveMaximum", "maximum"),
    ] {
        if let Some(bound) = map.get(exclusive).filter(|v| v.is_number()).cloned() {
            map.insert(inclusive.into(), bound);
            map.insert(exclusive.into(), json!(true));
        }
    }

    if let Some(Value::Object(properties)) = map.get_mut("properties") {
        for property in properties.values_mut() {
            *property = to_oas_3_0(property);
        }
    }

    if let Some(Value::Object(defs)) = map.get_mut("$defs") {
        for def in defs.values_mut() {
            *def = to_oas_3_0(def);
        }
    }

    for key in SUBSCHEMA_KEYS {
        if let Some(child) = map.get_mut(*key) {
            let adapted = match &*child {
                Value::Array(members) => Value::Array(members.iter().map(to_oas_3_0).collect()),
                object @ Value::Object(_) => to_oas_3_0(object),
                other => other.clone(),
            };
            *child = adapted;
        }
    }

    if let Some(Value::Array(members)) = map.remove("prefixItems") {
        let len = members.len();
        let members: Vec<Value> = members.iter().map(to_oas_3_0).collect();
        map.insert("items".into(), json!({ "oneOf": members }));
        map.insert("minItems".into(), json!(len));
        map.insert("maxItems".into(), json!(len));
    }

    Value::Object(map)
}

/// Apply [`json_schema_to_oas`] to every entry of a components map.
pub(crate) fn adapt_components(
    components: Map<String, Value>,
    version: OasVersion,
) -> Map<String, Value> {
    components
        .into_iter()
        .map(|(name, schema)| {
            let adapted = json_schema_to_oas(&schema, version);
            (name, adapted)
        })
        .collect()
}
