//! Minimal OpenAPI document assembly from route schemas.
//!
//! Runs the per-route transform on every route, lays the fragments out as
//! operations under `paths`, then hands the document to the whole-document
//! transform.

use serde_json::{json, Map, Value};

use crate::convert::registry_to_json;
use crate::error::TransformError;
use crate::oas::{adapt_components, OasVersion};
use crate::transform::{JsonSchemaTransform, JsonSchemaTransformObject, RouteSchema};
use crate::types::{Direction, COMPONENTS_PREFIX, DEFS_PREFIX};

const DEFAULT_RESPONSE_DESCRIPTION: &str = "Default Response";

#[derive(Debug, Clone)]
struct Route {
    method: String,
    url: String,
    schema: Option<RouteSchema>,
}

/// Collects routes and builds an OpenAPI document from them.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    root: Value,
    routes: Vec<Route>,
    transform: JsonSchemaTransform,
    transform_object: JsonSchemaTransformObject,
}

impl DocumentBuilder {
    /// Start from a base document (`openapi`, `info`, `servers`, ...).
    pub fn new(root: Value) -> Self {
        Self {
            root,
            routes: Vec::new(),
            transform: JsonSchemaTransform::default(),
            transform_object: JsonSchemaTransformObject::default(),
        }
    }

    pub fn with_transform(mut self, transform: JsonSchemaTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_transform_object(mut self, transform_object: JsonSchemaTransformObject) -> Self {
        self.transform_object = transform_object;
        self
    }

    /// Add a route. `url` uses `:name` path parameters.
    pub fn route(
        mut self,
        method: impl Into<String>,
        url: impl Into<String>,
        schema: impl Into<Option<RouteSchema>>,
    ) -> Self {
        self.routes.push(Route {
            method: method.into(),
            url: url.into(),
            schema: schema.into(),
        });
        self
    }

    /// Build the document.
    ///
    /// # Errors
    ///
    /// Propagates any `TransformError` from the route or document transforms.
    pub fn build(&self) -> Result<Value, TransformError> {
        let version = OasVersion::detect(&self.root)?;
        let registered = adapt_components(
            registry_to_json(self.transform.registry(), Direction::Input)?,
            version,
        );

        let mut paths = match self.root.get("paths") {
            Some(Value::Object(existing)) => existing.clone(),
            _ => Map::new(),
        };
        let mut documented = 0usize;

        for route in &self.routes {
            let transformed =
                self.transform
                    .transform(&route.url, route.schema.as_ref(), version)?;
            if transformed.is_hidden() {
                continue;
            }

            let operation = build_operation(transformed.schema.as_ref(), &registered);
            let item = paths
                .entry(openapi_path(&route.url))
                .or_insert_with(|| json!({}));
            if let Value::Object(item) = item {
                item.insert(route.method.to_lowercase(), operation);
            }
            documented += 1;
        }

        let mut document = self.root.clone();
        if let Value::Object(root) = &mut document {
            root.insert("paths".into(), Value::Object(paths));
        }
        tracing::debug!(
            routes = self.routes.len(),
            documented,
            version = version.as_str(),
            "assembled OpenAPI document"
        );

        self.transform_object.transform(document)
    }
}

/// `/users/:id` to `/users/{id}`.
pub fn openapi_path(url: &str) -> String {
    url.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_operation(schema: Option<&Value>, registered: &Map<String, Value>) -> Value {
    let mut operation = Map::new();
    let mut parameters = Vec::new();
    let mut responses = Map::new();

    if let Some(Value::Object(schema)) = schema {
        for (key, fragment) in schema {
            match key.as_str() {
                "body" => {
                    operation.insert(
                        "requestBody".into(),
                        json!({ "content": { "application/json": { "schema": fragment } } }),
                    );
                }
                "querystring" => parameters.extend(parameters_of(fragment, "query", registered)),
                "params" => parameters.extend(parameters_of(fragment, "path", registered)),
                "headers" => parameters.extend(parameters_of(fragment, "header", registered)),
                "response" => {
                    if let Value::Object(declared) = fragment {
                        for (status, response) in declared {
                            responses.insert(status.clone(), response_object(response));
                        }
                    }
                }
                "hide" => {}
                _ => {
                    operation.insert(key.clone(), fragment.clone());
                }
            }
        }
    }

    if !parameters.is_empty() {
        operation.insert("parameters".into(), Value::Array(parameters));
    }
    if responses.is_empty() {
        responses.insert(
            "200".into(),
            json!({ "description": DEFAULT_RESPONSE_DESCRIPTION }),
        );
    }
    operation.insert("responses".into(), Value::Object(responses));
    Value::Object(operation)
}

/// One parameter per property of an object fragment.
///
/// A fragment referencing a registered component is expanded from the
/// component so each field still becomes its own parameter. Properties that
/// point into the fragment's `$defs` take a copy of them along, so the
/// definitions are hoisted with the rest of the document.
fn parameters_of(fragment: &Value, location: &str, registered: &Map<String, Value>) -> Vec<Value> {
    let fragment = fragment
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|pointer| pointer.strip_prefix(COMPONENTS_PREFIX))
        .and_then(|name| registered.get(name))
        .unwrap_or(fragment);

    let Some(Value::Object(properties)) = fragment.get("properties") else {
        return Vec::new();
    };
    let defs = fragment.get("$defs").filter(|defs| defs.is_object());
    let required: Vec<&str> = fragment
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, schema)| {
            let mut parameter = Map::new();
            parameter.insert("name".into(), json!(name));
            parameter.insert("in".into(), json!(location));
            parameter.insert(
                "required".into(),
                json!(location == "path" || required.contains(&name.as_str())),
            );
            if let Some(description) = schema.get("description") {
                parameter.insert("description".into(), description.clone());
            }
            let mut schema = schema.clone();
            if let Some(defs) = defs.filter(|_| uses_local_defs(&schema)) {
                if let Value::Object(map) = &mut schema {
                    map.insert("$defs".into(), defs.clone());
                }
            }
            parameter.insert("schema".into(), schema);
            Value::Object(parameter)
        })
        .collect()
}

fn uses_local_defs(node: &Value) -> bool {
    match node {
        Value::Object(map) => map.iter().any(|(key, child)| match child {
            Value::String(pointer) if key == "$ref" => pointer.starts_with(DEFS_PREFIX),
            _ => uses_local_defs(child),
        }),
        Value::Array(items) => items.iter().any(uses_local_defs),
        _ => false,
    }
}

fn response_object(fragment: &Value) -> Value {
    let description = fragment
        .get("description")
        .cloned()
        .unwrap_or_else(|| json!(DEFAULT_RESPONSE_DESCRIPTION));

    if let Some(content) = fragment.get("content") {
        return json!({ "description": description, "content": content });
    }
    if is_empty_body(fragment) {
        return json!({ "description": description });
    }
    json!({
        "description": description,
        "content": { "application/json": { "schema": fragment } }
    })
}

/// Whether a response fragment describes "no body": `null` in either the
/// 3.1 or the 3.0 spelling. `{}` accepts any body and keeps its content.
fn is_empty_body(fragment: &Value) -> bool {
    let Value::Object(map) = fragment else {
        return false;
    };
    let body: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| key.as_str() != "description")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    body.get("type").and_then(Value::as_str) == Some("null")
        || Value::Object(body) == json!({ "nullable": true, "enum": [null] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn converts_path_parameters() {
        assert_eq!(openapi_path("/users/:id/posts/:post"), "/users/{id}/posts/{post}");
        assert_eq!(openapi_path("/health"), "/health");
    }

    #[test]
    fn empty_bodies_have_no_content() {
        assert!(!is_empty_body(&json!({})));
        assert!(!is_empty_body(&json!({ "description": "anything" })));
        assert!(is_empty_body(&json!({ "type": "null" })));
        assert!(is_empty_body(&json!({ "nullable": true, "enum": [null] })));
        assert!(is_empty_body(&json!({ "type": "null", "description": "nothing" })));
        assert!(!is_empty_body(&json!({ "type": "string" })));
    }

    #[test]
    fn operation_without_schema_gets_default_response() {
        let document = DocumentBuilder::new(json!({ "openapi": "3.0.3" }))
            .route("GET", "/health", None)
            .build()
            .unwrap();
        assert_eq!(
            document["paths"]["/health"]["get"],
            json!({ "responses": { "200": { "description": "Default Response" } } })
        );
    }

    #[test]
    fn querystring_properties_become_parameters() {
        let query = Schema::object([
            ("q", Schema::string().describe("search text")),
            ("limit", Schema::number().optional()),
        ]);
        let document = DocumentBuilder::new(json!({ "openapi": "3.1.0" }))
            .route("GET", "/search", RouteSchema::new().querystring(query))
            .build()
            .unwrap();

        assert_eq!(
            document["paths"]["/search"]["get"]["parameters"],
            json!([
                {
                    "name": "q",
                    "in": "query",
                    "required": true,
                    "description": "search text",
                    "schema": { "type": "string", "description": "search text" }
                },
                {
                    "name": "limit",
                    "in": "query",
                    "required": false,
                    "schema": { "type": "number" }
                }
            ])
        );
    }

    #[test]
    fn any_response_keeps_content() {
        let document = DocumentBuilder::new(json!({ "openapi": "3.1.0" }))
            .route("GET", "/raw", RouteSchema::new().response(200, Schema::any()))
            .build()
            .unwrap();
        assert_eq!(
            document["paths"]["/raw"]["get"]["responses"]["200"],
            json!({
                "description": "Default Response",
                "content": { "application/json": { "schema": {} } }
            })
        );
    }

    #[test]
    fn recursive_parameter_carries_its_defs() {
        let fragment = json!({
            "type": "object",
            "properties": {
                "filter": { "$ref": "#/$defs/__schema0" },
                "page": { "type": "number" }
            },
            "required": ["filter"],
            "$defs": { "__schema0": { "type": "object" } }
        });
        let parameters = parameters_of(&fragment, "query", &Map::new());

        assert_eq!(
            parameters[0]["schema"],
            json!({
                "$ref": "#/$defs/__schema0",
                "$defs": { "__schema0": { "type": "object" } }
            })
        );
        assert_eq!(parameters[1]["schema"], json!({ "type": "number" }));
    }

    #[test]
    fn hidden_routes_are_left_out() {
        let document = DocumentBuilder::new(json!({ "openapi": "3.0.3" }))
            .route("GET", "/secret", RouteSchema::new().hide(true))
            .route("GET", "/documentation/json", RouteSchema::new())
            .build()
            .unwrap();
        assert_eq!(document["paths"], json!({}));
    }
}
