//! Documentation hooks: per-route schema transform and whole-document transform.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Map, Value};

use crate::convert::{registry_to_json, schema_to_json};
use crate::dedup::{canonical_key, deduplicate, schemas_mut};
use crate::error::TransformError;
use crate::oas::{adapt_components, json_schema_to_oas, OasVersion};
use crate::registry::Registry;
use crate::schema::{Schema, SchemaRef};
use crate::types::{Direction, COMPONENTS_PREFIX, DEFAULT_SKIP_LIST, DEFS_PREFIX};

/// Schemas and documentation metadata a route declares.
#[derive(Debug, Clone, Default)]
pub struct RouteSchema {
    pub headers: Option<SchemaRef>,
    pub querystring: Option<SchemaRef>,
    pub body: Option<SchemaRef>,
    pub params: Option<SchemaRef>,
    /// Status code (or range such as `2xx`, or `default`) to response schema.
    pub response: Vec<(String, ResponseSchema)>,
    /// Keep the route out of the generated document.
    pub hide: bool,
    /// Everything else (`description`, `summary`, `tags`, ...), copied verbatim.
    pub meta: Map<String, Value>,
}

impl RouteSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(mut self, schema: impl Into<SchemaRef>) -> Self {
        self.headers = Some(schema.into());
        self
    }

    pub fn querystring(mut self, schema: impl Into<SchemaRef>) -> Self {
        self.querystring = Some(schema.into());
        self
    }

    pub fn body(mut self, schema: impl Into<SchemaRef>) -> Self {
        self.body = Some(schema.into());
        self
    }

    pub fn params(mut self, schema: impl Into<SchemaRef>) -> Self {
        self.params = Some(schema.into());
        self
    }

    pub fn response(mut self, status: impl ToString, schema: impl Into<ResponseSchema>) -> Self {
        self.response.push((status.to_string(), schema.into()));
        self
    }

    pub fn hide(mut self, hide: bool) -> Self {
        self.hide = hide;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Schema for a response status, if declared.
    pub fn response_for(&self, status: &str) -> Option<&ResponseSchema> {
        self.response
            .iter()
            .find(|(code, _)| code == status)
            .map(|(_, schema)| schema)
    }
}

/// Declared schema of one response status.
#[derive(Debug, Clone)]
pub enum ResponseSchema {
    /// A single schema, documented as `application/json`.
    Schema(SchemaRef),
    /// Schemas per media type.
    Content {
        description: Option<String>,
        content: Vec<(String, SchemaRef)>,
    },
}

impl ResponseSchema {
    /// Start a per-media-type response.
    pub fn content(media_type: impl Into<String>, schema: impl Into<SchemaRef>) -> Self {
        ResponseSchema::Content {
            description: None,
            content: vec![(media_type.into(), schema.into())],
        }
    }

    /// Add another media type. Turns a single-schema response into a
    /// per-media-type one keyed `application/json`.
    pub fn and_content(self, media_type: impl Into<String>, schema: impl Into<SchemaRef>) -> Self {
        let (description, mut content) = match self {
            ResponseSchema::Schema(existing) => {
                (None, vec![("application/json".to_string(), existing)])
            }
            ResponseSchema::Content {
                description,
                content,
            } => (description, content),
        };
        content.push((media_type.into(), schema.into()));
        ResponseSchema::Content {
            description,
            content,
        }
    }

    pub fn describe(self, text: impl Into<String>) -> Self {
        match self {
            ResponseSchema::Schema(schema) => ResponseSchema::Content {
                description: Some(text.into()),
                content: vec![("application/json".to_string(), schema)],
            },
            ResponseSchema::Content { content, .. } => ResponseSchema::Content {
                description: Some(text.into()),
                content,
            },
        }
    }

    /// The schema used to serialize `application/json` (or the only) output.
    pub fn primary(&self) -> Option<&SchemaRef> {
        match self {
            ResponseSchema::Schema(schema) => Some(schema),
            ResponseSchema::Content { content, .. } => content
                .iter()
                .find(|(media, _)| media == "application/json")
                .or_else(|| content.first())
                .map(|(_, schema)| schema),
        }
    }
}

impl From<Schema> for ResponseSchema {
    fn from(schema: Schema) -> Self {
        ResponseSchema::Schema(schema.into())
    }
}

impl From<&Schema> for ResponseSchema {
    fn from(schema: &Schema) -> Self {
        ResponseSchema::Schema(schema.into())
    }
}

impl From<SchemaRef> for ResponseSchema {
    fn from(schema: SchemaRef) -> Self {
        ResponseSchema::Schema(schema)
    }
}

/// Options for the per-route transform.
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Route URLs kept out of the document, matched exactly.
    pub skip_list: Vec<String>,
    pub registry: Registry,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            skip_list: DEFAULT_SKIP_LIST.iter().map(|s| s.to_string()).collect(),
            registry: Registry::default(),
        }
    }
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the skip list.
    pub fn skip_list<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_list = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }
}

/// Route as handed back to the documentation generator.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRoute {
    /// `None` when the route declared no schema at all.
    pub schema: Option<Value>,
    pub url: String,
}

impl TransformedRoute {
    pub fn is_hidden(&self) -> bool {
        self.schema
            .as_ref()
            .and_then(|s| s.get("hide"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Per-route documentation hook.
///
/// Converts request fields in input direction and responses in output
/// direction, adapted to the target OpenAPI version.
#[derive(Debug, Clone, Default)]
pub struct JsonSchemaTransform {
    options: TransformOptions,
}

impl JsonSchemaTransform {
    pub fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    pub fn registry(&self) -> &Registry {
        &self.options.registry
    }

    /// Transform one route's schema.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::InvalidSchema` if a field holds raw JSON
    /// instead of a schema.
    pub fn transform(
        &self,
        url: &str,
        schema: Option<&RouteSchema>,
        version: OasVersion,
    ) -> Result<TransformedRoute, TransformError> {
        let Some(schema) = schema else {
            return Ok(TransformedRoute {
                schema: None,
                url: url.to_string(),
            });
        };

        if schema.hide || self.options.skip_list.iter().any(|skip| skip == url) {
            tracing::debug!(url, "route hidden from documentation");
            return Ok(TransformedRoute {
                schema: Some(json!({ "hide": true })),
                url: url.to_string(),
            });
        }

        let mut transformed = Map::new();

        let request_fields = [
            ("headers", &schema.headers),
            ("querystring", &schema.querystring),
            ("body", &schema.body),
            ("params", &schema.params),
        ];
        for (field, declared) in request_fields {
            if let Some(declared) = declared {
                let fragment = self.convert(declared, Direction::Input, version)?;
                transformed.insert(field.into(), fragment);
            }
        }

        if !schema.response.is_empty() {
            let mut responses = Map::new();
            for (status, declared) in &schema.response {
                responses.insert(status.clone(), self.convert_response(declared, version)?);
            }
            transformed.insert("response".into(), Value::Object(responses));
        }

        for (key, value) in &schema.meta {
            if is_truthy(value) {
                transformed.insert(key.clone(), value.clone());
            }
        }

        Ok(TransformedRoute {
            schema: Some(Value::Object(transformed)),
            url: url.to_string(),
        })
    }

    fn convert(
        &self,
        declared: &SchemaRef,
        direction: Direction,
        version: OasVersion,
    ) -> Result<Value, TransformError> {
        let schema = declared.resolve()?;
        let fragment = schema_to_json(schema, &self.options.registry, direction);
        Ok(json_schema_to_oas(&fragment, version))
    }

    fn convert_response(
        &self,
        declared: &ResponseSchema,
        version: OasVersion,
    ) -> Result<Value, TransformError> {
        match declared {
            ResponseSchema::Schema(schema) => self.convert(schema, Direction::Output, version),
            ResponseSchema::Content {
                description,
                content,
            } => {
                let mut media = Map::new();
                for (media_type, schema) in content {
                    let fragment = self.convert(schema, Direction::Output, version)?;
                    media.insert(media_type.clone(), json!({ "schema": fragment }));
                }
                let mut response = Map::new();
                if let Some(description) = description {
                    response.insert("description".into(), json!(description));
                }
                response.insert("content".into(), Value::Object(media));
                Ok(Value::Object(response))
            }
        }
    }
}

/// Only truthy metadata is carried over (`false`, `0`, `""` and `null` are dropped).
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Options for the whole-document transform.
#[derive(Debug, Clone, Default)]
pub struct TransformObjectOptions {
    /// Registered schemas, emitted as input and output components.
    pub registry: Registry,
    /// Named schemas for structural deduplication, in order.
    pub schemas: Vec<(String, Schema)>,
}

impl TransformObjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a named schema whose structural copies become `$ref`s.
    pub fn schema(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.schemas.push((name.into(), schema));
        self
    }
}

/// Whole-document documentation hook.
#[derive(Debug, Clone, Default)]
pub struct JsonSchemaTransformObject {
    options: TransformObjectOptions,
}

impl JsonSchemaTransformObject {
    pub fn new(options: TransformObjectOptions) -> Self {
        Self { options }
    }

    /// Finalize a document assembled from transformed routes.
    ///
    /// Adds registry components in both directions, hoists fragment-local
    /// `$defs` into `components.schemas`, then deduplicates against the named
    /// schemas.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::SwaggerUnsupported` or
    /// `TransformError::UnsupportedVersion` for documents this crate cannot
    /// target, and `TransformError::ComponentCollision` when an input and an
    /// output component end up with the same name.
    pub fn transform(&self, mut document: Value) -> Result<Value, TransformError> {
        let version = OasVersion::detect(&document)?;
        let registry = &self.options.registry;

        if !registry.is_empty() {
            let components = registry_components(registry, version)?;
            if let Value::Object(root) = &mut document {
                let schemas = schemas_mut(root);
                for (name, fragment) in components {
                    schemas.insert(name, fragment);
                }
            }
        }

        if !self.options.schemas.is_empty() {
            let named: Map<String, Value> = self
                .options
                .schemas
                .iter()
                .map(|(name, schema)| {
                    let fragment = schema_to_json(schema, registry, Direction::Output);
                    (name.clone(), json_schema_to_oas(&fragment, version))
                })
                .collect();
            document = deduplicate(document, &named);
        }

        hoist_local_defs(&mut document);

        tracing::debug!(
            version = version.as_str(),
            "finalized OpenAPI document"
        );
        Ok(document)
    }
}

/// Input and output components of a registry, adapted to `version`.
///
/// # Errors
///
/// Returns `TransformError::ComponentCollision` if an output name is also an
/// input name, or if one id is registered for two schemas.
pub fn registry_components(
    registry: &Registry,
    version: OasVersion,
) -> Result<Map<String, Value>, TransformError> {
    let input = registry_to_json(registry, Direction::Input)?;
    let output = registry_to_json(registry, Direction::Output)?;

    if let Some(name) = output.keys().find(|name| input.contains_key(name.as_str())) {
        return Err(TransformError::ComponentCollision { name: name.clone() });
    }

    let mut merged = adapt_components(input, version);
    merged.extend(adapt_components(output, version));
    Ok(merged)
}

/// Move every fragment-local `$defs` map into `components.schemas`.
///
/// Identical definition sets share component names; a clash with an existing
/// component name gets a numeric suffix. Local pointers are rewritten to
/// component pointers.
fn hoist_local_defs(document: &mut Value) {
    let Value::Object(root) = document else {
        return;
    };

    let taken = root
        .get("components")
        .and_then(|components| components.get("schemas"))
        .and_then(Value::as_object)
        .map(|schemas| schemas.keys().cloned().collect())
        .unwrap_or_default();
    let mut hoister = Hoister {
        taken,
        ..Hoister::default()
    };
    for value in root.values_mut() {
        hoister.visit(value);
    }

    if !hoister.hoisted.is_empty() {
        tracing::debug!(count = hoister.hoisted.len(), "hoisted local definitions");
        let schemas = schemas_mut(root);
        for (name, definition) in hoister.hoisted {
            schemas.insert(name, definition);
        }
    }
}

#[derive(Default)]
struct Hoister {
    taken: HashSet<String>,
    /// Canonical definition set plus local name, to component name.
    seen: HashMap<String, String>,
    hoisted: Vec<(String, Value)>,
}

impl Hoister {
    fn visit(&mut self, node: &mut Value) {
        match node {
            Value::Object(map) => {
                if let Some(Value::Object(defs)) = map.remove("$defs") {
                    let renames = self.allocate(&defs);
                    for child in map.values_mut() {
                        rename_refs(child, &renames);
                    }
                    for (local, mut definition) in defs {
                        let name = &renames[&local];
                        if self.hoisted.iter().any(|(taken, _)| taken == name) {
                            continue;
                        }
                        rename_refs(&mut definition, &renames);
                        self.hoisted.push((name.clone(), definition));
                    }
                    if let Some(Value::String(pointer)) = map.get_mut("$ref") {
                        rename_pointer(pointer, &renames);
                    }
                }
                for child in map.values_mut() {
                    self.visit(child);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.visit(item);
                }
            }
            _ => {}
        }
    }

    fn allocate(&mut self, defs: &Map<String, Value>) -> HashMap<String, String> {
        let set_key = canonical_key(&Value::Object(defs.clone()));
        let mut renames = HashMap::new();

        for local in defs.keys() {
            let seen_key = format!("{set_key}#{local}");
            let name = match self.seen.get(&seen_key) {
                Some(name) => name.clone(),
                None => {
                    let name = self.free_name(local);
                    self.taken.insert(name.clone());
                    self.seen.insert(seen_key, name.clone());
                    name
                }
            };
            renames.insert(local.clone(), name);
        }
        renames
    }

    fn free_name(&self, local: &str) -> String {
        if !self.taken.contains(local) {
            return local.to_string();
        }
        (1..)
            .map(|n| format!("{local}_{n}"))
            .find(|candidate| !self.taken.contains(candidate))
            .unwrap_or_else(|| local.to_string())
    }
}

fn rename_refs(node: &mut Value, renames: &HashMap<String, String>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match child {
                    Value::String(pointer) if key == "$ref" => rename_pointer(pointer, renames),
                    _ => rename_refs(child, renames),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rename_refs(item, renames);
            }
        }
        _ => {}
    }
}

fn rename_pointer(pointer: &mut String, renames: &HashMap<String, String>) {
    let Some(local) = pointer.strip_prefix(DEFS_PREFIX) else {
        return;
    };
    if let Some(name) = renames.get(local) {
        *pointer = format!("{COMPONENTS_PREFIX}{name}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaMeta;

    fn login_schema() -> Schema {
        Schema::object([
            ("username", Schema::string().max_length(32).describe("someDescription")),
            ("seed", Schema::number().min(1.0).max(1000.0)),
            ("code", Schema::number().lt(10000.0)),
            ("password", Schema::string().max_length(32)),
        ])
    }

    #[test]
    fn missing_schema_passes_through() {
        let transform = JsonSchemaTransform::default();
        let route = transform
            .transform("/no-schema", None, OasVersion::V3_0)
            .unwrap();
        assert_eq!(route.schema, None);
        assert_eq!(route.url, "/no-schema");
    }

    #[test]
    fn skip_list_hides_route() {
        let transform = JsonSchemaTransform::default();
        let schema = RouteSchema::new().body(login_schema());
        let route = transform
            .transform("/documentation/json", Some(&schema), OasVersion::V3_0)
            .unwrap();
        assert_eq!(route.schema, Some(json!({ "hide": true })));
        assert!(route.is_hidden());
    }

    #[test]
    fn hide_flag_hides_route() {
        let transform = JsonSchemaTransform::default();
        let schema = RouteSchema::new().body(login_schema()).hide(true);
        let route = transform
            .transform("/login", Some(&schema), OasVersion::V3_0)
            .unwrap();
        assert_eq!(route.schema, Some(json!({ "hide": true })));
    }

    #[test]
    fn partitions_fields_and_copies_truthy_meta() {
        let transform = JsonSchemaTransform::default();
        let schema = RouteSchema::new()
            .body(login_schema())
            .response(200, Schema::string())
            .meta("description", "login route")
            .meta("tags", json!(["auth"]))
            .meta("deprecated", false);
        let route = transform
            .transform("/login", Some(&schema), OasVersion::V3_0)
            .unwrap();
        let transformed = route.schema.unwrap();

        assert_eq!(transformed["body"]["type"], json!("object"));
        assert_eq!(
            transformed["body"]["properties"]["code"],
            json!({ "type": "number", "exclusiveMaximum": true, "maximum": 10000 })
        );
        assert_eq!(transformed["response"]["200"], json!({ "type": "string" }));
        assert_eq!(transformed["description"], json!("login route"));
        assert_eq!(transformed["tags"], json!(["auth"]));
        assert!(transformed.get("deprecated").is_none());
        assert!(transformed.get("hide").is_none());
    }

    #[test]
    fn raw_json_field_is_invalid_schema() {
        let transform = JsonSchemaTransform::default();
        let schema = RouteSchema::new().body(SchemaRef::Raw(json!({ "type": "string" })));
        let err = transform
            .transform("/login", Some(&schema), OasVersion::V3_0)
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidSchema { .. }));
    }

    #[test]
    fn properties_wrapper_is_unwrapped() {
        let transform = JsonSchemaTransform::default();
        let schema =
            RouteSchema::new().response(200, SchemaRef::Properties(Schema::boolean()));
        let route = transform
            .transform("/", Some(&schema), OasVersion::V3_1)
            .unwrap();
        assert_eq!(
            route.schema.unwrap()["response"]["200"],
            json!({ "type": "boolean" })
        );
    }

    #[test]
    fn content_response_maps_media_types() {
        let transform = JsonSchemaTransform::default();
        let schema = RouteSchema::new().response(
            200,
            ResponseSchema::content("application/json", Schema::string())
                .and_content("text/plain", Schema::string())
                .describe("ok"),
        );
        let route = transform
            .transform("/", Some(&schema), OasVersion::V3_1)
            .unwrap();
        assert_eq!(
            route.schema.unwrap()["response"]["200"],
            json!({
                "description": "ok",
                "content": {
                    "application/json": { "schema": { "type": "string" } },
                    "text/plain": { "schema": { "type": "string" } }
                }
            })
        );
    }

    #[test]
    fn registry_components_cover_both_directions() {
        let user = Schema::object([
            ("id", Schema::string().default_value("1")),
            ("createdAt", Schema::date()),
        ]);
        let registry = Registry::new().with(&user, SchemaMeta::with_id("User"));
        let components = registry_components(&registry, OasVersion::V3_0).unwrap();

        assert_eq!(
            components.keys().collect::<Vec<_>>(),
            ["UserInput", "User"]
        );
        assert_eq!(components["UserInput"]["required"], json!(["createdAt"]));
        assert_eq!(components["User"]["required"], json!(["id", "createdAt"]));
        assert_eq!(
            components["User"]["properties"]["createdAt"],
            json!({ "type": "string", "format": "date-time" })
        );
    }

    #[test]
    fn colliding_names_abort() {
        let user = Schema::object([("id", Schema::string())]);
        let user_input = Schema::object([("name", Schema::string())]);
        let registry = Registry::new()
            .with(&user, SchemaMeta::with_id("User"))
            .with(&user_input, SchemaMeta::with_id("UserInput"));

        let err = registry_components(&registry, OasVersion::V3_0).unwrap_err();
        assert!(matches!(
            err,
            TransformError::ComponentCollision { name } if name == "UserInput"
        ));
    }

    #[test]
    fn one_id_for_two_schemas_aborts() {
        let first = Schema::object([("a", Schema::string())]);
        let second = Schema::object([("b", Schema::number())]);
        let registry = Registry::new()
            .with(&first, SchemaMeta::with_id("User"))
            .with(&second, SchemaMeta::with_id("User"));

        let err = registry_components(&registry, OasVersion::V3_1).unwrap_err();
        assert!(matches!(
            err,
            TransformError::ComponentCollision { name } if name == "UserInput"
        ));
    }

    #[test]
    fn response_lookup_by_status() {
        let schema = RouteSchema::new()
            .response(200, Schema::string())
            .response(
                404,
                ResponseSchema::content("text/plain", Schema::string())
                    .and_content("application/json", Schema::number()),
            );

        assert!(schema.response_for("500").is_none());
        let ok = schema.response_for("200").and_then(ResponseSchema::primary);
        assert!(matches!(ok, Some(SchemaRef::Schema(_))));

        let missing = schema
            .response_for("404")
            .and_then(ResponseSchema::primary)
            .and_then(|schema| schema.resolve().ok())
            .map(|schema| schema_to_json(schema, &Registry::new(), Direction::Output));
        assert_eq!(missing, Some(json!({ "type": "number" })));
    }

    #[test]
    fn hoists_local_defs_into_components() {
        let mut document = json!({
            "openapi": "3.1.0",
            "paths": {
                "/a": { "schema": {
                    "$ref": "#/$defs/__schema0",
                    "$defs": { "__schema0": {
                        "type": "object",
                        "properties": { "next": { "$ref": "#/$defs/__schema0" } }
                    }}
                }},
                "/b": { "schema": {
                    "$ref": "#/$defs/__schema0",
                    "$defs": { "__schema0": {
                        "type": "object",
                        "properties": { "next": { "$ref": "#/$defs/__schema0" } }
                    }}
                }},
                "/c": { "schema": {
                    "$ref": "#/$defs/__schema0",
                    "$defs": { "__schema0": { "type": "array", "items": { "$ref": "#/$defs/__schema0" } } }
                }}
            }
        });
        hoist_local_defs(&mut document);

        assert_eq!(
            document["paths"]["/a"]["schema"],
            json!({ "$ref": "#/components/schemas/__schema0" })
        );
        assert_eq!(document["paths"]["/b"]["schema"], document["paths"]["/a"]["schema"]);
        assert_eq!(
            document["paths"]["/c"]["schema"],
            json!({ "$ref": "#/components/schemas/__schema0_1" })
        );

        let schemas = document["components"]["schemas"].as_object().unwrap();
        assert_eq!(schemas.len(), 2);
        assert_eq!(
            schemas["__schema0"]["properties"]["next"],
            json!({ "$ref": "#/components/schemas/__schema0" })
        );
        assert_eq!(
            schemas["__schema0_1"]["items"],
            json!({ "$ref": "#/components/schemas/__schema0_1" })
        );
    }

    #[test]
    fn transform_object_rejects_swagger() {
        let transform = JsonSchemaTransformObject::default();
        let err = transform.transform(json!({ "swagger": "2.0" })).unwrap_err();
        assert_eq!(err.to_string(), "OpenAPI 2.0 is not supported");
    }
}
