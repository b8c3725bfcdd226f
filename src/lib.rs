//! Schema Provider
//!
//! Typed request/response schemas for HTTP routes, with OpenAPI generation.
//!
//! One [`Schema`] per route field drives three things: request validation,
//! response serialization, and the route's entry in an OpenAPI 3.0 or 3.1
//! document. Schemas registered under an id in a [`Registry`] are emitted once
//! under `components.schemas` and referenced everywhere else.
//!
//! # Example
//!
//! ```
//! use schema_provider::{
//!     DocumentBuilder, JsonSchemaTransform, JsonSchemaTransformObject, Registry,
//!     RouteSchema, Schema, SchemaMeta, TransformObjectOptions, TransformOptions,
//! };
//! use serde_json::json;
//!
//! let user = Schema::object([
//!     ("id", Schema::string()),
//!     ("name", Schema::string().max_length(64)),
//! ]);
//! let registry = Registry::new().with(&user, SchemaMeta::with_id("User"));
//!
//! let document = DocumentBuilder::new(json!({ "openapi": "3.1.0" }))
//!     .with_transform(JsonSchemaTransform::new(
//!         TransformOptions::new().registry(registry.clone()),
//!     ))
//!     .with_transform_object(JsonSchemaTransformObject::new(
//!         TransformObjectOptions::new().registry(registry),
//!     ))
//!     .route("GET", "/users/:id", RouteSchema::new().response(200, &user))
//!     .build()
//!     .unwrap();
//!
//! // The response references the output component.
//! assert_eq!(
//!     document["paths"]["/users/{id}"]["get"]["responses"]["200"]["content"]
//!         ["application/json"]["schema"],
//!     json!({ "$ref": "#/components/schemas/User" })
//! );
//! // Both directions are emitted as components.
//! assert!(document["components"]["schemas"].get("UserInput").is_some());
//! ```
//!
//! # Directions
//!
//! | Concern | Input (request) | Output (response) |
//! |---------|-----------------|-------------------|
//! | Component name | `<id>Input` | `<id>` |
//! | Defaulted field | optional | required |
//! | Unknown keys (strip objects) | allowed | `additionalProperties: false` |
//! | Date | `{}` | `string`, `date-time` |
//!
//! # Validation
//!
//! ```
//! use schema_provider::{validator_compiler, RouteContext, Schema, SchemaRef};
//! use serde_json::json;
//!
//! let body: SchemaRef = Schema::object([("name", Schema::string())]).into();
//! let validator = validator_compiler(RouteContext::new("POST", "/users", &body)).unwrap();
//!
//! let err = validator.validate(Some(&json!({}))).unwrap_err();
//! assert_eq!(err.issues[0].instance_path, "/name");
//! ```

mod compiler;
mod convert;
mod dedup;
mod document;
mod error;
mod oas;
mod parse;
mod registry;
mod schema;
mod transform;
mod types;

pub use compiler::{
    create_serializer_compiler, serializer_compiler, validator_compiler, Replacer, RouteContext,
    Serializer, SerializerOptions, Validator,
};
pub use convert::{registry_to_json, schema_to_json};
pub use dedup::{canonical_key, deduplicate, ComponentMap};
pub use document::{openapi_path, DocumentBuilder};
pub use error::{ResponseSerializationError, TransformError, ValidationError, ValidationIssue};
pub use oas::{json_schema_to_oas, OasVersion};
pub use parse::{Issue, IssueCode, PathSegment};
pub use registry::{Registry, SchemaMeta};
pub use schema::{Schema, SchemaRef, StringFormat, UnknownKeys};
pub use transform::{
    registry_components, JsonSchemaTransform, JsonSchemaTransformObject, ResponseSchema,
    RouteSchema, TransformObjectOptions, TransformOptions, TransformedRoute,
};
pub use types::{Direction, COMPONENTS_PREFIX, DEFAULT_SKIP_LIST, DEFS_PREFIX};
