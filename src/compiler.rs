//! Request validators and response serializers compiled from route schemas.
//!
//! Compilation happens once per route; the returned values are cheap to call
//! on every request and can be shared across threads.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{ResponseSerializationError, TransformError, ValidationError};
use crate::schema::{Schema, SchemaRef};

/// Custom JSON replacer, called with each key (`""` for the root, indices as
/// strings inside arrays) and the value about to be written.
pub type Replacer = Arc<dyn Fn(&str, Value) -> Value + Send + Sync>;

/// Route data handed to a compiler.
#[derive(Debug, Clone, Copy)]
pub struct RouteContext<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub schema: &'a SchemaRef,
}

impl<'a> RouteContext<'a> {
    pub fn new(method: &'a str, url: &'a str, schema: &'a SchemaRef) -> Self {
        Self {
            method,
            url,
            schema,
        }
    }
}

/// Parses request data (body, querystring, params or headers).
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Schema,
}

impl Validator {
    /// # Errors
    ///
    /// Returns `TransformError::InvalidSchema` for raw JSON schemas.
    pub fn new(schema: &SchemaRef) -> Result<Self, TransformError> {
        Ok(Self {
            schema: schema.resolve()?.clone(),
        })
    }

    /// Parse `data`, returning the normalized value.
    ///
    /// Absent input that the schema accepts comes back as `null`.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` listing every failing constraint.
    pub fn validate(&self, data: Option<&Value>) -> Result<Value, ValidationError> {
        let parsed = self.schema.safe_parse(data)?;
        Ok(parsed.unwrap_or(Value::Null))
    }
}

/// Serializer configuration.
#[derive(Clone, Default)]
pub struct SerializerOptions {
    pub replacer: Option<Replacer>,
}

impl SerializerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replacer<F>(mut self, replacer: F) -> Self
    where
        F: Fn(&str, Value) -> Value + Send + Sync + 'static,
    {
        self.replacer = Some(Arc::new(replacer));
        self
    }
}

impl fmt::Debug for SerializerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerOptions")
            .field("replacer", &self.replacer.as_ref().map(|_| "Fn"))
            .finish()
    }
}

/// Checks handler output against the response schema and writes it as JSON.
#[derive(Clone)]
pub struct Serializer {
    schema: Schema,
    method: String,
    url: String,
    replacer: Option<Replacer>,
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("replacer", &self.replacer.is_some())
            .finish_non_exhaustive()
    }
}

impl Serializer {
    /// # Errors
    ///
    /// Returns `TransformError::InvalidSchema` for raw JSON schemas.
    pub fn new(route: RouteContext<'_>, options: &SerializerOptions) -> Result<Self, TransformError> {
        Ok(Self {
            schema: route.schema.resolve()?.clone(),
            method: route.method.to_string(),
            url: route.url.to_string(),
            replacer: options.replacer.clone(),
        })
    }

    /// Parse `data` and write the result as JSON. Absent output writes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns a `ResponseSerializationError` when `data` does not match the
    /// schema.
    pub fn serialize(&self, data: Option<&Value>) -> Result<String, ResponseSerializationError> {
        let parsed = match self.schema.safe_parse(data) {
            Ok(parsed) => parsed,
            Err(cause) => {
                tracing::debug!(
                    method = %self.method,
                    url = %self.url,
                    issues = cause.issues.len(),
                    "response does not match its schema"
                );
                return Err(ResponseSerializationError {
                    method: self.method.clone(),
                    url: self.url.clone(),
                    cause,
                });
            }
        };

        let Some(value) = parsed else {
            return Ok(String::new());
        };
        let value = match &self.replacer {
            Some(replacer) => replace("", value, replacer.as_ref()),
            None => value,
        };
        Ok(value.to_string())
    }
}

/// Apply `replacer` to `value` and then to its children, outermost first.
fn replace(key: &str, value: Value, replacer: &(dyn Fn(&str, Value) -> Value + Send + Sync)) -> Value {
    match replacer(key, value) {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, child)| {
                    let child = replace(&key, child, replacer);
                    (key, child)
                })
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| replace(&index.to_string(), item, replacer))
                .collect(),
        ),
        other => other,
    }
}

/// Compile a request validator for a route.
///
/// # Errors
///
/// Returns `TransformError::InvalidSchema` for raw JSON schemas.
pub fn validator_compiler(route: RouteContext<'_>) -> Result<Validator, TransformError> {
    Validator::new(route.schema)
}

/// Compile a response serializer for a route with default options.
///
/// # Errors
///
/// Returns `TransformError::InvalidSchema` for raw JSON schemas.
pub fn serializer_compiler(route: RouteContext<'_>) -> Result<Serializer, TransformError> {
    Serializer::new(route, &SerializerOptions::default())
}

/// Build a serializer compiler that applies `options` to every route.
pub fn create_serializer_compiler(
    options: SerializerOptions,
) -> impl Fn(RouteContext<'_>) -> Result<Serializer, TransformError> + Send + Sync {
    move |route: RouteContext<'_>| Serializer::new(route, &options)
}
