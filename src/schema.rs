//! Runtime shape descriptions.
//!
//! A [`Schema`] is an immutable, cheaply cloned handle. Identity is handle
//! identity: clones of one handle are the same schema (this is what a
//! [`Registry`](crate::Registry) keys on), while two separately built shapes
//! are different schemas even if they look alike.
//!
//! Every modifier returns a new schema and leaves the receiver untouched.

use std::sync::{Arc, Weak};

use serde_json::Value;

use crate::error::TransformError;

/// Handle to a shape description.
#[derive(Debug, Clone)]
pub struct Schema(Arc<SchemaNode>);

#[derive(Debug, Clone)]
pub(crate) struct SchemaNode {
    pub(crate) kind: SchemaKind,
    pub(crate) description: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) enum SchemaKind {
    String(StringRules),
    Number(NumberRules),
    Boolean,
    Null,
    Undefined,
    Date,
    Literal(Value),
    Enum(Vec<String>),
    Array {
        items: Schema,
        min_items: Option<usize>,
        max_items: Option<usize>,
    },
    Tuple(Vec<Schema>),
    Object {
        fields: Vec<(String, Schema)>,
        unknown_keys: UnknownKeys,
    },
    Record {
        key: Schema,
        value: Schema,
    },
    Union(Vec<Schema>),
    Optional(Schema),
    Nullable(Schema),
    Default {
        inner: Schema,
        value: Value,
    },
    Any,
    /// Back-pointer created by [`Schema::recursive`].
    Lazy(Weak<SchemaNode>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StringRules {
    pub(crate) min_length: Option<usize>,
    pub(crate) max_length: Option<usize>,
    pub(crate) format: Option<StringFormat>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NumberRules {
    pub(crate) integer: bool,
    pub(crate) minimum: Option<f64>,
    pub(crate) maximum: Option<f64>,
    pub(crate) exclusive_minimum: Option<f64>,
    pub(crate) exclusive_maximum: Option<f64>,
    pub(crate) coerce: bool,
}

/// Well-known string formats, rendered as JSON Schema `format` and checked on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    Uuid,
    Uri,
    DateTime,
}

impl StringFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StringFormat::Uuid => "uuid",
            StringFormat::Uri => "uri",
            StringFormat::DateTime => "date-time",
        }
    }
}

/// How an object schema treats keys it does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownKeys {
    /// Drop them from parsed output.
    #[default]
    Strip,
    /// Keep them untouched.
    Passthrough,
    /// Report them as an `unrecognized_keys` issue.
    Strict,
}

impl Schema {
    fn from_kind(kind: SchemaKind) -> Self {
        Schema(Arc::new(SchemaNode {
            kind,
            description: None,
        }))
    }

    fn with_node(&self, edit: impl FnOnce(&mut SchemaNode)) -> Self {
        let mut node = (*self.0).clone();
        edit(&mut node);
        Schema(Arc::new(node))
    }

    pub fn string() -> Self {
        Self::from_kind(SchemaKind::String(StringRules::default()))
    }

    pub fn number() -> Self {
        Self::from_kind(SchemaKind::Number(NumberRules::default()))
    }

    pub fn integer() -> Self {
        Self::from_kind(SchemaKind::Number(NumberRules {
            integer: true,
            ..NumberRules::default()
        }))
    }

    pub fn boolean() -> Self {
        Self::from_kind(SchemaKind::Boolean)
    }

    pub fn null() -> Self {
        Self::from_kind(SchemaKind::Null)
    }

    /// Absence of a value. Renders as `null` in responses so it survives JSON.
    pub fn undefined() -> Self {
        Self::from_kind(SchemaKind::Undefined)
    }

    /// A point in time, exchanged as an RFC 3339 string.
    pub fn date() -> Self {
        Self::from_kind(SchemaKind::Date)
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::from_kind(SchemaKind::Literal(value.into()))
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_kind(SchemaKind::Enum(
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn array(items: Schema) -> Self {
        Self::from_kind(SchemaKind::Array {
            items,
            min_items: None,
            max_items: None,
        })
    }

    /// Fixed-length, positionally typed array.
    pub fn tuple(members: impl IntoIterator<Item = Schema>) -> Self {
        Self::from_kind(SchemaKind::Tuple(members.into_iter().collect()))
    }

    /// Object with the given fields, in declaration order.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        Self::from_kind(SchemaKind::Object {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            unknown_keys: UnknownKeys::default(),
        })
    }

    /// Object with arbitrary keys matching `key` and values matching `value`.
    pub fn record(key: Schema, value: Schema) -> Self {
        Self::from_kind(SchemaKind::Record { key, value })
    }

    pub fn union(members: impl IntoIterator<Item = Schema>) -> Self {
        Self::from_kind(SchemaKind::Union(members.into_iter().collect()))
    }

    pub fn any() -> Self {
        Self::from_kind(SchemaKind::Any)
    }

    /// Build a self-referencing schema.
    ///
    /// `build` receives a handle standing for the schema being defined:
    ///
    /// ```
    /// use schema_provider::Schema;
    ///
    /// let group = Schema::recursive(|group| {
    ///     Schema::object([
    ///         ("id", Schema::string()),
    ///         ("subgroups", Schema::array(group)),
    ///     ])
    /// });
    /// # let _ = group;
    /// ```
    ///
    /// The back-pointer is weak, so the cycle does not leak.
    pub fn recursive(build: impl FnOnce(Schema) -> Schema) -> Self {
        let node = Arc::new_cyclic(|weak: &Weak<SchemaNode>| {
            let this = Schema::from_kind(SchemaKind::Lazy(weak.clone()));
            let built = build(this);
            Arc::try_unwrap(built.0).unwrap_or_else(|shared| (*shared).clone())
        });
        Schema(node)
    }

    pub fn describe(&self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.with_node(|node| node.description = Some(description))
    }

    /// Allow the value to be absent (object fields become non-required).
    pub fn optional(&self) -> Self {
        Self::from_kind(SchemaKind::Optional(self.clone()))
    }

    pub fn nullable(&self) -> Self {
        Self::from_kind(SchemaKind::Nullable(self.clone()))
    }

    /// Fill in `value` when the input is absent.
    pub fn default_value(&self, value: impl Into<Value>) -> Self {
        Self::from_kind(SchemaKind::Default {
            inner: self.clone(),
            value: value.into(),
        })
    }

    /// Minimum string length. No effect on non-string schemas.
    pub fn min_length(&self, len: usize) -> Self {
        self.edit_string(|rules| rules.min_length = Some(len))
    }

    /// Maximum string length. No effect on non-string schemas.
    pub fn max_length(&self, len: usize) -> Self {
        self.edit_string(|rules| rules.max_length = Some(len))
    }

    /// Exact string length. No effect on non-string schemas.
    pub fn length(&self, len: usize) -> Self {
        self.edit_string(|rules| {
            rules.min_length = Some(len);
            rules.max_length = Some(len);
        })
    }

    pub fn format(&self, format: StringFormat) -> Self {
        self.edit_string(|rules| rules.format = Some(format))
    }

    /// Inclusive lower bound. No effect on non-numeric schemas.
    pub fn min(&self, bound: f64) -> Self {
        self.edit_number(|rules| rules.minimum = Some(bound))
    }

    /// Inclusive upper bound. No effect on non-numeric schemas.
    pub fn max(&self, bound: f64) -> Self {
        self.edit_number(|rules| rules.maximum = Some(bound))
    }

    /// Exclusive lower bound. No effect on non-numeric schemas.
    pub fn gt(&self, bound: f64) -> Self {
        self.edit_number(|rules| rules.exclusive_minimum = Some(bound))
    }

    /// Exclusive upper bound. No effect on non-numeric schemas.
    pub fn lt(&self, bound: f64) -> Self {
        self.edit_number(|rules| rules.exclusive_maximum = Some(bound))
    }

    /// Accept numeric strings (query strings, headers) and parse them.
    pub fn coerce(&self) -> Self {
        self.edit_number(|rules| rules.coerce = true)
    }

    /// Minimum array length. No effect on non-array schemas.
    pub fn min_items(&self, len: usize) -> Self {
        self.with_node(|node| {
            if let SchemaKind::Array { min_items, .. } = &mut node.kind {
                *min_items = Some(len);
            }
        })
    }

    /// Maximum array length. No effect on non-array schemas.
    pub fn max_items(&self, len: usize) -> Self {
        self.with_node(|node| {
            if let SchemaKind::Array { max_items, .. } = &mut node.kind {
                *max_items = Some(len);
            }
        })
    }

    /// Reject undeclared keys. No effect on non-object schemas.
    pub fn strict(&self) -> Self {
        self.edit_unknown_keys(UnknownKeys::Strict)
    }

    /// Keep undeclared keys. No effect on non-object schemas.
    pub fn passthrough(&self) -> Self {
        self.edit_unknown_keys(UnknownKeys::Passthrough)
    }

    /// Whether both handles denote the same schema.
    pub fn same_as(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    pub(crate) fn kind(&self) -> &SchemaKind {
        &self.0.kind
    }

    /// Identity key, stable for as long as any handle to the schema lives.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Follow recursion back-pointers to the schema they stand for.
    ///
    /// A back-pointer whose schema has been dropped degrades to `any`.
    pub(crate) fn dereference(&self) -> Schema {
        let mut current = self.clone();
        while let SchemaKind::Lazy(weak) = current.kind() {
            match weak.upgrade() {
                Some(node) if !Arc::ptr_eq(&node, &current.0) => current = Schema(node),
                _ => return Schema::any(),
            }
        }
        current
    }

    fn edit_string(&self, edit: impl FnOnce(&mut StringRules)) -> Self {
        self.with_node(|node| {
            if let SchemaKind::String(rules) = &mut node.kind {
                edit(rules);
            }
        })
    }

    fn edit_number(&self, edit: impl FnOnce(&mut NumberRules)) -> Self {
        self.with_node(|node| {
            if let SchemaKind::Number(rules) = &mut node.kind {
                edit(rules);
            }
        })
    }

    fn edit_unknown_keys(&self, mode: UnknownKeys) -> Self {
        self.with_node(|node| {
            if let SchemaKind::Object { unknown_keys, .. } = &mut node.kind {
                *unknown_keys = mode;
            }
        })
    }
}

/// Something a route declares where a schema is expected.
///
/// Hosts may hand over either a schema, a schema wrapped as
/// `{ properties: schema }`, or arbitrary JSON that is neither.
#[derive(Debug, Clone)]
pub enum SchemaRef {
    Schema(Schema),
    Properties(Schema),
    Raw(Value),
}

impl SchemaRef {
    /// Unwrap to the schema this reference denotes.
    ///
    /// # Errors
    ///
    /// Returns `TransformError::InvalidSchema` for raw JSON.
    pub fn resolve(&self) -> Result<&Schema, TransformError> {
        match self {
            SchemaRef::Schema(schema) | SchemaRef::Properties(schema) => Ok(schema),
            SchemaRef::Raw(value) => Err(TransformError::InvalidSchema {
                value: value.to_string(),
            }),
        }
    }
}

impl From<Schema> for SchemaRef {
    fn from(schema: Schema) -> Self {
        SchemaRef::Schema(schema)
    }
}

impl From<&Schema> for SchemaRef {
    fn from(schema: &Schema) -> Self {
        SchemaRef::Schema(schema.clone())
    }
}
