//! Schema to JSON Schema (draft 2020-12) conversion.
//!
//! Registered schemas carrying an id are emitted as `$ref`s into
//! `#/components/schemas`. Reused subschemas are inlined. A schema that
//! re-enters itself without being registered is moved into a `$defs` map on the
//! fragment root and referenced through `#/$defs/__schemaN`.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::error::TransformError;
use crate::registry::Registry;
use crate::schema::{NumberRules, Schema, SchemaKind, StringRules, UnknownKeys};
use crate::types::{Direction, DEFS_PREFIX};

/// Keys that only make sense for standalone documents.
const GENERATOR_FIELDS: &[&str] = &["id", "$schema", "$id"];

/// Convert one schema for the given direction.
///
/// If the schema itself is registered with an id, the result is a `$ref`.
pub fn schema_to_json(schema: &Schema, registry: &Registry, direction: Direction) -> Value {
    Converter::new(registry, direction).convert_root(schema, false)
}

/// Convert every registered schema that carries an id.
///
/// Returns component name to fragment, in registration order. Output names are
/// the id, input names are the id plus `Input`. Each root is expanded in full;
/// registered schemas nested inside it become `$ref`s.
///
/// # Errors
///
/// Returns `TransformError::ComponentCollision` when two distinct schemas are
/// registered under the same id.
pub fn registry_to_json(
    registry: &Registry,
    direction: Direction,
) -> Result<Map<String, Value>, TransformError> {
    let mut components = Map::new();

    for (schema, meta) in registry.iter() {
        let Some(id) = meta.id.as_deref() else {
            continue;
        };
        let name = direction.component_name(id);
        if components.contains_key(&name) {
            return Err(TransformError::ComponentCollision { name });
        }
        let fragment = Converter::new(registry, direction).convert_root(schema, true);
        components.insert(name, fragment);
    }

    tracing::debug!(
        ?direction,
        count = components.len(),
        "converted registry components"
    );
    Ok(components)
}

struct Converter<'a> {
    registry: &'a Registry,
    direction: Direction,
    /// Schemas currently being rendered, innermost last.
    stack: Vec<usize>,
    /// Schemas found to re-enter themselves, with their `$defs` name.
    cyclic: HashMap<usize, String>,
    defs: Map<String, Value>,
}

impl<'a> Converter<'a> {
    fn new(registry: &'a Registry, direction: Direction) -> Self {
        Self {
            registry,
            direction,
            stack: Vec::new(),
            cyclic: HashMap::new(),
            defs: Map::new(),
        }
    }

    fn convert_root(&mut self, schema: &Schema, expand_registered: bool) -> Value {
        let schema = schema.dereference();
        let mut fragment = if expand_registered {
            self.convert_unregistered(&schema)
        } else {
            self.convert(&schema)
        };

        if let Value::Object(map) = &mut fragment {
            for field in GENERATOR_FIELDS {
                map.remove(*field);
            }
            if !self.defs.is_empty() {
                map.insert("$defs".into(), Value::Object(std::mem::take(&mut self.defs)));
            }
        }
        fragment
    }

    fn convert(&mut self, schema: &Schema) -> Value {
        let schema = schema.dereference();
        if let Some(id) = self.registry.id_of(&schema) {
            return json!({ "$ref": self.direction.reference_uri(id) });
        }
        self.convert_unregistered(&schema)
    }

    fn convert_unregistered(&mut self, schema: &Schema) -> Value {
        let key = schema.key();

        if let Some(name) = self.cyclic.get(&key) {
            if self.defs.contains_key(name) {
                return def_ref(name);
            }
        }
        if self.stack.contains(&key) {
            let next = self.cyclic.len();
            let name = self
                .cyclic
                .entry(key)
                .or_insert_with(|| format!("__schema{next}"));
            return def_ref(name);
        }

        self.stack.push(key);
        let mut fragment = self.render(schema);
        self.stack.pop();

        let description = self
            .registry
            .get(schema)
            .and_then(|meta| meta.description.as_deref())
            .or_else(|| schema.description());
        if let (Some(description), Value::Object(map)) = (description, &mut fragment) {
            map.insert("description".into(), json!(description));
        }

        match self.cyclic.get(&key) {
            Some(name) => {
                let name = name.clone();
                self.defs.insert(name.clone(), fragment);
                def_ref(&name)
            }
            None => fragment,
        }
    }

    fn render(&mut self, schema: &Schema) -> Value {
        match schema.kind() {
            SchemaKind::String(rules) => render_string(rules),
            SchemaKind::Number(rules) => render_number(rules),
            SchemaKind::Boolean => json!({ "type": "boolean" }),
            SchemaKind::Null => json!({ "type": "null" }),
            SchemaKind::Undefined => match self.direction {
                // Responses serialize absence as null.
                Direction::Output => json!({ "type": "null" }),
                Direction::Input => json!({}),
            },
            SchemaKind::Date => match self.direction {
                Direction::Output => json!({ "type": "string", "format": "date-time" }),
                Direction::Input => json!({}),
            },
            SchemaKind::Literal(value) => {
                let mut map = Map::new();
                if let Some(ty) = literal_type(value) {
                    map.insert("type".into(), json!(ty));
                }
                map.insert("const".into(), value.clone());
                Value::Object(map)
            }
            SchemaKind::Enum(values) => json!({ "type": "string", "enum": values }),
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let mut map = Map::new();
                map.insert("type".into(), json!("array"));
                map.insert("items".into(), self.convert(items));
                if let Some(min) = min_items {
                    map.insert("minItems".into(), json!(min));
                }
                if let Some(max) = max_items {
                    map.insert("maxItems".into(), json!(max));
                }
                Value::Object(map)
            }
            SchemaKind::Tuple(members) => {
                let members: Vec<Value> = members.iter().map(|m| self.convert(m)).collect();
                json!({ "type": "array", "prefixItems": members })
            }
            SchemaKind::Object {
                fields,
                unknown_keys,
            } => self.render_object(fields, *unknown_keys),
            SchemaKind::Record { key, value } => {
                let names = self.convert(key);
                let values = self.convert(value);
                json!({
                    "type": "object",
                    "propertyNames": names,
                    "additionalProperties": values,
                })
            }
            SchemaKind::Union(members) => {
                let members: Vec<Value> = members.iter().map(|m| self.convert(m)).collect();
                json!({ "anyOf": members })
            }
            SchemaKind::Optional(inner) => self.convert(inner),
            SchemaKind::Nullable(inner) => {
                let inner = self.convert(inner);
                json!({ "anyOf": [inner, { "type": "null" }] })
            }
            SchemaKind::Default { inner, value } => {
                let mut fragment = self.convert(inner);
                if let Value::Object(map) = &mut fragment {
                    map.insert("default".into(), value.clone());
                }
                fragment
            }
            SchemaKind::Any | SchemaKind::Lazy(_) => json!({}),
        }
    }

    fn render_object(&mut self, fields: &[(String, Schema)], unknown_keys: UnknownKeys) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, field) in fields {
            properties.insert(name.clone(), self.convert(field));
            if !accepts_absence(field, self.direction) {
                required.push(Value::String(name.clone()));
            }
        }

        let mut map = Map::new();
        map.insert("type".into(), json!("object"));
        map.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            map.insert("required".into(), Value::Array(required));
        }

        let closed = match unknown_keys {
            UnknownKeys::Strict => true,
            UnknownKeys::Strip => self.direction == Direction::Output,
            UnknownKeys::Passthrough => false,
        };
        if closed {
            map.insert("additionalProperties".into(), json!(false));
        }
        Value::Object(map)
    }
}

/// Whether an object field may be left out in the given direction.
///
/// Defaulted fields are optional for callers but always present once parsed.
fn accepts_absence(schema: &Schema, direction: Direction) -> bool {
    match schema.dereference().kind() {
        SchemaKind::Optional(_) => true,
        SchemaKind::Default { .. } => direction == Direction::Input,
        SchemaKind::Nullable(inner) => accepts_absence(inner, direction),
        _ => false,
    }
}

fn def_ref(name: &str) -> Value {
    json!({ "$ref": format!("{DEFS_PREFIX}{name}") })
}

fn render_string(rules: &StringRules) -> Value {
    let mut map = Map::new();
    map.insert("type".into(), json!("string"));
    if let Some(format) = rules.format {
        map.insert("format".into(), json!(format.as_str()));
    }
    if let Some(min) = rules.min_length {
        map.insert("minLength".into(), json!(min));
    }
    if let Some(max) = rules.max_length {
        map.insert("maxLength".into(), json!(max));
    }
    Value::Object(map)
}

fn render_number(rules: &NumberRules) -> Value {
    let mut map = Map::new();
    let ty = if rules.integer { "integer" } else { "number" };
    map.insert("type".into(), json!(ty));
    let bounds = [
        ("minimum", rules.minimum),
        ("maximum", rules.maximum),
        ("exclusiveMinimum", rules.exclusive_minimum),
        ("exclusiveMaximum", rules.exclusive_maximum),
    ];
    for (keyword, bound) in bounds {
        if let Some(bound) = bound {
            map.insert(keyword.into(), number_value(bound));
        }
    }
    Value::Object(map)
}

/// Render integral floats without a fractional part (`1000`, not `1000.0`).
pub(crate) fn number_value(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn literal_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => Some("null"),
        Value::Bool(_) => Some("boolean"),
        Value::Number(_) => Some("number"),
        Value::String(_) => Some("string"),
        Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SchemaMeta;

    fn convert(schema: &Schema, direction: Direction) -> Value {
        schema_to_json(schema, &Registry::new(), direction)
    }

    #[test]
    fn string_bounds_and_description() {
        let schema = Schema::string().max_length(32).describe("someDescription");
        assert_eq!(
            convert(&schema, Direction::Input),
            json!({ "type": "string", "maxLength": 32, "description": "someDescription" })
        );
    }

    #[test]
    fn number_bounds_render_as_integers_when_integral() {
        let schema = Schema::number().min(1.0).max(1000.0);
        assert_eq!(
            convert(&schema, Direction::Input),
            json!({ "type": "number", "minimum": 1, "maximum": 1000 })
        );

        let schema = Schema::number().lt(10000.0);
        assert_eq!(
            convert(&schema, Direction::Input),
            json!({ "type": "number", "exclusiveMaximum": 10000 })
        );
    }

    #[test]
    fn date_and_undefined_depend_on_direction() {
        assert_eq!(
            convert(&Schema::date(), Direction::Output),
            json!({ "type": "string", "format": "date-time" })
        );
        assert_eq!(convert(&Schema::date(), Direction::Input), json!({}));
        assert_eq!(
            convert(&Schema::undefined(), Direction::Output),
            json!({ "type": "null" })
        );
        assert_eq!(convert(&Schema::undefined(), Direction::Input), json!({}));
    }

    #[test]
    fn literal_carries_type_and_const() {
        assert_eq!(
            convert(&Schema::literal("admin"), Direction::Output),
            json!({ "type": "string", "const": "admin" })
        );
    }

    #[test]
    fn nullable_and_tuple() {
        let schema = Schema::object([
            ("required_role", Schema::literal("admin").nullable()),
            (
                "scopes",
                Schema::tuple([
                    Schema::literal("read"),
                    Schema::literal("write"),
                    Schema::null(),
                ]),
            ),
        ]);
        assert_eq!(
            convert(&schema, Direction::Input),
            json!({
                "type": "object",
                "properties": {
                    "required_role": {
                        "anyOf": [{ "type": "string", "const": "admin" }, { "type": "null" }]
                    },
                    "scopes": {
                        "type": "array",
                        "prefixItems": [
                            { "type": "string", "const": "read" },
                            { "type": "string", "const": "write" },
                            { "type": "null" }
                        ]
                    }
                },
                "required": ["required_role", "scopes"]
            })
        );
    }

    #[test]
    fn defaulted_field_required_only_in_output() {
        let schema = Schema::object([("id", Schema::string().default_value("1"))]);

        let input = convert(&schema, Direction::Input);
        assert!(input.get("required").is_none());
        assert!(input.get("additionalProperties").is_none());
        assert_eq!(input["properties"]["id"]["default"], json!("1"));

        let output = convert(&schema, Direction::Output);
        assert_eq!(output["required"], json!(["id"]));
        assert_eq!(output["additionalProperties"], json!(false));
    }

    #[test]
    fn optional_field_never_required() {
        let schema = Schema::object([
            ("name", Schema::string()),
            ("age", Schema::number().coerce().nullable().optional()),
        ]);
        let output = convert(&schema, Direction::Output);
        assert_eq!(output["required"], json!(["name"]));
    }

    #[test]
    fn record_uses_property_names() {
        let schema = Schema::record(Schema::string(), Schema::string());
        assert_eq!(
            convert(&schema, Direction::Input),
            json!({
                "type": "object",
                "propertyNames": { "type": "string" },
                "additionalProperties": { "type": "string" }
            })
        );
    }

    #[test]
    fn registered_schema_becomes_reference() {
        let token = Schema::string().length(12);
        let registry = Registry::new().with(&token, SchemaMeta::with_id("Token"));
        let body = Schema::object([("access_token", token.clone()), ("refresh_token", token)]);

        let input = schema_to_json(&body, &registry, Direction::Input);
        assert_eq!(
            input["properties"]["access_token"],
            json!({ "$ref": "#/components/schemas/TokenInput" })
        );

        let output = schema_to_json(&body, &registry, Direction::Output);
        assert_eq!(
            output["properties"]["refresh_token"],
            json!({ "$ref": "#/components/schemas/Token" })
        );
    }

    #[test]
    fn registered_root_short_circuits() {
        let user = Schema::object([("id", Schema::string())]);
        let registry = Registry::new().with(&user, SchemaMeta::with_id("User"));
        assert_eq!(
            schema_to_json(&user, &registry, Direction::Output),
            json!({ "$ref": "#/components/schemas/User" })
        );
    }

    #[test]
    fn registry_components_expand_roots() {
        let group = Schema::recursive(|group| {
            Schema::object([("id", Schema::string()), ("subgroups", Schema::array(group))])
        });
        let user = Schema::object([
            ("id", Schema::string()),
            ("groups", Schema::array(group.clone())),
        ]);
        let registry = Registry::new()
            .with(&group, SchemaMeta::with_id("Group"))
            .with(&user, SchemaMeta::with_id("User"));

        let components = registry_to_json(&registry, Direction::Output).unwrap();
        let names: Vec<_> = components.keys().cloned().collect();
        assert_eq!(names, ["Group", "User"]);
        assert_eq!(
            components["Group"]["properties"]["subgroups"]["items"],
            json!({ "$ref": "#/components/schemas/Group" })
        );
        assert_eq!(
            components["User"]["properties"]["groups"]["items"],
            json!({ "$ref": "#/components/schemas/Group" })
        );
    }

    #[test]
    fn registry_description_applies_to_component() {
        let token = Schema::string().length(12);
        let registry = Registry::new().with(
            &token,
            SchemaMeta::with_id("Token").description("Token description"),
        );
        let components = registry_to_json(&registry, Direction::Input).unwrap();
        assert_eq!(
            components["TokenInput"],
            json!({
                "type": "string",
                "minLength": 12,
                "maxLength": 12,
                "description": "Token description"
            })
        );
    }

    #[test]
    fn duplicate_id_is_a_collision() {
        let first = Schema::object([("a", Schema::string())]);
        let second = Schema::object([("b", Schema::number())]);
        let registry = Registry::new()
            .with(&first, SchemaMeta::with_id("User"))
            .with(&second, SchemaMeta::with_id("User"));

        for (direction, expected) in [(Direction::Output, "User"), (Direction::Input, "UserInput")] {
            let err = registry_to_json(&registry, direction).unwrap_err();
            assert!(matches!(
                err,
                TransformError::ComponentCollision { ref name } if name == expected
            ));
        }
    }

    #[test]
    fn unregistered_cycle_moves_into_defs() {
        let node = Schema::recursive(|node| {
            Schema::object([("children", Schema::array(node))])
        });
        let fragment = convert(&node, Direction::Input);

        assert_eq!(fragment["$ref"], json!("#/$defs/__schema0"));
        assert_eq!(
            fragment["$defs"]["__schema0"]["properties"]["children"]["items"],
            json!({ "$ref": "#/$defs/__schema0" })
        );
    }

    #[test]
    fn nested_cycle_keeps_root_inline() {
        let node = Schema::recursive(|node| {
            Schema::object([("next", node.optional())])
        });
        let list = Schema::object([("head", node.clone()), ("tail", node)]);
        let fragment = convert(&list, Direction::Input);

        assert_eq!(fragment["type"], json!("object"));
        assert_eq!(
            fragment["properties"]["head"],
            json!({ "$ref": "#/$defs/__schema0" })
        );
        assert_eq!(
            fragment["properties"]["tail"],
            json!({ "$ref": "#/$defs/__schema0" })
        );
        assert_eq!(fragment["$defs"].as_object().map(Map::len), Some(1));
    }

    #[test]
    fn reused_subschema_is_inlined() {
        let token = Schema::string().length(12);
        let body = Schema::object([("a", token.clone()), ("b", token)]);
        let fragment = convert(&body, Direction::Input);
        assert_eq!(fragment["properties"]["a"], fragment["properties"]["b"]);
        assert!(fragment.get("$defs").is_none());
    }
}
