//! Structural deduplication of schemas into `components.schemas`.
//!
//! Given named component fragments, every structurally identical object found
//! elsewhere in a document is replaced by a `$ref` to the component. Matching
//! is by canonical form (object keys sorted at every level), so key order never
//! affects the outcome.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::types::COMPONENTS_PREFIX;

/// Canonical text of a JSON value: compact, object keys sorted recursively.
pub fn canonical_key(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Canonical fragment to component name, for one deduplication pass.
#[derive(Debug, Default)]
pub struct ComponentMap {
    names: HashMap<String, String>,
}

impl ComponentMap {
    /// Index `components` by canonical form.
    ///
    /// When two components share a canonical form the later one wins; the
    /// clash is logged because the choice is positional, not semantic.
    pub fn from_components(components: &Map<String, Value>) -> Self {
        let mut names = HashMap::new();
        for (name, fragment) in components {
            if let Some(previous) = names.insert(canonical_key(fragment), name.clone()) {
                tracing::warn!(
                    kept = %name,
                    shadowed = %previous,
                    "components {} and {} are structurally identical; references resolve to {}",
                    previous,
                    name,
                    name,
                );
            }
        }
        Self { names }
    }

    pub fn get(&self, fragment: &Value) -> Option<&str> {
        self.names.get(&canonical_key(fragment)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Reference that should stand in for `node`, if any.
    fn replacement(&self, node: &Value) -> Option<Value> {
        let Value::Object(map) = node else {
            return None;
        };
        if let Some(name) = self.get(node) {
            return Some(component_ref(name));
        }
        if map.get("nullable") == Some(&Value::Bool(true)) {
            let mut required = map.clone();
            required.remove("nullable");
            if let Some(name) = self.get(&Value::Object(required)) {
                return Some(json!({ "anyOf": [component_ref(name)], "nullable": true }));
            }
        }
        None
    }
}

fn component_ref(name: &str) -> Value {
    json!({ "$ref": format!("{COMPONENTS_PREFIX}{name}") })
}

/// Merge `components` into the document and replace every structural copy
/// of them with a `$ref`.
///
/// Existing `components.schemas` entries are kept; entries of `components`
/// take precedence on name clashes. The component definitions themselves are
/// never replaced by references to themselves, though their nested parts are
/// rewritten like the rest of the document.
pub fn deduplicate(mut document: Value, components: &Map<String, Value>) -> Value {
    let map = ComponentMap::from_components(components);

    if let Value::Object(root) = &mut document {
        let schemas = schemas_mut(root);
        for (name, fragment) in components {
            schemas.insert(name.clone(), fragment.clone());
        }

        for (key, child) in root.iter_mut() {
            if key != "components" {
                rewrite(child, &map);
                continue;
            }
            let Value::Object(sections) = child else {
                continue;
            };
            for (section, value) in sections.iter_mut() {
                match (section.as_str(), value) {
                    ("schemas", Value::Object(definitions)) => {
                        for definition in definitions.values_mut() {
                            descend(definition, &map);
                        }
                    }
                    (_, value) => rewrite(value, &map),
                }
            }
        }
    }

    tracing::debug!(components = map.len(), "deduplicated document schemas");
    document
}

/// `components.schemas` of a document root, created when missing.
pub(crate) fn schemas_mut(root: &mut Map<String, Value>) -> &mut Map<String, Value> {
    object_entry(object_entry(root, "components"), "schemas")
}

fn object_entry<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Map<String, Value> {
    let slot = map
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just made an object"),
    }
}

fn rewrite(node: &mut Value, map: &ComponentMap) {
    if let Some(replacement) = map.replacement(node) {
        *node = replacement;
        return;
    }
    descend(node, map);
}

fn descend(node: &mut Value, map: &ComponentMap) {
    match node {
        Value::Object(children) => {
            for child in children.values_mut() {
                rewrite(child, map);
            }
        }
        Value::Array(children) => {
            for child in children.iter_mut() {
                rewrite(child, map);
            }
        }
        _ => {}
    }
}
