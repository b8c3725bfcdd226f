//! Association of schemas with component identifiers.

use std::collections::HashMap;

use crate::schema::Schema;

/// Metadata attached to a registered schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMeta {
    /// Component identifier. Schemas without one are never hoisted.
    pub id: Option<String>,
    pub description: Option<String>,
}

impl SchemaMeta {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Schemas registered under stable identifiers, in registration order.
///
/// A registry is plain data handed to every conversion that needs it; the
/// crate keeps no global instance.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<(Schema, SchemaMeta)>,
    index: HashMap<usize, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema`, replacing any metadata it already had.
    pub fn add(&mut self, schema: &Schema, meta: SchemaMeta) -> &mut Self {
        match self.index.get(&schema.key()) {
            Some(&pos) => self.entries[pos].1 = meta,
            None => {
                self.index.insert(schema.key(), self.entries.len());
                self.entries.push((schema.clone(), meta));
            }
        }
        self
    }

    /// Chaining form of [`add`](Self::add).
    pub fn with(mut self, schema: &Schema, meta: SchemaMeta) -> Self {
        self.add(schema, meta);
        self
    }

    pub fn get(&self, schema: &Schema) -> Option<&SchemaMeta> {
        self.index
            .get(&schema.key())
            .map(|&pos| &self.entries[pos].1)
    }

    /// Registered id of `schema`, if any.
    pub fn id_of(&self, schema: &Schema) -> Option<&str> {
        self.get(schema).and_then(|meta| meta.id.as_deref())
    }

    pub fn contains(&self, schema: &Schema) -> bool {
        self.index.contains_key(&schema.key())
    }

    pub fn remove(&mut self, schema: &Schema) -> Option<SchemaMeta> {
        let pos = self.index.remove(&schema.key())?;
        let (_, meta) = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(meta)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Schema, &SchemaMeta)> {
        self.entries.iter().map(|(schema, meta)| (schema, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_by_identity() {
        let token = Schema::string().length(12);
        let lookalike = Schema::string().length(12);
        let registry = Registry::new().with(&token, SchemaMeta::with_id("Token"));

        assert_eq!(registry.id_of(&token), Some("Token"));
        assert_eq!(registry.id_of(&token.clone()), Some("Token"));
        assert!(registry.get(&lookalike).is_none());
    }

    #[test]
    fn re_adding_replaces_meta_in_place() {
        let a = Schema::string();
        let b = Schema::number();
        let mut registry = Registry::new();
        registry
            .add(&a, SchemaMeta::with_id("A"))
            .add(&b, SchemaMeta::with_id("B"))
            .add(&a, SchemaMeta::with_id("Renamed"));

        let ids: Vec<_> = registry
            .iter()
            .filter_map(|(_, meta)| meta.id.clone())
            .collect();
        assert_eq!(ids, ["Renamed", "B"]);
    }

    #[test]
    fn remove_keeps_remaining_entries_addressable() {
        let a = Schema::string();
        let b = Schema::number();
        let c = Schema::boolean();
        let mut registry = Registry::new()
            .with(&a, SchemaMeta::with_id("A"))
            .with(&b, SchemaMeta::with_id("B"))
            .with(&c, SchemaMeta::with_id("C"));

        assert_eq!(registry.remove(&a).and_then(|m| m.id), Some("A".into()));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_of(&b), Some("B"));
        assert_eq!(registry.id_of(&c), Some("C"));
        assert!(registry.remove(&a).is_none());
    }

    #[test]
    fn meta_without_id_is_not_an_identifier() {
        let schema = Schema::string();
        let registry = Registry::new().with(
            &schema,
            SchemaMeta::default().description("Free text"),
        );
        assert!(registry.contains(&schema));
        assert_eq!(registry.id_of(&schema), None);
    }
}
