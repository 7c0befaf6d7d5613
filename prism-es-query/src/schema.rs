//! Allowed field names for an index

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// The set of field names a query may reference.
///
/// Object and nested properties are addressed with dot notation
/// (`attributes.color`), multi-fields with their sub-field name
/// (`description.keyword`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSchema {
    fields: BTreeSet<String>,
}

impl FieldSchema {
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an index mapping.
    ///
    /// Accepts a `{"properties": ..}` document, a
    /// `{"mappings": {"properties": ..}}` document, the
    /// `GET /<index>/_mapping` response keyed by a single index name, and
    /// the typed `{"<type>": {"properties": ..}}` form in any of those
    /// positions. Anything else is rejected.
    pub fn from_mapping(mapping: &Value) -> Result<Self> {
        let properties = locate_properties(mapping)
            .ok_or_else(|| Error::Extraction("mapping has no properties object".to_string()))?;

        let mut fields = BTreeSet::new();
        collect_properties(properties, "", &mut fields);
        Ok(Self { fields })
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

fn locate_properties(mapping: &Value) -> Option<&Map<String, Value>> {
    let object = mapping.as_object()?;
    if let Some(mappings) = object.get("mappings") {
        return type_properties(mappings);
    }
    if let Some(properties) = type_properties(mapping) {
        return Some(properties);
    }
    // `GET /<index>/_mapping`
    let (_, index) = single_entry(object)?;
    type_properties(index.get("mappings")?)
}

/// `{"properties": ..}` or `{"<type>": {"properties": ..}}`
fn type_properties(mappings: &Value) -> Option<&Map<String, Value>> {
    let object = mappings.as_object()?;
    if let Some(properties) = object.get("properties") {
        return properties.as_object();
    }
    let (_, typed) = single_entry(object)?;
    // An object field definition carries a "type"; a mapping type does not
    if typed.get("type").is_some() {
        return None;
    }
    typed.get("properties")?.as_object()
}

fn single_entry(object: &Map<String, Value>) -> Option<(&String, &Value)> {
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Some(entry),
        _ => None,
    }
}

fn collect_properties(properties: &Map<String, Value>, prefix: &str, out: &mut BTreeSet<String>) {
    for (name, definition) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        if let Some(children) = definition.get("properties").and_then(Value::as_object) {
            collect_properties(children, &path, out);
        }
        if let Some(multi) = definition.get("fields").and_then(Value::as_object) {
            for sub in multi.keys() {
                out.insert(format!("{}.{}", path, sub));
            }
        }
        out.insert(path);
    }
}
