//! Minimal schema descriptions handed to summarizers.
//!
//! Only what change summaries need: type and field titles.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

impl SchemaType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            fields: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Display title of the type, falling back to its name.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    /// Display title of a field, falling back to the field name.
    pub fn field_title<'a>(&'a self, field: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .and_then(|f| f.title.as_deref())
            .unwrap_or(field)
    }
}

/// Schema types indexed by name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SchemaType>", into = "Vec<SchemaType>")]
pub struct Schema {
    types: IndexMap<String, SchemaType>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, schema_type: SchemaType) {
        self.types.insert(schema_type.name.clone(), schema_type);
    }

    pub fn get(&self, name: &str) -> Option<&SchemaType> {
        self.types.get(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl From<Vec<SchemaType>> for Schema {
    fn from(types: Vec<SchemaType>) -> Self {
        let mut schema = Schema::new();
        for schema_type in types {
            schema.insert(schema_type);
        }
        schema
    }
}

impl From<Schema> for Vec<SchemaType> {
    fn from(schema: Schema) -> Self {
        schema.types.into_values().collect()
    }
}
