//! Composable JSON-schema fragments for declaring model-facing parameters.
//!
//! ```rust
//! use pschema::{integer, nullable, object, string};
//!
//! let filters = object(
//!     "filters",
//!     vec![
//!         string("city").with_description("City and country, e.g. Paris, France"),
//!         nullable(integer("limit")),
//!     ],
//! );
//!
//! let schema = filters.schema();
//! assert_eq!(schema["additionalProperties"], false);
//! assert_eq!(schema["properties"]["limit"]["type"][1], "null");
//! ```

use serde_json::{Map, Value, json};

/// A named piece of JSON schema, composable into objects, arrays, and unions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFragment {
    name: String,
    schema: Map<String, Value>,
}

impl SchemaFragment {
    fn new(name: impl Into<String>, schema: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fragment's schema value, without its name.
    pub fn schema(&self) -> Value {
        Value::Object(self.schema.clone())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.schema
            .insert("description".to_string(), Value::String(description.into()));
        self
    }

    /// Restricts the fragment to a fixed set of values.
    pub fn with_enum_values(mut self, values: Vec<Value>) -> Self {
        self.schema.insert("enum".to_string(), Value::Array(values));
        self
    }

    /// Marks a subset of an object fragment's properties as required.
    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.schema.insert(
            "required".to_string(),
            Value::Array(names.iter().map(|name| json!(name)).collect()),
        );
        self
    }

    /// Declares the element schema of an array fragment. The item
    /// fragment's own name is discarded.
    pub fn with_item(mut self, item: SchemaFragment) -> Self {
        self.schema.insert("items".to_string(), item.into_schema());
        self
    }

    pub(crate) fn into_schema(self) -> Value {
        Value::Object(self.schema)
    }

    pub(crate) fn into_property(self) -> (String, Value) {
        (self.name, Value::Object(self.schema))
    }
}

fn primitive(name: impl Into<String>, kind: &str) -> SchemaFragment {
    let mut schema = Map::new();
    schema.insert("type".to_string(), json!(kind));
    SchemaFragment::new(name, schema)
}

pub fn integer(name: impl Into<String>) -> SchemaFragment {
    primitive(name, "integer")
}

pub fn float(name: impl Into<String>) -> SchemaFragment {
    primitive(name, "number")
}

pub fn string(name: impl Into<String>) -> SchemaFragment {
    primitive(name, "string")
}

pub fn boolean(name: impl Into<String>) -> SchemaFragment {
    primitive(name, "boolean")
}

/// An object fragment with the given properties. Undeclared properties
/// are rejected by the schema.
pub fn object(name: impl Into<String>, properties: Vec<SchemaFragment>) -> SchemaFragment {
    let mut collected = Map::new();
    for property in properties {
        let (property_name, schema) = property.into_property();
        collected.insert(property_name, schema);
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(collected));
    schema.insert("additionalProperties".to_string(), json!(false));
    SchemaFragment::new(name, schema)
}

pub fn array(name: impl Into<String>) -> SchemaFragment {
    primitive(name, "array")
}

/// A union fragment accepting any of the option schemas.
pub fn any_of(name: impl Into<String>, options: Vec<SchemaFragment>) -> SchemaFragment {
    let mut schema = Map::new();
    schema.insert(
        "anyOf".to_string(),
        Value::Array(options.into_iter().map(SchemaFragment::into_schema).collect()),
    );
    SchemaFragment::new(name, schema)
}

/// Widens a fragment's declared type to also accept `null`.
pub fn nullable(mut fragment: SchemaFragment) -> SchemaFragment {
    let widened = match fragment.schema.get("type") {
        Some(Value::String(kind)) => Some(json!([kind, "null"])),
        Some(Value::Array(kinds)) if !kinds.iter().any(|kind| kind == "null") => {
            let mut kinds = kinds.clone();
            kinds.push(json!("null"));
            Some(Value::Array(kinds))
        }
        _ => None,
    };

    if let Some(widened) = widened {
        fragment.schema.insert("type".to_string(), widened);
    }
    fragment
}
