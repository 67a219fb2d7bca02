//! Tool and structured-output declarations built from schema fragments.

use serde_json::{Map, Value, json};

use crate::fragment::SchemaFragment;

/// A callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks a subset of the declared parameters as required.
    pub fn with_required(mut self, names: &[&str]) -> Self {
        if let Value::Object(parameters) = &mut self.parameters {
            parameters.insert(
                "required".to_string(),
                Value::Array(names.iter().map(|name| json!(name)).collect()),
            );
        }
        self
    }

    /// The declaration in chat-completion wire form.
    pub fn to_wire(&self) -> Value {
        let mut function = Map::new();
        function.insert("name".to_string(), json!(self.name));
        if let Some(description) = &self.description {
            function.insert("description".to_string(), json!(description));
        }
        function.insert("parameters".to_string(), self.parameters.clone());

        json!({
            "type": "function",
            "function": Value::Object(function),
        })
    }
}

/// Declares a tool whose parameters form an open object of the given
/// fragments. Required parameters are opted into with
/// [`ToolDeclaration::with_required`].
pub fn tool_declaration(
    name: impl Into<String>,
    properties: Vec<SchemaFragment>,
) -> ToolDeclaration {
    let mut collected = Map::new();
    for property in properties {
        let (property_name, schema) = property.into_property();
        collected.insert(property_name, schema);
    }

    let mut parameters = Map::new();
    parameters.insert("type".to_string(), json!("object"));
    parameters.insert("properties".to_string(), Value::Object(collected));

    ToolDeclaration {
        name: name.into(),
        description: None,
        parameters: Value::Object(parameters),
    }
}

/// A response schema the model is asked to conform to exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredOutput {
    pub name: String,
    pub schema: Value,
}

impl StructuredOutput {
    /// Narrows the required property set. By default every declared
    /// property is required.
    pub fn with_required(mut self, names: &[&str]) -> Self {
        if let Value::Object(schema) = &mut self.schema {
            schema.insert(
                "required".to_string(),
                Value::Array(names.iter().map(|name| json!(name)).collect()),
            );
        }
        self
    }

    /// The schema in `response_format` wire form.
    pub fn to_wire(&self) -> Value {
        json!({
            "name": self.name,
            "strict": true,
            "schema": self.schema,
        })
    }
}

/// Declares a strict output object of the given fragments. Every
/// property is required and undeclared properties are rejected, as the
/// strict decoding mode demands.
pub fn structured_output(
    name: impl Into<String>,
    properties: Vec<SchemaFragment>,
) -> StructuredOutput {
    let required: Vec<Value> = properties
        .iter()
        .map(|property| json!(property.name()))
        .collect();

    let mut collected = Map::new();
    for property in properties {
        let (property_name, schema) = property.into_property();
        collected.insert(property_name, schema);
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(collected));
    schema.insert("required".to_string(), Value::Array(required));
    schema.insert("additionalProperties".to_string(), json!(false));

    StructuredOutput {
        name: name.into(),
        schema: Value::Object(schema),
    }
}
