//! Parameter metadata published to the conversational model.
//!
//! Types declared here are descriptive only; the dispatcher checks nothing but
//! the presence of required keys.

use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParamType {
    fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertySchema {
    pub kind: ParamType,
    pub description: String,
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn new(kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            enum_values: None,
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(ParamType::String, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(ParamType::Integer, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(ParamType::Boolean, description)
    }

    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    fn to_json(&self) -> Value {
        let mut schema = json!({
            "type": self.kind.as_str(),
            "description": self.description,
        });
        if let Some(values) = &self.enum_values {
            schema["enum"] = json!(values);
        }
        schema
    }
}

/// Object schema with properties kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    properties: Vec<(String, PropertySchema)>,
    required: Vec<String>,
}

impl ParameterSchema {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.push((name.into(), schema));
        self
    }

    pub fn required_property(self, name: impl Into<String>, schema: PropertySchema) -> Self {
        let name = name.into();
        let mut this = self.property(name.clone(), schema);
        this.required.push(name);
        this
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertySchema)> {
        self.properties
            .iter()
            .map(|(name, schema)| (name.as_str(), schema))
    }

    /// First required key absent from `args`, in declaration order.
    pub fn first_missing<'a>(&'a self, args: &Map<String, Value>) -> Option<&'a str> {
        self.required
            .iter()
            .find(|name| !args.contains_key(name.as_str()))
            .map(String::as_str)
    }

    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, schema)| (name.clone(), schema.to_json()))
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }
}

/// `{name, description, parameters}` triple sent with every model request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
