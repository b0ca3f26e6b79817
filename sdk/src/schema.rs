//! Declared input schemas for capabilities
//!
//! A schema is a flat list of typed fields. It validates raw JSON arguments
//! before any handler runs and renders itself as a JSON-Schema object so the
//! reasoning engine knows how to call the capability.

use serde_json::{json, Map, Value};

use crate::types::CapabilityInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    StringList,
    Object,
}

impl FieldKind {
    fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::StringList => "array",
            FieldKind::Object => "object",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::StringList => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
            FieldKind::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,
    /// Allowed values for string fields; empty means any
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    pub fields: Vec<SchemaField>,
}

/// Validation failures; the handler is never called when one is returned
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("arguments are not valid JSON: {0}")]
    Malformed(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("field '{field}' must be of type {expected}")]
    WrongType { field: String, expected: String },

    #[error("field '{field}' must be one of: {allowed}")]
    NotAllowed { field: String, allowed: String },

    #[error("required field '{0}' must not be blank")]
    Blank(String),
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.fields.push(SchemaField {
            name: name.to_string(),
            kind,
            required: true,
            description: description.to_string(),
            allowed: Vec::new(),
        });
        self
    }

    pub fn optional(mut self, name: &str, kind: FieldKind, description: &str) -> Self {
        self.fields.push(SchemaField {
            name: name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
            allowed: Vec::new(),
        });
        self
    }

    /// Restrict the most recently added field to a fixed set of values
    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        if let Some(last) = self.fields.last_mut() {
            last.allowed = allowed.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    /// Parse raw JSON arguments and validate them
    ///
    /// An empty argument string is treated as `{}`.
    pub fn parse(&self, raw: &str) -> Result<CapabilityInput, SchemaError> {
        let value = if raw.trim().is_empty() {
            Value::Object(Map::new())
        } else {
            serde_json::from_str(raw).map_err(|e| SchemaError::Malformed(e.to_string()))?
        };
        self.validate(value)
    }

    /// Validate a JSON value; `null` fields are treated as absent
    pub fn validate(&self, value: Value) -> Result<CapabilityInput, SchemaError> {
        let Value::Object(params) = value else {
            return Err(SchemaError::NotAnObject);
        };

        for field in &self.fields {
            match params.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(SchemaError::MissingField(field.name.clone()));
                    }
                }
                Some(v) => {
                    if !field.kind.accepts(v) {
                        return Err(SchemaError::WrongType {
                            field: field.name.clone(),
                            expected: field.kind.json_type().to_string(),
                        });
                    }
                    if let Some(s) = v.as_str() {
                        if field.required && s.trim().is_empty() {
                            return Err(SchemaError::Blank(field.name.clone()));
                        }
                        if !field.allowed.is_empty() && !field.allowed.iter().any(|a| a == s) {
                            return Err(SchemaError::NotAllowed {
                                field: field.name.clone(),
                                allowed: field.allowed.join(", "),
                            });
                        }
                    }
                }
            }
        }

        Ok(CapabilityInput { params })
    }

    /// Render as a JSON-Schema object for function-calling APIs
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            let mut prop = json!({
                "type": field.kind.json_type(),
                "description": field.description,
            });
            if field.kind == FieldKind::StringList {
                prop["items"] = json!({ "type": "string" });
            }
            if !field.allowed.is_empty() {
                prop["enum"] = json!(field.allowed);
            }
            properties.insert(field.name.clone(), prop);
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> InputSchema {
        InputSchema::new()
            .required("domain", FieldKind::String, "Company domain")
            .optional("roles", FieldKind::StringList, "Target roles")
            .optional("tone", FieldKind::String, "Pitch tone")
            .one_of(&["formal", "casual"])
            .optional("limit", FieldKind::Integer, "Max results")
    }

    #[test]
    fn test_valid_input() {
        let input = schema()
            .parse(r#"{"domain": "acme.com", "roles": ["CTO"], "limit": 5}"#)
            .unwrap();
        assert_eq!(input.param_str("domain").unwrap(), "acme.com");
        assert_eq!(input.param_u64_opt("limit"), Some(5));
    }

    #[test]
    fn test_missing_required() {
        assert_eq!(
            schema().parse(r#"{"roles": []}"#),
            Err(SchemaError::MissingField("domain".to_string()))
        );
        assert_eq!(
            schema().parse(r#"{"domain": null}"#),
            Err(SchemaError::MissingField("domain".to_string()))
        );
    }

    #[test]
    fn test_wrong_types() {
        assert!(matches!(
            schema().parse(r#"{"domain": 42}"#),
            Err(SchemaError::WrongType { .. })
        ));
        assert!(matches!(
            schema().parse(r#"{"domain": "a.com", "roles": ["CTO", 1]}"#),
            Err(SchemaError::WrongType { .. })
        ));
        assert!(matches!(
            schema().parse(r#"{"domain": "a.com", "limit": 2.5}"#),
            Err(SchemaError::WrongType { .. })
        ));
    }

    #[test]
    fn test_enum_and_blank() {
        assert!(matches!(
            schema().parse(r#"{"domain": "a.com", "tone": "angry"}"#),
            Err(SchemaError::NotAllowed { .. })
        ));
        assert_eq!(
            schema().parse(r#"{"domain": "  "}"#),
            Err(SchemaError::Blank("domain".to_string()))
        );
    }

    #[test]
    fn test_malformed_and_non_object() {
        assert!(matches!(schema().parse("{not json"), Err(SchemaError::Malformed(_))));
        assert_eq!(schema().parse("[1,2]"), Err(SchemaError::NotAnObject));
        assert!(InputSchema::new().parse("").is_ok());
    }

    #[test]
    fn test_json_schema_rendering() {
        let rendered = schema().to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["domain"]));
        assert_eq!(rendered["properties"]["roles"]["items"]["type"], "string");
        assert_eq!(rendered["properties"]["tone"]["enum"], json!(["formal", "casual"]));
    }
}
