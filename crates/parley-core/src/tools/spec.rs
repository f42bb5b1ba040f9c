//! Tool descriptions as advertised by the tool provider.
//!
//! A `ToolSpec` keeps the raw JSON input schema next to a flat list of the
//! top-level parameters it declares. The parameter list is what local argument
//! checks run against before a call is sent over the channel.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No type declared, or a type this layer does not check.
    Any,
}

impl ParamKind {
    fn from_schema(schema: &Value) -> Self {
        let declared = match &schema["type"] {
            Value::String(t) => Some(t.as_str()),
            // ["string", "null"] style unions: check against the first concrete type
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            _ => None,
        };
        match declared {
            Some("string") => ParamKind::String,
            Some("integer") => ParamKind::Integer,
            Some("number") => ParamKind::Number,
            Some("boolean") => ParamKind::Boolean,
            Some("array") => ParamKind::Array,
            Some("object") => ParamKind::Object,
            _ => ParamKind::Any,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
            ParamKind::Any => true,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
            ParamKind::Any => "any",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        let params = parse_params(&input_schema);
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Fill declared defaults, then check required and typed parameters.
    ///
    /// `null` arguments are treated as an empty object. Parameters the schema
    /// does not declare are passed through untouched.
    pub fn prepare_arguments(&self, arguments: Value) -> Result<Value, AgentError> {
        let mut args = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(AgentError::invalid_arguments(
                    &self.name,
                    format!("arguments must be a JSON object, got {}", json_type(&other)),
                ))
            }
        };

        for param in &self.params {
            let present = args.get(&param.name).is_some_and(|v| !v.is_null());
            if !present {
                if let Some(default) = &param.default {
                    args.insert(param.name.clone(), default.clone());
                    continue;
                }
                if param.required {
                    return Err(AgentError::invalid_arguments(
                        &self.name,
                        format!("missing required parameter '{}'", param.name),
                    ));
                }
                continue;
            }

            if let Some(value) = args.get(&param.name) {
                if !param.kind.accepts(value) {
                    return Err(AgentError::invalid_arguments(
                        &self.name,
                        format!(
                            "parameter '{}' must be {}, got {}",
                            param.name,
                            param.kind.label(),
                            json_type(value)
                        ),
                    ));
                }
            }
        }

        Ok(Value::Object(args))
    }
}

fn parse_params(schema: &Value) -> Vec<ParamSpec> {
    let required: Vec<&str> = schema["required"]
        .as_array()
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema["properties"].as_object() else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| ParamSpec {
            name: name.clone(),
            kind: ParamKind::from_schema(prop),
            required: required.contains(&name.as_str()),
            default: prop.get("default").cloned(),
            description: prop["description"].as_str().map(str::to_string),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list_files_spec() -> ToolSpec {
        ToolSpec::new(
            "list_all_files_tool",
            "List files in the user's drive",
            json!({
                "type": "object",
                "properties": {
                    "page_size": {"type": "integer", "default": 10, "description": "Files per page"},
                    "folder_id": {"type": ["string", "null"]}
                }
            }),
        )
    }

    #[test]
    fn test_params_parsed_from_schema() {
        let spec = ToolSpec::new(
            "search_files",
            "Search files by name",
            json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer"}},
                "required": ["query"]
            }),
        );
        assert_eq!(spec.params.len(), 2);
        let query = spec.param("query").unwrap();
        assert!(query.required);
        assert_eq!(query.kind, ParamKind::String);
        assert!(!spec.param("limit").unwrap().required);
    }

    #[test]
    fn test_default_filled_for_missing_optional() {
        let args = list_files_spec().prepare_arguments(json!({})).unwrap();
        assert_eq!(args, json!({"page_size": 10}));

        let args = list_files_spec().prepare_arguments(Value::Null).unwrap();
        assert_eq!(args["page_size"], 10);

        let args = list_files_spec()
            .prepare_arguments(json!({"page_size": 25}))
            .unwrap();
        assert_eq!(args["page_size"], 25);
    }

    #[test]
    fn test_nullable_union_type() {
        let spec = list_files_spec();
        assert_eq!(spec.param("folder_id").unwrap().kind, ParamKind::String);
        assert!(spec.prepare_arguments(json!({"folder_id": "abc"})).is_ok());
        assert!(spec.prepare_arguments(json!({"folder_id": null})).is_ok());
    }

    #[test]
    fn test_missing_required_and_wrong_type_rejected() {
        let spec = ToolSpec::new(
            "read_file",
            "Read a file",
            json!({
                "type": "object",
                "properties": {"file_id": {"type": "string"}},
                "required": ["file_id"]
            }),
        );

        let err = spec.prepare_arguments(json!({})).unwrap_err();
        assert_eq!(
            err,
            AgentError::invalid_arguments("read_file", "missing required parameter 'file_id'")
        );

        let err = spec.prepare_arguments(json!({"file_id": 42})).unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { ref message, .. } if message.contains("must be string")));

        assert!(spec.prepare_arguments(json!("file_id")).is_err());
    }

    #[test]
    fn test_schema_without_properties() {
        let spec = ToolSpec::new("ping", "", json!({"type": "object"}));
        assert!(spec.params.is_empty());
        assert_eq!(spec.prepare_arguments(json!({"extra": 1})).unwrap(), json!({"extra": 1}));
    }
}
