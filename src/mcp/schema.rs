//! Structural validation of tool arguments.
//!
//! A tool declares the named parameters it accepts. The same declaration is
//! rendered as JSON Schema for `tools/list` and used to check raw arguments
//! before the tool's handler ever sees them.

use serde_json::{json, Map, Value};

use crate::mcp::error::FieldError;

/// The accepted shape of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// A JSON string, optionally with a minimum length in characters.
    String {
        /// Minimum number of characters.
        min_length: Option<usize>,
    },
}

impl ParamKind {
    const fn type_name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Shown to the agent in the schema.
    pub description: Option<String>,
    /// Accepted shape.
    pub kind: ParamKind,
    /// Whether the parameter must be present.
    pub required: bool,
}

impl ParamSpec {
    /// A required string parameter that must not be empty.
    #[must_use]
    pub fn non_empty_string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: ParamKind::String {
                min_length: Some(1),
            },
            required: true,
        }
    }

    /// Attaches a description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn check(&self, value: &Value) -> Option<FieldError> {
        let mismatch = || {
            FieldError::new(
                &self.name,
                format!("Expected {}, received {}", self.kind.type_name(), json_type(value)),
            )
        };

        match &self.kind {
            ParamKind::String { min_length } => {
                let Some(s) = value.as_str() else {
                    return Some(mismatch());
                };
                match min_length {
                    Some(min) if s.chars().count() < *min => Some(FieldError::new(
                        &self.name,
                        format!("String must contain at least {min} character(s)"),
                    )),
                    _ => None,
                }
            }
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The full argument contract of a tool, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSchema {
    params: Vec<ParamSpec>,
}

impl InputSchema {
    /// A schema accepting no parameters.
    #[must_use]
    pub const fn empty() -> Self {
        Self { params: Vec::new() }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Declared parameters.
    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Renders this schema as a JSON Schema object.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.kind.type_name()));
            if let ParamKind::String {
                min_length: Some(min),
            } = param.kind
            {
                prop.insert("minLength".into(), json!(min));
            }
            if let Some(description) = &param.description {
                prop.insert("description".into(), json!(description));
            }
            properties.insert(param.name.clone(), Value::Object(prop));
        }

        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Checks raw arguments against this schema.
    ///
    /// Absent or `null` arguments are treated as an empty object. Keys the
    /// schema does not declare are dropped from the returned map.
    ///
    /// # Errors
    ///
    /// Returns every field that failed, in declaration order.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, Vec<FieldError>> {
        let empty = Map::new();
        let obj = match args {
            Value::Null => &empty,
            Value::Object(obj) => obj,
            other => {
                return Err(vec![FieldError::new(
                    "",
                    format!("Expected object, received {}", json_type(other)),
                )]);
            }
        };

        let mut accepted = Map::new();
        let mut errors = Vec::new();

        for param in &self.params {
            match obj.get(&param.name) {
                None | Some(Value::Null) if param.required => {
                    errors.push(FieldError::new(&param.name, "Required"));
                }
                None | Some(Value::Null) => {}
                Some(value) => match param.check(value) {
                    Some(err) => errors.push(err),
                    None => {
                        accepted.insert(param.name.clone(), value.clone());
                    }
                },
            }
        }

        if errors.is_empty() {
            Ok(accepted)
        } else {
            Err(errors)
        }
    }
}
