use std::collections::HashSet;
use std::fmt;

use crate::error::ToolError;

/// Semantic type of a declared parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    Enumeration,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Enumeration => "enumeration",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped argument value as it was parsed out of model text.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl ArgValue {
    /// Short type label used in mismatch messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "number",
            Self::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Typed value produced by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl ParamValue {
    fn matches(&self, param_type: ParamType) -> bool {
        matches!(
            (self, param_type),
            (Self::Text(_), ParamType::String | ParamType::Enumeration)
                | (Self::Integer(_), ParamType::Integer)
                | (Self::Boolean(_), ParamType::Boolean)
        )
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<ParamValue> for ArgValue {
    fn from(value: ParamValue) -> Self {
        match value {
            ParamValue::Text(s) => ArgValue::Text(s),
            ParamValue::Integer(i) => ArgValue::Integer(i),
            ParamValue::Boolean(b) => ArgValue::Bool(b),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    pub default: Option<ParamValue>,
    pub allowed_values: Vec<String>,
}

impl ParameterSpec {
    pub fn required(name: &str, param_type: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: true,
            default: None,
            allowed_values: Vec::new(),
        }
    }

    pub fn optional(
        name: &str,
        param_type: ParamType,
        description: &str,
        default: ParamValue,
    ) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required: false,
            default: Some(default),
            allowed_values: Vec::new(),
        }
    }

    /// Restrict the accepted values (builder pattern)
    pub fn with_allowed_values(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// Declared contract of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl OperationSchema {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter (builder pattern)
    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Check the schema against its own invariants.
    pub fn check(&self) -> Result<(), ToolError> {
        if self.name.trim().is_empty() {
            return Err(ToolError::malformed(&self.name, "operation name is empty"));
        }

        let mut seen = HashSet::new();
        for spec in &self.parameters {
            if !seen.insert(spec.name.as_str()) {
                return Err(ToolError::malformed(
                    &self.name,
                    format!("duplicate parameter '{}'", spec.name),
                ));
            }

            if spec.required && spec.default.is_some() {
                return Err(ToolError::malformed(
                    &self.name,
                    format!("required parameter '{}' carries a default", spec.name),
                ));
            }

            if !spec.required && spec.default.is_none() {
                return Err(ToolError::malformed(
                    &self.name,
                    format!("optional parameter '{}' has no default", spec.name),
                ));
            }

            if spec.param_type == ParamType::Enumeration && spec.allowed_values.is_empty() {
                return Err(ToolError::malformed(
                    &self.name,
                    format!("enumeration '{}' declares no allowed values", spec.name),
                ));
            }

            if let Some(default) = &spec.default {
                if !default.matches(spec.param_type) {
                    return Err(ToolError::malformed(
                        &self.name,
                        format!(
                            "default {} of '{}' is not a {}",
                            default, spec.name, spec.param_type
                        ),
                    ));
                }

                if let ParamValue::Text(value) = default
                    && spec.param_type == ParamType::Enumeration
                    && !spec.allowed_values.contains(value)
                {
                    return Err(ToolError::malformed(
                        &self.name,
                        format!("default '{}' of '{}' is not an allowed value", value, spec.name),
                    ));
                }
            }
        }

        Ok(())
    }

    /// One-line signature used in the prompt and the `tools` listing,
    /// e.g. `find_files(pattern: string, dirpath: string = ".")`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let ty = if p.param_type == ParamType::Enumeration {
                    p.allowed_values.join("|")
                } else {
                    p.param_type.to_string()
                };
                match &p.default {
                    Some(default) => format!("{}: {} = {}", p.name, ty, default),
                    None => format!("{}: {}", p.name, ty),
                }
            })
            .collect();

        format!("{}({})", self.name, params.join(", "))
    }
}
