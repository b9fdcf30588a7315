use std::collections::BTreeMap;

use crate::error::ToolError;

use super::schema::{ArgValue, OperationSchema, ParamType, ParamValue, ParameterSpec};

/// A call as parsed from model text, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub operation: String,
    pub arguments: BTreeMap<String, ArgValue>,
}

impl ToolCall {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            arguments: BTreeMap::new(),
        }
    }

    /// Add an argument (builder pattern)
    pub fn arg(mut self, name: &str, value: ArgValue) -> Self {
        self.arguments.insert(name.to_string(), value);
        self
    }

    /// Rebuild a call from already validated arguments
    #[cfg(test)]
    pub fn from_validated(operation: &str, args: &ValidatedArgs) -> Self {
        Self {
            operation: operation.to_string(),
            arguments: args
                .values
                .iter()
                .map(|(k, v)| (k.clone(), ArgValue::from(v.clone())))
                .collect(),
        }
    }
}

/// Arguments after validation: every declared parameter is present and typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedArgs {
    values: BTreeMap<String, ParamValue>,
}

impl ValidatedArgs {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Text value of a string or enumeration parameter
    pub fn text(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(ParamValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn integer(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(ParamValue::Integer(i)) => *i,
            _ => 0,
        }
    }

    pub fn boolean(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Boolean(true)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[cfg(test)]
    pub fn insert(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }
}

/// Check `call` against `schema` and produce typed arguments.
///
/// Declared parameters are processed in declaration order; undeclared
/// arguments are rejected afterwards so nothing unvalidated reaches an
/// operation.
pub fn validate(call: &ToolCall, schema: &OperationSchema) -> Result<ValidatedArgs, ToolError> {
    let mut values = BTreeMap::new();

    for spec in &schema.parameters {
        let value = match call.arguments.get(&spec.name) {
            None if spec.required => {
                return Err(ToolError::MissingRequiredParameter {
                    operation: schema.name.clone(),
                    parameter: spec.name.clone(),
                });
            }
            None => match &spec.default {
                Some(default) => default.clone(),
                None => {
                    return Err(ToolError::malformed(
                        &schema.name,
                        format!("optional parameter '{}' has no default", spec.name),
                    ));
                }
            },
            Some(raw) => {
                let value = coerce(spec, raw)?;
                check_allowed(spec, &value)?;
                value
            }
        };

        values.insert(spec.name.clone(), value);
    }

    if let Some(extra) = call
        .arguments
        .keys()
        .find(|name| schema.parameter(name).is_none())
    {
        return Err(ToolError::UnknownParameter {
            operation: schema.name.clone(),
            parameter: extra.clone(),
        });
    }

    Ok(ValidatedArgs { values })
}

fn coerce(spec: &ParameterSpec, raw: &ArgValue) -> Result<ParamValue, ToolError> {
    let coerced = match (spec.param_type, raw) {
        (ParamType::String | ParamType::Enumeration, value) => Some(ParamValue::Text(value.to_string())),

        (ParamType::Integer, ArgValue::Integer(i)) => Some(ParamValue::Integer(*i)),
        (ParamType::Integer, ArgValue::Float(x))
            if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x <= i64::MAX as f64 =>
        {
            Some(ParamValue::Integer(*x as i64))
        }
        (ParamType::Integer, ArgValue::Text(s)) => s.trim().parse().ok().map(ParamValue::Integer),

        (ParamType::Boolean, ArgValue::Bool(b)) => Some(ParamValue::Boolean(*b)),
        (ParamType::Boolean, ArgValue::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(ParamValue::Boolean(true)),
            "false" => Some(ParamValue::Boolean(false)),
            _ => None,
        },

        _ => None,
    };

    coerced.ok_or_else(|| ToolError::TypeMismatch {
        parameter: spec.name.clone(),
        expected: spec.param_type.to_string(),
        received: format!("{} {}", raw.kind(), describe(raw)),
    })
}

fn describe(raw: &ArgValue) -> String {
    match raw {
        ArgValue::Text(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

fn check_allowed(spec: &ParameterSpec, value: &ParamValue) -> Result<(), ToolError> {
    if spec.param_type != ParamType::Enumeration {
        return Ok(());
    }

    match value {
        ParamValue::Text(s) if spec.allowed_values.contains(s) => Ok(()),
        other => Err(ToolError::InvalidEnumValue {
            parameter: spec.name.clone(),
            value: match other {
                ParamValue::Text(s) => s.clone(),
                v => v.to_string(),
            },
            allowed: spec.allowed_values.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grep_schema() -> OperationSchema {
        OperationSchema::new("grep_search", "Search text")
            .param(ParameterSpec::required("pattern", ParamType::String, "Needle"))
            .param(ParameterSpec::optional(
                "dirpath",
                ParamType::String,
                "Where",
                ParamValue::Text(".".to_string()),
            ))
            .param(ParameterSpec::optional(
                "is_regex",
                ParamType::Boolean,
                "Regex?",
                ParamValue::Boolean(false),
            ))
            .param(ParameterSpec::optional(
                "max_results",
                ParamType::Integer,
                "Limit",
                ParamValue::Integer(50),
            ))
    }

    fn checklist_schema() -> OperationSchema {
        OperationSchema::new("create_security_checklist", "Checklist").param(
            ParameterSpec::required("topic", ParamType::Enumeration, "Topic")
                .with_allowed_values(&["web_app", "network", "cloud"]),
        )
    }

    #[test]
    fn test_defaults_substituted_for_omitted_optionals() {
        let call = ToolCall::new("grep_search").arg("pattern", ArgValue::Text("TODO".into()));
        let args = validate(&call, &grep_schema()).unwrap();

        assert_eq!(args.len(), 4);
        assert_eq!(args.text("pattern"), "TODO");
        assert_eq!(args.text("dirpath"), ".");
        assert!(!args.boolean("is_regex"));
        assert_eq!(args.integer("max_results"), 50);
    }

    #[test]
    fn test_missing_required_names_the_parameter() {
        let call = ToolCall::new("grep_search").arg("dirpath", ArgValue::Text("src".into()));
        let err = validate(&call, &grep_schema()).unwrap_err();

        assert_eq!(
            err,
            ToolError::MissingRequiredParameter {
                operation: "grep_search".to_string(),
                parameter: "pattern".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let call = ToolCall::new("grep_search")
            .arg("pattern", ArgValue::Text("x".into()))
            .arg("sudo", ArgValue::Bool(true));
        let err = validate(&call, &grep_schema()).unwrap_err();

        assert_eq!(
            err,
            ToolError::UnknownParameter {
                operation: "grep_search".to_string(),
                parameter: "sudo".to_string(),
            }
        );
    }

    #[test]
    fn test_declared_errors_win_over_unknown_parameters() {
        // Missing required is detected while walking declared params, before extras
        let call = ToolCall::new("grep_search").arg("bogus", ArgValue::Integer(1));
        assert!(matches!(
            validate(&call, &grep_schema()),
            Err(ToolError::MissingRequiredParameter { .. })
        ));
    }

    #[test]
    fn test_integer_coercion() {
        let schema = grep_schema();
        let base = ToolCall::new("grep_search").arg("pattern", ArgValue::Text("x".into()));

        let args = validate(&base.clone().arg("max_results", ArgValue::Text(" 7 ".into())), &schema)
            .unwrap();
        assert_eq!(args.integer("max_results"), 7);

        let args = validate(&base.clone().arg("max_results", ArgValue::Float(12.0)), &schema).unwrap();
        assert_eq!(args.integer("max_results"), 12);

        let err = validate(&base.clone().arg("max_results", ArgValue::Float(1.5)), &schema)
            .unwrap_err();
        assert!(matches!(err, ToolError::TypeMismatch { .. }));

        let err = validate(&base.arg("max_results", ArgValue::Text("many".into())), &schema)
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::TypeMismatch {
                parameter: "max_results".to_string(),
                expected: "integer".to_string(),
                received: "string \"many\"".to_string(),
            }
        );
    }

    #[test]
    fn test_boolean_coercion() {
        let schema = grep_schema();
        let base = ToolCall::new("grep_search").arg("pattern", ArgValue::Text("x".into()));

        let args = validate(&base.clone().arg("is_regex", ArgValue::Text("TRUE".into())), &schema)
            .unwrap();
        assert!(args.boolean("is_regex"));

        let err = validate(&base.arg("is_regex", ArgValue::Integer(1)), &schema).unwrap_err();
        assert!(matches!(err, ToolError::TypeMismatch { ref parameter, .. } if parameter == "is_regex"));
    }

    #[test]
    fn test_string_accepts_scalars() {
        let call = ToolCall::new("grep_search").arg("pattern", ArgValue::Integer(404));
        let args = validate(&call, &grep_schema()).unwrap();
        assert_eq!(args.text("pattern"), "404");
    }

    #[test]
    fn test_enumeration_membership() {
        let schema = checklist_schema();

        let ok = ToolCall::new("create_security_checklist").arg("topic", ArgValue::Text("cloud".into()));
        assert_eq!(validate(&ok, &schema).unwrap().text("topic"), "cloud");

        let bad =
            ToolCall::new("create_security_checklist").arg("topic", ArgValue::Text("mainframe".into()));
        assert_eq!(
            validate(&bad, &schema).unwrap_err(),
            ToolError::InvalidEnumValue {
                parameter: "topic".to_string(),
                value: "mainframe".to_string(),
                allowed: vec![
                    "web_app".to_string(),
                    "network".to_string(),
                    "cloud".to_string()
                ],
            }
        );
    }

    #[test]
    fn test_revalidation_is_a_no_op() {
        let schema = grep_schema();
        let call = ToolCall::new("grep_search")
            .arg("pattern", ArgValue::Text("secret".into()))
            .arg("max_results", ArgValue::Text("3".into()));

        let first = validate(&call, &schema).unwrap();
        let second = validate(&ToolCall::from_validated("grep_search", &first), &schema).unwrap();
        assert_eq!(first, second);
    }
}
