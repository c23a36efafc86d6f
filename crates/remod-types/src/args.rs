//! Safe argument records.
//!
//! Caller-supplied transformation parameters arrive as an arbitrary
//! [`RawValue`] tree. [`SafeArgumentRecord::validate`] is the only way to
//! turn that tree into something that may reach sandboxed code, and it only
//! lets flat string / number / boolean maps through.
//!
//! ```text
//! RawValue ──validate()──► SafeArgumentRecord ──► sandbox `args` table
//!    │
//!    └── function / host object / null / nested container ──► ValidationError
//! ```
//!
//! An optional [`ArgumentSchema`] adds per-name typing, defaults and
//! required checks on top of the structural walk.

use crate::error::ErrorCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Caller-side value tree, before validation.
///
/// `Function` and `Opaque` model host values that have no JSON form. They
/// exist so embedders can faithfully describe what a caller passed and get
/// a precise rejection instead of a silent drop.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<RawValue>),
    Map(Vec<(String, RawValue)>),
    Function { name: String },
    Opaque { type_name: String },
}

impl RawValue {
    /// Builds a map from key/value pairs, keeping their order.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, RawValue)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Builds a string leaf.
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Short name of the variant, used in error reasons.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Function { .. } => "function",
            Self::Opaque { .. } => "object",
        }
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

/// A validated scalar argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Boolean(bool),
    Number(f64),
    String(String),
}

impl ArgumentValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ArgumentValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for ArgumentValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for ArgumentValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// One flat key → scalar map.
pub type ArgumentRecord = BTreeMap<String, ArgumentValue>;

/// Argument rejected during validation.
///
/// `path` locates the offending value inside the raw tree, e.g. `$[0].hook`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid argument at {path}: {reason}")]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ValidationError {
    fn code(&self) -> &'static str {
        "ARGS_INVALID"
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Type of a declared argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Number,
    Boolean,
    Enum { options: Vec<String> },
}

impl ArgumentKind {
    fn coerce(&self, value: &ArgumentValue) -> Result<ArgumentValue, String> {
        match (self, value) {
            (Self::String, v) => Ok(ArgumentValue::String(v.to_string())),
            (Self::Number, ArgumentValue::Number(n)) => Ok(ArgumentValue::Number(*n)),
            (Self::Number, ArgumentValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(ArgumentValue::Number)
                .ok_or_else(|| "invalid number".to_string()),
            (Self::Number, ArgumentValue::Boolean(_)) => Err("invalid number".to_string()),
            (Self::Boolean, ArgumentValue::Boolean(b)) => Ok(ArgumentValue::Boolean(*b)),
            (Self::Boolean, ArgumentValue::String(s)) if s == "true" || s == "false" => {
                Ok(ArgumentValue::Boolean(s == "true"))
            }
            (Self::Boolean, _) => {
                Err("incorrect value. Valid options: true, false".to_string())
            }
            (Self::Enum { options }, v) => {
                let s = v.to_string();
                if options.iter().any(|o| *o == s) {
                    Ok(ArgumentValue::String(s))
                } else {
                    Err(format!(
                        "incorrect value. Valid options: {}",
                        options.join(",")
                    ))
                }
            }
        }
    }
}

/// Declaration of one named argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: ArgumentKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<ArgumentValue>,
}

impl ArgumentDescriptor {
    fn with_kind(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgumentKind::String)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgumentKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgumentKind::Boolean)
    }

    pub fn one_of<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(
            name,
            ArgumentKind::Enum {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<ArgumentValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Declared arguments of a transformation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSchema {
    #[serde(default)]
    pub arguments: Vec<ArgumentDescriptor>,
}

impl ArgumentSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, descriptor: ArgumentDescriptor) -> Self {
        self.arguments.push(descriptor);
        self
    }
}

/// Validated, scalar-only argument bag.
///
/// An ordered list of flat records. Inside the sandbox the records are
/// exposed merged, later records overriding earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafeArgumentRecord(Vec<ArgumentRecord>);

impl SafeArgumentRecord {
    /// An empty record list.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates a raw value tree.
    ///
    /// Accepts a map or a list of maps whose values are strings, finite
    /// numbers or booleans.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] locating the first offending value.
    ///
    /// ```
    /// use remod_types::{RawValue, SafeArgumentRecord};
    ///
    /// let raw = RawValue::map([
    ///     ("name", RawValue::string("State")),
    ///     ("callback", RawValue::Function { name: "cb".into() }),
    /// ]);
    /// let err = SafeArgumentRecord::validate(&raw).unwrap_err();
    /// assert_eq!(err.path, "$.callback");
    /// ```
    pub fn validate(raw: &RawValue) -> Result<Self, ValidationError> {
        let records = match raw {
            RawValue::Map(entries) => vec![validate_record("$", entries)?],
            RawValue::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let path = format!("$[{i}]");
                    match item {
                        RawValue::Map(entries) => validate_record(&path, entries),
                        other => Err(first_forbidden(&path, other).unwrap_or_else(|| {
                            ValidationError::new(
                                path.clone(),
                                format!("expected a map, found {}", other.type_name()),
                            )
                        })),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(first_forbidden("$", other).unwrap_or_else(|| {
                    ValidationError::new(
                        "$",
                        format!("expected a map or a list of maps, found {}", other.type_name()),
                    )
                }))
            }
        };
        Ok(Self(records))
    }

    /// Validates a raw value tree, then resolves every record against `schema`.
    ///
    /// Undeclared keys are dropped, defaults fill missing keys and string
    /// inputs are coerced to the declared kind.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for structural problems and for values
    /// that do not satisfy their descriptor.
    pub fn validate_with(raw: &RawValue, schema: &ArgumentSchema) -> Result<Self, ValidationError> {
        let Self(mut records) = Self::validate(raw)?;
        if records.is_empty() {
            records.push(ArgumentRecord::new());
        }
        let resolved = records
            .iter()
            .enumerate()
            .map(|(i, record)| resolve_record(i, record, schema))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(resolved))
    }

    /// Returns the validated records in order.
    #[must_use]
    pub fn records(&self) -> &[ArgumentRecord] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(BTreeMap::is_empty)
    }

    /// Flattens all records into one, later records winning.
    #[must_use]
    pub fn merged(&self) -> ArgumentRecord {
        let mut out = ArgumentRecord::new();
        for record in &self.0 {
            out.extend(record.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        out
    }

    /// Looks up a key, later records winning.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ArgumentValue> {
        self.0.iter().rev().find_map(|r| r.get(key))
    }
}

fn validate_record(base: &str, entries: &[(String, RawValue)]) -> Result<ArgumentRecord, ValidationError> {
    let mut record = ArgumentRecord::new();
    for (key, value) in entries {
        let path = format!("{base}.{key}");
        record.insert(key.clone(), validate_scalar(&path, value)?);
    }
    Ok(record)
}

fn validate_scalar(path: &str, value: &RawValue) -> Result<ArgumentValue, ValidationError> {
    match value {
        RawValue::Bool(b) => Ok(ArgumentValue::Boolean(*b)),
        RawValue::Number(n) if n.is_finite() => Ok(ArgumentValue::Number(*n)),
        RawValue::Number(_) => Err(ValidationError::new(path, "number is not finite")),
        RawValue::String(s) => Ok(ArgumentValue::String(s.clone())),
        RawValue::Null => Err(ValidationError::new(path, "null is not an argument value")),
        RawValue::Array(_) | RawValue::Map(_) | RawValue::Function { .. } | RawValue::Opaque { .. } => {
            Err(first_forbidden(path, value).unwrap_or_else(|| {
                ValidationError::new(
                    path,
                    format!("expected a scalar, found nested {}", value.type_name()),
                )
            }))
        }
    }
}

/// Finds the first function or host object anywhere below `value`.
fn first_forbidden(path: &str, value: &RawValue) -> Option<ValidationError> {
    match value {
        RawValue::Function { name } => Some(ValidationError::new(
            path,
            format!("function '{name}' cannot be passed as an argument"),
        )),
        RawValue::Opaque { type_name } => Some(ValidationError::new(
            path,
            format!("host object '{type_name}' cannot be passed as an argument"),
        )),
        RawValue::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(i, item)| first_forbidden(&format!("{path}[{i}]"), item)),
        RawValue::Map(entries) => entries
            .iter()
            .find_map(|(k, v)| first_forbidden(&format!("{path}.{k}"), v)),
        _ => None,
    }
}

fn resolve_record(
    index: usize,
    record: &ArgumentRecord,
    schema: &ArgumentSchema,
) -> Result<ArgumentRecord, ValidationError> {
    let mut out = ArgumentRecord::new();
    for descriptor in &schema.arguments {
        let path = format!("$[{index}].{}", descriptor.name);
        let supplied = record
            .get(&descriptor.name)
            .filter(|v| !matches!(v, ArgumentValue::String(s) if s.is_empty()));

        match supplied {
            Some(value) => {
                let coerced = descriptor
                    .kind
                    .coerce(value)
                    .map_err(|reason| ValidationError::new(&path, reason))?;
                out.insert(descriptor.name.clone(), coerced);
            }
            None => {
                if let Some(default) = &descriptor.default {
                    out.insert(descriptor.name.clone(), default.clone());
                } else if descriptor.required {
                    return Err(ValidationError::new(path, "required but missing"));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::assert_error_code;
    use serde_json::json;

    // ─── Structural validation ───

    #[test]
    fn accepts_flat_map() {
        let raw = RawValue::from(json!({ "name": "State", "limit": 3, "dry": false }));
        let record = SafeArgumentRecord::validate(&raw).expect("valid");
        assert_eq!(record.records().len(), 1);
        assert_eq!(record.get("name"), Some(&ArgumentValue::from("State")));
        assert_eq!(record.get("limit"), Some(&ArgumentValue::Number(3.0)));
        assert_eq!(record.get("dry"), Some(&ArgumentValue::Boolean(false)));
    }

    #[test]
    fn accepts_list_of_maps_and_merges_in_order() {
        let raw = RawValue::from(json!([{ "a": "1", "b": "x" }, { "a": "2" }]));
        let record = SafeArgumentRecord::validate(&raw).expect("valid");
        assert_eq!(record.records().len(), 2);
        let merged = record.merged();
        assert_eq!(merged["a"], ArgumentValue::from("2"));
        assert_eq!(merged["b"], ArgumentValue::from("x"));
    }

    #[test]
    fn rejects_function_leaf() {
        let raw = RawValue::Array(vec![RawValue::map([(
            "transform",
            RawValue::Function {
                name: "evil".into(),
            },
        )])]);
        let err = SafeArgumentRecord::validate(&raw).expect_err("function rejected");
        assert_eq!(err.path, "$[0].transform");
        assert!(err.reason.contains("function"), "got: {}", err.reason);
        assert_error_code(&err, "ARGS_");
    }

    #[test]
    fn reports_deeply_nested_function_path() {
        let raw = RawValue::map([(
            "options",
            RawValue::map([(
                "hooks",
                RawValue::Array(vec![
                    RawValue::string("ok"),
                    RawValue::Function { name: "cb".into() },
                ]),
            )]),
        )]);
        let err = SafeArgumentRecord::validate(&raw).expect_err("rejected");
        assert_eq!(err.path, "$.options.hooks[1]");
    }

    #[test]
    fn rejects_host_objects_null_and_nested_scalars() {
        let opaque = RawValue::map([("db", RawValue::Opaque { type_name: "Pool".into() })]);
        assert!(SafeArgumentRecord::validate(&opaque)
            .expect_err("opaque")
            .reason
            .contains("Pool"));

        let null = RawValue::from(json!({ "x": null }));
        assert_eq!(SafeArgumentRecord::validate(&null).expect_err("null").path, "$.x");

        let nested = RawValue::from(json!({ "x": { "y": 1 } }));
        let err = SafeArgumentRecord::validate(&nested).expect_err("nested");
        assert_eq!(err.path, "$.x");
        assert!(err.reason.contains("nested"), "got: {}", err.reason);
    }

    #[test]
    fn rejects_non_map_top_level() {
        let err = SafeArgumentRecord::validate(&RawValue::string("x")).expect_err("scalar");
        assert_eq!(err.path, "$");
        let err = SafeArgumentRecord::validate(&RawValue::from(json!([1]))).expect_err("item");
        assert_eq!(err.path, "$[0]");
    }

    // ─── Schema resolution ───

    fn schema() -> ArgumentSchema {
        ArgumentSchema::new()
            .with(ArgumentDescriptor::string("type").required())
            .with(ArgumentDescriptor::number("depth").with_default(2.0))
            .with(ArgumentDescriptor::boolean("strict"))
            .with(ArgumentDescriptor::one_of("quote", ["single", "double"]))
    }

    #[test]
    fn schema_coerces_and_defaults() {
        let raw = RawValue::from(json!({ "type": "State", "strict": "true", "quote": "double", "extra": 1 }));
        let record = SafeArgumentRecord::validate_with(&raw, &schema()).expect("valid");
        let merged = record.merged();
        assert_eq!(merged["type"], ArgumentValue::from("State"));
        assert_eq!(merged["depth"], ArgumentValue::Number(2.0));
        assert_eq!(merged["strict"], ArgumentValue::Boolean(true));
        assert_eq!(merged["quote"], ArgumentValue::from("double"));
        assert!(!merged.contains_key("extra"));
    }

    #[test]
    fn schema_reports_original_messages() {
        let missing = RawValue::from(json!({}));
        let err = SafeArgumentRecord::validate_with(&missing, &schema()).expect_err("missing");
        assert_eq!(err.path, "$[0].type");
        assert_eq!(err.reason, "required but missing");

        let bad_bool = RawValue::from(json!({ "type": "S", "strict": "maybe" }));
        assert_eq!(
            SafeArgumentRecord::validate_with(&bad_bool, &schema())
                .expect_err("bool")
                .reason,
            "incorrect value. Valid options: true, false"
        );

        let bad_num = RawValue::from(json!({ "type": "S", "depth": "deep" }));
        assert_eq!(
            SafeArgumentRecord::validate_with(&bad_num, &schema())
                .expect_err("num")
                .reason,
            "invalid number"
        );

        let bad_enum = RawValue::from(json!({ "type": "S", "quote": "back" }));
        assert_eq!(
            SafeArgumentRecord::validate_with(&bad_enum, &schema())
                .expect_err("enum")
                .reason,
            "incorrect value. Valid options: single,double"
        );
    }

    #[test]
    fn schema_descriptors_deserialize() {
        let schema: ArgumentSchema = serde_json::from_value(json!({
            "arguments": [
                { "name": "mode", "kind": "enum", "options": ["a", "b"], "required": true },
                { "name": "n", "kind": "number", "default": 1 }
            ]
        }))
        .expect("deserialize");
        assert_eq!(
            schema.arguments[0].kind,
            ArgumentKind::Enum {
                options: vec!["a".into(), "b".into()]
            }
        );
        assert!(schema.arguments[0].required);
        assert_eq!(schema.arguments[1].default, Some(ArgumentValue::Number(1.0)));
    }
}
