//! Table-driven structural validation.
//!
//! A shape is a list of field rules. Validation walks every rule and returns
//! every violation it finds; callers decide whether an empty list means "ok".

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn describe_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array => "array",
            FieldKind::Any => "any",
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
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

/// Regex that is compiled when the rule is built or deserialized, so a bad
/// pattern is rejected at the boundary instead of during validation.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Pattern)
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pattern::new(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldRule {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            pattern: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            allowed: None,
            description: None,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Panics on an invalid pattern; meant for patterns written in code.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Pattern::new(pattern).unwrap_or_else(|e| panic!("bad pattern {pattern}: {e}")));
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.minimum = min;
        self.maximum = max;
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        self.allowed = Some(allowed.iter().map(|s| s.to_string()).collect());
        self
    }

    fn check(&self, value: Option<&Value>, out: &mut Vec<FieldViolation>) {
        let field = self.name.as_str();
        let value = match value {
            None | Some(Value::Null) => {
                if self.required {
                    out.push(FieldViolation::new(field, "is required"));
                }
                return;
            }
            Some(v) => v,
        };

        if !self.kind.matches(value) {
            out.push(FieldViolation::new(
                field,
                format!("expected {}, got {}", self.kind.as_str(), kind_of(value)),
            ));
            return;
        }

        let len = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = len {
            if let Some(min) = self.min_length {
                if len < min {
                    out.push(FieldViolation::new(field, format!("length {len} is below minimum {min}")));
                }
            }
            if let Some(max) = self.max_length {
                if len > max {
                    out.push(FieldViolation::new(field, format!("length {len} exceeds maximum {max}")));
                }
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    out.push(FieldViolation::new(field, format!("{n} is below minimum {min}")));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    out.push(FieldViolation::new(field, format!("{n} exceeds maximum {max}")));
                }
            }
        }

        if let Value::String(s) = value {
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(s) {
                    out.push(FieldViolation::new(
                        field,
                        format!("does not match pattern {}", pattern.as_str()),
                    ));
                }
            }
        }

        if let Some(allowed) = &self.allowed {
            let repr = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !allowed.contains(&repr) {
                out.push(FieldViolation::new(
                    field,
                    format!("must be one of [{}]", allowed.join(", ")),
                ));
            }
        }
    }
}

/// Declared input shape of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputShape {
    #[serde(default)]
    pub fields: Vec<FieldRule>,
    /// Reject keys that no rule names.
    #[serde(default)]
    pub deny_unknown: bool,
}

impl InputShape {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self {
            fields,
            deny_unknown: false,
        }
    }

    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    pub fn validate(&self, value: &Value) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        let Some(obj) = value.as_object() else {
            out.push(FieldViolation::new(
                "$",
                format!("expected object, got {}", kind_of(value)),
            ));
            return out;
        };

        for rule in &self.fields {
            rule.check(obj.get(&rule.name), &mut out);
        }

        if self.deny_unknown {
            for key in obj.keys() {
                if !self.fields.iter().any(|r| &r.name == key) {
                    out.push(FieldViolation::new(key, "unknown field"));
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shape() -> InputShape {
        InputShape::new(vec![
            FieldRule::string("repo_slug").required().pattern("^[a-z0-9_.-]+$"),
            FieldRule::string("state").one_of(&["OPEN", "MERGED", "DECLINED"]),
            FieldRule::new("page", FieldKind::Integer).range(Some(1.0), None),
            FieldRule::string("title").length(Some(1), Some(5)),
        ])
    }

    #[test]
    fn reports_every_violation_not_just_the_first() {
        let errors = shape().validate(&json!({
            "state": "WHATEVER",
            "page": 0,
            "title": "far too long"
        }));

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["repo_slug", "state", "page", "title"]);
    }

    #[test]
    fn type_mismatch_skips_remaining_checks_for_that_field() {
        let errors = shape().validate(&json!({"repo_slug": 42}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "expected string, got integer");
    }

    #[test]
    fn deny_unknown_flags_extra_keys() {
        let errors = shape()
            .deny_unknown()
            .validate(&json!({"repo_slug": "cairn", "extra": true}));
        assert_eq!(errors, vec![FieldViolation::new("extra", "unknown field")]);
    }

    #[test]
    fn non_object_input_is_a_single_violation() {
        let errors = shape().validate(&json!([1, 2]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "$");
    }

    #[test]
    fn bad_pattern_is_rejected_on_deserialize() {
        let res: Result<FieldRule, _> = serde_json::from_value(json!({
            "name": "x", "kind": "string", "pattern": "(unclosed"
        }));
        assert!(res.is_err());
    }
}
