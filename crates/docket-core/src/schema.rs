//! Parameter schema validation (a JSON-Schema subset).
//!
//! Supported keywords: `type` (string or list), `enum`, `required`,
//! `properties`, `additionalProperties` (bool or schema), `items` (schema or
//! positional list), `minLength` / `maxLength` (characters), `pattern`,
//! `minimum` / `maximum`, `minItems` / `maxItems`. Boolean schemas are
//! accepted (`true` allows anything, `false` nothing). Unknown keywords are
//! ignored.
//!
//! Validation collects every error. The only short-circuit is a `type`
//! mismatch, which skips the remaining checks of that subtree.
//!
//! Patterns come from producers and are untrusted: they are compiled with size
//! limits, and a pattern that fails to compile is a validation error.

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{BrokerError, FieldError};

/// Compiled program and lazy DFA limits for one `pattern`.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Result of validating a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    /// `path: message` lines.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn into_result(self) -> Result<(), BrokerError> {
        if self.valid {
            Ok(())
        } else {
            Err(BrokerError::ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// Validates `value` against `schema`. Pure and deterministic.
pub fn validate(schema: &Value, value: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    check(schema, value, "$", &mut errors);
    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn push(errors: &mut Vec<FieldError>, path: &str, message: impl Into<String>) {
    errors.push(FieldError::new(path, message));
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let rules = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            push(errors, path, "no value is allowed here");
            return;
        }
        Value::Object(rules) => rules,
        _ => {
            push(errors, path, "schema must be an object or a boolean");
            return;
        }
    };

    if let Some(expected) = rules.get("type")
        && !check_type(expected, value, path, errors)
    {
        return;
    }

    if let Some(allowed) = rules.get("enum") {
        match allowed {
            Value::Array(options) if !options.contains(value) => {
                push(errors, path, format!("must be one of {allowed}"));
            }
            Value::Array(_) => {}
            _ => push(errors, path, "schema keyword 'enum' must be an array"),
        }
    }

    match value {
        Value::String(s) => check_string(rules, s, path, errors),
        Value::Number(_) => check_number(rules, value, path, errors),
        Value::Array(items) => check_array(rules, items, path, errors),
        Value::Object(fields) => check_object(rules, fields, path, errors),
        Value::Null | Value::Bool(_) => {}
    }
}

fn type_name(value: &Value) -> &'static str {
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

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => false,
    }
}

fn matches_type(name: &str, value: &Value) -> Option<bool> {
    let ok = match name {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => is_integer(value),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => return None,
    };
    Some(ok)
}

/// Returns `false` when the subtree must not be checked further.
fn check_type(expected: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) -> bool {
    let names: Vec<&str> = match expected {
        Value::String(name) => vec![name.as_str()],
        Value::Array(names) if names.iter().all(Value::is_string) => {
            names.iter().filter_map(Value::as_str).collect()
        }
        _ => {
            push(errors, path, "schema keyword 'type' must be a string or an array of strings");
            return false;
        }
    };

    let mut matched = false;
    for name in &names {
        match matches_type(name, value) {
            Some(ok) => matched |= ok,
            None => {
                push(errors, path, format!("schema names unknown type '{name}'"));
                return false;
            }
        }
    }

    if !matched {
        push(
            errors,
            path,
            format!("expected {}, got {}", names.join(" or "), type_name(value)),
        );
    }
    matched
}

/// Reads a non-negative integer keyword; reports a malformed one.
fn limit(
    rules: &Map<String, Value>,
    keyword: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<u64> {
    let raw = rules.get(keyword)?;
    let parsed = raw.as_u64();
    if parsed.is_none() {
        push(
            errors,
            path,
            format!("schema keyword '{keyword}' must be a non-negative integer"),
        );
    }
    parsed
}

fn bound(
    rules: &Map<String, Value>,
    keyword: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) -> Option<f64> {
    let raw = rules.get(keyword)?;
    let parsed = raw.as_f64();
    if parsed.is_none() {
        push(errors, path, format!("schema keyword '{keyword}' must be a number"));
    }
    parsed
}

fn check_string(rules: &Map<String, Value>, s: &str, path: &str, errors: &mut Vec<FieldError>) {
    let len = s.chars().count() as u64;
    if let Some(min) = limit(rules, "minLength", path, errors)
        && len < min
    {
        push(errors, path, format!("must be at least {min} characters long"));
    }
    if let Some(max) = limit(rules, "maxLength", path, errors)
        && len > max
    {
        push(errors, path, format!("must be at most {max} characters long"));
    }

    if let Some(pattern) = rules.get("pattern") {
        let Some(pattern) = pattern.as_str() else {
            push(errors, path, "schema keyword 'pattern' must be a string");
            return;
        };
        match RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .dfa_size_limit(PATTERN_SIZE_LIMIT)
            .build()
        {
            Ok(re) if !re.is_match(s) => {
                push(errors, path, format!("does not match pattern '{pattern}'"));
            }
            Ok(_) => {}
            Err(err) => push(errors, path, format!("invalid pattern '{pattern}': {err}")),
        }
    }
}

fn check_number(rules: &Map<String, Value>, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(n) = value.as_f64() else {
        return;
    };
    if let Some(min) = bound(rules, "minimum", path, errors)
        && n < min
    {
        push(errors, path, format!("must be >= {min}"));
    }
    if let Some(max) = bound(rules, "maximum", path, errors)
        && n > max
    {
        push(errors, path, format!("must be <= {max}"));
    }
}

fn check_array(rules: &Map<String, Value>, items: &[Value], path: &str, errors: &mut Vec<FieldError>) {
    let len = items.len() as u64;
    if let Some(min) = limit(rules, "minItems", path, errors)
        && len < min
    {
        push(errors, path, format!("must contain at least {min} items"));
    }
    if let Some(max) = limit(rules, "maxItems", path, errors)
        && len > max
    {
        push(errors, path, format!("must contain at most {max} items"));
    }

    match rules.get("items") {
        None => {}
        Some(Value::Array(positional)) => {
            for (i, (item, schema)) in items.iter().zip(positional).enumerate() {
                check(schema, item, &format!("{path}[{i}]"), errors);
            }
        }
        Some(schema) => {
            for (i, item) in items.iter().enumerate() {
                check(schema, item, &format!("{path}[{i}]"), errors);
            }
        }
    }
}

fn check_object(
    rules: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    match rules.get("required") {
        None => {}
        Some(Value::Array(required)) => {
            for name in required {
                match name.as_str() {
                    Some(name) if !fields.contains_key(name) => {
                        push(errors, &format!("{path}.{name}"), "is required");
                    }
                    Some(_) => {}
                    None => push(errors, path, "schema keyword 'required' must list strings"),
                }
            }
        }
        Some(_) => push(errors, path, "schema keyword 'required' must be an array"),
    }

    let properties = match rules.get("properties") {
        None => None,
        Some(Value::Object(properties)) => Some(properties),
        Some(_) => {
            push(errors, path, "schema keyword 'properties' must be an object");
            None
        }
    };

    let additional = rules.get("additionalProperties");
    for (name, field) in fields {
        let child = format!("{path}.{name}");
        match properties.and_then(|p| p.get(name)) {
            Some(schema) => check(schema, field, &child, errors),
            None => match additional {
                None | Some(Value::Bool(true)) => {}
                Some(Value::Bool(false)) => push(errors, &child, "is not an allowed property"),
                Some(schema) => check(schema, field, &child, errors),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn fields(report: &ValidationReport) -> Vec<&str> {
        report.errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn scenario_schema_accepts_integer_x() {
        let schema = json!({"type": "object", "required": ["x"], "properties": {"x": {"type": "integer"}}});
        assert!(validate(&schema, &json!({"x": 1})).valid);
        assert!(validate(&schema, &json!({"x": 1.0})).valid);

        let report = validate(&schema, &json!({"x": 1.5}));
        assert!(!report.valid);
        assert_eq!(fields(&report), vec!["$.x"]);
    }

    #[rstest]
    #[case::string(json!("string"), json!("a"), true)]
    #[case::string_mismatch(json!("string"), json!(1), false)]
    #[case::number_accepts_integer(json!("number"), json!(3), true)]
    #[case::integer_rejects_fraction(json!("integer"), json!(3.5), false)]
    #[case::boolean(json!("boolean"), json!(false), true)]
    #[case::null(json!("null"), json!(null), true)]
    #[case::array(json!("array"), json!([]), true)]
    #[case::object(json!("object"), json!([]), false)]
    #[case::union(json!(["string", "null"]), json!(null), true)]
    #[case::union_mismatch(json!(["string", "null"]), json!(0), false)]
    fn type_keyword(#[case] ty: Value, #[case] value: Value, #[case] valid: bool) {
        assert_eq!(validate(&json!({"type": ty}), &value).valid, valid);
    }

    #[test]
    fn reports_every_failing_field() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "c": {"type": "string", "minLength": 3},
                "d": {"type": "integer", "maximum": 10}
            },
            "additionalProperties": false
        });
        let report = validate(&schema, &json!({"c": "x", "d": 11, "e": true}));
        let mut got = fields(&report);
        got.sort();
        assert_eq!(got, vec!["$.a", "$.b", "$.c", "$.d", "$.e"]);
    }

    #[test]
    fn type_mismatch_stops_the_subtree_only() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {"type": "string", "minLength": 5, "pattern": "^x"},
                "b": {"type": "integer", "minimum": 0}
            }
        });
        let report = validate(&schema, &json!({"a": 7, "b": -1}));
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].message, "expected string, got integer");
        assert_eq!(report.errors[1].field, "$.b");
    }

    #[test]
    fn string_length_counts_characters() {
        let schema = json!({"type": "string", "maxLength": 2});
        assert!(validate(&schema, &json!("ßü")).valid);
        assert!(!validate(&schema, &json!("abc")).valid);
    }

    #[test]
    fn pattern_is_a_search() {
        let schema = json!({"type": "string", "pattern": "[0-9]+"});
        assert!(validate(&schema, &json!("abc123")).valid);
        assert!(!validate(&schema, &json!("abc")).valid);
    }

    #[rstest]
    #[case::unclosed("(")]
    #[case::bad_class("[z-a]")]
    #[case::too_large("(?:a{1000}){1000}")]
    fn invalid_pattern_is_a_validation_error(#[case] pattern: &str) {
        let schema = json!({"type": "string", "pattern": pattern});
        let report = validate(&schema, &json!("anything"));
        assert!(!report.valid);
        assert!(report.errors[0].message.starts_with("invalid pattern"));
    }

    #[test]
    fn enum_uses_json_equality() {
        let schema = json!({"enum": ["low", "high", 3]});
        assert!(validate(&schema, &json!("low")).valid);
        assert!(validate(&schema, &json!(3)).valid);
        assert!(!validate(&schema, &json!("mid")).valid);
    }

    #[test]
    fn items_and_item_counts() {
        let schema = json!({"type": "array", "minItems": 1, "maxItems": 3, "items": {"type": "integer"}});
        assert!(validate(&schema, &json!([1, 2])).valid);

        let report = validate(&schema, &json!([1, "two", 3, 4]));
        assert_eq!(fields(&report), vec!["$", "$[1]"]);

        assert!(!validate(&schema, &json!([])).valid);
    }

    #[test]
    fn positional_items() {
        let schema = json!({"items": [{"type": "string"}, {"type": "integer"}]});
        assert!(validate(&schema, &json!(["a", 1, null])).valid);
        assert_eq!(fields(&validate(&schema, &json!([1, 1]))), vec!["$[0]"]);
    }

    #[test]
    fn additional_properties_schema_applies_to_extras() {
        let schema = json!({
            "properties": {"known": {"type": "string"}},
            "additionalProperties": {"type": "integer"}
        });
        assert!(validate(&schema, &json!({"known": "k", "n": 1})).valid);
        assert_eq!(fields(&validate(&schema, &json!({"n": "x"}))), vec!["$.n"]);
    }

    #[test]
    fn nested_paths() {
        let schema = json!({
            "properties": {"outer": {"properties": {"inner": {"type": "array", "items": {"type": "boolean"}}}}}
        });
        let report = validate(&schema, &json!({"outer": {"inner": [true, 0]}}));
        assert_eq!(fields(&report), vec!["$.outer.inner[1]"]);
    }

    #[test]
    fn malformed_keywords_are_reported_not_panicked() {
        let schema = json!({"type": "string", "minLength": "three", "pattern": 5});
        let report = validate(&schema, &json!("x"));
        assert_eq!(report.errors.len(), 2);

        let report = validate(&json!({"type": "decimal"}), &json!(1));
        assert!(report.errors[0].message.contains("unknown type"));

        assert!(!validate(&json!(42), &json!(1)).valid);
    }

    #[test]
    fn boolean_and_empty_schemas() {
        assert!(validate(&json!(true), &json!({"any": 1})).valid);
        assert!(validate(&json!({}), &json!([1, "x"])).valid);
        assert!(!validate(&json!(false), &json!(null)).valid);
    }

    #[test]
    fn report_into_result_carries_errors() {
        let err = validate(&json!({"type": "object", "required": ["x"]}), &json!({}))
            .into_result()
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "$.x");
        assert_eq!(err.field_errors()[0].message, "is required");
    }
}
