//! Instance validation against a schema document.
//!
//! Walks the schema and the value together and collects every violation,
//! each tagged with a JSON pointer to the offending value.

use crate::format::matches_format;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use weft_core::SchemaViolation;

/// Distinct `pattern` sources kept compiled before the memo starts over
const PATTERN_MEMO_LIMIT: usize = 1024;

/// Compiled `pattern` keywords by source; `None` marks one that failed
static PATTERNS: Lazy<RwLock<HashMap<String, Option<Regex>>>> = Lazy::new(Default::default);

/// Compile a `pattern` keyword once and reuse it on later calls
pub(crate) fn compiled_pattern(pattern: &str) -> Option<Regex> {
    if let Some(known) = PATTERNS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(pattern)
    {
        return known.clone();
    }
    let compiled = Regex::new(pattern).ok();
    let mut memo = PATTERNS.write().unwrap_or_else(PoisonError::into_inner);
    if memo.len() >= PATTERN_MEMO_LIMIT {
        memo.clear();
    }
    memo.insert(pattern.to_string(), compiled.clone());
    compiled
}

/// Type names accepted by the `type` keyword
pub const TYPE_NAMES: [&str; 7] = [
    "null", "boolean", "object", "array", "number", "integer", "string",
];

/// Validate `data` against `schema`, returning every violation found
#[must_use]
pub fn check_value(schema: &Value, data: &Value) -> Vec<SchemaViolation> {
    let mut out = Vec::new();
    walk(schema, data, "", &mut out);
    out
}

/// Extend a JSON pointer with one reference token
#[must_use]
pub fn child_path(parent: &str, token: &str) -> String {
    let escaped = token.replace('~', "~0").replace('/', "~1");
    format!("{}/{}", parent, escaped)
}

/// JSON type name of a value, reporting whole numbers as `integer`
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if is_integer(n) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_integer(n: &serde_json::Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "number" => value.is_number(),
        "integer" => matches!(value, Value::Number(n) if is_integer(n)),
        other => type_name(value) == other,
    }
}

fn walk(schema: &Value, data: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    let keywords = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            out.push(SchemaViolation::new(path, "false", "no value is allowed here"));
            return;
        }
        Value::Object(map) => map,
        // Non-schema documents are caught by the meta-check
        _ => return,
    };

    if !check_type(keywords, data, path, out) {
        // Remaining keywords assume the declared type
        return;
    }
    check_enum_const(keywords, data, path, out);

    match data {
        Value::Number(n) => {
            if let Some(x) = n.as_f64() {
                check_number(keywords, x, path, out);
            }
        }
        Value::String(s) => check_string(keywords, s, path, out),
        Value::Array(items) => check_array(keywords, items, path, out),
        Value::Object(props) => check_object(keywords, props, path, out),
        _ => {}
    }

    check_combinators(keywords, data, path, out);
}

fn check_type(
    keywords: &Map<String, Value>,
    data: &Value,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) -> bool {
    let expected: Vec<&str> = match keywords.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => return true,
    };
    if expected.iter().any(|t| type_matches(t, data)) {
        return true;
    }
    out.push(SchemaViolation::new(
        path,
        "type",
        format!("expected {}, got {}", expected.join(" or "), type_name(data)),
    ));
    false
}

fn check_enum_const(
    keywords: &Map<String, Value>,
    data: &Value,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    if let Some(Value::Array(allowed)) = keywords.get("enum") {
        if !allowed.iter().any(|v| json_eq(v, data)) {
            out.push(SchemaViolation::new(
                path,
                "enum",
                "value is not one of the allowed values",
            ));
        }
    }
    if let Some(expected) = keywords.get("const") {
        if !json_eq(expected, data) {
            out.push(SchemaViolation::new(
                path,
                "const",
                format!("expected constant {}", expected),
            ));
        }
    }
}

/// Equality treating `1` and `1.0` as the same number
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

fn check_number(keywords: &Map<String, Value>, x: f64, path: &str, out: &mut Vec<SchemaViolation>) {
    let bound = |name: &str| keywords.get(name).and_then(Value::as_f64);

    if let Some(min) = bound("minimum") {
        if x < min {
            out.push(SchemaViolation::new(
                path,
                "minimum",
                format!("{} is less than {}", x, min),
            ));
        }
    }
    if let Some(max) = bound("maximum") {
        if x > max {
            out.push(SchemaViolation::new(
                path,
                "maximum",
                format!("{} is greater than {}", x, max),
            ));
        }
    }
    if let Some(min) = bound("exclusiveMinimum") {
        if x <= min {
            out.push(SchemaViolation::new(
                path,
                "exclusiveMinimum",
                format!("{} must be greater than {}", x, min),
            ));
        }
    }
    if let Some(max) = bound("exclusiveMaximum") {
        if x >= max {
            out.push(SchemaViolation::new(
                path,
                "exclusiveMaximum",
                format!("{} must be less than {}", x, max),
            ));
        }
    }
}

fn check_string(keywords: &Map<String, Value>, s: &str, path: &str, out: &mut Vec<SchemaViolation>) {
    let len = s.chars().count() as u64;

    if let Some(min) = keywords.get("minLength").and_then(Value::as_u64) {
        if len < min {
            out.push(SchemaViolation::new(
                path,
                "minLength",
                format!("length {} is shorter than {}", len, min),
            ));
        }
    }
    if let Some(max) = keywords.get("maxLength").and_then(Value::as_u64) {
        if len > max {
            out.push(SchemaViolation::new(
                path,
                "maxLength",
                format!("length {} is longer than {}", len, max),
            ));
        }
    }
    if let Some(pattern) = keywords.get("pattern").and_then(Value::as_str) {
        // An uncompilable pattern is reported by the meta-check, not here
        if let Some(re) = compiled_pattern(pattern) {
            if !re.is_match(s) {
                out.push(SchemaViolation::new(
                    path,
                    "pattern",
                    format!("does not match pattern {}", pattern),
                ));
            }
        }
    }
    if let Some(format) = keywords.get("format").and_then(Value::as_str) {
        if !matches_format(format, s) {
            out.push(SchemaViolation::new(
                path,
                "format",
                format!("is not a valid {}", format),
            ));
        }
    }
}

fn check_array(
    keywords: &Map<String, Value>,
    items: &[Value],
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    let len = items.len() as u64;

    if let Some(min) = keywords.get("minItems").and_then(Value::as_u64) {
        if len < min {
            out.push(SchemaViolation::new(
                path,
                "minItems",
                format!("{} items, expected at least {}", len, min),
            ));
        }
    }
    if let Some(max) = keywords.get("maxItems").and_then(Value::as_u64) {
        if len > max {
            out.push(SchemaViolation::new(
                path,
                "maxItems",
                format!("{} items, expected at most {}", len, max),
            ));
        }
    }
    if keywords.get("uniqueItems") == Some(&Value::Bool(true)) {
        let duplicated = items
            .iter()
            .enumerate()
            .any(|(i, a)| items[i + 1..].iter().any(|b| json_eq(a, b)));
        if duplicated {
            out.push(SchemaViolation::new(path, "uniqueItems", "items are not unique"));
        }
    }

    match keywords.get("items") {
        Some(Value::Array(tuple)) => {
            for (i, (schema, item)) in tuple.iter().zip(items).enumerate() {
                walk(schema, item, &child_path(path, &i.to_string()), out);
            }
        }
        Some(schema) => {
            for (i, item) in items.iter().enumerate() {
                walk(schema, item, &child_path(path, &i.to_string()), out);
            }
        }
        None => {}
    }
}

fn check_object(
    keywords: &Map<String, Value>,
    props: &Map<String, Value>,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    if let Some(Value::Array(required)) = keywords.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !props.contains_key(name) {
                out.push(SchemaViolation::new(
                    path,
                    "required",
                    format!("missing required property {}", name),
                ));
            }
        }
    }

    let count = props.len() as u64;
    if let Some(min) = keywords.get("minProperties").and_then(Value::as_u64) {
        if count < min {
            out.push(SchemaViolation::new(
                path,
                "minProperties",
                format!("{} properties, expected at least {}", count, min),
            ));
        }
    }
    if let Some(max) = keywords.get("maxProperties").and_then(Value::as_u64) {
        if count > max {
            out.push(SchemaViolation::new(
                path,
                "maxProperties",
                format!("{} properties, expected at most {}", count, max),
            ));
        }
    }

    let declared = keywords.get("properties").and_then(Value::as_object);
    for (name, value) in props {
        let child = child_path(path, name);
        match declared.and_then(|d| d.get(name)) {
            Some(schema) => walk(schema, value, &child, out),
            None => match keywords.get("additionalProperties") {
                Some(Value::Bool(false)) => out.push(SchemaViolation::new(
                    child,
                    "additionalProperties",
                    format!("property {} is not allowed", name),
                )),
                Some(schema @ Value::Object(_)) => walk(schema, value, &child, out),
                _ => {}
            },
        }
    }
}

fn check_combinators(
    keywords: &Map<String, Value>,
    data: &Value,
    path: &str,
    out: &mut Vec<SchemaViolation>,
) {
    let passes = |schema: &Value| check_value(schema, data).is_empty();

    if let Some(Value::Array(all)) = keywords.get("allOf") {
        for schema in all {
            walk(schema, data, path, out);
        }
    }
    if let Some(Value::Array(any)) = keywords.get("anyOf") {
        if !any.iter().any(passes) {
            out.push(SchemaViolation::new(
                path,
                "anyOf",
                "value does not match any of the alternatives",
            ));
        }
    }
    if let Some(Value::Array(one)) = keywords.get("oneOf") {
        let matched = one.iter().filter(|&s| passes(s)).count();
        if matched != 1 {
            out.push(SchemaViolation::new(
                path,
                "oneOf",
                format!("value matches {} alternatives, expected exactly one", matched),
            ));
        }
    }
    if let Some(schema) = keywords.get("not") {
        if passes(schema) {
            out.push(SchemaViolation::new(
                path,
                "not",
                "value matches a schema it must not match",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_input() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["a", "b"]
        })
    }

    #[test]
    fn test_valid_object() {
        assert!(check_value(&add_input(), &json!({ "a": 5, "b": 3 })).is_empty());
    }

    #[test]
    fn test_type_mismatch_reports_pointer() {
        let errors = check_value(&add_input(), &json!({ "a": "x", "b": 3 }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/a");
        assert_eq!(errors[0].keyword, "type");
        assert_eq!(errors[0].message, "expected number, got string");
    }

    #[test]
    fn test_missing_required_collects_all() {
        let errors = check_value(&add_input(), &json!({}));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.keyword == "required" && e.path.is_empty()));
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        let schema = json!({ "type": "integer" });
        assert!(check_value(&schema, &json!(3)).is_empty());
        assert!(check_value(&schema, &json!(3.0)).is_empty());
        assert!(!check_value(&schema, &json!(3.5)).is_empty());
        assert!(check_value(&json!({ "type": "number" }), &json!(3)).is_empty());
    }

    #[test]
    fn test_type_list() {
        let schema = json!({ "type": ["string", "null"] });
        assert!(check_value(&schema, &json!(null)).is_empty());
        assert!(check_value(&schema, &json!("s")).is_empty());
        let errors = check_value(&schema, &json!(1));
        assert_eq!(errors[0].message, "expected string or null, got integer");
    }

    #[test]
    fn test_numeric_bounds() {
        let schema = json!({ "minimum": 0, "exclusiveMaximum": 10 });
        assert!(check_value(&schema, &json!(0)).is_empty());
        assert_eq!(check_value(&schema, &json!(-1))[0].keyword, "minimum");
        assert_eq!(check_value(&schema, &json!(10))[0].keyword, "exclusiveMaximum");
    }

    #[test]
    fn test_string_keywords() {
        let schema = json!({ "type": "string", "minLength": 2, "maxLength": 4, "pattern": "^[a-z]+$" });
        assert!(check_value(&schema, &json!("abc")).is_empty());
        assert_eq!(check_value(&schema, &json!("a"))[0].keyword, "minLength");
        assert_eq!(check_value(&schema, &json!("abcde"))[0].keyword, "maxLength");
        assert_eq!(check_value(&schema, &json!("AB"))[0].keyword, "pattern");
        // Length counts characters, not bytes
        assert!(check_value(&schema, &json!("éé")).iter().all(|e| e.keyword == "pattern"));
    }

    #[test]
    fn test_pattern_compiled_once() {
        let schema = json!({ "type": "string", "pattern": "^memo-[0-9]+$" });
        assert!(check_value(&schema, &json!("memo-12")).is_empty());
        assert_eq!(check_value(&schema, &json!("memo-x")).len(), 1);

        let memo = PATTERNS.read().unwrap();
        assert!(matches!(memo.get("^memo-[0-9]+$"), Some(Some(_))));
    }

    #[test]
    fn test_uncompilable_pattern_is_remembered_and_skipped() {
        let schema = json!({ "type": "string", "pattern": "memo-([" });
        assert!(check_value(&schema, &json!("anything")).is_empty());
        assert!(compiled_pattern("memo-([").is_none());
        assert!(matches!(PATTERNS.read().unwrap().get("memo-(["), Some(None)));
    }

    #[test]
    fn test_format_keyword() {
        let schema = json!({ "type": "string", "format": "email" });
        assert!(check_value(&schema, &json!("a@b.io")).is_empty());
        assert_eq!(check_value(&schema, &json!("nope"))[0].keyword, "format");
    }

    #[test]
    fn test_array_items_and_bounds() {
        let schema = json!({ "type": "array", "items": { "type": "number" }, "minItems": 1, "uniqueItems": true });
        assert!(check_value(&schema, &json!([1, 2])).is_empty());
        let errors = check_value(&schema, &json!([1, "x"]));
        assert_eq!(errors[0].path, "/1");
        assert_eq!(check_value(&schema, &json!([]))[0].keyword, "minItems");
        assert_eq!(check_value(&schema, &json!([1, 1.0]))[0].keyword, "uniqueItems");
    }

    #[test]
    fn test_tuple_items() {
        let schema = json!({ "items": [{ "type": "string" }, { "type": "number" }] });
        assert!(check_value(&schema, &json!(["a", 1, true])).is_empty());
        assert_eq!(check_value(&schema, &json!([1, 1]))[0].path, "/0");
    }

    #[test]
    fn test_additional_properties() {
        let closed = json!({ "properties": { "a": {} }, "additionalProperties": false });
        let errors = check_value(&closed, &json!({ "a": 1, "b/c": 2 }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/b~1c");

        let typed = json!({ "additionalProperties": { "type": "string" } });
        assert!(check_value(&typed, &json!({ "x": "y" })).is_empty());
        assert_eq!(check_value(&typed, &json!({ "x": 1 }))[0].path, "/x");
    }

    #[test]
    fn test_nested_paths() {
        let schema = json!({
            "properties": {
                "user": {
                    "properties": { "tags": { "items": { "type": "string" } } }
                }
            }
        });
        let errors = check_value(&schema, &json!({ "user": { "tags": ["a", 2] } }));
        assert_eq!(errors[0].path, "/user/tags/1");
    }

    #[test]
    fn test_enum_and_const() {
        let schema = json!({ "enum": ["a", "b", 1] });
        assert!(check_value(&schema, &json!("a")).is_empty());
        assert!(check_value(&schema, &json!(1.0)).is_empty());
        assert_eq!(check_value(&schema, &json!("c"))[0].keyword, "enum");
        assert_eq!(check_value(&json!({ "const": 5 }), &json!(4))[0].keyword, "const");
    }

    #[test]
    fn test_combinators() {
        let any = json!({ "anyOf": [{ "type": "string" }, { "type": "number" }] });
        assert!(check_value(&any, &json!(1)).is_empty());
        assert_eq!(check_value(&any, &json!(null))[0].keyword, "anyOf");

        let one = json!({ "oneOf": [{ "type": "number" }, { "type": "integer" }] });
        assert!(check_value(&one, &json!(1.5)).is_empty());
        assert_eq!(check_value(&one, &json!(1))[0].keyword, "oneOf");

        let all = json!({ "allOf": [{ "minimum": 1 }, { "maximum": 3 }] });
        assert!(check_value(&all, &json!(2)).is_empty());
        assert_eq!(check_value(&all, &json!(4))[0].keyword, "maximum");

        let not = json!({ "not": { "type": "null" } });
        assert!(check_value(&not, &json!(0)).is_empty());
        assert_eq!(check_value(&not, &json!(null))[0].keyword, "not");
    }

    #[test]
    fn test_boolean_schemas() {
        assert!(check_value(&json!(true), &json!({ "any": "thing" })).is_empty());
        assert_eq!(check_value(&json!(false), &json!(1))[0].keyword, "false");
    }

    #[test]
    fn test_child_path_escaping() {
        assert_eq!(child_path("", "a~b"), "/a~0b");
        assert_eq!(child_path("/x", "0"), "/x/0");
    }
}
