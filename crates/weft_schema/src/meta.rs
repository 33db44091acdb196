//! Meta-check of schema documents.
//!
//! A protocol's schema is rejected at registration when it is not a usable
//! schema document. The check is structural: it does not evaluate any data.

use crate::check::{TYPE_NAMES, child_path};
use regex::Regex;
use serde_json::{Map, Value};
use weft_core::SchemaViolation;

const NUMERIC_KEYWORDS: [&str; 4] = ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum"];
const COUNT_KEYWORDS: [&str; 6] = [
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "minProperties",
    "maxProperties",
];
const COMBINATORS: [&str; 3] = ["allOf", "anyOf", "oneOf"];

/// Check that `schema` is a well-formed schema document
#[must_use]
pub fn check_schema(schema: &Value) -> Vec<SchemaViolation> {
    let mut out = Vec::new();
    walk_schema(schema, "", &mut out);
    out
}

fn walk_schema(schema: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
    let keywords = match schema {
        Value::Bool(_) => return,
        Value::Object(map) => map,
        other => {
            out.push(SchemaViolation::new(
                path,
                "schema",
                format!("schema must be an object or boolean, got {}", kind(other)),
            ));
            return;
        }
    };

    check_type_keyword(keywords, path, out);
    check_scalar_keywords(keywords, path, out);

    if let Some(required) = keywords.get("required") {
        let ok = required
            .as_array()
            .is_some_and(|names| names.iter().all(Value::is_string));
        if !ok {
            out.push(SchemaViolation::new(
                child_path(path, "required"),
                "required",
                "required must be an array of strings",
            ));
        }
    }

    if let Some(props) = keywords.get("properties") {
        match props.as_object() {
            Some(map) => {
                let base = child_path(path, "properties");
                for (name, sub) in map {
                    walk_schema(sub, &child_path(&base, name), out);
                }
            }
            None => out.push(SchemaViolation::new(
                child_path(path, "properties"),
                "properties",
                "properties must be an object",
            )),
        }
    }

    if let Some(additional) = keywords.get("additionalProperties") {
        walk_schema(additional, &child_path(path, "additionalProperties"), out);
    }

    match keywords.get("items") {
        Some(Value::Array(tuple)) => {
            let base = child_path(path, "items");
            for (i, sub) in tuple.iter().enumerate() {
                walk_schema(sub, &child_path(&base, &i.to_string()), out);
            }
        }
        Some(sub) => walk_schema(sub, &child_path(path, "items"), out),
        None => {}
    }

    for name in COMBINATORS {
        let Some(value) = keywords.get(name) else {
            continue;
        };
        match value.as_array() {
            Some(subs) if !subs.is_empty() => {
                let base = child_path(path, name);
                for (i, sub) in subs.iter().enumerate() {
                    walk_schema(sub, &child_path(&base, &i.to_string()), out);
                }
            }
            _ => out.push(SchemaViolation::new(
                child_path(path, name),
                name,
                format!("{} must be a non-empty array of schemas", name),
            )),
        }
    }

    if let Some(sub) = keywords.get("not") {
        walk_schema(sub, &child_path(path, "not"), out);
    }
}

fn check_type_keyword(keywords: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    let Some(declared) = keywords.get("type") else {
        return;
    };
    let names: Vec<&Value> = match declared {
        Value::Array(names) if !names.is_empty() => names.iter().collect(),
        Value::String(_) => vec![declared],
        _ => {
            out.push(SchemaViolation::new(
                child_path(path, "type"),
                "type",
                "type must be a type name or a non-empty array of type names",
            ));
            return;
        }
    };
    for name in names {
        let known = name.as_str().is_some_and(|n| TYPE_NAMES.contains(&n));
        if !known {
            out.push(SchemaViolation::new(
                child_path(path, "type"),
                "type",
                format!("unknown type {}", name),
            ));
        }
    }
}

fn check_scalar_keywords(keywords: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
    for name in NUMERIC_KEYWORDS {
        if keywords.get(name).is_some_and(|v| !v.is_number()) {
            out.push(SchemaViolation::new(
                child_path(path, name),
                name,
                format!("{} must be a number", name),
            ));
        }
    }
    for name in COUNT_KEYWORDS {
        if keywords.get(name).is_some_and(|v| v.as_u64().is_none()) {
            out.push(SchemaViolation::new(
                child_path(path, name),
                name,
                format!("{} must be a non-negative integer", name),
            ));
        }
    }
    if let Some(pattern) = keywords.get("pattern") {
        let reason = match pattern.as_str() {
            Some(p) => Regex::new(p).err().map(|e| e.to_string()),
            None => Some("pattern must be a string".to_string()),
        };
        if let Some(reason) = reason {
            out.push(SchemaViolation::new(child_path(path, "pattern"), "pattern", reason));
        }
    }
    if keywords.get("format").is_some_and(|v| !v.is_string()) {
        out.push(SchemaViolation::new(
            child_path(path, "format"),
            "format",
            "format must be a string",
        ));
    }
    if keywords.get("enum").is_some_and(|v| !v.is_array()) {
        out.push(SchemaViolation::new(
            child_path(path, "enum"),
            "enum",
            "enum must be an array",
        ));
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_well_formed_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": { "type": "number", "minimum": 0 },
                "tags": { "type": "array", "items": { "type": "string", "pattern": "^[a-z]+$" } }
            },
            "required": ["a"],
            "additionalProperties": false,
            "anyOf": [{ "required": ["a"] }, true]
        });
        assert!(check_schema(&schema).is_empty());
        assert!(check_schema(&json!(true)).is_empty());
    }

    #[test]
    fn test_rejects_non_schema_root() {
        let errors = check_schema(&json!("object"));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "schema");
    }

    #[test]
    fn test_rejects_unknown_type() {
        let errors = check_schema(&json!({ "type": "invalid-type" }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/type");
        assert!(errors[0].message.contains("invalid-type"));

        assert_eq!(check_schema(&json!({ "type": ["string", 3] })).len(), 1);
        assert_eq!(check_schema(&json!({ "type": [] })).len(), 1);
    }

    #[test]
    fn test_rejects_bad_structure() {
        assert_eq!(
            check_schema(&json!({ "properties": ["a"] }))[0].keyword,
            "properties"
        );
        assert_eq!(
            check_schema(&json!({ "required": ["a", 1] }))[0].keyword,
            "required"
        );
        assert_eq!(check_schema(&json!({ "anyOf": [] }))[0].keyword, "anyOf");
        assert_eq!(check_schema(&json!({ "minLength": -1 }))[0].keyword, "minLength");
        assert_eq!(check_schema(&json!({ "maximum": "10" }))[0].keyword, "maximum");
    }

    #[test]
    fn test_rejects_bad_pattern() {
        let errors = check_schema(&json!({ "pattern": "([a-z" }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].keyword, "pattern");
    }

    #[test]
    fn test_nested_violation_path() {
        let errors = check_schema(&json!({
            "properties": { "a": { "properties": { "b": { "type": "text" } } } }
        }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/properties/a/properties/b/type");
    }
}
