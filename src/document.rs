//! Flattening of JSON configuration documents into a [`VariableTable`].
//!
//! Nesting becomes name structure instead of value structure: an object
//! field `b` under prefix `a` lands at key `a.b`, and an array element
//! lands at `a[i]`. The array's own key holds its length as an `Integer`,
//! so expressions can both index elements and range over them. All keys
//! are flat strings as far as the table is concerned.
//!
//! A two-field object `{"Type": ..., "Value": ...}` is a typing wrapper,
//! not data:
//!
//! - `"String"`: the value must be a JSON string and maps to `Text`.
//! - `"Expression"`: the value must be a JSON string and is stored
//!   suspended, to be evaluated on first reference.
//! - `"Standard"`: the value is flattened as if the wrapper were absent.
//!   This is the escape hatch for data that genuinely has `Type`/`Value`
//!   fields.

use crate::operand::Operand;
use crate::variables::VariableTable;
use crate::EvalError;
use serde_json::Value;

/// Parse a JSON document and flatten it into a fresh variable table.
pub fn load_document(text: &str) -> Result<VariableTable, EvalError> {
    let root: Value = serde_json::from_str(text)
        .map_err(|err| EvalError::SyntaxError(format!("invalid document: {}", err)))?;
    flatten_document(&root)
}

/// Flatten a parsed document into a fresh variable table. The root must be
/// a JSON object.
pub fn flatten_document(root: &Value) -> Result<VariableTable, EvalError> {
    let mut table = VariableTable::new();
    match root {
        Value::Object(fields) => {
            for (name, value) in fields {
                flatten_into(&mut table, name, value)?;
            }
            Ok(table)
        }
        other => Err(EvalError::SyntaxError(format!(
            "document root must be an object, got {}",
            json_kind(other)
        ))),
    }
}

/// Flatten one value under the given key, recursing into containers.
fn flatten_into(table: &mut VariableTable, key: &str, value: &Value) -> Result<(), EvalError> {
    match value {
        Value::Null => Err(EvalError::SyntaxError(format!(
            "'{}' is null; null values cannot become operands",
            key
        ))),
        Value::Bool(b) => table.insert(key, Operand::Boolean(*b)),
        Value::Number(n) => table.insert(key, number_operand(key, n)?),
        Value::String(s) => table.insert(key, Operand::Text(s.clone())),
        Value::Array(items) => {
            let length = i32::try_from(items.len()).map_err(|_| {
                EvalError::SyntaxError(format!("array '{}' is too long to index", key))
            })?;
            table.insert(key, Operand::Integer(length))?;
            for (i, item) in items.iter().enumerate() {
                flatten_into(table, &format!("{}[{}]", key, i), item)?;
            }
            Ok(())
        }
        Value::Object(fields) => {
            if let Some((tag, inner)) = typing_wrapper(fields) {
                return flatten_wrapper(table, key, tag, inner);
            }
            for (name, field_value) in fields {
                flatten_into(table, &format!("{}.{}", key, name), field_value)?;
            }
            Ok(())
        }
    }
}

/// Detect the `{"Type": "...", "Value": ...}` wrapper form: exactly two
/// fields, `Type` holding a string and `Value` present.
fn typing_wrapper(fields: &serde_json::Map<String, Value>) -> Option<(&str, &Value)> {
    if fields.len() != 2 {
        return None;
    }
    let tag = fields.get("Type")?.as_str()?;
    let inner = fields.get("Value")?;
    Some((tag, inner))
}

fn flatten_wrapper(
    table: &mut VariableTable,
    key: &str,
    tag: &str,
    inner: &Value,
) -> Result<(), EvalError> {
    match tag {
        "String" => match inner {
            Value::String(s) => table.insert(key, Operand::Text(s.clone())),
            other => Err(EvalError::SyntaxError(format!(
                "'{}' is typed String but its value is {}",
                key,
                json_kind(other)
            ))),
        },
        "Expression" => match inner {
            Value::String(s) => table.insert(
                key,
                Operand::Expression {
                    text: s.clone(),
                    locals: VariableTable::new(),
                },
            ),
            other => Err(EvalError::SyntaxError(format!(
                "'{}' is typed Expression but its value is {}",
                key,
                json_kind(other)
            ))),
        },
        "Standard" => flatten_into(table, key, inner),
        unknown => Err(EvalError::SyntaxError(format!(
            "'{}' carries unknown type tag '{}'",
            key, unknown
        ))),
    }
}

/// Integers that fit `i32` stay exact; everything else widens to Decimal.
fn number_operand(key: &str, n: &serde_json::Number) -> Result<Operand, EvalError> {
    if let Some(i) = n.as_i64() {
        if let Ok(small) = i32::try_from(i) {
            return Ok(Operand::Integer(small));
        }
    }
    match n.as_f64() {
        Some(d) => Ok(Operand::Decimal(d)),
        None => Err(EvalError::SyntaxError(format!(
            "'{}' holds an unrepresentable number",
            key
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_flatten_to_typed_operands() {
        let table = load_document(r#"{"count": 3, "rate": 0.5, "on": true, "name": "abc"}"#)
            .unwrap();
        assert_eq!(table.get("count"), Some(&Operand::Integer(3)));
        assert_eq!(table.get("rate"), Some(&Operand::Decimal(0.5)));
        assert_eq!(table.get("on"), Some(&Operand::TRUE));
        assert_eq!(table.get("name"), Some(&Operand::Text("abc".to_string())));
    }

    #[test]
    fn test_nested_objects_use_dotted_keys() {
        let table = load_document(r#"{"a": {"b": {"c": 1}}}"#).unwrap();
        assert_eq!(table.get("a.b.c"), Some(&Operand::Integer(1)));
        assert_eq!(table.get("a"), None);
    }

    #[test]
    fn test_arrays_store_length_and_elements() {
        let table = load_document(r#"{"b": [234, 235], "m": [{"v": 7}]}"#).unwrap();
        assert_eq!(table.get("b"), Some(&Operand::Integer(2)));
        assert_eq!(table.get("b[0]"), Some(&Operand::Integer(234)));
        assert_eq!(table.get("b[1]"), Some(&Operand::Integer(235)));
        assert_eq!(table.get("m"), Some(&Operand::Integer(1)));
        assert_eq!(table.get("m[0].v"), Some(&Operand::Integer(7)));
    }

    #[test]
    fn test_out_of_range_integers_widen() {
        let table = load_document(r#"{"big": 5000000000}"#).unwrap();
        assert_eq!(table.get("big"), Some(&Operand::Decimal(5e9)));
    }

    #[test]
    fn test_typing_wrappers() {
        let table = load_document(
            r#"{
                "greeting": {"Type": "String", "Value": "2 + 2"},
                "total": {"Type": "Expression", "Value": "2 + 2"},
                "meta": {"Type": "Standard", "Value": {"Type": "x", "Value": 1}}
            }"#,
        )
        .unwrap();
        assert_eq!(
            table.get("greeting"),
            Some(&Operand::Text("2 + 2".to_string()))
        );
        match table.get("total") {
            Some(Operand::Expression { text, .. }) => assert_eq!(text, "2 + 2"),
            other => panic!("expected a suspended expression, got {:?}", other),
        }
        // "Standard" strips one wrapper level; the inner object is data.
        assert_eq!(
            table.get("meta.Type"),
            Some(&Operand::Text("x".to_string()))
        );
        assert_eq!(table.get("meta.Value"), Some(&Operand::Integer(1)));
    }

    #[test]
    fn test_wrapper_value_must_match_tag() {
        assert!(load_document(r#"{"x": {"Type": "String", "Value": 1}}"#).is_err());
        assert!(load_document(r#"{"x": {"Type": "Expression", "Value": []}}"#).is_err());
        assert!(load_document(r#"{"x": {"Type": "Vector", "Value": "1"}}"#).is_err());
    }

    #[test]
    fn test_two_field_objects_without_the_tag_are_data() {
        let table = load_document(r#"{"x": {"Type": 1, "Value": 2}}"#).unwrap();
        assert_eq!(table.get("x.Type"), Some(&Operand::Integer(1)));
        assert_eq!(table.get("x.Value"), Some(&Operand::Integer(2)));
    }

    #[test]
    fn test_null_and_bad_roots_are_rejected() {
        assert!(load_document(r#"{"x": null}"#).is_err());
        assert!(load_document("[1, 2]").is_err());
        assert!(load_document("42").is_err());
        assert!(load_document("not json").is_err());
    }

    #[test]
    fn test_duplicate_keys_across_branches_are_rejected() {
        // "a.b" from the object collides with the literal dotted field
        assert!(load_document(r#"{"a": {"b": 1}, "a.b": 2}"#).is_err());
    }
}
