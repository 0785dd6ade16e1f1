//! Document-to-evaluation round trips: flatten a JSON configuration, then
//! evaluate expressions against the resulting table.

use propexpr::document::load_document;
use propexpr::{create_builtin_registry, create_global_table, Evaluator, Operand};

fn table_from(json: &str) -> propexpr::VariableTable {
    let mut globals = create_global_table();
    let loaded = load_document(json).unwrap();
    globals.merge(&loaded).unwrap();
    globals
}

#[test]
fn test_flattened_scalars_are_addressable() {
    let globals = table_from(r#"{"price": 10, "tax": 0.2, "active": true}"#);
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);
    assert_eq!(
        evaluator.evaluate("price + price * tax").unwrap(),
        Operand::Decimal(12.0)
    );
    assert_eq!(
        evaluator.evaluate("if(active, price, 0)").unwrap(),
        Operand::Integer(10)
    );
}

#[test]
fn test_nested_structure_becomes_dotted_and_indexed_names() {
    let globals = table_from(
        r#"{
            "order": {
                "lines": [
                    {"qty": 2, "unit": 5},
                    {"qty": 1, "unit": 30}
                ],
                "customer": {"name": "Ada"}
            }
        }"#,
    );
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);

    assert_eq!(
        evaluator.evaluate("order.lines").unwrap(),
        Operand::Integer(2)
    );
    assert_eq!(
        evaluator
            .evaluate("order.lines[0].qty * order.lines[0].unit").unwrap(),
        Operand::Integer(10)
    );
    // Sum over all lines using the stored array length
    assert_eq!(
        evaluator
            .evaluate("loop(0, order.lines - 1, 0, order.lines[!loop0].qty * order.lines[!loop0].unit)")
            .unwrap(),
        Operand::Integer(40)
    );
    assert_eq!(
        evaluator.evaluate("'hello ' + order.customer.name").unwrap(),
        Operand::Text("hello Ada".to_string())
    );
}

#[test]
fn test_expression_typed_fields_evaluate_lazily_in_context() {
    let globals = table_from(
        r#"{
            "width": 3,
            "height": 4,
            "area": {"Type": "Expression", "Value": "width * height"},
            "label": {"Type": "String", "Value": "width * height"}
        }"#,
    );
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);

    assert_eq!(evaluator.evaluate("area + 1").unwrap(), Operand::Integer(13));
    assert_eq!(
        evaluator.evaluate("label").unwrap(),
        Operand::Text("width * height".to_string())
    );
}

#[test]
fn test_expression_fields_may_reference_each_other() {
    let globals = table_from(
        r#"{
            "base": 2,
            "doubled": {"Type": "Expression", "Value": "base * 2"},
            "quadrupled": {"Type": "Expression", "Value": "doubled * 2"}
        }"#,
    );
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);
    assert_eq!(evaluator.evaluate("quadrupled").unwrap(), Operand::Integer(8));
}

#[test]
fn test_bad_expression_field_fails_at_reference_time() {
    let globals = table_from(r#"{"broken": {"Type": "Expression", "Value": "1 +"}}"#);
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);
    // Loading succeeded; only referencing the field fails
    assert!(evaluator.evaluate("broken").is_err());
    assert!(evaluator.evaluate("1 + 1").is_ok());
}
