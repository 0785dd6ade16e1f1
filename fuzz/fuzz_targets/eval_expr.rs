#![no_main]

use libfuzzer_sys::fuzz_target;
use propexpr::{create_builtin_registry, create_global_table, Evaluator, Operand};

// Arbitrary input must either evaluate to a primitive or produce a syntax
// error; it must never panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let mut globals = create_global_table();
        let _ = globals.insert("x", Operand::Integer(7));
        let _ = globals.insert("y.z", Operand::Decimal(0.5));
        let _ = globals.insert("b[0]", Operand::Text("t".to_string()));
        let registry = create_builtin_registry();
        let evaluator = Evaluator::new(&globals, &registry);
        let _ = evaluator.evaluate(text);
    }
});
