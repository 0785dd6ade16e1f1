use criterion::{black_box, criterion_group, criterion_main, Criterion};
use propexpr::document::load_document;
use propexpr::{create_builtin_registry, create_global_table, Evaluator, Operand};

fn bench_arithmetic(c: &mut Criterion) {
    let globals = create_global_table();
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);

    c.bench_function("eval simple arithmetic", |b| {
        b.iter(|| evaluator.evaluate(black_box("2 + 3 * 4")))
    });
    c.bench_function("eval nested grouping", |b| {
        b.iter(|| evaluator.evaluate(black_box("((1 + 2) * (3 + 4)) / (2 + (3 - 1))")))
    });
    c.bench_function("eval string building", |b| {
        b.iter(|| evaluator.evaluate(black_box("'x=' + 1 + ', y=' + 2.5 + ', ok=' + true")))
    });
}

fn bench_functions(c: &mut Criterion) {
    let mut globals = create_global_table();
    globals.insert("limit", Operand::Integer(100)).unwrap();
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);

    c.bench_function("eval conditional call", |b| {
        b.iter(|| evaluator.evaluate(black_box("if(limit > 50, limit * 2, limit / 2)")))
    });
    c.bench_function("eval loop fold 100", |b| {
        b.iter(|| evaluator.evaluate(black_box("loop(1, 100, 0, !loop0)")))
    });
}

fn bench_documents(c: &mut Criterion) {
    let json = r#"{
        "order": {
            "lines": [
                {"qty": 2, "unit": 5},
                {"qty": 1, "unit": 30},
                {"qty": 7, "unit": 3}
            ]
        },
        "total": {"Type": "Expression", "Value": "loop(0, order.lines - 1, 0, order.lines[!loop0].qty * order.lines[!loop0].unit)"}
    }"#;

    c.bench_function("flatten document", |b| {
        b.iter(|| load_document(black_box(json)))
    });

    let globals = load_document(json).unwrap();
    let registry = create_builtin_registry();
    let evaluator = Evaluator::new(&globals, &registry);
    c.bench_function("eval document expression", |b| {
        b.iter(|| evaluator.evaluate(black_box("total")))
    });
}

criterion_group!(benches, bench_arithmetic, bench_functions, bench_documents);
criterion_main!(benches);
