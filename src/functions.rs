//! Function registry: user-defined expression functions, native ("coded")
//! functions, and the built-ins preloaded into every registry.
//!
//! A function's positional parameters are bound inside a fresh call-local
//! table under synthetic names `!0`, `!1`, ... according to the declared
//! passing convention of each parameter:
//!
//! - `Primitive`: the argument text is evaluated before the call.
//! - `Expression`: the argument text is suspended and forced on demand by
//!   the callee (this is how `if`/`and`/`or` short-circuit).
//! - `Reference`: the argument names a variable; every entry sharing that
//!   name prefix is aliased into the call scope.
//!
//! Coded functions receive the evaluator capability explicitly so the
//! dependency direction stays visible: natives call back into the evaluator,
//! never into a global singleton.

use crate::evaluator::Evaluator;
use crate::operand::Operand;
use crate::variables::VariableTable;
use crate::EvalError;
use std::collections::HashMap;

/// How a declared parameter receives its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Primitive,
    Expression,
    Reference,
}

/// Signature of a native function: evaluator capability plus the call-local
/// table holding the bound `!N` parameters.
pub type CodedFn = fn(&Evaluator, &VariableTable) -> Result<Operand, EvalError>;

#[derive(Debug, Clone)]
pub enum FunctionBody {
    /// Body expression text, evaluated against the call-local table.
    User(String),
    /// Native evaluation routine.
    Coded(CodedFn),
}

/// Name-independent function record: parameter conventions plus a body.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub(crate) params: Vec<ParamKind>,
    pub(crate) body: FunctionBody,
}

impl FunctionDefinition {
    pub fn user(params: Vec<ParamKind>, body: impl Into<String>) -> Result<Self, EvalError> {
        Self::validated(params, FunctionBody::User(body.into()))
    }

    pub fn coded(params: Vec<ParamKind>, func: CodedFn) -> Result<Self, EvalError> {
        Self::validated(params, FunctionBody::Coded(func))
    }

    fn validated(params: Vec<ParamKind>, body: FunctionBody) -> Result<Self, EvalError> {
        if params.is_empty() {
            return Err(EvalError::SyntaxError(
                "a function requires at least one parameter".to_string(),
            ));
        }
        Ok(FunctionDefinition { params, body })
    }

    pub fn params(&self) -> &[ParamKind] {
        &self.params
    }
}

/// Case-insensitive name -> FunctionDefinition mapping.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, FunctionDefinition>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry {
            entries: HashMap::new(),
        }
    }

    /// Register a function. Fails if the name (case-insensitively) is taken.
    pub fn register(&mut self, name: &str, definition: FunctionDefinition) -> Result<(), EvalError> {
        let key = name.to_lowercase();
        if self.entries.contains_key(&key) {
            return Err(EvalError::SyntaxError(format!(
                "function '{}' is already registered",
                name
            )));
        }
        self.entries.insert(key, definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.entries.get(&name.to_lowercase())
    }

    // Built-in registration cannot collide in a fresh registry.
    fn preload(&mut self, name: &str, params: Vec<ParamKind>, func: CodedFn) {
        self.entries.insert(
            name.to_string(),
            FunctionDefinition {
                params,
                body: FunctionBody::Coded(func),
            },
        );
    }
}

/// A registry preloaded with the built-ins: `if`, `and`, `or`, the four
/// casts, and `loop`.
pub fn create_builtin_registry() -> FunctionRegistry {
    use ParamKind::{Expression, Primitive};

    let mut registry = FunctionRegistry::new();
    registry.preload("if", vec![Primitive, Expression, Expression], builtin_if);
    registry.preload("and", vec![Expression, Expression], builtin_and);
    registry.preload("or", vec![Expression, Expression], builtin_or);
    registry.preload("int", vec![Primitive], builtin_int);
    registry.preload("decimal", vec![Primitive], builtin_decimal);
    registry.preload("bool", vec![Primitive], builtin_bool);
    registry.preload("string", vec![Primitive], builtin_string);
    registry.preload(
        "loop",
        vec![Primitive, Primitive, Primitive, Expression],
        builtin_loop,
    );
    registry
}

//
// Built-in implementations
//

/// Fetch a bound parameter; absence means the evaluator broke the binding
/// contract, which still surfaces as an error rather than a panic.
fn arg<'t>(locals: &'t VariableTable, slot: &str) -> Result<&'t Operand, EvalError> {
    locals
        .get(slot)
        .ok_or_else(|| EvalError::FunctionError(format!("missing call argument '{}'", slot)))
}

/// `if(cond, then, else)`: the condition arrives evaluated and must be
/// Boolean; exactly one branch is forced.
pub fn builtin_if(eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    match arg(locals, "!0")? {
        Operand::Boolean(true) => eval.force(arg(locals, "!1")?),
        Operand::Boolean(false) => eval.force(arg(locals, "!2")?),
        other => Err(EvalError::FunctionError(format!(
            "if requires a Boolean condition, got {}",
            other.kind_name()
        ))),
    }
}

fn force_boolean(eval: &Evaluator, locals: &VariableTable, slot: &str, name: &str) -> Result<bool, EvalError> {
    match eval.force(arg(locals, slot)?)? {
        Operand::Boolean(b) => Ok(b),
        other => Err(EvalError::FunctionError(format!(
            "{} requires Boolean operands, got {}",
            name,
            other.kind_name()
        ))),
    }
}

/// `and(a, b)`: both operands are lazy; `b` is never forced when `a` is false.
pub fn builtin_and(eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    if !force_boolean(eval, locals, "!0", "and")? {
        return Ok(Operand::FALSE);
    }
    Ok(Operand::Boolean(force_boolean(eval, locals, "!1", "and")?))
}

/// `or(a, b)`: both operands are lazy; `b` is never forced when `a` is true.
pub fn builtin_or(eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    if force_boolean(eval, locals, "!0", "or")? {
        return Ok(Operand::TRUE);
    }
    Ok(Operand::Boolean(force_boolean(eval, locals, "!1", "or")?))
}

pub fn builtin_int(_eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    arg(locals, "!0")?.cast_integer()
}

pub fn builtin_decimal(_eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    arg(locals, "!0")?.cast_decimal()
}

pub fn builtin_bool(_eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    arg(locals, "!0")?.cast_boolean()
}

pub fn builtin_string(_eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    arg(locals, "!0")?.cast_text()
}

/// `loop(start, end, seed, body)`: inclusive integer fold. Each iteration
/// binds the counter `!loopD` (D = nesting depth, so nested loops see
/// distinct counter names), evaluates `body`, and accumulates with the
/// primitive `add` operator starting from `seed`. An empty range returns
/// `seed` unchanged.
pub fn builtin_loop(eval: &Evaluator, locals: &VariableTable) -> Result<Operand, EvalError> {
    let start = match arg(locals, "!0")? {
        Operand::Integer(n) => *n,
        other => {
            return Err(EvalError::FunctionError(format!(
                "loop start must be an Integer, got {}",
                other.kind_name()
            )))
        }
    };
    let end = match arg(locals, "!1")? {
        Operand::Integer(n) => *n,
        other => {
            return Err(EvalError::FunctionError(format!(
                "loop end must be an Integer, got {}",
                other.kind_name()
            )))
        }
    };
    let seed = arg(locals, "!2")?.clone();
    let (body_text, body_locals) = match arg(locals, "!3")? {
        Operand::Expression { text, locals } => (text.clone(), locals.clone()),
        other => {
            return Err(EvalError::FunctionError(format!(
                "loop body must be an expression, got {}",
                other.kind_name()
            )))
        }
    };

    // Smallest unused depth: an enclosing loop has already bound the
    // lower-numbered counters into the body's scope.
    let mut depth = 0;
    while body_locals.contains(&format!("!loop{}", depth)) {
        depth += 1;
    }
    let counter = format!("!loop{}", depth);

    let mut accumulator = seed;
    for i in start..=end {
        let mut iteration_locals = body_locals.clone();
        iteration_locals.define(&counter, Operand::Integer(i));
        let value = eval.evaluate_with(&body_text, &iteration_locals)?;
        accumulator = accumulator.add(&value)?;
    }
    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::create_global_table;

    fn with_eval<T>(run: impl FnOnce(&Evaluator) -> T) -> T {
        let globals = create_global_table();
        let registry = create_builtin_registry();
        let eval = Evaluator::new(&globals, &registry);
        run(&eval)
    }

    fn suspended(text: &str) -> Operand {
        Operand::Expression {
            text: text.to_string(),
            locals: VariableTable::new(),
        }
    }

    #[test]
    fn test_definition_requires_a_parameter() {
        assert!(FunctionDefinition::user(vec![], "1 + 1").is_err());
        assert!(FunctionDefinition::coded(vec![], builtin_int).is_err());
        assert!(FunctionDefinition::user(vec![ParamKind::Primitive], "!0").is_ok());
    }

    #[test]
    fn test_registry_is_case_insensitive_and_write_once() {
        let mut registry = FunctionRegistry::new();
        let def = FunctionDefinition::user(vec![ParamKind::Primitive], "!0").unwrap();
        registry.register("Double", def.clone()).unwrap();
        assert!(registry.get("double").is_some());
        assert!(registry.get("DOUBLE").is_some());
        assert!(registry.register("DOUBLE", def).is_err());
    }

    #[test]
    fn test_builtins_are_preloaded() {
        let registry = create_builtin_registry();
        for name in ["if", "and", "or", "int", "decimal", "bool", "string", "loop"] {
            assert!(registry.get(name).is_some(), "missing builtin {}", name);
        }
        assert_eq!(registry.get("if").unwrap().params().len(), 3);
        assert_eq!(registry.get("loop").unwrap().params().len(), 4);
    }

    #[test]
    fn test_if_forces_one_branch() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", Operand::TRUE);
            locals.define("!1", suspended("1 + 1"));
            locals.define("!2", suspended("1 / 0")); // would fail if forced
            assert_eq!(builtin_if(eval, &locals).unwrap(), Operand::Integer(2));
        });
    }

    #[test]
    fn test_if_rejects_non_boolean_condition() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", Operand::Integer(1));
            locals.define("!1", suspended("1"));
            locals.define("!2", suspended("2"));
            assert!(builtin_if(eval, &locals).is_err());
        });
    }

    #[test]
    fn test_and_or_short_circuit() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", suspended("false"));
            locals.define("!1", suspended("1 / 0"));
            assert_eq!(builtin_and(eval, &locals).unwrap(), Operand::FALSE);

            let mut locals = VariableTable::new();
            locals.define("!0", suspended("true"));
            locals.define("!1", suspended("1 / 0"));
            assert_eq!(builtin_or(eval, &locals).unwrap(), Operand::TRUE);
        });
    }

    #[test]
    fn test_and_rejects_non_boolean() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", suspended("1"));
            locals.define("!1", suspended("true"));
            assert!(builtin_and(eval, &locals).is_err());
        });
    }

    #[test]
    fn test_loop_folds_inclusive_range() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", Operand::Integer(0));
            locals.define("!1", Operand::Integer(4));
            locals.define("!2", Operand::Integer(0));
            locals.define("!3", suspended("1"));
            assert_eq!(builtin_loop(eval, &locals).unwrap(), Operand::Integer(5));
        });
    }

    #[test]
    fn test_loop_empty_range_returns_seed() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", Operand::Integer(5));
            locals.define("!1", Operand::Integer(4));
            locals.define("!2", Operand::Integer(42));
            locals.define("!3", suspended("1 / 0"));
            assert_eq!(builtin_loop(eval, &locals).unwrap(), Operand::Integer(42));
        });
    }

    #[test]
    fn test_loop_counter_visible_in_body() {
        with_eval(|eval| {
            let mut locals = VariableTable::new();
            locals.define("!0", Operand::Integer(1));
            locals.define("!1", Operand::Integer(4));
            locals.define("!2", Operand::Integer(0));
            locals.define("!3", suspended("!loop0"));
            // 1 + 2 + 3 + 4
            assert_eq!(builtin_loop(eval, &locals).unwrap(), Operand::Integer(10));
        });
    }
}
