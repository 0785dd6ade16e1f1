use std::fmt;

/// Error types for expression evaluation
///
/// Evaluation surfaces exactly one failure kind to callers: `SyntaxError`.
/// `TypeError` (operator applied to an unsupported operand combination) and
/// `FunctionError` (native-function precondition violated) are caught at the
/// point of application inside the evaluator and re-raised as `SyntaxError`
/// carrying the current scan position.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    SyntaxError(String),
    TypeError(String),
    FunctionError(String),
}

impl std::error::Error for EvalError {}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::SyntaxError(msg) => write!(f, "Syntax error: {}", msg),
            EvalError::TypeError(msg) => write!(f, "Type error: {}", msg),
            EvalError::FunctionError(msg) => write!(f, "Function error: {}", msg),
        }
    }
}

pub mod document;
pub mod evaluator;
pub mod functions;
pub mod operand;
pub mod variables;

pub use evaluator::Evaluator;
pub use functions::{
    create_builtin_registry, CodedFn, FunctionBody, FunctionDefinition, FunctionRegistry, ParamKind,
};
pub use operand::Operand;
pub use variables::{create_global_table, VariableTable};
