use crate::variables::VariableTable;
use crate::EvalError;

/// Values flowing through the evaluator.
///
/// The first four variants are primitive: they support the full operator
/// contract below and are the only things an evaluation may return.
/// `Expression` is a suspended computation (formula text plus the local
/// variable scope it closes over) that must be reduced to a primitive by
/// re-entering the evaluator; no primitive operator ever produces one.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Integer(i32),
    Decimal(f64),
    Boolean(bool),
    Text(String),
    Expression { text: String, locals: VariableTable },
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Integer(n) => write!(f, "{}", n),
            Operand::Decimal(d) => write!(f, "{}", d),
            Operand::Boolean(b) => write!(f, "{}", b),
            Operand::Text(s) => write!(f, "{}", s),
            Operand::Expression { text, .. } => write!(f, "#<expression: {}>", text),
        }
    }
}

impl Operand {
    /// Canonical Boolean instances. Value equality is what matters; these
    /// exist so the global table and the built-ins agree on one spelling.
    pub const TRUE: Operand = Operand::Boolean(true);
    pub const FALSE: Operand = Operand::Boolean(false);

    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::Integer(_) => "Integer",
            Operand::Decimal(_) => "Decimal",
            Operand::Boolean(_) => "Boolean",
            Operand::Text(_) => "Text",
            Operand::Expression { .. } => "Expression",
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Operand::Expression { .. })
    }

    fn unsupported(&self, op: &str, rhs: &Operand) -> EvalError {
        EvalError::TypeError(format!(
            "unsupported operand combination for operator '{}' between {} and {}",
            op,
            self.kind_name(),
            rhs.kind_name()
        ))
    }

    fn unsupported_unary(&self, op: &str) -> EvalError {
        EvalError::TypeError(format!(
            "unsupported operand for unary operator '{}': {}",
            op,
            self.kind_name()
        ))
    }

    fn overflow(op: &str) -> EvalError {
        EvalError::TypeError(format!("integer overflow applying operator '{}'", op))
    }

    /// Both sides as f64, when both are numeric.
    fn numeric_pair(&self, rhs: &Operand) -> Option<(f64, f64)> {
        let a = match self {
            Operand::Integer(n) => *n as f64,
            Operand::Decimal(d) => *d,
            _ => return None,
        };
        let b = match rhs {
            Operand::Integer(n) => *n as f64,
            Operand::Decimal(d) => *d,
            _ => return None,
        };
        Some((a, b))
    }

    //
    // Binary operators
    //

    /// `+`: numeric addition with Integer/Decimal widening, or Text
    /// concatenation when either side is Text. `Boolean + Boolean` is an
    /// error, but `Boolean + Text` (either order) concatenates.
    pub fn add(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(a), Operand::Integer(b)) => a
                .checked_add(*b)
                .map(Operand::Integer)
                .ok_or_else(|| Self::overflow("+")),
            (Operand::Integer(a), Operand::Decimal(b)) => Ok(Operand::Decimal(*a as f64 + b)),
            (Operand::Decimal(a), Operand::Integer(b)) => Ok(Operand::Decimal(a + *b as f64)),
            (Operand::Decimal(a), Operand::Decimal(b)) => Ok(Operand::Decimal(a + b)),
            (Operand::Text(a), b) if b.is_primitive() => Ok(Operand::Text(format!("{}{}", a, b))),
            (a, Operand::Text(b)) if a.is_primitive() => Ok(Operand::Text(format!("{}{}", a, b))),
            _ => Err(self.unsupported("+", rhs)),
        }
    }

    /// `-`: defined over Integer/Decimal pairs only.
    pub fn sub(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(a), Operand::Integer(b)) => a
                .checked_sub(*b)
                .map(Operand::Integer)
                .ok_or_else(|| Self::overflow("-")),
            (Operand::Integer(a), Operand::Decimal(b)) => Ok(Operand::Decimal(*a as f64 - b)),
            (Operand::Decimal(a), Operand::Integer(b)) => Ok(Operand::Decimal(a - *b as f64)),
            (Operand::Decimal(a), Operand::Decimal(b)) => Ok(Operand::Decimal(a - b)),
            _ => Err(self.unsupported("-", rhs)),
        }
    }

    /// `*`: defined over Integer/Decimal pairs only.
    pub fn mul(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(a), Operand::Integer(b)) => a
                .checked_mul(*b)
                .map(Operand::Integer)
                .ok_or_else(|| Self::overflow("*")),
            (Operand::Integer(a), Operand::Decimal(b)) => Ok(Operand::Decimal(*a as f64 * b)),
            (Operand::Decimal(a), Operand::Integer(b)) => Ok(Operand::Decimal(a * *b as f64)),
            (Operand::Decimal(a), Operand::Decimal(b)) => Ok(Operand::Decimal(a * b)),
            _ => Err(self.unsupported("*", rhs)),
        }
    }

    /// `/`: Integer/Integer stays Integer and rejects a zero divisor; any
    /// Decimal involvement promotes to IEEE float division (no failure).
    pub fn div(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(_), Operand::Integer(0)) => {
                Err(EvalError::TypeError("divide by zero".to_string()))
            }
            (Operand::Integer(a), Operand::Integer(b)) => a
                .checked_div(*b)
                .map(Operand::Integer)
                .ok_or_else(|| Self::overflow("/")),
            (Operand::Integer(a), Operand::Decimal(b)) => Ok(Operand::Decimal(*a as f64 / b)),
            (Operand::Decimal(a), Operand::Integer(b)) => Ok(Operand::Decimal(a / *b as f64)),
            (Operand::Decimal(a), Operand::Decimal(b)) => Ok(Operand::Decimal(a / b)),
            _ => Err(self.unsupported("/", rhs)),
        }
    }

    /// `%`: same shape as `/`, including the zero-divisor rule.
    pub fn rem(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(_), Operand::Integer(0)) => {
                Err(EvalError::TypeError("remainder by zero".to_string()))
            }
            (Operand::Integer(a), Operand::Integer(b)) => a
                .checked_rem(*b)
                .map(Operand::Integer)
                .ok_or_else(|| Self::overflow("%")),
            (Operand::Integer(a), Operand::Decimal(b)) => Ok(Operand::Decimal(*a as f64 % b)),
            (Operand::Decimal(a), Operand::Integer(b)) => Ok(Operand::Decimal(a % *b as f64)),
            (Operand::Decimal(a), Operand::Decimal(b)) => Ok(Operand::Decimal(a % b)),
            _ => Err(self.unsupported("%", rhs)),
        }
    }

    /// `&`: bitwise AND over Integers, logical AND over Booleans.
    pub fn bitand(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(a), Operand::Integer(b)) => Ok(Operand::Integer(a & b)),
            (Operand::Boolean(a), Operand::Boolean(b)) => Ok(Operand::Boolean(*a && *b)),
            _ => Err(self.unsupported("&", rhs)),
        }
    }

    /// `|`: bitwise OR over Integers, logical OR over Booleans.
    pub fn bitor(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        match (self, rhs) {
            (Operand::Integer(a), Operand::Integer(b)) => Ok(Operand::Integer(a | b)),
            (Operand::Boolean(a), Operand::Boolean(b)) => Ok(Operand::Boolean(*a || *b)),
            _ => Err(self.unsupported("|", rhs)),
        }
    }

    pub fn eq(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        self.equality(rhs, "=").map(Operand::Boolean)
    }

    pub fn neq(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        self.equality(rhs, "~=").map(|b| Operand::Boolean(!b))
    }

    /// Equality within same-or-numeric-compatible families; cross-family
    /// comparisons fail.
    fn equality(&self, rhs: &Operand, op: &str) -> Result<bool, EvalError> {
        match (self, rhs) {
            (Operand::Integer(a), Operand::Integer(b)) => Ok(a == b),
            (Operand::Integer(a), Operand::Decimal(b)) => Ok((*a as f64) == *b),
            (Operand::Decimal(a), Operand::Integer(b)) => Ok(*a == (*b as f64)),
            (Operand::Decimal(a), Operand::Decimal(b)) => Ok(a == b),
            (Operand::Boolean(a), Operand::Boolean(b)) => Ok(a == b),
            (Operand::Text(a), Operand::Text(b)) => Ok(a == b),
            _ => Err(self.unsupported(op, rhs)),
        }
    }

    pub fn lt(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        self.numeric_pair(rhs)
            .map(|(a, b)| Operand::Boolean(a < b))
            .ok_or_else(|| self.unsupported("<", rhs))
    }

    pub fn lte(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        self.numeric_pair(rhs)
            .map(|(a, b)| Operand::Boolean(a <= b))
            .ok_or_else(|| self.unsupported("<=", rhs))
    }

    pub fn gt(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        self.numeric_pair(rhs)
            .map(|(a, b)| Operand::Boolean(a > b))
            .ok_or_else(|| self.unsupported(">", rhs))
    }

    pub fn gte(&self, rhs: &Operand) -> Result<Operand, EvalError> {
        self.numeric_pair(rhs)
            .map(|(a, b)| Operand::Boolean(a >= b))
            .ok_or_else(|| self.unsupported(">=", rhs))
    }

    //
    // Unary operators
    //

    /// `~`: bitwise complement for Integer, logical negation for Boolean.
    pub fn not(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Integer(n) => Ok(Operand::Integer(!n)),
            Operand::Boolean(b) => Ok(Operand::Boolean(!b)),
            _ => Err(self.unsupported_unary("~")),
        }
    }

    /// Unary `+`: identity for numbers.
    pub fn unary_add(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Integer(_) | Operand::Decimal(_) => Ok(self.clone()),
            _ => Err(self.unsupported_unary("+")),
        }
    }

    /// Unary `-`: arithmetic negation for numbers.
    pub fn unary_sub(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Integer(n) => n
                .checked_neg()
                .map(Operand::Integer)
                .ok_or_else(|| Self::overflow("-")),
            Operand::Decimal(d) => Ok(Operand::Decimal(-d)),
            _ => Err(self.unsupported_unary("-")),
        }
    }

    //
    // Casts (the `int`/`decimal`/`bool`/`string` built-ins)
    //

    /// Cast to Integer. Decimals truncate toward zero (saturating at the
    /// i32 bounds), Booleans map to 1/0, Text must parse as an integer.
    pub fn cast_integer(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Integer(_) => Ok(self.clone()),
            Operand::Decimal(d) => Ok(Operand::Integer(*d as i32)),
            Operand::Boolean(b) => Ok(Operand::Integer(if *b { 1 } else { 0 })),
            Operand::Text(s) => s
                .trim()
                .parse::<i32>()
                .map(Operand::Integer)
                .map_err(|_| EvalError::TypeError(format!("cannot convert '{}' to Integer", s))),
            Operand::Expression { .. } => Err(self.unsupported_unary("int")),
        }
    }

    pub fn cast_decimal(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Integer(n) => Ok(Operand::Decimal(*n as f64)),
            Operand::Decimal(_) => Ok(self.clone()),
            Operand::Boolean(b) => Ok(Operand::Decimal(if *b { 1.0 } else { 0.0 })),
            Operand::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Operand::Decimal)
                .map_err(|_| EvalError::TypeError(format!("cannot convert '{}' to Decimal", s))),
            Operand::Expression { .. } => Err(self.unsupported_unary("decimal")),
        }
    }

    /// Cast to Boolean. Truthiness for numbers: a value >= 1 is true,
    /// anything smaller is false. Text must spell `true` or `false`.
    pub fn cast_boolean(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Integer(n) => Ok(Operand::Boolean(*n >= 1)),
            Operand::Decimal(d) => Ok(Operand::Boolean(*d >= 1.0)),
            Operand::Boolean(_) => Ok(self.clone()),
            Operand::Text(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Operand::TRUE)
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Operand::FALSE)
                } else {
                    Err(EvalError::TypeError(format!(
                        "cannot convert '{}' to Boolean",
                        s
                    )))
                }
            }
            Operand::Expression { .. } => Err(self.unsupported_unary("bool")),
        }
    }

    pub fn cast_text(&self) -> Result<Operand, EvalError> {
        match self {
            Operand::Expression { .. } => Err(self.unsupported_unary("string")),
            primitive => Ok(Operand::Text(format!("{}", primitive))),
        }
    }
}
