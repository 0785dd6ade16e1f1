//! The tokenizer/evaluator: a single left-to-right scan over expression
//! text that tokenizes, resolves names, and reduces operators in one pass
//! (shunting-yard style), recursing into itself for suspended
//! sub-expressions and function arguments.
//!
//! Scan state: an operand stack, an operator stack, a balance stack for
//! `(` vs `[`, an in-progress token buffer with its inferred kind, and a
//! flag recording whether the previous completed token was an operand
//! (this is what disambiguates unary from binary `+`/`-`).
//!
//! Precedence, tightest first: unary `~ + -`, then `* / %`, then binary
//! `+ -`, then `< > <= >=`, then `= ~=`, then `&`, then `|`. Binary
//! operators associate left-to-right (equal precedence reduces eagerly);
//! unary operators associate right-to-left (a pushed unary operator never
//! reduces a pending one).
//!
//! String literals are delimited by `'`. The escape grammar is: backslash
//! escapes `\\`, `\n`, `\t`, `\b`, `\r`, `\f`, plus the backtick form
//! `` `' `` which embeds a literal quote. A backslash before any other
//! character, or a missing terminator, is a syntax error.

use crate::functions::{FunctionBody, FunctionRegistry, ParamKind};
use crate::operand::Operand;
use crate::variables::VariableTable;
use crate::EvalError;

/// Evaluates expression strings against a global variable table and a
/// function registry, both borrowed: the evaluator owns no state of its
/// own and is freely re-entrant.
pub struct Evaluator<'a> {
    globals: &'a VariableTable,
    functions: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(globals: &'a VariableTable, functions: &'a FunctionRegistry) -> Self {
        Evaluator { globals, functions }
    }

    /// Evaluate an expression with an empty local scope.
    pub fn evaluate(&self, text: &str) -> Result<Operand, EvalError> {
        let locals = VariableTable::new();
        self.evaluate_with(text, &locals)
    }

    /// Evaluate an expression against the given local scope (local names
    /// shadow global ones). This is the re-entrant form used for nested
    /// sub-expressions, suspended operands, and function bodies.
    pub fn evaluate_with(&self, text: &str, locals: &VariableTable) -> Result<Operand, EvalError> {
        let mut scanner = Scanner::new(self, text, locals);
        match scanner.run() {
            Ok(value) => Ok(value),
            Err(err) => Err(scanner.error_with_trace(err)),
        }
    }

    /// Reduce an operand to a primitive: primitives pass through, a
    /// suspended `Expression` re-enters the evaluator with its stored
    /// local scope.
    pub fn force(&self, operand: &Operand) -> Result<Operand, EvalError> {
        match operand {
            Operand::Expression { text, locals } => self.evaluate_with(text, locals),
            primitive => Ok(primitive.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Not,
    UnaryAdd,
    UnarySub,
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
    BitAnd,
    BitOr,
    // Grouping markers sit below every real operator so eager reduction
    // never crosses a group boundary.
    OpenParen,
    OpenBracket,
}

impl Operator {
    fn precedence(self) -> u8 {
        match self {
            Operator::Not | Operator::UnaryAdd | Operator::UnarySub => 7,
            Operator::Mul | Operator::Div | Operator::Rem => 6,
            Operator::Add | Operator::Sub => 5,
            Operator::Lt | Operator::Gt | Operator::Lte | Operator::Gte => 4,
            Operator::Eq | Operator::Neq => 3,
            Operator::BitAnd => 2,
            Operator::BitOr => 1,
            Operator::OpenParen | Operator::OpenBracket => 0,
        }
    }

    fn is_unary(self) -> bool {
        matches!(self, Operator::Not | Operator::UnaryAdd | Operator::UnarySub)
    }

    fn symbol(self) -> &'static str {
        match self {
            Operator::Not => "~",
            Operator::UnaryAdd | Operator::Add => "+",
            Operator::UnarySub | Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Lte => "<=",
            Operator::Gte => ">=",
            Operator::Eq => "=",
            Operator::Neq => "~=",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::OpenParen => "(",
            Operator::OpenBracket => "[",
        }
    }
}

/// Inferred kind of the in-progress token buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    None,
    Integer,
    Decimal,
    Variable,
}

/// Balance-stack entry. A bracket carries the variable name it indexes so
/// the integer result can be spliced back into a composite name.
#[derive(Debug)]
enum Grouping {
    Paren,
    Bracket(String),
}

struct Scanner<'e, 'a> {
    eval: &'e Evaluator<'a>,
    locals: &'e VariableTable,
    chars: Vec<char>,
    pos: usize,
    operands: Vec<Operand>,
    operators: Vec<Operator>,
    groups: Vec<Grouping>,
    token: String,
    kind: TokenKind,
    last_was_operand: bool,
}

impl<'e, 'a> Scanner<'e, 'a> {
    fn new(eval: &'e Evaluator<'a>, text: &str, locals: &'e VariableTable) -> Self {
        Scanner {
            eval,
            locals,
            chars: text.chars().collect(),
            pos: 0,
            operands: Vec::new(),
            operators: Vec::new(),
            groups: Vec::new(),
            token: String::new(),
            kind: TokenKind::None,
            last_was_operand: false,
        }
    }

    fn run(&mut self) -> Result<Operand, EvalError> {
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            match ch {
                c if c.is_whitespace() => {
                    self.flush_token()?;
                    self.pos += 1;
                }
                '\'' => {
                    self.flush_token()?;
                    let literal = self.scan_string_literal()?;
                    self.push_operand(Operand::Text(literal))?;
                }
                '0'..='9' => {
                    if self.kind == TokenKind::None {
                        self.kind = TokenKind::Integer;
                    }
                    self.token.push(ch);
                    self.pos += 1;
                }
                '.' => {
                    match self.kind {
                        TokenKind::None => self.kind = TokenKind::Decimal,
                        TokenKind::Integer => self.kind = TokenKind::Decimal,
                        TokenKind::Decimal => {
                            return Err(self.syntax(format!(
                                "unexpected second '.' in number at position {}",
                                self.pos
                            )));
                        }
                        // Inside a name, '.' is a literal key character.
                        TokenKind::Variable => {}
                    }
                    self.token.push('.');
                    self.pos += 1;
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    match self.kind {
                        TokenKind::None => self.kind = TokenKind::Variable,
                        TokenKind::Variable => {}
                        TokenKind::Integer | TokenKind::Decimal => {
                            return Err(self.syntax(format!(
                                "invalid character '{}' in number at position {}",
                                c, self.pos
                            )));
                        }
                    }
                    self.token.push(c);
                    self.pos += 1;
                }
                '!' => {
                    // Synthetic/call-scoped names start with '!'.
                    if self.kind != TokenKind::None {
                        return Err(self.syntax(format!(
                            "'!' may only start an identifier (position {})",
                            self.pos
                        )));
                    }
                    self.kind = TokenKind::Variable;
                    self.token.push('!');
                    self.pos += 1;
                }
                '(' => {
                    if self.kind == TokenKind::Variable {
                        let name = std::mem::take(&mut self.token);
                        self.kind = TokenKind::None;
                        self.call_function(&name)?;
                    } else {
                        self.flush_token()?;
                        if self.last_was_operand {
                            return Err(self.syntax(format!(
                                "expected an operator before '(' at position {}",
                                self.pos
                            )));
                        }
                        self.operators.push(Operator::OpenParen);
                        self.groups.push(Grouping::Paren);
                        self.pos += 1;
                    }
                }
                ')' => {
                    self.flush_token()?;
                    match self.groups.pop() {
                        Some(Grouping::Paren) => {}
                        Some(Grouping::Bracket(_)) => {
                            return Err(self.syntax(format!(
                                "expected ']' before ')' at position {}",
                                self.pos
                            )));
                        }
                        None => {
                            return Err(self
                                .syntax(format!("unmatched ')' at position {}", self.pos)));
                        }
                    }
                    if !self.last_was_operand {
                        return Err(self.syntax(format!(
                            "empty or incomplete group before ')' at position {}",
                            self.pos
                        )));
                    }
                    self.reduce_to_marker(Operator::OpenParen)?;
                    self.pos += 1;
                }
                '[' => {
                    if self.kind != TokenKind::Variable {
                        return Err(self.syntax(format!(
                            "'[' must follow a variable name (position {})",
                            self.pos
                        )));
                    }
                    let name = std::mem::take(&mut self.token);
                    self.kind = TokenKind::None;
                    self.groups.push(Grouping::Bracket(name));
                    self.operators.push(Operator::OpenBracket);
                    self.last_was_operand = false;
                    self.pos += 1;
                }
                ']' => {
                    self.flush_token()?;
                    match self.groups.pop() {
                        Some(Grouping::Bracket(name)) => {
                            if !self.last_was_operand {
                                return Err(self.syntax(format!(
                                    "empty index expression before ']' at position {}",
                                    self.pos
                                )));
                            }
                            self.reduce_to_marker(Operator::OpenBracket)?;
                            let index = self.operands.pop().ok_or_else(|| {
                                self.syntax(format!(
                                    "missing index operand at position {}",
                                    self.pos
                                ))
                            })?;
                            match index {
                                Operand::Integer(n) => {
                                    // The integer becomes literal characters
                                    // of a composite variable name.
                                    self.token = format!("{}[{}]", name, n);
                                    self.kind = TokenKind::Variable;
                                    self.last_was_operand = false;
                                }
                                other => {
                                    return Err(self.syntax(format!(
                                        "index for '{}' must reduce to an Integer, got {} (position {})",
                                        name,
                                        other.kind_name(),
                                        self.pos
                                    )));
                                }
                            }
                        }
                        Some(Grouping::Paren) => {
                            return Err(self.syntax(format!(
                                "expected ')' before ']' at position {}",
                                self.pos
                            )));
                        }
                        None => {
                            return Err(self
                                .syntax(format!("unmatched ']' at position {}", self.pos)));
                        }
                    }
                    self.pos += 1;
                }
                '+' | '-' => {
                    self.flush_token()?;
                    let op = match (ch, self.last_was_operand) {
                        ('+', true) => Operator::Add,
                        ('+', false) => Operator::UnaryAdd,
                        ('-', true) => Operator::Sub,
                        (_, false) => Operator::UnarySub,
                        _ => unreachable!(),
                    };
                    self.push_operator(op)?;
                    self.pos += 1;
                }
                '*' => self.single_operator(Operator::Mul)?,
                '/' => self.single_operator(Operator::Div)?,
                '%' => self.single_operator(Operator::Rem)?,
                '&' => self.single_operator(Operator::BitAnd)?,
                '|' => self.single_operator(Operator::BitOr)?,
                '=' => self.single_operator(Operator::Eq)?,
                '~' => self.operator_with_lookahead(Operator::Neq, Operator::Not)?,
                '<' => self.operator_with_lookahead(Operator::Lte, Operator::Lt)?,
                '>' => self.operator_with_lookahead(Operator::Gte, Operator::Gt)?,
                other => {
                    return Err(self.syntax(format!(
                        "unexpected character '{}' at position {}",
                        other, self.pos
                    )));
                }
            }
        }

        // End of input: flush, check balance, reduce everything.
        self.flush_token()?;
        if let Some(group) = self.groups.last() {
            let symbol = match group {
                Grouping::Paren => "(",
                Grouping::Bracket(_) => "[",
            };
            return Err(self.syntax(format!("unbalanced '{}' in expression", symbol)));
        }
        if self.operands.is_empty() && self.operators.is_empty() {
            return Err(self.syntax("expression is empty".to_string()));
        }
        if !self.last_was_operand {
            return Err(self.syntax("expression ends with an operator".to_string()));
        }
        while let Some(op) = self.operators.pop() {
            self.apply(op)?;
        }
        match self.operands.pop() {
            Some(result) if self.operands.is_empty() => Ok(result),
            _ => Err(self.syntax(
                "malformed expression: operand count mismatch after reduction".to_string(),
            )),
        }
    }

    //
    // Token handling
    //

    /// Complete the in-progress token, if any, and push it as an operand.
    fn flush_token(&mut self) -> Result<(), EvalError> {
        if self.kind == TokenKind::None {
            return Ok(());
        }
        let token = std::mem::take(&mut self.token);
        let kind = std::mem::replace(&mut self.kind, TokenKind::None);
        let operand = match kind {
            TokenKind::Integer => token.parse::<i32>().map(Operand::Integer).map_err(|_| {
                self.syntax(format!(
                    "invalid integer literal '{}' at position {}",
                    token, self.pos
                ))
            })?,
            TokenKind::Decimal => token.parse::<f64>().map(Operand::Decimal).map_err(|_| {
                self.syntax(format!(
                    "invalid decimal literal '{}' at position {}",
                    token, self.pos
                ))
            })?,
            TokenKind::Variable => self.resolve_variable(&token)?,
            TokenKind::None => unreachable!("flush with no token"),
        };
        self.push_operand(operand)
    }

    /// Look up a name: local table first, then global. A suspended
    /// `Expression` entry is reduced by recursing into the evaluator with
    /// its own stored scope.
    fn resolve_variable(&self, name: &str) -> Result<Operand, EvalError> {
        match self.locals.get(name).or_else(|| self.eval.globals.get(name)) {
            Some(Operand::Expression { text, locals }) => self.eval.evaluate_with(text, locals),
            Some(primitive) => Ok(primitive.clone()),
            None => Err(self.syntax(format!(
                "unknown identifier '{}' at position {}",
                name, self.pos
            ))),
        }
    }

    fn push_operand(&mut self, operand: Operand) -> Result<(), EvalError> {
        if self.last_was_operand {
            return Err(self.syntax(format!(
                "expected an operator at position {}",
                self.pos
            )));
        }
        self.operands.push(operand);
        self.last_was_operand = true;
        Ok(())
    }

    /// Consume a string literal starting at the opening quote, decoding
    /// escapes. See the module docs for the escape grammar.
    fn scan_string_literal(&mut self) -> Result<String, EvalError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            match ch {
                '\'' => {
                    self.pos += 1;
                    return Ok(out);
                }
                '`' if self.chars.get(self.pos + 1) == Some(&'\'') => {
                    out.push('\'');
                    self.pos += 2;
                }
                '\\' => {
                    let decoded = match self.chars.get(self.pos + 1) {
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('b') => '\u{0008}',
                        Some('r') => '\r',
                        Some('f') => '\u{000C}',
                        Some(other) => {
                            return Err(self.syntax(format!(
                                "unknown escape sequence '\\{}' at position {}",
                                other, self.pos
                            )));
                        }
                        None => break,
                    };
                    out.push(decoded);
                    self.pos += 2;
                }
                other => {
                    out.push(other);
                    self.pos += 1;
                }
            }
        }
        Err(self.syntax(format!(
            "string literal starting at position {} is not terminated",
            start
        )))
    }

    //
    // Operator handling
    //

    fn single_operator(&mut self, op: Operator) -> Result<(), EvalError> {
        self.flush_token()?;
        self.push_operator(op)?;
        self.pos += 1;
        Ok(())
    }

    /// `~`, `<` and `>` probe one character of lookahead for a trailing
    /// `=`, consuming it when present.
    fn operator_with_lookahead(
        &mut self,
        with_equals: Operator,
        alone: Operator,
    ) -> Result<(), EvalError> {
        self.flush_token()?;
        if self.chars.get(self.pos + 1) == Some(&'=') {
            self.push_operator(with_equals)?;
            self.pos += 2;
        } else {
            self.push_operator(alone)?;
            self.pos += 1;
        }
        Ok(())
    }

    fn push_operator(&mut self, op: Operator) -> Result<(), EvalError> {
        if op.is_unary() {
            if self.last_was_operand {
                return Err(self.syntax(format!(
                    "unary operator '{}' cannot follow an operand (position {})",
                    op.symbol(),
                    self.pos
                )));
            }
            // Unary operators never reduce eagerly: a run of them applies
            // innermost-first when the operand finally arrives.
            self.operators.push(op);
        } else {
            if !self.last_was_operand {
                return Err(self.syntax(format!(
                    "operator '{}' is missing a left operand at position {}",
                    op.symbol(),
                    self.pos
                )));
            }
            // Equal precedence reduces too, forcing left-to-right
            // association. Grouping markers rank below every real operator
            // and thus never reduce here.
            while let Some(&top) = self.operators.last() {
                if top.precedence() >= op.precedence() {
                    self.operators.pop();
                    self.apply(top)?;
                } else {
                    break;
                }
            }
            self.operators.push(op);
        }
        self.last_was_operand = false;
        Ok(())
    }

    /// Pop and apply operators until the given grouping marker is removed.
    fn reduce_to_marker(&mut self, marker: Operator) -> Result<(), EvalError> {
        while let Some(op) = self.operators.pop() {
            if op == marker {
                return Ok(());
            }
            self.apply(op)?;
        }
        Err(self.syntax("unbalanced grouping in expression".to_string()))
    }

    /// Apply one operator to the top of the operand stack. Operator
    /// failures (unsupported combinations, overflow, zero division) are
    /// re-raised as syntax errors carrying the current scan position.
    fn apply(&mut self, op: Operator) -> Result<(), EvalError> {
        let result = if op.is_unary() {
            let value = self.pop_operand(op)?;
            match op {
                Operator::Not => value.not(),
                Operator::UnaryAdd => value.unary_add(),
                Operator::UnarySub => value.unary_sub(),
                _ => unreachable!(),
            }
        } else {
            let rhs = self.pop_operand(op)?;
            let lhs = self.pop_operand(op)?;
            match op {
                Operator::Mul => lhs.mul(&rhs),
                Operator::Div => lhs.div(&rhs),
                Operator::Rem => lhs.rem(&rhs),
                Operator::Add => lhs.add(&rhs),
                Operator::Sub => lhs.sub(&rhs),
                Operator::Lt => lhs.lt(&rhs),
                Operator::Gt => lhs.gt(&rhs),
                Operator::Lte => lhs.lte(&rhs),
                Operator::Gte => lhs.gte(&rhs),
                Operator::Eq => lhs.eq(&rhs),
                Operator::Neq => lhs.neq(&rhs),
                Operator::BitAnd => lhs.bitand(&rhs),
                Operator::BitOr => lhs.bitor(&rhs),
                _ => unreachable!("grouping markers are never applied"),
            }
        };
        let value = result.map_err(|err| self.reraise(err))?;
        self.operands.push(value);
        self.last_was_operand = true;
        Ok(())
    }

    fn pop_operand(&mut self, op: Operator) -> Result<Operand, EvalError> {
        self.operands.pop().ok_or_else(|| {
            self.syntax(format!(
                "operator '{}' is missing an operand at position {}",
                op.symbol(),
                self.pos
            ))
        })
    }

    //
    // Function calls
    //

    /// Handle `name(` — the name must be a registered function. Extracts
    /// the raw argument substrings without evaluating them, binds each per
    /// its declared convention, then invokes the body.
    fn call_function(&mut self, name: &str) -> Result<(), EvalError> {
        let open_pos = self.pos;
        let definition = match self.eval.functions.get(name) {
            Some(definition) => definition.clone(),
            None => {
                return Err(self.syntax(format!(
                    "unknown function '{}' at position {}",
                    name, open_pos
                )));
            }
        };

        let raw_args = self.split_raw_arguments()?;
        if raw_args.len() != definition.params.len() {
            return Err(self.syntax(format!(
                "function '{}' expects {} argument(s), got {} (position {})",
                name,
                definition.params.len(),
                raw_args.len(),
                open_pos
            )));
        }

        let mut call_locals = VariableTable::new();
        for (i, (raw, param)) in raw_args.iter().zip(&definition.params).enumerate() {
            let slot = format!("!{}", i);
            match param {
                ParamKind::Primitive => {
                    let value = self.eval.evaluate_with(raw, self.locals)?;
                    call_locals.define(&slot, value);
                }
                ParamKind::Expression => {
                    call_locals.define(
                        &slot,
                        Operand::Expression {
                            text: raw.clone(),
                            locals: self.locals.clone(),
                        },
                    );
                }
                ParamKind::Reference => {
                    self.bind_reference(&slot, raw, &mut call_locals)?;
                }
            }
        }

        let result = match &definition.body {
            FunctionBody::User(body) => self.eval.evaluate_with(body, &call_locals),
            FunctionBody::Coded(func) => func(self.eval, &call_locals),
        };
        let value = result.map_err(|err| match err {
            EvalError::TypeError(msg) | EvalError::FunctionError(msg) => EvalError::SyntaxError(
                format!("in call to '{}': {} (position {})", name, msg, open_pos),
            ),
            other => other,
        })?;
        self.push_operand(value)
    }

    /// Extract the raw, unevaluated argument substrings of a call. The scan
    /// tracks nested parentheses and string-literal state so commas and
    /// `)` inside nested calls or literals are not taken as delimiters.
    /// Leaves the position just past the closing parenthesis.
    fn split_raw_arguments(&mut self) -> Result<Vec<String>, EvalError> {
        let open_pos = self.pos;
        self.pos += 1;
        let mut args = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        let mut in_string = false;
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];
            if in_string {
                // Only the backtick-quote escape can hide a quote here.
                if ch == '`' && self.chars.get(self.pos + 1) == Some(&'\'') {
                    current.push('`');
                    current.push('\'');
                    self.pos += 2;
                    continue;
                }
                if ch == '\'' {
                    in_string = false;
                }
                current.push(ch);
                self.pos += 1;
                continue;
            }
            match ch {
                '\'' => {
                    in_string = true;
                    current.push(ch);
                    self.pos += 1;
                }
                '(' => {
                    depth += 1;
                    current.push(ch);
                    self.pos += 1;
                }
                ')' if depth == 0 => {
                    self.pos += 1;
                    if !(args.is_empty() && current.trim().is_empty()) {
                        args.push(current);
                    }
                    return Ok(args);
                }
                ')' => {
                    depth -= 1;
                    current.push(ch);
                    self.pos += 1;
                }
                ',' if depth == 0 => {
                    args.push(std::mem::take(&mut current));
                    self.pos += 1;
                }
                other => {
                    current.push(other);
                    self.pos += 1;
                }
            }
        }
        Err(self.syntax(format!(
            "unterminated function call starting at position {}",
            open_pos
        )))
    }

    /// Bind a `Reference` parameter: resolve the raw text to a variable
    /// name in restricted mode, then alias every global and local entry
    /// sharing that prefix into the call scope (locals shadow globals).
    fn bind_reference(
        &self,
        slot: &str,
        raw: &str,
        call_locals: &mut VariableTable,
    ) -> Result<(), EvalError> {
        let name = self.resolve_reference_name(raw)?;
        let prefix = name.to_lowercase();
        let mut matched = false;
        for (key, value) in self.eval.globals.entries_with_prefix(&prefix) {
            call_locals.define(&format!("{}{}", slot, &key[prefix.len()..]), value.clone());
            matched = true;
        }
        for (key, value) in self.locals.entries_with_prefix(&prefix) {
            call_locals.define(&format!("{}{}", slot, &key[prefix.len()..]), value.clone());
            matched = true;
        }
        if !matched {
            return Err(self.syntax(format!(
                "reference parameter '{}' does not resolve to any variable (position {})",
                raw.trim(),
                self.pos
            )));
        }
        Ok(())
    }

    /// Restricted "reference mode" parser: only a bare variable name with
    /// optional `[<integer-expression>]` index groups and `.field` segments
    /// is legal. Literals, calls, and compound expressions are rejected.
    fn resolve_reference_name(&self, raw: &str) -> Result<String, EvalError> {
        let text = raw.trim();
        let chars: Vec<char> = text.chars().collect();
        let mut name = String::new();
        let mut i = 0;
        while i < chars.len() {
            let ch = chars[i];
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || (ch == '!' && i == 0) {
                name.push(ch);
                i += 1;
            } else if ch == '[' {
                let mut depth = 1;
                let mut j = i + 1;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '[' => depth += 1,
                        ']' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(self.syntax(format!(
                        "unbalanced '[' in reference parameter '{}'",
                        text
                    )));
                }
                let inner: String = chars[i + 1..j - 1].iter().collect();
                match self.eval.evaluate_with(&inner, self.locals)? {
                    Operand::Integer(n) => name.push_str(&format!("[{}]", n)),
                    other => {
                        return Err(self.syntax(format!(
                            "index in reference parameter '{}' must reduce to an Integer, got {}",
                            text,
                            other.kind_name()
                        )));
                    }
                }
                i = j;
            } else {
                return Err(self.syntax(format!(
                    "reference parameter '{}' must be a plain variable name",
                    text
                )));
            }
        }
        let starts_like_name = name
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '!')
            .unwrap_or(false);
        if !starts_like_name {
            return Err(self.syntax(format!(
                "reference parameter '{}' must be a plain variable name",
                text
            )));
        }
        Ok(name)
    }

    //
    // Error shaping
    //

    fn syntax(&self, message: String) -> EvalError {
        EvalError::SyntaxError(message)
    }

    /// Operator and native-function failures become syntax errors at the
    /// current scan position, so the top level observes one failure kind.
    fn reraise(&self, err: EvalError) -> EvalError {
        match err {
            EvalError::TypeError(msg) | EvalError::FunctionError(msg) => {
                EvalError::SyntaxError(format!("{} (position {})", msg, self.pos))
            }
            other => other,
        }
    }

    /// Append the text fragment parsed so far, giving a call trace across
    /// recursion levels as the error propagates outward.
    fn error_with_trace(&self, err: EvalError) -> EvalError {
        let upto = self.pos.min(self.chars.len());
        let fragment: String = self.chars[..upto].iter().collect();
        let message = match err {
            EvalError::SyntaxError(msg) => msg,
            EvalError::TypeError(msg) | EvalError::FunctionError(msg) => {
                format!("{} (position {})", msg, self.pos)
            }
        };
        let fragment = fragment.trim();
        if fragment.is_empty() {
            EvalError::SyntaxError(message)
        } else {
            EvalError::SyntaxError(format!("{}\n  in expression: {}", message, fragment))
        }
    }
}
