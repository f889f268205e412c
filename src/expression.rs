//! Expression language used by `set-column`, row filters, `fail`, `send-to-error` and the
//! variable directives.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! expr     := or
//! or       := and (("||" | "or") and)*
//! and      := equality (("&&" | "and") equality)*
//! equality := compare (("==" | "!=") compare)*
//! compare  := additive (("<" | "<=" | ">" | ">=") additive)*
//! additive := term (("+" | "-") term)*
//! term     := unary (("*" | "/" | "%") unary)*
//! unary    := ("!" | "not" | "-") unary | primary
//! primary  := number | string | true | false | null | ident | ident "(" args ")" | "(" expr ")"
//! ```
//!
//! Identifiers resolve to the record's column first, then to a pipeline variable, and to
//! `null` otherwise. Comparisons involving `null` are false.
//!
//! ```rust
//! use std::collections::HashMap;
//! use record_wrangler::expression::Expression;
//! use record_wrangler::types::{Record, Value};
//!
//! let expr = Expression::parse("count > 0 && upper(name) == 'X'").unwrap();
//! let record = Record::new().with("count", 1i64).with("name", "x");
//! assert!(expr.evaluate_condition(&record, &HashMap::new()).unwrap());
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::error::ExpressionError;
use crate::types::{Record, Value};

/// A parsed expression, evaluated per record.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Ident(String),
    Not(Box<Node>),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Len,
    Upper,
    Lower,
    Trim,
    Concat,
    IsNull,
    IsEmpty,
    Coalesce,
    ToInt,
    ToFloat,
    ToString,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "len" => Function::Len,
            "upper" => Function::Upper,
            "lower" => Function::Lower,
            "trim" => Function::Trim,
            "concat" => Function::Concat,
            "is_null" => Function::IsNull,
            "is_empty" => Function::IsEmpty,
            "coalesce" => Function::Coalesce,
            "to_int" => Function::ToInt,
            "to_float" => Function::ToFloat,
            "to_string" => Function::ToString,
            _ => return None,
        })
    }

    /// `(min, max)` argument count; `None` max means variadic.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Concat | Function::Coalesce => (1, None),
            _ => (1, Some(1)),
        }
    }
}

impl Expression {
    /// Parse expression text.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let root = parser.parse_or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::Parse {
                offset: *offset,
                message: format!("unexpected {token}"),
            });
        }
        Ok(Self {
            source: source.trim().to_string(),
            root,
        })
    }

    /// The expression text as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a record and the pipeline variables.
    pub fn evaluate(
        &self,
        record: &Record,
        variables: &HashMap<String, Value>,
    ) -> Result<Value, ExpressionError> {
        let scope = Scope { record, variables };
        scope.eval(&self.root)
    }

    /// Evaluate as a condition. `null` counts as false; any other non-boolean is an error.
    pub fn evaluate_condition(
        &self,
        record: &Record,
        variables: &HashMap<String, Value>,
    ) -> Result<bool, ExpressionError> {
        match self.evaluate(record, variables)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(eval_error(format!(
                "condition '{}' evaluated to {} instead of bool",
                self.source,
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(v) => write!(f, "number {v}"),
            Token::Float(v) => write!(f, "number {v}"),
            Token::Str(s) => write!(f, "string '{s}'"),
            Token::Ident(s) => write!(f, "identifier '{s}'"),
            Token::Op(op) => write!(f, "operator '{op}'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

const OPERATORS: [&str; 15] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "=",
];

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        match c {
            b'(' => {
                tokens.push((start, Token::LParen));
                i += 1;
            }
            b')' => {
                tokens.push((start, Token::RParen));
                i += 1;
            }
            b',' => {
                tokens.push((start, Token::Comma));
                i += 1;
            }
            b'\'' | b'"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                let mut closed = false;
                while i < bytes.len() {
                    let ch = source[i..].chars().next().unwrap_or_default();
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        let escaped = source[i + 1..].chars().next().unwrap_or_default();
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                        i += 1 + escaped.len_utf8();
                        continue;
                    }
                    if bytes[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    text.push(ch);
                    i += ch.len_utf8();
                }
                if !closed {
                    return Err(ExpressionError::Parse {
                        offset: start,
                        message: "unterminated string literal".to_string(),
                    });
                }
                tokens.push((start, Token::Str(text)));
            }
            b'0'..=b'9' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &source[start..i];
                let token = if text.contains('.') {
                    text.parse::<f64>().map(Token::Float).map_err(|e| e.to_string())
                } else {
                    text.parse::<i64>().map(Token::Int).map_err(|e| e.to_string())
                };
                let token = token.map_err(|message| ExpressionError::Parse {
                    offset: start,
                    message: format!("invalid number '{text}': {message}"),
                })?;
                tokens.push((start, token));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                tokens.push((start, Token::Ident(source[start..i].to_string())));
            }
            _ => {
                let rest = &source[i..];
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| ExpressionError::Parse {
                        offset: start,
                        message: format!(
                            "unexpected character '{}'",
                            rest.chars().next().unwrap_or_default()
                        ),
                    })?;
                // A lone '=' is accepted as equality.
                let op = if *op == "=" { "==" } else { *op };
                i += if op == "==" && !rest.starts_with("==") { 1 } else { op.len() };
                tokens.push((start, Token::Op(op)));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Parse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    /// Consume the next token if it is one of `ops` (symbolic or keyword form).
    fn take_op(&mut self, ops: &[(&'static str, BinaryOp)]) -> Option<BinaryOp> {
        let found = match self.peek()? {
            Token::Op(op) => ops.iter().find(|(s, _)| s == op).map(|(_, b)| *b),
            Token::Ident(word) => ops
                .iter()
                .find(|(s, _)| *s == word.as_str())
                .map(|(_, b)| *b),
            _ => None,
        };
        if found.is_some() {
            self.pos += 1;
        }
        found
    }

    fn binary_level(
        &mut self,
        ops: &[(&'static str, BinaryOp)],
        next: fn(&mut Self) -> Result<Node, ExpressionError>,
    ) -> Result<Node, ExpressionError> {
        let mut lhs = next(self)?;
        while let Some(op) = self.take_op(ops) {
            let rhs = next(self)?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(&[("||", BinaryOp::Or), ("or", BinaryOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[("&&", BinaryOp::And), ("and", BinaryOp::And)],
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            Self::parse_compare,
        )
    }

    fn parse_compare(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Node, ExpressionError> {
        match self.peek() {
            Some(Token::Op("!")) => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Ident(word)) if word == "not" => {
                self.pos += 1;
                Ok(Node::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op("-")) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, ExpressionError> {
        let Some((_, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        self.pos += 1;
        match token {
            Token::Int(v) => Ok(Node::Literal(Value::Int64(v))),
            Token::Float(v) => Ok(Node::Literal(Value::Float64(v))),
            Token::Str(s) => Ok(Node::Literal(Value::Utf8(s))),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("expected ')'")),
                }
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                _ if self.peek() == Some(&Token::LParen) => self.parse_call(name),
                _ => Ok(Node::Ident(name)),
            },
            other => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {other}")))
            }
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Node, ExpressionError> {
        let func = Function::lookup(&name)
            .ok_or_else(|| self.error(format!("unknown function '{name}'")))?;
        self.pos += 1; // '('
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
        } else {
            loop {
                args.push(self.parse_or()?);
                match self.peek() {
                    Some(Token::Comma) => self.pos += 1,
                    Some(Token::RParen) => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
        }
        let (min, max) = func.arity();
        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            return Err(self.error(format!(
                "function '{name}' called with {} argument(s)",
                args.len()
            )));
        }
        Ok(Node::Call(func, args))
    }
}

fn eval_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::Eval {
        message: message.into(),
    }
}

struct Scope<'a> {
    record: &'a Record,
    variables: &'a HashMap<String, Value>,
}

impl Scope<'_> {
    fn eval(&self, node: &Node) -> Result<Value, ExpressionError> {
        match node {
            Node::Literal(v) => Ok(v.clone()),
            Node::Ident(name) => Ok(self
                .record
                .get(name)
                .or_else(|| self.variables.get(name))
                .cloned()
                .unwrap_or(Value::Null)),
            Node::Not(inner) => match self.eval(inner)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                Value::Null => Ok(Value::Bool(true)),
                other => Err(eval_error(format!("cannot negate {}", other.type_name()))),
            },
            Node::Neg(inner) => match self.eval(inner)? {
                Value::Int64(v) => v
                    .checked_neg()
                    .map(Value::Int64)
                    .ok_or_else(|| eval_error("integer overflow")),
                Value::Float64(v) => Ok(Value::Float64(-v)),
                Value::Null => Ok(Value::Null),
                other => Err(eval_error(format!("cannot negate {}", other.type_name()))),
            },
            Node::Binary(BinaryOp::And, lhs, rhs) => {
                if !self.truthy(lhs)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.truthy(rhs)?))
            }
            Node::Binary(BinaryOp::Or, lhs, rhs) => {
                if self.truthy(lhs)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.truthy(rhs)?))
            }
            Node::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, l, r)
            }
            Node::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, values)
            }
        }
    }

    fn truthy(&self, node: &Node) -> Result<bool, ExpressionError> {
        match self.eval(node)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(eval_error(format!(
                "expected bool operand, found {}",
                other.type_name()
            ))),
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int64(a), Value::Int64(b)) => a == b,
        (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

fn binary(op: BinaryOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if l.is_null() || r.is_null() {
                return Ok(Value::Bool(false));
            }
            let ordering = match (&l, &r) {
                (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
                (Value::Utf8(a), Value::Utf8(b)) => Some(a.cmp(b)),
                _ => match (l.as_f64(), r.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => {
                        return Err(eval_error(format!(
                            "cannot compare {} with {}",
                            l.type_name(),
                            r.type_name()
                        )));
                    }
                },
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add if matches!(l, Value::Utf8(_)) || matches!(r, Value::Utf8(_)) => {
            Ok(Value::Utf8(format!("{l}{r}")))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, l, r)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit"),
    }
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value, ExpressionError> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int64(a), Value::Int64(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b == 0 {
            return Err(eval_error("division by zero"));
        }
        let out = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        return out
            .map(Value::Int64)
            .ok_or_else(|| eval_error("integer overflow"));
    }
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float64(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => a % b,
        })),
        _ => Err(eval_error(format!(
            "arithmetic on {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}

fn call(func: Function, mut args: Vec<Value>) -> Result<Value, ExpressionError> {
    let text_fn = |args: &[Value], f: fn(&str) -> String| match &args[0] {
        Value::Utf8(s) => Ok(Value::Utf8(f(s))),
        Value::Null => Ok(Value::Null),
        other => Err(eval_error(format!(
            "expected string argument, found {}",
            other.type_name()
        ))),
    };

    match func {
        Function::Len => match &args[0] {
            Value::Utf8(s) => Ok(Value::Int64(s.chars().count() as i64)),
            Value::Bytes(b) => Ok(Value::Int64(b.len() as i64)),
            Value::Null => Ok(Value::Int64(0)),
            other => Err(eval_error(format!("len() of {}", other.type_name()))),
        },
        Function::Upper => text_fn(&args[..], str::to_uppercase),
        Function::Lower => text_fn(&args[..], str::to_lowercase),
        Function::Trim => text_fn(&args[..], |s| s.trim().to_string()),
        Function::Concat => Ok(Value::Utf8(args.iter().map(Value::to_string).collect())),
        Function::IsNull => Ok(Value::Bool(args[0].is_null())),
        Function::IsEmpty => Ok(Value::Bool(args[0].is_null_or_empty())),
        Function::Coalesce => Ok(args
            .into_iter()
            .find(|v| !v.is_null())
            .unwrap_or(Value::Null)),
        Function::ToInt => match args.swap_remove(0) {
            Value::Int64(v) => Ok(Value::Int64(v)),
            Value::Float64(v) => Ok(Value::Int64(v as i64)),
            Value::Bool(b) => Ok(Value::Int64(i64::from(b))),
            Value::Utf8(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| eval_error(format!("to_int('{s}'): {e}"))),
            Value::Null => Ok(Value::Null),
            other => Err(eval_error(format!("to_int() of {}", other.type_name()))),
        },
        Function::ToFloat => match args.swap_remove(0) {
            Value::Utf8(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|e| eval_error(format!("to_float('{s}'): {e}"))),
            Value::Null => Ok(Value::Null),
            other => other
                .as_f64()
                .map(Value::Float64)
                .ok_or_else(|| eval_error(format!("to_float() of {}", other.type_name()))),
        },
        Function::ToString => match &args[0] {
            Value::Null => Ok(Value::Null),
            other => Ok(Value::Utf8(other.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Expression;
    use crate::error::ExpressionError;
    use crate::types::{Record, Value};

    fn eval(source: &str, record: &Record) -> Result<Value, ExpressionError> {
        Expression::parse(source)?.evaluate(record, &HashMap::new())
    }

    #[test]
    fn arithmetic_respects_precedence() {
        let r = Record::new().with("a", 2i64).with("b", 0.5);
        assert_eq!(eval("1 + a * 3", &r), Ok(Value::Int64(7)));
        assert_eq!(eval("(1 + a) * 3", &r), Ok(Value::Int64(9)));
        assert_eq!(eval("a * b", &r), Ok(Value::Float64(1.0)));
        assert_eq!(eval("-a + 10 % 4", &r), Ok(Value::Int64(0)));
    }

    #[test]
    fn string_concatenation_and_functions() {
        let r = Record::new().with("first", "Ada").with("last", "Lovelace");
        assert_eq!(
            eval("first + ' ' + last", &r),
            Ok(Value::Utf8("Ada Lovelace".to_string()))
        );
        assert_eq!(eval("upper(first)", &r), Ok(Value::Utf8("ADA".to_string())));
        assert_eq!(eval("len(last)", &r), Ok(Value::Int64(8)));
        assert_eq!(
            eval("coalesce(missing, first)", &r),
            Ok(Value::Utf8("Ada".to_string()))
        );
    }

    #[test]
    fn comparisons_mix_numeric_kinds_and_treat_null_as_false() {
        let r = Record::new().with("count", 3i64).with("score", 2.5);
        assert_eq!(eval("count > score", &r), Ok(Value::Bool(true)));
        assert_eq!(eval("count == 3.0", &r), Ok(Value::Bool(true)));
        assert_eq!(eval("missing > 0", &r), Ok(Value::Bool(false)));
        assert_eq!(eval("missing == null", &r), Ok(Value::Bool(true)));
        assert_eq!(eval("count = 3", &r), Ok(Value::Bool(true)));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let r = Record::new().with("flag", false);
        // The right-hand side would fail (string is not a bool) if evaluated.
        assert_eq!(eval("flag && 'x'", &r), Ok(Value::Bool(false)));
        assert_eq!(eval("not flag or 'x'", &r), Ok(Value::Bool(true)));
        assert!(eval("flag || 'x'", &r).is_err());
    }

    #[test]
    fn variables_resolve_after_columns() {
        let expr = Expression::parse("total + 1").unwrap();
        let mut vars = HashMap::new();
        vars.insert("total".to_string(), Value::Int64(41));
        assert_eq!(
            expr.evaluate(&Record::new(), &vars),
            Ok(Value::Int64(42))
        );
        let shadowed = Record::new().with("total", 1i64);
        assert_eq!(expr.evaluate(&shadowed, &vars), Ok(Value::Int64(2)));
    }

    #[test]
    fn condition_requires_bool() {
        let expr = Expression::parse("name").unwrap();
        let r = Record::new().with("name", "x");
        assert!(expr.evaluate_condition(&r, &HashMap::new()).is_err());
        assert_eq!(
            expr.evaluate_condition(&Record::new(), &HashMap::new()),
            Ok(false)
        );
    }

    #[test]
    fn parse_errors_report_offsets() {
        let Err(ExpressionError::Parse { offset, .. }) = Expression::parse("count > ") else {
            panic!("expected parse error");
        };
        assert_eq!(offset, 8);
        assert!(Expression::parse("'open").is_err());
        assert!(Expression::parse("nope(1)").is_err());
        assert!(Expression::parse("a b").is_err());
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval("1 / 0", &Record::new()).is_err());
        assert_eq!(
            eval("1.0 / 4", &Record::new()),
            Ok(Value::Float64(0.25))
        );
    }
}
