//! Expression language for formula fields and custom lookup outputs.
//!
//! ```text
//! or      := and ( ("or" | "||") and )*
//! and     := cmp ( ("and" | "&&") cmp )*
//! cmp     := add ( ("=" | "==" | "!=" | "<" | ">" | "<=" | ">=") add )?
//! add     := mul ( ("+" | "-") mul )*
//! mul     := unary ( ("*" | "/" | "%") unary )*
//! unary   := ("not" | "!" | "-") unary | access
//! access  := primary ( "." ident )*
//! primary := number | string | true | false | null | ident | `quoted ident`
//!          | ident "(" args ")" | "[" args "]" | "(" or ")"
//! ```
//!
//! Identifiers resolve against a context object (the document's own field values). Member access
//! on a list maps over its items, so `pages.score` yields every score.

use serde_json::{Map, Number, Value};
use std::{mem, str::FromStr};

use crate::{error::BuildonomyError, fields::render::display_value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Identifier(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    Not,
    Eof,
}

struct Lexer {
    input: Vec<char>,
    position: usize,
}

fn syntax_error<T>(msg: String) -> Result<T, BuildonomyError> {
    Err(BuildonomyError::Query(msg))
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
        }
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_delimited(&mut self, close: char) -> Result<String, BuildonomyError> {
        let mut result = String::new();
        self.advance();
        while let Some(ch) = self.current_char() {
            match ch {
                c if c == close => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    self.advance();
                    match self.current_char() {
                        Some('n') => result.push('\n'),
                        Some('t') => result.push('\t'),
                        Some(other) => result.push(other),
                        None => break,
                    }
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }
        syntax_error(format!("Unterminated {close}-delimited literal"))
    }

    fn read_number(&mut self) -> Result<Token, BuildonomyError> {
        let mut number = String::new();
        let mut is_float = false;
        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else if ch == '.' && !is_float && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        number
            .parse::<f64>()
            .map(Token::Number)
            .or_else(|e| syntax_error(format!("Invalid number '{number}': {e}")))
    }

    fn two_char(&mut self, next: char, double: Token, single: Token) -> Token {
        self.advance();
        if self.current_char() == Some(next) {
            self.advance();
            double
        } else {
            single
        }
    }

    fn next_token(&mut self) -> Result<Token, BuildonomyError> {
        self.skip_whitespace();
        let Some(ch) = self.current_char() else {
            return Ok(Token::Eof);
        };
        let token = match ch {
            '"' | '\'' => Token::String(self.read_delimited(ch)?),
            '`' => Token::Identifier(self.read_delimited('`')?),
            c if c.is_ascii_digit() => self.read_number()?,
            c if c.is_alphabetic() || c == '_' => match self.read_identifier().as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                other => Token::Identifier(other.to_string()),
            },
            '=' => self.two_char('=', Token::EqEq, Token::EqEq),
            '!' => self.two_char('=', Token::NotEq, Token::Not),
            '<' => self.two_char('=', Token::LtEq, Token::Lt),
            '>' => self.two_char('=', Token::GtEq, Token::Gt),
            '&' if self.peek_char(1) == Some('&') => {
                self.advance();
                self.advance();
                Token::And
            }
            '|' if self.peek_char(1) == Some('|') => {
                self.advance();
                self.advance();
                Token::Or
            }
            single => {
                let token = match single {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    other => return syntax_error(format!("Unexpected character '{other}'")),
                };
                self.advance();
                token
            }
        };
        Ok(token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Identifier(String),
    Array(Vec<Expr>),
    Access { object: Box<Expr>, key: String },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call { name: String, args: Vec<Expr> },
}

struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    fn new(mut lexer: Lexer) -> Result<Self, BuildonomyError> {
        let current_token = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> Result<(), BuildonomyError> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn check(&self, token: &Token) -> bool {
        mem::discriminant(&self.current_token) == mem::discriminant(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), BuildonomyError> {
        if !self.check(&expected) {
            return syntax_error(format!(
                "Expected {expected:?}, got {:?}",
                self.current_token
            ));
        }
        self.advance()
    }

    fn parse_args(&mut self, close: Token) -> Result<Vec<Expr>, BuildonomyError> {
        let mut args = Vec::new();
        if !self.check(&close) {
            loop {
                args.push(self.parse_or()?);
                if self.check(&Token::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(close)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, BuildonomyError> {
        let expr = match mem::replace(&mut self.current_token, Token::Eof) {
            Token::Number(n) => {
                self.advance()?;
                Expr::Literal(number_value(n))
            }
            Token::String(s) => {
                self.advance()?;
                Expr::Literal(Value::String(s))
            }
            Token::True => {
                self.advance()?;
                Expr::Literal(Value::Bool(true))
            }
            Token::False => {
                self.advance()?;
                Expr::Literal(Value::Bool(false))
            }
            Token::Null => {
                self.advance()?;
                Expr::Literal(Value::Null)
            }
            Token::Identifier(name) => {
                self.advance()?;
                if self.check(&Token::LParen) {
                    self.advance()?;
                    let args = self.parse_args(Token::RParen)?;
                    Expr::Call { name, args }
                } else {
                    Expr::Identifier(name)
                }
            }
            Token::LBracket => {
                self.advance()?;
                Expr::Array(self.parse_args(Token::RBracket)?)
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                inner
            }
            other => return syntax_error(format!("Unexpected token {other:?}")),
        };
        Ok(expr)
    }

    fn parse_access(&mut self) -> Result<Expr, BuildonomyError> {
        let mut expr = self.parse_primary()?;
        while self.check(&Token::Dot) {
            self.advance()?;
            let key = match mem::replace(&mut self.current_token, Token::Eof) {
                Token::Identifier(key) => key,
                other => return syntax_error(format!("Expected identifier after '.', got {other:?}")),
            };
            self.advance()?;
            expr = Expr::Access {
                object: Box::new(expr),
                key,
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, BuildonomyError> {
        if self.check(&Token::Not) {
            self.advance()?;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.check(&Token::Minus) {
            self.advance()?;
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_access()
    }

    fn parse_binary(
        &mut self,
        next: fn(&mut Parser) -> Result<Expr, BuildonomyError>,
        ops: fn(&Token) -> Option<BinOp>,
        repeat: bool,
    ) -> Result<Expr, BuildonomyError> {
        let mut left = next(self)?;
        while let Some(op) = ops(&self.current_token) {
            self.advance()?;
            let right = next(self)?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            if !repeat {
                break;
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, BuildonomyError> {
        self.parse_binary(
            Parser::parse_unary,
            |t| match t {
                Token::Star => Some(BinOp::Multiply),
                Token::Slash => Some(BinOp::Divide),
                Token::Percent => Some(BinOp::Modulo),
                _ => None,
            },
            true,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, BuildonomyError> {
        self.parse_binary(
            Parser::parse_multiplicative,
            |t| match t {
                Token::Plus => Some(BinOp::Add),
                Token::Minus => Some(BinOp::Subtract),
                _ => None,
            },
            true,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, BuildonomyError> {
        self.parse_binary(
            Parser::parse_additive,
            |t| match t {
                Token::EqEq => Some(BinOp::Equal),
                Token::NotEq => Some(BinOp::NotEqual),
                Token::Lt => Some(BinOp::LessThan),
                Token::Gt => Some(BinOp::GreaterThan),
                Token::LtEq => Some(BinOp::LessEqual),
                Token::GtEq => Some(BinOp::GreaterEqual),
                _ => None,
            },
            false,
        )
    }

    fn parse_and(&mut self) -> Result<Expr, BuildonomyError> {
        self.parse_binary(
            Parser::parse_comparison,
            |t| (*t == Token::And).then_some(BinOp::And),
            true,
        )
    }

    fn parse_or(&mut self) -> Result<Expr, BuildonomyError> {
        self.parse_binary(
            Parser::parse_and,
            |t| (*t == Token::Or).then_some(BinOp::Or),
            true,
        )
    }

    fn parse(&mut self) -> Result<Expr, BuildonomyError> {
        let expr = self.parse_or()?;
        self.expect(Token::Eof)?;
        Ok(expr)
    }
}

/// A number as a JSON value: integral results stay integers so they render as `5`, not `5.0`.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Numeric reading of a value; numeric strings count.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn flatten(values: Vec<Value>) -> Vec<Value> {
    values
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => flatten(items),
            other => vec![other],
        })
        .collect()
}

fn numbers(values: Vec<Value>) -> Vec<f64> {
    flatten(values).iter().filter_map(as_number).collect()
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) if !left.is_boolean() && !right.is_boolean() => l == r,
        _ => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                display_value(left) == display_value(right)
            }
            _ => left == right,
        },
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (as_number(left), as_number(right)) {
        (Some(l), Some(r)) => l.partial_cmp(&r),
        _ if left.is_null() || right.is_null() => None,
        _ => Some(display_value(left).cmp(&display_value(right))),
    }
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub source: String,
    pub expr: Expr,
}

impl FromStr for Formula {
    type Err = BuildonomyError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Formula::parse(source)
    }
}

impl Formula {
    pub fn parse(source: &str) -> Result<Formula, BuildonomyError> {
        if source.trim().is_empty() {
            return syntax_error("Empty expression".to_string());
        }
        let expr = Parser::new(Lexer::new(source))?
            .parse()
            .map_err(|e| BuildonomyError::Query(format!("{source}: {e}")))?;
        Ok(Formula {
            source: source.to_string(),
            expr,
        })
    }

    /// Evaluate against a context of field values.
    pub fn eval(&self, context: &Map<String, Value>) -> Result<Value, BuildonomyError> {
        eval(&self.expr, context)
    }
}

pub fn eval(expr: &Expr, ctx: &Map<String, Value>) -> Result<Value, BuildonomyError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Identifier(name) => Ok(ctx.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|item| eval(item, ctx))
                .collect::<Result<Vec<Value>, BuildonomyError>>()?,
        )),
        Expr::Access { object, key } => Ok(access(eval(object, ctx)?, key)),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, ctx)?))),
        Expr::Negate(inner) => {
            let value = eval(inner, ctx)?;
            as_number(&value)
                .map(|n| number_value(-n))
                .ok_or_else(|| BuildonomyError::Query(format!("Cannot negate {value}")))
        }
        Expr::BinaryOp { op, left, right } => match op {
            BinOp::And => {
                let l = eval(left, ctx)?;
                if !truthy(&l) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&eval(right, ctx)?)))
            }
            BinOp::Or => {
                let l = eval(left, ctx)?;
                if truthy(&l) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&eval(right, ctx)?)))
            }
            _ => binary(*op, eval(left, ctx)?, eval(right, ctx)?),
        },
        Expr::Call { name, args } => call(name, args, ctx),
    }
}

fn access(object: Value, key: &str) -> Value {
    match object {
        Value::Object(mut map) => map.remove(key).unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| access(item, key))
                .filter(|v| !v.is_null())
                .collect(),
        ),
        _ => Value::Null,
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, BuildonomyError> {
    use std::cmp::Ordering::*;
    let arithmetic = |f: fn(f64, f64) -> f64| match (as_number(&left), as_number(&right)) {
        (Some(l), Some(r)) => Ok(number_value(f(l, r))),
        _ => Err(BuildonomyError::Query(format!(
            "{op:?} needs numbers, got {left} and {right}"
        ))),
    };
    match op {
        BinOp::Add => match (&left, &right) {
            (Value::Array(l), Value::Array(r)) => {
                Ok(Value::Array(l.iter().chain(r.iter()).cloned().collect()))
            }
            _ if as_number(&left).is_some() && as_number(&right).is_some() => {
                arithmetic(|l, r| l + r)
            }
            _ => Ok(Value::String(format!(
                "{}{}",
                display_value(&left),
                display_value(&right)
            ))),
        },
        BinOp::Subtract => arithmetic(|l, r| l - r),
        BinOp::Multiply => arithmetic(|l, r| l * r),
        BinOp::Divide => {
            if as_number(&right) == Some(0.0) {
                return Err(BuildonomyError::Query("Division by zero".to_string()));
            }
            arithmetic(|l, r| l / r)
        }
        BinOp::Modulo => {
            if as_number(&right) == Some(0.0) {
                return Err(BuildonomyError::Query("Modulo by zero".to_string()));
            }
            arithmetic(|l, r| l % r)
        }
        BinOp::Equal => Ok(Value::Bool(values_equal(&left, &right))),
        BinOp::NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),
        BinOp::LessThan => Ok(Value::Bool(compare(&left, &right) == Some(Less))),
        BinOp::GreaterThan => Ok(Value::Bool(compare(&left, &right) == Some(Greater))),
        BinOp::LessEqual => Ok(Value::Bool(matches!(
            compare(&left, &right),
            Some(Less | Equal)
        ))),
        BinOp::GreaterEqual => Ok(Value::Bool(matches!(
            compare(&left, &right),
            Some(Greater | Equal)
        ))),
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are evaluated lazily"),
    }
}

fn call(name: &str, args: &[Expr], ctx: &Map<String, Value>) -> Result<Value, BuildonomyError> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(BuildonomyError::Query(format!(
                "{name}() takes {n} argument(s), got {}",
                args.len()
            )))
        }
    };
    // `if` and `default` evaluate lazily
    match name {
        "if" => {
            arity(3)?;
            return if truthy(&eval(&args[0], ctx)?) {
                eval(&args[1], ctx)
            } else {
                eval(&args[2], ctx)
            };
        }
        "default" => {
            arity(2)?;
            let value = eval(&args[0], ctx)?;
            let empty = match &value {
                Value::Null => true,
                Value::String(s) => s.is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            };
            return if empty { eval(&args[1], ctx) } else { Ok(value) };
        }
        _ => {}
    }
    let values = args
        .iter()
        .map(|arg| eval(arg, ctx))
        .collect::<Result<Vec<Value>, BuildonomyError>>()?;
    let single_number = |values: &[Value]| {
        arity(1)?;
        as_number(&values[0])
            .ok_or_else(|| BuildonomyError::Query(format!("{name}() needs a number")))
    };
    let result = match name {
        "length" => {
            arity(1)?;
            Value::from(match &values[0] {
                Value::Null => 0,
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(s) => s.chars().count(),
                other => display_value(other).chars().count(),
            })
        }
        "sum" => number_value(numbers(values).iter().sum()),
        "min" => numbers(values)
            .into_iter()
            .reduce(f64::min)
            .map(number_value)
            .unwrap_or(Value::Null),
        "max" => numbers(values)
            .into_iter()
            .reduce(f64::max)
            .map(number_value)
            .unwrap_or(Value::Null),
        "avg" => {
            let nums = numbers(values);
            if nums.is_empty() {
                Value::Null
            } else {
                number_value(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        "round" => {
            if values.len() == 2 {
                let n = as_number(&values[0])
                    .ok_or_else(|| BuildonomyError::Query("round() needs a number".to_string()))?;
                let digits = as_number(&values[1]).unwrap_or(0.0) as i32;
                let scale = 10f64.powi(digits);
                number_value((n * scale).round() / scale)
            } else {
                number_value(single_number(&values)?.round())
            }
        }
        "floor" => number_value(single_number(&values)?.floor()),
        "ceil" => number_value(single_number(&values)?.ceil()),
        "abs" => number_value(single_number(&values)?.abs()),
        "upper" => {
            arity(1)?;
            Value::String(display_value(&values[0]).to_uppercase())
        }
        "lower" => {
            arity(1)?;
            Value::String(display_value(&values[0]).to_lowercase())
        }
        "concat" => Value::String(values.iter().map(display_value).collect()),
        "join" => {
            let separator = values
                .get(1)
                .map(display_value)
                .unwrap_or_else(|| ", ".to_string());
            let items = match values.first() {
                Some(Value::Array(items)) => items.iter().map(display_value).collect(),
                Some(other) => vec![display_value(other)],
                None => vec![],
            };
            Value::String(items.join(&separator))
        }
        "contains" => {
            arity(2)?;
            Value::Bool(match &values[0] {
                Value::Array(items) => items.iter().any(|item| values_equal(item, &values[1])),
                Value::Object(map) => map.contains_key(&display_value(&values[1])),
                other => display_value(other).contains(&display_value(&values[1])),
            })
        }
        other => return Err(BuildonomyError::Query(format!("Unknown function {other}()"))),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Map<String, Value> {
        json!({
            "episodes": 12,
            "watched": "8",
            "title": "Your Name",
            "genres": ["Drama", "Supernatural"],
            "pages": [{"score": 3}, {"score": 5}, {"other": 1}],
            "my field": 2
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn eval_str(src: &str) -> Value {
        Formula::parse(src).unwrap().eval(&ctx()).unwrap()
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval_str("episodes - watched"), json!(4));
        assert_eq!(eval_str("1 + 2 * 3"), json!(7));
        assert_eq!(eval_str("(1 + 2) * 3"), json!(9));
        assert_eq!(eval_str("watched / episodes * 100"), json!(200.0 / 3.0));
        assert_eq!(eval_str("round(watched / episodes * 100, 1)"), json!(66.7));
        assert_eq!(eval_str("-episodes + `my field`"), json!(-10));
    }

    #[test]
    fn test_strings_and_logic() {
        assert_eq!(eval_str("upper(title)"), json!("YOUR NAME"));
        assert_eq!(eval_str("title + \" (2016)\""), json!("Your Name (2016)"));
        assert_eq!(eval_str("join(genres, \" / \")"), json!("Drama / Supernatural"));
        assert_eq!(eval_str("contains(genres, \"Drama\")"), json!(true));
        assert_eq!(eval_str("watched = 8 and not (episodes < 10)"), json!(true));
        assert_eq!(eval_str("if(watched >= episodes, \"done\", \"watching\")"), json!("watching"));
        assert_eq!(eval_str("default(missing, \"n/a\")"), json!("n/a"));
        assert_eq!(eval_str("length(genres)"), json!(2));
    }

    #[test]
    fn test_member_access_maps_lists() {
        assert_eq!(eval_str("pages.score"), json!([3, 5]));
        assert_eq!(eval_str("sum(pages.score)"), json!(8));
        assert_eq!(eval_str("avg(pages.score)"), json!(4));
        assert_eq!(eval_str("max(pages.score)"), json!(5));
        assert_eq!(eval_str("min(missing)"), Value::Null);
    }

    #[test]
    fn test_errors() {
        assert!(Formula::parse("1 +").is_err());
        assert!(Formula::parse("\"open").is_err());
        assert!(Formula::parse("").is_err());
        assert!(Formula::parse("a $ b").is_err());
        let unknown = Formula::parse("nope(1)").unwrap();
        assert!(matches!(unknown.eval(&ctx()), Err(BuildonomyError::Query(_))));
        assert!(Formula::parse("1 / 0").unwrap().eval(&ctx()).is_err());
        assert!(Formula::parse("title * 2").unwrap().eval(&ctx()).is_err());
    }
}
