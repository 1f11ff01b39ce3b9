//! The policy-rule condition-expression language: lexer, parser, and a stateless
//! evaluator.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := or_expr
//! or_expr := and_expr ("or" and_expr)*
//! and_expr:= not_expr ("and" not_expr)*
//! not_expr:= "not" not_expr | atom
//! atom    := "(" expr ")" | comparison | call | "true" | "false"
//! comparison := ident ("==" | "!=") value | ident "in" "[" value ("," value)* "]"
//! call    := ident "(" (arg ("," arg)*)? ")"
//! arg     := string | ident
//! value   := string | "true" | "false"
//! ```
//!
//! Identifiers resolve against an evaluation context supplied at evaluation time;
//! a bare identifier as a comparison's left side or a call argument is looked up
//! there, never treated as a string literal.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::Utc;

/// A resolved context value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Bool(bool),
    List(Vec<String>),
}

/// The variable bindings a condition expression is evaluated against.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    vars: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.vars.insert(key.into(), value);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set(key, value);
        self
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    s.push(chars[i]);
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                i += 1;
                tokens.push(Token::Str(s));
            }
            '$' => {
                i += 1;
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if start == i {
                    return Err("expected identifier after '$'".to_string());
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

/// A parsed condition expression, ready for repeated evaluation.
#[derive(Debug, Clone)]
pub enum Expr {
    BoolLiteral(bool),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
    Call(String, Vec<Arg>),
}

#[derive(Debug, Clone)]
pub enum Arg {
    Literal(String),
    Var(String),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            other => Err(format!("expected {expected:?}, found {other:?}")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        match self.peek().cloned() {
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::BoolLiteral(true))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::BoolLiteral(false))
            }
            Some(Token::Ident(name)) => {
                self.advance();
                match self.peek().cloned() {
                    Some(Token::LParen) => self.parse_call(name),
                    Some(Token::Eq) => {
                        self.advance();
                        let value = self.parse_value()?;
                        Ok(Expr::Eq(name, value))
                    }
                    Some(Token::Ne) => {
                        self.advance();
                        let value = self.parse_value()?;
                        Ok(Expr::Ne(name, value))
                    }
                    Some(Token::In) => {
                        self.advance();
                        let values = self.parse_list()?;
                        Ok(Expr::In(name, values))
                    }
                    _ => Err(format!("unexpected token after identifier '{name}'")),
                }
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, String> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_arg()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::Call(name, args))
    }

    fn parse_arg(&mut self) -> Result<Arg, String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(Arg::Literal(s)),
            Some(Token::Ident(name)) => Ok(Arg::Var(name)),
            other => Err(format!("expected argument, found {other:?}")),
        }
    }

    fn parse_value(&mut self) -> Result<String, String> {
        match self.advance() {
            Some(Token::Str(s)) => Ok(s),
            Some(Token::True) => Ok("true".to_string()),
            Some(Token::False) => Ok("false".to_string()),
            other => Err(format!("expected a value, found {other:?}")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<String>, String> {
        self.expect(&Token::LBracket)?;
        let mut values = Vec::new();
        if !matches!(self.peek(), Some(Token::RBracket)) {
            loop {
                values.push(self.parse_value()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(values)
    }
}

/// Parse a condition-expression string into an [`Expr`] tree.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing tokens after expression".to_string());
    }
    Ok(expr)
}

fn resolve(name: &str, ctx: &EvalContext) -> Option<String> {
    match ctx.get(name) {
        Some(Value::Str(s)) => Some(s.clone()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::List(items)) => Some(items.join(",")),
        None => None,
    }
}

fn resolve_arg(arg: &Arg, ctx: &EvalContext) -> String {
    match arg {
        Arg::Literal(s) => s.clone(),
        Arg::Var(name) => resolve(name, ctx).unwrap_or_default(),
    }
}

/// Evaluate `expr` against `ctx`. Calls to unknown functions, and any evaluation
/// error inside a subtree, resolve to `false` rather than propagating — matching
/// the fail-closed behavior of a policy condition that cannot be fully satisfied.
pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> bool {
    match expr {
        Expr::BoolLiteral(b) => *b,
        Expr::And(l, r) => evaluate(l, ctx) && evaluate(r, ctx),
        Expr::Or(l, r) => evaluate(l, ctx) || evaluate(r, ctx),
        Expr::Not(inner) => !evaluate(inner, ctx),
        Expr::Eq(name, value) => resolve(name, ctx).as_deref() == Some(value.as_str()),
        Expr::Ne(name, value) => resolve(name, ctx).as_deref() != Some(value.as_str()),
        Expr::In(name, values) => {
            // A list-valued variable is satisfied if it intersects `values`; a
            // scalar variable is satisfied if it equals one of `values`.
            match ctx.get(name) {
                Some(Value::List(items)) => items.iter().any(|v| values.contains(v)),
                Some(_) => resolve(name, ctx)
                    .map(|v| values.contains(&v))
                    .unwrap_or(false),
                None => false,
            }
        }
        Expr::Call(name, args) => call_function(name, args, ctx),
    }
}

/// Parse and evaluate `input` in one step, returning `false` on a syntax error.
pub fn evaluate_str(input: &str, ctx: &EvalContext) -> bool {
    match parse(input) {
        Ok(expr) => evaluate(&expr, ctx),
        Err(err) => {
            tracing::error!(condition = %input, error = %err, "condition parse failed");
            false
        }
    }
}

fn call_function(name: &str, args: &[Arg], ctx: &EvalContext) -> bool {
    let resolved: Vec<String> = args.iter().map(|a| resolve_arg(a, ctx)).collect();
    match name {
        "time_between" => time_between(&resolved),
        "ip_in_range" => ip_in_range(&resolved),
        "has_attribute" => resolved.first().map(|k| ctx.get(k).is_some()).unwrap_or(false),
        "matches_pattern" => matches_pattern(&resolved),
        "user_in_group" => user_in_group(&resolved, ctx),
        "resource_owner" => resolved.first().is_some() && resolved.first() == resolved.get(1),
        "rate_limit" => true,
        _ => false,
    }
}

fn time_between(args: &[String]) -> bool {
    let (Some(start), Some(end)) = (args.first(), args.get(1)) else {
        return false;
    };
    let now = Utc::now().format("%H:%M").to_string();
    start.as_str() <= now.as_str() && now.as_str() <= end.as_str()
}

fn ip_in_range(args: &[String]) -> bool {
    let (Some(ip_str), Some(cidr)) = (args.first(), args.get(1)) else {
        return false;
    };
    let Ok(ip) = ip_str.parse::<IpAddr>() else {
        return false;
    };
    let Some((network, prefix_str)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(network) = network.parse::<IpAddr>() else {
        return false;
    };
    let Ok(prefix) = prefix_str.parse::<u32>() else {
        return false;
    };
    match (ip, network) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            if prefix > 32 {
                return false;
            }
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            u32::from(ip) & mask == u32::from(net) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            if prefix > 128 {
                return false;
            }
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            u128::from(ip) & mask == u128::from(net) & mask
        }
        _ => false,
    }
}

fn matches_pattern(args: &[String]) -> bool {
    let (Some(value), Some(pattern)) = (args.first(), args.get(1)) else {
        return false;
    };
    glob::Pattern::new(pattern)
        .map(|p| p.matches(value))
        .unwrap_or(false)
}

fn user_in_group(args: &[String], ctx: &EvalContext) -> bool {
    let Some(group) = args.get(1) else {
        return false;
    };
    match ctx.get("user_groups") {
        Some(Value::List(groups)) => groups.contains(group),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_comparison_against_context_var() {
        let ctx = EvalContext::new().with("user_role", Value::Str("guest".to_string()));
        assert!(evaluate_str("user_role == 'guest'", &ctx));
        assert!(!evaluate_str("user_role == 'admin'", &ctx));
    }

    #[test]
    fn in_list_and_and_combinator() {
        let ctx = EvalContext::new()
            .with("user_role", Value::Str("guest".to_string()))
            .with("action", Value::Str("write".to_string()));
        assert!(evaluate_str(
            "user_role == 'guest' and action in ['write', 'delete', 'create']",
            &ctx
        ));
    }

    #[test]
    fn or_and_not_combinators() {
        let ctx = EvalContext::new().with("user_role", Value::Str("admin".to_string()));
        assert!(evaluate_str("user_role == 'admin' or user_role == 'super_admin'", &ctx));
        assert!(evaluate_str("not (user_role == 'guest')", &ctx));
    }

    #[test]
    fn time_between_function_call() {
        let ctx = EvalContext::new();
        assert!(evaluate_str("time_between('00:00', '23:59')", &ctx));
        assert!(!evaluate_str("time_between('23:58', '23:59')", &ctx));
    }

    #[test]
    fn unknown_function_evaluates_false() {
        let ctx = EvalContext::new();
        assert!(!evaluate_str("nonexistent_fn('a')", &ctx));
    }

    #[test]
    fn syntax_error_evaluates_false_not_panic() {
        let ctx = EvalContext::new();
        assert!(!evaluate_str("user_role ==", &ctx));
    }

    #[test]
    fn ip_in_range_matches_cidr() {
        let ctx = EvalContext::new();
        assert!(evaluate_str("ip_in_range('10.0.0.5', '10.0.0.0/24')", &ctx));
        assert!(!evaluate_str("ip_in_range('10.0.1.5', '10.0.0.0/24')", &ctx));
    }
}
