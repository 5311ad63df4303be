//! Inline alert handlers, reduced to inert data directives.
//!
//! Generated content may attach `onclick="alert(...)"` to buttons for harmless feedback such
//! as dice rolls. The handler is never kept. When its decoded text is exactly one `alert`
//! call over string literals, numbers and allow-listed `Math` members, the sanitizer emits
//! [`DIRECTIVE_TYPE_ATTR`] and [`DIRECTIVE_MESSAGE_ATTR`] instead, and the trusted side
//! evaluates the message with [`AlertDirective::resolve`].

use crate::error::{MarkupError, MarkupResult};
use crate::fragment::Element;
use rand::Rng;
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;

pub const DIRECTIVE_TYPE_ATTR: &str = "data-directive";
pub const DIRECTIVE_MESSAGE_ATTR: &str = "data-directive-message";
pub const ALERT_DIRECTIVE: &str = "alert";

/// The only `Math` members a directive may reference.
pub const MATH_ALLOW_LIST: &[&str] = &[
    "floor", "ceil", "round", "random", "abs", "min", "max", "pow", "sqrt", "sign",
];

const MAX_HANDLER_LEN: usize = 512;
const MAX_EXPR_DEPTH: usize = 32;
const MAX_DECODE_PASSES: usize = 4;

fn forbidden_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(eval|function|constructor|prototype|__proto__|window|document|globalthis|self|top|parent|frames|opener|location|navigator|cookie|localstorage|sessionstorage|indexeddb|caches|fetch|xmlhttprequest|websocket|import|require|script|settimeout|setinterval|reflect|proxy|object|this|atob|btoa)\b",
        )
        .expect("valid forbidden-reference regex")
    })
}

fn js_escape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\\x([0-9a-fA-F]{2})|\\u\{([0-9a-fA-F]{1,6})\}|\\u([0-9a-fA-F]{4})")
            .expect("valid escape regex")
    })
}

/// A vetted alert directive carried as data on a sanitized element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertDirective {
    /// The literal argument text of the original `alert(...)` call.
    pub message: String,
}

impl AlertDirective {
    /// Reads the directive attributes of a sanitized element.
    pub fn from_element(el: &Element) -> Option<Self> {
        if el.attr(DIRECTIVE_TYPE_ATTR)? != ALERT_DIRECTIVE {
            return None;
        }
        el.attr(DIRECTIVE_MESSAGE_ATTR).map(|m| AlertDirective {
            message: m.to_string(),
        })
    }

    /// Evaluates the message into display text. `Math.random()` draws from `rng`.
    ///
    /// A numeric result that is not finite (`1/0`, `Math.sqrt(-1)`) is an evaluation error.
    pub fn resolve<R: Rng>(&self, rng: &mut R) -> MarkupResult<String> {
        let expr = parse_expression(&self.message)?;
        match expr.eval(rng) {
            Value::Num(n) if !n.is_finite() => Err(MarkupError::DirectiveEvaluation(format!(
                "'{}' evaluated to {}",
                self.message,
                format_number(n)
            ))),
            value => Ok(value.into_display()),
        }
    }
}

/// Checks an inline handler against the alert grammar.
pub fn parse_alert(handler: &str) -> MarkupResult<AlertDirective> {
    if handler.len() > MAX_HANDLER_LEN {
        return Err(rejected("handler too long"));
    }
    let decoded = normalize_escapes(handler);
    if let Some(m) = forbidden_re().find(&decoded) {
        return Err(rejected(&format!("forbidden reference '{}'", m.as_str())));
    }

    let body = decoded.trim();
    let body = body.strip_suffix(';').unwrap_or(body).trim_end();
    if body.contains(';') {
        return Err(rejected("statement separator"));
    }
    let inner = body
        .strip_prefix("alert")
        .map(str::trim_start)
        .and_then(|s| s.strip_prefix('('))
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| rejected("not a single alert call"))?;

    parse_expression(inner)?;
    Ok(AlertDirective {
        message: inner.trim().to_string(),
    })
}

/// Undoes hexadecimal, Unicode and character-reference escapes until the text is stable.
pub fn normalize_escapes(input: &str) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let decoded = js_escape_re()
            .replace_all(&current, |caps: &Captures| {
                caps.iter()
                    .skip(1)
                    .flatten()
                    .next()
                    .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default()
            })
            .into_owned();
        let decoded = crate::parser::decode_entities(&decoded).into_owned();
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

fn rejected(reason: &str) -> MarkupError {
    MarkupError::DirectiveRejected {
        reason: reason.to_string(),
    }
}

// ─── Expression grammar ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(char),
}

fn tokenize(src: &str) -> MarkupResult<Vec<Tok>> {
    let mut toks = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut end = i;
                while let Some(&(j, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = j + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &src[start..end];
                if text == "." {
                    toks.push(Tok::Op('.'));
                } else {
                    let n = text
                        .parse::<f64>()
                        .map_err(|_| rejected(&format!("bad number '{}'", text)))?;
                    toks.push(Tok::Num(n));
                }
            }
            '\'' | '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, d) in chars.by_ref() {
                    if d == c {
                        closed = true;
                        break;
                    }
                    if d == '\\' {
                        return Err(rejected("escape inside string literal"));
                    }
                    s.push(d);
                }
                if !closed {
                    return Err(rejected("unterminated string literal"));
                }
                toks.push(Tok::Str(s));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                toks.push(Tok::Ident(ident));
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' | ',' => {
                toks.push(Tok::Op(c));
                chars.next();
            }
            other => return Err(rejected(&format!("unexpected character '{}'", other))),
        }
    }
    Ok(toks)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Str(String),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Math(String, Vec<Expr>),
}

fn parse_expression(src: &str) -> MarkupResult<Expr> {
    let toks = tokenize(src)?;
    if toks.is_empty() {
        return Err(rejected("empty argument"));
    }
    let mut parser = ExprParser { toks, pos: 0 };
    let expr = parser.additive(0)?;
    if parser.pos != parser.toks.len() {
        return Err(rejected("trailing tokens after argument"));
    }
    Ok(expr)
}

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect_op(&mut self, op: char) -> MarkupResult<()> {
        match self.next() {
            Some(Tok::Op(c)) if c == op => Ok(()),
            _ => Err(rejected(&format!("expected '{}'", op))),
        }
    }

    fn additive(&mut self, depth: usize) -> MarkupResult<Expr> {
        if depth > MAX_EXPR_DEPTH {
            return Err(rejected("expression nested too deeply"));
        }
        let mut lhs = self.multiplicative(depth)?;
        while let Some(Tok::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.multiplicative(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self, depth: usize) -> MarkupResult<Expr> {
        let mut lhs = self.unary(depth)?;
        while let Some(Tok::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary(depth)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self, depth: usize) -> MarkupResult<Expr> {
        if depth > MAX_EXPR_DEPTH {
            return Err(rejected("expression nested too deeply"));
        }
        match self.peek() {
            Some(Tok::Op('-')) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary(depth + 1)?)))
            }
            Some(Tok::Op('+')) => {
                self.pos += 1;
                self.unary(depth + 1)
            }
            _ => self.primary(depth),
        }
    }

    fn primary(&mut self, depth: usize) -> MarkupResult<Expr> {
        match self.next() {
            Some(Tok::Num(n)) => Ok(Expr::Num(n)),
            Some(Tok::Str(s)) => Ok(Expr::Str(s)),
            Some(Tok::Op('(')) => {
                let inner = self.additive(depth + 1)?;
                self.expect_op(')')?;
                Ok(inner)
            }
            Some(Tok::Ident(ident)) if ident == "Math" => {
                self.expect_op('.')?;
                let member = match self.next() {
                    Some(Tok::Ident(m)) if MATH_ALLOW_LIST.contains(&m.as_str()) => m,
                    Some(Tok::Ident(m)) => {
                        return Err(rejected(&format!("Math.{} is not allowed", m)))
                    }
                    _ => return Err(rejected("expected Math member")),
                };
                self.expect_op('(')?;
                let mut args = Vec::new();
                if self.peek() != Some(&Tok::Op(')')) {
                    loop {
                        args.push(self.additive(depth + 1)?);
                        if self.peek() == Some(&Tok::Op(',')) {
                            self.pos += 1;
                            continue;
                        }
                        break;
                    }
                }
                self.expect_op(')')?;
                check_arity(&member, args.len())?;
                Ok(Expr::Math(member, args))
            }
            Some(Tok::Ident(ident)) => Err(rejected(&format!("identifier '{}' is not allowed", ident))),
            _ => Err(rejected("unexpected token")),
        }
    }
}

fn check_arity(member: &str, n: usize) -> MarkupResult<()> {
    let ok = match member {
        "random" => n == 0,
        "pow" => n == 2,
        "min" | "max" => n >= 1,
        _ => n == 1,
    };
    if ok {
        Ok(())
    } else {
        Err(rejected(&format!("wrong argument count for Math.{}", member)))
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Num(f64),
    Str(String),
}

impl Value {
    fn as_num(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn into_display(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Num(n) => format_number(n),
        }
    }
}

/// Formats a number the way a script console would (`3`, not `3.0`).
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl Expr {
    fn eval<R: Rng>(&self, rng: &mut R) -> Value {
        match self {
            Expr::Num(n) => Value::Num(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Neg(inner) => Value::Num(-inner.eval(rng).as_num()),
            Expr::Binary(op, lhs, rhs) => {
                let l = lhs.eval(rng);
                let r = rhs.eval(rng);
                match (op, &l, &r) {
                    ('+', Value::Str(_), _) | ('+', _, Value::Str(_)) => {
                        Value::Str(l.into_display() + &r.into_display())
                    }
                    ('+', _, _) => Value::Num(l.as_num() + r.as_num()),
                    ('-', _, _) => Value::Num(l.as_num() - r.as_num()),
                    ('*', _, _) => Value::Num(l.as_num() * r.as_num()),
                    ('/', _, _) => Value::Num(l.as_num() / r.as_num()),
                    _ => Value::Num(l.as_num() % r.as_num()),
                }
            }
            Expr::Math(member, args) => {
                let nums: Vec<f64> = args.iter().map(|a| a.eval(rng).as_num()).collect();
                let first = nums.first().copied().unwrap_or(f64::NAN);
                let n = match member.as_str() {
                    "random" => rng.gen::<f64>(),
                    "floor" => first.floor(),
                    "ceil" => first.ceil(),
                    "round" => (first + 0.5).floor(),
                    "abs" => first.abs(),
                    "sqrt" => first.sqrt(),
                    "sign" => {
                        if first.is_nan() || first == 0.0 {
                            first
                        } else {
                            first.signum()
                        }
                    }
                    "pow" => first.powf(nums.get(1).copied().unwrap_or(f64::NAN)),
                    "min" => nums.iter().copied().fold(f64::INFINITY, f64::min),
                    "max" => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    _ => f64::NAN,
                };
                Value::Num(n)
            }
        }
    }
}
