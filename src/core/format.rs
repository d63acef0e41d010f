//! Predicate format strings
//!
//! Compiles expressions such as `"%K = %@"` or `"level >= 6 AND NOT type.name == 'Water'"`
//! into a [`Predicate`] tree. Placeholders are positional:
//!
//! - `%K` consumes a string argument and uses it as a key path
//! - `%@`, `%d`, `%i`, `%ld`, `%f` consume any argument as a value
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! expr       := and (("OR" | "||") and)*
//! and        := unary (("AND" | "&&") unary)*
//! unary      := ("NOT" | "!") unary | primary
//! primary    := "(" expr ")" | TRUEPREDICATE | FALSEPREDICATE | comparison
//! comparison := keypath operator value
//! ```

use crate::core::error::QueryError;
use crate::core::field::{FieldPath, FieldValue};
use crate::core::predicate::{ComparisonOperator, Predicate};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    KeyPlaceholder,
    ValuePlaceholder,
    Operator(ComparisonOperator),
    And,
    Or,
    Not,
    LParen,
    RParen,
    Literal(FieldValue),
    KeyPath(String),
    True,
    False,
}

fn token_regex() -> &'static Regex {
    static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
    TOKEN_REGEX.get_or_init(|| {
        Regex::new(concat!(
            r#"^\s*(?:"#,
            r#"(?P<ph>%(?:K|@|d|i|f|ld|lld))"#,
            r#"|(?P<op>==|!=|<>|<=|>=|=<|=>|=|<|>)"#,
            r#"|(?P<logic>&&|\|\||!)"#,
            r#"|(?P<lparen>\()|(?P<rparen>\))"#,
            r#"|(?P<num>-?\d+(?:\.\d+)?)"#,
            r#"|(?P<str>"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')"#,
            r#"|(?P<ident>[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)"#,
            r#")"#
        ))
        .expect("predicate token regex is valid")
    })
}

fn parse_error(format: &str, offset: usize, message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        format: format.to_string(),
        offset,
        message: message.into(),
    }
}

fn unquote(raw: &str) -> String {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn keyword(ident: &str) -> Option<Token> {
    match ident.to_ascii_uppercase().as_str() {
        "AND" => Some(Token::And),
        "OR" => Some(Token::Or),
        "NOT" => Some(Token::Not),
        "TRUEPREDICATE" => Some(Token::True),
        "FALSEPREDICATE" => Some(Token::False),
        "TRUE" | "YES" => Some(Token::Literal(FieldValue::Boolean(true))),
        "FALSE" | "NO" => Some(Token::Literal(FieldValue::Boolean(false))),
        "NIL" | "NULL" => Some(Token::Literal(FieldValue::Null)),
        _ => None,
    }
}

fn tokenize(format: &str) -> Result<Vec<(usize, Token)>, QueryError> {
    let regex = token_regex();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < format.len() {
        let rest = &format[pos..];
        if rest.trim().is_empty() {
            break;
        }
        let skipped = rest.len() - rest.trim_start().len();
        let caps = regex
            .captures(rest)
            .ok_or_else(|| parse_error(format, pos + skipped, "unexpected character"))?;
        let whole = caps.get(0).map_or(0, |m| m.end());

        let (start, token) = if let Some(m) = caps.name("ph") {
            let token = if m.as_str() == "%K" {
                Token::KeyPlaceholder
            } else {
                Token::ValuePlaceholder
            };
            (m.start(), token)
        } else if let Some(m) = caps.name("op") {
            (m.start(), Token::Operator(m.as_str().parse()?))
        } else if let Some(m) = caps.name("logic") {
            let token = match m.as_str() {
                "&&" => Token::And,
                "||" => Token::Or,
                _ => Token::Not,
            };
            (m.start(), token)
        } else if let Some(m) = caps.name("lparen") {
            (m.start(), Token::LParen)
        } else if let Some(m) = caps.name("rparen") {
            (m.start(), Token::RParen)
        } else if let Some(m) = caps.name("num") {
            let text = m.as_str();
            let value = if text.contains('.') {
                text.parse::<f64>().map(FieldValue::Float).ok()
            } else {
                text.parse::<i64>().map(FieldValue::Integer).ok()
            }
            .ok_or_else(|| parse_error(format, pos + m.start(), "number out of range"))?;
            (m.start(), Token::Literal(value))
        } else if let Some(m) = caps.name("str") {
            (m.start(), Token::Literal(FieldValue::String(unquote(m.as_str()))))
        } else if let Some(m) = caps.name("ident") {
            let token = keyword(m.as_str()).unwrap_or_else(|| Token::KeyPath(m.as_str().to_string()));
            (m.start(), token)
        } else {
            return Err(parse_error(format, pos + skipped, "unexpected character"));
        };

        tokens.push((pos + start, token));
        pos += whole;
    }

    Ok(tokens)
}

struct Parser<'a> {
    format: &'a str,
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    args: &'a [FieldValue],
    next_arg: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map_or(self.format.len(), |(offset, _)| *offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, t)| t.clone());
        self.cursor += 1;
        token
    }

    fn take_arg(&mut self) -> Result<FieldValue, QueryError> {
        let arg = self
            .args
            .get(self.next_arg)
            .cloned()
            .ok_or(QueryError::MissingArgument {
                index: self.next_arg,
                supplied: self.args.len(),
            })?;
        self.next_arg += 1;
        Ok(arg)
    }

    fn expr(&mut self) -> Result<Predicate, QueryError> {
        let mut children = vec![self.and()?];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            children.push(self.and()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Predicate::Or(children)
        })
    }

    fn and(&mut self) -> Result<Predicate, QueryError> {
        let mut children = vec![self.unary()?];
        while self.peek() == Some(&Token::And) {
            self.advance();
            children.push(self.unary()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Predicate::And(children)
        })
    }

    fn unary(&mut self) -> Result<Predicate, QueryError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Predicate::not(self.unary()?));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Predicate, QueryError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(parse_error(self.format, offset, "unbalanced parenthesis")),
                }
            }
            Some(Token::True) => Ok(Predicate::And(Vec::new())),
            Some(Token::False) => Ok(Predicate::Or(Vec::new())),
            Some(Token::KeyPath(path)) => {
                let path = FieldPath::parse(&path)?;
                self.comparison(path)
            }
            Some(Token::KeyPlaceholder) => {
                let arg = self.take_arg()?;
                let key = arg
                    .as_string()
                    .ok_or_else(|| parse_error(self.format, offset, "%K expects a string argument"))?;
                let path = FieldPath::parse(key)?;
                self.comparison(path)
            }
            Some(_) => Err(parse_error(self.format, offset, "expected a key path")),
            None => Err(parse_error(self.format, offset, "unexpected end of input")),
        }
    }

    fn comparison(&mut self, path: FieldPath) -> Result<Predicate, QueryError> {
        let offset = self.offset();
        let operator = match self.advance() {
            Some(Token::Operator(op)) => op,
            _ => return Err(parse_error(self.format, offset, "expected a comparison operator")),
        };
        let offset = self.offset();
        let value = match self.advance() {
            Some(Token::ValuePlaceholder) => self.take_arg()?,
            Some(Token::Literal(value)) => value,
            _ => return Err(parse_error(self.format, offset, "expected a value")),
        };
        Ok(Predicate::Comparison {
            path,
            operator,
            value,
        })
    }
}

impl Predicate {
    /// Compile a predicate format string with positional arguments
    pub fn format(format: &str, args: &[FieldValue]) -> Result<Predicate, QueryError> {
        let tokens = tokenize(format)?;
        if tokens.is_empty() {
            return Err(parse_error(format, 0, "empty predicate"));
        }
        let mut parser = Parser {
            format,
            tokens,
            cursor: 0,
            args,
            next_arg: 0,
        };
        let predicate = parser.expr()?;
        if parser.cursor < parser.tokens.len() {
            return Err(parse_error(format, parser.offset(), "unexpected trailing input"));
        }
        Ok(predicate)
    }
}
