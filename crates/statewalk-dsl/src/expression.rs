// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime expression parsing.
//!
//! Link definitions carry expressions as strings (`$response.body#/id`) or as
//! JSON structures whose string leaves are expressions. This module turns both
//! into [`Expression`] trees and renders them back.
//!
//! # Syntax
//!
//! | Form | Variant |
//! |------|---------|
//! | `$response.body#/id` | `ResponseBodyPointer` |
//! | `$response.header.Location` | `ResponseHeader` |
//! | `$response.header.Location#regex:/users/(.+)` | `ResponseHeaderRegex` |
//! | `$request.path.id`, `$request.query.q#regex:(\d+)` | `RequestParameter` |
//! | `$request.body#/name` | `RequestBodyPointer` |
//! | `$statusCode`, `$method`, `$url` | scalar variants |
//! | `user-{$response.body#/id}` | `Template` |
//!
//! Text without any `$` is a string literal.

use crate::{Composite, Expression, ParameterLocation};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Syntax errors in runtime expressions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ExpressionError {
    #[error("unknown expression in `{0}`")]
    UnknownExpression(String),

    #[error("unexpected end of expression `{0}`")]
    UnexpectedEnd(String),

    #[error("unmatched bracket at position {position} in `{expression}`")]
    UnmatchedBracket { expression: String, position: usize },

    #[error("nested embedded expressions are not supported: `{0}`")]
    NestedExpression(String),

    #[error("invalid JSON pointer `{pointer}`: must be empty or start with '/'")]
    InvalidPointer { pointer: String },

    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("regex `{pattern}` must contain exactly one capture group, found {groups}")]
    CaptureGroups { pattern: String, groups: usize },
}

pub type Result<T> = std::result::Result<T, ExpressionError>;

const REGEX_PREFIX: &str = "#regex:";

/// Parse a single expression string.
///
/// A string made of one expression yields that expression, plain text yields a
/// string `Literal`, and anything mixing both yields a `Template`.
pub fn parse_expression(input: &str) -> Result<Expression> {
    let mut parts = parse_template(input)?;
    Ok(match parts.len() {
        0 => Expression::Literal {
            value: Value::String(String::new()),
        },
        1 => parts.remove(0),
        _ => Expression::Template { parts },
    })
}

/// Parse a string into its template parts: literal text and expressions.
pub fn parse_template(input: &str) -> Result<Vec<Expression>> {
    let mut parser = Parser::new(input);
    let mut parts = Vec::new();
    let mut text = String::new();

    while let Some(c) = parser.peek() {
        match c {
            '$' => {
                flush_text(&mut text, &mut parts);
                parts.push(parser.expression(false)?);
            }
            '{' => {
                flush_text(&mut text, &mut parts);
                let open = parser.pos;
                parser.bump();
                match parser.peek() {
                    Some('$') => {}
                    Some('{') => return Err(ExpressionError::NestedExpression(input.to_string())),
                    _ => return Err(parser.unmatched(open)),
                }
                parts.push(parser.expression(true)?);
                match parser.peek() {
                    Some('}') => {
                        parser.bump();
                    }
                    Some('{') => return Err(ExpressionError::NestedExpression(input.to_string())),
                    _ => return Err(parser.unmatched(open)),
                }
            }
            '}' => return Err(parser.unmatched(parser.pos)),
            _ => {
                text.push(c);
                parser.bump();
            }
        }
    }
    flush_text(&mut text, &mut parts);
    Ok(parts)
}

/// Parse a JSON value from a link definition.
///
/// Strings are parsed as expressions, objects and arrays become `Composite`
/// expressions and every other value is a `Literal`.
pub fn parse_value(value: &Value) -> Result<Expression> {
    match value {
        Value::String(s) => parse_expression(s),
        Value::Object(map) => {
            let mut fields = BTreeMap::new();
            for (key, value) in map {
                fields.insert(key.clone(), parse_value(value)?);
            }
            Ok(Expression::Composite {
                value: Composite::Object(fields),
            })
        }
        Value::Array(items) => Ok(Expression::Composite {
            value: Composite::Array(items.iter().map(parse_value).collect::<Result<_>>()?),
        }),
        other => Ok(Expression::Literal {
            value: other.clone(),
        }),
    }
}

/// Compile a regex and verify it has exactly one capture group.
pub fn validate_pattern(pattern: &str) -> Result<regex::Regex> {
    let compiled = regex::Regex::new(pattern).map_err(|e| ExpressionError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let groups = compiled.captures_len() - 1;
    if groups != 1 {
        return Err(ExpressionError::CaptureGroups {
            pattern: pattern.to_string(),
            groups,
        });
    }
    Ok(compiled)
}

fn flush_text(text: &mut String, parts: &mut Vec<Expression>) {
    if !text.is_empty() {
        parts.push(Expression::Literal {
            value: Value::String(std::mem::take(text)),
        });
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn unknown(&self) -> ExpressionError {
        ExpressionError::UnknownExpression(self.input.to_string())
    }

    fn unmatched(&self, position: usize) -> ExpressionError {
        ExpressionError::UnmatchedBracket {
            expression: self.input.to_string(),
            position,
        }
    }

    fn expect_dot(&mut self) -> Result<()> {
        match self.bump() {
            Some('.') => Ok(()),
            Some(_) => Err(self.unknown()),
            None => Err(ExpressionError::UnexpectedEnd(self.input.to_string())),
        }
    }

    fn word(&mut self) -> &'a str {
        self.take_while(|c| c.is_ascii_alphanumeric())
    }

    fn name(&mut self) -> Result<String> {
        let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if name.is_empty() {
            return Err(ExpressionError::UnexpectedEnd(self.input.to_string()));
        }
        Ok(name.to_string())
    }

    /// Parse one `$...` expression. Inside `{...}` a `}` terminates it.
    fn expression(&mut self, embedded: bool) -> Result<Expression> {
        self.bump();
        match self.word() {
            "url" => Ok(Expression::Url),
            "method" => Ok(Expression::Method),
            "statusCode" => Ok(Expression::StatusCode),
            "response" => {
                self.expect_dot()?;
                match self.word() {
                    "body" => Ok(Expression::ResponseBodyPointer {
                        pointer: self.pointer(embedded)?,
                    }),
                    "header" => {
                        self.expect_dot()?;
                        let header = self.name()?;
                        Ok(match self.regex(embedded)? {
                            Some(pattern) => Expression::ResponseHeaderRegex { header, pattern },
                            None => Expression::ResponseHeader { header },
                        })
                    }
                    _ => Err(self.unknown()),
                }
            }
            "request" => {
                self.expect_dot()?;
                let source = self.word();
                if source == "body" {
                    return Ok(Expression::RequestBodyPointer {
                        pointer: self.pointer(embedded)?,
                    });
                }
                let location: ParameterLocation = source.parse().map_err(|_| self.unknown())?;
                self.expect_dot()?;
                let name = self.name()?;
                let pattern = self.regex(embedded)?;
                Ok(Expression::RequestParameter {
                    location,
                    name,
                    pattern,
                })
            }
            "" => Err(ExpressionError::UnexpectedEnd(self.input.to_string())),
            _ => Err(self.unknown()),
        }
    }

    fn pointer(&mut self, embedded: bool) -> Result<String> {
        if self.peek() != Some('#') {
            return Ok(String::new());
        }
        self.bump();
        let pointer = if embedded {
            let pointer = self.take_while(|c| c != '}' && c != '{');
            if self.peek() == Some('{') {
                return Err(ExpressionError::NestedExpression(self.input.to_string()));
            }
            pointer
        } else {
            let pointer = self.rest();
            self.pos = self.input.len();
            pointer
        };
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(ExpressionError::InvalidPointer {
                pointer: pointer.to_string(),
            });
        }
        Ok(pointer.to_string())
    }

    fn regex(&mut self, embedded: bool) -> Result<Option<String>> {
        if self.peek() != Some('#') {
            return Ok(None);
        }
        if !self.rest().starts_with(REGEX_PREFIX) {
            return Err(self.unknown());
        }
        self.pos += REGEX_PREFIX.len();

        let pattern = if embedded {
            // Braces belonging to the regex (`\d{3}`) are balanced; the first
            // unbalanced `}` closes the embedded expression.
            let start = self.pos;
            let mut depth = 0usize;
            while let Some(c) = self.peek() {
                match c {
                    '{' => depth += 1,
                    '}' if depth == 0 => break,
                    '}' => depth -= 1,
                    _ => {}
                }
                self.bump();
            }
            &self.input[start..self.pos]
        } else {
            let pattern = self.rest();
            self.pos = self.input.len();
            pattern
        };
        validate_pattern(pattern)?;
        Ok(Some(pattern.to_string()))
    }
}

// ============================================================================
// Rendering
// ============================================================================

impl Expression {
    /// Render back to the JSON shape used in link definitions.
    pub fn to_value(&self) -> Value {
        match self {
            Expression::Literal { value } => value.clone(),
            Expression::Composite {
                value: Composite::Object(fields),
            } => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Expression::Composite {
                value: Composite::Array(items),
            } => Value::Array(items.iter().map(Expression::to_value).collect()),
            other => Value::String(other.to_string()),
        }
    }

    /// Whether evaluating this expression needs a response or request.
    pub fn is_constant(&self) -> bool {
        match self {
            Expression::Literal { .. } => true,
            Expression::Template { parts } => parts.iter().all(Expression::is_constant),
            Expression::Composite {
                value: Composite::Object(fields),
            } => fields.values().all(Expression::is_constant),
            Expression::Composite {
                value: Composite::Array(items),
            } => items.iter().all(Expression::is_constant),
            _ => false,
        }
    }
}

fn write_regex(f: &mut fmt::Formatter<'_>, pattern: &Option<String>) -> fmt::Result {
    match pattern {
        Some(p) => write!(f, "{}{}", REGEX_PREFIX, p),
        None => Ok(()),
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal {
                value: Value::String(s),
            } => f.write_str(s),
            Expression::Literal { value } => write!(f, "{}", value),
            Expression::ResponseBodyPointer { pointer } if pointer.is_empty() => {
                f.write_str("$response.body")
            }
            Expression::ResponseBodyPointer { pointer } => write!(f, "$response.body#{}", pointer),
            Expression::ResponseHeader { header } => write!(f, "$response.header.{}", header),
            Expression::ResponseHeaderRegex { header, pattern } => {
                write!(f, "$response.header.{}{}{}", header, REGEX_PREFIX, pattern)
            }
            Expression::RequestParameter {
                location,
                name,
                pattern,
            } => {
                write!(f, "$request.{}.{}", location, name)?;
                write_regex(f, pattern)
            }
            Expression::RequestBodyPointer { pointer } if pointer.is_empty() => {
                f.write_str("$request.body")
            }
            Expression::RequestBodyPointer { pointer } => write!(f, "$request.body#{}", pointer),
            Expression::StatusCode => f.write_str("$statusCode"),
            Expression::Method => f.write_str("$method"),
            Expression::Url => f.write_str("$url"),
            Expression::Template { parts } => {
                for part in parts {
                    match part {
                        Expression::Literal { .. } => write!(f, "{}", part)?,
                        other => write!(f, "{{{}}}", other)?,
                    }
                }
                Ok(())
            }
            Expression::Composite { .. } => write!(f, "{}", self.to_value()),
        }
    }
}
