//! Query text parsing

use crate::error::AppError;
use crate::macros::scanner;
use crate::models::{Clause, RangeOp};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref FIELD_NAME: Regex =
        Regex::new(r"^[A-Za-z_@][A-Za-z0-9_.@-]*$").expect("field name pattern is valid");
}

/// Malformed query text, reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the (expanded) query text
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        AppError::InvalidQuery(err.to_string())
    }
}

/// Turns expanded query text into a base clause.
pub trait QueryParser: Send + Sync {
    /// `Ok(None)` means the text places no restriction on results
    fn parse(&self, text: &str) -> Result<Option<Clause>, ParseError>;
}

/// Parser for the platform's field-term query syntax.
///
/// Whitespace-separated terms are ANDed together:
///
/// ```text
/// status:fixed            term
/// count:>=10              range (>, >=, <, <=)
/// message:"disk full"     phrase on a field
/// "disk full"             phrase on any field
/// timeout                 free text
/// -is_hidden:true         negation
/// ```
///
/// `AND` between terms is accepted and ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermQueryParser;

impl TermQueryParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_token(&self, text: &str, start: usize) -> Result<Clause, ParseError> {
        let (negated, body, offset) = match text.strip_prefix('-') {
            Some(rest) if !rest.is_empty() => (true, rest, start + 1),
            _ => (false, text, start),
        };

        let clause = if body.starts_with('"') {
            Clause::Phrase {
                field: None,
                text: unquote(body, offset)?.to_string(),
            }
        } else if let Some((field, value)) = body.split_once(':') {
            self.parse_field(field, value, offset)?
        } else {
            Clause::Match {
                text: body.to_string(),
            }
        };

        Ok(if negated { clause.negate() } else { clause })
    }

    fn parse_field(&self, field: &str, value: &str, offset: usize) -> Result<Clause, ParseError> {
        if field.is_empty() {
            return Err(ParseError::new("missing field name before ':'", offset));
        }
        if !FIELD_NAME.is_match(field) {
            return Err(ParseError::new(format!("invalid field name '{}'", field), offset));
        }

        let value_offset = offset + field.len() + 1;
        if value.is_empty() {
            return Err(ParseError::new(
                format!("missing value for field '{}'", field),
                value_offset,
            ));
        }

        if value.starts_with('"') {
            return Ok(Clause::Phrase {
                field: Some(field.to_string()),
                text: unquote(value, value_offset)?.to_string(),
            });
        }

        if let Some((op, bound)) = split_range(value) {
            if bound.is_empty() {
                return Err(ParseError::new(
                    format!("missing bound for range on field '{}'", field),
                    value_offset,
                ));
            }
            return Ok(Clause::range(field, op, bound));
        }

        Ok(Clause::term(field, value))
    }
}

impl QueryParser for TermQueryParser {
    fn parse(&self, text: &str) -> Result<Option<Clause>, ParseError> {
        let mut clauses = Vec::new();

        for token in scanner::tokens(text) {
            if token.unterminated {
                return Err(ParseError::new("unterminated quote", token.start));
            }

            let raw = token.text(text);
            if raw == "AND" {
                continue;
            }

            clauses.push(self.parse_token(raw, token.start)?);
        }

        Ok(Clause::all(clauses))
    }
}

fn split_range(value: &str) -> Option<(RangeOp, &str)> {
    [
        (">=", RangeOp::Gte),
        ("<=", RangeOp::Lte),
        (">", RangeOp::Gt),
        ("<", RangeOp::Lt),
    ]
    .into_iter()
    .find_map(|(prefix, op)| value.strip_prefix(prefix).map(|bound| (op, bound)))
}

fn unquote(text: &str, offset: usize) -> Result<&str, ParseError> {
    if text.len() < 2 || !text.ends_with('"') {
        return Err(ParseError::new("unterminated quote", offset));
    }

    let inner = &text[1..text.len() - 1];
    if inner.contains('"') {
        return Err(ParseError::new("unexpected quote inside phrase", offset));
    }
    Ok(inner)
}
