//! Boolean filter expressions over filterable fields.
//!
//! ```text
//! expr    := or
//! or      := and ( "or" and )*
//! and     := unary ( "and" unary )*
//! unary   := "not" unary | "(" expr ")" | compare
//! compare := IDENT ("eq" | "ne") literal
//! literal := 'quoted, '' escapes a quote' | integer | float
//! ```
//!
//! Keywords are case-insensitive. `Display` renders an expression back into
//! this grammar, so `Filter::eq(field, value).to_string()` is always parseable.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{IndexError, Result};
use crate::schema::{FieldType, IndexSchema};
use crate::types::{FieldValue, IndexedDocument};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Int64(i64),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare { field: String, op: CompareOp, value: Literal },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl Filter {
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(IndexError::InvalidFilter(format!("unexpected {tok} in '{input}'")));
        }
        Ok(filter)
    }

    /// `field eq 'value'`
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Compare { field: field.into(), op: CompareOp::Eq, value: Literal::String(value.into()) }
    }

    pub fn and(self, other: Filter) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Names of every field the expression references, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { field, .. } => out.push(field),
            Self::And(a, b) | Self::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Reject references to undeclared or non-filterable fields and literals
    /// whose type cannot match the field.
    pub fn validate(&self, schema: &IndexSchema) -> Result<()> {
        match self {
            Self::Compare { field, value, .. } => {
                let spec = schema.field(schema.resolve_field(field)).ok_or_else(|| {
                    IndexError::InvalidFilter(format!("index '{}' has no field '{field}'", schema.name))
                })?;
                if !spec.filterable {
                    return Err(IndexError::InvalidFilter(format!("field '{field}' is not filterable")));
                }
                let compatible = match (spec.field_type, value) {
                    (FieldType::String, Literal::String(_))
                    | (FieldType::Int64, Literal::Int64(_))
                    | (FieldType::Double, Literal::Int64(_) | Literal::Double(_)) => true,
                    (FieldType::DateTimeOffset, Literal::String(s)) => parse_datetime(s).is_some(),
                    _ => false,
                };
                if compatible {
                    Ok(())
                } else {
                    Err(IndexError::InvalidFilter(format!(
                        "literal {value} cannot be compared with {:?} field '{field}'",
                        spec.field_type
                    )))
                }
            }
            Self::And(a, b) | Self::Or(a, b) => {
                a.validate(schema)?;
                b.validate(schema)
            }
            Self::Not(inner) => inner.validate(schema),
        }
    }

    /// Evaluate against a document. A field the document lacks never equals
    /// anything.
    pub fn matches(&self, doc: &IndexedDocument, schema: &IndexSchema) -> bool {
        match self {
            Self::Compare { field, op, value } => {
                let equal = doc.value_of(schema, schema.resolve_field(field)).is_some_and(|v| literal_equals(&v, value));
                match op {
                    CompareOp::Eq => equal,
                    CompareOp::Ne => !equal,
                }
            }
            Self::And(a, b) => a.matches(doc, schema) && b.matches(doc, schema),
            Self::Or(a, b) => a.matches(doc, schema) || b.matches(doc, schema),
            Self::Not(inner) => !inner.matches(doc, schema),
        }
    }
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&Utc))
}

#[allow(clippy::float_cmp, clippy::cast_precision_loss)]
fn literal_equals(value: &FieldValue, literal: &Literal) -> bool {
    match (value, literal) {
        (FieldValue::String(v), Literal::String(l)) => v == l,
        (FieldValue::Int64(v), Literal::Int64(l)) => v == l,
        (FieldValue::Double(v), Literal::Int64(l)) => *v == *l as f64,
        (FieldValue::Double(v), Literal::Double(l)) => v == l,
        (FieldValue::DateTime(v), Literal::String(l)) => parse_datetime(l).is_some_and(|l| *v == l),
        _ => false,
    }
}

impl FromStr for Filter {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(&quote(s)),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { field, op, value } => {
                let op = match op {
                    CompareOp::Eq => "eq",
                    CompareOp::Ne => "ne",
                };
                write!(f, "{field} {op} {value}")
            }
            Self::And(a, b) => {
                write_operand(f, a, matches!(**a, Self::Or(..)))?;
                f.write_str(" and ")?;
                write_operand(f, b, matches!(**b, Self::Or(..) | Self::And(..)))
            }
            Self::Or(a, b) => {
                write_operand(f, a, false)?;
                f.write_str(" or ")?;
                write_operand(f, b, matches!(**b, Self::Or(..)))
            }
            Self::Not(inner) => {
                f.write_str("not ")?;
                write_operand(f, inner, !matches!(**inner, Self::Compare { .. }))
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, filter: &Filter, parens: bool) -> fmt::Result {
    if parens {
        write!(f, "({filter})")
    } else {
        write!(f, "{filter}")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "'{s}'"),
            Self::Str(s) => write!(f, "string {}", quote(s)),
            Self::Int(v) => write!(f, "number {v}"),
            Self::Float(v) => write!(f, "number {v}"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == '\'' {
                        if chars.peek().is_some_and(|&(_, n)| n == '\'') {
                            chars.next();
                            value.push('\'');
                        } else {
                            closed = true;
                            break;
                        }
                    } else {
                        value.push(c);
                    }
                }
                if !closed {
                    return Err(IndexError::InvalidFilter(format!(
                        "unterminated string literal starting at {start}"
                    )));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' || (i == start && c == '-') {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &input[start..end];
                let token = if text.contains('.') {
                    text.parse().map(Token::Float).ok()
                } else {
                    text.parse().map(Token::Int).ok()
                };
                tokens.push(token.ok_or_else(|| {
                    IndexError::InvalidFilter(format!("invalid number '{text}' at {start}"))
                })?);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '/' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
            }
            other => {
                return Err(IndexError::InvalidFilter(format!("unexpected character '{other}' at {start}")))
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn parse_or(&mut self) -> Result<Filter> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Filter> {
        let mut left = self.parse_unary()?;
        while self.eat_keyword("and") {
            let right = self.parse_unary()?;
            left = left.and(right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Filter> {
        if self.eat_keyword("not") {
            return Ok(self.parse_unary()?.negate());
        }
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(IndexError::InvalidFilter(format!("expected ')', found {tok}"))),
                    None => Err(IndexError::InvalidFilter("expected ')', found end of input".to_string())),
                }
            }
            Some(Token::Ident(field)) => self.parse_compare(field),
            Some(tok) => Err(IndexError::InvalidFilter(format!("expected a field name, found {tok}"))),
            None => Err(IndexError::InvalidFilter("unexpected end of input".to_string())),
        }
    }

    fn parse_compare(&mut self, field: String) -> Result<Filter> {
        let op = if self.eat_keyword("eq") {
            CompareOp::Eq
        } else if self.eat_keyword("ne") {
            CompareOp::Ne
        } else {
            return Err(IndexError::InvalidFilter(format!(
                "expected 'eq' or 'ne' after field '{field}'"
            )));
        };
        let value = match self.next() {
            Some(Token::Str(s)) => Literal::String(s),
            Some(Token::Int(v)) => Literal::Int64(v),
            Some(Token::Float(v)) => Literal::Double(v),
            Some(tok) => {
                return Err(IndexError::InvalidFilter(format!("expected a literal after '{field}', found {tok}")))
            }
            None => return Err(IndexError::InvalidFilter(format!("missing literal after '{field}'"))),
        };
        Ok(Filter::Compare { field, op, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexSchema, CHAT_THREAD_FIELD, CONTENT_TYPE_FIELD, SIZE_FIELD};

    fn doc(scope: &str) -> IndexedDocument {
        let mut d = IndexedDocument {
            id: "d1".into(),
            content: "hello".into(),
            owner_scope: scope.into(),
            metadata: Default::default(),
        };
        d.metadata.insert(CONTENT_TYPE_FIELD.into(), "text/plain".into());
        d
    }

    #[test]
    fn parses_minimum_equality() {
        let f = Filter::parse("chatThreadId eq 't1'").expect("parse");
        assert_eq!(f, Filter::eq("chatThreadId", "t1"));
    }

    #[test]
    fn doubled_quotes_unescape() {
        let f = Filter::parse("user eq 'O''Brien'").expect("parse");
        assert_eq!(f, Filter::eq("user", "O'Brien"));
        assert_eq!(f.to_string(), "user eq 'O''Brien'");
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let f = Filter::parse("a eq 'x' or b eq 'y' and c eq 'z'").expect("parse");
        assert_eq!(f, Filter::eq("a", "x").or(Filter::eq("b", "y").and(Filter::eq("c", "z"))));
    }

    #[test]
    fn keywords_are_case_insensitive_and_parens_group() {
        let f = Filter::parse("NOT (a EQ 'x' OR a Eq 'y')").expect("parse");
        assert_eq!(f, Filter::eq("a", "x").or(Filter::eq("a", "y")).negate());
        let again = Filter::parse(&f.to_string()).expect("reparse");
        assert_eq!(again, f);
    }

    #[test]
    fn numbers_parse() {
        let f = Filter::parse("size ne -12 and score eq 0.5").expect("parse");
        assert_eq!(f.fields(), vec!["size", "score"]);
        assert!(f.to_string().contains("-12"));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        for bad in ["", "a eq", "a 'x'", "a eq 'x", "(a eq 'x'", "a eq 'x' b", "a gt 1", "a eq $"] {
            assert!(
                matches!(Filter::parse(bad), Err(IndexError::InvalidFilter(_))),
                "expected rejection of {bad:?}"
            );
        }
    }

    #[test]
    fn validate_checks_filterability_and_types() {
        let schema = IndexSchema::conversation("chat");
        Filter::eq(CHAT_THREAD_FIELD, "t1").validate(&schema).expect("scope is filterable");
        assert!(Filter::eq("content", "x").validate(&schema).is_err());
        assert!(Filter::eq("nope", "x").validate(&schema).is_err());
        let lib = IndexSchema::library("lib");
        Filter::parse(&format!("{SIZE_FIELD} eq 3")).expect("parse").validate(&lib).expect("int eq");
        assert!(Filter::eq(SIZE_FIELD, "3").validate(&lib).is_err());
    }

    #[test]
    fn matches_scope_and_metadata() {
        let schema = IndexSchema::conversation("chat");
        let d = doc("t1");
        assert!(Filter::eq(CHAT_THREAD_FIELD, "t1").matches(&d, &schema));
        assert!(!Filter::eq(CHAT_THREAD_FIELD, "t").matches(&d, &schema));
        let f = Filter::parse("chatThreadId eq 't1' and metadata_spo_item_content_type ne 'x'").expect("parse");
        assert!(f.matches(&d, &schema));
        assert!(!Filter::eq("user", "anyone").matches(&d, &schema));
    }

    #[test]
    fn owner_scope_filters_the_scope_field() {
        let schema = IndexSchema::conversation("chat");
        let f = Filter::parse("ownerScope eq 't1'").expect("parse");
        f.validate(&schema).expect("alias is filterable");
        assert!(f.matches(&doc("t1"), &schema));
        assert!(!f.matches(&doc("t2"), &schema));
        Filter::eq("ownerScope", "/a").validate(&IndexSchema::library("lib")).expect("library alias");
    }
}
