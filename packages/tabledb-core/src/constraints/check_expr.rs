//! CHECK constraint expressions.
//!
//! ```text
//! expr      := and_expr (OR and_expr)*
//! and_expr  := primary (AND primary)*
//! primary   := '(' expr ')' | predicate
//! predicate := [field] ( op literal | BETWEEN literal AND literal | IN '(' literal (',' literal)* ')' )
//! ```
//!
//! A predicate without a field applies to the constrained field. AND binds
//! tighter than OR.

use std::fmt;

use crate::error::DbError;
use crate::expr::{CompareOp, Token, TokenStream};
use crate::types::{compare_values, is_null, FieldKind, Row};

/// Parsed CHECK expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckExpr {
    Compare {
        field: Option<String>,
        op: CompareOp,
        value: String,
    },
    Between {
        field: Option<String>,
        low: String,
        high: String,
    },
    In {
        field: Option<String>,
        values: Vec<String>,
    },
    And(Box<CheckExpr>, Box<CheckExpr>),
    Or(Box<CheckExpr>, Box<CheckExpr>),
}

impl CheckExpr {
    pub fn parse(source: &str) -> Result<Self, DbError> {
        let mut tokens = TokenStream::new(source)?;
        if tokens.is_empty() {
            return Err(tokens.error("empty expression"));
        }
        let expr = parse_or(&mut tokens)?;
        tokens.expect_end()?;
        Ok(expr)
    }

    /// Fields named explicitly in the expression.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            CheckExpr::Compare { field, .. }
            | CheckExpr::Between { field, .. }
            | CheckExpr::In { field, .. } => {
                if let Some(field) = field {
                    if !out.contains(&field.as_str()) {
                        out.push(field);
                    }
                }
            }
            CheckExpr::And(l, r) | CheckExpr::Or(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
        }
    }

    /// Renames every explicit reference to `old`.
    ///
    /// # Returns
    /// Whether any reference was renamed.
    pub fn rename_field(&mut self, old: &str, new: &str) -> bool {
        match self {
            CheckExpr::Compare { field, .. }
            | CheckExpr::Between { field, .. }
            | CheckExpr::In { field, .. } => match field {
                Some(name) if name == old => {
                    *name = new.to_string();
                    true
                }
                _ => false,
            },
            CheckExpr::And(l, r) | CheckExpr::Or(l, r) => {
                let left = l.rename_field(old, new);
                let right = r.rename_field(old, new);
                left || right
            }
        }
    }

    /// Evaluates against a candidate row.
    ///
    /// # Arguments
    /// * `row` - Candidate values
    /// * `default_field` - Field used by predicates that name none
    /// * `kind_of` - Field kind lookup, for typed comparison
    ///
    /// A predicate over a NULL or missing value is satisfied.
    pub fn evaluate<F>(&self, row: &Row, default_field: Option<&str>, kind_of: &F) -> bool
    where
        F: Fn(&str) -> Option<FieldKind>,
    {
        let operand = |field: &Option<String>| {
            let name = field.as_deref().or(default_field)?;
            let value = row.get(name)?;
            if is_null(value) {
                None
            } else {
                Some((value.as_str(), kind_of(name)))
            }
        };

        match self {
            CheckExpr::Compare { field, op, value } => match operand(field) {
                Some((actual, kind)) => op.matches(compare_values(kind, actual, value)),
                None => true,
            },
            CheckExpr::Between { field, low, high } => match operand(field) {
                Some((actual, kind)) => {
                    CompareOp::Ge.matches(compare_values(kind, actual, low))
                        && CompareOp::Le.matches(compare_values(kind, actual, high))
                }
                None => true,
            },
            CheckExpr::In { field, values } => match operand(field) {
                Some((actual, kind)) => values
                    .iter()
                    .any(|v| compare_values(kind, actual, v).is_eq()),
                None => true,
            },
            CheckExpr::And(l, r) => {
                l.evaluate(row, default_field, kind_of) && r.evaluate(row, default_field, kind_of)
            }
            CheckExpr::Or(l, r) => {
                l.evaluate(row, default_field, kind_of) || r.evaluate(row, default_field, kind_of)
            }
        }
    }
}

/// Renders source text that parses back to the same expression.
impl fmt::Display for CheckExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = |f: &mut fmt::Formatter<'_>, field: &Option<String>| match field {
            Some(name) => write!(f, "{} ", name),
            None => Ok(()),
        };
        match self {
            CheckExpr::Compare { field, op, value } => {
                subject(f, field)?;
                write!(f, "{} {}", op.symbol(), Quoted(value))
            }
            CheckExpr::Between { field, low, high } => {
                subject(f, field)?;
                write!(f, "BETWEEN {} AND {}", Quoted(low), Quoted(high))
            }
            CheckExpr::In { field, values } => {
                subject(f, field)?;
                f.write_str("IN (")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", Quoted(value))?;
                }
                f.write_str(")")
            }
            CheckExpr::And(l, r) => write!(f, "({} AND {})", l, r),
            CheckExpr::Or(l, r) => write!(f, "({} OR {})", l, r),
        }
    }
}

struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.replace('\'', "''"))
    }
}

fn parse_or(tokens: &mut TokenStream<'_>) -> Result<CheckExpr, DbError> {
    let mut left = parse_and(tokens)?;
    while tokens.eat_keyword("OR") {
        let right = parse_and(tokens)?;
        left = CheckExpr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and(tokens: &mut TokenStream<'_>) -> Result<CheckExpr, DbError> {
    let mut left = parse_primary(tokens)?;
    while tokens.eat_keyword("AND") {
        let right = parse_primary(tokens)?;
        left = CheckExpr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_primary(tokens: &mut TokenStream<'_>) -> Result<CheckExpr, DbError> {
    if tokens.eat(&Token::LParen) {
        let inner = parse_or(tokens)?;
        tokens.expect(&Token::RParen, "')'")?;
        return Ok(inner);
    }

    let field = match tokens.peek() {
        Some(Token::Ident(name))
            if !["BETWEEN", "IN", "AND", "OR"]
                .iter()
                .any(|k| name.eq_ignore_ascii_case(k)) =>
        {
            let name = name.clone();
            tokens.next_token();
            Some(name)
        }
        _ => None,
    };

    if tokens.eat_keyword("BETWEEN") {
        let low = parse_literal(tokens)?;
        if !tokens.eat_keyword("AND") {
            return Err(tokens.error("expected AND in BETWEEN"));
        }
        let high = parse_literal(tokens)?;
        return Ok(CheckExpr::Between { field, low, high });
    }

    if tokens.eat_keyword("IN") {
        tokens.expect(&Token::LParen, "'(' after IN")?;
        let mut values = vec![parse_literal(tokens)?];
        while tokens.eat(&Token::Comma) {
            values.push(parse_literal(tokens)?);
        }
        tokens.expect(&Token::RParen, "')' closing IN list")?;
        return Ok(CheckExpr::In { field, values });
    }

    match tokens.next_token() {
        Some(Token::Op(op)) => {
            let value = parse_literal(tokens)?;
            Ok(CheckExpr::Compare { field, op, value })
        }
        _ => Err(tokens.error("expected comparison, BETWEEN or IN")),
    }
}

fn parse_literal(tokens: &mut TokenStream<'_>) -> Result<String, DbError> {
    match tokens.next_token() {
        Some(Token::Number(n)) => Ok(n),
        Some(Token::Str(s)) => Ok(s),
        Some(Token::Ident(word)) => Ok(word),
        _ => Err(tokens.error("expected literal")),
    }
}
