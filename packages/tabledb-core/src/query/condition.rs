//! WHERE and HAVING conditions.
//!
//! A condition is a chain of comparisons joined by AND/OR, evaluated strictly
//! left to right: `a AND b OR c` is `(a AND b) OR c`, and `a OR b AND c` is
//! `(a OR b) AND c`.

use crate::error::DbError;
use crate::expr::{CompareOp, Token, TokenStream};
use crate::types::{compare_values, is_null, FieldKind, Row};

use super::schema::Schema;

/// Joins two comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Column reference, possibly `table.field` or an aggregate label such as `COUNT(*)`
    Column(String),
    Literal(String),
    Null,
}

/// `left OP right`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
}

/// Parsed condition: a first comparison followed by connector/comparison pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub first: Predicate,
    pub rest: Vec<(Connector, Predicate)>,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, DbError> {
        let mut tokens = TokenStream::new(source)?;
        if tokens.is_empty() {
            return Err(tokens.error("empty condition"));
        }

        let first = parse_predicate(&mut tokens)?;
        let mut rest = Vec::new();
        loop {
            let connector = if tokens.eat_keyword("AND") {
                Connector::And
            } else if tokens.eat_keyword("OR") {
                Connector::Or
            } else {
                break;
            };
            rest.push((connector, parse_predicate(&mut tokens)?));
        }
        tokens.expect_end()?;
        Ok(Self { first, rest })
    }

    /// Parses a condition that must be a single comparison.
    pub fn parse_single(source: &str) -> Result<Self, DbError> {
        let condition = Self::parse(source)?;
        if !condition.rest.is_empty() {
            return Err(DbError::invalid_expression(
                source,
                "only a single comparison is supported here",
            ));
        }
        Ok(condition)
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, p)| p))
    }

    /// Whether every connector is `connector` (true for a single comparison).
    pub fn all_connectors(&self, connector: Connector) -> bool {
        self.rest.iter().all(|(c, _)| *c == connector)
    }

    /// Resolves column references against a schema.
    pub fn bind(&self, schema: &Schema) -> Result<BoundCondition, DbError> {
        Ok(BoundCondition {
            first: bind_predicate(&self.first, schema)?,
            rest: self
                .rest
                .iter()
                .map(|(c, p)| Ok((*c, bind_predicate(p, schema)?)))
                .collect::<Result<_, DbError>>()?,
        })
    }
}

/// A comparison whose columns are resolved to row keys.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPredicate {
    pub left: Operand,
    pub op: CompareOp,
    pub right: Operand,
    /// Kind of the column operand, for typed comparison
    pub kind: Option<FieldKind>,
}

impl BoundPredicate {
    /// `(column, op, literal)` when this is a column compared with a literal,
    /// with the operator flipped if the literal came first.
    pub fn column_vs_literal(&self) -> Option<(&str, CompareOp, &str)> {
        match (&self.left, &self.right) {
            (Operand::Column(c), Operand::Literal(v)) => Some((c, self.op, v)),
            (Operand::Literal(v), Operand::Column(c)) => Some((c, self.op.flip(), v)),
            _ => None,
        }
    }

    pub fn evaluate(&self, row: &Row) -> bool {
        let left = operand_value(&self.left, row);
        let right = operand_value(&self.right, row);
        match (left, right) {
            (None, None) => self.op == CompareOp::Eq,
            (None, Some(_)) | (Some(_), None) => self.op == CompareOp::Ne,
            (Some(l), Some(r)) => self.op.matches(compare_values(self.kind, l, r)),
        }
    }
}

/// Condition ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCondition {
    pub first: BoundPredicate,
    pub rest: Vec<(Connector, BoundPredicate)>,
}

impl BoundCondition {
    pub fn evaluate(&self, row: &Row) -> bool {
        self.rest
            .iter()
            .fold(self.first.evaluate(row), |acc, (connector, predicate)| {
                match connector {
                    Connector::And => acc && predicate.evaluate(row),
                    Connector::Or => acc || predicate.evaluate(row),
                }
            })
    }

    pub fn predicates(&self) -> impl Iterator<Item = &BoundPredicate> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, p)| p))
    }

    pub fn all_connectors(&self, connector: Connector) -> bool {
        self.rest.iter().all(|(c, _)| *c == connector)
    }
}

/// Value of an operand; `None` for NULL or a missing column.
fn operand_value<'a>(operand: &'a Operand, row: &'a Row) -> Option<&'a str> {
    match operand {
        Operand::Column(key) => row
            .get(key)
            .map(String::as_str)
            .filter(|v| !is_null(v)),
        Operand::Literal(value) => Some(value),
        Operand::Null => None,
    }
}

fn bind_predicate(predicate: &Predicate, schema: &Schema) -> Result<BoundPredicate, DbError> {
    let bind = |operand: &Operand| -> Result<(Operand, Option<FieldKind>), DbError> {
        match operand {
            Operand::Column(name) => {
                let key = schema.resolve(name)?;
                let kind = schema.kind(&key);
                Ok((Operand::Column(key), kind))
            }
            other => Ok((other.clone(), None)),
        }
    };
    let (left, left_kind) = bind(&predicate.left)?;
    let (right, right_kind) = bind(&predicate.right)?;
    let kind = left_kind.or(right_kind);
    Ok(BoundPredicate {
        left: normalize_literal(left, kind),
        op: predicate.op,
        right: normalize_literal(right, kind),
        kind,
    })
}

/// Booleans are stored as `true`/`false`; accept `1`/`0` in conditions too.
fn normalize_literal(operand: Operand, kind: Option<FieldKind>) -> Operand {
    match (operand, kind) {
        (Operand::Literal(value), Some(FieldKind::Bool)) => {
            let normalized = match value.to_ascii_lowercase().as_str() {
                "1" | "true" => "true".to_string(),
                "0" | "false" => "false".to_string(),
                _ => value,
            };
            Operand::Literal(normalized)
        }
        (operand, _) => operand,
    }
}

fn parse_predicate(tokens: &mut TokenStream<'_>) -> Result<Predicate, DbError> {
    let left = parse_operand(tokens)?;

    if tokens.eat_keyword("IS") {
        let op = if tokens.eat_keyword("NOT") {
            CompareOp::Ne
        } else {
            CompareOp::Eq
        };
        if !tokens.eat_keyword("NULL") {
            return Err(tokens.error("expected NULL after IS"));
        }
        return Ok(Predicate {
            left,
            op,
            right: Operand::Null,
        });
    }

    let op = match tokens.next_token() {
        Some(Token::Op(op)) => op,
        _ => return Err(tokens.error("expected comparison operator")),
    };
    let right = parse_operand(tokens)?;
    Ok(Predicate { left, op, right })
}

/// Parses a column, literal, NULL, or aggregate call (`COUNT(*)`, `sum(x)`).
pub(crate) fn parse_operand(tokens: &mut TokenStream<'_>) -> Result<Operand, DbError> {
    match tokens.next_token() {
        Some(Token::Number(n)) => Ok(Operand::Literal(n)),
        Some(Token::Str(s)) => Ok(Operand::Literal(s)),
        Some(Token::Ident(word)) if word.eq_ignore_ascii_case("NULL") => Ok(Operand::Null),
        Some(Token::Ident(word))
            if word.eq_ignore_ascii_case("TRUE") || word.eq_ignore_ascii_case("FALSE") =>
        {
            Ok(Operand::Literal(word.to_ascii_lowercase()))
        }
        Some(Token::Ident(word)) if tokens.peek() == Some(&Token::LParen) => {
            tokens.next_token();
            let arg = match tokens.next_token() {
                Some(Token::Star) => "*".to_string(),
                Some(Token::Ident(arg)) => arg,
                _ => return Err(tokens.error("expected column or '*' in call")),
            };
            tokens.expect(&Token::RParen, "')'")?;
            Ok(Operand::Column(format!("{}({})", word.to_ascii_uppercase(), arg)))
        }
        Some(Token::Ident(word)) => Ok(Operand::Column(word)),
        _ => Err(tokens.error("expected column or literal")),
    }
}
