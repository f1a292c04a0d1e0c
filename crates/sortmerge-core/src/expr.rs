//! Output filter and projection descriptors.
//!
//! These are pure data: evaluation lives in `sortmerge-operators::filter`.
//! The filter is kept in conjunctive normal form: every `Clause` must hold,
//! and a clause holds when any one of its predicates does.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::order::Side;
use crate::types::Scalar;

/// Reference to a 1-based column of one join input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub side: Side,
    pub column: usize,
}

impl FieldRef {
    pub const fn left(column: usize) -> Self {
        Self {
            side: Side::Left,
            column,
        }
    }

    pub const fn right(column: usize) -> Self {
        Self {
            side: Side::Right,
            column,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Side::Left => write!(f, "L.{}", self.column),
            Side::Right => write!(f, "R.{}", self.column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompOp::Eq => "==",
            CompOp::Ne => "!=",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Field(FieldRef),
    Literal(Scalar),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(r) => write!(f, "{r}"),
            Operand::Literal(Scalar::Str(s)) => write!(f, "{s:?}"),
            Operand::Literal(v) => write!(f, "{v}"),
        }
    }
}

/// `left op right` over the conceptual concatenation of an (R, S) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub left: Operand,
    pub op: CompOp,
    pub right: Operand,
}

impl Predicate {
    pub fn new(left: Operand, op: CompOp, right: Operand) -> Self {
        Self { left, op, right }
    }

    /// `field op literal`
    pub fn field_literal(field: FieldRef, op: CompOp, literal: impl Into<Scalar>) -> Self {
        Self::new(Operand::Field(field), op, Operand::Literal(literal.into()))
    }

    /// `field op field`
    pub fn fields(left: FieldRef, op: CompOp, right: FieldRef) -> Self {
        Self::new(Operand::Field(left), op, Operand::Field(right))
    }

    pub fn field_refs(&self) -> impl Iterator<Item = &FieldRef> {
        [&self.left, &self.right].into_iter().filter_map(|o| match o {
            Operand::Field(r) => Some(r),
            Operand::Literal(_) => None,
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.op.symbol(), self.right)
    }
}

/// A disjunction of predicates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Clause {
    pub any_of: Vec<Predicate>,
}

impl Clause {
    pub fn new(any_of: Vec<Predicate>) -> Self {
        Self { any_of }
    }
}

impl From<Predicate> for Clause {
    fn from(p: Predicate) -> Self {
        Self { any_of: vec![p] }
    }
}

/// Conjunction of clauses. Empty means "accept every pair".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputFilter {
    pub clauses: Vec<Clause>,
}

impl OutputFilter {
    pub fn always_true() -> Self {
        Self::default()
    }

    /// Filter made of single-predicate clauses, all of which must hold.
    pub fn all(predicates: Vec<Predicate>) -> Self {
        Self {
            clauses: predicates.into_iter().map(Clause::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.clauses.iter().flat_map(|c| c.any_of.iter())
    }
}

impl fmt::Display for OutputFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return f.write_str("true");
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            let parens = clause.any_of.len() > 1;
            if parens {
                f.write_str("(")?;
            }
            for (j, p) in clause.any_of.iter().enumerate() {
                if j > 0 {
                    f.write_str(" OR ")?;
                }
                write!(f, "{p}")?;
            }
            if parens {
                f.write_str(")")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_display_is_readable() {
        let f = OutputFilter {
            clauses: vec![
                Predicate::field_literal(FieldRef::left(2), CompOp::Ne, "b").into(),
                Clause::new(vec![
                    Predicate::fields(FieldRef::left(1), CompOp::Lt, FieldRef::right(3)),
                    Predicate::field_literal(FieldRef::right(1), CompOp::Eq, 7i32),
                ]),
            ],
        };
        assert_eq!(f.to_string(), r#"L.2 != "b" AND (L.1 < R.3 OR R.1 == 7)"#);
        assert_eq!(f.predicates().count(), 3);
        assert_eq!(OutputFilter::always_true().to_string(), "true");
    }
}
