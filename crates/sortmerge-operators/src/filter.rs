//! Output-filter evaluation and the textual predicate syntax.
//!
//! A predicate compares two operands, each a 1-based field of the left (`L.n`)
//! or right (`R.n`) tuple of a matched pair, or a literal:
//! `L.2 != "b"`, `R.1 >= 10`, `L.1 == R.3`. A clause is a disjunction of
//! predicates joined by ` OR `.

use std::cmp::Ordering;

use sortmerge_core::expr::{Clause, CompOp, FieldRef, Operand, OutputFilter, Predicate};
use sortmerge_core::order::Side;
use sortmerge_core::prelude::Schema;
use sortmerge_core::schema::DataType;
use sortmerge_core::types::{Scalar, Tuple};

use crate::join::compare::natural_cmp;
use crate::traits::OpError;

/// Evaluate the filter against the (left, right) pair. An empty filter accepts.
pub fn eval_filter(filter: &OutputFilter, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
    for clause in &filter.clauses {
        if !eval_clause(clause, left, right)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_clause(clause: &Clause, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
    for p in &clause.any_of {
        if eval_predicate(p, left, right)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Evaluate one comparison. Null operands make it false; operands of
/// different types are a `TypeMismatch`.
pub fn eval_predicate(p: &Predicate, left: &Tuple, right: &Tuple) -> Result<bool, OpError> {
    let a = resolve(&p.left, left, right)?;
    let b = resolve(&p.right, left, right)?;
    if a.is_null() || b.is_null() {
        return Ok(false);
    }
    let ord = natural_cmp(a, b).ok_or_else(|| {
        OpError::TypeMismatch(format!("cannot compare {a} with {b} in `{p}`"))
    })?;
    Ok(match p.op {
        CompOp::Eq => ord == Ordering::Equal,
        CompOp::Ne => ord != Ordering::Equal,
        CompOp::Lt => ord == Ordering::Less,
        CompOp::Le => ord != Ordering::Greater,
        CompOp::Gt => ord == Ordering::Greater,
        CompOp::Ge => ord != Ordering::Less,
    })
}

fn resolve<'a>(op: &'a Operand, left: &'a Tuple, right: &'a Tuple) -> Result<&'a Scalar, OpError> {
    match op {
        Operand::Literal(v) => Ok(v),
        Operand::Field(r) => {
            let tuple = match r.side {
                Side::Left => left,
                Side::Right => right,
            };
            tuple.get(r.column).ok_or_else(|| {
                OpError::TypeMismatch(format!(
                    "filter references {r} but the {} tuple has {} fields",
                    r.side,
                    tuple.len()
                ))
            })
        }
    }
}

/// Parse `L.n op R.m`, `L.n op literal` and the mirrored forms.
pub fn parse_predicate(expr: &str) -> Result<Predicate, OpError> {
    let (pos, op, len) = find_operator(expr)
        .ok_or_else(|| invalid(format!("no comparison operator in `{expr}`")))?;
    let lhs = parse_operand(expr[..pos].trim())?;
    let rhs = parse_operand(expr[pos + len..].trim())?;
    if matches!((&lhs, &rhs), (Operand::Literal(_), Operand::Literal(_))) {
        return Err(invalid(format!("`{expr}` compares two literals")));
    }
    Ok(Predicate::new(lhs, op, rhs))
}

/// Parse a disjunction: predicates separated by ` OR `.
pub fn parse_clause(expr: &str) -> Result<Clause, OpError> {
    let any_of = split_outside_quotes(expr, " OR ")
        .into_iter()
        .map(parse_predicate)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Clause::new(any_of))
}

/// Parse a conjunction given as one string per clause.
pub fn parse_filter<S: AsRef<str>>(clauses: &[S]) -> Result<OutputFilter, OpError> {
    let clauses = clauses
        .iter()
        .map(|c| parse_clause(c.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OutputFilter { clauses })
}

/// Parse `L.n` / `R.n`.
pub fn parse_field_ref(s: &str) -> Result<FieldRef, OpError> {
    let (side, rest) = if let Some(rest) = s.strip_prefix("L.") {
        (Side::Left, rest)
    } else if let Some(rest) = s.strip_prefix("R.") {
        (Side::Right, rest)
    } else {
        return Err(invalid(format!("`{s}` is not a field reference (L.n or R.n)")));
    };
    let column = rest
        .parse::<usize>()
        .map_err(|_| invalid(format!("bad column number in `{s}`")))?;
    if column == 0 {
        return Err(invalid(format!("`{s}`: columns are numbered from 1")));
    }
    Ok(FieldRef { side, column })
}

fn parse_operand(s: &str) -> Result<Operand, OpError> {
    if s.starts_with("L.") || s.starts_with("R.") {
        return parse_field_ref(s).map(Operand::Field);
    }
    if s.len() >= 2 {
        let quoted = (s.starts_with('"') && s.ends_with('"'))
            || (s.starts_with('\'') && s.ends_with('\''));
        if quoted {
            return Ok(Operand::Literal(Scalar::Str(s[1..s.len() - 1].to_string())));
        }
    }
    let lit = match s {
        "" => return Err(invalid("missing operand".into())),
        "true" => Scalar::Bool(true),
        "false" => Scalar::Bool(false),
        "null" | "NULL" => Scalar::Null,
        _ => {
            if let Ok(i) = s.parse::<i64>() {
                Scalar::I64(i)
            } else if let Ok(f) = s.parse::<f64>() {
                Scalar::F64(f)
            } else {
                return Err(invalid(format!("cannot parse operand `{s}`")));
            }
        }
    };
    Ok(Operand::Literal(lit))
}

/// First comparison operator outside quotes: (byte offset, op, op length).
fn find_operator(expr: &str) -> Option<(usize, CompOp, usize)> {
    let bytes = expr.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == b'"' || c == b'\'' => quote = Some(c),
            None => {
                let next = bytes.get(i + 1).copied();
                let two = match (c, next) {
                    (b'=', Some(b'=')) => Some(CompOp::Eq),
                    (b'!', Some(b'=')) => Some(CompOp::Ne),
                    (b'<', Some(b'=')) => Some(CompOp::Le),
                    (b'>', Some(b'=')) => Some(CompOp::Ge),
                    _ => None,
                };
                if let Some(op) = two {
                    return Some((i, op, 2));
                }
                match c {
                    b'<' => return Some((i, CompOp::Lt, 1)),
                    b'>' => return Some((i, CompOp::Gt, 1)),
                    _ => {}
                }
            }
        }
        i += 1;
    }
    None
}

fn split_outside_quotes<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if expr[i..].starts_with(sep) && i >= start => {
                parts.push(&expr[start..i]);
                start = i + sep.len();
            }
            None => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// Check every field reference against the input schemas and convert each
/// literal to the type of the field it is compared with, so evaluation
/// compares like with like. Parsed integers become `I32` for `Int32` fields,
/// floats for float fields, and so on.
pub fn bind_literals(filter: &OutputFilter, left: &Schema, right: &Schema) -> Result<OutputFilter, OpError> {
    let mut bound = filter.clone();
    for clause in &mut bound.clauses {
        if clause.any_of.is_empty() {
            return Err(invalid("filter clause has no predicates".into()));
        }
        for p in &mut clause.any_of {
            let lt = operand_type(&p.left, left, right)?;
            let rt = operand_type(&p.right, left, right)?;
            match (lt, rt) {
                (Some(a), Some(b)) if a != b => {
                    return Err(OpError::TypeMismatch(format!(
                        "`{p}` compares {a:?} with {b:?}"
                    )));
                }
                (Some(t), None) => coerce_operand(&mut p.right, t)?,
                (None, Some(t)) => coerce_operand(&mut p.left, t)?,
                _ => {}
            }
        }
    }
    Ok(bound)
}

fn operand_type(op: &Operand, left: &Schema, right: &Schema) -> Result<Option<DataType>, OpError> {
    let Operand::Field(r) = op else {
        return Ok(None);
    };
    let schema = match r.side {
        Side::Left => left,
        Side::Right => right,
    };
    schema
        .field(r.column)
        .map(|f| Some(f.data_type))
        .ok_or_else(|| {
            invalid(format!(
                "filter references {r} but the {} input has {} fields",
                r.side,
                schema.len()
            ))
        })
}

fn coerce_operand(op: &mut Operand, to: DataType) -> Result<(), OpError> {
    if let Operand::Literal(v) = op {
        *v = coerce(v, to)?;
    }
    Ok(())
}

fn coerce(v: &Scalar, to: DataType) -> Result<Scalar, OpError> {
    let out = match (v, to) {
        (Scalar::Null, _) => Some(Scalar::Null),
        (Scalar::I64(i), DataType::Int32) => i32::try_from(*i).ok().map(Scalar::I32),
        (Scalar::I64(i), DataType::Int64) => Some(Scalar::I64(*i)),
        (Scalar::I64(i), DataType::Float32) => Some(Scalar::F32(*i as f32)),
        (Scalar::I64(i), DataType::Float64) => Some(Scalar::F64(*i as f64)),
        (Scalar::F64(x), DataType::Float32) => Some(Scalar::F32(*x as f32)),
        (other, t) if other.data_type() == Some(t) => Some(other.clone()),
        _ => None,
    };
    out.ok_or_else(|| OpError::TypeMismatch(format!("literal {v} cannot be compared with a {to:?} field")))
}

fn invalid(msg: String) -> OpError {
    OpError::InvalidJoinConfiguration(msg)
}
