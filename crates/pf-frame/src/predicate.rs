use std::cmp::Ordering;
use std::fmt;

use pf_types::{DType, Scalar};
use serde::{Deserialize, Serialize};

use crate::{DataFrame, FrameError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    #[must_use]
    pub fn is_ordering(self) -> bool {
        !matches!(self, Self::Eq | Self::Ne)
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Row filter understood natively by [`DataFrame`].
///
/// `And`/`Or` children are evaluated and folded left to right; an empty
/// `And` keeps every row and an empty `Or` keeps none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        op: ComparisonOp,
        value: Scalar,
    },
    IsIn {
        column: String,
        values: Vec<Scalar>,
    },
    And {
        children: Vec<Predicate>,
    },
    Or {
        children: Vec<Predicate>,
    },
    Literal {
        value: bool,
    },
}

impl Predicate {
    #[must_use]
    pub fn compare(column: impl Into<String>, op: ComparisonOp, value: impl Into<Scalar>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And {
            children: vec![self, other],
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or {
            children: vec![self, other],
        }
    }

    /// Column names referenced anywhere in the predicate, first-seen order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { column, .. } | Self::IsIn { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column.as_str());
                }
            }
            Self::And { children } | Self::Or { children } => {
                for child in children {
                    child.collect_columns(out);
                }
            }
            Self::Literal { .. } => {}
        }
    }
}

/// Evaluate a predicate into a row mask for `frame`.
pub fn evaluate_mask(predicate: &Predicate, frame: &DataFrame) -> Result<Vec<bool>, FrameError> {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let values = frame.require_column(column)?.values();
            values
                .iter()
                .map(|cell| {
                    compare_scalars(cell, value, *op).map_err(|(left, right)| {
                        FrameError::IncomparableDtypes {
                            column: column.clone(),
                            op: *op,
                            left,
                            right,
                        }
                    })
                })
                .collect()
        }
        Predicate::IsIn { column, values } => {
            let cells = frame.require_column(column)?.values();
            Ok(cells
                .iter()
                .map(|cell| {
                    values
                        .iter()
                        .any(|candidate| compare_scalars(cell, candidate, ComparisonOp::Eq) == Ok(true))
                })
                .collect())
        }
        Predicate::And { children } => {
            let mut mask = vec![true; frame.len()];
            for child in children {
                let next = evaluate_mask(child, frame)?;
                for (slot, keep) in mask.iter_mut().zip(next) {
                    *slot = *slot && keep;
                }
            }
            Ok(mask)
        }
        Predicate::Or { children } => {
            let mut mask = vec![false; frame.len()];
            for child in children {
                let next = evaluate_mask(child, frame)?;
                for (slot, keep) in mask.iter_mut().zip(next) {
                    *slot = *slot || keep;
                }
            }
            Ok(mask)
        }
        Predicate::Literal { value } => Ok(vec![*value; frame.len()]),
    }
}

/// Compare one cell against an operand.
///
/// Missing cells or operands never satisfy a comparison. Equality across
/// incompatible dtypes is simply unequal; ordering across them is an
/// error carrying both dtypes.
pub fn compare_scalars(
    left: &Scalar,
    right: &Scalar,
    op: ComparisonOp,
) -> Result<bool, (DType, DType)> {
    if left.is_missing() || right.is_missing() {
        return Ok(false);
    }

    let ordering = match (left, right) {
        (Scalar::Int64(a), Scalar::Int64(b)) => Some(a.cmp(b)),
        (Scalar::Int64(_) | Scalar::Float64(_), Scalar::Int64(_) | Scalar::Float64(_)) => {
            match (left.to_f64(), right.to_f64()) {
                (Ok(a), Ok(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match ordering {
        Some(ordering) => Ok(op.holds(ordering)),
        None if op.is_ordering() => Err((left.dtype(), right.dtype())),
        None => Ok(matches!(op, ComparisonOp::Ne)),
    }
}
