#![forbid(unsafe_code)]

//! Variables and the predicate trees built over them.
//!
//! A [`VariableBuilder`] owns one source frame behind a shared
//! [`FrameHandle`] and hands out [`Variable`]s. Comparisons on variables
//! produce [`Expression`]s, which combine through AND/OR into
//! [`ExprNode`] trees and translate into `pf_frame::Predicate` for the
//! engine to evaluate.

mod expression;
mod variable;

use std::fmt;

use pf_frame::FrameError;
use thiserror::Error;

pub use expression::{
    Comparison, CompositeExpression, ExprNode, ExprOp, ExprValue, Expression, Logic,
};
pub use variable::{FrameHandle, FrameId, Variable, VariableBuilder};

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("unknown expression operator: '{0}'")]
    UnknownOperator(String),
    #[error("operator 'between' requires an upper bound")]
    MissingUpperBound,
    #[error("operator '{op}' expects {expected}")]
    InvalidOperand { op: ExprOp, expected: &'static str },
    #[error("composite logic must be AND or OR, got '{0}'")]
    UnknownLogic(String),
    #[error("{0} composite needs at least one child expression")]
    EmptyComposite(Logic),
    #[error("missing columns {missing:?}; available columns are {available:?}")]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },
    #[error(
        "variables from different dataframes cannot be mixed: {expected:?} belong to one frame, {conflicting:?} to another"
    )]
    MixedFrames {
        expected: Vec<String>,
        conflicting: Vec<String>,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Argument of `.given(...)`: a predicate to filter on, or a bare variable
/// to stratify by.
#[derive(Debug, Clone)]
pub enum Condition {
    Expr(ExprNode),
    Variable(Variable),
}

impl Condition {
    #[must_use]
    pub fn variables(&self) -> Vec<&Variable> {
        match self {
            Self::Expr(node) => node.variables(),
            Self::Variable(variable) => vec![variable],
        }
    }

    #[must_use]
    pub fn as_expr(&self) -> Option<&ExprNode> {
        match self {
            Self::Expr(node) => Some(node),
            Self::Variable(_) => None,
        }
    }

    #[must_use]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Expr(_) => None,
            Self::Variable(variable) => Some(variable),
        }
    }
}

impl From<Expression> for Condition {
    fn from(expression: Expression) -> Self {
        Self::Expr(expression.into())
    }
}

impl From<CompositeExpression> for Condition {
    fn from(composite: CompositeExpression) -> Self {
        Self::Expr(composite.into())
    }
}

impl From<ExprNode> for Condition {
    fn from(node: ExprNode) -> Self {
        Self::Expr(node)
    }
}

impl From<Variable> for Condition {
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl From<&Variable> for Condition {
    fn from(variable: &Variable) -> Self {
        Self::Variable(variable.clone())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expr(node) => fmt::Display::fmt(node, f),
            Self::Variable(variable) => fmt::Display::fmt(variable, f),
        }
    }
}

/// Check that every variable is bound to the same source frame as the
/// first one.
pub fn validate_same_frame<'a, I>(variables: I) -> Result<(), ExprError>
where
    I: IntoIterator<Item = &'a Variable>,
{
    let mut variables = variables.into_iter();
    let Some(first) = variables.next() else {
        return Ok(());
    };

    let mut expected = vec![first.name().to_owned()];
    let mut conflicting = Vec::new();
    for variable in variables {
        let bucket = if variable.frame_id() == first.frame_id() {
            &mut expected
        } else {
            &mut conflicting
        };
        if !bucket.iter().any(|name| name == variable.name()) {
            bucket.push(variable.name().to_owned());
        }
    }

    if conflicting.is_empty() {
        Ok(())
    } else {
        Err(ExprError::MixedFrames {
            expected,
            conflicting,
        })
    }
}
