#![forbid(unsafe_code)]

//! Query results.
//!
//! A result is an immutable value. Conditioning with
//! [`QueryResult::given`] never edits it: the stored conditions plus the
//! new ones are re-evaluated against the shared source frame and a fresh
//! result is returned.

mod distribution;
mod outcome;
mod scalar;

use pf_calc::CalcError;
use pf_expr::{Condition, ExprError};
use pf_frame::FrameError;
use pf_types::TypeError;
use thiserror::Error;

pub use distribution::{Distribution, DistributionResult};
pub use outcome::Outcome;
pub use pf_calc::ErrorKind;
pub use scalar::ScalarResult;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("a query needs at least one {0}")]
    EmptyQuery(&'static str),
    #[error(transparent)]
    Calc(#[from] CalcError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("failed to serialise distribution: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Calc(err) => err.kind(),
            Self::EmptyQuery(_) => ErrorKind::Validation,
            Self::Expr(ExprError::Frame(_)) => ErrorKind::Engine,
            Self::Expr(_) => ErrorKind::Validation,
            Self::Frame(_) | Self::Type(_) | Self::Json(_) => ErrorKind::Engine,
        }
    }
}

/// A result that can be conditioned further.
pub trait QueryResult: Sized {
    fn given<I, C>(&self, conditions: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>;
}
