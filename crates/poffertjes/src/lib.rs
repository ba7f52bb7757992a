#![forbid(unsafe_code)]

//! Empirical probability queries over tabular data.
//!
//! ```
//! use poffertjes::prelude::*;
//!
//! let frame = DataFrame::from_dict(
//!     &["x", "y"],
//!     vec![
//!         ("x", vec![Scalar::Int64(1), Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(2)]),
//!         ("y", vec![Scalar::Int64(1), Scalar::Int64(2), Scalar::Int64(1), Scalar::Int64(2)]),
//!     ],
//! )?;
//! let vars = VariableBuilder::from_data(frame);
//! let x = vars.get_variable("x")?;
//! let y = vars.get_variable("y")?;
//!
//! // P(X = 1 | Y = 1)
//! let p = ScalarResult::evaluate([x.eq(1_i64)])?.given([y.eq(1_i64)])?;
//! assert_eq!(p.value(), 0.5);
//!
//! // P(X)
//! let dist = DistributionResult::evaluate(&[x])?;
//! assert_eq!(dist.to_dict()[&Outcome::single(1_i64)], 0.5);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The layers are separate crates re-exported here: `pf-types` (scalars),
//! `pf-frame` (the frame engine), `pf-expr` (variables and expressions),
//! `pf-calc` (the calculator) and `pf-result` (query results).

pub use pf_calc::{
    COUNT_COLUMN, CalcError, PROBABILITY_COLUMN, ProbabilityCalculator, QueryConfig,
};
pub use pf_expr::{
    Comparison, CompositeExpression, Condition, ExprError, ExprNode, ExprOp, ExprValue,
    Expression, FrameHandle, FrameId, Logic, Variable, VariableBuilder, validate_same_frame,
};
pub use pf_frame::{
    Column, ComparisonOp, DataFrame, FrameError, FrameOps, GroupByOptions, Predicate,
};
pub use pf_result::{
    Distribution, DistributionResult, ErrorKind, Outcome, QueryError, QueryResult, ScalarResult,
};
pub use pf_types::{DType, NullKind, Scalar, ValueKey};

pub mod prelude {
    pub use crate::{
        Condition, DataFrame, Distribution, DistributionResult, ErrorKind, ExprNode, Expression,
        Outcome, QueryResult, Scalar, ScalarResult, ValueKey, Variable, VariableBuilder,
    };
}
