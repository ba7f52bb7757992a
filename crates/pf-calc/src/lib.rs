#![forbid(unsafe_code)]

//! Empirical probability calculator.
//!
//! Probabilities are plain frequencies: matching rows divided by the rows
//! left after conditioning. Conditioning expressions are applied as
//! sequential filters (logical AND across the list). A conditioning event
//! that matches no rows is an error; an empty source frame with no
//! conditions is a valid degenerate case and yields an empty table or a
//! probability of `0.0`.

use std::collections::HashMap;

use pf_expr::{Condition, ExprError, ExprNode, Variable, validate_same_frame};
use pf_frame::{DataFrame, FrameError, FrameOps, GroupByOptions};
use pf_types::{DType, Scalar, TypeError, ValueKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COUNT_COLUMN: &str = "count";
pub const PROBABILITY_COLUMN: &str = "probability";

const DEFAULT_TOLERANCE: f64 = 1e-10;
const DEFAULT_PREVIEW_ROWS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub group_by: GroupByOptions,
    /// Absolute tolerance for comparing probabilities.
    pub tolerance: f64,
    /// Outcomes listed by a distribution's `Display` before truncating.
    pub preview_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            group_by: GroupByOptions::default(),
            tolerance: DEFAULT_TOLERANCE,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl QueryConfig {
    /// Parse a JSON override document; absent fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, CalcError> {
        let config: Self = serde_json::from_str(raw)?;
        if !(config.tolerance.is_finite() && config.tolerance >= 0.0) {
            return Err(CalcError::InvalidTolerance(config.tolerance));
        }
        Ok(config)
    }
}

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed query, detected before any counting.
    Validation,
    /// A property of the data: the conditioning event never occurs.
    Probability,
    /// The frame engine rejected an operation.
    Engine,
}

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("conditioning event has zero probability: no rows satisfy {conditions}")]
    ZeroProbability { conditions: String },
    #[error(
        "joint distribution needs at least 2 variables, got {count}; use calculate_distribution for a single variable"
    )]
    JointArity { count: usize },
    #[error("at least one variable is required")]
    NoVariables,
    #[error("at least one expression is required")]
    NoExpressions,
    #[error("variable '{0}' is requested more than once")]
    DuplicateVariable(String),
    #[error("cannot condition on '{0}' while it is also a target variable")]
    StratifyOnTarget(String),
    #[error(
        "scalar result cannot be conditioned on variable '{name}' without an expression; use an expression like {name} == value instead"
    )]
    BareVariableCondition { name: String },
    #[error("variable '{name}' is bound to a different frame than this calculator")]
    ForeignVariable { name: String },
    #[error("column name '{0}' is reserved for the result table")]
    ReservedColumn(String),
    #[error("tolerance must be a finite non-negative number, got {0}")]
    InvalidTolerance(f64),
    #[error("invalid query config: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

impl CalcError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ZeroProbability { .. } => ErrorKind::Probability,
            Self::Expr(ExprError::Frame(_)) | Self::Frame(_) | Self::Type(_) => ErrorKind::Engine,
            Self::JointArity { .. }
            | Self::NoVariables
            | Self::NoExpressions
            | Self::DuplicateVariable(_)
            | Self::StratifyOnTarget(_)
            | Self::BareVariableCondition { .. }
            | Self::ForeignVariable { .. }
            | Self::ReservedColumn(_)
            | Self::InvalidTolerance(_)
            | Self::Config(_)
            | Self::Expr(_) => ErrorKind::Validation,
        }
    }
}

/// Computes frequencies over one frame.
///
/// The total row count is fixed when the calculator is built; every query
/// filters and groups fresh views and never touches the source. Every
/// variable passed in must be bound to `frame` itself.
#[derive(Debug)]
pub struct ProbabilityCalculator<'a, F: FrameOps> {
    frame: &'a F,
    total_count: usize,
    config: QueryConfig,
}

impl<'a, F: FrameOps> ProbabilityCalculator<'a, F> {
    #[must_use]
    pub fn new(frame: &'a F) -> Self {
        Self::with_config(frame, QueryConfig::default())
    }

    #[must_use]
    pub fn with_config(frame: &'a F, config: QueryConfig) -> Self {
        Self {
            frame,
            total_count: frame.row_count(),
            config,
        }
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Distribution table over `variables`.
    ///
    /// Expression conditions filter the rows first. Bare variables stratify:
    /// rows are grouped by the targets followed by the stratifying
    /// variables, and each count is normalised by the size of its stratum.
    /// The table holds the key columns, `count` and `probability`, sorted
    /// ascending by key.
    pub fn calculate_distribution(
        &self,
        variables: &[Variable],
        conditions: &[Condition],
    ) -> Result<F, CalcError> {
        if variables.is_empty() {
            return Err(CalcError::NoVariables);
        }
        let involved = variables
            .iter()
            .chain(conditions.iter().flat_map(Condition::variables))
            .collect::<Vec<_>>();
        validate_same_frame(involved.iter().copied())?;
        self.check_source(&involved)?;

        let mut keys = Vec::with_capacity(variables.len());
        for variable in variables {
            let name = variable.name();
            check_reserved(name)?;
            if keys.contains(&name) {
                return Err(CalcError::DuplicateVariable(name.to_owned()));
            }
            keys.push(name);
        }
        let target_len = keys.len();

        let mut filters = Vec::new();
        for condition in conditions {
            match condition {
                Condition::Expr(node) => filters.push(node),
                Condition::Variable(variable) => {
                    let name = variable.name();
                    check_reserved(name)?;
                    if keys[..target_len].contains(&name) {
                        return Err(CalcError::StratifyOnTarget(name.to_owned()));
                    }
                    if !keys.contains(&name) {
                        keys.push(name);
                    }
                }
            }
        }

        let filtered = filter_sequentially(self.frame, &filters)?;
        let view = filtered.as_ref().unwrap_or(self.frame);
        if !filters.is_empty() && view.row_count() == 0 {
            return Err(zero_probability(&filters));
        }

        let mut denominator = if filters.is_empty() {
            self.total_count
        } else {
            view.row_count()
        };

        // An empty source with no conditions falls through with zero
        // groups, leaving a correctly shaped empty table.
        let grouped = view.group_count(&keys, COUNT_COLUMN, self.config.group_by)?;
        let counts = grouped
            .column_values(COUNT_COLUMN)
            .ok_or_else(|| FrameError::UnknownColumn(COUNT_COLUMN.to_owned()))?
            .iter()
            .map(Scalar::to_f64)
            .collect::<Result<Vec<_>, _>>()?;
        if self.config.group_by.dropna {
            // Rows with a missing key are excluded from the sample space.
            denominator = counts.iter().sum::<f64>() as usize;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            variables = ?&keys[..target_len],
            strata = ?&keys[target_len..],
            conditions = filters.len(),
            denominator,
            "calculate_distribution"
        );

        let probabilities: Vec<Scalar> = if keys.len() == target_len {
            counts
                .iter()
                .map(|count| Scalar::Float64(count / denominator as f64))
                .collect()
        } else {
            let strata = stratum_keys(&grouped, &keys[target_len..])?;
            let mut totals = HashMap::<&[ValueKey], f64>::new();
            for (stratum, count) in strata.iter().zip(&counts) {
                *totals.entry(stratum.as_slice()).or_insert(0.0) += count;
            }
            strata
                .iter()
                .zip(&counts)
                .map(|(stratum, count)| {
                    let total = totals.get(stratum.as_slice()).copied().unwrap_or(0.0);
                    Scalar::Float64(if total > 0.0 { count / total } else { 0.0 })
                })
                .collect()
        };

        let table = grouped.with_column(PROBABILITY_COLUMN, DType::Float64, probabilities)?;
        Ok(table.sort_by(&keys)?)
    }

    /// Same table as [`Self::calculate_distribution`], but only for two or
    /// more variables.
    pub fn calculate_joint(
        &self,
        variables: &[Variable],
        conditions: &[Condition],
    ) -> Result<F, CalcError> {
        if variables.len() < 2 {
            return Err(CalcError::JointArity {
                count: variables.len(),
            });
        }
        self.calculate_distribution(variables, conditions)
    }

    /// Probability that every expression holds, given every condition.
    ///
    /// Returns `0.0` when the source frame is empty and there are no
    /// conditions.
    pub fn calculate_scalar(
        &self,
        expressions: &[ExprNode],
        conditions: &[Condition],
    ) -> Result<f64, CalcError> {
        if expressions.is_empty() {
            return Err(CalcError::NoExpressions);
        }
        let mut filters = Vec::with_capacity(conditions.len());
        for condition in conditions {
            match condition {
                Condition::Expr(node) => filters.push(node),
                Condition::Variable(variable) => {
                    return Err(CalcError::BareVariableCondition {
                        name: variable.name().to_owned(),
                    });
                }
            }
        }
        let involved = expressions
            .iter()
            .chain(filters.iter().copied())
            .flat_map(ExprNode::variables)
            .collect::<Vec<_>>();
        validate_same_frame(involved.iter().copied())?;
        self.check_source(&involved)?;

        let conditioned = filter_sequentially(self.frame, &filters)?;
        let view = conditioned.as_ref().unwrap_or(self.frame);
        if !filters.is_empty() && view.row_count() == 0 {
            return Err(zero_probability(&filters));
        }

        let denominator = view.row_count();
        if denominator == 0 {
            #[cfg(feature = "tracing")]
            tracing::debug!("calculate_scalar on an empty frame; returning 0.0");
            return Ok(0.0);
        }

        let targets = expressions.iter().collect::<Vec<_>>();
        let matched = filter_sequentially(view, &targets)?;
        let numerator = matched.as_ref().unwrap_or(view).row_count();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            expressions = expressions.len(),
            conditions = filters.len(),
            numerator,
            denominator,
            "calculate_scalar"
        );

        Ok(numerator as f64 / denominator as f64)
    }

    fn check_source(&self, variables: &[&Variable]) -> Result<(), CalcError> {
        let source = self.frame as *const F;
        match variables
            .iter()
            .find(|variable| !std::ptr::addr_eq(variable.frame() as *const DataFrame, source))
        {
            Some(foreign) => Err(CalcError::ForeignVariable {
                name: foreign.name().to_owned(),
            }),
            None => Ok(()),
        }
    }
}

/// Apply each node as its own filter stage. `None` means no stage ran.
fn filter_sequentially<F: FrameOps>(base: &F, nodes: &[&ExprNode]) -> Result<Option<F>, CalcError> {
    let mut current: Option<F> = None;
    for node in nodes {
        let predicate = node.to_predicate();
        let next = current.as_ref().unwrap_or(base).filter(&predicate)?;
        current = Some(next);
    }
    Ok(current)
}

fn zero_probability(filters: &[&ExprNode]) -> CalcError {
    let conditions = filters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" & ");

    #[cfg(feature = "tracing")]
    tracing::warn!(%conditions, "conditioning event matched no rows");

    CalcError::ZeroProbability { conditions }
}

fn check_reserved(name: &str) -> Result<(), CalcError> {
    if name == COUNT_COLUMN || name == PROBABILITY_COLUMN {
        return Err(CalcError::ReservedColumn(name.to_owned()));
    }
    Ok(())
}

fn stratum_keys<F: FrameOps>(grouped: &F, strata: &[&str]) -> Result<Vec<Vec<ValueKey>>, CalcError> {
    let columns = strata
        .iter()
        .map(|name| {
            grouped
                .column_values(name)
                .ok_or_else(|| FrameError::UnknownColumn((*name).to_owned()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((0..grouped.row_count())
        .map(|row| columns.iter().map(|values| ValueKey::from(&values[row])).collect())
        .collect())
}
