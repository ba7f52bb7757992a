use std::fmt;

use pf_calc::{CalcError, ProbabilityCalculator, QueryConfig};
use pf_expr::{Condition, ExprNode, FrameHandle, validate_same_frame};

use crate::{QueryError, QueryResult};

/// A probability in `[0, 1]` and the expressions it was computed from.
#[derive(Debug, Clone)]
pub struct ScalarResult {
    value: f64,
    expressions: Vec<ExprNode>,
    conditions: Vec<ExprNode>,
    handle: FrameHandle,
    config: QueryConfig,
}

impl ScalarResult {
    /// Probability that all `expressions` hold.
    pub fn evaluate<I, E>(expressions: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = E>,
        E: Into<ExprNode>,
    {
        Self::evaluate_with_config(expressions, QueryConfig::default())
    }

    pub fn evaluate_with_config<I, E>(expressions: I, config: QueryConfig) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = E>,
        E: Into<ExprNode>,
    {
        let expressions = expressions.into_iter().map(Into::into).collect::<Vec<_>>();
        let handle = expressions
            .iter()
            .flat_map(ExprNode::variables)
            .next()
            .map(|variable| variable.handle().clone())
            .ok_or(QueryError::EmptyQuery("expression"))?;
        validate_same_frame(expressions.iter().flat_map(ExprNode::variables))?;
        Self::compute(handle, expressions, Vec::new(), config)
    }

    fn compute(
        handle: FrameHandle,
        expressions: Vec<ExprNode>,
        conditions: Vec<ExprNode>,
        config: QueryConfig,
    ) -> Result<Self, QueryError> {
        let wrapped = conditions
            .iter()
            .cloned()
            .map(Condition::Expr)
            .collect::<Vec<_>>();
        let value = ProbabilityCalculator::with_config(handle.frame(), config)
            .calculate_scalar(&expressions, &wrapped)?;
        Ok(Self {
            value,
            expressions,
            conditions,
            handle,
            config,
        })
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[must_use]
    pub fn expressions(&self) -> &[ExprNode] {
        &self.expressions
    }

    #[must_use]
    pub fn conditions(&self) -> &[ExprNode] {
        &self.conditions
    }
}

impl QueryResult for ScalarResult {
    /// Recompute the original expressions under `conditions`, which replace
    /// any conditions applied before. A bare variable is rejected since it
    /// does not pin a value.
    fn given<I, C>(&self, conditions: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        let mut combined = Vec::new();
        for condition in conditions {
            match condition.into() {
                Condition::Expr(node) => combined.push(node),
                Condition::Variable(variable) => {
                    return Err(CalcError::BareVariableCondition {
                        name: variable.name().to_owned(),
                    }
                    .into());
                }
            }
        }
        validate_same_frame(
            self.expressions
                .iter()
                .chain(&combined)
                .flat_map(ExprNode::variables),
        )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            previous = self.conditions.len(),
            current = combined.len(),
            "ScalarResult::given"
        );

        Self::compute(
            self.handle.clone(),
            self.expressions.clone(),
            combined,
            self.config,
        )
    }
}

impl From<&ScalarResult> for f64 {
    fn from(result: &ScalarResult) -> Self {
        result.value
    }
}

impl From<ScalarResult> for f64 {
    fn from(result: ScalarResult) -> Self {
        result.value
    }
}

impl fmt::Display for ScalarResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use pf_calc::ErrorKind;
    use pf_expr::{Condition, ExprNode, VariableBuilder};
    use pf_frame::DataFrame;
    use pf_types::Scalar;

    use super::ScalarResult;
    use crate::{QueryError, QueryResult};

    fn source() -> VariableBuilder {
        VariableBuilder::from_data(
            DataFrame::from_dict(
                &["x", "y", "z"],
                vec![
                    ("x", [1, 1, 2, 2].map(Scalar::Int64).to_vec()),
                    ("y", [1, 2, 1, 2].map(Scalar::Int64).to_vec()),
                    ("z", [1, 1, 1, 2].map(Scalar::Int64).to_vec()),
                ],
            )
            .expect("frame"),
        )
    }

    #[test]
    fn conjunction_and_conditioning() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let y = source.get_variable("y").expect("y");

        let joint = ScalarResult::evaluate([x.eq(1_i64), y.eq(1_i64)]).expect("joint");
        assert_eq!(joint.value(), 0.25);
        assert_eq!(joint.to_string(), "0.250000");

        let conditional = ScalarResult::evaluate([x.eq(1_i64)])
            .expect("marginal")
            .given([y.eq(1_i64)])
            .expect("conditional");
        assert_eq!(f64::from(&conditional), 0.5);
        assert_eq!(conditional.conditions().len(), 1);
        assert_eq!(conditional.expressions().len(), 1);
    }

    #[test]
    fn chained_given_replaces_earlier_conditions() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let y = source.get_variable("y").expect("y");
        let z = source.get_variable("z").expect("z");

        let p = ScalarResult::evaluate([x.eq(2_i64)])
            .expect("marginal")
            .given([y.eq(2_i64)])
            .expect("given y")
            .given([z.eq(1_i64)])
            .expect("given z");
        let direct = ScalarResult::evaluate([x.eq(2_i64)])
            .expect("marginal")
            .given([z.eq(1_i64)])
            .expect("given z only");
        assert!((p.value() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(p.value(), direct.value());
        assert_eq!(p.conditions().len(), 1);
        assert_eq!(p.expressions().len(), 1);
    }

    #[test]
    fn bare_variable_is_rejected() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let y = source.get_variable("y").expect("y");

        let err = ScalarResult::evaluate([x.eq(1_i64)])
            .expect("marginal")
            .given([Condition::from(y)])
            .expect_err("bare variable");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("use an expression like y == value"));
    }

    #[test]
    fn zero_probability_condition_is_reported() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let y = source.get_variable("y").expect("y");

        let err = ScalarResult::evaluate([x.eq(1_i64)])
            .expect("marginal")
            .given([y.eq(99_i64)])
            .expect_err("impossible");
        assert_eq!(err.kind(), ErrorKind::Probability);
    }

    #[test]
    fn empty_query_is_rejected() {
        let err = ScalarResult::evaluate(Vec::<ExprNode>::new()).expect_err("empty");
        assert!(matches!(err, QueryError::EmptyQuery("expression")));
    }

    #[test]
    fn foreign_conditions_are_rejected() {
        let x = source().get_variable("x").expect("x");
        let other = source().get_variable("y").expect("y");
        let err = ScalarResult::evaluate([x.eq(1_i64)])
            .expect("marginal")
            .given([other.eq(1_i64)])
            .expect_err("mixed");
        assert!(err.to_string().contains("different dataframes cannot be mixed"));
    }
}
