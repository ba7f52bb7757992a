use std::collections::BTreeMap;
use std::fmt;

use pf_calc::{COUNT_COLUMN, PROBABILITY_COLUMN, ProbabilityCalculator, QueryConfig};
use pf_expr::{Condition, FrameHandle, Variable, validate_same_frame};
use pf_frame::{DataFrame, FrameError};
use pf_types::ValueKey;
use serde::Serialize;

use crate::{Outcome, QueryError, QueryResult};

const RULE_WIDTH: usize = 50;

/// Distribution table computed over a shared source frame, together with
/// everything needed to condition it further.
#[derive(Debug, Clone)]
pub struct DistributionResult {
    distribution: Distribution,
    variables: Vec<Variable>,
    conditions: Vec<Condition>,
    handle: FrameHandle,
    config: QueryConfig,
}

impl DistributionResult {
    /// Unconditioned distribution over `variables` (joint when more than
    /// one is given).
    pub fn evaluate(variables: &[Variable]) -> Result<Self, QueryError> {
        Self::evaluate_with_config(variables, QueryConfig::default())
    }

    pub fn evaluate_with_config(
        variables: &[Variable],
        config: QueryConfig,
    ) -> Result<Self, QueryError> {
        let first = variables.first().ok_or(QueryError::EmptyQuery("variable"))?;
        validate_same_frame(variables)?;
        Self::compute(first.handle().clone(), variables.to_vec(), Vec::new(), config)
    }

    fn compute(
        handle: FrameHandle,
        variables: Vec<Variable>,
        conditions: Vec<Condition>,
        config: QueryConfig,
    ) -> Result<Self, QueryError> {
        let calculator = ProbabilityCalculator::with_config(handle.frame(), config);
        let table = calculator.calculate_distribution(&variables, &conditions)?;
        let keys = key_columns(&table);
        let distribution = Distribution::with_config(table.clone(), &keys, &config)?;
        Ok(Self {
            distribution,
            variables,
            conditions,
            handle,
            config,
        })
    }

    #[must_use]
    pub fn table(&self) -> &DataFrame {
        &self.distribution.data
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Conditions of the most recent `given`, in call order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Probability per outcome. Stratifying variables are part of the key.
    #[must_use]
    pub fn to_dict(&self) -> BTreeMap<Outcome, f64> {
        self.distribution.to_dict()
    }

    #[must_use]
    pub fn to_dataframe(&self) -> DataFrame {
        self.distribution.to_dataframe()
    }

    #[must_use]
    pub fn to_distribution(&self) -> Distribution {
        self.distribution.clone()
    }
}

impl QueryResult for DistributionResult {
    /// Condition on expressions (filter) and bare variables (stratify).
    ///
    /// `conditions` replace the ones applied before; the original target
    /// variables are recomputed from the source frame.
    fn given<I, C>(&self, conditions: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = C>,
        C: Into<Condition>,
    {
        let combined = conditions.into_iter().map(Into::into).collect::<Vec<_>>();
        validate_same_frame(
            self.variables
                .iter()
                .chain(combined.iter().flat_map(Condition::variables)),
        )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            previous = self.conditions.len(),
            current = combined.len(),
            "DistributionResult::given"
        );

        Self::compute(
            self.handle.clone(),
            self.variables.clone(),
            combined,
            self.config,
        )
    }
}

fn key_columns(table: &DataFrame) -> Vec<&str> {
    table
        .column_names()
        .into_iter()
        .filter(|name| *name != COUNT_COLUMN && *name != PROBABILITY_COLUMN)
        .collect()
}

/// Self-contained view of a distribution: `(outcome, probability)` pairs
/// in table order.
#[derive(Debug, Clone)]
pub struct Distribution {
    variables: Vec<String>,
    entries: Vec<(Outcome, f64)>,
    data: DataFrame,
    tolerance: f64,
    preview_rows: usize,
}

#[derive(Serialize)]
struct Record<'a> {
    outcome: &'a Outcome,
    probability: f64,
}

impl Distribution {
    /// `data` must hold one column per name in `variables` plus a
    /// `probability` column.
    pub fn new(data: DataFrame, variables: &[&str]) -> Result<Self, QueryError> {
        Self::with_config(data, variables, &QueryConfig::default())
    }

    pub fn with_config(
        data: DataFrame,
        variables: &[&str],
        config: &QueryConfig,
    ) -> Result<Self, QueryError> {
        let key_values = variables
            .iter()
            .map(|name| data.require_column(name).map(|column| column.values()))
            .collect::<Result<Vec<_>, FrameError>>()?;
        let probabilities = data.require_column(PROBABILITY_COLUMN)?.values();

        let mut entries = Vec::with_capacity(data.len());
        for (row, probability) in probabilities.iter().enumerate() {
            let keys = key_values
                .iter()
                .map(|values| ValueKey::from(&values[row]))
                .collect::<Vec<_>>();
            entries.push((Outcome::from_keys(keys), probability.to_f64()?));
        }

        Ok(Self {
            variables: variables.iter().map(|name| (*name).to_owned()).collect(),
            entries,
            data,
            tolerance: config.tolerance,
            preview_rows: config.preview_rows,
        })
    }

    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Outcome, f64)> + '_ {
        self.entries
            .iter()
            .map(|(outcome, probability)| (outcome, *probability))
    }

    #[must_use]
    pub fn probability(&self, outcome: &Outcome) -> Option<f64> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == outcome)
            .map(|(_, probability)| *probability)
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, probability)| probability).sum()
    }

    #[must_use]
    pub fn to_dict(&self) -> BTreeMap<Outcome, f64> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn to_dataframe(&self) -> DataFrame {
        self.data.clone()
    }

    /// `[{"outcome": .., "probability": ..}, ..]` in table order.
    pub fn to_json(&self) -> Result<String, QueryError> {
        let records = self
            .entries
            .iter()
            .map(|(outcome, probability)| Record {
                outcome,
                probability: *probability,
            })
            .collect::<Vec<_>>();
        Ok(serde_json::to_string(&records)?)
    }
}

/// Same variables, same outcomes, probabilities within the looser of the
/// two tolerances.
impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        if self.variables != other.variables {
            return false;
        }
        let tolerance = self.tolerance.max(other.tolerance);
        let mine = self.to_dict();
        let theirs = other.to_dict();
        mine.len() == theirs.len()
            && mine.iter().all(|(outcome, probability)| {
                theirs
                    .get(outcome)
                    .is_some_and(|other| (probability - other).abs() <= tolerance)
            })
    }
}

impl<'a> IntoIterator for &'a Distribution {
    type Item = (&'a Outcome, f64);
    type IntoIter = Box<dyn Iterator<Item = (&'a Outcome, f64)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Distribution over {}:", self.variables.join(", "))?;
        write!(f, "{}", "-".repeat(RULE_WIDTH))?;
        for (outcome, probability) in self.entries.iter().take(self.preview_rows) {
            write!(f, "\n  {outcome}: {probability:.6}")?;
        }
        if self.entries.len() > self.preview_rows {
            write!(
                f,
                "\n  ... ({} more values)",
                self.entries.len() - self.preview_rows
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pf_calc::{ErrorKind, QueryConfig};
    use pf_expr::{Condition, VariableBuilder};
    use pf_frame::{DataFrame, GroupByOptions};
    use pf_types::{NullKind, Scalar, ValueKey};

    use super::{Distribution, DistributionResult};
    use crate::{Outcome, QueryResult};

    fn ints(values: &[i64]) -> Vec<Scalar> {
        values.iter().copied().map(Scalar::Int64).collect()
    }

    fn source() -> VariableBuilder {
        VariableBuilder::from_data(
            DataFrame::from_dict(
                &["x", "y", "z"],
                vec![
                    ("x", ints(&[1, 1, 2, 2, 3, 3])),
                    ("y", ints(&[1, 2, 1, 2, 1, 1])),
                    (
                        "z",
                        vec![
                            Scalar::from("a"),
                            Scalar::from("a"),
                            Scalar::from("b"),
                            Scalar::from("b"),
                            Scalar::from("a"),
                            Scalar::from("b"),
                        ],
                    ),
                ],
            )
            .expect("frame"),
        )
    }

    #[test]
    fn to_dict_uses_plain_keys_for_one_variable() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let result = DistributionResult::evaluate(&[x]).expect("distribution");
        let dict = result.to_dict();
        assert_eq!(dict.len(), 3);
        let third = 1.0 / 3.0;
        let dist = result.to_distribution();
        assert_eq!(dist.probability(&Outcome::single(2_i64)), Some(2.0 / 6.0));
        assert_eq!(dist.probability(&Outcome::single(9_i64)), None);
        for key in [1_i64, 2, 3] {
            assert!((dict[&Outcome::single(key)] - third).abs() < 1e-12);
        }
    }

    #[test]
    fn to_dict_uses_tuples_for_joint_distributions() {
        let source = source();
        let vars = source.get_variables(&["x", "z"]).expect("vars");
        let result = DistributionResult::evaluate(&vars).expect("joint");
        let dict = result.to_dict();
        assert_eq!(
            dict[&Outcome::joint([ValueKey::Int64(1), ValueKey::from("a")])],
            2.0 / 6.0
        );
        assert!((dict.values().sum::<f64>() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn chained_given_replaces_earlier_conditions() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let y = source.get_variable("y").expect("y");

        let base = DistributionResult::evaluate(std::slice::from_ref(&x)).expect("base");
        let once = base.given([y.eq(1_i64)]).expect("given y == 1");
        // y == 1 and y == 2 are disjoint, so this only succeeds if the first
        // condition is dropped.
        let twice = once.given([y.eq(2_i64)]).expect("given y == 2");

        assert!(base.conditions().is_empty());
        assert_eq!(once.conditions().len(), 1);
        assert_eq!(twice.conditions().len(), 1);
        assert_eq!(twice.variables().len(), 1);

        let dict = twice.to_dict();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict[&Outcome::single(1_i64)], 0.5);
        assert_eq!(dict[&Outcome::single(2_i64)], 0.5);
        assert_eq!(
            twice.to_distribution(),
            base.given([y.eq(2_i64)]).expect("direct").to_distribution()
        );
        assert_eq!(base.table().len(), 3);
    }

    #[test]
    fn stratified_keys_include_the_conditioning_variable() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let z = source.get_variable("z").expect("z");
        let result = DistributionResult::evaluate(&[x])
            .expect("base")
            .given([Condition::from(&z)])
            .expect("stratified");

        let dist = result.to_distribution();
        assert_eq!(dist.variables(), &["x".to_owned(), "z".to_owned()]);
        let per_stratum: f64 = dist
            .iter()
            .filter(|(outcome, _)| outcome.values()[1] == ValueKey::from("a"))
            .map(|(_, probability)| probability)
            .sum();
        assert!((per_stratum - 1.0).abs() < 1e-10);
    }

    #[test]
    fn zero_probability_given_is_a_probability_error() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let y = source.get_variable("y").expect("y");
        let err = DistributionResult::evaluate(&[x])
            .expect("base")
            .given([y.eq(42_i64)])
            .expect_err("impossible");
        assert_eq!(err.kind(), ErrorKind::Probability);
    }

    #[test]
    fn given_rejects_variables_from_another_frame() {
        let x = source().get_variable("x").expect("x");
        let foreign = source().get_variable("y").expect("y");
        let err = DistributionResult::evaluate(&[x])
            .expect("base")
            .given([foreign.eq(1_i64)])
            .expect_err("mixed");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("different dataframes cannot be mixed"));
    }

    #[test]
    fn equality_tolerates_rounding_but_not_shape_changes() {
        let source = source();
        let x = source.get_variable("x").expect("x");
        let dist = DistributionResult::evaluate(std::slice::from_ref(&x))
            .expect("distribution")
            .to_distribution();
        let again = DistributionResult::evaluate(&[x])
            .expect("distribution")
            .to_distribution();
        assert_eq!(dist, again);

        let nudged = DataFrame::from_dict(
            &["x", "probability"],
            vec![
                ("x", ints(&[1, 2, 3])),
                (
                    "probability",
                    vec![
                        Scalar::Float64(1.0 / 3.0 + 1e-12),
                        Scalar::Float64(1.0 / 3.0),
                        Scalar::Float64(1.0 / 3.0 - 1e-12),
                    ],
                ),
            ],
        )
        .expect("frame");
        assert_eq!(dist, Distribution::new(nudged, &["x"]).expect("nudged"));

        let fewer = DataFrame::from_dict(
            &["x", "probability"],
            vec![
                ("x", ints(&[1, 2])),
                ("probability", vec![Scalar::Float64(0.5), Scalar::Float64(0.5)]),
            ],
        )
        .expect("frame");
        assert_ne!(dist, Distribution::new(fewer, &["x"]).expect("fewer"));
    }

    #[test]
    fn equality_is_symmetric_across_tolerances() {
        let table = |p: f64| {
            DataFrame::from_dict(
                &["x", "probability"],
                vec![
                    ("x", ints(&[1, 2])),
                    ("probability", vec![Scalar::Float64(p), Scalar::Float64(1.0 - p)]),
                ],
            )
            .expect("frame")
        };
        let loose = QueryConfig {
            tolerance: 1e-6,
            ..QueryConfig::default()
        };
        let strict = Distribution::new(table(0.5), &["x"]).expect("strict");
        let relaxed = Distribution::with_config(table(0.5 + 1e-8), &["x"], &loose).expect("loose");
        assert_eq!(strict, relaxed);
        assert_eq!(relaxed, strict);

        let far = Distribution::with_config(table(0.51), &["x"], &loose).expect("far");
        assert_ne!(strict, far);
        assert_ne!(far, strict);
    }

    #[test]
    fn dropna_renormalises_over_present_keys() {
        let source = VariableBuilder::from_data(
            DataFrame::from_dict(
                &["x"],
                vec![(
                    "x",
                    vec![
                        Scalar::Int64(1),
                        Scalar::Null(NullKind::Null),
                        Scalar::Int64(2),
                        Scalar::Int64(2),
                    ],
                )],
            )
            .expect("frame"),
        );
        let x = source.get_variable("x").expect("x");
        let config = QueryConfig {
            group_by: GroupByOptions { dropna: true },
            ..QueryConfig::default()
        };
        let dist = DistributionResult::evaluate_with_config(&[x], config)
            .expect("distribution")
            .to_distribution();
        assert_eq!(dist.len(), 2);
        assert!((dist.total() - 1.0).abs() < 1e-10);
        let one = dist.probability(&Outcome::single(1_i64)).expect("x == 1");
        assert!((one - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn float_outcomes_are_looked_up_with_float_keys() {
        let source = VariableBuilder::from_data(
            DataFrame::from_dict(
                &["w"],
                vec![("w", vec![Scalar::Float64(1.0), Scalar::Float64(2.5)])],
            )
            .expect("frame"),
        );
        let w = source.get_variable("w").expect("w");
        let dist = DistributionResult::evaluate(&[w])
            .expect("distribution")
            .to_distribution();
        assert_eq!(dist.probability(&Outcome::single(1.0)), Some(0.5));
        assert_eq!(dist.probability(&Outcome::single(1_i64)), None);
    }

    #[test]
    fn display_truncates_after_preview_rows() {
        let data = DataFrame::from_dict(
            &["x", "probability"],
            vec![
                ("x", ints(&[1, 2, 3])),
                (
                    "probability",
                    vec![
                        Scalar::Float64(0.5),
                        Scalar::Float64(0.25),
                        Scalar::Float64(0.25),
                    ],
                ),
            ],
        )
        .expect("frame");
        let config = QueryConfig {
            preview_rows: 2,
            ..QueryConfig::default()
        };
        let dist = Distribution::with_config(data, &["x"], &config).expect("dist");
        let expected = format!(
            "Distribution over x:\n{}\n  1: 0.500000\n  2: 0.250000\n  ... (1 more values)",
            "-".repeat(50)
        );
        assert_eq!(dist.to_string(), expected);
    }

    #[test]
    fn json_records_follow_table_order() {
        let source = source();
        let vars = source.get_variables(&["y", "z"]).expect("vars");
        let dist = DistributionResult::evaluate(&vars)
            .expect("joint")
            .to_distribution();
        let json: serde_json::Value =
            serde_json::from_str(&dist.to_json().expect("json")).expect("parse");
        let records = json.as_array().expect("array");
        assert_eq!(records.len(), 4);
        assert_eq!(records[0]["outcome"], serde_json::json!([1, "a"]));
        assert_eq!(records[0]["probability"], serde_json::json!(2.0 / 6.0));
    }
}
