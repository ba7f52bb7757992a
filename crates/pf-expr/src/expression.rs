use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use pf_frame::{ComparisonOp, Predicate};
use pf_types::Scalar;
use serde::{Deserialize, Serialize};

use crate::{ExprError, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    In,
}

impl ExprOp {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Between => "between",
            Self::In => "in",
        }
    }
}

impl FromStr for ExprOp {
    type Err = ExprError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "between" => Ok(Self::Between),
            "in" => Ok(Self::In),
            other => Err(ExprError::UnknownOperator(other.to_owned())),
        }
    }
}

impl fmt::Display for ExprOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Operator together with the operands it requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Equal(Scalar),
    NotEqual(Scalar),
    LessThan(Scalar),
    LessOrEqual(Scalar),
    GreaterThan(Scalar),
    GreaterOrEqual(Scalar),
    Between { lower: Scalar, upper: Scalar },
    In(Vec<Scalar>),
}

impl Comparison {
    #[must_use]
    pub fn op(&self) -> ExprOp {
        match self {
            Self::Equal(_) => ExprOp::Eq,
            Self::NotEqual(_) => ExprOp::Ne,
            Self::LessThan(_) => ExprOp::Lt,
            Self::LessOrEqual(_) => ExprOp::Le,
            Self::GreaterThan(_) => ExprOp::Gt,
            Self::GreaterOrEqual(_) => ExprOp::Ge,
            Self::Between { .. } => ExprOp::Between,
            Self::In(_) => ExprOp::In,
        }
    }

    fn to_predicate(&self, column: &str) -> Predicate {
        let single = |op: ComparisonOp, value: &Scalar| Predicate::compare(column, op, value.clone());
        match self {
            Self::Equal(value) => single(ComparisonOp::Eq, value),
            Self::NotEqual(value) => single(ComparisonOp::Ne, value),
            Self::LessThan(value) => single(ComparisonOp::Lt, value),
            Self::LessOrEqual(value) => single(ComparisonOp::Le, value),
            Self::GreaterThan(value) => single(ComparisonOp::Gt, value),
            Self::GreaterOrEqual(value) => single(ComparisonOp::Ge, value),
            Self::Between { lower, upper } => Predicate::And {
                children: vec![single(ComparisonOp::Gt, lower), single(ComparisonOp::Lt, upper)],
            },
            Self::In(values) => Predicate::IsIn {
                column: column.to_owned(),
                values: values.clone(),
            },
        }
    }
}

/// Untyped operand accepted by [`Expression::new`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Scalar(Scalar),
    Collection(Vec<Scalar>),
}

impl From<Scalar> for ExprValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<Scalar>> for ExprValue {
    fn from(values: Vec<Scalar>) -> Self {
        Self::Collection(values)
    }
}

impl From<bool> for ExprValue {
    fn from(value: bool) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<i64> for ExprValue {
    fn from(value: i64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<f64> for ExprValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value.into())
    }
}

impl From<&str> for ExprValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.into())
    }
}

/// A single comparison on one variable.
#[derive(Debug, Clone)]
pub struct Expression {
    variable: Variable,
    comparison: Comparison,
}

impl Expression {
    /// Build from an operator token, checking that the operands fit it.
    pub fn new(
        variable: &Variable,
        op: &str,
        value: impl Into<ExprValue>,
        upper_bound: Option<Scalar>,
    ) -> Result<Self, ExprError> {
        let op = op.parse::<ExprOp>()?;
        let invalid = |expected: &'static str| ExprError::InvalidOperand { op, expected };

        let comparison = match (op, value.into(), upper_bound) {
            (ExprOp::Between, ExprValue::Scalar(lower), Some(upper)) => {
                Comparison::Between { lower, upper }
            }
            (ExprOp::Between, ExprValue::Scalar(_), None) => {
                return Err(ExprError::MissingUpperBound);
            }
            (ExprOp::Between, ExprValue::Collection(_), _) => {
                return Err(invalid("a scalar lower bound"));
            }
            (ExprOp::In, ExprValue::Collection(values), None) => Comparison::In(values),
            (ExprOp::In, ExprValue::Collection(_), Some(_)) => {
                return Err(invalid("no upper bound"));
            }
            (ExprOp::In, ExprValue::Scalar(_), _) => return Err(invalid("a collection")),
            (_, ExprValue::Collection(_), _) => return Err(invalid("a single value")),
            (_, _, Some(_)) => return Err(invalid("no upper bound")),
            (ExprOp::Eq, ExprValue::Scalar(value), None) => Comparison::Equal(value),
            (ExprOp::Ne, ExprValue::Scalar(value), None) => Comparison::NotEqual(value),
            (ExprOp::Lt, ExprValue::Scalar(value), None) => Comparison::LessThan(value),
            (ExprOp::Le, ExprValue::Scalar(value), None) => Comparison::LessOrEqual(value),
            (ExprOp::Gt, ExprValue::Scalar(value), None) => Comparison::GreaterThan(value),
            (ExprOp::Ge, ExprValue::Scalar(value), None) => Comparison::GreaterOrEqual(value),
        };

        Ok(Self::from_parts(variable.clone(), comparison))
    }

    #[must_use]
    pub fn from_parts(variable: Variable, comparison: Comparison) -> Self {
        Self {
            variable,
            comparison,
        }
    }

    #[must_use]
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    #[must_use]
    pub fn comparison(&self) -> &Comparison {
        &self.comparison
    }

    #[must_use]
    pub fn op(&self) -> ExprOp {
        self.comparison.op()
    }

    /// `between` becomes the open interval `lower < x < upper`.
    #[must_use]
    pub fn to_predicate(&self) -> Predicate {
        self.comparison.to_predicate(self.variable.name())
    }

    #[must_use]
    pub fn and(self, other: impl Into<ExprNode>) -> ExprNode {
        ExprNode::from(self).and(other)
    }

    #[must_use]
    pub fn or(self, other: impl Into<ExprNode>) -> ExprNode {
        ExprNode::from(self).or(other)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.variable.name();
        match &self.comparison {
            Comparison::Between { lower, upper } => {
                write!(f, "Expression({lower} < {name} < {upper})")
            }
            Comparison::In(values) => {
                f.write_str("Expression(")?;
                f.write_str(name)?;
                f.write_str(" in [")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    match value {
                        Scalar::Utf8(text) => write!(f, "{text:?}")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("])")
            }
            Comparison::Equal(value)
            | Comparison::NotEqual(value)
            | Comparison::LessThan(value)
            | Comparison::LessOrEqual(value)
            | Comparison::GreaterThan(value)
            | Comparison::GreaterOrEqual(value) => {
                write!(f, "Expression({name} {} {value})", self.op())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    fn joiner(self) -> &'static str {
        match self {
            Self::And => " & ",
            Self::Or => " | ",
        }
    }
}

impl FromStr for Logic {
    type Err = ExprError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if token.eq_ignore_ascii_case("and") {
            Ok(Self::And)
        } else if token.eq_ignore_ascii_case("or") {
            Ok(Self::Or)
        } else {
            Err(ExprError::UnknownLogic(token.to_owned()))
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// AND/OR over one or more child nodes, folded left to right.
#[derive(Debug, Clone)]
pub struct CompositeExpression {
    logic: Logic,
    children: Vec<ExprNode>,
}

impl CompositeExpression {
    pub fn new(logic: &str, children: Vec<ExprNode>) -> Result<Self, ExprError> {
        let logic = logic.parse::<Logic>()?;
        if children.is_empty() {
            return Err(ExprError::EmptyComposite(logic));
        }
        Ok(Self { logic, children })
    }

    fn binary(logic: Logic, left: ExprNode, right: ExprNode) -> Self {
        Self {
            logic,
            children: vec![left, right],
        }
    }

    #[must_use]
    pub fn logic(&self) -> Logic {
        self.logic
    }

    #[must_use]
    pub fn children(&self) -> &[ExprNode] {
        &self.children
    }

    #[must_use]
    pub fn to_predicate(&self) -> Predicate {
        let children = self.children.iter().map(ExprNode::to_predicate).collect();
        match self.logic {
            Logic::And => Predicate::And { children },
            Logic::Or => Predicate::Or { children },
        }
    }

    #[must_use]
    pub fn and(self, other: impl Into<ExprNode>) -> ExprNode {
        ExprNode::from(self).and(other)
    }

    #[must_use]
    pub fn or(self, other: impl Into<ExprNode>) -> ExprNode {
        ExprNode::from(self).or(other)
    }
}

impl fmt::Display for CompositeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (idx, child) in self.children.iter().enumerate() {
            if idx > 0 {
                f.write_str(self.logic.joiner())?;
            }
            write!(f, "{child}")?;
        }
        f.write_str(")")
    }
}

/// A predicate tree over variables.
#[derive(Debug, Clone)]
pub enum ExprNode {
    Leaf(Expression),
    Composite(CompositeExpression),
}

impl ExprNode {
    #[must_use]
    pub fn and(self, other: impl Into<ExprNode>) -> Self {
        Self::Composite(CompositeExpression::binary(Logic::And, self, other.into()))
    }

    #[must_use]
    pub fn or(self, other: impl Into<ExprNode>) -> Self {
        Self::Composite(CompositeExpression::binary(Logic::Or, self, other.into()))
    }

    #[must_use]
    pub fn to_predicate(&self) -> Predicate {
        match self {
            Self::Leaf(expression) => expression.to_predicate(),
            Self::Composite(composite) => composite.to_predicate(),
        }
    }

    /// Every referenced variable once, first-seen order.
    #[must_use]
    pub fn variables(&self) -> Vec<&Variable> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a Variable>) {
        match self {
            Self::Leaf(expression) => {
                let variable = expression.variable();
                if !out.iter().any(|seen| seen.same_as(variable)) {
                    out.push(variable);
                }
            }
            Self::Composite(composite) => {
                for child in &composite.children {
                    child.collect_variables(out);
                }
            }
        }
    }
}

impl From<Expression> for ExprNode {
    fn from(expression: Expression) -> Self {
        Self::Leaf(expression)
    }
}

impl From<CompositeExpression> for ExprNode {
    fn from(composite: CompositeExpression) -> Self {
        Self::Composite(composite)
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(expression) => fmt::Display::fmt(expression, f),
            Self::Composite(composite) => fmt::Display::fmt(composite, f),
        }
    }
}

impl<T: Into<ExprNode>> BitAnd<T> for ExprNode {
    type Output = ExprNode;

    fn bitand(self, rhs: T) -> ExprNode {
        self.and(rhs)
    }
}

impl<T: Into<ExprNode>> BitOr<T> for ExprNode {
    type Output = ExprNode;

    fn bitor(self, rhs: T) -> ExprNode {
        self.or(rhs)
    }
}

impl<T: Into<ExprNode>> BitAnd<T> for Expression {
    type Output = ExprNode;

    fn bitand(self, rhs: T) -> ExprNode {
        self.and(rhs)
    }
}

impl<T: Into<ExprNode>> BitOr<T> for Expression {
    type Output = ExprNode;

    fn bitor(self, rhs: T) -> ExprNode {
        self.or(rhs)
    }
}
