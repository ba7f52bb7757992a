use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pf_frame::DataFrame;
use pf_types::Scalar;
use serde::{Deserialize, Serialize};

use crate::{Comparison, ExprError, Expression};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity token of one source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Shared, read-only reference to a source frame.
///
/// Clones share the same allocation and the same [`FrameId`]; two handles
/// built from equal frames are still distinct sources.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    id: FrameId,
    frame: Arc<DataFrame>,
}

impl FrameHandle {
    #[must_use]
    pub fn new(frame: DataFrame) -> Self {
        Self {
            id: FrameId::next(),
            frame: Arc::new(frame),
        }
    }

    #[must_use]
    pub fn id(&self) -> FrameId {
        self.id
    }

    #[must_use]
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    #[must_use]
    pub fn same_source(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl AsRef<DataFrame> for FrameHandle {
    fn as_ref(&self) -> &DataFrame {
        &self.frame
    }
}

/// A named column of one source frame.
///
/// Only [`VariableBuilder`] creates variables, so the column is known to
/// exist in the bound frame.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    handle: FrameHandle,
}

impl Variable {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn frame_id(&self) -> FrameId {
        self.handle.id()
    }

    #[must_use]
    pub fn frame(&self) -> &DataFrame {
        self.handle.frame()
    }

    #[must_use]
    pub fn handle(&self) -> &FrameHandle {
        &self.handle
    }

    /// Same column of the same source frame.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.name == other.name && self.handle.same_source(&other.handle)
    }

    #[must_use]
    pub fn eq(&self, value: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::Equal(value.into()))
    }

    #[must_use]
    pub fn ne(&self, value: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::NotEqual(value.into()))
    }

    #[must_use]
    pub fn lt(&self, value: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::LessThan(value.into()))
    }

    #[must_use]
    pub fn le(&self, value: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::LessOrEqual(value.into()))
    }

    #[must_use]
    pub fn gt(&self, value: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::GreaterThan(value.into()))
    }

    #[must_use]
    pub fn ge(&self, value: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::GreaterOrEqual(value.into()))
    }

    /// Open interval `lower < self < upper`; both endpoints are excluded.
    #[must_use]
    pub fn between(&self, lower: impl Into<Scalar>, upper: impl Into<Scalar>) -> Expression {
        self.compare(Comparison::Between {
            lower: lower.into(),
            upper: upper.into(),
        })
    }

    #[must_use]
    pub fn isin<I, T>(&self, values: I) -> Expression
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        self.compare(Comparison::In(values.into_iter().map(Into::into).collect()))
    }

    fn compare(&self, comparison: Comparison) -> Expression {
        Expression::from_parts(self.clone(), comparison)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Variable({})", self.name)
    }
}

/// Hands out [`Variable`]s bound to one shared frame.
#[derive(Debug, Clone)]
pub struct VariableBuilder {
    handle: FrameHandle,
}

impl VariableBuilder {
    /// Takes ownership of `frame`. Zero-row frames are accepted.
    #[must_use]
    pub fn from_data(frame: DataFrame) -> Self {
        Self::from_handle(FrameHandle::new(frame))
    }

    #[must_use]
    pub fn from_handle(handle: FrameHandle) -> Self {
        Self { handle }
    }

    #[must_use]
    pub fn handle(&self) -> &FrameHandle {
        &self.handle
    }

    /// Variables for `names`, or for every column in frame order when
    /// `names` is empty.
    ///
    /// All names are checked before any variable is created.
    pub fn get_variables(&self, names: &[&str]) -> Result<Vec<Variable>, ExprError> {
        let frame = self.handle.frame();
        let available = frame.column_names();

        let requested: Vec<&str> = if names.is_empty() {
            available.clone()
        } else {
            names.to_vec()
        };

        let mut missing = requested
            .iter()
            .filter(|name| !available.contains(name))
            .map(|name| (*name).to_owned())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            let mut available = available
                .iter()
                .map(|name| (*name).to_owned())
                .collect::<Vec<_>>();
            available.sort();
            return Err(ExprError::MissingColumns { missing, available });
        }

        Ok(requested
            .into_iter()
            .map(|name| Variable {
                name: name.to_owned(),
                handle: self.handle.clone(),
            })
            .collect())
    }

    pub fn get_variable(&self, name: &str) -> Result<Variable, ExprError> {
        let mut variables = self.get_variables(&[name])?;
        variables
            .pop()
            .ok_or_else(|| ExprError::MissingColumns {
                missing: vec![name.to_owned()],
                available: Vec::new(),
            })
    }
}
