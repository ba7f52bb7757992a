use std::fmt;

use pf_types::ValueKey;
use serde::Serialize;

/// Key of one row of a distribution: a single value, or a tuple of values
/// when the distribution spans several columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Single(ValueKey),
    Joint(Vec<ValueKey>),
}

impl Outcome {
    /// Keys are dtype-exact: `Outcome::single(1_i64)` does not match the
    /// outcome `1.0` of a `Float64` column. Build the key with the column's
    /// dtype, e.g. `Outcome::single(1.0)`.
    #[must_use]
    pub fn single(value: impl Into<ValueKey>) -> Self {
        Self::Single(value.into())
    }

    #[must_use]
    pub fn joint<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ValueKey>,
    {
        Self::Joint(values.into_iter().map(Into::into).collect())
    }

    /// Wrap one row's key values; a single value stays unwrapped.
    pub(crate) fn from_keys(mut keys: Vec<ValueKey>) -> Self {
        if keys.len() == 1 {
            if let Some(key) = keys.pop() {
                return Self::Single(key);
            }
        }
        Self::Joint(keys)
    }

    #[must_use]
    pub fn values(&self) -> &[ValueKey] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Joint(values) => values,
        }
    }
}

impl From<ValueKey> for Outcome {
    fn from(value: ValueKey) -> Self {
        Self::Single(value)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(value) => write!(f, "{value}"),
            Self::Joint(values) => {
                f.write_str("(")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str(")")
            }
        }
    }
}
