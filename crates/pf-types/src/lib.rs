#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn missing_for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Null(NullKind::NaN),
            DType::Null | DType::Bool | DType::Int64 | DType::Utf8 => Self::Null(NullKind::Null),
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
        }
    }

    /// Total order used for deterministic sorting.
    ///
    /// Numeric values compare by value across `Int64`/`Float64`, then
    /// booleans, then strings; missing values sort last.
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Int64(_) | Self::Float64(_), Self::Int64(_) | Self::Float64(_)) => {
                let lhs = self.to_f64().unwrap_or(f64::NAN);
                let rhs = other.to_f64().unwrap_or(f64::NAN);
                lhs.total_cmp(&rhs)
            }
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            _ => self.sort_rank().cmp(&other.sort_rank()),
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Self::Int64(_) | Self::Float64(_) => 0,
            Self::Bool(_) => 1,
            Self::Utf8(_) => 2,
            Self::Null(_) => 3,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null(NullKind::Null) => f.write_str("null"),
            Self::Null(NullKind::NaN) => f.write_str("NaN"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v:?}"),
            Self::Utf8(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int64(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

/// Hashable, totally ordered image of a [`Scalar`], used to key observed
/// outcomes.
///
/// Floats are keyed by canonical bit pattern: `-0.0` folds into `0.0` and
/// every NaN folds into [`ValueKey::Missing`]. Keys of different dtypes
/// never compare equal, so `Int64(1)` and `Float64(1.0)` are distinct.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ValueKey {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Missing,
}

impl ValueKey {
    fn rank(&self) -> u8 {
        match self {
            Self::Int64(_) => 0,
            Self::Float64(_) => 1,
            Self::Bool(_) => 2,
            Self::Utf8(_) => 3,
            Self::Missing => 4,
        }
    }
}

impl From<&Scalar> for ValueKey {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Null(_) => Self::Missing,
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) if v.is_nan() => Self::Missing,
            Scalar::Float64(v) => Self::Float64(if *v == 0.0 { 0.0 } else { *v }),
            Scalar::Utf8(v) => Self::Utf8(v.clone()),
        }
    }
}

impl From<Scalar> for ValueKey {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Utf8(v) => Self::Utf8(v),
            other => Self::from(&other),
        }
    }
}

impl From<bool> for ValueKey {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ValueKey {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for ValueKey {
    fn from(value: f64) -> Self {
        Self::from(Scalar::Float64(value))
    }
}

impl From<&str> for ValueKey {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for ValueKey {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a.to_bits() == b.to_bits(),
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Missing, Self::Missing) => true,
            _ => false,
        }
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Bool(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => v.to_bits().hash(state),
            Self::Utf8(v) => v.hash(state),
            Self::Missing => {}
        }
    }
}

impl PartialOrd for ValueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v:?}"),
            Self::Utf8(v) => f.write_str(v),
            Self::Missing => f.write_str("null"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("dtype coercion from {left:?} to {right:?} has no compatible common type")]
    IncompatibleDtypes { left: DType, right: DType },
    #[error("cannot cast scalar of dtype {from:?} to {to:?}")]
    InvalidCast { from: DType, to: DType },
    #[error("cannot cast float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

pub fn common_dtype(left: DType, right: DType) -> Result<DType, TypeError> {
    use DType::{Bool, Float64, Int64, Null};

    let out = match (left, right) {
        (a, b) if a == b => a,
        (Null, other) | (other, Null) => other,
        (Bool, Int64) | (Int64, Bool) => Int64,
        (Bool, Float64) | (Float64, Bool) => Float64,
        (Int64, Float64) | (Float64, Int64) => Float64,
        _ => return Err(TypeError::IncompatibleDtypes { left, right }),
    };

    Ok(out)
}

pub fn infer_dtype(values: &[Scalar]) -> Result<DType, TypeError> {
    let mut current = DType::Null;
    for value in values {
        current = common_dtype(current, value.dtype())?;
    }
    Ok(current)
}

pub fn cast_scalar(value: &Scalar, target: DType) -> Result<Scalar, TypeError> {
    cast_scalar_owned(value.clone(), target)
}

/// Owned variant of [`cast_scalar`]; values already in `target` pass
/// through without a clone.
pub fn cast_scalar_owned(value: Scalar, target: DType) -> Result<Scalar, TypeError> {
    let from = value.dtype();
    if let Scalar::Null(_) = value {
        return Ok(Scalar::missing_for_dtype(target));
    }
    if from == target {
        return Ok(value);
    }

    match (target, value) {
        (DType::Null, _) => Ok(Scalar::Null(NullKind::Null)),
        (DType::Int64, Scalar::Bool(v)) => Ok(Scalar::Int64(i64::from(v))),
        (DType::Int64, Scalar::Float64(v)) => {
            if !v.is_finite() || v != v.trunc() || v < i64::MIN as f64 || v > i64::MAX as f64 {
                return Err(TypeError::LossyFloatToInt { value: v });
            }
            Ok(Scalar::Int64(v as i64))
        }
        (DType::Float64, Scalar::Bool(v)) => Ok(Scalar::Float64(if v { 1.0 } else { 0.0 })),
        (DType::Float64, Scalar::Int64(v)) => Ok(Scalar::Float64(v as f64)),
        _ => Err(TypeError::InvalidCast { from, to: target }),
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;
    use std::collections::HashSet;

    use super::{DType, NullKind, Scalar, ValueKey, cast_scalar, common_dtype, infer_dtype};

    #[test]
    fn dtype_inference_coerces_numeric_values() {
        let values = vec![Scalar::Bool(true), Scalar::Int64(7), Scalar::Float64(3.5)];
        assert_eq!(
            infer_dtype(&values).expect("dtype should infer"),
            DType::Float64
        );
    }

    #[test]
    fn missing_values_get_target_missing_marker() {
        let missing = Scalar::Null(NullKind::Null);
        let cast = cast_scalar(&missing, DType::Float64).expect("missing casts");
        assert_eq!(cast, Scalar::Null(NullKind::NaN));
    }

    #[test]
    fn common_dtype_rejects_string_numeric_mix() {
        let err = common_dtype(DType::Utf8, DType::Int64).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "dtype coercion from Utf8 to Int64 has no compatible common type"
        );
    }

    #[test]
    fn total_cmp_sorts_numbers_across_dtypes_and_missing_last() {
        let mut values = vec![
            Scalar::Null(NullKind::Null),
            Scalar::Float64(2.5),
            Scalar::Int64(3),
            Scalar::Int64(-1),
            Scalar::Float64(f64::NAN),
        ];
        values.sort_by(Scalar::total_cmp);
        assert_eq!(values[0], Scalar::Int64(-1));
        assert_eq!(values[1], Scalar::Float64(2.5));
        assert_eq!(values[2], Scalar::Int64(3));
        assert!(values[3].is_missing());
        assert!(values[4].is_missing());
        assert_eq!(
            Scalar::from("a").total_cmp(&Scalar::Int64(1)),
            Ordering::Greater
        );
    }

    #[test]
    fn value_key_folds_signed_zero_and_nan() {
        let keys: HashSet<ValueKey> = [
            ValueKey::from(&Scalar::Float64(0.0)),
            ValueKey::from(&Scalar::Float64(-0.0)),
            ValueKey::from(&Scalar::Float64(f64::NAN)),
            ValueKey::from(&Scalar::Null(NullKind::Null)),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&ValueKey::Missing));
    }

    #[test]
    fn value_key_orders_within_dtype() {
        let mut keys = vec![
            ValueKey::from("b"),
            ValueKey::Missing,
            ValueKey::from("a"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![ValueKey::from("a"), ValueKey::from("b"), ValueKey::Missing]
        );
        assert!(ValueKey::from(1.5) < ValueKey::from(2.0));
    }

    #[test]
    fn scalar_display_keeps_float_marker() {
        assert_eq!(Scalar::Float64(1.0).to_string(), "1.0");
        assert_eq!(Scalar::Int64(5).to_string(), "5");
        assert_eq!(Scalar::from("cat").to_string(), "cat");
    }

    #[test]
    fn value_key_serializes_untagged() {
        let json = serde_json::to_string(&vec![
            ValueKey::from(1_i64),
            ValueKey::from("a"),
            ValueKey::Missing,
        ])
        .expect("serialize");
        assert_eq!(json, r#"[1,"a",null]"#);
    }
}
