use std::collections::HashMap;

use pf_types::{DType, Scalar};
use serde::{Deserialize, Serialize};

use crate::{Column, DataFrame, FrameError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupByOptions {
    /// Drop rows whose key contains a missing value. Off by default so
    /// missing values form their own group.
    pub dropna: bool,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum GroupKeyRef<'a> {
    Bool(bool),
    Int64(i64),
    FloatBits(u64),
    Utf8(&'a str),
    Missing,
}

impl<'a> GroupKeyRef<'a> {
    fn from_scalar(key: &'a Scalar) -> Self {
        match key {
            Scalar::Bool(v) => Self::Bool(*v),
            Scalar::Int64(v) => Self::Int64(*v),
            Scalar::Float64(v) if v.is_nan() => Self::Missing,
            Scalar::Float64(v) => {
                let canonical = if *v == 0.0 { 0.0_f64 } else { *v };
                Self::FloatBits(canonical.to_bits())
            }
            Scalar::Utf8(v) => Self::Utf8(v.as_str()),
            Scalar::Null(_) => Self::Missing,
        }
    }
}

/// Count rows per distinct combination of `keys`.
///
/// Output holds the key columns (original dtypes) followed by an `Int64`
/// column named `count_column`, one row per group in first-seen order.
pub fn group_count(
    frame: &DataFrame,
    keys: &[&str],
    count_column: &str,
    options: GroupByOptions,
) -> Result<DataFrame, FrameError> {
    if let Some(duplicate) = keys.iter().find(|key| **key == count_column) {
        return Err(FrameError::DuplicateColumn((*duplicate).to_owned()));
    }
    let key_columns = keys
        .iter()
        .map(|key| frame.require_column(key))
        .collect::<Result<Vec<_>, _>>()?;

    let mut ordering = Vec::<usize>::new();
    let mut slots = HashMap::<Vec<GroupKeyRef<'_>>, usize>::new();
    let mut counts = Vec::<i64>::new();

    for row in 0..frame.len() {
        let key = key_columns
            .iter()
            .map(|column| {
                column
                    .value(row)
                    .map_or(GroupKeyRef::Missing, GroupKeyRef::from_scalar)
            })
            .collect::<Vec<_>>();

        if options.dropna && key.contains(&GroupKeyRef::Missing) {
            continue;
        }

        let slot = *slots.entry(key).or_insert_with(|| {
            ordering.push(row);
            counts.push(0);
            counts.len() - 1
        });
        counts[slot] += 1;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(keys = ?keys, rows = frame.len(), groups = ordering.len(), "group_count");

    let mut columns = Vec::with_capacity(keys.len() + 1);
    for (name, column) in keys.iter().zip(&key_columns) {
        columns.push(((*name).to_owned(), column.take(&ordering)?));
    }
    let count_values = counts.into_iter().map(Scalar::Int64).collect();
    columns.push((
        count_column.to_owned(),
        Column::new(DType::Int64, count_values)?,
    ));

    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use pf_types::{DType, NullKind, Scalar};

    use super::{GroupByOptions, group_count};
    use crate::{DataFrame, FrameError};

    fn frame() -> DataFrame {
        DataFrame::from_dict(
            &["k", "v"],
            vec![
                (
                    "k",
                    vec![
                        Scalar::from("b"),
                        Scalar::from("a"),
                        Scalar::from("b"),
                        Scalar::Null(NullKind::Null),
                    ],
                ),
                (
                    "v",
                    vec![
                        Scalar::Int64(1),
                        Scalar::Int64(1),
                        Scalar::Int64(2),
                        Scalar::Int64(1),
                    ],
                ),
            ],
        )
        .expect("frame")
    }

    #[test]
    fn group_count_respects_first_seen_key_order() {
        let out = group_count(&frame(), &["k"], "count", GroupByOptions::default()).expect("groupby");
        assert_eq!(out.column_names(), vec!["k", "count"]);
        assert_eq!(
            out.column("k").expect("k").values(),
            &[Scalar::from("b"), Scalar::from("a"), Scalar::Null(NullKind::Null)]
        );
        assert_eq!(
            out.column("count").expect("count").values(),
            &[Scalar::Int64(2), Scalar::Int64(1), Scalar::Int64(1)]
        );
        assert_eq!(out.column("count").expect("count").dtype(), DType::Int64);
    }

    #[test]
    fn dropna_removes_missing_key_groups() {
        let out = group_count(&frame(), &["k"], "count", GroupByOptions { dropna: true })
            .expect("groupby");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn multi_key_groups_are_joint() {
        let out = group_count(&frame(), &["k", "v"], "count", GroupByOptions::default())
            .expect("groupby");
        assert_eq!(out.len(), 4);
        let total: i64 = out
            .column("count")
            .expect("count")
            .values()
            .iter()
            .map(|value| match value {
                Scalar::Int64(v) => *v,
                _ => 0,
            })
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn float_keys_fold_signed_zero() {
        let frame = DataFrame::from_dict(
            &["f"],
            vec![("f", vec![Scalar::Float64(0.0), Scalar::Float64(-0.0)])],
        )
        .expect("frame");
        let out = group_count(&frame, &["f"], "count", GroupByOptions::default()).expect("groupby");
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn empty_frame_keeps_column_shape() {
        let frame = DataFrame::from_dict(&["k"], vec![("k", Vec::new())]).expect("frame");
        let out = group_count(&frame, &["k"], "count", GroupByOptions::default()).expect("groupby");
        assert!(out.is_empty());
        assert_eq!(out.column_names(), vec!["k", "count"]);
    }

    #[test]
    fn key_named_like_count_column_is_rejected() {
        let err = group_count(&frame(), &["k"], "k", GroupByOptions::default())
            .expect_err("collision");
        assert!(matches!(err, FrameError::DuplicateColumn(name) if name == "k"));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: GroupByOptions = serde_json::from_str("{}").expect("json");
        assert!(!options.dropna);
    }
}
