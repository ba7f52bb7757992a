#![forbid(unsafe_code)]

//! Columnar frame engine used by the probability layers.
//!
//! Everything above this crate talks to tabular data through [`FrameOps`]:
//! column listing, row counting, predicate filtering, group-by counting,
//! sorting and column attachment. [`DataFrame`] is the in-memory
//! implementation. No operation mutates its receiver.

mod column;
mod groupby;
mod predicate;

use std::collections::BTreeMap;

use pf_types::{DType, Scalar};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use column::{Column, ColumnError, ValidityMask};
pub use groupby::{GroupByOptions, group_count};
pub use predicate::{ComparisonOp, Predicate, compare_scalars, evaluate_mask};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("column '{column}' has length {actual} but the frame has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("row mask has length {mask_len} but the frame has {row_count} rows")]
    MaskLength { mask_len: usize, row_count: usize },
    #[error(
        "cannot apply '{op}' between column '{column}' of dtype {left:?} and an operand of dtype {right:?}"
    )]
    IncomparableDtypes {
        column: String,
        op: ComparisonOp,
        left: DType,
        right: DType,
    },
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Capability set the probability layers need from a dataframe engine.
pub trait FrameOps: Sized {
    /// Column names in frame order.
    fn column_names(&self) -> Vec<&str>;

    fn row_count(&self) -> usize;

    fn column_values(&self, name: &str) -> Option<&[Scalar]>;

    /// New frame holding only the rows where `predicate` holds.
    fn filter(&self, predicate: &Predicate) -> Result<Self, FrameError>;

    /// One row per distinct key combination: key columns, then an `Int64`
    /// count column.
    fn group_count(
        &self,
        keys: &[&str],
        count_column: &str,
        options: GroupByOptions,
    ) -> Result<Self, FrameError>;

    /// Stable ascending sort over `keys`, missing values last.
    fn sort_by(&self, keys: &[&str]) -> Result<Self, FrameError>;

    /// New frame with `name` appended, or replaced when it already exists.
    fn with_column(&self, name: &str, dtype: DType, values: Vec<Scalar>)
    -> Result<Self, FrameError>;

    fn has_column(&self, name: &str) -> bool {
        self.column_names().contains(&name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    columns: BTreeMap<String, Column>,
    column_order: Vec<String>,
    row_count: usize,
}

impl DataFrame {
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, FrameError> {
        let row_count = columns.first().map_or(0, |(_, column)| column.len());
        let mut by_name = BTreeMap::new();
        let mut column_order = Vec::with_capacity(columns.len());

        for (name, column) in columns {
            if column.len() != row_count {
                return Err(FrameError::LengthMismatch {
                    column: name,
                    expected: row_count,
                    actual: column.len(),
                });
            }
            if by_name.contains_key(&name) {
                return Err(FrameError::DuplicateColumn(name));
            }
            column_order.push(name.clone());
            by_name.insert(name, column);
        }

        Ok(Self {
            columns: by_name,
            column_order,
            row_count,
        })
    }

    /// Build a frame from named value vectors, laid out in `order`.
    pub fn from_dict(order: &[&str], data: Vec<(&str, Vec<Scalar>)>) -> Result<Self, FrameError> {
        let mut by_name = data.into_iter().collect::<BTreeMap<_, _>>();
        let mut columns = Vec::with_capacity(order.len());
        for name in order {
            let values = by_name
                .remove(name)
                .ok_or_else(|| FrameError::UnknownColumn((*name).to_owned()))?;
            columns.push(((*name).to_owned(), Column::from_values(values)?));
        }
        if let Some(extra) = by_name.keys().next() {
            return Err(FrameError::UnknownColumn((*extra).to_owned()));
        }
        Self::new(columns)
    }

    /// Zero-row frame with untyped columns.
    pub fn empty(names: &[&str]) -> Result<Self, FrameError> {
        Self::new(
            names
                .iter()
                .map(|name| ((*name).to_owned(), Column::empty(DType::Null)))
                .collect(),
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.column_order.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn require_column(&self, name: &str) -> Result<&Column, FrameError> {
        self.column(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_owned()))
    }

    /// Columns in frame order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> + '_ {
        self.column_order
            .iter()
            .filter_map(|name| self.columns.get(name).map(|column| (name.as_str(), column)))
    }

    pub fn take_rows(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let columns = self
            .columns()
            .map(|(name, column)| -> Result<(String, Column), FrameError> {
                Ok((name.to_owned(), column.take(positions)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Self::new(columns)?;
        out.row_count = positions.len();
        Ok(out)
    }

    pub fn filter_rows(&self, mask: &[bool]) -> Result<Self, FrameError> {
        if mask.len() != self.row_count {
            return Err(FrameError::MaskLength {
                mask_len: mask.len(),
                row_count: self.row_count,
            });
        }
        let positions = mask
            .iter()
            .enumerate()
            .filter_map(|(idx, keep)| keep.then_some(idx))
            .collect::<Vec<_>>();
        self.take_rows(&positions)
    }

    pub fn filter(&self, predicate: &Predicate) -> Result<Self, FrameError> {
        let mask = evaluate_mask(predicate, self)?;
        let out = self.filter_rows(&mask)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(rows_in = self.row_count, rows_out = out.row_count, "filter");

        Ok(out)
    }

    pub fn sort_by(&self, keys: &[&str]) -> Result<Self, FrameError> {
        let key_columns = keys
            .iter()
            .map(|key| self.require_column(key))
            .collect::<Result<Vec<_>, _>>()?;

        let mut positions = (0..self.row_count).collect::<Vec<_>>();
        positions.sort_by(|&left, &right| {
            key_columns
                .iter()
                .map(|column| {
                    let values = column.values();
                    values[left].total_cmp(&values[right])
                })
                .find(|ordering| ordering.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        self.take_rows(&positions)
    }

    pub fn with_column(&self, name: &str, column: Column) -> Result<Self, FrameError> {
        if !self.column_order.is_empty() && column.len() != self.row_count {
            return Err(FrameError::LengthMismatch {
                column: name.to_owned(),
                expected: self.row_count,
                actual: column.len(),
            });
        }

        let mut columns = self
            .columns()
            .map(|(existing, column)| (existing.to_owned(), column.clone()))
            .collect::<Vec<_>>();
        match columns.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = column,
            None => columns.push((name.to_owned(), column)),
        }
        Self::new(columns)
    }
}

impl FrameOps for DataFrame {
    fn column_names(&self) -> Vec<&str> {
        DataFrame::column_names(self)
    }

    fn row_count(&self) -> usize {
        self.len()
    }

    fn column_values(&self, name: &str) -> Option<&[Scalar]> {
        self.column(name).map(Column::values)
    }

    fn filter(&self, predicate: &Predicate) -> Result<Self, FrameError> {
        DataFrame::filter(self, predicate)
    }

    fn group_count(
        &self,
        keys: &[&str],
        count_column: &str,
        options: GroupByOptions,
    ) -> Result<Self, FrameError> {
        group_count(self, keys, count_column, options)
    }

    fn sort_by(&self, keys: &[&str]) -> Result<Self, FrameError> {
        DataFrame::sort_by(self, keys)
    }

    fn with_column(
        &self,
        name: &str,
        dtype: DType,
        values: Vec<Scalar>,
    ) -> Result<Self, FrameError> {
        DataFrame::with_column(self, name, Column::new(dtype, values)?)
    }
}
