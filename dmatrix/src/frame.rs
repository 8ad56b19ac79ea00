//! Uniform row-oriented payload shared by every source adapter
//!
//! Every adapter converts what it reads into a [`DataFrame`]: an ordered list
//! of column names over a row-major `f64` matrix. Downstream code (sharding,
//! label extraction, group sorting) only ever sees this shape.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};

use crate::errors::{MatrixError, Result};

/// Named columns over a `rows × columns` matrix of `f64`
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl DataFrame {
    /// Create a frame, checking that names match the column count
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(MatrixError::Schema(format!(
                "{} column names for {} columns",
                columns.len(),
                values.ncols()
            )));
        }

        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(MatrixError::Schema(format!("duplicate column '{}'", dup)));
        }

        Ok(Self { columns, values })
    }

    /// Wrap an unnamed array; columns are named by position (`"0"`, `"1"`, ...)
    pub fn from_array(values: Array2<f64>) -> Self {
        let columns = (0..values.ncols()).map(|i| i.to_string()).collect();
        Self { columns, values }
    }

    /// A frame with the given columns and no rows
    pub fn empty(columns: Vec<String>) -> Self {
        let values = Array2::zeros((0, columns.len()));
        Self { columns, values }
    }

    /// Build a frame from named column vectors of equal length
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let nrows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut values = Array2::zeros((nrows, columns.len()));
        let mut names = Vec::with_capacity(columns.len());

        for (j, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != nrows {
                return Err(MatrixError::RowCountMismatch {
                    field: name,
                    expected: nrows,
                    got: column.len(),
                });
            }
            values.column_mut(j).assign(&Array1::from(column));
            names.push(name);
        }

        Self::new(names, values)
    }

    /// Convert an Arrow record batch, casting every column to `f64`
    ///
    /// Nulls become `NaN`. Non-numeric columns fail with an Arrow cast error.
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let mut values = Array2::zeros((batch.num_rows(), batch.num_columns()));

        for (j, column) in batch.columns().iter().enumerate() {
            let casted = cast(column.as_ref(), &DataType::Float64)?;
            let floats = casted
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    MatrixError::Schema(format!(
                        "column '{}' did not cast to Float64",
                        schema.field(j).name()
                    ))
                })?;

            for (i, slot) in values.column_mut(j).iter_mut().enumerate() {
                *slot = if floats.is_null(i) {
                    f64::NAN
                } else {
                    floats.value(i)
                };
            }
        }

        let columns = schema.fields().iter().map(|f| f.name().clone()).collect();
        Self::new(columns, values)
    }

    /// Convert to an Arrow record batch of non-nullable `Float64` columns
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Float64, false))
            .collect();

        let arrays: Vec<ArrayRef> = self
            .values
            .columns()
            .into_iter()
            .map(|col| Arc::new(Float64Array::from(col.to_vec())) as ArrayRef)
            .collect();

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    pub fn num_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_columns(&self) -> usize {
        self.values.ncols()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// View of a single column by name
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|j| self.values.column(j))
    }

    /// Keep only `names`, in the order given
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| MatrixError::MissingColumn {
                        column: name.clone(),
                        descriptor: format!("frame with columns {:?}", self.columns),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(names.to_vec(), self.values.select(Axis(1), &indices))
    }

    /// Extract `names` as a `rows × names.len()` matrix
    pub fn extract(&self, names: &[String]) -> Result<Array2<f64>> {
        Ok(self.select(names)?.values)
    }

    /// Drop every column in `names`, keeping the relative order of the rest
    ///
    /// Names that are not present are ignored.
    pub fn drop_columns(&self, names: &[String]) -> Self {
        let drop: HashSet<&str> = names.iter().map(String::as_str).collect();
        let (keep_idx, keep_names): (Vec<usize>, Vec<String>) = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !drop.contains(name.as_str()))
            .map(|(i, name)| (i, name.clone()))
            .unzip();

        Self {
            columns: keep_names,
            values: self.values.select(Axis(1), &keep_idx),
        }
    }

    /// Rows at `indices`, in that order
    pub fn take_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), indices),
        }
    }

    /// Concatenate frames row-wise; every frame must share the same columns
    pub fn concat(frames: &[DataFrame]) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Ok(Self::empty(Vec::new()));
        };

        for (i, frame) in frames.iter().enumerate().skip(1) {
            if frame.columns != first.columns {
                return Err(MatrixError::Schema(format!(
                    "part {} has columns {:?}, expected {:?}",
                    i, frame.columns, first.columns
                )));
            }
        }

        let views: Vec<_> = frames.iter().map(|f| f.values.view()).collect();
        let values = concatenate(Axis(0), &views)
            .map_err(|e| MatrixError::Schema(format!("cannot concatenate parts: {}", e)))?;

        Ok(Self {
            columns: first.columns.clone(),
            values,
        })
    }
}
