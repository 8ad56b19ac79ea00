//! Turns a loaded frame into a rank payload
//!
//! Applies column selection, pulls label and auxiliary columns out of the
//! features and checks that every row-aligned array matches the feature rows.
//! Query groups are made contiguous over every row the rank read before its
//! slice is taken, so a centralized source never spreads one group over
//! several ranks.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;

use super::options::MatrixOptions;
use super::payload::{AuxField, TrainingPayload};

/// Arrays supplied in memory, aligned with the full source's row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachedArrays {
    pub label: Option<Array2<f64>>,
    pub aux: BTreeMap<AuxField, Array1<f64>>,
    pub feature_weights: Option<Array1<f64>>,
}

impl AttachedArrays {
    /// Whether any array must line up with source rows
    pub fn has_row_aligned(&self) -> bool {
        self.label.is_some() || !self.aux.is_empty()
    }
}

fn row_mismatch(field: AuxField, expected: usize, got: usize) -> MatrixError {
    if field == AuxField::Qid {
        return MatrixError::Validation(format!(
            "qid has {} entries for {} rows",
            got, expected
        ));
    }
    MatrixError::RowCountMismatch {
        field: field.name().to_string(),
        expected,
        got,
    }
}

/// Shape `frame` into the payload of one rank
///
/// `frame` holds every row the rank read; `rows` optionally narrows it to the
/// rank's slice. Attached arrays are checked against the frame before
/// slicing, since they follow the same row order. `rows` indexes the
/// qid-sorted order.
pub fn shape_payload(
    frame: DataFrame,
    rows: Option<&[usize]>,
    options: &MatrixOptions,
    attached: &AttachedArrays,
    descriptor: &str,
) -> Result<TrainingPayload> {
    let frame = match &options.columns {
        Some(columns) => frame.select(columns).map_err(|e| match e {
            MatrixError::MissingColumn { column, .. } => MatrixError::MissingColumn {
                column,
                descriptor: descriptor.to_string(),
            },
            other => other,
        })?,
        None => frame,
    };

    let label_names = options.label_columns();
    let named_aux = options.aux_columns();

    let referenced = label_names
        .iter()
        .map(String::as_str)
        .chain(named_aux.iter().map(|(_, c)| *c));
    for column in referenced {
        if frame.column_index(column).is_none() {
            return Err(MatrixError::MissingColumn {
                column: column.to_string(),
                descriptor: descriptor.to_string(),
            });
        }
    }

    let total = frame.num_rows();

    let label = match &attached.label {
        Some(values) => {
            if values.nrows() != total {
                return Err(MatrixError::RowCountMismatch {
                    field: "label".to_string(),
                    expected: total,
                    got: values.nrows(),
                });
            }
            Some(values.clone())
        }
        None if label_names.is_empty() => None,
        None => Some(frame.extract(&label_names)?),
    };

    let mut aux = BTreeMap::new();
    for (field, values) in &attached.aux {
        if values.len() != total {
            return Err(row_mismatch(*field, total, values.len()));
        }
        aux.insert(*field, values.clone());
    }
    for (field, column) in &named_aux {
        if let Some(values) = frame.column(column) {
            aux.insert(*field, values.to_owned());
        }
    }

    let mut excluded: Vec<String> = label_names;
    excluded.extend(named_aux.iter().map(|(_, c)| c.to_string()));
    excluded.extend(options.ignore.iter().cloned());
    let features = frame.drop_columns(&excluded);

    if let Some(weights) = &attached.feature_weights {
        if weights.len() != features.num_columns() {
            return Err(MatrixError::Validation(format!(
                "feature_weights has {} entries for {} feature columns",
                weights.len(),
                features.num_columns()
            )));
        }
    }

    let mut payload = TrainingPayload {
        feature_names: features.columns().to_vec(),
        data: features.into_values(),
        label,
        aux,
        feature_weights: attached.feature_weights.clone(),
    };
    sort_by_qid(&mut payload)?;
    if let Some(rows) = rows {
        select_rows(&mut payload, rows);
    }
    Ok(payload)
}

/// Keep `rows` of every row-aligned array, in the order given
fn select_rows(payload: &mut TrainingPayload, rows: &[usize]) {
    payload.data = payload.data.select(Axis(0), rows);
    if let Some(label) = &payload.label {
        payload.label = Some(label.select(Axis(0), rows));
    }
    for values in payload.aux.values_mut() {
        *values = values.select(Axis(0), rows);
    }
}

/// Stable-sort every row-aligned array by qid unless it is already
/// non-decreasing
pub fn sort_by_qid(payload: &mut TrainingPayload) -> Result<()> {
    let Some(qid) = payload.aux.get(&AuxField::Qid) else {
        return Ok(());
    };

    if let Some(row) = qid.iter().position(|q| q.is_nan()) {
        return Err(MatrixError::Validation(format!(
            "qid is NaN at row {}; group identifiers must be numeric",
            row
        )));
    }

    if qid.iter().zip(qid.iter().skip(1)).all(|(a, b)| a <= b) {
        return Ok(());
    }

    let mut order: Vec<usize> = (0..qid.len()).collect();
    order.sort_by(|&a, &b| qid[a].total_cmp(&qid[b]));
    select_rows(payload, &order);

    debug!(rows = order.len(), "Sorted payload rows by qid");
    Ok(())
}
