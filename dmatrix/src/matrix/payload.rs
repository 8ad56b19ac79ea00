//! Per-rank training payload handed to the boosting routine

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{concatenate, Array, Array1, Array2, ArrayView, ArrayView1, ArrayView2, Axis, RemoveAxis};
use serde::{Deserialize, Serialize};

use crate::errors::{MatrixError, Result};

/// Row-aligned auxiliary arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxField {
    Weight,
    BaseMargin,
    LabelLowerBound,
    LabelUpperBound,
    Qid,
}

impl AuxField {
    pub const ALL: [AuxField; 5] = [
        AuxField::Weight,
        AuxField::BaseMargin,
        AuxField::LabelLowerBound,
        AuxField::LabelUpperBound,
        AuxField::Qid,
    ];

    /// Parameter name expected by the training-matrix constructor
    pub fn name(&self) -> &'static str {
        match self {
            AuxField::Weight => "weight",
            AuxField::BaseMargin => "base_margin",
            AuxField::LabelLowerBound => "label_lower_bound",
            AuxField::LabelUpperBound => "label_upper_bound",
            AuxField::Qid => "qid",
        }
    }
}

impl fmt::Display for AuxField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value of the parameter mapping
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue<'a> {
    Matrix(ArrayView2<'a, f64>),
    Vector(ArrayView1<'a, f64>),
}

/// Materialized data of one rank
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingPayload {
    /// Feature column names, in source order
    pub feature_names: Vec<String>,

    /// Feature matrix, one row per sample
    pub data: Array2<f64>,

    /// Label; more than one column for multi-output tasks
    pub label: Option<Array2<f64>>,

    /// Present auxiliary arrays, each aligned with `data` rows
    pub aux: BTreeMap<AuxField, Array1<f64>>,

    /// Per-feature weights, aligned with `data` columns
    pub feature_weights: Option<Array1<f64>>,
}

impl TrainingPayload {
    pub fn num_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn aux(&self, field: AuxField) -> Option<&Array1<f64>> {
        self.aux.get(&field)
    }

    /// Label as a vector when it has exactly one column
    pub fn label_vector(&self) -> Option<ArrayView1<'_, f64>> {
        self.label
            .as_ref()
            .filter(|l| l.ncols() == 1)
            .map(|l| l.column(0))
    }

    /// Parameter mapping for the training-matrix constructor
    ///
    /// Only present fields appear. A single-column label is passed as a
    /// vector.
    pub fn to_params(&self) -> BTreeMap<&'static str, ParamValue<'_>> {
        let mut params = BTreeMap::new();
        params.insert("data", ParamValue::Matrix(self.data.view()));

        if let Some(label) = &self.label {
            let value = match self.label_vector() {
                Some(column) => ParamValue::Vector(column),
                None => ParamValue::Matrix(label.view()),
            };
            params.insert("label", value);
        }

        for (field, values) in &self.aux {
            params.insert(field.name(), ParamValue::Vector(values.view()));
        }

        if let Some(weights) = &self.feature_weights {
            params.insert("feature_weights", ParamValue::Vector(weights.view()));
        }
        params
    }

    /// Reassemble rank payloads, in the order given, into one payload
    pub fn concat(payloads: &[TrainingPayload]) -> Result<Self> {
        let Some(first) = payloads.first() else {
            return Err(MatrixError::Validation(
                "cannot concatenate zero payloads".to_string(),
            ));
        };

        for (i, p) in payloads.iter().enumerate().skip(1) {
            let label_width = |p: &TrainingPayload| p.label.as_ref().map(|l| l.ncols());
            if p.data.ncols() != first.data.ncols()
                || label_width(p) != label_width(first)
                || !p.aux.keys().eq(first.aux.keys())
            {
                return Err(MatrixError::Schema(format!(
                    "payload {} does not match the layout of payload 0",
                    i
                )));
            }
        }

        let data_views: Vec<_> = payloads.iter().map(|p| p.data.view()).collect();
        let data = stack(&data_views)?;

        let label = match first.label {
            Some(_) => {
                let views: Vec<_> = payloads
                    .iter()
                    .filter_map(|p| p.label.as_ref().map(|l| l.view()))
                    .collect();
                Some(stack(&views)?)
            }
            None => None,
        };

        let mut aux = BTreeMap::new();
        for field in first.aux.keys() {
            let views: Vec<_> = payloads
                .iter()
                .filter_map(|p| p.aux.get(field).map(|a| a.view()))
                .collect();
            aux.insert(*field, stack(&views)?);
        }

        Ok(Self {
            feature_names: first.feature_names.clone(),
            data,
            label,
            aux,
            feature_weights: first.feature_weights.clone(),
        })
    }
}

fn stack<D: RemoveAxis>(views: &[ArrayView<'_, f64, D>]) -> Result<Array<f64, D>> {
    concatenate(Axis(0), views)
        .map_err(|e| MatrixError::Schema(format!("cannot concatenate payloads: {}", e)))
}
