//! Construction of a [`DistributedMatrix`]

use std::sync::Arc;

use ndarray::{Array1, Array2, Axis};
use tracing::info;

use crate::errors::Result;
use crate::sharding::{DistributedMode, ShardingMode};
use crate::source::{AdapterRegistry, DataSource};

use super::consistency::AttachedArrays;
use super::materializer::DistributedMatrix;
use super::options::{LabelColumns, MatrixOptions};
use super::payload::AuxField;

/// Where the label comes from
#[derive(Debug, Clone, PartialEq)]
pub enum LabelSpec {
    Column(String),
    /// Several columns, for multi-output tasks
    Columns(Vec<String>),
    /// In-memory label aligned with the source rows
    Values(Array2<f64>),
}

impl From<&str> for LabelSpec {
    fn from(column: &str) -> Self {
        LabelSpec::Column(column.to_string())
    }
}

impl From<String> for LabelSpec {
    fn from(column: String) -> Self {
        LabelSpec::Column(column)
    }
}

impl From<Vec<String>> for LabelSpec {
    fn from(columns: Vec<String>) -> Self {
        LabelSpec::Columns(columns)
    }
}

impl From<Array1<f64>> for LabelSpec {
    fn from(values: Array1<f64>) -> Self {
        LabelSpec::Values(values.insert_axis(Axis(1)))
    }
}

impl From<Array2<f64>> for LabelSpec {
    fn from(values: Array2<f64>) -> Self {
        LabelSpec::Values(values)
    }
}

/// Where an auxiliary field comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSpec {
    Name(String),
    Values(Array1<f64>),
}

impl From<&str> for ColumnSpec {
    fn from(column: &str) -> Self {
        ColumnSpec::Name(column.to_string())
    }
}

impl From<String> for ColumnSpec {
    fn from(column: String) -> Self {
        ColumnSpec::Name(column)
    }
}

impl From<Array1<f64>> for ColumnSpec {
    fn from(values: Array1<f64>) -> Self {
        ColumnSpec::Values(values)
    }
}

/// Builder for [`DistributedMatrix`]
///
/// Construction records configuration and classifies the source. Unless
/// `lazy` is set, the load mode is resolved immediately and, when
/// `num_actors` is known, the plan and its sufficiency check run too. No
/// partition is read here.
pub struct MatrixBuilder {
    source: DataSource,
    options: MatrixOptions,
    attached: AttachedArrays,
    registry: Option<AdapterRegistry>,
}

impl MatrixBuilder {
    pub fn new(source: impl Into<DataSource>) -> Self {
        Self {
            source: source.into(),
            options: MatrixOptions::default(),
            attached: AttachedArrays::default(),
            registry: None,
        }
    }

    /// Replace every option; call before the per-field setters
    pub fn options(mut self, options: MatrixOptions) -> Self {
        self.options = options;
        self
    }

    pub fn label(mut self, label: impl Into<LabelSpec>) -> Self {
        match label.into() {
            LabelSpec::Column(column) => {
                self.options.label = Some(LabelColumns::One(column));
                self.attached.label = None;
            }
            LabelSpec::Columns(columns) => {
                self.options.label = Some(LabelColumns::Many(columns));
                self.attached.label = None;
            }
            LabelSpec::Values(values) => {
                self.options.label = None;
                self.attached.label = Some(values);
            }
        }
        self
    }

    pub fn aux(mut self, field: AuxField, spec: impl Into<ColumnSpec>) -> Self {
        match spec.into() {
            ColumnSpec::Name(column) => {
                *self.options.aux_column_mut(field) = Some(column);
                self.attached.aux.remove(&field);
            }
            ColumnSpec::Values(values) => {
                *self.options.aux_column_mut(field) = None;
                self.attached.aux.insert(field, values);
            }
        }
        self
    }

    pub fn weight(self, spec: impl Into<ColumnSpec>) -> Self {
        self.aux(AuxField::Weight, spec)
    }

    pub fn base_margin(self, spec: impl Into<ColumnSpec>) -> Self {
        self.aux(AuxField::BaseMargin, spec)
    }

    pub fn label_lower_bound(self, spec: impl Into<ColumnSpec>) -> Self {
        self.aux(AuxField::LabelLowerBound, spec)
    }

    pub fn label_upper_bound(self, spec: impl Into<ColumnSpec>) -> Self {
        self.aux(AuxField::LabelUpperBound, spec)
    }

    pub fn qid(self, spec: impl Into<ColumnSpec>) -> Self {
        self.aux(AuxField::Qid, spec)
    }

    /// Per-feature weights, one per feature column
    pub fn feature_weights(mut self, weights: Array1<f64>) -> Self {
        self.attached.feature_weights = Some(weights);
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn ignore<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.ignore = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn sharding(mut self, sharding: ShardingMode) -> Self {
        self.options.sharding = sharding;
        self
    }

    pub fn distributed(mut self, distributed: DistributedMode) -> Self {
        self.options.distributed = distributed;
        self
    }

    pub fn num_actors(mut self, num_actors: usize) -> Self {
        self.options.num_actors = Some(num_actors);
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.options.lazy = lazy;
        self
    }

    /// Classify with a custom adapter registry instead of the built-in one
    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Result<DistributedMatrix> {
        self.options.validate()?;

        let registry = self.registry.unwrap_or_default();
        let adapter = registry.resolve(&self.source)?;
        let descriptor = self.source.describe();
        let lazy = self.options.lazy;
        let num_actors = self.options.num_actors;

        let matrix = DistributedMatrix::new(
            self.source,
            Arc::clone(&adapter),
            self.options,
            self.attached,
        )?;

        if !lazy {
            matrix.load_mode()?;
            if let Some(n) = num_actors {
                matrix.plan(n)?.check_sufficiency(&descriptor, false)?;
            }
        }

        info!(
            source = %descriptor,
            adapter = adapter.name(),
            lazy,
            fingerprint = %matrix.fingerprint(),
            "Created distributed matrix"
        );
        Ok(matrix)
    }
}
