//! Data sources and the adapters that read them
//!
//! A [`DataSource`] is one physical input: an in-memory array, a dataframe,
//! a partitioned dataframe, a list of file paths or an externally
//! partitioned dataset handle. Exactly one registered [`SourceAdapter`]
//! claims each source; the [`AdapterRegistry`] enforces that.
//!
//! ## Built-in adapters, in registry order
//!
//! | Adapter | Claims | Partitions | Distributable |
//! |---------|--------|------------|---------------|
//! | `array` | `DataSource::Array` | 1 | no |
//! | `frame` | `DataSource::Frame` | 1 | no |
//! | `partitioned-frame` | `DataSource::PartitionedFrame` | one per part | yes |
//! | `csv` | paths ending in `.csv` / `.tsv` | one per file | multi-file only |
//! | `parquet` | paths ending in `.parquet` / `.pq` | row groups or row ranges (1 file), files | yes |
//! | `dataset` | `DataSource::Dataset` | one per block | yes |

pub mod adapter;
pub mod csv;
pub mod dataset;
pub mod memory;
pub mod parquet;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;
use crate::sharding::{sharding_indices, ShardingMode};

pub use adapter::{AdapterRegistry, SourceAdapter};
pub use csv::CsvAdapter;
pub use dataset::DatasetAdapter;
pub use memory::{ArrayAdapter, FrameAdapter, PartitionedFrameAdapter};
pub use parquet::ParquetAdapter;

/// How a source's rows can be divided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partitioning {
    /// Rows can be sliced directly (arrays, single-process dataframes)
    Independent,
    /// Source arrives already split (file collections, partitioned frames, datasets)
    External,
}

/// Externally partitioned dataset handle
///
/// Implementations read one block at a time so that a rank only touches the
/// blocks assigned to it.
pub trait DatasetHandle: Send + Sync + fmt::Debug {
    /// Number of independently readable blocks
    fn num_blocks(&self) -> usize;

    /// Read a single block
    fn read_block(&self, index: usize) -> Result<DataFrame>;

    /// Stable identity of the dataset, used for matrix fingerprints
    fn fingerprint(&self) -> String;

    /// Column names shared by every block
    fn columns(&self) -> Vec<String>;

    /// Total row count if known without reading blocks
    fn num_rows(&self) -> Option<usize> {
        None
    }
}

/// A dataframe split into ordered partitions that share one schema
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedFrame {
    partitions: Vec<DataFrame>,
}

impl PartitionedFrame {
    pub fn new(partitions: Vec<DataFrame>) -> Result<Self> {
        let Some(first) = partitions.first() else {
            return Err(MatrixError::Config(
                "partitioned frame needs at least one partition".to_string(),
            ));
        };

        if let Some((i, bad)) = partitions
            .iter()
            .enumerate()
            .find(|(_, p)| p.columns() != first.columns())
        {
            return Err(MatrixError::Schema(format!(
                "partition {} has columns {:?}, expected {:?}",
                i,
                bad.columns(),
                first.columns()
            )));
        }

        Ok(Self { partitions })
    }

    /// Split a frame into `n` contiguous partitions of near-equal size
    pub fn split(frame: &DataFrame, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(MatrixError::Config(
                "cannot split a frame into 0 partitions".to_string(),
            ));
        }
        let parts = (0..n)
            .map(|rank| {
                let rows = sharding_indices(ShardingMode::Batch, rank, n, frame.num_rows());
                frame.take_rows(&rows)
            })
            .collect();
        Self::new(parts)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(DataFrame::num_rows).sum()
    }

    pub fn partitions(&self) -> &[DataFrame] {
        &self.partitions
    }
}

/// One physical input to a matrix
#[derive(Debug, Clone)]
pub enum DataSource {
    /// In-memory array; columns are named by position
    Array(Array2<f64>),
    /// Single-process dataframe
    Frame(DataFrame),
    /// Distributed dataframe
    PartitionedFrame(PartitionedFrame),
    /// One or more files
    Paths(Vec<PathBuf>),
    /// Externally partitioned dataset
    Dataset(Arc<dyn DatasetHandle>),
}

impl DataSource {
    pub fn array(values: Array2<f64>) -> Self {
        DataSource::Array(values)
    }

    pub fn frame(frame: DataFrame) -> Self {
        DataSource::Frame(frame)
    }

    pub fn partitioned(frame: PartitionedFrame) -> Self {
        DataSource::PartitionedFrame(frame)
    }

    /// A single file; a leading `file://` is stripped
    pub fn path(path: impl AsRef<str>) -> Self {
        DataSource::Paths(vec![normalize_path(path.as_ref())])
    }

    /// A list of files; leading `file://` prefixes are stripped
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        DataSource::Paths(
            paths
                .into_iter()
                .map(|p| normalize_path(p.as_ref()))
                .collect(),
        )
    }

    pub fn dataset(handle: Arc<dyn DatasetHandle>) -> Self {
        DataSource::Dataset(handle)
    }

    /// Short description used in error messages and logs
    pub fn describe(&self) -> String {
        match self {
            DataSource::Array(a) => format!("array({}x{})", a.nrows(), a.ncols()),
            DataSource::Frame(f) => format!("frame({}x{})", f.num_rows(), f.num_columns()),
            DataSource::PartitionedFrame(p) => {
                format!("partitioned frame({} partitions)", p.num_partitions())
            }
            DataSource::Paths(paths) => {
                let names: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                format!("paths[{}]", names.join(", "))
            }
            DataSource::Dataset(d) => format!("dataset({})", d.fingerprint()),
        }
    }

    /// Feed a stable description of this source into a fingerprint hasher
    ///
    /// In-memory data is hashed by value; files by path; datasets by their
    /// own fingerprint.
    pub fn update_fingerprint(&self, hasher: &mut blake3::Hasher) {
        match self {
            DataSource::Array(a) => {
                hasher.update(b"array");
                hash_matrix(hasher, a);
            }
            DataSource::Frame(f) => {
                hasher.update(b"frame");
                hash_frame(hasher, f);
            }
            DataSource::PartitionedFrame(p) => {
                hasher.update(b"partitioned");
                for part in p.partitions() {
                    hash_frame(hasher, part);
                }
            }
            DataSource::Paths(paths) => {
                hasher.update(b"paths");
                for path in paths {
                    hasher.update(path.to_string_lossy().as_bytes());
                    hasher.update(&[0]);
                }
            }
            DataSource::Dataset(d) => {
                hasher.update(b"dataset");
                hasher.update(d.fingerprint().as_bytes());
            }
        }
    }
}

impl From<Array2<f64>> for DataSource {
    fn from(values: Array2<f64>) -> Self {
        DataSource::Array(values)
    }
}

impl From<DataFrame> for DataSource {
    fn from(frame: DataFrame) -> Self {
        DataSource::Frame(frame)
    }
}

impl From<PartitionedFrame> for DataSource {
    fn from(frame: PartitionedFrame) -> Self {
        DataSource::PartitionedFrame(frame)
    }
}

fn normalize_path(raw: &str) -> PathBuf {
    PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw))
}

/// Lowercased extension check that tolerates paths without one
pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            extensions.iter().any(|want| *want == e)
        })
        .unwrap_or(false)
}

pub(crate) fn hash_matrix(hasher: &mut blake3::Hasher, values: &Array2<f64>) {
    hasher.update(&(values.nrows() as u64).to_le_bytes());
    hasher.update(&(values.ncols() as u64).to_le_bytes());
    for v in values.iter() {
        hasher.update(&v.to_le_bytes());
    }
}

fn hash_frame(hasher: &mut blake3::Hasher, frame: &DataFrame) {
    for name in frame.columns() {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hash_matrix(hasher, frame.values());
}
