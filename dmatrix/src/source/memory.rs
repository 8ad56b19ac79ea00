//! Adapters for in-memory sources

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;

use super::adapter::{check_partitions, SourceAdapter};
use super::{DataSource, Partitioning};

fn mismatch(adapter: &str, source: &DataSource) -> MatrixError {
    MatrixError::Config(format!(
        "{} adapter cannot read {}",
        adapter,
        source.describe()
    ))
}

/// In-memory `f64` array; one atomic partition
pub struct ArrayAdapter;

impl SourceAdapter for ArrayAdapter {
    fn name(&self) -> &'static str {
        "array"
    }

    fn matches(&self, source: &DataSource) -> bool {
        matches!(source, DataSource::Array(_))
    }

    fn partitioning(&self, _source: &DataSource) -> Partitioning {
        Partitioning::Independent
    }

    fn partition_count(&self, _source: &DataSource) -> Result<usize> {
        Ok(1)
    }

    fn is_distributable(&self, _source: &DataSource) -> bool {
        false
    }

    fn row_count(&self, source: &DataSource) -> Result<Option<usize>> {
        match source {
            DataSource::Array(a) => Ok(Some(a.nrows())),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn columns(&self, source: &DataSource) -> Result<Vec<String>> {
        match source {
            DataSource::Array(a) => Ok((0..a.ncols()).map(|i| i.to_string()).collect()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame> {
        let DataSource::Array(values) = source else {
            return Err(mismatch(self.name(), source));
        };
        check_partitions(self.name(), partitions, 1)?;

        let frame = DataFrame::from_array(values.clone());
        if partitions.is_empty() {
            return Ok(DataFrame::empty(frame.columns().to_vec()));
        }
        Ok(frame)
    }
}

/// Single-process dataframe; one atomic partition
pub struct FrameAdapter;

impl SourceAdapter for FrameAdapter {
    fn name(&self) -> &'static str {
        "frame"
    }

    fn matches(&self, source: &DataSource) -> bool {
        matches!(source, DataSource::Frame(_))
    }

    fn partitioning(&self, _source: &DataSource) -> Partitioning {
        Partitioning::Independent
    }

    fn partition_count(&self, _source: &DataSource) -> Result<usize> {
        Ok(1)
    }

    fn is_distributable(&self, _source: &DataSource) -> bool {
        false
    }

    fn row_count(&self, source: &DataSource) -> Result<Option<usize>> {
        match source {
            DataSource::Frame(f) => Ok(Some(f.num_rows())),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn columns(&self, source: &DataSource) -> Result<Vec<String>> {
        match source {
            DataSource::Frame(f) => Ok(f.columns().to_vec()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame> {
        let DataSource::Frame(frame) = source else {
            return Err(mismatch(self.name(), source));
        };
        check_partitions(self.name(), partitions, 1)?;

        if partitions.is_empty() {
            return Ok(DataFrame::empty(frame.columns().to_vec()));
        }
        Ok(frame.clone())
    }
}

/// Distributed dataframe; one partition per frame part
pub struct PartitionedFrameAdapter;

impl SourceAdapter for PartitionedFrameAdapter {
    fn name(&self) -> &'static str {
        "partitioned-frame"
    }

    fn matches(&self, source: &DataSource) -> bool {
        matches!(source, DataSource::PartitionedFrame(_))
    }

    fn partitioning(&self, _source: &DataSource) -> Partitioning {
        Partitioning::External
    }

    fn partition_count(&self, source: &DataSource) -> Result<usize> {
        match source {
            DataSource::PartitionedFrame(p) => Ok(p.num_partitions()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn is_distributable(&self, _source: &DataSource) -> bool {
        true
    }

    fn row_count(&self, source: &DataSource) -> Result<Option<usize>> {
        match source {
            DataSource::PartitionedFrame(p) => Ok(Some(p.num_rows())),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn columns(&self, source: &DataSource) -> Result<Vec<String>> {
        match source {
            DataSource::PartitionedFrame(p) => Ok(p.partitions()[0].columns().to_vec()),
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame> {
        let DataSource::PartitionedFrame(frame) = source else {
            return Err(mismatch(self.name(), source));
        };
        check_partitions(self.name(), partitions, frame.num_partitions())?;

        if partitions.is_empty() {
            let columns = frame.partitions()[0].columns().to_vec();
            return Ok(DataFrame::empty(columns));
        }

        let parts: Vec<DataFrame> = partitions
            .iter()
            .map(|&p| frame.partitions()[p].clone())
            .collect();
        DataFrame::concat(&parts)
    }
}
