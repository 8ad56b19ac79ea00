//! Externally partitioned dataset handles

use tracing::debug;

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;

use super::adapter::{check_partitions, SourceAdapter};
use super::{DataSource, DatasetHandle, Partitioning};

/// Reads [`DatasetHandle`] blocks; always inferred distributed
pub struct DatasetAdapter;

impl DatasetAdapter {
    fn handle<'a>(&self, source: &'a DataSource) -> Result<&'a dyn DatasetHandle> {
        match source {
            DataSource::Dataset(handle) => Ok(handle.as_ref()),
            other => Err(MatrixError::Config(format!(
                "dataset adapter cannot read {}",
                other.describe()
            ))),
        }
    }
}

impl SourceAdapter for DatasetAdapter {
    fn name(&self) -> &'static str {
        "dataset"
    }

    fn matches(&self, source: &DataSource) -> bool {
        matches!(source, DataSource::Dataset(_))
    }

    fn partitioning(&self, _source: &DataSource) -> Partitioning {
        Partitioning::External
    }

    fn partition_count(&self, source: &DataSource) -> Result<usize> {
        Ok(self.handle(source)?.num_blocks())
    }

    fn is_distributable(&self, _source: &DataSource) -> bool {
        true
    }

    fn infer_distributed(&self, _source: &DataSource) -> Result<bool> {
        Ok(true)
    }

    fn row_count(&self, source: &DataSource) -> Result<Option<usize>> {
        Ok(self.handle(source)?.num_rows())
    }

    fn columns(&self, source: &DataSource) -> Result<Vec<String>> {
        Ok(self.handle(source)?.columns())
    }

    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame> {
        let handle = self.handle(source)?;
        check_partitions(self.name(), partitions, handle.num_blocks())?;

        let blocks = partitions
            .iter()
            .map(|&p| handle.read_block(p))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            dataset = %handle.fingerprint(),
            blocks = ?partitions,
            "Read dataset blocks"
        );
        DataFrame::concat(&blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::Arc;

    #[derive(Debug)]
    struct TwoBlocks;

    impl DatasetHandle for TwoBlocks {
        fn num_blocks(&self) -> usize {
            2
        }

        fn read_block(&self, index: usize) -> Result<DataFrame> {
            Ok(DataFrame::from_array(array![[index as f64]]))
        }

        fn fingerprint(&self) -> String {
            "two-blocks".to_string()
        }

        fn columns(&self) -> Vec<String> {
            vec!["0".to_string()]
        }
    }

    #[test]
    fn test_dataset_always_distributed() {
        let source = DataSource::dataset(Arc::new(TwoBlocks));
        assert!(DatasetAdapter.infer_distributed(&source).unwrap());
        assert_eq!(DatasetAdapter.partition_count(&source).unwrap(), 2);
        assert_eq!(DatasetAdapter.row_count(&source).unwrap(), None);
    }

    #[test]
    fn test_dataset_reads_blocks_in_given_order() {
        let source = DataSource::dataset(Arc::new(TwoBlocks));
        let frame = DatasetAdapter.load(&source, &[1, 0]).unwrap();
        assert_eq!(frame.values().column(0).to_vec(), vec![1.0, 0.0]);
    }
}
