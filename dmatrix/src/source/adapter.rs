//! Source adapter trait and the registry that classifies inputs
//!
//! Adding a data format means implementing [`SourceAdapter`] and registering
//! it; neither the planner nor the materializer changes.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;

use super::{ArrayAdapter, CsvAdapter, DataSource, DatasetAdapter, FrameAdapter};
use super::{ParquetAdapter, PartitionedFrameAdapter, Partitioning};

/// Reads one kind of [`DataSource`]
///
/// `load` must only touch the requested partitions, and must return their
/// rows concatenated in the order the indices are given.
pub trait SourceAdapter: Send + Sync {
    /// Adapter name used in logs and ambiguity errors
    fn name(&self) -> &'static str;

    /// Whether this adapter handles `source`
    fn matches(&self, source: &DataSource) -> bool;

    /// Whether rows can be sliced directly or arrive pre-split
    fn partitioning(&self, source: &DataSource) -> Partitioning;

    /// Number of independently addressable partitions
    fn partition_count(&self, source: &DataSource) -> Result<usize>;

    /// Whether the source can be split across actors in distributed mode at all
    fn is_distributable(&self, source: &DataSource) -> bool;

    /// Mode inference: should this source be distributed when not overridden
    fn infer_distributed(&self, source: &DataSource) -> Result<bool> {
        Ok(self.is_distributable(source) && self.partition_count(source)? > 1)
    }

    /// Total row count, if it is known without reading row data
    fn row_count(&self, _source: &DataSource) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Column names, read from metadata or a header only
    fn columns(&self, source: &DataSource) -> Result<Vec<String>>;

    /// Partitions to plan with when `num_actors` share the source
    ///
    /// Defaults to [`partition_count`](Self::partition_count). Adapters that
    /// can cut their natural partitions into row ranges may return more when
    /// there are fewer partitions than actors; such layouts are read with
    /// [`load_split`](Self::load_split).
    fn split_count(&self, source: &DataSource, _num_actors: usize) -> Result<usize> {
        self.partition_count(source)
    }

    /// Read the given partitions of a layout of `split_count` partitions
    fn load_split(
        &self,
        source: &DataSource,
        partitions: &[usize],
        _split_count: usize,
    ) -> Result<DataFrame> {
        self.load(source, partitions)
    }

    /// Read the given partitions into one frame, in the order given
    fn load(&self, source: &DataSource, partitions: &[usize]) -> Result<DataFrame>;
}

/// Reject partition indices outside `0..count`
pub(crate) fn check_partitions(adapter: &str, partitions: &[usize], count: usize) -> Result<()> {
    if let Some(bad) = partitions.iter().find(|&&p| p >= count) {
        return Err(MatrixError::Load(format!(
            "{} adapter: partition {} out of range (source has {})",
            adapter, bad, count
        )));
    }
    Ok(())
}

/// Ordered set of adapters; classification must be unambiguous
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Registry with no adapters
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Append an adapter after the existing ones
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        debug!(adapter = adapter.name(), "Registered source adapter");
        self.adapters.push(adapter);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Adapter names in registry order
    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Find the single adapter that claims `source`
    ///
    /// All adapters are consulted in registry order. No claimant is an
    /// unsupported source; several claimants are an ambiguous source.
    pub fn resolve(&self, source: &DataSource) -> Result<Arc<dyn SourceAdapter>> {
        let claimants: Vec<&Arc<dyn SourceAdapter>> =
            self.adapters.iter().filter(|a| a.matches(source)).collect();

        match claimants.as_slice() {
            [] => Err(MatrixError::UnsupportedSource(format!(
                "{} (registered adapters: {:?})",
                source.describe(),
                self.names()
            ))),
            [adapter] => {
                debug!(
                    adapter = adapter.name(),
                    source = %source.describe(),
                    "Classified source"
                );
                Ok(Arc::clone(adapter))
            }
            many => Err(MatrixError::AmbiguousSource {
                descriptor: source.describe(),
                adapters: many.iter().map(|a| a.name()).collect(),
            }),
        }
    }
}

impl Default for AdapterRegistry {
    /// Built-in adapters: array, frame, partitioned-frame, csv, parquet, dataset
    fn default() -> Self {
        Self::empty()
            .with(Arc::new(ArrayAdapter))
            .with(Arc::new(FrameAdapter))
            .with(Arc::new(PartitionedFrameAdapter))
            .with(Arc::new(CsvAdapter))
            .with(Arc::new(ParquetAdapter))
            .with(Arc::new(DatasetAdapter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use ndarray::array;

    /// Claims every path list, to collide with the csv/parquet adapters
    struct GreedyPathAdapter;

    impl SourceAdapter for GreedyPathAdapter {
        fn name(&self) -> &'static str {
            "greedy"
        }

        fn matches(&self, source: &DataSource) -> bool {
            matches!(source, DataSource::Paths(_))
        }

        fn partitioning(&self, _source: &DataSource) -> Partitioning {
            Partitioning::External
        }

        fn partition_count(&self, _source: &DataSource) -> Result<usize> {
            Ok(1)
        }

        fn is_distributable(&self, _source: &DataSource) -> bool {
            false
        }

        fn columns(&self, _source: &DataSource) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        fn load(&self, _source: &DataSource, _partitions: &[usize]) -> Result<DataFrame> {
            Ok(DataFrame::empty(Vec::new()))
        }
    }

    #[test]
    fn test_default_registry_order() {
        let registry = AdapterRegistry::default();
        assert_eq!(
            registry.names(),
            vec!["array", "frame", "partitioned-frame", "csv", "parquet", "dataset"]
        );
    }

    #[test]
    fn test_each_builtin_source_has_one_claimant() {
        let registry = AdapterRegistry::default();
        let cases = [
            (DataSource::array(array![[1.0]]), "array"),
            (DataSource::frame(DataFrame::from_array(array![[1.0]])), "frame"),
            (DataSource::path("a.csv"), "csv"),
            (DataSource::paths(["a.csv", "b.CSV"]), "csv"),
            (DataSource::path("a.parquet"), "parquet"),
        ];
        for (source, expected) in cases {
            assert_eq!(registry.resolve(&source).unwrap().name(), expected);
        }
    }

    #[test]
    fn test_mixed_paths_unsupported() {
        let registry = AdapterRegistry::default();
        let err = registry
            .resolve(&DataSource::paths(["a.csv", "b.parquet"]))
            .err()
            .unwrap();
        assert!(matches!(err, MatrixError::UnsupportedSource(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_overlapping_adapters_are_ambiguous() {
        let registry = AdapterRegistry::default().with(Arc::new(GreedyPathAdapter));
        let err = registry.resolve(&DataSource::path("a.csv")).err().unwrap();
        match err {
            MatrixError::AmbiguousSource { adapters, .. } => {
                assert_eq!(adapters, vec!["csv", "greedy"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_partitions() {
        assert!(check_partitions("x", &[0, 1], 2).is_ok());
        assert!(check_partitions("x", &[2], 2).is_err());
    }
}
