//! Mode resolution, sufficiency checks and the per-worker-count plan

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{MatrixError, Result};
use crate::source::{DataSource, Partitioning, SourceAdapter};

use super::{partitions_for_rank, DistributedMode, LoadMode, RankAssignment, ShardingMode};

/// Decide how a source is loaded
///
/// `has_aligned_arrays` is true when a label or auxiliary array was supplied
/// in memory; such arrays follow the full source's row order and cannot be
/// matched to external partitions, so they force centralized loading.
pub fn resolve_mode(
    adapter: &dyn SourceAdapter,
    source: &DataSource,
    requested: DistributedMode,
    has_aligned_arrays: bool,
) -> Result<LoadMode> {
    let mode = match requested {
        DistributedMode::Centralized => LoadMode::Centralized,
        DistributedMode::Distributed => {
            if adapter.partitioning(source) == Partitioning::Independent {
                return Err(MatrixError::Config(format!(
                    "distributed loading requested but {} is held by a single process \
                     ({} adapter); its rows are sliced directly, use distributed = auto or false",
                    source.describe(),
                    adapter.name()
                )));
            }
            if !adapter.is_distributable(source) {
                return Err(MatrixError::Config(format!(
                    "distributed loading requested but {} cannot be split ahead of a full read \
                     ({} adapter); use distributed = auto or false",
                    source.describe(),
                    adapter.name()
                )));
            }
            if has_aligned_arrays {
                return Err(MatrixError::Config(format!(
                    "distributed loading requested for {} with in-memory label or auxiliary \
                     arrays; pass them as column names instead",
                    source.describe()
                )));
            }
            LoadMode::Distributed
        }
        DistributedMode::Auto if has_aligned_arrays => LoadMode::Centralized,
        DistributedMode::Auto => {
            if adapter.infer_distributed(source)? {
                LoadMode::Distributed
            } else {
                LoadMode::Centralized
            }
        }
    };

    info!(
        source = %source.describe(),
        adapter = adapter.name(),
        requested = %requested,
        mode = %mode,
        "Resolved load mode"
    );
    Ok(mode)
}

/// Sharding plan of one matrix for one worker count
///
/// Computed once per worker count and immutable afterwards. Serializable so a
/// driver can ship it to actors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
    /// Resolved load mode
    pub mode: LoadMode,

    /// Row sharding policy for centralized loading
    pub sharding: ShardingMode,

    /// Number of actors this plan was computed for
    pub num_actors: usize,

    /// Partitions the source is read as; distributed plans may cut a source
    /// finer than its natural partitions
    pub num_partitions: usize,

    /// Total rows of a centralized source, when known without reading row
    /// data
    pub total_rows: Option<usize>,
}

impl ShardPlan {
    /// Plan `source` for `num_actors` actors
    ///
    /// Only metadata is read; no partition is loaded. Row counts are only
    /// gathered for centralized loading, where they drive the sufficiency
    /// check and the row slices.
    pub fn new(
        adapter: &dyn SourceAdapter,
        source: &DataSource,
        mode: LoadMode,
        sharding: ShardingMode,
        num_actors: usize,
    ) -> Result<Self> {
        if num_actors == 0 {
            return Err(MatrixError::Config(
                "num_actors must be at least 1".to_string(),
            ));
        }

        let (num_partitions, total_rows) = match mode {
            LoadMode::Distributed => (adapter.split_count(source, num_actors)?, None),
            LoadMode::Centralized => (adapter.partition_count(source)?, adapter.row_count(source)?),
        };
        let plan = Self {
            mode,
            sharding,
            num_actors,
            num_partitions,
            total_rows,
        };

        info!(
            source = %source.describe(),
            mode = %plan.mode,
            sharding = %plan.sharding,
            num_actors,
            num_partitions = plan.num_partitions,
            total_rows = ?plan.total_rows,
            "Computed shard plan"
        );
        Ok(plan)
    }

    /// Data units available to share out, if known before loading
    fn available(&self) -> Option<(&'static str, usize)> {
        match self.mode {
            LoadMode::Distributed => Some(("partitions", self.num_partitions)),
            LoadMode::Centralized => self.total_rows.map(|rows| ("rows", rows)),
        }
    }

    /// Fail unless every actor gets at least one partition or row
    ///
    /// Returns `Ok(false)` when the check was waived by
    /// `allow_insufficient`, which leaves the trailing ranks with empty
    /// payloads. Adapters that cannot count rows ahead of a read pass here
    /// and are checked again by [`check_loaded_rows`](Self::check_loaded_rows).
    pub fn check_sufficiency(&self, descriptor: &str, allow_insufficient: bool) -> Result<bool> {
        match self.available() {
            Some((unit, available)) => self.compare(unit, available, descriptor, allow_insufficient),
            None => Ok(true),
        }
    }

    /// Sufficiency check for centralized sources whose row count is only
    /// known after the full read
    pub fn check_loaded_rows(
        &self,
        rows: usize,
        descriptor: &str,
        allow_insufficient: bool,
    ) -> Result<bool> {
        self.compare("rows", rows, descriptor, allow_insufficient)
    }

    fn compare(
        &self,
        unit: &'static str,
        available: usize,
        descriptor: &str,
        allow_insufficient: bool,
    ) -> Result<bool> {
        if available >= self.num_actors {
            return Ok(true);
        }
        if allow_insufficient {
            warn!(
                source = descriptor,
                unit,
                available,
                requested = self.num_actors,
                "Insufficient data for every actor; some ranks will train on empty shards"
            );
            return Ok(false);
        }
        Err(MatrixError::Insufficient {
            unit,
            available,
            requested: self.num_actors,
            descriptor: descriptor.to_string(),
        })
    }

    /// Assignment of `rank`
    pub fn assignment(&self, rank: usize) -> Result<RankAssignment> {
        if rank >= self.num_actors {
            return Err(MatrixError::InvalidRank {
                rank,
                num_actors: self.num_actors,
            });
        }
        Ok(match self.mode {
            LoadMode::Distributed => RankAssignment::Partitions(partitions_for_rank(
                self.num_partitions,
                rank,
                self.num_actors,
            )),
            LoadMode::Centralized => RankAssignment::RowSlice {
                sharding: self.sharding,
                rank,
                num_actors: self.num_actors,
            },
        })
    }

    /// Every rank's assignment, in rank order
    pub fn assignments(&self) -> Vec<RankAssignment> {
        (0..self.num_actors)
            .filter_map(|rank| self.assignment(rank).ok())
            .collect()
    }

    /// Serialize to CBOR bytes
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| MatrixError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| MatrixError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::source::{ArrayAdapter, CsvAdapter, ParquetAdapter};
    use ndarray::Array2;

    fn plan(mode: LoadMode, partitions: usize, rows: Option<usize>, actors: usize) -> ShardPlan {
        ShardPlan {
            mode,
            sharding: ShardingMode::Batch,
            num_actors: actors,
            num_partitions: partitions,
            total_rows: rows,
        }
    }

    #[test]
    fn test_explicit_distributed_single_csv_rejected() {
        let source = DataSource::path("train.csv");
        let err = resolve_mode(&CsvAdapter, &source, DistributedMode::Distributed, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mode = resolve_mode(&CsvAdapter, &source, DistributedMode::Auto, false).unwrap();
        assert_eq!(mode, LoadMode::Centralized);
    }

    #[test]
    fn test_auto_infers_from_source() {
        let multi = DataSource::paths(["a.csv", "b.csv"]);
        assert_eq!(
            resolve_mode(&CsvAdapter, &multi, DistributedMode::Auto, false).unwrap(),
            LoadMode::Distributed
        );
        let single = DataSource::path("a.parquet");
        assert_eq!(
            resolve_mode(&ParquetAdapter, &single, DistributedMode::Auto, false).unwrap(),
            LoadMode::Distributed
        );
        let array = DataSource::array(Array2::zeros((4, 2)));
        assert_eq!(
            resolve_mode(&ArrayAdapter, &array, DistributedMode::Auto, false).unwrap(),
            LoadMode::Centralized
        );
    }

    #[test]
    fn test_explicit_distributed_in_memory_rejected() {
        let array = DataSource::array(Array2::zeros((4, 2)));
        let err = resolve_mode(&ArrayAdapter, &array, DistributedMode::Distributed, false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("sliced directly"));
    }

    #[test]
    fn test_single_csv_counted_before_loading() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("small.csv");
        std::fs::write(&path, "a,label\n1,0\n2,1\n3,0\n").unwrap();
        let source = DataSource::path(path.to_string_lossy());

        let plan = ShardPlan::new(
            &CsvAdapter,
            &source,
            LoadMode::Centralized,
            ShardingMode::Batch,
            4,
        )
        .unwrap();
        assert_eq!(plan.total_rows, Some(3));
        assert!(matches!(
            plan.check_sufficiency("small.csv", false),
            Err(MatrixError::Insufficient { unit: "rows", available: 3, requested: 4, .. })
        ));
    }

    #[test]
    fn test_aligned_arrays_force_centralized() {
        let multi = DataSource::paths(["a.csv", "b.csv"]);
        assert_eq!(
            resolve_mode(&CsvAdapter, &multi, DistributedMode::Auto, true).unwrap(),
            LoadMode::Centralized
        );
        assert!(resolve_mode(&CsvAdapter, &multi, DistributedMode::Distributed, true).is_err());
    }

    #[test]
    fn test_sufficiency() {
        let distributed = plan(LoadMode::Distributed, 2, Some(100), 4);
        let err = distributed.check_sufficiency("src", false).unwrap_err();
        assert!(matches!(
            err,
            MatrixError::Insufficient { unit: "partitions", available: 2, requested: 4, .. }
        ));
        assert!(!distributed.check_sufficiency("src", true).unwrap());

        let centralized = plan(LoadMode::Centralized, 1, Some(3), 4);
        assert!(centralized.check_sufficiency("src", false).is_err());
        assert!(plan(LoadMode::Centralized, 1, Some(4), 4)
            .check_sufficiency("src", false)
            .unwrap());
    }

    #[test]
    fn test_unknown_rows_checked_after_load() {
        let centralized = plan(LoadMode::Centralized, 1, None, 4);
        assert!(centralized.check_sufficiency("src", false).unwrap());
        assert!(centralized.check_loaded_rows(3, "src", false).is_err());
        assert!(centralized.check_loaded_rows(4, "src", false).unwrap());
    }

    #[test]
    fn test_assignment() {
        let distributed = plan(LoadMode::Distributed, 5, None, 3);
        assert_eq!(
            distributed.assignments(),
            vec![
                RankAssignment::Partitions(vec![0, 3]),
                RankAssignment::Partitions(vec![1, 4]),
                RankAssignment::Partitions(vec![2]),
            ]
        );
        assert!(matches!(
            distributed.assignment(3),
            Err(MatrixError::InvalidRank { rank: 3, num_actors: 3 })
        ));
    }

    #[test]
    fn test_zero_actors_rejected() {
        let source = DataSource::array(Array2::zeros((4, 2)));
        let err = ShardPlan::new(
            &ArrayAdapter,
            &source,
            LoadMode::Centralized,
            ShardingMode::Batch,
            0,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_plan_cbor() {
        let original = plan(LoadMode::Distributed, 7, Some(70), 3);
        let bytes = original.to_cbor().unwrap();
        assert_eq!(ShardPlan::from_cbor(&bytes).unwrap(), original);
    }
}
