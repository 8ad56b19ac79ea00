//! Rank → data assignment
//!
//! Pure functions of `(total, num_actors, rank)`; nothing here touches data.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::ShardingMode;

/// What one rank has to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankAssignment {
    /// Distributed: read exactly these partitions, in this order
    Partitions(Vec<usize>),
    /// Centralized: read every partition, then keep this rank's rows
    RowSlice {
        sharding: ShardingMode,
        rank: usize,
        num_actors: usize,
    },
}

impl RankAssignment {
    /// Rows this assignment keeps out of a fully loaded source of `total` rows
    ///
    /// `None` for partition assignments, which keep everything they read.
    pub fn rows(&self, total: usize) -> Option<Vec<usize>> {
        match self {
            RankAssignment::Partitions(_) => None,
            RankAssignment::RowSlice {
                sharding,
                rank,
                num_actors,
            } => Some(sharding_indices(*sharding, *rank, *num_actors, total)),
        }
    }
}

/// Contiguous row range of `rank` under batch sharding
///
/// With `total = q·N + r`, the first `r` ranks get `q + 1` rows and the rest
/// get `q`, so no rank is left empty while `total >= N`.
pub fn batch_range(rank: usize, num_actors: usize, total: usize) -> Range<usize> {
    if num_actors == 0 || rank >= num_actors {
        return 0..0;
    }
    let base = total / num_actors;
    let extra = total % num_actors;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    start..start + len
}

/// Row indices of `rank` out of `total` rows
pub fn sharding_indices(
    mode: ShardingMode,
    rank: usize,
    num_actors: usize,
    total: usize,
) -> Vec<usize> {
    if num_actors == 0 || rank >= num_actors {
        return Vec::new();
    }
    match mode {
        ShardingMode::Batch => batch_range(rank, num_actors, total).collect(),
        ShardingMode::Interleaved => (rank..total).step_by(num_actors).collect(),
    }
}

/// Partition indices of `rank`: round robin by `partition % num_actors`
///
/// When the count does not divide evenly, the lower ranks hold the extra
/// partitions (5 over 3 gives `[0, 3]`, `[1, 4]`, `[2]`).
pub fn partitions_for_rank(num_partitions: usize, rank: usize, num_actors: usize) -> Vec<usize> {
    if num_actors == 0 || rank >= num_actors {
        return Vec::new();
    }
    (rank..num_partitions).step_by(num_actors).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covers_exactly_once(shards: &[Vec<usize>], total: usize) -> bool {
        let mut seen: Vec<usize> = shards.iter().flatten().copied().collect();
        seen.sort_unstable();
        seen == (0..total).collect::<Vec<_>>()
    }

    #[test]
    fn test_batch_even_split() {
        assert_eq!(batch_range(0, 2, 32), 0..16);
        assert_eq!(batch_range(1, 2, 32), 16..32);
    }

    #[test]
    fn test_batch_remainder_goes_to_low_ranks() {
        let sizes: Vec<usize> = (0..3).map(|r| batch_range(r, 3, 10).len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    /// 100 rows over 16 actors: every actor gets rows
    #[test]
    fn test_batch_never_starves_a_rank() {
        let shards: Vec<Vec<usize>> = (0..16)
            .map(|r| sharding_indices(ShardingMode::Batch, r, 16, 100))
            .collect();
        assert!(shards.iter().all(|s| !s.is_empty()));
        assert!(covers_exactly_once(&shards, 100));
    }

    #[test]
    fn test_interleaved() {
        assert_eq!(
            sharding_indices(ShardingMode::Interleaved, 1, 3, 10),
            vec![1, 4, 7]
        );
        let shards: Vec<Vec<usize>> = (0..4)
            .map(|r| sharding_indices(ShardingMode::Interleaved, r, 4, 17))
            .collect();
        assert!(covers_exactly_once(&shards, 17));
    }

    #[test]
    fn test_coverage_for_all_actor_counts() {
        for total in [1usize, 7, 32, 101] {
            for n in 1..=total.min(12) {
                for mode in [ShardingMode::Batch, ShardingMode::Interleaved] {
                    let shards: Vec<Vec<usize>> =
                        (0..n).map(|r| sharding_indices(mode, r, n, total)).collect();
                    assert!(covers_exactly_once(&shards, total), "{mode} {total}/{n}");
                }
            }
        }
    }

    #[test]
    fn test_round_robin_five_over_three() {
        assert_eq!(partitions_for_rank(5, 0, 3), vec![0, 3]);
        assert_eq!(partitions_for_rank(5, 1, 3), vec![1, 4]);
        assert_eq!(partitions_for_rank(5, 2, 3), vec![2]);
    }

    #[test]
    fn test_out_of_range_rank_is_empty() {
        assert!(partitions_for_rank(4, 4, 4).is_empty());
        assert!(sharding_indices(ShardingMode::Batch, 2, 2, 10).is_empty());
        assert_eq!(batch_range(0, 0, 10), 0..0);
    }

    #[test]
    fn test_row_slice_assignment() {
        let slice = RankAssignment::RowSlice {
            sharding: ShardingMode::Batch,
            rank: 1,
            num_actors: 2,
        };
        assert_eq!(slice.rows(4), Some(vec![2, 3]));
        assert_eq!(RankAssignment::Partitions(vec![0]).rows(4), None);
    }
}
