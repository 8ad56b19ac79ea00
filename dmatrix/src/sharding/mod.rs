//! Sharding planner
//!
//! Decides, for a source and an actor count, whether every actor loads the
//! full source and slices its rows (centralized) or reads only its own
//! partitions (distributed), and computes the rank → data assignment.
//!
//! ## Assignment
//!
//! ```text
//! Centralized, batch, 10 rows over 3 actors     Distributed, 5 partitions over 3 actors
//! ┌───────────┬─────────┬─────────┐            ┌─────────┬─────────┬─────────┐
//! │ rank 0    │ rank 1  │ rank 2  │            │ rank 0  │ rank 1  │ rank 2  │
//! │ rows 0-3  │ rows 4-6│ rows 7-9│            │ p0, p3  │ p1, p4  │ p2      │
//! └───────────┴─────────┴─────────┘            └─────────┴─────────┴─────────┘
//! ```
//!
//! Every assignment is a pure function of `(total, num_actors, rank)`, so
//! actors plan independently without coordination.

pub mod assignment;
pub mod mode;
pub mod planner;

pub use assignment::{batch_range, partitions_for_rank, sharding_indices, RankAssignment};
pub use mode::{DistributedMode, LoadMode, ShardingMode};
pub use planner::{resolve_mode, ShardPlan};
