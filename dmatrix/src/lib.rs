pub mod errors;
pub mod frame;
pub mod matrix;
pub mod observability;
pub mod sharding;
pub mod source;

pub use errors::{ErrorKind, MatrixError, Result};
pub use frame::DataFrame;
pub use matrix::{
    AuxField, ColumnSpec, DistributedMatrix, LabelColumns, LabelSpec, MatrixBuilder,
    MatrixFingerprint, MatrixOptions, MatrixState, ParamValue, RankState, TrainingPayload,
    WorkerContext,
};
pub use observability::{init_production_logging, init_simple_logging};
pub use sharding::{
    partitions_for_rank, sharding_indices, DistributedMode, LoadMode, RankAssignment, ShardPlan,
    ShardingMode,
};
pub use source::{
    AdapterRegistry, DataSource, DatasetHandle, PartitionedFrame, Partitioning, SourceAdapter,
};
