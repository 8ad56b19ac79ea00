//! Logical matrix: options, construction, per-rank materialization and the
//! payload handed to training

pub mod builder;
pub mod consistency;
pub mod fingerprint;
pub mod materializer;
pub mod options;
pub mod payload;

pub use builder::{ColumnSpec, LabelSpec, MatrixBuilder};
pub use consistency::{shape_payload, sort_by_qid, AttachedArrays};
pub use fingerprint::MatrixFingerprint;
pub use materializer::{DistributedMatrix, MatrixState, RankState, WorkerContext};
pub use options::{LabelColumns, MatrixOptions};
pub use payload::{AuxField, ParamValue, TrainingPayload};
