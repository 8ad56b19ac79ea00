//! Lazy per-rank loading of a distributed matrix
//!
//! A [`DistributedMatrix`] is built once and shared by every actor. Each
//! rank asks for its data with [`DistributedMatrix::get_data`]; the first
//! call plans, reads and shapes the rank's rows, later calls return the
//! cached payload until it is unloaded.
//!
//! ```text
//! matrix:  Unplanned ──resolve mode / plan──▶ Planned ──first get_data──▶ Loaded
//! rank:    Unloaded ──get_data──▶ Loading ──▶ Loaded ──unload──▶ Unloaded
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::{MatrixError, Result};
use crate::frame::DataFrame;
use crate::sharding::{resolve_mode, LoadMode, RankAssignment, ShardPlan};
use crate::source::{DataSource, SourceAdapter};

use super::consistency::{shape_payload, AttachedArrays};
use super::fingerprint::MatrixFingerprint;
use super::options::MatrixOptions;
use super::payload::TrainingPayload;

/// What the actor runtime tells the matrix about the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    /// 0-based rank of the caller
    pub rank: usize,

    /// Total actors in this training run
    pub num_actors: usize,

    /// Proceed with empty shards instead of failing when data runs short
    pub allow_insufficient_shards: bool,
}

impl WorkerContext {
    pub fn new(rank: usize, num_actors: usize) -> Self {
        Self {
            rank,
            num_actors,
            allow_insufficient_shards: false,
        }
    }

    /// Degraded mode: ranks without data get empty payloads
    pub fn allowing_insufficient_shards(mut self) -> Self {
        self.allow_insufficient_shards = true;
        self
    }
}

/// Lifecycle of the matrix as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixState {
    Unplanned,
    Planned,
    Loaded,
}

/// Lifecycle of one rank's cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankState {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Default)]
struct RankSlot {
    num_actors: usize,
    payload: Option<Arc<TrainingPayload>>,
}

/// Immutable part of a matrix, shared with blocking load tasks
struct MatrixCore {
    source: DataSource,
    adapter: Arc<dyn SourceAdapter>,
    options: MatrixOptions,
    attached: AttachedArrays,
    loads: AtomicUsize,
}

impl MatrixCore {
    /// Read and shape the rows of one rank; runs on a blocking thread
    fn materialize(
        &self,
        plan: &ShardPlan,
        assignment: &RankAssignment,
        allow_insufficient: bool,
    ) -> Result<TrainingPayload> {
        let descriptor = self.source.describe();

        match assignment {
            RankAssignment::Partitions(partitions) if partitions.is_empty() => {
                // Same schema as every other rank, no rows
                let frame = DataFrame::empty(self.adapter.columns(&self.source)?);
                shape_payload(frame, None, &self.options, &self.attached, &descriptor)
            }
            RankAssignment::Partitions(partitions) => {
                let frame = self.read(partitions, plan.num_partitions)?;
                shape_payload(frame, None, &self.options, &self.attached, &descriptor)
            }
            RankAssignment::RowSlice { .. } => {
                let all: Vec<usize> = (0..plan.num_partitions).collect();
                let frame = self.read(&all, plan.num_partitions)?;
                if plan.total_rows.is_none() {
                    plan.check_loaded_rows(frame.num_rows(), &descriptor, allow_insufficient)?;
                }
                let rows = assignment.rows(frame.num_rows());
                shape_payload(
                    frame,
                    rows.as_deref(),
                    &self.options,
                    &self.attached,
                    &descriptor,
                )
            }
        }
    }

    fn read(&self, partitions: &[usize], split_count: usize) -> Result<DataFrame> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        debug!(
            adapter = self.adapter.name(),
            partitions = ?partitions,
            split_count,
            "Loading partitions"
        );
        self.adapter.load_split(&self.source, partitions, split_count)
    }
}

/// A logical matrix shared by every actor of a training run
pub struct DistributedMatrix {
    core: Arc<MatrixCore>,
    fingerprint: MatrixFingerprint,
    mode: OnceLock<LoadMode>,
    plans: RwLock<HashMap<usize, Arc<ShardPlan>>>,
    ranks: StdMutex<HashMap<usize, Arc<Mutex<RankSlot>>>>,
}

impl DistributedMatrix {
    pub(crate) fn new(
        source: DataSource,
        adapter: Arc<dyn SourceAdapter>,
        options: MatrixOptions,
        attached: AttachedArrays,
    ) -> Result<Self> {
        let fingerprint = MatrixFingerprint::compute(&source, &options, &attached)?;
        Ok(Self {
            core: Arc::new(MatrixCore {
                source,
                adapter,
                options,
                attached,
                loads: AtomicUsize::new(0),
            }),
            fingerprint,
            mode: OnceLock::new(),
            plans: RwLock::new(HashMap::new()),
            ranks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn options(&self) -> &MatrixOptions {
        &self.core.options
    }

    pub fn source(&self) -> &DataSource {
        &self.core.source
    }

    /// Name of the adapter that claimed the source
    pub fn adapter_name(&self) -> &'static str {
        self.core.adapter.name()
    }

    pub fn fingerprint(&self) -> MatrixFingerprint {
        self.fingerprint
    }

    /// Resolved load mode; inferred once, on first use
    pub fn load_mode(&self) -> Result<LoadMode> {
        if let Some(mode) = self.mode.get() {
            return Ok(*mode);
        }
        let mode = resolve_mode(
            self.core.adapter.as_ref(),
            &self.core.source,
            self.core.options.distributed,
            self.core.attached.has_row_aligned(),
        )?;
        Ok(*self.mode.get_or_init(|| mode))
    }

    /// Whether actors read disjoint partitions rather than full copies
    pub fn distributed(&self) -> Result<bool> {
        Ok(self.load_mode()? == LoadMode::Distributed)
    }

    /// Plan for `num_actors`, computed once per actor count
    ///
    /// Reads metadata and row counts only; the sufficiency check is left to
    /// the caller so that it can honour a degraded-mode override.
    pub fn plan(&self, num_actors: usize) -> Result<Arc<ShardPlan>> {
        if let Some(plan) = self
            .plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&num_actors)
        {
            return Ok(Arc::clone(plan));
        }

        let mode = self.load_mode()?;
        let plan = Arc::new(ShardPlan::new(
            self.core.adapter.as_ref(),
            &self.core.source,
            mode,
            self.core.options.sharding,
            num_actors,
        )?);

        let mut plans = self.plans.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(plans.entry(num_actors).or_insert(plan)))
    }

    fn slot(&self, rank: usize) -> Arc<Mutex<RankSlot>> {
        let mut ranks = self.ranks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(ranks.entry(rank).or_default())
    }

    /// Payload of `ctx.rank`, loading it on first access
    ///
    /// Planning and the sufficiency check run before any partition is read.
    /// Concurrent calls for one rank share a single load; different ranks
    /// load independently.
    pub async fn get_data(&self, ctx: WorkerContext) -> Result<Arc<TrainingPayload>> {
        if ctx.num_actors == 0 || ctx.rank >= ctx.num_actors {
            return Err(MatrixError::InvalidRank {
                rank: ctx.rank,
                num_actors: ctx.num_actors,
            });
        }

        let plan = self.plan(ctx.num_actors)?;
        plan.check_sufficiency(&self.core.source.describe(), ctx.allow_insufficient_shards)?;

        let slot = self.slot(ctx.rank);
        let mut guard = slot.lock().await;
        if let Some(payload) = &guard.payload {
            if guard.num_actors == ctx.num_actors {
                debug!(rank = ctx.rank, "Returning cached payload");
                return Ok(Arc::clone(payload));
            }
        }

        let assignment = plan.assignment(ctx.rank)?;
        let core = Arc::clone(&self.core);
        let task_plan = Arc::clone(&plan);
        let task_assignment = assignment.clone();
        let payload = tokio::task::spawn_blocking(move || {
            core.materialize(&task_plan, &task_assignment, ctx.allow_insufficient_shards)
        })
        .await
        .map_err(|e| MatrixError::Load(format!("load task for rank {} failed: {}", ctx.rank, e)))??;

        info!(
            rank = ctx.rank,
            num_actors = ctx.num_actors,
            mode = %plan.mode,
            assignment = ?assignment,
            rows = payload.num_rows(),
            features = payload.num_features(),
            "Materialized rank payload"
        );

        let payload = Arc::new(payload);
        guard.num_actors = ctx.num_actors;
        guard.payload = Some(Arc::clone(&payload));
        Ok(payload)
    }

    /// Release the cached payload of one rank
    pub async fn unload_rank(&self, rank: usize) {
        let slot = {
            let ranks = self.ranks.lock().unwrap_or_else(PoisonError::into_inner);
            ranks.get(&rank).cloned()
        };
        if let Some(slot) = slot {
            if slot.lock().await.payload.take().is_some() {
                debug!(rank, "Unloaded rank payload");
            }
        }
    }

    /// Release every cached payload
    pub async fn unload_data(&self) {
        let slots: Vec<(usize, Arc<Mutex<RankSlot>>)> = {
            let ranks = self.ranks.lock().unwrap_or_else(PoisonError::into_inner);
            ranks.iter().map(|(r, s)| (*r, Arc::clone(s))).collect()
        };

        let mut released = 0;
        for (_, slot) in slots {
            if slot.lock().await.payload.take().is_some() {
                released += 1;
            }
        }
        info!(released, "Unloaded matrix data");
    }

    /// Cache state of one rank
    pub fn rank_state(&self, rank: usize) -> RankState {
        let slot = {
            let ranks = self.ranks.lock().unwrap_or_else(PoisonError::into_inner);
            ranks.get(&rank).cloned()
        };
        match slot {
            None => RankState::Unloaded,
            Some(slot) => match slot.try_lock() {
                Err(_) => RankState::Loading,
                Ok(guard) if guard.payload.is_some() => RankState::Loaded,
                Ok(_) => RankState::Unloaded,
            },
        }
    }

    /// Lifecycle state of the matrix as a whole
    pub fn state(&self) -> MatrixState {
        let ranks: Vec<usize> = {
            let ranks = self.ranks.lock().unwrap_or_else(PoisonError::into_inner);
            ranks.keys().copied().collect()
        };
        if ranks.iter().any(|&r| self.rank_state(r) == RankState::Loaded) {
            MatrixState::Loaded
        } else if self.mode.get().is_some() {
            MatrixState::Planned
        } else {
            MatrixState::Unplanned
        }
    }

    /// Number of adapter reads issued so far
    pub fn load_count(&self) -> usize {
        self.core.loads.load(Ordering::Relaxed)
    }
}

impl PartialEq for DistributedMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for DistributedMatrix {}

impl fmt::Debug for DistributedMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedMatrix")
            .field("source", &self.core.source.describe())
            .field("adapter", &self.core.adapter.name())
            .field("mode", &self.mode.get())
            .field("fingerprint", &self.fingerprint.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::MatrixBuilder;
    use ndarray::Array2;

    fn matrix(rows: usize, lazy: bool) -> DistributedMatrix {
        let data = Array2::from_shape_fn((rows, 3), |(i, j)| (i * 3 + j) as f64);
        MatrixBuilder::new(data).lazy(lazy).build().unwrap()
    }

    #[tokio::test]
    async fn test_lazy_matrix_starts_unplanned() {
        let m = matrix(4, true);
        assert_eq!(m.state(), MatrixState::Unplanned);
        assert_eq!(m.load_count(), 0);

        m.get_data(WorkerContext::new(0, 2)).await.unwrap();
        assert_eq!(m.state(), MatrixState::Loaded);
        assert_eq!(m.rank_state(0), RankState::Loaded);
        assert_eq!(m.rank_state(1), RankState::Unloaded);
    }

    #[tokio::test]
    async fn test_cached_until_unloaded() {
        let m = matrix(4, false);
        assert_eq!(m.state(), MatrixState::Planned);

        let ctx = WorkerContext::new(1, 2);
        let first = m.get_data(ctx).await.unwrap();
        let second = m.get_data(ctx).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(m.load_count(), 1);

        m.unload_rank(1).await;
        assert_eq!(m.rank_state(1), RankState::Unloaded);
        let third = m.get_data(ctx).await.unwrap();
        assert_eq!(*third, *first);
        assert_eq!(m.load_count(), 2);
    }

    #[tokio::test]
    async fn test_different_actor_count_reloads() {
        let m = matrix(6, false);
        let two = m.get_data(WorkerContext::new(0, 2)).await.unwrap();
        let three = m.get_data(WorkerContext::new(0, 3)).await.unwrap();
        assert_eq!(two.num_rows(), 3);
        assert_eq!(three.num_rows(), 2);
    }

    #[tokio::test]
    async fn test_invalid_rank() {
        let m = matrix(4, false);
        let err = m.get_data(WorkerContext::new(2, 2)).await.unwrap_err();
        assert!(matches!(err, MatrixError::InvalidRank { rank: 2, num_actors: 2 }));
        assert_eq!(m.load_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_rows() {
        let m = matrix(2, false);
        let err = m.get_data(WorkerContext::new(0, 3)).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Sufficiency);
        assert_eq!(m.load_count(), 0);

        let degraded = WorkerContext::new(2, 3).allowing_insufficient_shards();
        let payload = m.get_data(degraded).await.unwrap();
        assert_eq!(payload.num_rows(), 0);
    }

    #[test]
    fn test_equality_is_fingerprint_equality() {
        assert_eq!(matrix(4, true), matrix(4, true));
        assert_ne!(matrix(4, true), matrix(5, true));
    }
}
