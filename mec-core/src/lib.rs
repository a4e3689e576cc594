use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mec_pool::ResourcePool;
use mec_sched::{check_feasible, FeasibilityError, ScheduleError, SelectionScheme};
use mec_types::{CandidateSet, Capacity, NodeId, Solution};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod config;
pub mod dispatch;
pub mod domains;
pub mod grants;
pub mod ingest;
pub mod logging;

pub use config::{ConfigError, NodeConfig, SchedulerConfig};
pub use dispatch::{
    read_grant_log, DispatchError, GrantDispatcher, GrantRecord, JsonlGrantLog,
    NullGrantDispatcher,
};
pub use domains::{schedule_domains, Domain, DomainResult};
pub use grants::GrantTable;
pub use ingest::{read_ipc_candidates, record_batch_to_candidates, CandidateBuildError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{count} candidates exceed the per-epoch limit of {limit}")]
    CandidateLimitExceeded { count: usize, limit: usize },
    #[error("candidate set lists {candidate_nodes} nodes, scheduler manages {scheduler_nodes}")]
    NodeTableMismatch {
        candidate_nodes: usize,
        scheduler_nodes: usize,
    },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("scheme produced an infeasible solution: {0}")]
    Infeasible(#[from] FeasibilityError),
    #[error("scheduling task failed: {0}")]
    Join(String),
}

/// Summary of one scheduling epoch, handed to the grant dispatcher.
#[derive(Clone, Debug, Serialize)]
pub struct EpochReport {
    pub epoch_id: Uuid,
    pub sequence: u64,
    pub scheme: &'static str,
    pub candidates: usize,
    pub applications: usize,
    pub admitted: usize,
    pub total_utility: f64,
    /// Wall time spent inside the selection scheme.
    pub elapsed_us: u64,
}

#[derive(Clone, Debug)]
pub struct EpochOutcome {
    pub report: EpochReport,
    pub solution: Solution,
    /// False when the dispatcher rejected the grants; the grant table is updated regardless.
    pub dispatched: bool,
}

/// Per-epoch driver: wires the selection scheme, capacity table, grant table
/// and grant dispatcher together.
pub struct EdgeScheduler {
    pub scheme: Arc<dyn SelectionScheme>,
    pub dispatcher: Arc<dyn GrantDispatcher>,

    node_ids: Vec<NodeId>,
    capacities: Vec<Capacity>,
    max_candidates: usize,

    grants: Mutex<GrantTable>,
    sequence: AtomicU64,
}

impl EdgeScheduler {
    pub fn new(
        scheme: Arc<dyn SelectionScheme>,
        dispatcher: Arc<dyn GrantDispatcher>,
        node_ids: Vec<NodeId>,
        capacities: Vec<Capacity>,
        max_candidates: usize,
    ) -> Self {
        Self {
            scheme,
            dispatcher,
            node_ids,
            capacities,
            max_candidates,
            grants: Mutex::new(GrantTable::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &SchedulerConfig, dispatcher: Arc<dyn GrantDispatcher>) -> Self {
        Self::new(
            cfg.build_scheme(),
            dispatcher,
            cfg.node_ids(),
            cfg.capacities(),
            cfg.max_candidates,
        )
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    pub fn capacities(&self) -> &[Capacity] {
        &self.capacities
    }

    /// Fresh pool holding this scheduler's epoch-start capacities.
    pub fn new_pool(&self) -> ResourcePool {
        ResourcePool::new(self.capacities.clone())
    }

    /// Run one scheduling epoch.
    ///
    /// The pool is reset to the configured capacities first; on return it
    /// holds what the epoch left unused.
    pub async fn run_epoch(
        &self,
        pool: &mut ResourcePool,
        candidates: &CandidateSet,
    ) -> Result<EpochOutcome, CoreError> {
        pool.reset(&self.capacities);

        if candidates.len() > self.max_candidates {
            tracing::warn!(
                count = candidates.len(),
                limit = self.max_candidates,
                "candidate set over limit"
            );
            return Err(CoreError::CandidateLimitExceeded {
                count: candidates.len(),
                limit: self.max_candidates,
            });
        }
        if candidates.num_nodes() != self.node_ids.len() {
            return Err(CoreError::NodeTableMismatch {
                candidate_nodes: candidates.num_nodes(),
                scheduler_nodes: self.node_ids.len(),
            });
        }

        let started = Instant::now();
        let solution = self.scheme.schedule_requests(candidates, pool)?;
        let elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);

        if let Err(e) = check_feasible(&solution, &candidates.node_ids, &self.capacities) {
            tracing::warn!(scheme = self.scheme.name(), error = %e, "infeasible solution");
            return Err(e.into());
        }

        self.grants.lock().await.apply(&solution);

        let report = EpochReport {
            epoch_id: Uuid::new_v4(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            scheme: self.scheme.name(),
            candidates: candidates.len(),
            applications: candidates.num_apps(),
            admitted: solution.len(),
            total_utility: solution.total_utility(),
            elapsed_us,
        };
        tracing::info!(
            epoch = %report.epoch_id,
            sequence = report.sequence,
            scheme = report.scheme,
            candidates = report.candidates,
            admitted = report.admitted,
            total_utility = report.total_utility,
            elapsed_us = report.elapsed_us,
            "epoch scheduled"
        );

        let dispatched = match self.dispatcher.dispatch(&report, &solution).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(epoch = %report.epoch_id, error = %e, "grant dispatch failed");
                false
            }
        };

        Ok(EpochOutcome {
            report,
            solution,
            dispatched,
        })
    }

    /// Copy of the grant table as it stands after the last epoch.
    pub async fn grants(&self) -> GrantTable {
        self.grants.lock().await.clone()
    }

    pub async fn remove_app(&self, app: mec_types::AppId) -> bool {
        self.grants.lock().await.remove(app).is_some()
    }
}
