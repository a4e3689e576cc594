use std::sync::Arc;

use futures_util::future::try_join_all;
use mec_pool::ResourcePool;
use mec_sched::SelectionScheme;
use mec_types::{CandidateSet, Solution};

use crate::CoreError;

/// An independent scheduling domain: its own nodes, pool and candidates.
///
/// Domains never share nodes or applications.
#[derive(Clone, Debug)]
pub struct Domain {
    pub candidates: CandidateSet,
    pub pool: ResourcePool,
}

#[derive(Clone, Debug)]
pub struct DomainResult {
    pub solution: Solution,
    /// Pool after the run, holding what the domain left unused.
    pub pool: ResourcePool,
}

/// Schedule disjoint domains concurrently on the blocking pool.
///
/// Results come back in input order. The first domain that fails aborts the
/// whole call.
pub async fn schedule_domains(
    scheme: Arc<dyn SelectionScheme>,
    domains: Vec<Domain>,
) -> Result<Vec<DomainResult>, CoreError> {
    let tasks = domains.into_iter().map(|domain| {
        let scheme = Arc::clone(&scheme);
        async move {
            let Domain {
                candidates,
                mut pool,
            } = domain;
            let handle = tokio::task::spawn_blocking(move || {
                scheme
                    .schedule_requests(&candidates, &mut pool)
                    .map(|solution| DomainResult { solution, pool })
            });
            match handle.await {
                Ok(result) => result.map_err(CoreError::from),
                Err(e) => Err(CoreError::Join(e.to_string())),
            }
        }
    });
    try_join_all(tasks).await
}
