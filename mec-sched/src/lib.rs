use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use mec_pool::{PoolError, ResourcePool};
use mec_types::{CandidateError, CandidateSet, Capacity, Solution};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod assembler;
pub mod feasibility;
mod forwarding_lr;
mod greedy;
mod iterative;
mod local_ratio;

pub use assembler::SolutionAssembler;
pub use feasibility::{check_feasible, FeasibilityError};
pub use forwarding_lr::{ForwardingLocalRatio, SeparatedType};
pub use greedy::{EfficiencyGreedy, ForwardingGreedy, GreedyForwarding};
pub use iterative::{Iterative, DEFAULT_MAX_ITERATIONS};
pub use local_ratio::{reduction_stack, LocalRatio};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid candidate: {0}")]
    InvalidCandidate(#[from] CandidateError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Core selection interface: pick at most one placement per application.
///
/// Runs to completion without yielding. The pool must hold epoch-start
/// capacities on entry and holds the unused remainder on return.
pub trait SelectionScheme: Send + Sync {
    fn name(&self) -> &'static str;

    fn schedule_requests(
        &self,
        candidates: &CandidateSet,
        pool: &mut ResourcePool,
    ) -> Result<Solution, ScheduleError>;
}

/// Available scheme implementations, as named in configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeKind {
    LocalRatio,
    GreedyForwarding,
    EfficiencyGreedy,
    ForwardingLocalRatio,
    ForwardingGreedy,
    Iterative,
}

impl SchemeKind {
    pub const ALL: [SchemeKind; 6] = [
        SchemeKind::LocalRatio,
        SchemeKind::GreedyForwarding,
        SchemeKind::EfficiencyGreedy,
        SchemeKind::ForwardingLocalRatio,
        SchemeKind::ForwardingGreedy,
        SchemeKind::Iterative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeKind::LocalRatio => "local-ratio",
            SchemeKind::GreedyForwarding => "greedy-forwarding",
            SchemeKind::EfficiencyGreedy => "efficiency-greedy",
            SchemeKind::ForwardingLocalRatio => "forwarding-local-ratio",
            SchemeKind::ForwardingGreedy => "forwarding-greedy",
            SchemeKind::Iterative => "iterative",
        }
    }

    /// Whether the scheme accepts candidates whose offload and process nodes differ.
    pub fn supports_forwarding(&self) -> bool {
        matches!(
            self,
            SchemeKind::GreedyForwarding
                | SchemeKind::ForwardingLocalRatio
                | SchemeKind::ForwardingGreedy
        )
    }

    pub fn build(&self, separated: SeparatedType) -> Arc<dyn SelectionScheme> {
        match self {
            SchemeKind::LocalRatio => Arc::new(LocalRatio),
            SchemeKind::GreedyForwarding => Arc::new(GreedyForwarding),
            SchemeKind::EfficiencyGreedy => Arc::new(EfficiencyGreedy),
            SchemeKind::ForwardingLocalRatio => Arc::new(ForwardingLocalRatio::new(separated)),
            SchemeKind::ForwardingGreedy => Arc::new(ForwardingGreedy),
            SchemeKind::Iterative => Arc::new(Iterative::default()),
        }
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown scheme '{0}'")]
pub struct UnknownScheme(pub String);

impl FromStr for SchemeKind {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local-ratio" | "fastlr" => Ok(SchemeKind::LocalRatio),
            "greedy-forwarding" | "game-theory" | "fwdgametheory" => {
                Ok(SchemeKind::GreedyForwarding)
            }
            "efficiency-greedy" | "greedy" => Ok(SchemeKind::EfficiencyGreedy),
            "forwarding-local-ratio" | "fwdquicklr" => Ok(SchemeKind::ForwardingLocalRatio),
            "forwarding-greedy" | "fwdgreedy" => Ok(SchemeKind::ForwardingGreedy),
            "iterative" => Ok(SchemeKind::Iterative),
            _ => Err(UnknownScheme(s.to_string())),
        }
    }
}

/// Shared entry checks. `Ok(false)` means there is nothing to schedule.
fn admit_input(
    candidates: &CandidateSet,
    pool: &ResourcePool,
    local_only: bool,
) -> Result<bool, ScheduleError> {
    if candidates.app_ids.is_empty() {
        return Ok(false);
    }
    let checked = candidates.validate(pool.len()).and_then(|()| {
        if local_only {
            candidates.require_local()
        } else {
            Ok(())
        }
    });
    if let Err(e) = checked {
        tracing::warn!(error = %e, "rejecting malformed candidate set");
        return Err(e.into());
    }
    Ok(true)
}

/// `demand / capacity`, or `None` when a positive demand meets zero capacity.
fn utilization(demand: u32, capacity: u32) -> Option<f64> {
    if demand == 0 {
        Some(0.0)
    } else if capacity == 0 {
        None
    } else {
        Some(f64::from(demand) / f64::from(capacity))
    }
}

/// At most half of the capacity.
fn is_light(demand: u32, capacity: u32) -> bool {
    u64::from(demand) * 2 <= u64::from(capacity)
}

fn epoch_capacities(pool: &ResourcePool) -> Vec<Capacity> {
    pool.capacities().to_vec()
}
