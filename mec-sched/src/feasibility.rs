//! Post-conditions every scheme must satisfy.

use std::collections::{HashMap, HashSet};

use mec_types::{AppId, Capacity, NodeId, Solution};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeasibilityError {
    #[error("{0} admitted more than once")]
    DuplicateApp(AppId),
    #[error("solution references unknown {0}")]
    UnknownNode(NodeId),
    #[error("{node}: {allocated} RB allocated, capacity {capacity}")]
    RbExceeded {
        node: NodeId,
        allocated: u64,
        capacity: u32,
    },
    #[error("{node}: {allocated} CU allocated, capacity {capacity}")]
    CuExceeded {
        node: NodeId,
        allocated: u64,
        capacity: u32,
    },
    #[error("grant maps out of sync with entries for {0}")]
    GrantMismatch(AppId),
}

/// Check a solution against the epoch-start capacities of `node_ids`.
///
/// RB is summed per offload node and CU per process node.
pub fn check_feasible(
    solution: &Solution,
    node_ids: &[NodeId],
    capacities: &[Capacity],
) -> Result<(), FeasibilityError> {
    let index: HashMap<NodeId, usize> = node_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut rb = vec![0_u64; node_ids.len()];
    let mut cu = vec![0_u64; node_ids.len()];
    let mut seen = HashSet::new();

    for e in &solution.entries {
        if !seen.insert(e.app_id) {
            return Err(FeasibilityError::DuplicateApp(e.app_id));
        }
        if !solution.granted_utility.contains_key(&e.app_id)
            || !solution.granted_max_offload_time.contains_key(&e.app_id)
        {
            return Err(FeasibilityError::GrantMismatch(e.app_id));
        }
        let o = *index
            .get(&e.offload_node)
            .ok_or(FeasibilityError::UnknownNode(e.offload_node))?;
        let p = *index
            .get(&e.process_node)
            .ok_or(FeasibilityError::UnknownNode(e.process_node))?;
        rb[o] += u64::from(e.allocated_rb);
        cu[p] += u64::from(e.allocated_cu);
    }

    let granted: HashSet<AppId> = solution
        .granted_utility
        .keys()
        .chain(solution.granted_max_offload_time.keys())
        .copied()
        .collect();
    if let Some(extra) = granted.into_iter().find(|app| !seen.contains(app)) {
        return Err(FeasibilityError::GrantMismatch(extra));
    }

    for (i, node) in node_ids.iter().enumerate() {
        let cap = capacities.get(i).copied().unwrap_or_default();
        if rb[i] > u64::from(cap.rb) {
            return Err(FeasibilityError::RbExceeded {
                node: *node,
                allocated: rb[i],
                capacity: cap.rb,
            });
        }
        if cu[i] > u64::from(cap.cu) {
            return Err(FeasibilityError::CuExceeded {
                node: *node,
                allocated: cu[i],
                capacity: cap.cu,
            });
        }
    }
    Ok(())
}
