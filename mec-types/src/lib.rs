use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Opaque application identifier, stable across epochs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u64);

/// Opaque edge node (RSU) identifier, stable across epochs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app-{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// A pair of radio resource blocks and compute units.
///
/// Used both for node capacities and for candidate demands.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Capacity {
    pub rb: u32,
    pub cu: u32,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity { rb: 0, cu: 0 };

    pub fn new(rb: u32, cu: u32) -> Self {
        Self { rb, cu }
    }

    /// True when both dimensions of `demand` fit into `self`.
    pub fn covers(&self, demand: Capacity) -> bool {
        self.rb >= demand.rb && self.cu >= demand.cu
    }
}

/// One way to serve an application's task during the current epoch.
///
/// Indices point into the epoch's `CandidateSet::app_ids` / `node_ids`
/// arrays and are meaningless outside of that epoch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementCandidate {
    pub app_index: usize,
    /// Node serving the radio leg (RB are taken here).
    pub offload_index: usize,
    /// Node serving the compute leg (CU are taken here).
    pub process_index: usize,
    pub rb_demand: u32,
    pub cu_demand: u32,
    pub utility: f64,
    pub max_offload_time: f64,
}

impl PlacementCandidate {
    /// Candidate whose radio and compute legs are both served by `node_index`.
    pub fn local(
        app_index: usize,
        node_index: usize,
        rb_demand: u32,
        cu_demand: u32,
        utility: f64,
        max_offload_time: f64,
    ) -> Self {
        Self {
            app_index,
            offload_index: node_index,
            process_index: node_index,
            rb_demand,
            cu_demand,
            utility,
            max_offload_time,
        }
    }

    /// Candidate whose compute leg is forwarded over the backhaul to `process_index`.
    pub fn forwarded(
        app_index: usize,
        offload_index: usize,
        process_index: usize,
        rb_demand: u32,
        cu_demand: u32,
        utility: f64,
        max_offload_time: f64,
    ) -> Self {
        Self {
            app_index,
            offload_index,
            process_index,
            rb_demand,
            cu_demand,
            utility,
            max_offload_time,
        }
    }

    pub fn is_forwarding(&self) -> bool {
        self.offload_index != self.process_index
    }

    pub fn demand(&self) -> Capacity {
        Capacity::new(self.rb_demand, self.cu_demand)
    }
}

/// Contract violations in a candidate set handed over by the generator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CandidateError {
    #[error("candidate {candidate}: application index {app_index} out of range ({apps} applications)")]
    AppIndexOutOfRange {
        candidate: usize,
        app_index: usize,
        apps: usize,
    },
    #[error("candidate {candidate}: node index {node_index} out of range ({nodes} nodes)")]
    NodeIndexOutOfRange {
        candidate: usize,
        node_index: usize,
        nodes: usize,
    },
    #[error("candidate {candidate}: utility {utility} must be finite and non-negative")]
    InvalidUtility { candidate: usize, utility: f64 },
    #[error("candidate {candidate}: max offload time {value} is not finite")]
    InvalidMaxOffloadTime { candidate: usize, value: f64 },
    #[error("candidate {candidate}: forwarding placement not supported by this scheme")]
    ForwardingNotSupported { candidate: usize },
    #[error("node id table has {node_ids} entries but the resource pool has {pool_nodes}")]
    NodeCountMismatch { node_ids: usize, pool_nodes: usize },
    #[error("{app} listed at application indices {first} and {second}")]
    DuplicateAppId { app: AppId, first: usize, second: usize },
    #[error("{node} listed at node indices {first} and {second}")]
    DuplicateNodeId { node: NodeId, first: usize, second: usize },
}

/// Flattened per-epoch candidate list plus the index -> id tables it refers to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub app_ids: Vec<AppId>,
    pub node_ids: Vec<NodeId>,
    pub candidates: Vec<PlacementCandidate>,
}

impl CandidateSet {
    pub fn new(
        app_ids: Vec<AppId>,
        node_ids: Vec<NodeId>,
        candidates: Vec<PlacementCandidate>,
    ) -> Self {
        Self {
            app_ids,
            node_ids,
            candidates,
        }
    }

    pub fn num_apps(&self) -> usize {
        self.app_ids.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Check every candidate against the index tables and a pool of `pool_nodes` nodes.
    pub fn validate(&self, pool_nodes: usize) -> Result<(), CandidateError> {
        if self.node_ids.len() != pool_nodes {
            return Err(CandidateError::NodeCountMismatch {
                node_ids: self.node_ids.len(),
                pool_nodes,
            });
        }
        if let Some((app, first, second)) = first_duplicate(&self.app_ids) {
            return Err(CandidateError::DuplicateAppId { app, first, second });
        }
        if let Some((node, first, second)) = first_duplicate(&self.node_ids) {
            return Err(CandidateError::DuplicateNodeId { node, first, second });
        }

        let apps = self.app_ids.len();
        let nodes = self.node_ids.len();
        for (candidate, c) in self.candidates.iter().enumerate() {
            if c.app_index >= apps {
                return Err(CandidateError::AppIndexOutOfRange {
                    candidate,
                    app_index: c.app_index,
                    apps,
                });
            }
            for node_index in [c.offload_index, c.process_index] {
                if node_index >= nodes {
                    return Err(CandidateError::NodeIndexOutOfRange {
                        candidate,
                        node_index,
                        nodes,
                    });
                }
            }
            if !c.utility.is_finite() || c.utility < 0.0 {
                return Err(CandidateError::InvalidUtility {
                    candidate,
                    utility: c.utility,
                });
            }
            if !c.max_offload_time.is_finite() {
                return Err(CandidateError::InvalidMaxOffloadTime {
                    candidate,
                    value: c.max_offload_time,
                });
            }
        }
        Ok(())
    }

    /// Reject forwarding candidates, for schemes that serve both legs on one node.
    pub fn require_local(&self) -> Result<(), CandidateError> {
        match self.candidates.iter().position(|c| c.is_forwarding()) {
            Some(candidate) => Err(CandidateError::ForwardingNotSupported { candidate }),
            None => Ok(()),
        }
    }
}

/// First id that appears twice, with both of its positions.
fn first_duplicate<T: Copy + Eq + Hash>(ids: &[T]) -> Option<(T, usize, usize)> {
    let mut seen = HashMap::with_capacity(ids.len());
    for (i, id) in ids.iter().enumerate() {
        if let Some(&first) = seen.get(id) {
            return Some((*id, first, i));
        }
        seen.insert(*id, i);
    }
    None
}

/// One admitted placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionEntry {
    pub app_id: AppId,
    pub offload_node: NodeId,
    pub process_node: NodeId,
    pub allocated_rb: u32,
    pub allocated_cu: u32,
}

/// What an admitted application was granted, kept for grant dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub max_offload_time: f64,
    pub utility: f64,
}

/// Result of one scheduling pass, in selection order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    pub entries: Vec<SolutionEntry>,
    pub granted_max_offload_time: BTreeMap<AppId, f64>,
    pub granted_utility: BTreeMap<AppId, f64>,
}

impl Solution {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, app: AppId) -> bool {
        self.entries.iter().any(|e| e.app_id == app)
    }

    pub fn entry(&self, app: AppId) -> Option<&SolutionEntry> {
        self.entries.iter().find(|e| e.app_id == app)
    }

    pub fn grant(&self, app: AppId) -> Option<Grant> {
        let max_offload_time = *self.granted_max_offload_time.get(&app)?;
        let utility = *self.granted_utility.get(&app)?;
        Some(Grant {
            max_offload_time,
            utility,
        })
    }

    pub fn total_utility(&self) -> f64 {
        self.granted_utility.values().sum()
    }

    /// SHA-256 over the canonical JSON form, hex encoded.
    ///
    /// Two runs that produce the same entries in the same order with the same
    /// grants yield the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        // Serializing plain structs and BTreeMaps into a Vec cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        h.update(&bytes);
        format!("{:x}", h.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(candidates: Vec<PlacementCandidate>) -> CandidateSet {
        CandidateSet::new(
            vec![AppId(10), AppId(11)],
            vec![NodeId(1), NodeId(2)],
            candidates,
        )
    }

    #[test]
    fn validate_accepts_well_formed_set() {
        let set = set_with(vec![
            PlacementCandidate::local(0, 0, 2, 2, 1.0, 0.01),
            PlacementCandidate::forwarded(1, 0, 1, 2, 2, 0.0, 0.01),
        ]);
        assert_eq!(set.validate(2), Ok(()));
    }

    #[test]
    fn validate_rejects_out_of_range_indices() {
        let set = set_with(vec![PlacementCandidate::local(2, 0, 1, 1, 1.0, 0.01)]);
        assert!(matches!(
            set.validate(2),
            Err(CandidateError::AppIndexOutOfRange { candidate: 0, app_index: 2, apps: 2 })
        ));

        let set = set_with(vec![PlacementCandidate::forwarded(0, 0, 5, 1, 1, 1.0, 0.01)]);
        assert!(matches!(
            set.validate(2),
            Err(CandidateError::NodeIndexOutOfRange { node_index: 5, .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_numbers_and_pool_mismatch() {
        let set = set_with(vec![PlacementCandidate::local(0, 0, 1, 1, -1.0, 0.01)]);
        assert!(matches!(set.validate(2), Err(CandidateError::InvalidUtility { .. })));

        let set = set_with(vec![PlacementCandidate::local(0, 0, 1, 1, f64::NAN, 0.01)]);
        assert!(matches!(set.validate(2), Err(CandidateError::InvalidUtility { .. })));

        let set = set_with(vec![PlacementCandidate::local(0, 0, 1, 1, 1.0, f64::INFINITY)]);
        assert!(matches!(set.validate(2), Err(CandidateError::InvalidMaxOffloadTime { .. })));

        let set = set_with(Vec::new());
        assert!(matches!(set.validate(3), Err(CandidateError::NodeCountMismatch { .. })));
    }

    #[test]
    fn validate_rejects_repeated_ids() {
        let set = CandidateSet::new(
            vec![AppId(7), AppId(8), AppId(7)],
            vec![NodeId(1)],
            vec![PlacementCandidate::local(0, 0, 2, 2, 1.0, 0.01)],
        );
        assert_eq!(
            set.validate(1),
            Err(CandidateError::DuplicateAppId { app: AppId(7), first: 0, second: 2 })
        );

        let set = CandidateSet::new(
            vec![AppId(7)],
            vec![NodeId(5), NodeId(5)],
            vec![PlacementCandidate::local(0, 1, 2, 2, 1.0, 0.01)],
        );
        assert_eq!(
            set.validate(2),
            Err(CandidateError::DuplicateNodeId { node: NodeId(5), first: 0, second: 1 })
        );
    }

    #[test]
    fn require_local_points_at_first_forwarding_candidate() {
        let set = set_with(vec![
            PlacementCandidate::local(0, 0, 1, 1, 1.0, 0.01),
            PlacementCandidate::forwarded(1, 1, 0, 1, 1, 1.0, 0.01),
        ]);
        assert_eq!(
            set.require_local(),
            Err(CandidateError::ForwardingNotSupported { candidate: 1 })
        );
    }

    #[test]
    fn fingerprint_tracks_content() {
        let mut a = Solution::empty();
        a.entries.push(SolutionEntry {
            app_id: AppId(1),
            offload_node: NodeId(1),
            process_node: NodeId(1),
            allocated_rb: 3,
            allocated_cu: 4,
        });
        a.granted_utility.insert(AppId(1), 2.5);
        a.granted_max_offload_time.insert(AppId(1), 0.02);

        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.grant(AppId(1)).map(|g| g.utility), Some(2.5));

        let mut c = a.clone();
        c.entries[0].allocated_cu = 5;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
