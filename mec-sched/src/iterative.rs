use std::collections::BTreeMap;

use mec_pool::ResourcePool;
use mec_types::{CandidateSet, Capacity, Solution};

use crate::{admit_input, epoch_capacities, ScheduleError, SelectionScheme, SolutionAssembler};

pub const DEFAULT_MAX_ITERATIONS: usize = 30;

/// Alternates between fixing each application's node and fixing its
/// (RB, CU) allocation.
///
/// With the node mapping fixed, a utility-ordered greedy picks one candidate
/// per application among those on its mapped node. With the allocation fixed,
/// the same greedy picks among candidates of any node carrying exactly that
/// allocation, which yields the next mapping. Iteration stops at the first
/// step that does not raise total utility, or after `max_iterations` rounds.
/// Both legs run on one node.
pub struct Iterative {
    max_iterations: usize,
}

impl Iterative {
    pub fn new(max_iterations: usize) -> Self {
        Self { max_iterations }
    }
}

impl Default for Iterative {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

/// Candidate indices per application, grouped by node in ascending node order.
type PerAppNode = Vec<BTreeMap<usize, Vec<usize>>>;

/// Utility-ordered one-per-application greedy against a scratch copy of `caps`.
///
/// Returns the picked candidate per application.
fn greedy_pick(
    set: &CandidateSet,
    caps: &[Capacity],
    mut offered: Vec<usize>,
) -> Result<Vec<Option<usize>>, ScheduleError> {
    offered.sort_by(|&a, &b| set.candidates[b].utility.total_cmp(&set.candidates[a].utility));

    let mut scratch = ResourcePool::new(caps.to_vec());
    let mut asm = SolutionAssembler::new(set);
    let mut picked = vec![None; set.num_apps()];
    for i in offered {
        if asm.try_admit(i, &mut scratch)? {
            picked[set.candidates[i].app_index] = Some(i);
        }
    }
    Ok(picked)
}

fn total_utility(set: &CandidateSet, picked: &[Option<usize>]) -> f64 {
    picked
        .iter()
        .flatten()
        .map(|&i| set.candidates[i].utility)
        .sum()
}

impl SelectionScheme for Iterative {
    fn name(&self) -> &'static str {
        "iterative"
    }

    fn schedule_requests(
        &self,
        candidates: &CandidateSet,
        pool: &mut ResourcePool,
    ) -> Result<Solution, ScheduleError> {
        tracing::debug!(scheme = self.name(), "scheduling starts");
        if !admit_input(candidates, pool, true)? {
            tracing::debug!(scheme = self.name(), "no applications to schedule");
            return Ok(Solution::empty());
        }

        let caps = epoch_capacities(pool);
        let n_apps = candidates.num_apps();

        let mut by_node: PerAppNode = vec![BTreeMap::new(); n_apps];
        for (i, c) in candidates.candidates.iter().enumerate() {
            by_node[c.app_index].entry(c.offload_index).or_default().push(i);
        }

        // 1) Start from each application's best-utility candidate (first on ties).
        let mut mapping: Vec<Option<usize>> = vec![None; n_apps];
        let mut allocation: Vec<Capacity> = vec![Capacity::ZERO; n_apps];
        for (a, nodes) in by_node.iter().enumerate() {
            let best = nodes.values().flatten().copied().reduce(|best, i| {
                let (ui, ub) = (candidates.candidates[i].utility, candidates.candidates[best].utility);
                if ui > ub || (ui == ub && i < best) {
                    i
                } else {
                    best
                }
            });
            if let Some(i) = best {
                mapping[a] = Some(candidates.candidates[i].offload_index);
                allocation[a] = candidates.candidates[i].demand();
            }
        }

        // 2) Alternate allocation and mapping steps while utility improves.
        let mut best: Vec<Option<usize>> = vec![None; n_apps];
        let mut best_utility = 0.0_f64;
        let mut rounds = 0;
        'rounds: while rounds < self.max_iterations {
            rounds += 1;

            for step in [Step::Allocate, Step::Map] {
                let offered: Vec<usize> = match step {
                    Step::Allocate => (0..n_apps)
                        .filter_map(|a| mapping[a].and_then(|r| by_node[a].get(&r)))
                        .flatten()
                        .copied()
                        .collect(),
                    Step::Map => (0..n_apps)
                        .flat_map(|a| {
                            let want = allocation[a];
                            by_node[a]
                                .values()
                                .flatten()
                                .copied()
                                .filter(move |&i| candidates.candidates[i].demand() == want)
                        })
                        .collect(),
                };
                let picked = greedy_pick(candidates, &caps, offered)?;
                let utility = total_utility(candidates, &picked);
                if utility <= best_utility {
                    tracing::debug!(scheme = self.name(), rounds, "no improvement, stopping");
                    break 'rounds;
                }

                for (a, p) in picked.iter().enumerate() {
                    if let Some(i) = *p {
                        match step {
                            Step::Allocate => allocation[a] = candidates.candidates[i].demand(),
                            Step::Map => mapping[a] = Some(candidates.candidates[i].offload_index),
                        }
                    }
                }
                best_utility = utility;
                best = picked;
            }
        }

        // 3) Admit the best assignment against the real pool, in application order.
        let mut asm = SolutionAssembler::new(candidates);
        asm.admit_in_order(best.into_iter().flatten(), pool)?;
        let solution = asm.finish();

        tracing::debug!(
            scheme = self.name(),
            selected = solution.len(),
            rounds,
            total = candidates.len(),
            "scheduling ends"
        );
        Ok(solution)
    }
}

#[derive(Clone, Copy)]
enum Step {
    Allocate,
    Map,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mec_types::{AppId, NodeId, PlacementCandidate};

    fn two_nodes(candidates: Vec<PlacementCandidate>) -> CandidateSet {
        CandidateSet::new(
            vec![AppId(1), AppId(2)],
            vec![NodeId(10), NodeId(20)],
            candidates,
        )
    }

    #[test]
    fn remapping_moves_loser_to_free_node() {
        // Both apps prefer node 0, which only fits one. The allocation step
        // admits app 0; the mapping step moves app 1 to node 1 with the same
        // (6, 6) allocation.
        let set = two_nodes(vec![
            PlacementCandidate::local(0, 0, 6, 6, 10.0, 0.01),
            PlacementCandidate::local(1, 0, 6, 6, 8.0, 0.02),
            PlacementCandidate::local(1, 1, 6, 6, 5.0, 0.03),
        ]);
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10), Capacity::new(10, 10)]);

        let solution = Iterative::default().schedule_requests(&set, &mut pool).unwrap();

        assert_eq!(solution.len(), 2);
        assert_eq!(solution.entry(AppId(1)).map(|e| e.offload_node), Some(NodeId(10)));
        assert_eq!(solution.entry(AppId(2)).map(|e| e.offload_node), Some(NodeId(20)));
        assert_eq!(solution.total_utility(), 15.0);
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(4, 4));
        assert_eq!(pool.remaining(1).unwrap(), Capacity::new(4, 4));
    }

    #[test]
    fn allocation_step_shrinks_to_fit() {
        // App 1 starts at its best (8, 8) on node 0 but only (2, 2) fits next
        // to app 0's placement.
        let set = CandidateSet::new(
            vec![AppId(1), AppId(2)],
            vec![NodeId(10)],
            vec![
                PlacementCandidate::local(0, 0, 8, 8, 10.0, 0.01),
                PlacementCandidate::local(1, 0, 8, 8, 9.0, 0.02),
                PlacementCandidate::local(1, 0, 2, 2, 3.0, 0.03),
            ],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10)]);

        let solution = Iterative::default().schedule_requests(&set, &mut pool).unwrap();

        assert_eq!(solution.total_utility(), 13.0);
        assert_eq!(solution.entry(AppId(2)).map(|e| e.allocated_rb), Some(2));
        assert_eq!(pool.remaining(0).unwrap(), Capacity::ZERO);
    }

    #[test]
    fn zero_rounds_admit_nothing() {
        let set = two_nodes(vec![PlacementCandidate::local(0, 0, 1, 1, 1.0, 0.01)]);
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10), Capacity::new(10, 10)]);

        let solution = Iterative::new(0).schedule_requests(&set, &mut pool).unwrap();

        assert!(solution.is_empty());
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(10, 10));
    }

    #[test]
    fn rejects_forwarding() {
        let set = two_nodes(vec![PlacementCandidate::forwarded(0, 0, 1, 1, 1, 1.0, 0.01)]);
        let mut pool = ResourcePool::new(vec![Capacity::new(5, 5), Capacity::new(5, 5)]);
        assert!(matches!(
            Iterative::default().schedule_requests(&set, &mut pool),
            Err(ScheduleError::InvalidCandidate(_))
        ));
    }
}
