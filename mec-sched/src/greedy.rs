use mec_pool::ResourcePool;
use mec_types::{CandidateSet, Capacity, Solution};

use crate::{
    admit_input, epoch_capacities, utilization, ScheduleError, SelectionScheme, SolutionAssembler,
};

/// Utility-ranked greedy with forwarding support.
///
/// Each application acts as a player picking its best-utility placement, so
/// candidates are ranked by utility alone. Offload and process nodes may
/// differ; RB is checked on the offload node and CU on the process node.
pub struct GreedyForwarding;

impl SelectionScheme for GreedyForwarding {
    fn name(&self) -> &'static str {
        "greedy-forwarding"
    }

    fn schedule_requests(
        &self,
        candidates: &CandidateSet,
        pool: &mut ResourcePool,
    ) -> Result<Solution, ScheduleError> {
        tracing::debug!(scheme = self.name(), "scheduling starts");
        if !admit_input(candidates, pool, false)? {
            tracing::debug!(scheme = self.name(), "no applications to schedule");
            return Ok(Solution::empty());
        }

        // Stable: equal utilities keep the order the generator produced.
        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| {
            candidates.candidates[b]
                .utility
                .total_cmp(&candidates.candidates[a].utility)
        });

        let mut asm = SolutionAssembler::new(candidates);
        asm.admit_in_order(order, pool)?;
        let solution = asm.finish();

        tracing::debug!(
            scheme = self.name(),
            selected = solution.len(),
            total = candidates.len(),
            "scheduling ends"
        );
        Ok(solution)
    }
}

/// Greedy ranked by utility per unit of normalized resource use.
///
/// efficiency = utility / ((rb / RB) · (cu / CU)) on the candidate's node, using
/// epoch-start capacities. Both legs run on one node.
pub struct EfficiencyGreedy;

impl EfficiencyGreedy {
    fn efficiency(candidates: &CandidateSet, caps: &[Capacity], i: usize) -> f64 {
        let c = &candidates.candidates[i];
        let cap = caps[c.offload_index];
        match (utilization(c.rb_demand, cap.rb), utilization(c.cu_demand, cap.cu)) {
            (Some(rb_util), Some(cu_util)) => {
                let footprint = rb_util * cu_util;
                if footprint == 0.0 {
                    f64::INFINITY
                } else {
                    c.utility / footprint
                }
            }
            // Never fits; rank it last.
            _ => f64::NEG_INFINITY,
        }
    }
}

impl SelectionScheme for EfficiencyGreedy {
    fn name(&self) -> &'static str {
        "efficiency-greedy"
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
        let efficiency: Vec<f64> = (0..candidates.len())
            .map(|i| Self::efficiency(candidates, &caps, i))
            .collect();

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| efficiency[b].total_cmp(&efficiency[a]));

        let mut asm = SolutionAssembler::new(candidates);
        asm.admit_in_order(order, pool)?;
        let solution = asm.finish();

        tracing::debug!(
            scheme = self.name(),
            selected = solution.len(),
            total = candidates.len(),
            "scheduling ends"
        );
        Ok(solution)
    }
}

/// Efficiency greedy for forwarding placements.
///
/// efficiency = utility / ((rb / RB_offload) · (cu / CU_process)) with epoch-start
/// capacities; a candidate whose offload node has no RB or whose process node
/// has no CU gets efficiency 0.
pub struct ForwardingGreedy;

impl ForwardingGreedy {
    fn efficiency(candidates: &CandidateSet, caps: &[Capacity], i: usize) -> f64 {
        let c = &candidates.candidates[i];
        let rb_cap = caps[c.offload_index].rb;
        let cu_cap = caps[c.process_index].cu;
        if rb_cap == 0 || cu_cap == 0 {
            return 0.0;
        }
        let footprint = (f64::from(c.rb_demand) / f64::from(rb_cap))
            * (f64::from(c.cu_demand) / f64::from(cu_cap));
        if footprint == 0.0 {
            f64::INFINITY
        } else {
            c.utility / footprint
        }
    }
}

impl SelectionScheme for ForwardingGreedy {
    fn name(&self) -> &'static str {
        "forwarding-greedy"
    }

    fn schedule_requests(
        &self,
        candidates: &CandidateSet,
        pool: &mut ResourcePool,
    ) -> Result<Solution, ScheduleError> {
        tracing::debug!(scheme = self.name(), "scheduling starts");
        if !admit_input(candidates, pool, false)? {
            tracing::debug!(scheme = self.name(), "no applications to schedule");
            return Ok(Solution::empty());
        }

        let caps = epoch_capacities(pool);
        let efficiency: Vec<f64> = (0..candidates.len())
            .map(|i| Self::efficiency(candidates, &caps, i))
            .collect();

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        order.sort_by(|&a, &b| efficiency[b].total_cmp(&efficiency[a]));

        let mut asm = SolutionAssembler::new(candidates);
        asm.admit_in_order(order, pool)?;
        let solution = asm.finish();

        tracing::debug!(
            scheme = self.name(),
            selected = solution.len(),
            total = candidates.len(),
            "scheduling ends"
        );
        Ok(solution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mec_types::{AppId, Capacity, NodeId, PlacementCandidate};

    #[test]
    fn highest_utility_wins_contention() {
        // Same contention as the local-ratio test: greedy takes app1 (12 > 10).
        let set = CandidateSet::new(
            vec![AppId(100), AppId(101)],
            vec![NodeId(1)],
            vec![
                PlacementCandidate::local(0, 0, 5, 1, 10.0, 0.02),
                PlacementCandidate::local(1, 0, 8, 1, 12.0, 0.03),
            ],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10)]);

        let solution = GreedyForwarding.schedule_requests(&set, &mut pool).unwrap();

        assert_eq!(solution.len(), 1);
        assert_eq!(solution.entries[0].app_id, AppId(101));
        assert!(solution.grant(AppId(100)).is_none());
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(2, 9));
    }

    #[test]
    fn equal_utility_keeps_generator_order() {
        let set = CandidateSet::new(
            vec![AppId(1), AppId(2)],
            vec![NodeId(1)],
            vec![
                PlacementCandidate::local(1, 0, 6, 6, 7.0, 0.02),
                PlacementCandidate::local(0, 0, 6, 6, 7.0, 0.02),
            ],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10)]);

        let solution = GreedyForwarding.schedule_requests(&set, &mut pool).unwrap();
        assert_eq!(solution.entries.len(), 1);
        assert_eq!(solution.entries[0].app_id, AppId(2));
    }

    #[test]
    fn forwarding_uses_independent_legs() {
        let set = CandidateSet::new(
            vec![AppId(5)],
            vec![NodeId(10), NodeId(20)],
            vec![PlacementCandidate::forwarded(0, 0, 1, 5, 5, 4.0, 0.01)],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 0), Capacity::new(0, 10)]);

        let solution = GreedyForwarding.schedule_requests(&set, &mut pool).unwrap();

        let entry = solution.entry(AppId(5)).copied().unwrap();
        assert_eq!(entry.offload_node, NodeId(10));
        assert_eq!(entry.process_node, NodeId(20));
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(5, 0));
        assert_eq!(pool.remaining(1).unwrap(), Capacity::new(0, 5));
    }

    #[test]
    fn efficiency_prefers_small_footprint() {
        // app0: 10 / (0.8*0.8) = 15.6; app1: 4 / (0.2*0.2) = 100.
        let set = CandidateSet::new(
            vec![AppId(1), AppId(2)],
            vec![NodeId(1)],
            vec![
                PlacementCandidate::local(0, 0, 8, 8, 10.0, 0.02),
                PlacementCandidate::local(1, 0, 2, 2, 4.0, 0.02),
            ],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10)]);

        let solution = EfficiencyGreedy.schedule_requests(&set, &mut pool).unwrap();

        assert_eq!(solution.entries[0].app_id, AppId(2));
        assert_eq!(solution.entries[1].app_id, AppId(1));
        assert_eq!(pool.remaining(0).unwrap(), Capacity::ZERO);
    }

    #[test]
    fn efficiency_rejects_forwarding() {
        let set = CandidateSet::new(
            vec![AppId(1)],
            vec![NodeId(1), NodeId(2)],
            vec![PlacementCandidate::forwarded(0, 0, 1, 1, 1, 1.0, 0.01)],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(5, 5), Capacity::new(5, 5)]);
        assert!(EfficiencyGreedy.schedule_requests(&set, &mut pool).is_err());
    }

    #[test]
    fn forwarding_efficiency_uses_offload_rb_and_process_cu() {
        // cand0: 6 / (0.5 * 0.5) = 24; cand1: 5 / (0.2 * 0.2) = 125 via node 1 -> node 0.
        let set = CandidateSet::new(
            vec![AppId(1), AppId(2)],
            vec![NodeId(10), NodeId(20)],
            vec![
                PlacementCandidate::forwarded(0, 0, 1, 5, 5, 6.0, 0.01),
                PlacementCandidate::forwarded(1, 1, 0, 2, 2, 5.0, 0.02),
            ],
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10), Capacity::new(10, 10)]);

        let solution = ForwardingGreedy.schedule_requests(&set, &mut pool).unwrap();

        assert_eq!(solution.entries[0].app_id, AppId(2));
        assert_eq!(solution.entries[0].offload_node, NodeId(20));
        assert_eq!(solution.entries[0].process_node, NodeId(10));
        assert_eq!(solution.entries[1].app_id, AppId(1));
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(5, 8));
        assert_eq!(pool.remaining(1).unwrap(), Capacity::new(8, 5));
    }

    #[test]
    fn forwarding_efficiency_is_zero_on_exhausted_node() {
        // cand0 ranks above cand1 on utility but its offload node has no RB.
        let set = CandidateSet::new(
            vec![AppId(1), AppId(2)],
            vec![NodeId(10), NodeId(20)],
            vec![
                PlacementCandidate::forwarded(0, 0, 1, 0, 1, 9.0, 0.01),
                PlacementCandidate::forwarded(1, 1, 1, 9, 9, 1.0, 0.02),
            ],
        );
        let caps = [Capacity::new(0, 10), Capacity::new(10, 10)];
        assert_eq!(ForwardingGreedy::efficiency(&set, &caps, 0), 0.0);
        assert!(ForwardingGreedy::efficiency(&set, &caps, 1) > 0.0);

        let mut pool = ResourcePool::new(caps.to_vec());
        let solution = ForwardingGreedy.schedule_requests(&set, &mut pool).unwrap();

        // Zero RB demand still fits; it is just offered last.
        assert_eq!(solution.len(), 2);
        assert_eq!(solution.entries[0].app_id, AppId(2));
        assert_eq!(solution.entries[1].app_id, AppId(1));
    }
}
