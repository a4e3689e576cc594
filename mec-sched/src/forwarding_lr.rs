use mec_pool::ResourcePool;
use mec_types::{CandidateSet, Capacity, PlacementCandidate, Solution};
use serde::{Deserialize, Serialize};

use crate::{
    admit_input, epoch_capacities, is_light, utilization, ScheduleError, SelectionScheme,
    SolutionAssembler,
};

/// Load class of a forwarding candidate: RB judged on the offload node, CU on the process node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LoadClass {
    Light,
    RbLightCuHeavy,
    RbHeavyCuLight,
    Heavy,
}

impl LoadClass {
    const ORDER: [LoadClass; 4] = [
        LoadClass::Light,
        LoadClass::RbLightCuHeavy,
        LoadClass::RbHeavyCuLight,
        LoadClass::Heavy,
    ];

    fn of(c: &PlacementCandidate, caps: &[Capacity]) -> Self {
        let rb_light = is_light(c.rb_demand, caps[c.offload_index].rb);
        let cu_light = is_light(c.cu_demand, caps[c.process_index].cu);
        match (rb_light, cu_light) {
            (true, true) => LoadClass::Light,
            (true, false) => LoadClass::RbLightCuHeavy,
            (false, true) => LoadClass::RbHeavyCuLight,
            (false, false) => LoadClass::Heavy,
        }
    }
}

/// The mixed class that gets a reduction run of its own.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeparatedType {
    #[default]
    RbLightCuHeavy,
    RbHeavyCuLight,
}

impl SeparatedType {
    fn class(self) -> LoadClass {
        match self {
            SeparatedType::RbLightCuHeavy => LoadClass::RbLightCuHeavy,
            SeparatedType::RbHeavyCuLight => LoadClass::RbHeavyCuLight,
        }
    }
}

/// Reduction accumulators, kept separately for the radio and compute legs.
struct Reductions {
    n_nodes: usize,
    app: Vec<f64>,
    rb_node: Vec<f64>,
    cu_node: Vec<f64>,
    rb_app_node: Vec<f64>, // [a * n_nodes + r]
    cu_app_node: Vec<f64>,
}

impl Reductions {
    fn new(n_apps: usize, n_nodes: usize) -> Self {
        Self {
            n_nodes,
            app: vec![0.0; n_apps],
            rb_node: vec![0.0; n_nodes],
            cu_node: vec![0.0; n_nodes],
            rb_app_node: vec![0.0; n_apps * n_nodes],
            cu_app_node: vec![0.0; n_apps * n_nodes],
        }
    }

    fn other_rb(&self, a: usize, r: usize) -> f64 {
        self.rb_node[r] - self.rb_app_node[a * self.n_nodes + r]
    }

    fn other_cu(&self, a: usize, r: usize) -> f64 {
        self.cu_node[r] - self.cu_app_node[a * self.n_nodes + r]
    }

    fn charge(&mut self, c: &PlacementCandidate, residual: f64) {
        let (a, o, p) = (c.app_index, c.offload_index, c.process_index);
        self.app[a] += residual;
        self.rb_node[o] += residual;
        self.rb_app_node[a * self.n_nodes + o] += residual;
        self.cu_node[p] += residual;
        self.cu_app_node[a * self.n_nodes + p] += residual;
    }
}

/// Local-ratio scheduler for placements whose radio and compute legs may
/// sit on different nodes.
///
/// Candidates are split into four load classes. One mixed class (chosen by
/// [`SeparatedType`]) is reduced on its own, with the heavy leg charged at
/// full weight; all other classes are reduced together in class order.
/// Each run is admitted in reverse against a scratch copy of the pool and
/// the run with the larger total utility is kept (ties keep the combined run).
pub struct ForwardingLocalRatio {
    separated: SeparatedType,
}

impl ForwardingLocalRatio {
    pub fn new(separated: SeparatedType) -> Self {
        Self { separated }
    }

    fn combined_stack(&self, set: &CandidateSet, caps: &[Capacity]) -> Vec<usize> {
        let skip = self.separated.class();
        let classes: Vec<LoadClass> = set.candidates.iter().map(|c| LoadClass::of(c, caps)).collect();
        let mut red = Reductions::new(set.num_apps(), caps.len());
        let mut stack = Vec::new();

        for class in LoadClass::ORDER.into_iter().filter(|&k| k != skip) {
            for i in (0..set.len()).filter(|&i| classes[i] == class) {
                let c = &set.candidates[i];
                let (Some(rb_util), Some(cu_util)) = (
                    utilization(c.rb_demand, caps[c.offload_index].rb),
                    utilization(c.cu_demand, caps[c.process_index].cu),
                ) else {
                    continue;
                };
                let residual = c.utility
                    - red.app[c.app_index]
                    - 2.0 * red.other_rb(c.app_index, c.offload_index) * rb_util
                    - 2.0 * red.other_cu(c.app_index, c.process_index) * cu_util;
                if residual <= 0.0 {
                    continue;
                }
                stack.push(i);
                red.charge(c, residual);
            }
        }
        stack
    }

    fn separated_stack(&self, set: &CandidateSet, caps: &[Capacity]) -> Vec<usize> {
        let only = self.separated.class();
        let mut red = Reductions::new(set.num_apps(), caps.len());
        let mut stack = Vec::new();

        for (i, c) in set.candidates.iter().enumerate() {
            if LoadClass::of(c, caps) != only {
                continue;
            }
            let other_rb = red.other_rb(c.app_index, c.offload_index);
            let other_cu = red.other_cu(c.app_index, c.process_index);
            // The light leg is weighted by its utilization, the heavy leg in full.
            let leg_charge = match self.separated {
                SeparatedType::RbLightCuHeavy => {
                    utilization(c.rb_demand, caps[c.offload_index].rb)
                        .map(|rb_util| 2.0 * other_rb * rb_util + other_cu)
                }
                SeparatedType::RbHeavyCuLight => {
                    utilization(c.cu_demand, caps[c.process_index].cu)
                        .map(|cu_util| other_rb + 2.0 * other_cu * cu_util)
                }
            };
            let Some(leg_charge) = leg_charge else { continue };
            let residual = c.utility - red.app[c.app_index] - leg_charge;
            if residual <= 0.0 {
                continue;
            }
            stack.push(i);
            red.charge(c, residual);
        }
        stack
    }

    fn select(
        set: &CandidateSet,
        stack: &[usize],
        mut scratch: ResourcePool,
    ) -> Result<(Solution, ResourcePool), ScheduleError> {
        let mut asm = SolutionAssembler::new(set);
        asm.admit_in_order(stack.iter().rev().copied(), &mut scratch)?;
        Ok((asm.finish(), scratch))
    }
}

impl Default for ForwardingLocalRatio {
    fn default() -> Self {
        Self::new(SeparatedType::default())
    }
}

impl SelectionScheme for ForwardingLocalRatio {
    fn name(&self) -> &'static str {
        "forwarding-local-ratio"
    }

    fn schedule_requests(
        &self,
        candidates: &CandidateSet,
        pool: &mut ResourcePool,
    ) -> Result<Solution, ScheduleError> {
        tracing::debug!(scheme = self.name(), separated = ?self.separated, "scheduling starts");
        if !admit_input(candidates, pool, false)? {
            tracing::debug!(scheme = self.name(), "no applications to schedule");
            return Ok(Solution::empty());
        }

        let caps = epoch_capacities(pool);
        let combined = self.combined_stack(candidates, &caps);
        let separated = self.separated_stack(candidates, &caps);

        let (combined_solution, combined_pool) = Self::select(candidates, &combined, pool.clone())?;
        let (separated_solution, separated_pool) =
            Self::select(candidates, &separated, pool.clone())?;

        let (solution, remaining) =
            if combined_solution.total_utility() >= separated_solution.total_utility() {
                (combined_solution, combined_pool)
            } else {
                (separated_solution, separated_pool)
            };
        *pool = remaining;

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
    use mec_types::{AppId, NodeId};

    fn two_nodes(candidates: Vec<PlacementCandidate>, apps: usize) -> CandidateSet {
        CandidateSet::new(
            (1..=apps as u64).map(AppId).collect(),
            vec![NodeId(1), NodeId(2)],
            candidates,
        )
    }

    #[test]
    fn classifies_legs_on_their_own_nodes() {
        let caps = [Capacity::new(10, 0), Capacity::new(0, 10)];
        let c = PlacementCandidate::forwarded(0, 0, 1, 5, 6, 1.0, 0.01);
        assert_eq!(LoadClass::of(&c, &caps), LoadClass::RbLightCuHeavy);
        let c = PlacementCandidate::forwarded(0, 0, 1, 6, 5, 1.0, 0.01);
        assert_eq!(LoadClass::of(&c, &caps), LoadClass::RbHeavyCuLight);
    }

    #[test]
    fn forwarded_candidate_is_admitted_across_nodes() {
        let set = two_nodes(vec![PlacementCandidate::forwarded(0, 0, 1, 5, 5, 10.0, 0.02)], 1);
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 0), Capacity::new(0, 10)]);

        let solution = ForwardingLocalRatio::default()
            .schedule_requests(&set, &mut pool)
            .unwrap();

        assert_eq!(solution.len(), 1);
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(5, 0));
        assert_eq!(pool.remaining(1).unwrap(), Capacity::new(0, 5));
    }

    #[test]
    fn separated_run_wins_when_it_carries_more_utility() {
        // Only candidate is RB-light / CU-heavy, so the combined run is empty.
        let set = two_nodes(vec![PlacementCandidate::forwarded(0, 0, 1, 2, 8, 6.0, 0.02)], 1);
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10), Capacity::new(10, 10)]);

        let solution = ForwardingLocalRatio::new(SeparatedType::RbLightCuHeavy)
            .schedule_requests(&set, &mut pool)
            .unwrap();
        assert_eq!(solution.len(), 1);
        assert_eq!(pool.remaining(1).unwrap(), Capacity::new(10, 2));

        // Separating the other mixed class puts it in the combined run instead.
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10), Capacity::new(10, 10)]);
        let solution = ForwardingLocalRatio::new(SeparatedType::RbHeavyCuLight)
            .schedule_requests(&set, &mut pool)
            .unwrap();
        assert_eq!(solution.len(), 1);
    }

    #[test]
    fn losing_run_leaves_no_trace_in_pool() {
        // Combined run: light app1 (u=3). Separated run: app2 (u=9) CU-heavy on node 1.
        let set = two_nodes(
            vec![
                PlacementCandidate::forwarded(0, 0, 1, 1, 1, 3.0, 0.02),
                PlacementCandidate::forwarded(1, 0, 1, 1, 9, 9.0, 0.02),
            ],
            2,
        );
        let mut pool = ResourcePool::new(vec![Capacity::new(10, 10), Capacity::new(10, 10)]);

        let solution = ForwardingLocalRatio::default()
            .schedule_requests(&set, &mut pool)
            .unwrap();

        assert_eq!(solution.len(), 1);
        assert!(solution.contains(AppId(2)));
        assert_eq!(pool.remaining(0).unwrap(), Capacity::new(9, 10));
        assert_eq!(pool.remaining(1).unwrap(), Capacity::new(10, 1));
    }
}
