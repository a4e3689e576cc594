use mec_pool::ResourcePool;
use mec_types::{CandidateSet, Capacity, Solution};

use crate::{
    admit_input, epoch_capacities, is_light, utilization, ScheduleError, SelectionScheme,
    SolutionAssembler,
};

/// Local-ratio scheduler for the multiple-choice two-dimensional knapsack.
///
/// Every candidate serves both legs on one node. Candidates using at most
/// half of their node's epoch-start RB and CU are "light", all others are
/// "heavy". Light candidates are reduced before heavy ones; each kept
/// candidate charges its residual utility to its application, to its node
/// and to the (application, node) pair:
///
///   residual_i = u_i − R_app[a] − (R_node[r] − R_app_node[a][r]) · 2 · (rb_i/RB_r + cu_i/CU_r)
///
/// Admission then walks the kept candidates backwards, which yields a
/// 2-approximation of the optimal total utility.
pub struct LocalRatio;

/// Candidate indices kept by the reduction passes, in the order they were kept.
///
/// Indices missing from the result had non-positive residual utility (or a
/// positive demand on a node with zero capacity) and can never be admitted.
pub fn reduction_stack(set: &CandidateSet, capacities: &[Capacity]) -> Vec<usize> {
    let n_apps = set.num_apps();
    let n_nodes = capacities.len();

    // 1) Partition, preserving the original relative order in each group.
    let (light, heavy): (Vec<usize>, Vec<usize>) = (0..set.len()).partition(|&i| {
        let c = &set.candidates[i];
        let cap = capacities[c.offload_index];
        is_light(c.rb_demand, cap.rb) && is_light(c.cu_demand, cap.cu)
    });

    // 2) Reduction, light group first, accumulators shared by both groups.
    let mut app_red = vec![0.0_f64; n_apps];
    let mut node_red = vec![0.0_f64; n_nodes];
    let mut app_node_red = vec![0.0_f64; n_apps * n_nodes]; // [a * n_nodes + r]
    let mut stack = Vec::with_capacity(set.len());

    for i in light.into_iter().chain(heavy) {
        let c = &set.candidates[i];
        let (a, r) = (c.app_index, c.offload_index);
        let cap = capacities[r];

        let (Some(rb_util), Some(cu_util)) =
            (utilization(c.rb_demand, cap.rb), utilization(c.cu_demand, cap.cu))
        else {
            tracing::trace!(candidate = i, "discarded: demand on zero-capacity node");
            continue;
        };

        let other_apps_at_node = node_red[r] - app_node_red[a * n_nodes + r];
        let residual = c.utility - app_red[a] - other_apps_at_node * 2.0 * (rb_util + cu_util);
        if residual <= 0.0 {
            tracing::trace!(candidate = i, residual, "discarded: non-positive residual utility");
            continue;
        }

        stack.push(i);
        app_red[a] += residual;
        node_red[r] += residual;
        app_node_red[a * n_nodes + r] += residual;
    }

    stack
}

impl SelectionScheme for LocalRatio {
    fn name(&self) -> &'static str {
        "local-ratio"
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

        let capacities = epoch_capacities(pool);
        let stack = reduction_stack(candidates, &capacities);

        // 3) Selection in reverse reduction order against remaining capacity.
        let mut asm = SolutionAssembler::new(candidates);
        asm.admit_in_order(stack.iter().rev().copied(), pool)?;
        let solution = asm.finish();

        tracing::debug!(
            scheme = self.name(),
            selected = solution.len(),
            kept = stack.len(),
            total = candidates.len(),
            "scheduling ends"
        );
        Ok(solution)
    }
}
