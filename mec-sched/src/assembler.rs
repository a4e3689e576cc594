use mec_pool::ResourcePool;
use mec_types::{CandidateSet, Capacity, PlacementCandidate, Solution, SolutionEntry};

use crate::ScheduleError;

/// Accumulates admitted placements for one scheduling pass.
///
/// Enforces one placement per application and the check-then-deduct
/// discipline on the pool: RB is taken from the offload node and CU from
/// the process node, each leg checked on its own.
pub struct SolutionAssembler<'a> {
    set: &'a CandidateSet,
    admitted: Vec<bool>,
    solution: Solution,
}

impl<'a> SolutionAssembler<'a> {
    pub fn new(set: &'a CandidateSet) -> Self {
        Self {
            set,
            admitted: vec![false; set.num_apps()],
            solution: Solution::empty(),
        }
    }

    pub fn is_admitted(&self, app_index: usize) -> bool {
        self.admitted.get(app_index).copied().unwrap_or(false)
    }

    /// Admit candidate `index` if its application is still open and both legs fit.
    ///
    /// Returns whether it was admitted. Infeasibility is not an error.
    pub fn try_admit(
        &mut self,
        index: usize,
        pool: &mut ResourcePool,
    ) -> Result<bool, ScheduleError> {
        let c: PlacementCandidate = self.set.candidates[index];
        if self.is_admitted(c.app_index) {
            return Ok(false);
        }

        let rb_leg = Capacity::new(c.rb_demand, 0);
        let cu_leg = Capacity::new(0, c.cu_demand);
        if !pool.fits(c.offload_index, rb_leg) || !pool.fits(c.process_index, cu_leg) {
            tracing::trace!(candidate = index, "skipped: insufficient remaining capacity");
            return Ok(false);
        }
        pool.deduct(c.offload_index, rb_leg)?;
        pool.deduct(c.process_index, cu_leg)?;

        let app_id = self.set.app_ids[c.app_index];
        self.solution.entries.push(SolutionEntry {
            app_id,
            offload_node: self.set.node_ids[c.offload_index],
            process_node: self.set.node_ids[c.process_index],
            allocated_rb: c.rb_demand,
            allocated_cu: c.cu_demand,
        });
        self.solution
            .granted_max_offload_time
            .insert(app_id, c.max_offload_time);
        self.solution.granted_utility.insert(app_id, c.utility);
        self.admitted[c.app_index] = true;
        Ok(true)
    }

    /// Offer candidates in the given order.
    pub fn admit_in_order<I>(&mut self, order: I, pool: &mut ResourcePool) -> Result<(), ScheduleError>
    where
        I: IntoIterator<Item = usize>,
    {
        for index in order {
            self.try_admit(index, pool)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Solution {
        self.solution
    }
}
