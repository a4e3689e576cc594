use std::collections::{BTreeMap, HashMap};

use mec_types::{AppId, Grant, Solution};

/// Granted max-offload-time and utility per application.
///
/// Entries survive across epochs until a later solution overwrites them or
/// the application is removed.
#[derive(Clone, Debug, Default)]
pub struct GrantTable {
    grants: HashMap<AppId, Grant>,
}

impl GrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every admitted application of `solution`; returns how many were written.
    pub fn apply(&mut self, solution: &Solution) -> usize {
        let mut written = 0;
        for entry in &solution.entries {
            if let Some(grant) = solution.grant(entry.app_id) {
                self.grants.insert(entry.app_id, grant);
                written += 1;
            }
        }
        written
    }

    pub fn get(&self, app: AppId) -> Option<Grant> {
        self.grants.get(&app).copied()
    }

    pub fn max_offload_time(&self, app: AppId) -> Option<f64> {
        self.get(app).map(|g| g.max_offload_time)
    }

    pub fn utility(&self, app: AppId) -> Option<f64> {
        self.get(app).map(|g| g.utility)
    }

    pub fn remove(&mut self, app: AppId) -> Option<Grant> {
        self.grants.remove(&app)
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Ordered copy, for reporting.
    pub fn snapshot(&self) -> BTreeMap<AppId, Grant> {
        self.grants.iter().map(|(k, v)| (*k, *v)).collect()
    }
}
