use std::path::{Path, PathBuf};

use anyhow::Context;
use mec_core::read_ipc_candidates;
use mec_types::{AppId, CandidateSet, NodeId, PlacementCandidate};
use serde::Deserialize;

/// Recorded sequence of epochs to replay through a scheduler.
///
/// ```yaml
/// epochs:
///   - apps: [7, 8]
///     candidates:
///       - { app_index: 0, offload_index: 0, process_index: 1,
///           rb_demand: 5, cu_demand: 5, utility: 8.0, max_offload_time: 0.01 }
///   - apps: [7]
///     candidates_file: epoch1.arrow
/// ```
///
/// `candidates_file` names an Arrow IPC file, relative to the scenario file;
/// its rows are appended after any inline candidates.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub epochs: Vec<ScenarioEpoch>,
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioEpoch {
    pub apps: Vec<AppId>,
    #[serde(default)]
    pub candidates: Vec<PlacementCandidate>,
    #[serde(default)]
    pub candidates_file: Option<PathBuf>,
}

impl Scenario {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let mut scenario: Scenario = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        scenario.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(scenario)
    }

    /// Candidate sets over the configured node list, one per epoch.
    pub fn candidate_sets(&self, node_ids: &[NodeId]) -> anyhow::Result<Vec<CandidateSet>> {
        self.epochs
            .iter()
            .map(|e| {
                let mut candidates = e.candidates.clone();
                if let Some(file) = &e.candidates_file {
                    let path = self.base_dir.join(file);
                    let rows = read_ipc_candidates(&path)
                        .with_context(|| format!("reading candidates {}", path.display()))?;
                    candidates.extend(rows);
                }
                Ok(CandidateSet::new(e.apps.clone(), node_ids.to_vec(), candidates))
            })
            .collect()
    }
}
