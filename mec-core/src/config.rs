use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use mec_sched::{SchemeKind, SelectionScheme, SeparatedType};
use mec_types::{Capacity, NodeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_CANDIDATES: usize = 100_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("config lists no edge nodes")]
    NoNodes,
    #[error("{0} listed more than once")]
    DuplicateNode(NodeId),
    #[error("max_candidates must be positive")]
    ZeroCandidateLimit,
}

/// Scheduler configuration, usually loaded from YAML:
///
/// ```yaml
/// scheme: local-ratio
/// max_candidates: 50000
/// log_filter: "mec_sched=debug,info"
/// nodes:
///   - { id: 1, rb: 100, cu: 64 }
///   - { id: 2, rb: 50, cu: 32 }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub scheme: SchemeKind,
    #[serde(default)]
    pub forwarding_separate_type: SeparatedType,
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    #[serde(default)]
    pub log_filter: Option<String>,
    pub nodes: Vec<NodeConfig>,
}

/// Epoch-start capacity of one edge node.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: NodeId,
    pub rb: u32,
    pub cu: u32,
}

fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}

impl SchedulerConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: SchedulerConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::ZeroCandidateLimit);
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(ConfigError::DuplicateNode(node.id));
            }
        }
        Ok(())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    pub fn capacities(&self) -> Vec<Capacity> {
        self.nodes.iter().map(|n| Capacity::new(n.rb, n.cu)).collect()
    }

    pub fn build_scheme(&self) -> Arc<dyn SelectionScheme> {
        self.scheme.build(self.forwarding_separate_type)
    }
}
