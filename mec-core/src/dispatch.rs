use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use mec_types::{AppId, NodeId, Solution};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::EpochReport;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("io error: {0}")]
    Io(String),
    #[error("encode error: {0}")]
    Encode(String),
}

/// Downstream consumer of each epoch's admitted placements.
#[async_trait]
pub trait GrantDispatcher: Send + Sync {
    async fn dispatch(&self, report: &EpochReport, solution: &Solution) -> Result<(), DispatchError>;
}

/// Drops every grant.
pub struct NullGrantDispatcher;

#[async_trait]
impl GrantDispatcher for NullGrantDispatcher {
    async fn dispatch(&self, _report: &EpochReport, _solution: &Solution) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// One admitted placement as written to the grant log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub epoch_id: Uuid,
    pub sequence: u64,
    pub app_id: AppId,
    pub offload_node: NodeId,
    pub process_node: NodeId,
    pub rb: u32,
    pub cu: u32,
    pub max_offload_time: f64,
    pub utility: f64,
}

/// Append-only JSON-lines log of granted placements.
pub struct JsonlGrantLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlGrantLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DispatchError::Io(e.to_string()))?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl GrantDispatcher for JsonlGrantLog {
    async fn dispatch(&self, report: &EpochReport, solution: &Solution) -> Result<(), DispatchError> {
        let _guard = self.lock.lock().map_err(|_| DispatchError::Io("lock".into()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| DispatchError::Io(e.to_string()))?;

        for entry in &solution.entries {
            let Some(grant) = solution.grant(entry.app_id) else { continue };
            let record = GrantRecord {
                epoch_id: report.epoch_id,
                sequence: report.sequence,
                app_id: entry.app_id,
                offload_node: entry.offload_node,
                process_node: entry.process_node,
                rb: entry.allocated_rb,
                cu: entry.allocated_cu,
                max_offload_time: grant.max_offload_time,
                utility: grant.utility,
            };
            let line = serde_json::to_string(&record).map_err(|e| DispatchError::Encode(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| DispatchError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

/// Read a grant log back, oldest record first.
pub fn read_grant_log(path: impl AsRef<Path>) -> Result<Vec<GrantRecord>, DispatchError> {
    let file = File::open(path.as_ref()).map_err(|e| DispatchError::Io(e.to_string()))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| DispatchError::Io(e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| DispatchError::Encode(e.to_string()))?;
        records.push(record);
    }
    Ok(records)
}
