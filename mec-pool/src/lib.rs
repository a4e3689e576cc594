//! Per-node remaining radio and compute capacity for one scheduling epoch.
//!
//! The pool is reset by its owner at the start of every epoch and is only
//! ever decremented by the selection scheme running in that epoch.

use mec_types::Capacity;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error(
        "node {node}: requested (rb={requested_rb}, cu={requested_cu}) exceeds remaining (rb={remaining_rb}, cu={remaining_cu})"
    )]
    InsufficientCapacity {
        node: usize,
        requested_rb: u32,
        requested_cu: u32,
        remaining_rb: u32,
        remaining_cu: u32,
    },
    #[error("node index {node} out of range ({nodes} nodes)")]
    UnknownNode { node: usize, nodes: usize },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResourcePool {
    capacity: Vec<Capacity>,
    remaining: Vec<Capacity>,
}

impl ResourcePool {
    pub fn new(capacities: Vec<Capacity>) -> Self {
        Self {
            remaining: capacities.clone(),
            capacity: capacities,
        }
    }

    /// Restore every node to the given epoch-start capacities.
    pub fn reset(&mut self, capacities: &[Capacity]) {
        self.capacity.clear();
        self.capacity.extend_from_slice(capacities);
        self.remaining.clear();
        self.remaining.extend_from_slice(capacities);
    }

    pub fn len(&self) -> usize {
        self.capacity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capacity.is_empty()
    }

    /// Epoch-start capacity of `node`.
    pub fn capacity(&self, node: usize) -> Result<Capacity, PoolError> {
        self.capacity.get(node).copied().ok_or(PoolError::UnknownNode {
            node,
            nodes: self.capacity.len(),
        })
    }

    pub fn remaining(&self, node: usize) -> Result<Capacity, PoolError> {
        self.remaining.get(node).copied().ok_or(PoolError::UnknownNode {
            node,
            nodes: self.remaining.len(),
        })
    }

    /// Capacity handed out on `node` since the last reset.
    pub fn used(&self, node: usize) -> Result<Capacity, PoolError> {
        let cap = self.capacity(node)?;
        let rem = self.remaining(node)?;
        Ok(Capacity::new(
            cap.rb.saturating_sub(rem.rb),
            cap.cu.saturating_sub(rem.cu),
        ))
    }

    pub fn capacities(&self) -> &[Capacity] {
        &self.capacity
    }

    /// Whether `demand` fits into what `node` has left. Unknown nodes never fit.
    pub fn fits(&self, node: usize, demand: Capacity) -> bool {
        self.remaining
            .get(node)
            .map(|rem| rem.covers(demand))
            .unwrap_or(false)
    }

    /// Take `demand` from `node`. Nothing is deducted unless both dimensions fit.
    pub fn deduct(&mut self, node: usize, demand: Capacity) -> Result<(), PoolError> {
        let nodes = self.remaining.len();
        let rem = self
            .remaining
            .get_mut(node)
            .ok_or(PoolError::UnknownNode { node, nodes })?;
        if !rem.covers(demand) {
            return Err(PoolError::InsufficientCapacity {
                node,
                requested_rb: demand.rb,
                requested_cu: demand.cu,
                remaining_rb: rem.rb,
                remaining_cu: rem.cu,
            });
        }
        rem.rb -= demand.rb;
        rem.cu -= demand.cu;
        Ok(())
    }
}
