//! In-memory node state: latest sample and bounded history per node
//!
//! # Concurrency
//!
//! The store is shared (`Arc<NodeStateStore>`) between the ingestion path,
//! which writes, and any number of query consumers, which read.
//!
//! - The node map sits behind an `RwLock` that is only write-locked to
//!   insert a node seen for the first time (double-checked, so two
//!   ingestion threads racing on the same new node create one entry).
//! - Each node has its own `RwLock<NodeState>`, so updates to different
//!   nodes never contend with each other, and readers of one node only
//!   wait for writers of that same node.
//! - `latest` is an `Arc<Sample>` swapped under the node's write lock:
//!   a reader always sees one whole sample, never fields from two updates.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use crate::types::{Sample, Sensor};

/// Default number of samples retained per node
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024;

/// State held for one node
#[derive(Debug, Clone)]
pub struct NodeState {
    node_id: String,
    latest: Arc<Sample>,
    history: VecDeque<Arc<Sample>>,
}

impl NodeState {
    fn new(first: Arc<Sample>, capacity: usize) -> Self {
        let mut history = VecDeque::with_capacity(capacity);
        history.push_back(first.clone());
        Self {
            node_id: first.node_id().to_string(),
            latest: first,
            history,
        }
    }

    /// Node identifier
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Most recent sample
    pub fn latest(&self) -> &Sample {
        &self.latest
    }

    /// Retained samples, oldest first
    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter().map(|s| s.as_ref())
    }

    /// Number of retained samples
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn push(&mut self, sample: Arc<Sample>, capacity: usize) {
        while self.history.len() >= capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample.clone());
        self.latest = sample;
    }
}

type NodeSlot = Arc<RwLock<NodeState>>;

/// Keyed store of [`NodeState`]
#[derive(Debug)]
pub struct NodeStateStore {
    capacity: usize,
    nodes: RwLock<HashMap<String, NodeSlot>>,
}

impl Default for NodeStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl NodeStateStore {
    /// Create a store retaining at most `capacity` samples per node.
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// History capacity per node
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a sample as its node's latest and append it to the history,
    /// evicting the oldest entry when full
    pub fn update(&self, sample: Sample) {
        let sample = Arc::new(sample);

        let existing = self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(sample.node_id())
            .cloned();

        let slot = match existing {
            Some(slot) => slot,
            None => {
                let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
                match nodes.get(sample.node_id()) {
                    Some(slot) => slot.clone(),
                    None => {
                        let state = NodeState::new(sample.clone(), self.capacity);
                        nodes.insert(
                            sample.node_id().to_string(),
                            Arc::new(RwLock::new(state)),
                        );
                        return;
                    }
                }
            }
        };

        slot.write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sample, self.capacity);
    }

    /// Latest sample for a node, `None` if never seen
    pub fn get_latest(&self, node_id: &str) -> Option<Sample> {
        let slot = self.slot(node_id)?;
        let state = slot.read().unwrap_or_else(|e| e.into_inner());
        Some(state.latest().clone())
    }

    /// Latest sample of every known node
    pub fn get_latest_all(&self) -> HashMap<String, Sample> {
        self.slots()
            .into_iter()
            .map(|(node_id, slot)| {
                let state = slot.read().unwrap_or_else(|e| e.into_inner());
                (node_id, state.latest().clone())
            })
            .collect()
    }

    /// Retained samples for a node, oldest first. Empty if never seen.
    pub fn get_history(&self, node_id: &str) -> Vec<Sample> {
        let Some(slot) = self.slot(node_id) else {
            return Vec::new();
        };
        let state = slot.read().unwrap_or_else(|e| e.into_inner());
        state.history().cloned().collect()
    }

    /// One sensor's retained values for a node, oldest first
    pub fn sensor_history(&self, node_id: &str, sensor: Sensor) -> Vec<f64> {
        let Some(slot) = self.slot(node_id) else {
            return Vec::new();
        };
        let state = slot.read().unwrap_or_else(|e| e.into_inner());
        state.history().map(|s| s.value(sensor)).collect()
    }

    /// Full state snapshot for a node
    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        let slot = self.slot(node_id)?;
        let state = slot.read().unwrap_or_else(|e| e.into_inner());
        Some(state.clone())
    }

    /// Known node ids, sorted
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Number of known nodes
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no node has reported yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, node_id: &str) -> Option<NodeSlot> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(node_id)
            .cloned()
    }

    // Clone the slot handles out so node locks are never taken while the
    // map lock is held.
    fn slots(&self) -> Vec<(String, NodeSlot)> {
        self.nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
