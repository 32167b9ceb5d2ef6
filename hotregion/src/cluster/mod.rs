//! Cluster metadata consumed by the scheduler
//!
//! The scheduler never owns topology. It reads regions, stores and load
//! samples through the [`Cluster`] trait and asks an [`OperatorCounter`] how
//! many operators of each kind are already in flight.
//!
//! [`MemoryCluster`] implements both traits over in-memory maps and backs
//! the tests and the CLI driver.

mod memory;

pub use memory::{ClusterFixture, ClusterOptions, MemoryCluster, SampleFixture};

use crate::error::Result;
use crate::operator::OpKind;
use crate::stats::LoadSample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type StoreId = u64;
pub type RegionId = u64;

/// One replica of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub id: u64,
    pub store_id: StoreId,
    /// Learners receive the log but cannot vote or lead
    #[serde(default)]
    pub is_learner: bool,
}

impl Peer {
    pub fn new(id: u64, store_id: StoreId) -> Self {
        Self {
            id,
            store_id,
            is_learner: false,
        }
    }
}

/// Region epoch, bumped on membership (`conf_ver`) and range (`version`) changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEpoch {
    pub conf_ver: u64,
    pub version: u64,
}

/// Metadata of a region as known to the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub id: RegionId,

    #[serde(default)]
    pub epoch: RegionEpoch,

    pub peers: Vec<Peer>,

    /// Current leader peer, if one has been elected
    #[serde(default)]
    pub leader: Option<Peer>,

    /// Peers that stopped responding
    #[serde(default)]
    pub down_peers: Vec<Peer>,

    /// Peers still catching up on the log
    #[serde(default)]
    pub pending_peers: Vec<Peer>,
}

impl RegionInfo {
    /// Create a region whose first peer is the leader
    pub fn new(id: RegionId, peers: Vec<Peer>) -> Self {
        let leader = peers.first().copied();
        Self {
            id,
            epoch: RegionEpoch {
                conf_ver: 1,
                version: 1,
            },
            peers,
            leader,
            down_peers: Vec::new(),
            pending_peers: Vec::new(),
        }
    }

    /// Store ids of every peer, in peer order
    pub fn store_ids(&self) -> Vec<StoreId> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    /// Store hosting the leader
    pub fn leader_store_id(&self) -> Option<StoreId> {
        self.leader.map(|p| p.store_id)
    }

    /// Peer of this region on the given store
    pub fn store_peer(&self, store_id: StoreId) -> Option<Peer> {
        self.peers.iter().find(|p| p.store_id == store_id).copied()
    }

    /// Voting peer of this region on the given store
    pub fn store_voter(&self, store_id: StoreId) -> Option<Peer> {
        self.store_peer(store_id).filter(|p| !p.is_learner)
    }

    /// Store ids of all non-leader peers
    pub fn follower_store_ids(&self) -> Vec<StoreId> {
        let leader = self.leader_store_id();
        self.peers
            .iter()
            .filter(|p| Some(p.store_id) != leader)
            .map(|p| p.store_id)
            .collect()
    }

    /// Unsafe to move while any peer is down or pending
    pub fn is_healthy(&self) -> bool {
        self.down_peers.is_empty() && self.pending_peers.is_empty()
    }
}

/// Lifecycle state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum StoreState {
    /// Serving and accepting new replicas
    #[default]
    Up,
    /// Being drained before removal
    Offline,
    /// Removed from the cluster
    Tombstone,
}

/// Metadata of a storage node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreInfo {
    pub id: StoreId,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub state: StoreState,

    /// Location labels, e.g. zone=z1, host=h1
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Heartbeats have stopped arriving
    #[serde(default)]
    pub disconnected: bool,

    /// Store reported itself too busy to take snapshots
    #[serde(default)]
    pub busy: bool,

    /// Administratively blocked from leader transfers
    #[serde(default)]
    pub blocked: bool,
}

impl StoreInfo {
    pub fn new(id: StoreId) -> Self {
        Self {
            id,
            address: format!("store-{}:20160", id),
            state: StoreState::Up,
            labels: BTreeMap::new(),
            disconnected: false,
            busy: false,
            blocked: false,
        }
    }

    /// Builder-style label assignment
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Label value, empty when absent
    pub fn label_value(&self, key: &str) -> &str {
        self.labels.get(key).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }
}

/// Read-only view of cluster metadata and load
pub trait Cluster: Send + Sync {
    /// Region by id, `None` once it has been removed or merged
    fn get_region(&self, region_id: RegionId) -> Option<RegionInfo>;

    fn get_store(&self, store_id: StoreId) -> Option<StoreInfo>;

    /// All known stores
    fn get_stores(&self) -> Vec<StoreInfo>;

    /// Stores hosting any peer of the region
    fn get_region_stores(&self, region: &RegionInfo) -> Vec<StoreInfo> {
        region
            .store_ids()
            .into_iter()
            .filter_map(|id| self.get_store(id))
            .collect()
    }

    /// Stores hosting a non-leader peer of the region
    fn get_follower_stores(&self, region: &RegionInfo) -> Vec<StoreInfo> {
        region
            .follower_store_ids()
            .into_iter()
            .filter_map(|id| self.get_store(id))
            .collect()
    }

    /// Current hot read samples
    fn region_read_stats(&self) -> Vec<LoadSample>;

    /// Current hot write samples
    fn region_write_stats(&self) -> Vec<LoadSample>;

    /// Samples below this hot degree are ignored
    fn hot_region_low_threshold(&self) -> i32;

    /// Cap on in-flight leader operators
    fn leader_schedule_limit(&self) -> u64;

    /// Cap on in-flight region operators
    fn region_schedule_limit(&self) -> u64;

    /// Label keys that define failure domains, outermost first
    fn location_labels(&self) -> Vec<String>;

    /// Allocate the identity of a new peer on the store
    fn alloc_peer(&self, store_id: StoreId) -> Result<Peer>;
}

/// Counts operators currently in flight, by kind
pub trait OperatorCounter: Send + Sync {
    fn operator_count(&self, kind: OpKind) -> u64;
}
