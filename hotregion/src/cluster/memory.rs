//! In-memory cluster view
//!
//! Holds stores, regions, load samples and in-flight operator counts behind
//! `RwLock`s so a driver can mutate topology while a scheduler reads it.

use super::{Cluster, OperatorCounter, Peer, RegionId, RegionInfo, StoreId, StoreInfo};
use crate::error::{Result, SchedulerError};
use crate::operator::{OpKind, Operator, OperatorStep};
use crate::stats::LoadSample;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Scheduling thresholds normally owned by the cluster's configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterOptions {
    #[serde(default = "default_hot_region_low_threshold")]
    pub hot_region_low_threshold: i32,

    #[serde(default = "default_schedule_limit")]
    pub leader_schedule_limit: u64,

    #[serde(default = "default_schedule_limit")]
    pub region_schedule_limit: u64,

    #[serde(default)]
    pub location_labels: Vec<String>,
}

fn default_hot_region_low_threshold() -> i32 {
    3
}

fn default_schedule_limit() -> u64 {
    4
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            hot_region_low_threshold: default_hot_region_low_threshold(),
            leader_schedule_limit: default_schedule_limit(),
            region_schedule_limit: default_schedule_limit(),
            location_labels: Vec::new(),
        }
    }
}

/// A hot-region sample as written in a fixture file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFixture {
    pub region_id: RegionId,
    pub hot_degree: i32,
    pub flow_bytes: u64,
    /// Earlier flow observations, oldest first
    #[serde(default)]
    pub history: Vec<u64>,
    #[serde(default)]
    pub anti_count: i32,
    #[serde(default)]
    pub version: u64,
}

impl From<SampleFixture> for LoadSample {
    fn from(fixture: SampleFixture) -> Self {
        let mut sample = LoadSample::new(fixture.region_id, fixture.hot_degree, fixture.flow_bytes)
            .with_history(&fixture.history);
        sample.anti_count = fixture.anti_count;
        sample.version = fixture.version;
        sample
    }
}

/// Serializable description of a whole cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterFixture {
    #[serde(default)]
    pub options: ClusterOptions,
    #[serde(default)]
    pub stores: Vec<StoreInfo>,
    #[serde(default)]
    pub regions: Vec<RegionInfo>,
    #[serde(default)]
    pub read_samples: Vec<SampleFixture>,
    #[serde(default)]
    pub write_samples: Vec<SampleFixture>,
}

impl ClusterFixture {
    /// Load a fixture from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Cluster metadata and operator accounting held in memory
#[derive(Debug)]
pub struct MemoryCluster {
    stores: RwLock<BTreeMap<StoreId, StoreInfo>>,
    regions: RwLock<BTreeMap<RegionId, RegionInfo>>,
    read_samples: RwLock<Vec<LoadSample>>,
    write_samples: RwLock<Vec<LoadSample>>,
    options: RwLock<ClusterOptions>,
    operators: RwLock<HashMap<OpKind, u64>>,
    next_peer_id: AtomicU64,
    fail_alloc: AtomicBool,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::with_options(ClusterOptions::default())
    }

    pub fn with_options(options: ClusterOptions) -> Self {
        Self {
            stores: RwLock::new(BTreeMap::new()),
            regions: RwLock::new(BTreeMap::new()),
            read_samples: RwLock::new(Vec::new()),
            write_samples: RwLock::new(Vec::new()),
            options: RwLock::new(options),
            operators: RwLock::new(HashMap::new()),
            next_peer_id: AtomicU64::new(1),
            fail_alloc: AtomicBool::new(false),
        }
    }

    /// Build a cluster from a fixture
    pub fn from_fixture(fixture: ClusterFixture) -> Self {
        let cluster = Self::with_options(fixture.options);
        for store in fixture.stores {
            cluster.put_store(store);
        }
        for region in fixture.regions {
            cluster.put_region(region);
        }
        cluster.set_read_samples(fixture.read_samples.into_iter().map(Into::into).collect());
        cluster.set_write_samples(fixture.write_samples.into_iter().map(Into::into).collect());
        cluster
    }

    // ========================================
    // Topology
    // ========================================

    pub fn put_store(&self, store: StoreInfo) {
        self.stores.write().insert(store.id, store);
    }

    /// Add or replace a region, keeping peer ids unique
    pub fn put_region(&self, region: RegionInfo) {
        if let Some(max_id) = region.peers.iter().map(|p| p.id).max() {
            self.next_peer_id.fetch_max(max_id + 1, Ordering::SeqCst);
        }
        self.regions.write().insert(region.id, region);
    }

    pub fn region_count(&self) -> usize {
        self.regions.read().len()
    }

    // ========================================
    // Load and options
    // ========================================

    pub fn set_read_samples(&self, samples: Vec<LoadSample>) {
        *self.read_samples.write() = samples;
    }

    pub fn set_write_samples(&self, samples: Vec<LoadSample>) {
        *self.write_samples.write() = samples;
    }

    pub fn set_hot_region_low_threshold(&self, threshold: i32) {
        self.options.write().hot_region_low_threshold = threshold;
    }

    pub fn set_schedule_limits(&self, leader: u64, region: u64) {
        let mut options = self.options.write();
        options.leader_schedule_limit = leader;
        options.region_schedule_limit = region;
    }

    pub fn set_location_labels(&self, labels: &[&str]) {
        self.options.write().location_labels = labels.iter().map(|s| s.to_string()).collect();
    }

    /// Make subsequent [`Cluster::alloc_peer`] calls fail
    pub fn set_alloc_failure(&self, fail: bool) {
        self.fail_alloc.store(fail, Ordering::SeqCst);
    }

    // ========================================
    // Operator accounting
    // ========================================

    /// Count an operator against its budgets until it is finished
    pub fn add_operator(&self, op: &Operator) {
        let mut counts = self.operators.write();
        for kind in &op.kinds {
            *counts.entry(*kind).or_insert(0) += 1;
        }
    }

    /// Release an operator's budgets
    pub fn finish_operator(&self, op: &Operator) {
        let mut counts = self.operators.write();
        for kind in &op.kinds {
            if let Some(count) = counts.get_mut(kind) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Apply an operator's step to the region metadata, as if it completed
    pub fn apply_operator(&self, op: &Operator) -> Result<()> {
        let mut regions = self.regions.write();
        let region = regions
            .get_mut(&op.region_id)
            .ok_or(SchedulerError::RegionNotFound(op.region_id))?;

        match op.step {
            OperatorStep::MovePeer {
                source_peer,
                dest_peer,
            } => {
                region.peers.retain(|p| p.id != source_peer.id);
                region.peers.push(dest_peer);
                if region.leader.map(|l| l.id) == Some(source_peer.id) {
                    region.leader = Some(dest_peer);
                }
                region.epoch.conf_ver += 1;
            }
            OperatorStep::TransferLeader { to_store, .. } => {
                let peer = region
                    .store_voter(to_store)
                    .ok_or(SchedulerError::StoreNotFound(to_store))?;
                region.leader = Some(peer);
            }
        }
        Ok(())
    }
}

impl Cluster for MemoryCluster {
    fn get_region(&self, region_id: RegionId) -> Option<RegionInfo> {
        self.regions.read().get(&region_id).cloned()
    }

    fn get_store(&self, store_id: StoreId) -> Option<StoreInfo> {
        self.stores.read().get(&store_id).cloned()
    }

    fn get_stores(&self) -> Vec<StoreInfo> {
        self.stores.read().values().cloned().collect()
    }

    fn region_read_stats(&self) -> Vec<LoadSample> {
        self.read_samples.read().clone()
    }

    fn region_write_stats(&self) -> Vec<LoadSample> {
        self.write_samples.read().clone()
    }

    fn hot_region_low_threshold(&self) -> i32 {
        self.options.read().hot_region_low_threshold
    }

    fn leader_schedule_limit(&self) -> u64 {
        self.options.read().leader_schedule_limit
    }

    fn region_schedule_limit(&self) -> u64 {
        self.options.read().region_schedule_limit
    }

    fn location_labels(&self) -> Vec<String> {
        self.options.read().location_labels.clone()
    }

    fn alloc_peer(&self, store_id: StoreId) -> Result<Peer> {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return Err(SchedulerError::AllocPeer(format!(
                "id allocator unavailable for store {}",
                store_id
            )));
        }
        if !self.stores.read().contains_key(&store_id) {
            return Err(SchedulerError::StoreNotFound(store_id));
        }
        let id = self.next_peer_id.fetch_add(1, Ordering::SeqCst);
        Ok(Peer::new(id, store_id))
    }
}

impl OperatorCounter for MemoryCluster {
    fn operator_count(&self, kind: OpKind) -> u64 {
        self.operators.read().get(&kind).copied().unwrap_or(0)
    }
}
