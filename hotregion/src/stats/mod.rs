//! Hot-region load statistics
//!
//! Raw [`LoadSample`]s arrive once per cycle for every hot region. The
//! aggregator folds them into a [`StoreHotRegionsStat`] per direction and
//! role, which the scheduler publishes into [`StoreStatistics`].
//!
//! Published views are immutable `Arc`s: a new cycle replaces the `Arc`
//! instead of mutating it, so a [`HotRegionStatus`] handed to a status
//! reader never changes underneath it.

mod aggregate;

pub use aggregate::aggregate;

use crate::cluster::{RegionId, StoreId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Initial capacity of a store's region list
pub const STORE_HOT_REGIONS_DEFAULT_LEN: usize = 100;

/// Window size used by [`LoadSample::new`]
pub const DEFAULT_FLOW_WINDOW: usize = 5;

/// Rolling median over the most recent flow observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianFilter {
    size: usize,
    records: VecDeque<f64>,
}

impl MedianFilter {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            records: VecDeque::with_capacity(size),
        }
    }

    /// Push an observation, evicting the oldest once the window is full
    pub fn add(&mut self, value: f64) {
        if self.records.len() == self.size {
            self.records.pop_front();
        }
        self.records.push_back(value);
    }

    /// Median of the window, 0 when empty
    pub fn median(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.records.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load observed for one hot region in one direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSample {
    pub region_id: RegionId,

    /// Consecutive cycles this region has been hot
    pub hot_degree: i32,

    /// Latest raw flow in bytes
    pub flow_bytes: u64,

    /// Smoothed flow history
    pub stats: MedianFilter,

    /// Cycles the region has been below the threshold while still tracked
    #[serde(default)]
    pub anti_count: i32,

    /// Unix epoch milliseconds of the last report
    #[serde(default)]
    pub last_update_time: u64,

    #[serde(default)]
    pub version: u64,
}

impl LoadSample {
    /// A sample whose history holds only the current flow
    pub fn new(region_id: RegionId, hot_degree: i32, flow_bytes: u64) -> Self {
        let mut stats = MedianFilter::new(DEFAULT_FLOW_WINDOW);
        stats.add(flow_bytes as f64);
        Self {
            region_id,
            hot_degree,
            flow_bytes,
            stats,
            anti_count: 0,
            last_update_time: 0,
            version: 0,
        }
    }

    /// Replace the flow history, keeping `flow_bytes` as the latest value
    pub fn with_history(mut self, history: &[u64]) -> Self {
        let mut stats = MedianFilter::new(DEFAULT_FLOW_WINDOW.max(history.len() + 1));
        for value in history {
            stats.add(*value as f64);
        }
        stats.add(self.flow_bytes as f64);
        self.stats = stats;
        self
    }
}

/// Which stores a sample is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// The region's leader store only
    Leader,
    /// Every store holding a replica
    Region,
}

/// A hot region as seen from one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionStat {
    pub region_id: RegionId,
    pub store_id: StoreId,
    /// Median flow of the sample
    pub flow_bytes: u64,
    pub hot_degree: i32,
    pub last_update_time: u64,
    pub anti_count: i32,
    pub version: u64,
}

/// Hot regions hosted by one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotRegionsStat {
    pub total_flow_bytes: u64,
    pub regions_count: usize,
    pub regions_stat: Vec<RegionStat>,
}

impl Default for HotRegionsStat {
    fn default() -> Self {
        Self {
            total_flow_bytes: 0,
            regions_count: 0,
            regions_stat: Vec::with_capacity(STORE_HOT_REGIONS_DEFAULT_LEN),
        }
    }
}

impl HotRegionsStat {
    /// Record one region, accumulating `raw_flow_bytes` into the total
    pub fn push(&mut self, stat: RegionStat, raw_flow_bytes: u64) {
        self.total_flow_bytes = self.total_flow_bytes.saturating_add(raw_flow_bytes);
        self.regions_count += 1;
        self.regions_stat.push(stat);
    }

    pub fn len(&self) -> usize {
        self.regions_stat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions_stat.is_empty()
    }
}

/// Store id -> hot regions on that store
pub type StoreHotRegionsStat = BTreeMap<StoreId, HotRegionsStat>;

/// Latest published views, one per direction and role
#[derive(Debug, Clone, Default)]
pub struct StoreStatistics {
    pub read_as_leader: Arc<StoreHotRegionsStat>,
    pub write_as_leader: Arc<StoreHotRegionsStat>,
    pub write_as_peer: Arc<StoreHotRegionsStat>,
}

impl StoreStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_status(&self) -> HotRegionStatus {
        HotRegionStatus {
            as_leader: Arc::clone(&self.read_as_leader),
            as_peer: None,
        }
    }

    pub fn write_status(&self) -> HotRegionStatus {
        HotRegionStatus {
            as_leader: Arc::clone(&self.write_as_leader),
            as_peer: Some(Arc::clone(&self.write_as_peer)),
        }
    }
}

/// Snapshot of hot-region statistics for status reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotRegionStatus {
    pub as_leader: Arc<StoreHotRegionsStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_peer: Option<Arc<StoreHotRegionsStat>>,
}
