//! Hot-region balance scheduler
//!
//! Detects stores carrying a disproportionate share of hot regions (regions
//! with sustained high read or write traffic) and proposes one operator per
//! cycle that moves load away from them.
//!
//! # Architecture
//!
//! - **Stats**: Aggregates per-region load samples into per-store views
//! - **Selector**: Picks the hottest source store and a qualifying destination
//! - **Filter**: Rejects destinations by store state, placement and isolation
//! - **Balance**: Peer-move and leader-move planners plus the balance limit
//! - **Scheduler**: Dispatches read/write cycles and publishes status snapshots
//! - **Telemetry**: Non-blocking side channel to an external decision scorer
//!
//! # Collaborators
//!
//! Cluster metadata, peer-id allocation and in-flight operator counts are
//! reached through the [`Cluster`] and [`OperatorCounter`] traits.
//! [`MemoryCluster`] implements both in memory.

pub mod balance;
pub mod cluster;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod operator;
pub mod scheduler;
pub mod selector;
pub mod stats;
pub mod telemetry;

pub use balance::{adjust_balance_limit, BalanceState, LeaderMove, PeerMove, Planner};
pub use cluster::{
    Cluster, ClusterFixture, ClusterOptions, MemoryCluster, OperatorCounter, Peer, RegionEpoch,
    RegionId, RegionInfo, SampleFixture, StoreId, StoreInfo, StoreState,
};
pub use config::{BalanceType, SchedulerConfig, TelemetryConfig};
pub use error::{Result, SchedulerError};
pub use filter::{DistinctScoreFilter, ExcludedFilter, Filter, StoreStateFilter};
pub use crate::metrics::{EventCounters, ScheduleEvent};
pub use operator::{OpKind, Operator, OperatorStep};
pub use scheduler::{create_scheduler, HotRegionScheduler, SCHEDULER_NAME, SCHEDULER_TYPE};
pub use selector::{select_dest_store, select_dest_store_traced, select_source_store, SelectionReason};
pub use stats::{
    aggregate, HotRegionStatus, HotRegionsStat, LoadSample, MedianFilter, RegionStat,
    ResourceKind, StoreHotRegionsStat, StoreStatistics,
};
pub use telemetry::{
    ChannelSink, DecisionEvent, DecisionSink, Feature, NoopSink, ScorerWorker, Verdict,
};
