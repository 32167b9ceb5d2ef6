//! Scheduler observability metrics
//!
//! Provides Prometheus-compatible metrics through the `metrics` facade:
//! - Schedule outcomes (move_peer/move_leader/skip/not_allowed)
//! - The current balance limit
//! - Per-store hot region counts and flow for each published view
//! - Peer allocation failures by error type
//!
//! [`EventCounters`] mirrors the outcome counter per scheduler instance so
//! callers can read it back without a recorder installed.

use crate::cluster::StoreId;
use crate::error::SchedulerError;
use crate::stats::StoreHotRegionsStat;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of a scheduling step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleEvent {
    /// `schedule` was invoked
    Schedule,
    /// A peer move was returned
    MovePeer,
    /// A leader transfer was returned
    MoveLeader,
    /// No candidate found this cycle
    Skip,
    /// A planner was not run because a budget was exhausted
    NotAllowed,
    /// Peer id allocation failed
    AllocPeerFailed,
}

impl ScheduleEvent {
    pub const ALL: [ScheduleEvent; 6] = [
        ScheduleEvent::Schedule,
        ScheduleEvent::MovePeer,
        ScheduleEvent::MoveLeader,
        ScheduleEvent::Skip,
        ScheduleEvent::NotAllowed,
        ScheduleEvent::AllocPeerFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleEvent::Schedule => "schedule",
            ScheduleEvent::MovePeer => "move_peer",
            ScheduleEvent::MoveLeader => "move_leader",
            ScheduleEvent::Skip => "skip",
            ScheduleEvent::NotAllowed => "not_allowed",
            ScheduleEvent::AllocPeerFailed => "alloc_peer_failed",
        }
    }

    fn index(&self) -> usize {
        match self {
            ScheduleEvent::Schedule => 0,
            ScheduleEvent::MovePeer => 1,
            ScheduleEvent::MoveLeader => 2,
            ScheduleEvent::Skip => 3,
            ScheduleEvent::NotAllowed => 4,
            ScheduleEvent::AllocPeerFailed => 5,
        }
    }
}

/// Record a scheduling outcome
pub fn record_schedule_event(scheduler: &str, event: ScheduleEvent) {
    metrics::counter!(
        "hotregion_scheduler_events_total",
        "scheduler" => scheduler.to_string(),
        "event" => event.as_str(),
    )
    .increment(1);
}

/// Record the balance limit after an adjustment
pub fn record_balance_limit(scheduler: &str, limit: u64) {
    metrics::gauge!(
        "hotregion_balance_limit",
        "scheduler" => scheduler.to_string(),
    )
    .set(limit as f64);
}

/// Record a failed peer allocation, labelled by error type
pub fn record_alloc_failure(scheduler: &str, error: &SchedulerError) {
    metrics::counter!(
        "hotregion_alloc_peer_failures_total",
        "scheduler" => scheduler.to_string(),
        "error_type" => error.error_type(),
    )
    .increment(1);
}

/// Update per-store gauges for a freshly published view.
///
/// Stores present in `previous` but gone from `current` are reset to zero.
pub fn update_hot_region_stats(
    view: &'static str,
    previous: &StoreHotRegionsStat,
    current: &StoreHotRegionsStat,
) {
    for store_id in stale_stores(previous, current) {
        set_store_gauges(view, store_id, 0, 0);
    }
    for (store_id, stat) in current {
        set_store_gauges(view, *store_id, stat.regions_count, stat.total_flow_bytes);
    }
}

/// Stores that dropped out of a view between two publishes
pub fn stale_stores(previous: &StoreHotRegionsStat, current: &StoreHotRegionsStat) -> Vec<StoreId> {
    previous
        .keys()
        .filter(|store_id| !current.contains_key(store_id))
        .copied()
        .collect()
}

fn set_store_gauges(view: &'static str, store_id: StoreId, regions: usize, flow_bytes: u64) {
    metrics::gauge!(
        "hotregion_store_hot_regions",
        "store" => store_id.to_string(),
        "view" => view,
    )
    .set(regions as f64);

    metrics::gauge!(
        "hotregion_store_flow_bytes",
        "store" => store_id.to_string(),
        "view" => view,
    )
    .set(flow_bytes as f64);
}

/// Per-instance outcome counters, forwarded to the metrics facade
#[derive(Debug)]
pub struct EventCounters {
    scheduler: &'static str,
    counts: [AtomicU64; 6],
}

impl EventCounters {
    pub fn new(scheduler: &'static str) -> Self {
        Self {
            scheduler,
            counts: Default::default(),
        }
    }

    pub fn record(&self, event: ScheduleEvent) {
        self.counts[event.index()].fetch_add(1, Ordering::Relaxed);
        record_schedule_event(self.scheduler, event);
    }

    /// Count an allocation failure and label it by error type
    pub fn record_alloc_failure(&self, error: &SchedulerError) {
        self.record(ScheduleEvent::AllocPeerFailed);
        record_alloc_failure(self.scheduler, error);
    }

    pub fn get(&self, event: ScheduleEvent) -> u64 {
        self.counts[event.index()].load(Ordering::Relaxed)
    }

    /// Event name -> count
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        ScheduleEvent::ALL
            .iter()
            .map(|event| (event.as_str(), self.get(*event)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::HotRegionsStat;

    #[test]
    fn test_event_counters() {
        let counters = EventCounters::new("test-scheduler");
        counters.record(ScheduleEvent::Schedule);
        counters.record(ScheduleEvent::Skip);
        counters.record(ScheduleEvent::Skip);

        assert_eq!(counters.get(ScheduleEvent::Schedule), 1);
        assert_eq!(counters.get(ScheduleEvent::Skip), 2);
        assert_eq!(counters.get(ScheduleEvent::MovePeer), 0);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.len(), ScheduleEvent::ALL.len());
        assert_eq!(snapshot["skip"], 2);
    }

    #[test]
    fn test_alloc_failure_counts_event() {
        let counters = EventCounters::new("test-scheduler");
        counters.record_alloc_failure(&SchedulerError::AllocPeer("no ids left".into()));
        assert_eq!(counters.get(ScheduleEvent::AllocPeerFailed), 1);
        assert_eq!(counters.snapshot()["alloc_peer_failed"], 1);
    }

    #[test]
    fn test_stale_stores_are_those_dropped_from_view() {
        let mut previous = StoreHotRegionsStat::new();
        previous.insert(1, HotRegionsStat::default());
        previous.insert(2, HotRegionsStat::default());
        let mut current = StoreHotRegionsStat::new();
        current.insert(2, HotRegionsStat::default());
        current.insert(3, HotRegionsStat::default());

        assert_eq!(stale_stores(&previous, &current), vec![1]);
        assert_eq!(stale_stores(&previous, &StoreHotRegionsStat::new()), vec![1, 2]);
        assert!(stale_stores(&StoreHotRegionsStat::new(), &current).is_empty());
    }

    #[test]
    fn test_update_hot_region_stats() {
        let mut stats = StoreHotRegionsStat::new();
        stats.insert(1, HotRegionsStat::default());

        // Should not panic without a recorder
        update_hot_region_stats("write_as_peer", &StoreHotRegionsStat::new(), &stats);
        update_hot_region_stats("write_as_peer", &stats, &StoreHotRegionsStat::new());
        record_balance_limit("test-scheduler", 3);
    }
}
