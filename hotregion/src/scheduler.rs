//! Hot-region balance scheduler
//!
//! Each call to [`HotRegionScheduler::schedule`] is one cycle:
//! 1. Pick a balance type at random from the configured set
//! 2. Re-aggregate the load samples for that direction and publish the views
//! 3. Run the planners against the fresh views and build at most one operator
//!
//! The whole cycle runs under the scheduler's write lock. Status readers take
//! the read lock only long enough to clone the published `Arc`s.

use crate::balance::{BalanceState, LeaderMove, PeerMove, Planner};
use crate::cluster::{Cluster, OperatorCounter};
use crate::config::{BalanceType, SchedulerConfig};
use crate::error::{Result, SchedulerError};
use crate::metrics::{self, EventCounters, ScheduleEvent};
use crate::operator::{OpKind, Operator};
use crate::selector::SelectionReason;
use crate::stats::{aggregate, HotRegionStatus, ResourceKind, StoreStatistics};
use crate::telemetry::{features_for, DecisionEvent, DecisionSink, NoopSink};
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name reported by every hot-region scheduler instance
pub const SCHEDULER_NAME: &str = "balance-hot-region-scheduler";

/// Type string the scheduler registers under
pub const SCHEDULER_TYPE: &str = "hot-region";

const MOVE_HOT_READ_REGION: &str = "move-hot-read-region";
const TRANSFER_HOT_READ_LEADER: &str = "transfer-hot-read-leader";
const MOVE_HOT_WRITE_REGION: &str = "move-hot-write-region";
const TRANSFER_HOT_WRITE_LEADER: &str = "transfer-hot-write-leader";

/// Budget outcome of one planner kind within a cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Budget {
    #[default]
    Untried,
    Refused,
    Granted,
}

/// Which planners a cycle consulted and whether their budgets let them run
#[derive(Debug, Default)]
struct CycleBudgets {
    leader: Budget,
    peer: Budget,
}

impl CycleBudgets {
    /// Every planner consulted was refused by its budget
    fn all_refused(&self) -> bool {
        let budgets = [self.leader, self.peer];
        budgets.contains(&Budget::Refused) && !budgets.contains(&Budget::Granted)
    }
}

struct SchedulerState {
    stats: StoreStatistics,
    balance: BalanceState,
}

/// Balances hot regions across stores by moving replicas and leaders
pub struct HotRegionScheduler {
    config: SchedulerConfig,
    operators: Arc<dyn OperatorCounter>,
    sink: Arc<dyn DecisionSink>,
    state: RwLock<SchedulerState>,
    events: EventCounters,
}

impl HotRegionScheduler {
    /// Create a scheduler for the balance types in `config`
    pub fn new(config: SchedulerConfig, operators: Arc<dyn OperatorCounter>) -> Result<Self> {
        config.validate()?;
        let balance = BalanceState::new(config.seed);
        Ok(Self {
            config,
            operators,
            sink: Arc::new(NoopSink),
            state: RwLock::new(SchedulerState {
                stats: StoreStatistics::new(),
                balance,
            }),
            events: EventCounters::new(SCHEDULER_NAME),
        })
    }

    /// Scheduler that only balances read load
    pub fn for_read(config: SchedulerConfig, operators: Arc<dyn OperatorCounter>) -> Result<Self> {
        Self::new(config.only(BalanceType::Read), operators)
    }

    /// Scheduler that only balances write load
    pub fn for_write(config: SchedulerConfig, operators: Arc<dyn OperatorCounter>) -> Result<Self> {
        Self::new(config.only(BalanceType::Write), operators)
    }

    /// Send decision events to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &'static str {
        SCHEDULER_NAME
    }

    pub fn scheduler_type(&self) -> &'static str {
        SCHEDULER_TYPE
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Whether either planner has budget left
    pub fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let limit = self.state.read().balance.limit;
        let planner = self.planner(cluster);
        planner.allow_balance_leader(limit) || planner.allow_balance_region(limit)
    }

    /// Run one scheduling cycle
    pub fn schedule(&self, cluster: &dyn Cluster) -> Option<Operator> {
        self.events.record(ScheduleEvent::Schedule);

        let mut state = self.state.write();
        let balance_type = *self.config.balance_types.choose(state.balance.rng())?;
        let planner = self.planner(cluster);

        debug!("Balancing hot {} regions", balance_type.as_str());
        let op = match balance_type {
            BalanceType::Read => self.balance_hot_read_regions(&planner, &mut state),
            BalanceType::Write => self.balance_hot_write_regions(&planner, &mut state),
        };

        metrics::record_balance_limit(SCHEDULER_NAME, state.balance.limit);
        op
    }

    /// Latest read view: read flow by leader store
    pub fn hot_read_status(&self) -> HotRegionStatus {
        self.state.read().stats.read_status()
    }

    /// Latest write views: write flow by leader store and by replica store
    pub fn hot_write_status(&self) -> HotRegionStatus {
        self.state.read().stats.write_status()
    }

    /// Current cap on in-flight hot-region operators
    pub fn balance_limit(&self) -> u64 {
        self.state.read().balance.limit
    }

    /// Outcome counts since creation, by event name
    pub fn event_counts(&self) -> BTreeMap<&'static str, u64> {
        self.events.snapshot()
    }

    pub fn events(&self) -> &EventCounters {
        &self.events
    }

    fn planner<'a>(&'a self, cluster: &'a dyn Cluster) -> Planner<'a> {
        Planner::new(cluster, self.operators.as_ref(), &self.config, &self.events)
    }

    fn balance_hot_read_regions(
        &self,
        planner: &Planner<'_>,
        state: &mut SchedulerState,
    ) -> Option<Operator> {
        let cluster = planner.cluster;
        let read_as_leader = Arc::new(aggregate(
            &cluster.region_read_stats(),
            cluster,
            ResourceKind::Leader,
        ));
        metrics::update_hot_region_stats(
            "read_as_leader",
            &state.stats.read_as_leader,
            &read_as_leader,
        );
        state.stats.read_as_leader = Arc::clone(&read_as_leader);

        let mut budgets = CycleBudgets::default();
        let limit = state.balance.limit;
        if self.config.enable_read_leader_balance
            && self.admit(&mut budgets.leader, planner, OpKind::Leader, limit)
        {
            if let Some(mv) = planner.balance_by_leader(&mut state.balance, &read_as_leader) {
                return Some(self.leader_operator(TRANSFER_HOT_READ_LEADER, mv));
            }
        }

        let limit = state.balance.limit;
        if self.admit(&mut budgets.peer, planner, OpKind::Region, limit) {
            if let Some(mv) = planner.balance_by_peer(&mut state.balance, &read_as_leader) {
                return Some(self.peer_operator(MOVE_HOT_READ_REGION, mv));
            }
        }

        self.finish_without_operator(BalanceType::Read, &budgets);
        None
    }

    fn balance_hot_write_regions(
        &self,
        planner: &Planner<'_>,
        state: &mut SchedulerState,
    ) -> Option<Operator> {
        let cluster = planner.cluster;
        let samples = cluster.region_write_stats();
        let write_as_leader = Arc::new(aggregate(&samples, cluster, ResourceKind::Leader));
        let write_as_peer = Arc::new(aggregate(&samples, cluster, ResourceKind::Region));
        metrics::update_hot_region_stats(
            "write_as_leader",
            &state.stats.write_as_leader,
            &write_as_leader,
        );
        metrics::update_hot_region_stats(
            "write_as_peer",
            &state.stats.write_as_peer,
            &write_as_peer,
        );
        state.stats.write_as_leader = Arc::clone(&write_as_leader);
        state.stats.write_as_peer = Arc::clone(&write_as_peer);

        let mut budgets = CycleBudgets::default();
        for _ in 0..self.config.max_write_attempts {
            let limit = state.balance.limit;
            if state.balance.rng().gen_bool(0.5) {
                if !self.admit(&mut budgets.peer, planner, OpKind::Region, limit) {
                    continue;
                }
                if let Some(mv) = planner.balance_by_peer(&mut state.balance, &write_as_peer) {
                    return Some(self.peer_operator(MOVE_HOT_WRITE_REGION, mv));
                }
            } else {
                if !self.admit(&mut budgets.leader, planner, OpKind::Leader, limit) {
                    continue;
                }
                if let Some(mv) = planner.balance_by_leader(&mut state.balance, &write_as_leader) {
                    return Some(self.leader_operator(TRANSFER_HOT_WRITE_LEADER, mv));
                }
            }
        }

        self.finish_without_operator(BalanceType::Write, &budgets);
        None
    }

    /// Check a planner's budget on its first use in a cycle; a refusal is
    /// counted once and sticks for the rest of the cycle
    fn admit(&self, budget: &mut Budget, planner: &Planner<'_>, kind: OpKind, limit: u64) -> bool {
        if *budget == Budget::Untried {
            *budget = match planner.exhausted_budget(kind, limit) {
                Some(exhausted) => {
                    debug!(
                        "Not allowed to plan {} moves: {} budget exhausted (limit {})",
                        kind.as_str(),
                        exhausted.as_str(),
                        limit
                    );
                    self.events.record(ScheduleEvent::NotAllowed);
                    Budget::Refused
                }
                None => Budget::Granted,
            };
        }
        *budget != Budget::Refused
    }

    /// Count a cycle that produced nothing as a skip, unless every planner it
    /// consulted was refused, which is already counted as not allowed
    fn finish_without_operator(&self, balance_type: BalanceType, budgets: &CycleBudgets) {
        if budgets.all_refused() {
            debug!("Hot {} balancing not allowed this cycle", balance_type.as_str());
            return;
        }
        debug!("No hot {} region to balance", balance_type.as_str());
        self.events.record(ScheduleEvent::Skip);
    }

    fn peer_operator(&self, desc: &str, mv: PeerMove) -> Operator {
        let op = Operator::move_peer(desc, &mv.region, mv.source_peer, mv.dest_peer);
        self.events.record(ScheduleEvent::MovePeer);
        info!("Scheduling {}", op);
        self.emit_decision(&op, &mv.reasons);
        op
    }

    fn leader_operator(&self, desc: &str, mv: LeaderMove) -> Operator {
        let op = Operator::transfer_leader(desc, &mv.region, mv.from_store, mv.dest_peer.store_id);
        self.events.record(ScheduleEvent::MoveLeader);
        info!("Scheduling {}", op);
        self.emit_decision(&op, &mv.reasons);
        op
    }

    fn emit_decision(&self, op: &Operator, reasons: &[SelectionReason]) {
        let source_store = op.step.source_store();
        self.sink.emit(DecisionEvent {
            step: op.step.to_string(),
            features: features_for(reasons, source_store),
            source_store,
            dest_store: op.step.dest_store(),
        });
    }
}

/// Build a scheduler from its registered type string
pub fn create_scheduler(
    scheduler_type: &str,
    config: SchedulerConfig,
    operators: Arc<dyn OperatorCounter>,
) -> Result<HotRegionScheduler> {
    match scheduler_type {
        "hot-region" => HotRegionScheduler::new(config, operators),
        "hot-read-region" => HotRegionScheduler::for_read(config, operators),
        "hot-write-region" => HotRegionScheduler::for_write(config, operators),
        other => Err(SchedulerError::UnknownScheduler(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MemoryCluster, Peer, RegionInfo, StoreInfo};
    use crate::stats::LoadSample;

    fn operators() -> Arc<dyn OperatorCounter> {
        Arc::new(MemoryCluster::new())
    }

    #[test]
    fn test_create_scheduler_by_type() {
        let scheduler = create_scheduler("hot-region", SchedulerConfig::default(), operators()).unwrap();
        assert_eq!(scheduler.name(), "balance-hot-region-scheduler");
        assert_eq!(scheduler.scheduler_type(), "hot-region");
        assert_eq!(scheduler.config().balance_types.len(), 2);

        let read = create_scheduler("hot-read-region", SchedulerConfig::default(), operators()).unwrap();
        assert_eq!(read.config().balance_types, vec![BalanceType::Read]);

        let write = create_scheduler("hot-write-region", SchedulerConfig::default(), operators()).unwrap();
        assert_eq!(write.config().balance_types, vec![BalanceType::Write]);

        assert!(matches!(
            create_scheduler("balance-leader", SchedulerConfig::default(), operators()),
            Err(SchedulerError::UnknownScheduler(_))
        ));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = SchedulerConfig {
            max_write_attempts: 0,
            ..Default::default()
        };
        assert!(HotRegionScheduler::new(config, operators()).is_err());
    }

    #[test]
    fn test_empty_cluster_skips() {
        let cluster = MemoryCluster::new();
        let config = SchedulerConfig {
            seed: Some(1),
            ..Default::default()
        };
        let scheduler = HotRegionScheduler::new(config, operators()).unwrap();

        assert!(scheduler.is_schedule_allowed(&cluster));
        assert!(scheduler.schedule(&cluster).is_none());

        let counts = scheduler.event_counts();
        assert_eq!(counts["schedule"], 1);
        assert_eq!(counts["skip"], 1);
        assert_eq!(scheduler.balance_limit(), 1);
        assert!(scheduler.hot_read_status().as_leader.is_empty());
    }

    #[test]
    fn test_cycle_budgets_all_refused() {
        let mut budgets = CycleBudgets::default();
        assert!(!budgets.all_refused());

        budgets.peer = Budget::Refused;
        assert!(budgets.all_refused());

        budgets.leader = Budget::Granted;
        assert!(!budgets.all_refused());
    }

    #[test]
    fn test_refused_leader_with_idle_peer_counts_both() {
        // Every store already holds each region, so peer planning finds nothing
        let cluster = MemoryCluster::new();
        for id in 1..=3 {
            cluster.put_store(StoreInfo::new(id));
        }
        let mut samples = Vec::new();
        for region_id in 1..=3 {
            cluster.put_region(RegionInfo::new(
                region_id,
                vec![
                    Peer::new(region_id * 10, 1),
                    Peer::new(region_id * 10 + 1, 2),
                    Peer::new(region_id * 10 + 2, 3),
                ],
            ));
            samples.push(LoadSample::new(region_id, 5, 500));
        }
        cluster.set_read_samples(samples);
        cluster.set_schedule_limits(0, 4);

        let config = SchedulerConfig {
            seed: Some(2),
            enable_read_leader_balance: true,
            ..Default::default()
        };
        let scheduler = HotRegionScheduler::for_read(config, operators()).unwrap();

        assert!(scheduler.schedule(&cluster).is_none());
        let counts = scheduler.event_counts();
        assert_eq!(counts["not_allowed"], 1);
        assert_eq!(counts["skip"], 1);
    }
}
