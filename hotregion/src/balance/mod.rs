//! Balance planners
//!
//! A [`Planner`] borrows the collaborators of one scheduling cycle and turns
//! a published [`StoreHotRegionsStat`] into at most one move:
//! - [`Planner::balance_by_peer`] relocates a replica of a hot region
//! - [`Planner::balance_by_leader`] hands a hot region's leadership to a follower
//!
//! Both planners update the balance limit in [`BalanceState`] once they
//! commit to a destination.

mod leader;
mod limit;
mod peer;

pub use limit::adjust_balance_limit;

use crate::cluster::{Cluster, OperatorCounter, Peer, RegionInfo, StoreId};
use crate::config::SchedulerConfig;
use crate::metrics::EventCounters;
use crate::operator::OpKind;
use crate::selector::SelectionReason;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// Mutable state carried across cycles
#[derive(Debug)]
pub struct BalanceState {
    /// Cap on in-flight hot-region operators, recomputed after each pick
    pub limit: u64,
    rng: StdRng,
}

impl BalanceState {
    /// Start with a limit of 1; `seed` makes the random choices reproducible
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { limit: 1, rng }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Visiting order over `len` hot regions
    fn shuffled_indices(&mut self, len: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.rng);
        order
    }
}

/// A replica relocation chosen by [`Planner::balance_by_peer`]
#[derive(Debug, Clone)]
pub struct PeerMove {
    pub region: RegionInfo,
    pub source_peer: Peer,
    pub dest_peer: Peer,
    /// Destination selection trace
    pub reasons: Vec<SelectionReason>,
}

/// A leadership transfer chosen by [`Planner::balance_by_leader`]
#[derive(Debug, Clone)]
pub struct LeaderMove {
    pub region: RegionInfo,
    pub from_store: StoreId,
    /// Voter on the destination store that becomes leader
    pub dest_peer: Peer,
    /// Destination selection trace
    pub reasons: Vec<SelectionReason>,
}

/// Collaborators borrowed for one scheduling cycle
pub struct Planner<'a> {
    pub cluster: &'a dyn Cluster,
    pub operators: &'a dyn OperatorCounter,
    pub config: &'a SchedulerConfig,
    pub events: &'a EventCounters,
}

impl<'a> Planner<'a> {
    pub fn new(
        cluster: &'a dyn Cluster,
        operators: &'a dyn OperatorCounter,
        config: &'a SchedulerConfig,
        events: &'a EventCounters,
    ) -> Self {
        Self {
            cluster,
            operators,
            config,
            events,
        }
    }

    /// Room for another leader transfer under both budgets
    pub fn allow_balance_leader(&self, limit: u64) -> bool {
        self.exhausted_budget(OpKind::Leader, limit).is_none()
    }

    /// Room for another peer move under both budgets
    pub fn allow_balance_region(&self, limit: u64) -> bool {
        self.exhausted_budget(OpKind::Region, limit).is_none()
    }

    /// First budget with no room left for an operator of `kind`
    pub fn exhausted_budget(&self, kind: OpKind, limit: u64) -> Option<OpKind> {
        if self.operators.operator_count(OpKind::HotRegion) >= limit {
            return Some(OpKind::HotRegion);
        }
        let cap = match kind {
            OpKind::Leader => self.cluster.leader_schedule_limit(),
            OpKind::Region => self.cluster.region_schedule_limit(),
            OpKind::HotRegion => return None,
        };
        (self.operators.operator_count(kind) >= cap).then_some(kind)
    }

    /// Log and report a refusal by the operator budgets
    fn refused(&self, kind: OpKind, limit: u64) -> bool {
        match self.exhausted_budget(kind, limit) {
            Some(budget) => {
                debug!(
                    "Skipping {} balance: {} budget exhausted (limit {})",
                    kind.as_str(),
                    budget.as_str(),
                    limit
                );
                true
            }
            None => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;

    #[test]
    fn test_balance_state_seeded_order_is_reproducible() {
        let mut a = BalanceState::new(Some(7));
        let mut b = BalanceState::new(Some(7));
        assert_eq!(a.limit, 1);
        assert_eq!(a.shuffled_indices(20), b.shuffled_indices(20));

        let mut order = a.shuffled_indices(5);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_budgets() {
        let cluster = test_util::cluster_with(3, &[(&[1, 2], 100)]);
        cluster.set_schedule_limits(1, 2);
        let config = SchedulerConfig::default();
        let events = EventCounters::new("test");
        let planner = Planner::new(&cluster, &cluster, &config, &events);

        assert!(planner.allow_balance_leader(1));
        assert!(planner.allow_balance_region(1));

        let region = cluster.get_region(1).unwrap();
        let op = Operator::transfer_leader("transfer-hot-write-leader", &region, 1, 2);
        cluster.add_operator(&op);

        // HotRegion count 1 reaches limit 1
        assert!(!planner.allow_balance_region(1));
        assert!(planner.allow_balance_region(2));
        // Leader count 1 reaches leader_schedule_limit 1
        assert!(!planner.allow_balance_leader(5));

        assert_eq!(planner.exhausted_budget(OpKind::Region, 1), Some(OpKind::HotRegion));
        assert_eq!(planner.exhausted_budget(OpKind::Leader, 5), Some(OpKind::Leader));
        assert_eq!(planner.exhausted_budget(OpKind::Region, 5), None);
    }
}
