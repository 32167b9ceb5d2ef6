//! Store filters applied to destination candidates
//!
//! A filter answers one question: should this store be rejected as a target?
//! [`filter_target`] runs a chain and rejects on the first hit.

use crate::cluster::{StoreId, StoreInfo};
use std::collections::HashSet;
use tracing::trace;

/// Base of the isolation score: each label level outweighs all deeper ones
const REPLICA_BASE_SCORE: f64 = 100.0;

/// A predicate over candidate target stores
pub trait Filter: Send + Sync {
    /// Name used in trace output
    fn name(&self) -> &'static str;

    /// `true` when the store must not receive the operation
    fn filter_target(&self, store: &StoreInfo) -> bool;
}

/// Returns `true` if any filter in the chain rejects the store
pub fn filter_target(store: &StoreInfo, filters: &[&dyn Filter]) -> bool {
    for filter in filters {
        if filter.filter_target(store) {
            trace!(store_id = store.id, filter = filter.name(), "store filtered out");
            return true;
        }
    }
    false
}

/// Rejects stores that cannot take the intended operation in their current state
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStateFilter {
    pub transfer_leader: bool,
    pub move_region: bool,
}

impl Filter for StoreStateFilter {
    fn name(&self) -> &'static str {
        "store-state"
    }

    fn filter_target(&self, store: &StoreInfo) -> bool {
        if !store.is_up() || store.disconnected {
            return true;
        }
        if self.transfer_leader && store.blocked {
            return true;
        }
        if self.move_region && store.busy {
            return true;
        }
        false
    }
}

/// Rejects an explicit set of target stores
#[derive(Debug, Clone, Default)]
pub struct ExcludedFilter {
    targets: HashSet<StoreId>,
}

impl ExcludedFilter {
    pub fn new(targets: impl IntoIterator<Item = StoreId>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
        }
    }
}

impl Filter for ExcludedFilter {
    fn name(&self) -> &'static str {
        "exclude"
    }

    fn filter_target(&self, store: &StoreInfo) -> bool {
        self.targets.contains(&store.id)
    }
}

/// Rejects targets that would leave the region less spread across failure
/// domains than it is with the peer on the source store
#[derive(Debug, Clone)]
pub struct DistinctScoreFilter {
    labels: Vec<String>,
    stores: Vec<StoreInfo>,
    safe_score: f64,
}

impl DistinctScoreFilter {
    /// `region_stores` are the stores currently holding the region; the
    /// source is removed from them before scoring.
    pub fn new(labels: &[String], region_stores: &[StoreInfo], source: &StoreInfo) -> Self {
        let stores: Vec<StoreInfo> = region_stores
            .iter()
            .filter(|s| s.id != source.id)
            .cloned()
            .collect();
        let safe_score = distinct_score(labels, &stores, source);
        Self {
            labels: labels.to_vec(),
            stores,
            safe_score,
        }
    }
}

impl Filter for DistinctScoreFilter {
    fn name(&self) -> &'static str {
        "distinct-score"
    }

    fn filter_target(&self, store: &StoreInfo) -> bool {
        distinct_score(&self.labels, &self.stores, store) < self.safe_score
    }
}

/// Isolation score of `candidate` against `stores`: higher means it shares
/// fewer failure domains with them
pub fn distinct_score(labels: &[String], stores: &[StoreInfo], candidate: &StoreInfo) -> f64 {
    let mut score = 0.0;
    for store in stores {
        if store.id == candidate.id {
            continue;
        }
        if let Some(index) = first_distinct_label(labels, store, candidate) {
            score += REPLICA_BASE_SCORE.powi((labels.len() - index - 1) as i32);
        }
    }
    score
}

/// Index of the first label level at which two stores differ. Missing
/// labels count as different.
fn first_distinct_label(labels: &[String], a: &StoreInfo, b: &StoreInfo) -> Option<usize> {
    labels.iter().position(|key| {
        let (va, vb) = (a.label_value(key), b.label_value(key));
        va.is_empty() || vb.is_empty() || !va.eq_ignore_ascii_case(vb)
    })
}
