//! Source and destination store selection
//!
//! Both selectors read a [`StoreHotRegionsStat`] and never mutate it.
//!
//! The source is the store with the most hot regions, ties broken by total
//! flow. A destination must either host no hot region at all, or host at
//! least two fewer than the source (the fewest seen so far wins), or tie
//! with the current minimum while carrying less flow and staying below
//! `schedule_factor` of the source's flow after the move.

use crate::cluster::StoreId;
use crate::stats::StoreHotRegionsStat;

/// Default share of the source flow a destination may reach after a move
pub const HOT_REGION_SCHEDULE_FACTOR: f64 = 0.9;

/// Minimum hot regions a store needs to be worth shedding from
pub const MIN_SOURCE_HOT_REGIONS: usize = 2;

/// Why a candidate became the current destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// Store hosts no hot region
    EmptyStore(StoreId),
    /// Store hosts at least two fewer hot regions than the source
    FewerRegions(StoreId),
    /// Store ties on count but carries less flow
    LowerFlow(StoreId),
}

impl SelectionReason {
    pub fn store_id(&self) -> StoreId {
        match self {
            SelectionReason::EmptyStore(id)
            | SelectionReason::FewerRegions(id)
            | SelectionReason::LowerFlow(id) => *id,
        }
    }
}

/// Pick the store to move hot regions away from
pub fn select_source_store(stats: &StoreHotRegionsStat) -> Option<StoreId> {
    let mut best: Option<(StoreId, usize, u64)> = None;

    for (store_id, stat) in stats {
        let (count, flow) = (stat.regions_stat.len(), stat.total_flow_bytes);
        if count < MIN_SOURCE_HOT_REGIONS {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, max_count, max_flow)) => {
                count > max_count || (count == max_count && flow > max_flow)
            }
        };
        if better {
            best = Some((*store_id, count, flow));
        }
    }

    best.map(|(store_id, _, _)| store_id)
}

/// Pick the store to receive a region of `region_flow_bytes` from `src_store`
pub fn select_dest_store(
    candidates: &[StoreId],
    region_flow_bytes: u64,
    src_store: StoreId,
    stats: &StoreHotRegionsStat,
) -> Option<StoreId> {
    select_dest_store_traced(
        candidates,
        region_flow_bytes,
        src_store,
        stats,
        HOT_REGION_SCHEDULE_FACTOR,
        &mut Vec::new(),
    )
}

/// [`select_dest_store`] with an explicit schedule factor, recording every
/// rule hit into `reasons`
pub fn select_dest_store_traced(
    candidates: &[StoreId],
    region_flow_bytes: u64,
    src_store: StoreId,
    stats: &StoreHotRegionsStat,
    schedule_factor: f64,
    reasons: &mut Vec<SelectionReason>,
) -> Option<StoreId> {
    let (src_count, src_flow) = stats
        .get(&src_store)
        .map(|s| (s.regions_stat.len(), s.total_flow_bytes))
        .unwrap_or((0, 0));
    let flow_ceiling = (src_flow as f64 * schedule_factor) as u64;
    let moved_flow = region_flow_bytes.saturating_mul(2);

    let mut dest = None;
    let mut min_flow = u64::MAX;
    let mut min_count = usize::MAX;

    for &store_id in candidates {
        if store_id == src_store {
            continue;
        }
        let Some(stat) = stats.get(&store_id) else {
            reasons.push(SelectionReason::EmptyStore(store_id));
            return Some(store_id);
        };

        let (count, flow) = (stat.regions_stat.len(), stat.total_flow_bytes);
        if src_count.saturating_sub(count) > 1 && count < min_count {
            dest = Some(store_id);
            min_flow = flow;
            min_count = count;
            reasons.push(SelectionReason::FewerRegions(store_id));
            continue;
        }
        if count == min_count && flow < min_flow && flow.saturating_add(moved_flow) < flow_ceiling {
            dest = Some(store_id);
            min_flow = flow;
            reasons.push(SelectionReason::LowerFlow(store_id));
        }
    }

    dest
}
