//! Replica relocation planning

use super::{adjust_balance_limit, BalanceState, PeerMove, Planner};
use crate::filter::{filter_target, DistinctScoreFilter, ExcludedFilter, Filter, StoreStateFilter};
use crate::operator::OpKind;
use crate::selector::{select_dest_store_traced, select_source_store};
use crate::stats::StoreHotRegionsStat;
use tracing::{debug, error, trace, warn};

impl Planner<'_> {
    /// Move one replica of a hot region off the hottest store.
    ///
    /// Regions on the source are visited in random order; the first one with
    /// an acceptable destination wins.
    pub fn balance_by_peer(
        &self,
        state: &mut BalanceState,
        stats: &StoreHotRegionsStat,
    ) -> Option<PeerMove> {
        if self.refused(OpKind::Region, state.limit) {
            return None;
        }

        let src_store_id = select_source_store(stats)?;
        let src_stat = stats.get(&src_store_id)?;
        let Some(src_store) = self.cluster.get_store(src_store_id) else {
            debug!("Source store {} is no longer known to the cluster", src_store_id);
            return None;
        };

        let stores = self.cluster.get_stores();
        let labels = self.cluster.location_labels();

        for index in state.shuffled_indices(src_stat.regions_stat.len()) {
            let region_stat = &src_stat.regions_stat[index];
            let Some(region) = self.cluster.get_region(region_stat.region_id) else {
                trace!("Hot region {} no longer exists", region_stat.region_id);
                continue;
            };
            if !region.is_healthy() {
                trace!("Hot region {} has down or pending peers", region.id);
                continue;
            }

            let state_filter = StoreStateFilter {
                move_region: true,
                ..Default::default()
            };
            let excluded = ExcludedFilter::new(region.store_ids());
            let distinct = DistinctScoreFilter::new(
                &labels,
                &self.cluster.get_region_stores(&region),
                &src_store,
            );
            let filters: [&dyn Filter; 3] = [&state_filter, &excluded, &distinct];

            let candidates: Vec<_> = stores
                .iter()
                .filter(|store| !filter_target(store, &filters))
                .map(|store| store.id)
                .collect();

            let mut reasons = Vec::new();
            let Some(dest_store_id) = select_dest_store_traced(
                &candidates,
                region_stat.flow_bytes,
                src_store_id,
                stats,
                self.config.schedule_factor,
                &mut reasons,
            ) else {
                continue;
            };

            state.limit = adjust_balance_limit(src_store_id, stats, self.config.limit_factor);

            let Some(source_peer) = region.store_peer(src_store_id) else {
                warn!(
                    "Region {} has no peer on source store {}",
                    region.id, src_store_id
                );
                return None;
            };

            let dest_peer = match self.cluster.alloc_peer(dest_store_id) {
                Ok(peer) => peer,
                Err(e) => {
                    error!("Failed to allocate peer on store {}: {}", dest_store_id, e);
                    self.events.record_alloc_failure(&e);
                    return None;
                }
            };

            debug!(
                "Planned peer move of region {} from store {} to store {}",
                region.id, src_store_id, dest_store_id
            );
            return Some(PeerMove {
                region,
                source_peer,
                dest_peer,
                reasons,
            });
        }

        None
    }
}
