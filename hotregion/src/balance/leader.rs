//! Leadership transfer planning

use super::{adjust_balance_limit, BalanceState, LeaderMove, Planner};
use crate::filter::{filter_target, StoreStateFilter};
use crate::operator::OpKind;
use crate::selector::{select_dest_store_traced, select_source_store};
use crate::stats::StoreHotRegionsStat;
use tracing::{debug, trace};

impl Planner<'_> {
    /// Hand leadership of one hot region on the hottest store to a follower
    pub fn balance_by_leader(
        &self,
        state: &mut BalanceState,
        stats: &StoreHotRegionsStat,
    ) -> Option<LeaderMove> {
        if self.refused(OpKind::Leader, state.limit) {
            return None;
        }

        let src_store_id = select_source_store(stats)?;
        let src_stat = stats.get(&src_store_id)?;
        let state_filter = StoreStateFilter {
            transfer_leader: true,
            ..Default::default()
        };

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

            let candidates: Vec<_> = self
                .cluster
                .get_follower_stores(&region)
                .iter()
                .filter(|store| !filter_target(store, &[&state_filter]))
                .map(|store| store.id)
                .collect();
            if candidates.is_empty() {
                continue;
            }

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

            let Some(dest_peer) = region.store_voter(dest_store_id) else {
                debug!(
                    "Region {} has no voter on store {}, cannot transfer leader",
                    region.id, dest_store_id
                );
                continue;
            };

            state.limit = adjust_balance_limit(src_store_id, stats, self.config.limit_factor);

            let from_store = region.leader_store_id().unwrap_or(src_store_id);
            debug!(
                "Planned leader transfer of region {} from store {} to store {}",
                region.id, from_store, dest_store_id
            );
            return Some(LeaderMove {
                region,
                from_store,
                dest_peer,
                reasons,
            });
        }

        None
    }
}
