//! Folding raw load samples into per-store statistics

use super::{HotRegionsStat, LoadSample, RegionStat, ResourceKind, StoreHotRegionsStat};
use crate::cluster::Cluster;
use tracing::trace;

/// Build per-store hot-region statistics from one direction's samples
///
/// Samples below the cluster's hot threshold and samples whose region no
/// longer exists are skipped. With [`ResourceKind::Leader`] each sample is
/// attributed to the leader store; with [`ResourceKind::Region`] to every
/// store holding a replica.
///
/// Each [`RegionStat`] carries the median flow of its sample, while the
/// store's `total_flow_bytes` accumulates the raw latest flow.
pub fn aggregate(
    samples: &[LoadSample],
    cluster: &dyn Cluster,
    kind: ResourceKind,
) -> StoreHotRegionsStat {
    let threshold = cluster.hot_region_low_threshold();
    let mut stats = StoreHotRegionsStat::new();

    for sample in samples {
        if sample.hot_degree < threshold {
            continue;
        }

        let Some(region) = cluster.get_region(sample.region_id) else {
            trace!(region_id = sample.region_id, "skipping sample for unknown region");
            continue;
        };

        let store_ids = match kind {
            ResourceKind::Region => region.store_ids(),
            ResourceKind::Leader => match region.leader_store_id() {
                Some(id) => vec![id],
                None => {
                    trace!(region_id = region.id, "skipping sample for leaderless region");
                    continue;
                }
            },
        };

        let median = sample.stats.median() as u64;
        for store_id in store_ids {
            stats.entry(store_id).or_insert_with(HotRegionsStat::default).push(
                RegionStat {
                    region_id: sample.region_id,
                    store_id,
                    flow_bytes: median,
                    hot_degree: sample.hot_degree,
                    last_update_time: sample.last_update_time,
                    anti_count: sample.anti_count,
                    version: sample.version,
                },
                sample.flow_bytes,
            );
        }
    }

    stats
}
