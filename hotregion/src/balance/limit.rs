//! Balance limit adjustment

use crate::cluster::StoreId;
use crate::stats::StoreHotRegionsStat;

/// New cap on in-flight hot-region operators after picking `src_store`.
///
/// The cap is the source's surplus over the mean hot-region count of the
/// stores in the view, damped by `limit_factor` and rounded, never below 1.
pub fn adjust_balance_limit(
    src_store: StoreId,
    stats: &StoreHotRegionsStat,
    limit_factor: f64,
) -> u64 {
    if stats.is_empty() {
        return 1;
    }

    let total: usize = stats.values().map(|s| s.regions_stat.len()).sum();
    let mean = total as f64 / stats.len() as f64;
    let src_count = stats
        .get(&src_store)
        .map(|s| s.regions_stat.len())
        .unwrap_or(0) as f64;

    let limit = ((src_count - mean) * limit_factor).round();
    if limit < 1.0 {
        1
    } else {
        limit as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{HotRegionsStat, RegionStat};

    fn stats(counts: &[(StoreId, usize)]) -> StoreHotRegionsStat {
        counts
            .iter()
            .map(|&(store_id, count)| {
                let mut stat = HotRegionsStat::default();
                for i in 0..count {
                    stat.push(
                        RegionStat {
                            region_id: i as u64,
                            store_id,
                            flow_bytes: 10,
                            hot_degree: 3,
                            last_update_time: 0,
                            anti_count: 0,
                            version: 0,
                        },
                        10,
                    );
                }
                (store_id, stat)
            })
            .collect()
    }

    #[test]
    fn test_limit_from_surplus() {
        // mean 4, (10 - 4) * 0.75 = 4.5 rounds to 5
        let s = stats(&[(1, 10), (2, 1), (3, 1)]);
        assert_eq!(adjust_balance_limit(1, &s, 0.75), 5);

        // mean 3, (5 - 3) * 0.75 = 1.5 rounds to 2
        let s = stats(&[(1, 5), (2, 1)]);
        assert_eq!(adjust_balance_limit(1, &s, 0.75), 2);
    }

    #[test]
    fn test_limit_never_below_one() {
        let s = stats(&[(1, 2), (2, 2)]);
        assert_eq!(adjust_balance_limit(1, &s, 0.75), 1);
        assert_eq!(adjust_balance_limit(2, &stats(&[(1, 9)]), 0.75), 1);
        assert_eq!(adjust_balance_limit(1, &StoreHotRegionsStat::new(), 0.75), 1);
    }
}
