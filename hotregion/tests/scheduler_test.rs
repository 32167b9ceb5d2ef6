//! End-to-end tests for the hot-region scheduler over an in-memory cluster

use hotregion::telemetry::channel;
use hotregion::{
    aggregate, Cluster, ClusterFixture, HotRegionScheduler, LoadSample, MemoryCluster, OpKind,
    Operator, OperatorCounter, OperatorStep, Peer, RegionInfo, ResourceKind, ScheduleEvent,
    SchedulerConfig, StoreId, StoreInfo,
};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a cluster with `stores` stores; every region in `regions` lists its
/// stores leader first and is hot with `flow` bytes in both directions
fn build_cluster(stores: u64, regions: &[(&[StoreId], u64)]) -> Arc<MemoryCluster> {
    let cluster = MemoryCluster::new();
    for id in 1..=stores {
        cluster.put_store(StoreInfo::new(id));
    }

    let mut samples = Vec::new();
    let mut next_peer = 1000;
    for (i, (store_ids, flow)) in regions.iter().enumerate() {
        let region_id = i as u64 + 1;
        let mut peers = Vec::new();
        for store_id in store_ids.iter() {
            next_peer += 1;
            peers.push(Peer::new(next_peer, *store_id));
        }
        cluster.put_region(RegionInfo::new(region_id, peers));
        samples.push(LoadSample::new(region_id, 5, *flow));
    }
    cluster.set_read_samples(samples.clone());
    cluster.set_write_samples(samples);
    Arc::new(cluster)
}

fn seeded(seed: u64) -> SchedulerConfig {
    SchedulerConfig {
        seed: Some(seed),
        ..Default::default()
    }
}

fn counter(cluster: &Arc<MemoryCluster>) -> Arc<dyn OperatorCounter> {
    cluster.clone()
}

fn block(cluster: &MemoryCluster, store_id: StoreId) {
    let mut store = cluster.get_store(store_id).unwrap();
    store.blocked = true;
    cluster.put_store(store);
}

// ---------------------------------------------------------------------------
// Read balancing
// ---------------------------------------------------------------------------

#[test]
fn test_read_moves_peer_to_cooler_store() {
    // Store 1 leads four hot regions, store 4 leads one
    let cluster = build_cluster(
        4,
        &[
            (&[1, 2, 3], 1000),
            (&[1, 2, 3], 1000),
            (&[1, 2, 3], 1000),
            (&[1, 2, 3], 1000),
            (&[4, 2, 3], 1000),
        ],
    );
    let (sink, mut rx) = channel(8);
    let scheduler = HotRegionScheduler::for_read(seeded(7), counter(&cluster))
        .unwrap()
        .with_sink(Arc::new(sink));

    let op = scheduler.schedule(cluster.as_ref()).unwrap();
    assert_eq!(op.desc, "move-hot-read-region");
    assert_eq!(op.step.source_store(), 1);
    assert_eq!(op.step.dest_store(), 4);
    assert_eq!(op.kinds, [OpKind::HotRegion, OpKind::Region]);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.step, op.step.to_string());
    assert_eq!((event.source_store, event.dest_store), (1, 4));
    let names: Vec<_> = event.features.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["hotRegionsCount4", "minRegionsCount4", "srcRegion"]);

    let counts = scheduler.event_counts();
    assert_eq!(counts["move_peer"], 1);
    assert_eq!(counts["skip"], 0);
}

#[test]
fn test_read_leader_balance_flag() {
    let regions: &[(&[StoreId], u64)] = &[(&[1, 2, 3], 500), (&[1, 2, 3], 500), (&[1, 2, 3], 500)];

    // Off: the leader planner is not consulted, a replica moves to store 4
    let cluster = build_cluster(4, regions);
    let scheduler = HotRegionScheduler::for_read(seeded(3), counter(&cluster)).unwrap();
    let op = scheduler.schedule(cluster.as_ref()).unwrap();
    assert_eq!(op.desc, "move-hot-read-region");
    assert_eq!(scheduler.events().get(ScheduleEvent::MoveLeader), 0);

    // On: leadership moves to a follower first
    let cluster = build_cluster(4, regions);
    let config = SchedulerConfig {
        enable_read_leader_balance: true,
        ..seeded(3)
    };
    let scheduler = HotRegionScheduler::for_read(config, counter(&cluster)).unwrap();
    let op = scheduler.schedule(cluster.as_ref()).unwrap();
    assert_eq!(op.desc, "transfer-hot-read-leader");
    assert!(matches!(
        op.step,
        OperatorStep::TransferLeader { from_store: 1, .. }
    ));
    assert_eq!(scheduler.events().get(ScheduleEvent::MoveLeader), 1);
}

#[test]
fn test_alloc_failure_yields_no_decision() {
    let cluster = build_cluster(4, &[(&[1, 2, 3], 500), (&[1, 2, 3], 500), (&[1, 2, 3], 500)]);
    cluster.set_alloc_failure(true);
    let scheduler = HotRegionScheduler::for_read(seeded(1), counter(&cluster)).unwrap();

    assert!(scheduler.schedule(cluster.as_ref()).is_none());
    let counts = scheduler.event_counts();
    assert_eq!(counts["alloc_peer_failed"], 1);
    assert_eq!(counts["skip"], 1);
    assert_eq!(counts["move_peer"], 0);
}

#[test]
fn test_exhausted_budget_is_not_allowed() {
    let cluster = build_cluster(4, &[(&[1, 2, 3], 500), (&[1, 2, 3], 500), (&[1, 2, 3], 500)]);
    let scheduler = HotRegionScheduler::for_read(seeded(1), counter(&cluster)).unwrap();

    let region = cluster.get_region(1).unwrap();
    cluster.add_operator(&Operator::move_peer(
        "move-hot-read-region",
        &region,
        region.peers[0],
        Peer::new(9000, 4),
    ));
    assert_eq!(cluster.operator_count(OpKind::HotRegion), 1);
    assert!(!scheduler.is_schedule_allowed(cluster.as_ref()));

    assert!(scheduler.schedule(cluster.as_ref()).is_none());
    let counts = scheduler.event_counts();
    assert_eq!(counts["not_allowed"], 1);
    assert_eq!(counts["skip"], 0);
}

// ---------------------------------------------------------------------------
// Write balancing
// ---------------------------------------------------------------------------

#[test]
fn test_write_moves_load_off_hot_store() {
    let cluster = build_cluster(
        4,
        &[
            (&[1, 2, 3], 2000),
            (&[1, 2, 3], 2000),
            (&[1, 2, 3], 2000),
            (&[1, 2, 3], 2000),
        ],
    );

    for seed in 0..10 {
        let scheduler = HotRegionScheduler::for_write(seeded(seed), counter(&cluster)).unwrap();
        let op = scheduler.schedule(cluster.as_ref()).unwrap();
        match &op.step {
            OperatorStep::MovePeer { dest_peer, .. } => {
                assert_eq!(op.desc, "move-hot-write-region");
                assert_eq!(dest_peer.store_id, 4);
            }
            OperatorStep::TransferLeader { from_store, to_store } => {
                assert_eq!(op.desc, "transfer-hot-write-leader");
                assert_eq!(*from_store, 1);
                assert!([2, 3].contains(to_store));
            }
        }
    }
}

#[test]
fn test_write_exhausted_budget_is_not_allowed() {
    let cluster = build_cluster(4, &[(&[1, 2, 3], 800), (&[1, 2, 3], 800), (&[1, 2, 3], 800)]);
    let region = cluster.get_region(1).unwrap();
    cluster.add_operator(&Operator::transfer_leader(
        "transfer-hot-write-leader",
        &region,
        1,
        2,
    ));

    for seed in 0..8 {
        let scheduler = HotRegionScheduler::for_write(seeded(seed), counter(&cluster)).unwrap();
        assert!(!scheduler.is_schedule_allowed(cluster.as_ref()));

        assert!(scheduler.schedule(cluster.as_ref()).is_none());
        let counts = scheduler.event_counts();
        // At most one refusal per planner kind, however many attempts ran
        assert!((1..=2).contains(&counts["not_allowed"]));
        assert_eq!(counts["skip"], 0);
        assert_eq!(counts["move_peer"] + counts["move_leader"], 0);
    }

    cluster.finish_operator(&Operator::transfer_leader(
        "transfer-hot-write-leader",
        &region,
        1,
        2,
    ));
    let scheduler = HotRegionScheduler::for_write(seeded(0), counter(&cluster)).unwrap();
    assert!(scheduler.schedule(cluster.as_ref()).is_some());
    assert_eq!(scheduler.event_counts()["not_allowed"], 0);
}

#[test]
fn test_write_exhaustion_skips_exactly_once() {
    // Every replica store already holds the region and both followers are
    // blocked, so neither planner has a candidate
    let cluster = build_cluster(3, &[(&[1, 2, 3], 800), (&[1, 2, 3], 800), (&[1, 2, 3], 800)]);
    block(&cluster, 2);
    block(&cluster, 3);

    let scheduler = HotRegionScheduler::for_write(seeded(11), counter(&cluster)).unwrap();
    assert!(scheduler.schedule(cluster.as_ref()).is_none());

    let counts = scheduler.event_counts();
    assert_eq!(counts["schedule"], 1);
    assert_eq!(counts["skip"], 1);
    assert_eq!(counts["move_peer"], 0);
    assert_eq!(counts["move_leader"], 0);
    assert_eq!(counts["not_allowed"], 0);
    assert_eq!(scheduler.balance_limit(), 1);

    let config = SchedulerConfig {
        max_write_attempts: 3,
        ..seeded(11)
    };
    let scheduler = HotRegionScheduler::for_write(config, counter(&cluster)).unwrap();
    assert!(scheduler.schedule(cluster.as_ref()).is_none());
    assert_eq!(scheduler.events().get(ScheduleEvent::Skip), 1);
}

// ---------------------------------------------------------------------------
// Status snapshots
// ---------------------------------------------------------------------------

#[test]
fn test_status_matches_cycle_and_survives_later_cycles() {
    let cluster = build_cluster(4, &[(&[1, 2, 3], 700), (&[1, 2, 3], 300), (&[2, 1, 3], 100)]);
    let scheduler = HotRegionScheduler::for_write(seeded(5), counter(&cluster)).unwrap();

    scheduler.schedule(cluster.as_ref());
    let first = scheduler.hot_write_status();

    let samples = cluster.region_write_stats();
    assert_eq!(
        *first.as_leader,
        aggregate(&samples, cluster.as_ref(), ResourceKind::Leader)
    );
    assert_eq!(
        **first.as_peer.as_ref().unwrap(),
        aggregate(&samples, cluster.as_ref(), ResourceKind::Region)
    );
    assert_eq!(first.as_leader[&1].regions_count, 2);
    assert_eq!(first.as_leader[&1].total_flow_bytes, 1000);

    cluster.set_write_samples(Vec::new());
    scheduler.schedule(cluster.as_ref());

    assert!(scheduler.hot_write_status().as_leader.is_empty());
    assert_eq!(first.as_leader[&1].regions_count, 2);
    assert!(scheduler.hot_read_status().as_leader.is_empty());
    assert!(scheduler.hot_read_status().as_peer.is_none());
}

#[test]
fn test_status_readable_while_scheduling() {
    let cluster = build_cluster(4, &[(&[1, 2, 3], 900), (&[1, 2, 3], 900), (&[1, 2, 3], 900)]);
    let scheduler = HotRegionScheduler::new(seeded(2), counter(&cluster)).unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..50 {
                scheduler.schedule(cluster.as_ref());
            }
        });
        s.spawn(|| {
            for _ in 0..50 {
                let status = scheduler.hot_write_status();
                if let Some(peer) = &status.as_peer {
                    for stat in peer.values() {
                        assert_eq!(stat.regions_count, stat.regions_stat.len());
                    }
                }
                let _ = scheduler.hot_read_status();
            }
        });
    });

    assert_eq!(scheduler.event_counts()["schedule"], 50);
}

// ---------------------------------------------------------------------------
// Driving the cluster
// ---------------------------------------------------------------------------

#[test]
fn test_applied_operators_keep_regions_consistent() {
    let cluster = build_cluster(
        6,
        &[
            (&[1, 2, 3], 1000),
            (&[1, 2, 3], 900),
            (&[1, 2, 3], 800),
            (&[1, 4, 5], 700),
            (&[1, 4, 5], 600),
            (&[2, 3, 4], 100),
        ],
    );
    let scheduler = HotRegionScheduler::new(seeded(9), counter(&cluster)).unwrap();

    for _ in 0..30 {
        if let Some(op) = scheduler.schedule(cluster.as_ref()) {
            cluster.add_operator(&op);
            cluster.apply_operator(&op).unwrap();
            cluster.finish_operator(&op);
        }
    }

    for region_id in 1..=6 {
        let region = cluster.get_region(region_id).unwrap();
        let stores: HashSet<_> = region.store_ids().into_iter().collect();
        assert_eq!(stores.len(), 3, "region {} lost a replica", region_id);
        let leader = region.leader_store_id().unwrap();
        assert!(stores.contains(&leader));
    }
    assert_eq!(cluster.operator_count(OpKind::HotRegion), 0);
}

#[test]
fn test_fixture_file_drives_scheduler() {
    let json = r#"{
        "options": { "hot_region_low_threshold": 3 },
        "stores": [ { "id": 1 }, { "id": 2 }, { "id": 3 }, { "id": 4 } ],
        "regions": [
            { "id": 1, "peers": [ { "id": 11, "store_id": 1 }, { "id": 12, "store_id": 2 }, { "id": 13, "store_id": 3 } ], "leader": { "id": 11, "store_id": 1 } },
            { "id": 2, "peers": [ { "id": 21, "store_id": 1 }, { "id": 22, "store_id": 2 }, { "id": 23, "store_id": 3 } ], "leader": { "id": 21, "store_id": 1 } }
        ],
        "read_samples": [
            { "region_id": 1, "hot_degree": 4, "flow_bytes": 4096 },
            { "region_id": 2, "hot_degree": 4, "flow_bytes": 2048 },
            { "region_id": 3, "hot_degree": 9, "flow_bytes": 1 }
        ]
    }"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let fixture = ClusterFixture::load(file.path()).unwrap();
    let cluster = Arc::new(MemoryCluster::from_fixture(fixture));
    let scheduler = HotRegionScheduler::for_read(seeded(4), counter(&cluster)).unwrap();

    let op = scheduler.schedule(cluster.as_ref()).unwrap();
    assert_eq!(op.step.dest_store(), 4);

    // Region 3 does not exist and is left out of the view
    let status = scheduler.hot_read_status();
    assert_eq!(status.as_leader.len(), 1);
    assert_eq!(status.as_leader[&1].total_flow_bytes, 6144);
}
