//! Integration tests for map transactions: revisions, leaves, tiles and roots

mod common;

use common::*;
use vmap_storage::hashers::{HasherRegistry, MapHasher};
use vmap_storage::storage::StorageConfig;
use vmap_storage::tree::HashStrategy;
use vmap_storage::types::{MapLeaf, NodeId, Tile, TileNode};

#[test]
fn test_scenario_a_bootstrap_revision_zero() {
    let storage = memory_storage();
    let tree = map_tree(1);

    storage
        .read_write_transaction(&tree, |tx| {
            assert!(tx.needs_init());
            assert_eq!(tx.read_revision(), None);
            assert_needs_init(tx.latest_signed_map_root());
            assert_eq!(tx.write_revision()?, 0);

            tx.set(&key(1), &leaf(b"genesis"))?;
            tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))
        })
        .expect("Failed to initialise tree");

    let opened = storage.begin_for_tree(&tree).expect("Failed to begin");
    assert!(!opened.needs_init());
    let tx = opened.into_transaction();
    assert_eq!(tx.read_revision(), Some(0));
    assert_eq!(tx.write_revision().unwrap(), 1);

    let root = tx.latest_signed_map_root().unwrap().decode().unwrap();
    assert_eq!(root.revision, 0);
    assert_eq!(values(&tx.get(0, &[key(1)]).unwrap()), vec!["genesis"]);
    tx.close().unwrap();
}

#[test]
fn test_scenario_b_point_in_time_lookup() {
    let storage = memory_storage();
    let tree = map_tree(1);

    commit_revision(&storage, &tree, &[(9, "other-0")]);
    commit_revision(&storage, &tree, &[(9, "other-1")]);
    commit_revision(&storage, &tree, &[(7, "k-at-2")]);
    commit_revision(&storage, &tree, &[(9, "other-3")]);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_eq!(
        snapshot.latest_signed_map_root().unwrap().decode().unwrap().revision,
        3
    );
    assert_eq!(values(&snapshot.get(3, &[key(7)]).unwrap()), vec!["k-at-2"]);
    assert!(snapshot.get(1, &[key(7)]).unwrap().is_empty());
    snapshot.close().unwrap();
}

#[test]
fn test_scenario_c_empty_index_list() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert!(snapshot.get(0, &[]).unwrap().is_empty());
    assert!(snapshot.get(u64::MAX, &[]).unwrap().is_empty());
    snapshot.close().unwrap();

    commit_revision(&storage, &tree, &[(1, "a")]);
    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert!(snapshot.get(0, &[]).unwrap().is_empty());
    snapshot.close().unwrap();
}

#[test]
fn test_get_returns_greatest_revision_at_or_below() {
    let storage = memory_storage();
    let tree = map_tree(1);

    commit_revision(&storage, &tree, &[]);
    commit_revision(&storage, &tree, &[(5, "first")]);
    commit_revision(&storage, &tree, &[]);
    commit_revision(&storage, &tree, &[(5, "second")]);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let k = [key(5)];
    assert!(snapshot.get(0, &k).unwrap().is_empty());
    assert_eq!(values(&snapshot.get(1, &k).unwrap()), vec!["first"]);
    assert_eq!(values(&snapshot.get(2, &k).unwrap()), vec!["first"]);
    assert_eq!(values(&snapshot.get(3, &k).unwrap()), vec!["second"]);
    assert_eq!(values(&snapshot.get(100, &k).unwrap()), vec!["second"]);
}

#[test]
fn test_get_omits_missing_keys_and_overwrites_index() {
    let storage = memory_storage();
    let tree = map_tree(1);

    storage
        .read_write_transaction(&tree, |tx| {
            let mismatched = MapLeaf {
                index: vec![0xEE; 32],
                ..leaf(b"a")
            };
            tx.set(&key(1), &mismatched)?;
            tx.set(&key(2), &leaf(b"b"))?;
            tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))
        })
        .unwrap();

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let leaves = snapshot
        .get(0, &[key(2), key(3), key(1), key(2)])
        .unwrap();
    assert_eq!(values(&leaves), vec!["b", "a"]);
    assert_eq!(leaves[0].index, key(2));
    assert_eq!(leaves[1].index, key(1));
}

#[test]
fn test_get_many_keys() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let writes: Vec<(u8, String)> = (0..=255u8).map(|i| (i, format!("v{i}"))).collect();
    let borrowed: Vec<(u8, &str)> = writes.iter().map(|(k, v)| (*k, v.as_str())).collect();
    commit_revision(&storage, &tree, &borrowed);

    let mut keys: Vec<Vec<u8>> = (0..=255u8).map(key).collect();
    // Keys that were never written are dropped from the result.
    for i in 0..400u16 {
        keys.push(i.to_be_bytes().repeat(16));
    }
    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let leaves = snapshot.get(0, &keys).unwrap();
    assert_eq!(leaves.len(), 256);
    assert_eq!(leaves[200].leaf_value, b"v200");
}

#[test]
fn test_get_collapses_repeated_keys() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[(1, "one"), (2, "two")]);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let mut keys = Vec::new();
    for _ in 0..500 {
        keys.extend([key(2), key(1), key(3)]);
    }
    let leaves = snapshot.get(0, &keys).unwrap();
    assert_eq!(values(&leaves), vec!["two", "one"]);
}

#[test]
fn test_needs_init_is_distinct_from_not_found() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_needs_init(snapshot.latest_signed_map_root());
    assert_needs_init(snapshot.get_signed_map_root(0));
    assert_not_found(snapshot.get_signed_map_root(5));
    snapshot.close().unwrap();

    commit_revision(&storage, &tree, &[]);
    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert!(snapshot.get_signed_map_root(0).is_ok());
    assert_not_found(snapshot.get_signed_map_root(1));
}

#[test]
fn test_latest_root_tracks_newest_revision() {
    let storage = memory_storage();
    let tree = map_tree(1);

    for expected in 0..5u64 {
        let revision = commit_revision(&storage, &tree, &[(1, "x")]);
        assert_eq!(revision, expected);

        let snapshot = storage.snapshot_for_tree(&tree).unwrap();
        let latest = snapshot.latest_signed_map_root().unwrap().decode().unwrap();
        assert_eq!(latest.revision, expected);
        assert_eq!(snapshot.read_revision(), Some(expected));
        snapshot.close().unwrap();
    }
}

#[test]
fn test_root_lookup_round_trips_signed_root() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[]);
    commit_revision(&storage, &tree, &[]);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let root = snapshot.get_signed_map_root(1).unwrap();
    assert_eq!(root, signed_root(1, timestamp_for(1)));
}

#[test]
fn test_snapshot_keeps_first_pinned_revision() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[]);
    commit_revision(&storage, &tree, &[]);

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    snapshot.latest_signed_map_root().unwrap();
    assert_eq!(snapshot.read_revision(), Some(1));
    snapshot.get_signed_map_root(0).unwrap();
    assert_eq!(snapshot.read_revision(), Some(1));
}

#[test]
fn test_read_write_lookup_updates_read_revision() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[]);
    commit_revision(&storage, &tree, &[]);

    let tx = storage.begin_for_tree(&tree).unwrap().into_transaction();
    assert_eq!(tx.read_revision(), Some(1));
    tx.get_signed_map_root(0).unwrap();
    assert_eq!(tx.read_revision(), Some(0));
    // The write revision was fixed at open.
    assert_eq!(tx.write_revision().unwrap(), 2);
}

#[test]
fn test_duplicate_root_revision_is_rejected() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[]);

    let err = storage
        .read_write_transaction(&tree, |tx| {
            tx.store_signed_map_root(&signed_root(0, timestamp_for(0) + 1))
        })
        .unwrap_err();
    assert!(matches!(
        err,
        MapStorageError::StaleRoot {
            revision: 0,
            latest_revision: 0,
            ..
        }
    ));
    assert!(!err.is_needs_init());

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let root = snapshot.get_signed_map_root(0).unwrap().decode().unwrap();
    assert_eq!(root.timestamp_nanos, timestamp_for(0));
}

#[test]
fn test_duplicate_root_timestamp_is_rejected() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[]);

    let result = storage.read_write_transaction(&tree, |tx| {
        tx.store_signed_map_root(&signed_root(1, timestamp_for(0)))
    });
    assert!(result.is_err());

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_eq!(
        snapshot.latest_signed_map_root().unwrap().decode().unwrap().revision,
        0
    );
}

#[test]
fn test_older_timestamp_root_cannot_take_over_latest() {
    let storage = memory_storage();
    let tree = map_tree(1);
    storage
        .read_write_transaction(&tree, |tx| {
            tx.store_signed_map_root(&signed_root(0, BASE_TIMESTAMP + 2_000))
        })
        .unwrap();

    let err = storage
        .read_write_transaction(&tree, |tx| {
            assert_eq!(tx.write_revision()?, 1);
            tx.store_signed_map_root(&signed_root(1, BASE_TIMESTAMP + 1_000))
        })
        .unwrap_err();
    assert!(err.is_usage_error(), "expected stale root, got {err}");

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_eq!(
        snapshot.latest_signed_map_root().unwrap().decode().unwrap().revision,
        0
    );
    assert_not_found(snapshot.get_signed_map_root(1));
    snapshot.close().unwrap();

    // The tree still advances once a newer root arrives.
    storage
        .read_write_transaction(&tree, |tx| {
            assert_eq!(tx.write_revision()?, 1);
            tx.store_signed_map_root(&signed_root(1, BASE_TIMESTAMP + 3_000))
        })
        .unwrap();
    let tx = storage.begin_for_tree(&tree).unwrap().into_transaction();
    assert_eq!(tx.write_revision().unwrap(), 2);
    tx.close().unwrap();
}

#[test]
fn test_root_must_advance_revision() {
    let storage = memory_storage();
    let tree = map_tree(1);
    commit_revision(&storage, &tree, &[]);
    commit_revision(&storage, &tree, &[]);

    let err = storage
        .read_write_transaction(&tree, |tx| {
            tx.store_signed_map_root(&signed_root(0, timestamp_for(5)))
        })
        .unwrap_err();
    assert!(matches!(
        err,
        MapStorageError::StaleRoot {
            revision: 0,
            latest_revision: 1,
            ..
        }
    ));
}

#[test]
fn test_store_rejects_undecodable_root() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let garbage = vmap_storage::types::SignedMapRoot {
        map_root: vec![0, 9, 1],
        signature: vec![],
    };
    let err = storage
        .read_write_transaction(&tree, |tx| tx.store_signed_map_root(&garbage))
        .unwrap_err();
    assert!(matches!(err, MapStorageError::Codec(_)));
}

#[test]
fn test_failed_transaction_leaves_nothing_behind() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let result: Result<(), _> = storage.read_write_transaction(&tree, |tx| {
        tx.set(&key(1), &leaf(b"lost"))?;
        tx.set_tiles(&[top_tile(&[1], 0xAA)])?;
        tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))?;
        Err(MapStorageError::InvalidArgument("abort".into()))
    });
    assert!(result.is_err());

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_needs_init(snapshot.latest_signed_map_root());
    assert!(snapshot.get(0, &[key(1)]).unwrap().is_empty());
    assert!(snapshot.get_tiles(0, &[NodeId::root()]).unwrap().is_empty());
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let storage = memory_storage();
    let tree = map_tree(1);

    {
        let tx = storage.begin_for_tree(&tree).unwrap().into_transaction();
        tx.set(&key(1), &leaf(b"dropped")).unwrap();
        tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))
            .unwrap();
    }

    assert!(storage.begin_for_tree(&tree).unwrap().needs_init());
}

#[test]
fn test_tile_absence_is_stable() {
    let storage = memory_storage();
    let tree = map_tree(1);
    let ids = [NodeId::root(), NodeId::from_bytes(&[0x10]), NodeId::from_bytes(&[0xAB; 10])];

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert!(snapshot.get_tiles(0, &ids).unwrap().is_empty());
    assert!(snapshot.get_tiles(0, &ids).unwrap().is_empty());
    assert!(snapshot.get_tiles(7, &ids).unwrap().is_empty());
}

#[test]
fn test_tiles_resolve_by_revision() {
    let storage = memory_storage();
    let tree = map_tree(1);
    let terminal_root = [0xAB; 10];

    storage
        .read_write_transaction(&tree, |tx| {
            tx.set_tiles(&[top_tile(&[1, 2], 0x01), terminal_tile(terminal_root, &[3])])?;
            tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))
        })
        .unwrap();
    storage
        .read_write_transaction(&tree, |tx| {
            tx.set_tiles(&[top_tile(&[1, 2, 3], 0x02)])?;
            tx.store_signed_map_root(&signed_root(1, timestamp_for(1)))
        })
        .unwrap();

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    let at_zero = snapshot
        .get_tiles(0, &[NodeId::root(), NodeId::from_bytes(&terminal_root)])
        .unwrap();
    assert_eq!(at_zero, vec![top_tile(&[1, 2], 0x01), terminal_tile(terminal_root, &[3])]);

    let at_one = snapshot.get_tiles(1, &[NodeId::root()]).unwrap();
    assert_eq!(at_one, vec![top_tile(&[1, 2, 3], 0x02)]);

    // The terminal tile was not rewritten, so revision 1 still sees it.
    let terminal = snapshot
        .get_tiles(1, &[NodeId::from_bytes(&terminal_root)])
        .unwrap();
    assert_eq!(terminal, vec![terminal_tile(terminal_root, &[3])]);
}

#[test]
fn test_set_tiles_keeps_earlier_tiles_staged_on_failure() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let bad = Tile::new(
        NodeId::from_bytes(&[0x01]),
        vec![TileNode {
            id: NodeId::from_bytes(&[0x02, 0x00]),
            hash: vec![0; 32],
        }],
    );

    storage
        .read_write_transaction(&tree, |tx| {
            assert!(tx.set_tiles(&[top_tile(&[4], 0x04), bad.clone()]).is_err());
            tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))
        })
        .unwrap();

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_eq!(
        snapshot.get_tiles(0, &[NodeId::root()]).unwrap(),
        vec![top_tile(&[4], 0x04)]
    );
    assert!(snapshot
        .get_tiles(0, &[NodeId::from_bytes(&[0x01])])
        .unwrap()
        .is_empty());
}

#[test]
fn test_set_tiles_rejects_wrong_hash_size_and_bad_roots() {
    let storage = memory_storage();
    let tree = map_tree(1);

    let tx = storage.begin_for_tree(&tree).unwrap().into_transaction();
    let short_hash = Tile::new(
        NodeId::root(),
        vec![TileNode {
            id: NodeId::from_bytes(&[0x01]),
            hash: vec![0; 20],
        }],
    );
    assert!(matches!(
        tx.set_tiles(&[short_hash]),
        Err(MapStorageError::Codec(_))
    ));

    assert!(matches!(
        tx.set_tiles(&[top_tile(&[9, 1], 0x01)]),
        Err(MapStorageError::Codec(_))
    ));

    // Not a stratum boundary of the default layout.
    let mid_stratum = Tile::empty(NodeId::new(vec![0x80], 4).unwrap());
    assert!(tx.set_tiles(&[mid_stratum]).is_err());

    let unaligned = [NodeId::new(vec![0x80], 1).unwrap()];
    assert!(matches!(
        tx.get_tiles(0, &unaligned),
        Err(MapStorageError::InvalidArgument(_))
    ));
}

#[test]
fn test_trees_are_isolated() {
    let storage = memory_storage();
    let one = map_tree(1);
    let two = map_tree(2);

    commit_revision(&storage, &one, &[(1, "tree-one")]);

    let snapshot = storage.snapshot_for_tree(&two).unwrap();
    assert_needs_init(snapshot.latest_signed_map_root());
    assert!(snapshot.get(0, &[key(1)]).unwrap().is_empty());
    snapshot.close().unwrap();

    commit_revision(&storage, &two, &[(1, "tree-two")]);
    let snapshot = storage.snapshot_for_tree(&one).unwrap();
    assert_eq!(values(&snapshot.get(0, &[key(1)]).unwrap()), vec!["tree-one"]);
}

#[test]
fn test_coniks_tree_uses_its_hasher() {
    let storage = memory_storage();
    let tree = vmap_storage::tree::Tree::map(3, HashStrategy::ConiksSha512_256, chrono::Utc::now());

    let tx = storage.begin_for_tree(&tree).unwrap().into_transaction();
    assert_eq!(tx.hasher().size(), 32);
    let hash = tx.hasher().hash_leaf(3, &key(1), b"value");
    assert_eq!(hash.len(), 32);
    tx.close().unwrap();
}

#[test]
fn test_committed_snapshot_releases_connection() {
    let storage = memory_storage();
    let tree = map_tree(1);
    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    snapshot.commit().unwrap();

    // The connection went back to the pool, so a new snapshot can open.
    let again = storage.snapshot_for_tree(&tree).unwrap();
    again.close().unwrap();
}

#[test]
fn test_custom_strata_layout() {
    let storage = MapStorage::open(
        StorageConfig {
            strata: vec![8, 248],
            ..StorageConfig::in_memory()
        },
        HasherRegistry::with_defaults(),
    )
    .unwrap();
    let tree = map_tree(1);

    assert_eq!(storage.layout(&tree).heights(), vec![8, 248]);

    let deep_root = NodeId::from_bytes(&[0x42]);
    let deep = Tile::new(
        deep_root.clone(),
        vec![TileNode {
            id: NodeId::from_bytes(&[0x42; 32]),
            hash: vec![1; 32],
        }],
    );
    storage
        .read_write_transaction(&tree, |tx| {
            tx.set_tiles(&[deep.clone()])?;
            tx.store_signed_map_root(&signed_root(0, timestamp_for(0)))
        })
        .unwrap();

    let snapshot = storage.snapshot_for_tree(&tree).unwrap();
    assert_eq!(snapshot.get_tiles(0, &[deep_root]).unwrap(), vec![deep]);
}
