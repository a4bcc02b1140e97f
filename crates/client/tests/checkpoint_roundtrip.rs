//! Save followed by rollback restores the live directory exactly.

use std::collections::BTreeMap;

use certpilot_client::{CheckpointStore, ConfigTree};
use certpilot_config::UntitledSavePolicy;
use proptest::prelude::*;
use tempfile::TempDir;

const PATHS: [&str; 6] = [
    "sites/a.toml",
    "sites/b.toml",
    "certs/a/cert.pem",
    "certs/a/key.pem",
    "certs/b/cert.pem",
    "notes.txt",
];

fn tree_strategy() -> impl Strategy<Value = ConfigTree> {
    prop::collection::btree_map(
        prop::sample::select(PATHS.to_vec()),
        prop::collection::vec(any::<u8>(), 0..64),
        0..4,
    )
    .prop_map(|files: BTreeMap<&str, Vec<u8>>| {
        let mut tree = ConfigTree::new();
        for (path, contents) in files {
            tree.insert(path, contents);
        }
        tree
    })
}

/// One save; `true` makes it temporary
fn step_strategy() -> impl Strategy<Value = (ConfigTree, bool)> {
    (tree_strategy(), any::<bool>())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn permanent_save_then_rollback_is_identity(initial in tree_strategy(), staged in tree_strategy()) {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("live");
        initial.write_to(&live).unwrap();
        let mut store = CheckpointStore::open(
            &dir.path().join("checkpoints"),
            &live,
            UntitledSavePolicy::Synthesize,
        ).unwrap();

        store.save(&staged, Some("change"), false).unwrap();
        prop_assert_eq!(store.read_live().unwrap(), staged);

        store.rollback_checkpoints(1).unwrap();
        prop_assert_eq!(store.read_live().unwrap(), initial);
    }

    #[test]
    fn rollback_through_anchor_restores_pre_cycle_state(
        initial in tree_strategy(),
        steps in prop::collection::vec(step_strategy(), 1..6),
        commit in tree_strategy(),
    ) {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("live");
        initial.write_to(&live).unwrap();
        let mut store = CheckpointStore::open(
            &dir.path().join("checkpoints"),
            &live,
            UntitledSavePolicy::Synthesize,
        ).unwrap();

        // Durable history the cycle must not disturb
        store.save(&initial, Some("baseline"), false).unwrap();
        let durable_before = store.display_checkpoints().count();
        let before = store.read_live().unwrap();

        let anchor = store.save(&before, None, true).unwrap();
        let mut latest = anchor.clone();
        for (tree, temporary) in &steps {
            latest = store.save(tree, Some("step"), *temporary).unwrap();
        }
        if latest.temporary {
            latest = store.save(&commit, Some("commit"), false).unwrap();
        }

        store.rollback_checkpoints(anchor.rollback_count_through(&latest)).unwrap();

        prop_assert_eq!(store.read_live().unwrap(), before);
        prop_assert_eq!(store.display_checkpoints().count(), durable_before);
    }
}
