//! Property tests for query chain semantics.

use proptest::prelude::*;
use record_chain::{Record, RecordStore};
use serde_json::json;

/// Small key/value domain so patterns actually hit.
fn arb_record() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(
        prop::sample::select(vec!["a", "b", "c"]),
        0i64..3,
        0..3,
    )
    .prop_map(|fields| fields.into_iter().map(|(k, v)| (k, json!(v))).collect::<Record>())
}

fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(arb_record(), 0..12)
}

proptest! {
    #[test]
    fn select_keeps_exactly_matching(records in arb_records(), pattern in arb_record()) {
        let store = RecordStore::from_records(records.clone());
        let expected: Vec<Record> = records.into_iter().filter(|r| r.matches(&pattern)).collect();
        prop_assert_eq!(store.select(pattern).get(), expected);
    }

    #[test]
    fn offset_is_one_indexed_suffix(records in arb_records(), n in 1usize..15) {
        let store = RecordStore::from_records(records.clone());
        let expected: Vec<Record> = records.into_iter().skip(n - 1).collect();
        prop_assert_eq!(store.offset(n).get(), expected);
    }

    #[test]
    fn limit_is_prefix(records in arb_records(), n in 0usize..15) {
        let store = RecordStore::from_records(records.clone());
        let expected: Vec<Record> = records.into_iter().take(n).collect();
        prop_assert_eq!(store.limit(n).get(), expected);
    }

    #[test]
    fn delete_removes_selected_and_keeps_order(
        records in arb_records(),
        pattern in arb_record(),
        n in 0usize..5,
    ) {
        let store = RecordStore::from_records(records.clone());
        let chain = store.select(pattern.clone()).limit(n);

        let mut remaining_matches = n;
        let expected: Vec<Record> = records
            .into_iter()
            .filter(|r| {
                if remaining_matches > 0 && r.matches(&pattern) {
                    remaining_matches -= 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        chain.delete().unwrap();
        prop_assert_eq!(store.get(), expected);
    }

    #[test]
    fn update_touches_only_selected(
        records in arb_records(),
        pattern in arb_record(),
        offset in 1usize..5,
    ) {
        let store = RecordStore::from_records(records.clone());
        let patch = Record::new().with("patched", true);
        store.select(pattern.clone()).offset(offset).update(&patch).unwrap();

        let mut seen = 0usize;
        let expected: Vec<Record> = records
            .into_iter()
            .map(|mut r| {
                if r.matches(&pattern) {
                    seen += 1;
                    if seen >= offset {
                        r.merge(&patch);
                    }
                }
                r
            })
            .collect();

        prop_assert_eq!(store.get(), expected);
    }

    #[test]
    fn deriving_never_changes_parent(records in arb_records(), n in 0usize..5) {
        let store = RecordStore::from_records(records);
        let parent = store.offset(2);
        let before = parent.get();
        let _child = parent.limit(n);
        prop_assert_eq!(parent.stages().len(), 1);
        prop_assert_eq!(parent.get(), before);
    }
}
