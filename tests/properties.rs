use std::collections::HashMap as StdMap;

use proptest::prelude::*;
use quad_hash::HashMap;
use quad_hash::HashTable;
use quad_hash::PutStatus;
use quad_hash::strategy::FnStrategy;
use quad_hash::strategy::HashStrategy;
use quad_hash::strategy::IntHash;
use quad_hash::strategy::StrHash;

#[derive(Clone, Debug)]
enum Op {
    Put(u16, Option<u32>),
    Delete(u16),
    Get(u16),
    Compact,
    Reserve(u8),
    Shrink,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..256u16, any::<Option<u32>>()).prop_map(|(k, v)| Op::Put(k, v)),
        3 => (0..256u16).prop_map(Op::Delete),
        2 => (0..256u16).prop_map(Op::Get),
        1 => Just(Op::Compact),
        1 => any::<u8>().prop_map(Op::Reserve),
        1 => Just(Op::Shrink),
    ]
}

/// Replays `ops` against the table and a std map of
/// `key -> Option<value>`, checking every answer and the bookkeeping.
fn check_against_model<S: HashStrategy<u16>>(
    mut table: HashTable<u16, u32, S>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: StdMap<u16, Option<u32>> = StdMap::new();

    for op in ops {
        match op {
            Op::Put(key, value) => {
                let tombstones = table.tombstones();
                let (slot, status) = table.put(key).unwrap();
                prop_assert_eq!(status.is_inserted(), !model.contains_key(&key));
                if status == PutStatus::InsertedReused {
                    prop_assert!(tombstones > 0);
                }
                prop_assert_eq!(table.key(slot), &key);

                let stored = model.entry(key).or_insert(None);
                prop_assert_eq!(table.value(slot), stored.as_ref());
                if let Some(value) = value {
                    prop_assert_eq!(table.set_value(slot, value), stored.replace(value));
                }
            }
            Op::Delete(key) => {
                let removed = table.remove(&key);
                prop_assert_eq!(removed.map(|(_, v)| v), model.remove(&key));
            }
            Op::Get(key) => {
                let found = table.get(&key).map(|slot| table.value(slot).copied());
                prop_assert_eq!(found, model.get(&key).copied());
            }
            Op::Compact => {
                table.compact().unwrap();
                prop_assert_eq!(table.tombstones(), 0);
            }
            Op::Reserve(additional) => {
                table.reserve(additional as usize);
                prop_assert!(table.upper_bound() >= table.len() + additional as usize);
            }
            Op::Shrink => table.shrink_to_fit(),
        }

        let capacity = table.capacity();
        prop_assert!(capacity == 0 || (capacity.is_power_of_two() && capacity >= 4));
        prop_assert_eq!(table.len(), model.len());
        prop_assert!(table.len() <= table.upper_bound());
        prop_assert!(table.len() + table.tombstones() <= capacity);
    }

    let mut entries: Vec<(u16, Option<u32>)> =
        table.iter().map(|(k, v)| (*k, v.copied())).collect();
    entries.sort_unstable();
    let mut expected: Vec<(u16, Option<u32>)> = model.into_iter().collect();
    expected.sort_unstable();
    prop_assert_eq!(entries, expected);

    Ok(())
}

proptest! {
    #[test]
    fn table_matches_model(ops in prop::collection::vec(op(), 0..400)) {
        check_against_model(HashTable::with_strategy(IntHash), ops)?;
    }

    #[test]
    fn table_matches_model_under_collisions(ops in prop::collection::vec(op(), 0..200)) {
        let strategy = FnStrategy::new(|k: &u16| u64::from(k % 3), |a: &u16, b: &u16| a == b);
        check_against_model(HashTable::with_strategy(strategy), ops)?;
    }

    #[test]
    fn table_matches_model_without_compaction(ops in prop::collection::vec(op(), 0..400)) {
        let mut table = HashTable::with_strategy(IntHash);
        table.set_compaction(false);
        check_against_model(table, ops)?;
    }

    #[test]
    fn get_twice_gives_same_slot(keys in prop::collection::hash_set("[a-z]{0,8}", 0..64)) {
        let mut table: HashTable<String, (), StrHash> = HashTable::new();
        for key in &keys {
            table.put(key.clone()).unwrap();
        }
        for key in &keys {
            let first = table.get(key.as_str());
            prop_assert!(first.is_some());
            prop_assert_eq!(first, table.get(key.as_str()));
        }
        prop_assert_eq!(table.len(), keys.len());
    }

    #[test]
    fn map_collects_last_value(pairs in prop::collection::vec((any::<u8>(), any::<i64>()), 0..200)) {
        let map: HashMap<u8, i64, IntHash> = pairs.iter().copied().collect();
        let model: StdMap<u8, i64> = pairs.iter().copied().collect();

        prop_assert_eq!(map.len(), model.len());
        for (key, value) in &model {
            prop_assert_eq!(map.get(key), Some(value));
        }
    }
}
