use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::cell::Cell;

use quad_hash::HashMap;
use quad_hash::HashTable;
use quad_hash::PutStatus;
use quad_hash::TryReserveError;
use quad_hash::strategy::IntHash;

const DISARMED: bool = false;
const ARMED: bool = true;

thread_local! {
    static FAIL_ALLOC: Cell<bool> = const { Cell::new(DISARMED) };
}

/// Delegates to the system allocator unless the current thread has armed
/// it, in which case every allocation returns null.
struct FailingAlloc;

unsafe impl GlobalAlloc for FailingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if FAIL_ALLOC.try_with(Cell::get).unwrap_or(DISARMED) {
            return std::ptr::null_mut();
        }
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static ALLOC: FailingAlloc = FailingAlloc;

/// Runs `f` with allocation failing on this thread. Assertions belong after
/// the call, since a failed assertion allocates.
fn with_failing_alloc<T>(f: impl FnOnce() -> T) -> T {
    FAIL_ALLOC.with(|fail| fail.set(ARMED));
    let result = f();
    FAIL_ALLOC.with(|fail| fail.set(DISARMED));
    result
}

fn full_table() -> HashTable<u64, u64, IntHash> {
    let mut table = HashTable::with_strategy(IntHash);
    table.reserve(20);
    for k in 0..table.upper_bound() as u64 {
        let (slot, _) = table.put(k).unwrap();
        table.set_value(slot, k * 10);
    }
    assert_eq!(table.len(), table.upper_bound());
    table
}

#[test]
fn failed_growth_leaves_table_usable() {
    let mut table = full_table();
    let capacity = table.capacity();
    let len = table.len();
    let first = table.get(&0).unwrap();

    let result = with_failing_alloc(|| table.put(1000));
    assert!(matches!(result, Err(TryReserveError::AllocError { .. })));

    assert_eq!(table.len(), len);
    assert_eq!(table.capacity(), capacity);
    assert!(table.get(&1000).is_none());
    assert_eq!(table.value(first), Some(&0));
    for k in 0..len as u64 {
        let slot = table.get(&k).unwrap();
        assert_eq!(table.value(slot), Some(&(k * 10)));
    }

    let (slot, status) = table.put(1000).unwrap();
    assert_eq!(status, PutStatus::InsertedFresh);
    table.set_value(slot, 7);
    assert!(table.capacity() > capacity);
    assert_eq!(table.len(), len + 1);
    for k in 0..len as u64 {
        assert!(table.contains_key(&k));
    }
}

#[test]
fn existing_key_never_allocates() {
    let mut table = full_table();

    let result = with_failing_alloc(|| table.put(3));
    let (slot, status) = result.unwrap();
    assert_eq!(status, PutStatus::Existing);
    assert_eq!(table.value(slot), Some(&30));
}

#[test]
fn failed_compaction_still_inserts() {
    let mut table: HashTable<u64, u64, IntHash> = HashTable::with_strategy(IntHash);
    table.reserve(1);
    let capacity = table.capacity();
    let bound = table.upper_bound();
    assert!(bound < capacity);

    // Small keys hash to their own bucket, so the last bucket stays unused.
    for k in 0..bound as u64 {
        table.put(k).unwrap();
    }
    let slot = table.get(&0).unwrap();
    table.delete(slot);

    let last = capacity as u64 - 1;
    let result = with_failing_alloc(|| table.put(last));
    let (slot, status) = result.unwrap();
    assert_eq!(status, PutStatus::InsertedFresh);
    assert_eq!(table.key(slot), &last);
    assert_eq!(table.capacity(), capacity);
    assert_eq!(table.tombstones(), 1);
    assert_eq!(table.len(), bound);
}

#[test]
fn failed_reserve_changes_nothing() {
    let mut table = full_table();
    let capacity = table.capacity();
    let first = table.get(&1).unwrap();

    let result = with_failing_alloc(|| table.try_reserve(100));
    assert!(matches!(result, Err(TryReserveError::AllocError { .. })));

    assert_eq!(table.capacity(), capacity);
    assert_eq!(table.key(first), &1);
    table.try_reserve(100).unwrap();
    assert!(table.upper_bound() >= table.len() + 100);
}

#[test]
fn map_try_insert_reports_failure() {
    let mut map: HashMap<u64, u64, IntHash> = HashMap::with_capacity_and_strategy(20, IntHash);
    let bound = map.as_table().upper_bound() as u64;
    for k in 0..bound {
        map.insert(k, k);
    }

    let result = with_failing_alloc(|| map.try_insert(1000, 1));
    assert!(matches!(result, Err(TryReserveError::AllocError { .. })));

    assert_eq!(map.len(), bound as usize);
    assert_eq!(map.get(&1000), None);
    assert_eq!(map.get(&5), Some(&5));
    assert_eq!(map.try_insert(1000, 1), Ok(None));
    assert_eq!(map.get(&1000), Some(&1));
}
