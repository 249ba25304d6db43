//! The open-addressing table with a slot-based, two-phase insertion API.
//!
//! [`HashTable::put`] places a key and reports where it landed and how;
//! the value is written separately through the returned [`Slot`]. Slots are
//! cheap handles that stay valid until the next rehash.

use core::borrow::Borrow;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;

use crate::error::TryReserveError;
use crate::probe::ProbeSeq;
use crate::raw::DELETED;
use crate::raw::EMPTY;
use crate::raw::OCCUPIED;
use crate::raw::RawSlots;
use crate::raw::VALUE_SET;
use crate::raw::has_value;
use crate::raw::is_occupied;
use crate::strategy::HashStrategy;

/// Smallest non-zero bucket count.
const MIN_BUCKETS: usize = 4;

cfg_if::cfg_if! {
    if #[cfg(feature = "load-factor-fifty")] {
        const LOAD_FACTOR_PERCENT: u128 = 50;
    } else if #[cfg(feature = "load-factor-ninety")] {
        const LOAD_FACTOR_PERCENT: u128 = 90;
    } else {
        const LOAD_FACTOR_PERCENT: u128 = 77;
    }
}

/// Number of live keys a table with `buckets` buckets may hold.
#[inline(always)]
fn upper_bound(buckets: usize) -> usize {
    ((buckets as u128 * LOAD_FACTOR_PERCENT) / 100) as usize
}

/// Smallest valid bucket count whose upper bound admits `required` keys.
fn buckets_for(required: usize) -> Result<usize, TryReserveError> {
    if required == 0 {
        return Ok(0);
    }

    let mut buckets = required
        .checked_next_power_of_two()
        .ok_or(TryReserveError::CapacityOverflow)?
        .max(MIN_BUCKETS);
    while upper_bound(buckets) < required {
        buckets = buckets
            .checked_mul(2)
            .ok_or(TryReserveError::CapacityOverflow)?;
    }
    Ok(buckets)
}

/// A handle to one bucket of a [`HashTable`].
///
/// Slots are returned by [`HashTable::put`], [`HashTable::get`] and
/// [`HashTable::slots`]. A slot is only meaningful for the table that issued
/// it, and only until that table rehashes: any `put` that grows the table,
/// an automatic or explicit compaction, [`HashTable::reserve`],
/// [`HashTable::shrink_to_fit`] and [`HashTable::clear`] all invalidate
/// outstanding slots. Using an invalidated slot panics instead of touching
/// the wrong bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    index: usize,
    generation: u32,
}

impl Slot {
    /// The bucket index this slot refers to.
    pub fn index(self) -> usize {
        self.index
    }
}

/// How [`HashTable::put`] placed a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PutStatus {
    /// The key was already present. Its stored key and value are untouched.
    Existing,
    /// The key went into a bucket that had never been used.
    InsertedFresh,
    /// The key went into a bucket recovered from a deleted entry.
    InsertedReused,
}

impl PutStatus {
    /// Returns `true` for both insertion statuses.
    pub fn is_inserted(self) -> bool {
        !matches!(self, PutStatus::Existing)
    }
}

enum InsertTarget {
    Existing(usize),
    Vacant { index: usize, reused: bool },
}

/// Debug statistics for hash table analysis.
///
/// Only available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live keys
    pub populated: usize,
    /// Number of keys with a written value
    pub valued: usize,
    /// Number of deleted buckets waiting to be reused or compacted
    pub tombstones: usize,
    /// Total number of buckets
    pub buckets: usize,
    /// Maximum number of live keys before the table grows
    pub upper_bound: usize,
    /// Load factor (populated / buckets)
    pub load_factor: f64,
    /// Fraction of buckets that are tombstones
    pub tombstone_ratio: f64,
    /// Mean number of extra probes needed to reach a live key
    pub mean_probe_length: f64,
    /// Longest probe sequence needed to reach a live key
    pub max_probe_length: usize,
    /// Total memory in bytes used by the bucket arrays
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} buckets ({:.2}% load factor, growth at {})",
            self.populated,
            self.buckets,
            self.load_factor * 100.0,
            self.upper_bound
        );
        println!("Values written: {}", self.valued);
        println!(
            "Tombstones: {} ({:.2}% of buckets)",
            self.tombstones,
            self.tombstone_ratio * 100.0
        );
        println!(
            "Probe length: mean {:.3}, max {}",
            self.mean_probe_length, self.max_probe_length
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// Number of individually counted probe lengths in a [`ProbeHistogram`].
#[cfg(any(test, feature = "stats"))]
pub const PROBE_HISTOGRAM_BINS: usize = 16;

/// Distribution of probe lengths over the live keys of a table.
///
/// `bins[n]` counts keys found after `n` extra probes past their home
/// bucket, for `n < PROBE_HISTOGRAM_BINS`; the final bin counts everything
/// longer.
///
/// Only available with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// Counts per probe length, plus a final overflow bin.
    pub bins: alloc::vec::Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Total number of keys counted.
    pub fn entries(&self) -> usize {
        self.bins.iter().sum()
    }

    /// Pretty-prints the histogram horizontally using stdout.
    ///
    /// Each row corresponds to a probe length, plus a `++` row for longer
    /// sequences.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = *self.bins.iter().max().unwrap_or(&0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!("probe histogram ({} entries):", self.entries());

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            // Partial blocks, one eighth at a time.
            const PARTIAL: [char; 8] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉'];
            if units % 8 > 0 {
                bar.push(PARTIAL[units % 8]);
            }
            bar
        };

        for (i, &count) in self.bins.iter().take(PROBE_HISTOGRAM_BINS).enumerate() {
            println!("{:>2} | {} ({})", i, make_bar(count), count);
        }

        let long = self.bins[PROBE_HISTOGRAM_BINS];
        println!("++ | {} ({})", make_bar(long), long);
    }
}

/// An open-addressing hash table with quadratic probing and tombstones.
///
/// `HashTable<K, V, S>` maps keys of type `K` to values of type `V`, with
/// hashing and equality supplied by the strategy `S`. Buckets live in one
/// allocation of three parallel arrays (flags, keys, values) whose length is
/// always zero or a power of two of at least 4.
///
/// Insertion is two-phase. [`put`] stores the key and returns a [`Slot`] and
/// a [`PutStatus`]; the value cell of a newly inserted key stays unwritten
/// until [`set_value`] is called, and [`value`] reports it as `None` until
/// then. An existing key's value is never touched by `put`.
///
/// Deletion leaves a tombstone. Lookups probe past tombstones and stop at
/// the first never-used bucket; insertions reuse the first tombstone on the
/// key's probe path.
///
/// ## Example
///
/// ```rust
/// use quad_hash::HashTable;
/// use quad_hash::PutStatus;
/// use quad_hash::strategy::StrHash;
///
/// let mut table: HashTable<&str, &str, StrHash> = HashTable::new();
///
/// let (slot, status) = table.put("key1").unwrap();
/// assert_eq!(status, PutStatus::InsertedFresh);
/// table.set_value(slot, "val1");
///
/// let slot = table.get("key1").unwrap();
/// assert_eq!(table.value(slot), Some(&"val1"));
/// assert!(table.get("foo").is_none());
///
/// table.delete(slot);
/// assert!(table.get("key1").is_none());
/// ```
///
/// [`put`]: HashTable::put
/// [`set_value`]: HashTable::set_value
/// [`value`]: HashTable::value
pub struct HashTable<K, V, S> {
    slots: RawSlots<K, V>,

    populated: usize,
    tombstones: usize,
    max_pop: usize,
    generation: u32,
    compact_tombstones: bool,

    strategy: S,
}

impl<K, V, S> Debug for HashTable<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Clone for HashTable<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        let mut slots = TryReserveError::unwrap_infallible(RawSlots::try_with_buckets(
            self.slots.buckets(),
        ));

        for (index, &flag) in self.slots.flags().iter().enumerate() {
            if flag == EMPTY {
                continue;
            }

            // SAFETY: Both arrays have the same bucket count, so `index` is in
            // bounds for each. Cells are read only where the source flag says
            // they are initialized, and the destination flag is written after
            // its cells.
            unsafe {
                if is_occupied(flag) {
                    slots.write_key(index, self.slots.key(index).clone());
                    if has_value(flag) {
                        slots.write_value(index, self.slots.value(index).clone());
                    }
                }
                slots.set_flag(index, flag);
            }
        }

        Self {
            slots,
            populated: self.populated,
            tombstones: self.tombstones,
            max_pop: self.max_pop,
            generation: self.generation,
            compact_tombstones: self.compact_tombstones,
            strategy: self.strategy.clone(),
        }
    }
}

impl<K, V, S: Default> Default for HashTable<K, V, S> {
    fn default() -> Self {
        Self::with_strategy(S::default())
    }
}

impl<K, V, S: Default> HashTable<K, V, S> {
    /// Creates an empty table using the strategy's default value.
    ///
    /// Nothing is allocated until the first insertion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table that can hold at least `capacity` keys without
    /// growing.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`] if the allocation fails.
    ///
    /// [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_strategy(capacity, S::default())
    }
}

impl<K, V, S> HashTable<K, V, S> {
    /// Creates an empty table with the given strategy.
    ///
    /// Nothing is allocated until the first insertion.
    pub const fn with_strategy(strategy: S) -> Self {
        Self {
            slots: RawSlots::unallocated(),
            populated: 0,
            tombstones: 0,
            max_pop: 0,
            generation: 0,
            compact_tombstones: true,
            strategy,
        }
    }

    /// Creates a table with the given strategy that can hold at least
    /// `capacity` keys without growing.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`] if the allocation fails.
    ///
    /// [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
    pub fn with_capacity_and_strategy(capacity: usize, strategy: S) -> Self {
        TryReserveError::unwrap_infallible(Self::try_with_capacity_and_strategy(
            capacity, strategy,
        ))
    }

    /// Fallible version of [`HashTable::with_capacity_and_strategy`].
    pub fn try_with_capacity_and_strategy(
        capacity: usize,
        strategy: S,
    ) -> Result<Self, TryReserveError> {
        let buckets = buckets_for(capacity)?;
        let slots = RawSlots::try_with_buckets(buckets)?;

        Ok(Self {
            slots,
            populated: 0,
            tombstones: 0,
            max_pop: upper_bound(buckets),
            generation: 0,
            compact_tombstones: true,
            strategy,
        })
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    /// Returns the number of buckets: zero or a power of two.
    ///
    /// ```rust
    /// use quad_hash::HashTable;
    /// use quad_hash::strategy::IntHash;
    ///
    /// let mut table: HashTable<u32, (), IntHash> = HashTable::new();
    /// assert_eq!(table.capacity(), 0);
    /// table.put(1).unwrap();
    /// assert_eq!(table.capacity(), 4);
    /// ```
    pub fn capacity(&self) -> usize {
        self.slots.buckets()
    }

    /// Returns the number of live keys the current buckets can hold before
    /// the next insertion grows the table.
    pub fn upper_bound(&self) -> usize {
        self.max_pop
    }

    /// Returns the number of deleted buckets not yet reused or compacted.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Returns the table's hash/equality strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Enables or disables compaction of tombstones.
    ///
    /// When enabled (the default), an insertion into a never-used bucket that
    /// finds live keys plus tombstones at the upper bound first rebuilds the
    /// buckets at the same capacity, dropping every tombstone. Reusing a
    /// tombstone never triggers a rebuild. When disabled, tombstones are only
    /// cleared by growth or an explicit [`HashTable::compact`].
    pub fn set_compaction(&mut self, enabled: bool) {
        self.compact_tombstones = enabled;
    }

    /// Returns whether automatic tombstone compaction is enabled.
    pub fn compaction(&self) -> bool {
        self.compact_tombstones
    }

    #[inline(always)]
    fn slot_at(&self, index: usize) -> Slot {
        Slot {
            index,
            generation: self.generation,
        }
    }

    /// Validates `slot` and returns its bucket index.
    #[inline]
    #[track_caller]
    fn live_index(&self, slot: Slot) -> usize {
        assert!(
            slot.generation == self.generation,
            "slot {} was issued before the table was rehashed",
            slot.index
        );
        let flag = self.slots.flags().get(slot.index).copied().unwrap_or(EMPTY);
        assert!(is_occupied(flag), "slot {} does not hold a live key", slot.index);
        slot.index
    }

    /// Returns the key stored at `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is stale or does not hold a live key.
    #[track_caller]
    pub fn key(&self, slot: Slot) -> &K {
        let index = self.live_index(slot);
        // SAFETY: `live_index` checked bounds and that the bucket is occupied.
        unsafe { self.slots.key(index) }
    }

    /// Returns the value stored at `slot`, or `None` if no value has been
    /// written since the key was inserted.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is stale or does not hold a live key.
    #[track_caller]
    pub fn value(&self, slot: Slot) -> Option<&V> {
        let index = self.live_index(slot);
        // SAFETY: `live_index` checked bounds; the value cell is read only
        // when its flag says it was written.
        unsafe { has_value(self.slots.flag(index)).then(|| self.slots.value(index)) }
    }

    /// Mutable version of [`HashTable::value`].
    ///
    /// # Panics
    ///
    /// Panics if `slot` is stale or does not hold a live key.
    #[track_caller]
    pub fn value_mut(&mut self, slot: Slot) -> Option<&mut V> {
        let index = self.live_index(slot);
        // SAFETY: As in `value`.
        unsafe {
            if has_value(self.slots.flag(index)) {
                Some(self.slots.value_mut(index))
            } else {
                None
            }
        }
    }

    /// Writes the value at `slot`, returning the value it replaces if one
    /// had been written.
    ///
    /// This is the second phase of an insertion: after [`HashTable::put`]
    /// reports [`PutStatus::InsertedFresh`] or [`PutStatus::InsertedReused`],
    /// the slot has no value until this is called.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is stale or does not hold a live key.
    #[track_caller]
    pub fn set_value(&mut self, slot: Slot, value: V) -> Option<V> {
        let index = self.live_index(slot);
        // SAFETY: `live_index` checked bounds and occupancy. An unwritten cell
        // is written and flagged; a written one is swapped in place.
        unsafe {
            let flag = self.slots.flag(index);
            if has_value(flag) {
                Some(core::mem::replace(self.slots.value_mut(index), value))
            } else {
                self.slots.write_value(index, value);
                self.slots.set_flag(index, flag | VALUE_SET);
                None
            }
        }
    }

    /// Moves the value out of `slot`, leaving the key in place with no
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is stale or does not hold a live key.
    #[track_caller]
    pub fn take_value(&mut self, slot: Slot) -> Option<V> {
        let index = self.live_index(slot);
        // SAFETY: `live_index` checked bounds and occupancy; the flag is
        // cleared together with the move.
        unsafe {
            let flag = self.slots.flag(index);
            if !has_value(flag) {
                return None;
            }
            self.slots.set_flag(index, flag & !VALUE_SET);
            Some(self.slots.take_value(index))
        }
    }

    /// Deletes the entry at `slot` and hands back its key and value.
    ///
    /// The bucket becomes a tombstone: later lookups probe past it and a
    /// later insertion may reuse it. The capacity never shrinks here.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is stale or does not hold a live key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use quad_hash::HashTable;
    /// use quad_hash::PutStatus;
    /// use quad_hash::strategy::StrHash;
    ///
    /// let mut table: HashTable<&str, u32, StrHash> = HashTable::new();
    /// let (slot, _) = table.put("k").unwrap();
    /// table.set_value(slot, 1);
    ///
    /// assert_eq!(table.delete(slot), ("k", Some(1)));
    /// assert_eq!(table.tombstones(), 1);
    ///
    /// let (slot, status) = table.put("k").unwrap();
    /// assert_eq!(status, PutStatus::InsertedReused);
    /// assert_eq!(table.value(slot), None);
    /// ```
    #[track_caller]
    pub fn delete(&mut self, slot: Slot) -> (K, Option<V>) {
        let index = self.live_index(slot);
        // SAFETY: `live_index` checked bounds and occupancy. Both cells are
        // moved out before the bucket is marked deleted.
        let entry = unsafe {
            let flag = self.slots.flag(index);
            let value = if has_value(flag) {
                Some(self.slots.take_value(index))
            } else {
                None
            };
            let key = self.slots.take_key(index);
            self.slots.set_flag(index, DELETED);
            (key, value)
        };

        self.populated -= 1;
        self.tombstones += 1;
        entry
    }

    /// Removes every entry, keeping the allocated buckets.
    ///
    /// All keys and written values are dropped and all tombstones cleared.
    /// Outstanding slots are invalidated.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.populated = 0;
        self.tombstones = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Returns an iterator over all live keys and their values, in bucket
    /// order.
    ///
    /// Keys whose value has not been written yet are yielded with `None`.
    ///
    /// ```rust
    /// use quad_hash::HashTable;
    /// use quad_hash::strategy::IntHash;
    ///
    /// let mut table: HashTable<u32, &str, IntHash> = HashTable::new();
    /// let (slot, _) = table.put(1).unwrap();
    /// table.set_value(slot, "one");
    /// table.put(2).unwrap();
    ///
    /// let mut entries: Vec<_> = table.iter().collect();
    /// entries.sort();
    /// assert_eq!(entries, [(&1, Some(&"one")), (&2, None)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: &self.slots,
            index: 0,
            remaining: self.populated,
        }
    }

    /// Returns an iterator over all live keys with mutable access to their
    /// values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            remaining: self.populated,
            slots: &mut self.slots,
            index: 0,
            _marker: PhantomData,
        }
    }

    /// Returns an iterator over all live keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the written values. Keys without a value are
    /// skipped.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over the slots of all live keys.
    ///
    /// The slots stay valid for as long as the iterator borrows the table;
    /// collecting them and mutating the table afterwards follows the usual
    /// slot invalidation rules.
    pub fn slots(&self) -> Slots<'_, K, V, S> {
        Slots {
            table: self,
            index: 0,
            remaining: self.populated,
        }
    }

    /// Returns an iterator that removes and yields every entry.
    ///
    /// After the iterator is dropped the table is empty, keeps its capacity,
    /// and has no tombstones. Entries not yet yielded when the iterator is
    /// dropped are dropped with it.
    pub fn drain(&mut self) -> Drain<'_, K, V, S> {
        Drain {
            table: self,
            index: 0,
        }
    }
}

impl<K, V, S> HashTable<K, V, S> {
    /// Looks up `key` and returns its slot, or `None` if it is absent.
    ///
    /// Never mutates the table.
    ///
    /// ```rust
    /// use quad_hash::HashTable;
    /// use quad_hash::strategy::StrHash;
    ///
    /// let mut table: HashTable<String, u32, StrHash> = HashTable::new();
    /// let (slot, _) = table.put("answer".to_string()).unwrap();
    /// table.set_value(slot, 42);
    ///
    /// let slot = table.get("answer").unwrap();
    /// assert_eq!(table.value(slot), Some(&42));
    /// assert_eq!(table.get("question"), None);
    /// ```
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<Slot>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        if self.populated == 0 {
            return None;
        }

        let hash = self.strategy.hash(key);
        self.find_index(hash, key).map(|index| self.slot_at(index))
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        self.get(key).is_some()
    }

    /// Looks up `key` and deletes it, returning the stored key and value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(K, Option<V>)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        let slot = self.get(key)?;
        Some(self.delete(slot))
    }

    fn find_index<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        for index in ProbeSeq::new(hash, self.slots.mask()) {
            // SAFETY: Probe indices are masked to the bucket count.
            let flag = unsafe { self.slots.flag(index) };
            if flag == EMPTY {
                return None;
            }
            if flag == DELETED {
                continue;
            }

            // SAFETY: The bucket is occupied, so its key is initialized.
            let stored = unsafe { self.slots.key(index) };
            if self.strategy.equals(stored.borrow(), key) {
                return Some(index);
            }
        }

        None
    }
}

impl<K, V, S> HashTable<K, V, S>
where
    S: HashStrategy<K>,
{
    /// Inserts `key` if it is not already present.
    ///
    /// Returns the slot holding the key and a status:
    ///
    /// - [`PutStatus::Existing`]: the key was present. The stored key and
    ///   value are untouched and the `key` argument is dropped.
    /// - [`PutStatus::InsertedFresh`]: the key went into a never-used bucket.
    /// - [`PutStatus::InsertedReused`]: the key went into a tombstone.
    ///
    /// A newly inserted key has no value until [`HashTable::set_value`] is
    /// called with the returned slot.
    ///
    /// Inserting may first grow the table, or rebuild it at the same
    /// capacity to clear tombstones; either invalidates all previously
    /// returned slots.
    ///
    /// # Errors
    ///
    /// Returns an error if the table had to grow and the new buckets could
    /// not be allocated. The table is unchanged and remains usable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use quad_hash::HashTable;
    /// use quad_hash::PutStatus;
    /// use quad_hash::strategy::StrHash;
    ///
    /// let mut table: HashTable<&str, u32, StrHash> = HashTable::new();
    ///
    /// let (slot, status) = table.put("hits").unwrap();
    /// assert_eq!(status, PutStatus::InsertedFresh);
    /// table.set_value(slot, 1);
    ///
    /// let (slot, status) = table.put("hits").unwrap();
    /// assert_eq!(status, PutStatus::Existing);
    /// *table.value_mut(slot).unwrap() += 1;
    /// assert_eq!(table.value(slot), Some(&2));
    /// ```
    pub fn put(&mut self, key: K) -> Result<(Slot, PutStatus), TryReserveError> {
        let hash = self.strategy.hash(&key);

        let mut target = self.find_or_vacant(hash, &key);
        let needs_room = match target {
            Some(InsertTarget::Existing(_)) => None,
            Some(InsertTarget::Vacant { reused, .. }) => Some(!reused),
            None => Some(true),
        };
        if let Some(fresh) = needs_room {
            if self.reserve_for_insert(fresh)? {
                target = self.find_or_vacant(hash, &key);
            }
        }

        loop {
            match target {
                Some(InsertTarget::Existing(index)) => {
                    return Ok((self.slot_at(index), PutStatus::Existing));
                }
                Some(InsertTarget::Vacant { index, reused }) => {
                    // SAFETY: `index` came from the probe sequence and the
                    // bucket is empty or deleted, so its key cell is free.
                    unsafe {
                        self.slots.write_key(index, key);
                        self.slots.set_flag(index, OCCUPIED);
                    }
                    self.populated += 1;
                    if reused {
                        self.tombstones -= 1;
                    }

                    let status = if reused {
                        PutStatus::InsertedReused
                    } else {
                        PutStatus::InsertedFresh
                    };
                    return Ok((self.slot_at(index), status));
                }
                None => {
                    // Only reachable with no free bucket on the probe path,
                    // which the upper bound rules out once buckets exist.
                    let buckets = buckets_for(self.populated + 1)?.max(self.capacity() * 2);
                    self.rehash_into(buckets)?;
                    target = self.find_or_vacant(hash, &key);
                }
            }
        }
    }

    /// Probes for `key`, remembering the first tombstone on the way.
    fn find_or_vacant(&self, hash: u64, key: &K) -> Option<InsertTarget> {
        let mut first_deleted = None;

        for index in ProbeSeq::new(hash, self.slots.mask()) {
            // SAFETY: Probe indices are masked to the bucket count.
            let flag = unsafe { self.slots.flag(index) };
            if flag == EMPTY {
                return Some(match first_deleted {
                    Some(index) => InsertTarget::Vacant {
                        index,
                        reused: true,
                    },
                    None => InsertTarget::Vacant {
                        index,
                        reused: false,
                    },
                });
            }
            if flag == DELETED {
                first_deleted = first_deleted.or(Some(index));
                continue;
            }

            // SAFETY: The bucket is occupied, so its key is initialized.
            if self.strategy.equals(unsafe { self.slots.key(index) }, key) {
                return Some(InsertTarget::Existing(index));
            }
        }

        first_deleted.map(|index| InsertTarget::Vacant {
            index,
            reused: true,
        })
    }

    /// Makes room for one more key. `fresh` is set when the key would land in
    /// a never-used bucket; reusing a tombstone never needs compaction.
    /// Returns `true` if the buckets were rebuilt, which moves every entry.
    fn reserve_for_insert(&mut self, fresh: bool) -> Result<bool, TryReserveError> {
        let required = self.populated + 1;
        if required > self.max_pop {
            self.rehash_into(buckets_for(required)?)?;
            return Ok(true);
        }

        if fresh && self.compact_tombstones && required + self.tombstones > self.max_pop {
            // A failed compaction is harmless: the upper bound still leaves a
            // free bucket for this insertion.
            return Ok(self.rehash_into(self.capacity()).is_ok());
        }

        Ok(false)
    }

    /// Moves every live entry into freshly allocated buckets.
    ///
    /// On allocation failure nothing has been touched.
    #[cold]
    fn rehash_into(&mut self, buckets: usize) -> Result<(), TryReserveError> {
        debug_assert!(upper_bound(buckets) >= self.populated);

        let mut new_slots = RawSlots::try_with_buckets(buckets)?;
        let mask = new_slots.mask();

        if self.populated > 0 {
            for index in 0..self.slots.buckets() {
                // SAFETY: `index` is below the old bucket count and cells are
                // read only when the old flag marks them initialized. Each
                // entry's cells are moved into an empty new bucket, then the
                // old bucket is marked empty so it is neither read nor dropped
                // again.
                unsafe {
                    let flag = self.slots.flag(index);
                    if !is_occupied(flag) {
                        continue;
                    }

                    let hash = self.strategy.hash(self.slots.key(index));
                    let Some(target) =
                        ProbeSeq::new(hash, mask).find(|&i| new_slots.flag(i) == EMPTY)
                    else {
                        unreachable!("rehash target has more buckets than live keys");
                    };

                    new_slots.write_key(target, self.slots.take_key(index));
                    if has_value(flag) {
                        new_slots.write_value(target, self.slots.take_value(index));
                    }
                    new_slots.set_flag(target, flag);
                    self.slots.set_flag(index, EMPTY);
                }
            }
        }

        self.slots = new_slots;
        self.tombstones = 0;
        self.max_pop = upper_bound(buckets);
        self.generation = self.generation.wrapping_add(1);
        Ok(())
    }

    /// Reserves room for at least `additional` more keys.
    ///
    /// # Panics
    ///
    /// Panics if the bucket count overflows; aborts through
    /// [`handle_alloc_error`] if the allocation fails.
    ///
    /// [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
    pub fn reserve(&mut self, additional: usize) {
        TryReserveError::unwrap_infallible(self.try_reserve(additional));
    }

    /// Reserves room for at least `additional` more keys, reporting failure
    /// instead of aborting.
    ///
    /// Growing rehashes the table and invalidates outstanding slots. On error
    /// the table is unchanged.
    ///
    /// ```rust
    /// use quad_hash::HashTable;
    /// use quad_hash::TryReserveError;
    /// use quad_hash::strategy::IntHash;
    ///
    /// let mut table: HashTable<u64, u64, IntHash> = HashTable::new();
    /// table.try_reserve(100).unwrap();
    /// assert!(table.upper_bound() >= 100);
    ///
    /// assert_eq!(
    ///     table.try_reserve(usize::MAX),
    ///     Err(TryReserveError::CapacityOverflow)
    /// );
    /// ```
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let required = self
            .populated
            .checked_add(additional)
            .ok_or(TryReserveError::CapacityOverflow)?;
        if required > self.max_pop {
            self.rehash_into(buckets_for(required)?)?;
        }
        Ok(())
    }

    /// Rebuilds the buckets at the current capacity, dropping all
    /// tombstones.
    ///
    /// Does nothing if there are no tombstones. Invalidates outstanding
    /// slots otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement buckets could not be allocated;
    /// the table is unchanged.
    pub fn compact(&mut self) -> Result<(), TryReserveError> {
        if self.tombstones == 0 {
            return Ok(());
        }
        self.rehash_into(self.capacity())
    }

    /// Shrinks the buckets to the smallest count that holds the current
    /// keys.
    ///
    /// An empty table releases its allocation entirely. Shrinking is best
    /// effort: if the smaller buckets cannot be allocated the table keeps its
    /// current ones.
    pub fn shrink_to_fit(&mut self) {
        if self.populated == 0 {
            if self.capacity() != 0 {
                self.slots = RawSlots::unallocated();
                self.tombstones = 0;
                self.max_pop = 0;
                self.generation = self.generation.wrapping_add(1);
            }
            return;
        }

        if let Ok(buckets) = buckets_for(self.populated)
            && buckets < self.capacity()
        {
            self.rehash_into(buckets).ok();
        }
    }

    /// Counts, for every live key, how many probes past its home bucket it
    /// sits.
    ///
    /// Only available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mut bins = alloc::vec![0usize; PROBE_HISTOGRAM_BINS + 1];
        for distance in self.probe_distances() {
            bins[distance.min(PROBE_HISTOGRAM_BINS)] += 1;
        }
        ProbeHistogram { bins }
    }

    /// Returns detailed utilization statistics for debugging.
    ///
    /// Only available with the `stats` feature.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let buckets = self.capacity();
        let valued = self
            .slots
            .flags()
            .iter()
            .filter(|&&flag| is_occupied(flag) && has_value(flag))
            .count();

        let (total_distance, max_probe_length) = self
            .probe_distances()
            .fold((0usize, 0usize), |(sum, max), d| (sum + d, max.max(d)));

        let ratio = |n: usize, d: usize| if d == 0 { 0.0 } else { n as f64 / d as f64 };

        DebugStats {
            populated: self.populated,
            valued,
            tombstones: self.tombstones,
            buckets,
            upper_bound: self.max_pop,
            load_factor: ratio(self.populated, buckets),
            tombstone_ratio: ratio(self.tombstones, buckets),
            mean_probe_length: ratio(total_distance, self.populated),
            max_probe_length,
            total_bytes: self.slots.allocation_size(),
        }
    }

    #[cfg(any(test, feature = "stats"))]
    fn probe_distances(&self) -> impl Iterator<Item = usize> + '_ {
        let mask = self.slots.mask();
        self.slots
            .flags()
            .iter()
            .enumerate()
            .filter(|(_, flag)| is_occupied(**flag))
            .map(move |(index, _)| {
                // SAFETY: The bucket is occupied, so its key is initialized.
                let hash = self.strategy.hash(unsafe { self.slots.key(index) });
                ProbeSeq::new(hash, mask)
                    .position(|i| i == index)
                    .unwrap_or(usize::MAX)
            })
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashTable<K, V, S> {
    type Item = (&'a K, Option<&'a V>);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut HashTable<K, V, S> {
    type Item = (&'a K, Option<&'a mut V>);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// An iterator over the live entries of a [`HashTable`].
///
/// This struct is created by the [`iter`] method on [`HashTable`]. It
/// yields `(&K, Option<&V>)` pairs in bucket order, which is unrelated to
/// insertion order.
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, K, V> {
    slots: &'a RawSlots<K, V>,
    index: usize,
    remaining: usize,
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots,
            index: self.index,
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, Option<&'a V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let slots = self.slots;
        while self.index < slots.buckets() {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is below the bucket count; cells are read only
            // where the flag marks them initialized.
            unsafe {
                let flag = slots.flag(index);
                if is_occupied(flag) {
                    self.remaining -= 1;
                    let value = has_value(flag).then(|| slots.value(index));
                    return Some((slots.key(index), value));
                }
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the live entries of a [`HashTable`].
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, K, V> {
    slots: &'a mut RawSlots<K, V>,
    index: usize,
    remaining: usize,
    _marker: PhantomData<(&'a K, &'a mut V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, Option<&'a mut V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        while self.index < self.slots.buckets() {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is below the bucket count and cells are read
            // only where the flag marks them initialized. Every bucket is
            // visited once, so the references handed out never alias, and the
            // iterator holds the table's exclusive borrow for `'a`.
            unsafe {
                let flag = self.slots.flag(index);
                if is_occupied(flag) {
                    self.remaining -= 1;
                    let key = &*(self.slots.key(index) as *const K);
                    let value = if has_value(flag) {
                        Some(&mut *(self.slots.value_mut(index) as *mut V))
                    } else {
                        None
                    };
                    return Some((key, value));
                }
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the live keys of a [`HashTable`].
///
/// This struct is created by the [`keys`] method on [`HashTable`].
///
/// [`keys`]: HashTable::keys
#[derive(Clone)]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the written values of a [`HashTable`].
///
/// This struct is created by the [`values`] method on [`HashTable`].
///
/// [`values`]: HashTable::values
#[derive(Clone)]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find_map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

impl<K, V> FusedIterator for Values<'_, K, V> {}

/// An iterator over the slots of the live keys of a [`HashTable`].
///
/// This struct is created by the [`slots`] method on [`HashTable`].
///
/// [`slots`]: HashTable::slots
pub struct Slots<'a, K, V, S> {
    table: &'a HashTable<K, V, S>,
    index: usize,
    remaining: usize,
}

impl<K, V, S> Iterator for Slots<'_, K, V, S> {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        if self.remaining == 0 {
            return None;
        }

        let flags = self.table.slots.flags();
        while let Some(&flag) = flags.get(self.index) {
            let index = self.index;
            self.index += 1;
            if is_occupied(flag) {
                self.remaining -= 1;
                return Some(self.table.slot_at(index));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, S> ExactSizeIterator for Slots<'_, K, V, S> {}
impl<K, V, S> FusedIterator for Slots<'_, K, V, S> {}

/// A draining iterator over the entries of a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`]. It
/// yields owned `(K, Option<V>)` pairs and empties the table as it iterates.
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, K, V, S> {
    table: &'a mut HashTable<K, V, S>,
    index: usize,
}

impl<K, V, S> Drop for Drain<'_, K, V, S> {
    fn drop(&mut self) {
        self.table.clear();
    }
}

impl<K, V, S> Iterator for Drain<'_, K, V, S> {
    type Item = (K, Option<V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.populated == 0 {
            return None;
        }

        let slots = &mut self.table.slots;
        while self.index < slots.buckets() {
            let index = self.index;
            self.index += 1;

            // SAFETY: `index` is below the bucket count; both cells are moved
            // out only where the flag marks them initialized, and the bucket is
            // marked empty before anything else can see it.
            unsafe {
                let flag = slots.flag(index);
                if !is_occupied(flag) {
                    continue;
                }

                let value = if has_value(flag) {
                    Some(slots.take_value(index))
                } else {
                    None
                };
                let key = slots.take_key(index);
                slots.set_flag(index, EMPTY);
                self.table.populated -= 1;
                return Some((key, value));
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.populated, Some(self.table.populated))
    }
}

impl<K, V, S> ExactSizeIterator for Drain<'_, K, V, S> {}
impl<K, V, S> FusedIterator for Drain<'_, K, V, S> {}
