use core::borrow::Borrow;
use core::fmt::Debug;
use core::iter::FusedIterator;

use crate::error::TryReserveError;
use crate::hash_table::HashTable;
use crate::hash_table::Slot;
use crate::strategy::HashStrategy;

/// A key-value map over [`HashTable`] where every key always has a value.
///
/// `HashMap<K, V, S>` hides the table's two-phase insertion: [`insert`] puts
/// the key and writes the value in one call, so lookups never observe a key
/// without a value.
///
/// [`insert`]: HashMap::insert
#[derive(Clone)]
pub struct HashMap<K, V, S> {
    table: HashTable<K, V, S>,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map with the given strategy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::IntHash;
    /// #
    /// let map: HashMap<u32, String, _> = HashMap::with_strategy(IntHash);
    /// assert!(map.is_empty());
    /// ```
    pub const fn with_strategy(strategy: S) -> Self {
        Self {
            table: HashTable::with_strategy(strategy),
        }
    }

    /// Creates an empty map with the given strategy that holds at least
    /// `capacity` entries without growing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::IntHash;
    /// #
    /// let map: HashMap<u32, String, _> = HashMap::with_capacity_and_strategy(100, IntHash);
    /// assert!(map.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_strategy(capacity: usize, strategy: S) -> Self {
        Self {
            table: HashTable::with_capacity_and_strategy(capacity, strategy),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of entries the map can hold before it grows.
    ///
    /// This is the table's upper bound, not its bucket count.
    pub fn capacity(&self) -> usize {
        self.table.upper_bound()
    }

    /// Removes every entry, keeping the allocated buckets.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns the underlying table.
    pub fn as_table(&self) -> &HashTable<K, V, S> {
        &self.table
    }

    /// Unwraps the map into its underlying table.
    pub fn into_table(self) -> HashTable<K, V, S> {
        self.table
    }

    /// Returns an iterator over the entries in an arbitrary order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::IntHash;
    /// #
    /// let mut map = HashMap::with_strategy(IntHash);
    /// map.insert(1u32, "a");
    /// map.insert(2u32, "b");
    ///
    /// let mut pairs: Vec<_> = map.iter().collect();
    /// pairs.sort();
    /// assert_eq!(pairs, [(&1, &"a"), (&2, &"b")]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the entries with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Removes and yields every entry. The map is empty afterwards, even if
    /// the iterator is dropped early.
    pub fn drain(&mut self) -> Drain<'_, K, V, S> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    S: HashStrategy<K>,
{
    /// Inserts a key-value pair.
    ///
    /// If the map did not have this key present, `None` is returned.
    /// If the map did have this key present, the value is updated, and the old
    /// value is returned. The stored key is not replaced.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::IntHash;
    /// #
    /// let mut map = HashMap::with_strategy(IntHash);
    /// assert_eq!(map.insert(37u32, "a"), None);
    /// assert_eq!(map.insert(37u32, "b"), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        TryReserveError::unwrap_infallible(self.try_insert(key, value))
    }

    /// Fallible version of [`HashMap::insert`]. On error neither the key nor
    /// the value is stored and the map is unchanged.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, TryReserveError> {
        let (slot, _) = self.table.put(key)?;
        Ok(self.table.set_value(slot, value))
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::StrHash;
    /// #
    /// let mut counts: HashMap<&str, u32, _> = HashMap::with_strategy(StrHash);
    /// for word in ["a", "b", "a"] {
    ///     *counts.entry(word).or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.get("a"), Some(&2));
    /// assert_eq!(counts.get("b"), Some(&1));
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, S> {
        match self.table.get(&key) {
            Some(slot) => Entry::Occupied(OccupiedEntry {
                table: &mut self.table,
                slot,
            }),
            None => Entry::Vacant(VacantEntry {
                table: &mut self.table,
                key,
            }),
        }
    }

    /// Reserves room for at least `additional` more entries.
    pub fn reserve(&mut self, additional: usize) {
        self.table.reserve(additional);
    }

    /// Fallible version of [`HashMap::reserve`].
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.table.try_reserve(additional)
    }

    /// Shrinks the map to the smallest capacity that holds its entries.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit();
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Returns a reference to the value for `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::StrHash;
    /// #
    /// let mut map = HashMap::with_strategy(StrHash);
    /// map.insert(String::from("one"), 1);
    /// assert_eq!(map.get("one"), Some(&1));
    /// assert_eq!(map.get("two"), None);
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        self.table.get(key).and_then(|slot| self.table.value(slot))
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        let slot = self.table.get(key)?;
        Some((self.table.key(slot), self.table.value(slot)?))
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        let slot = self.table.get(key)?;
        self.table.value_mut(slot)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        self.table.contains_key(key)
    }

    /// Removes `key`, returning its value if it was present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::IntHash;
    /// #
    /// let mut map = HashMap::with_strategy(IntHash);
    /// map.insert(1u64, "a");
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key`, returning the stored key and value if it was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized,
        S: HashStrategy<Q>,
    {
        let (key, value) = self.table.remove(key)?;
        Some((key, value?))
    }
}

impl<K, V, S: Default> HashMap<K, V, S> {
    /// Creates an empty map using the strategy's default value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use quad_hash::HashMap;
    /// # use quad_hash::strategy::StrHash;
    /// #
    /// let map: HashMap<String, u32, StrHash> = HashMap::new();
    /// assert!(map.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_strategy(S::default())
    }

    /// Creates an empty map holding at least `capacity` entries before it
    /// grows, using the strategy's default value.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_strategy(capacity, S::default())
    }
}

impl<K, V, S: Default> Default for HashMap<K, V, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    S: HashStrategy<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(iter.size_hint().0);
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    S: HashStrategy<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    V: PartialEq,
    S: HashStrategy<K>,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get::<K>(k).is_some_and(|o| o == v))
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, S> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V, S>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V, S>),
}

impl<'a, K, V, S> Entry<'a, K, V, S>
where
    S: HashStrategy<K>,
{
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the result of `default` if the entry is vacant and returns a
    /// mutable reference to the value.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        if let Entry::Occupied(entry) = &mut self {
            f(entry.get_mut());
        }
        self
    }

    /// Returns the entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V, S> Entry<'a, K, V, S>
where
    V: Default,
    S: HashStrategy<K>,
{
    /// Inserts `V::default()` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(V::default)
    }
}

/// A view into a vacant entry in a [`HashMap`].
pub struct VacantEntry<'a, K, V, S> {
    table: &'a mut HashTable<K, V, S>,
    key: K,
}

impl<'a, K, V, S> VacantEntry<'a, K, V, S>
where
    S: HashStrategy<K>,
{
    /// Returns the key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts `value` and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let table = self.table;
        let (slot, _) = TryReserveError::unwrap_infallible(table.put(self.key));
        table.set_value(slot, value);
        value_of(table, slot)
    }
}

/// A view into an occupied entry in a [`HashMap`].
pub struct OccupiedEntry<'a, K, V, S> {
    table: &'a mut HashTable<K, V, S>,
    slot: Slot,
}

impl<'a, K, V, S> OccupiedEntry<'a, K, V, S> {
    /// Returns the stored key.
    pub fn key(&self) -> &K {
        self.table.key(self.slot)
    }

    /// Returns the value.
    pub fn get(&self) -> &V {
        let slot = self.slot;
        match self.table.value(slot) {
            Some(value) => value,
            None => unvalued(slot),
        }
    }

    /// Returns the value mutably.
    pub fn get_mut(&mut self) -> &mut V {
        value_of(self.table, self.slot)
    }

    /// Converts the entry into a mutable reference with the map's lifetime.
    pub fn into_mut(self) -> &'a mut V {
        value_of(self.table, self.slot)
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry, returning its value.
    pub fn remove(self) -> V {
        self.remove_entry().1
    }

    /// Removes the entry, returning the stored key and value.
    pub fn remove_entry(self) -> (K, V) {
        let slot = self.slot;
        match self.table.delete(slot) {
            (key, Some(value)) => (key, value),
            (_, None) => unvalued(slot),
        }
    }
}

fn value_of<K, V, S>(table: &mut HashTable<K, V, S>, slot: Slot) -> &mut V {
    match table.value_mut(slot) {
        Some(value) => value,
        None => unvalued(slot),
    }
}

#[cold]
#[track_caller]
fn unvalued(slot: Slot) -> ! {
    panic!("map key at bucket {} has no value", slot.index())
}

/// An iterator over the entries of a `HashMap`.
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find_map(|(k, v)| Some((k, v?)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a `HashMap`.
pub struct IterMut<'a, K, V> {
    inner: crate::hash_table::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find_map(|(k, v)| Some((k, v?)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a `HashMap`.
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

impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `HashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> FusedIterator for Values<'_, K, V> {}

/// A draining iterator over the entries of a `HashMap`.
pub struct Drain<'a, K, V, S> {
    inner: crate::hash_table::Drain<'a, K, V, S>,
}

impl<K, V, S> Iterator for Drain<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.by_ref().find_map(|(k, v)| Some((k, v?)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, S> FusedIterator for Drain<'_, K, V, S> {}
