use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::error::TryReserveError;

/// Bucket has never held a key. Probing stops here.
pub(crate) const EMPTY: u8 = 0b000;

/// Bucket held a key that was deleted. Probing continues past it and
/// insertion may reuse it.
pub(crate) const DELETED: u8 = 0b001;

/// Bucket holds a live key.
pub(crate) const OCCUPIED: u8 = 0b010;

/// Set alongside `OCCUPIED` once the value cell has been written.
pub(crate) const VALUE_SET: u8 = 0b100;

#[inline(always)]
pub(crate) fn is_occupied(flag: u8) -> bool {
    flag & OCCUPIED != 0
}

#[inline(always)]
pub(crate) fn has_value(flag: u8) -> bool {
    flag & VALUE_SET != 0
}

/// Offsets of the three parallel arrays inside the single allocation. The
/// flag array always starts at offset zero.
#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    keys_offset: usize,
    values_offset: usize,
}

impl DataLayout {
    fn new<K, V>(buckets: usize) -> Result<Self, TryReserveError> {
        let flags = Layout::array::<u8>(buckets).map_err(|_| TryReserveError::CapacityOverflow)?;
        let keys = Layout::array::<MaybeUninit<K>>(buckets)
            .map_err(|_| TryReserveError::CapacityOverflow)?;
        let values = Layout::array::<MaybeUninit<V>>(buckets)
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        let (layout, keys_offset) = flags
            .extend(keys)
            .map_err(|_| TryReserveError::CapacityOverflow)?;
        let (layout, values_offset) = layout
            .extend(values)
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        Ok(DataLayout {
            layout,
            keys_offset,
            values_offset,
        })
    }

    const fn empty() -> Self {
        DataLayout {
            layout: Layout::new::<()>(),
            keys_offset: 0,
            values_offset: 0,
        }
    }
}

/// The slot table: one allocation holding a flag byte, a key cell and a
/// value cell per bucket.
///
/// Cells are only initialized where the flags say so: a key for every
/// `OCCUPIED` bucket, a value for every bucket that also has `VALUE_SET`.
/// Dropping a `RawSlots` drops exactly those cells and frees the
/// allocation.
pub(crate) struct RawSlots<K, V> {
    layout: DataLayout,
    alloc: NonNull<u8>,
    buckets: usize,

    _phantom: PhantomData<(K, V)>,
}

// SAFETY: `RawSlots` owns its keys and values exactly like a `Vec<(K, V)>`
// would; the raw pointer is never shared outside of `&self`/`&mut self`
// borrows.
unsafe impl<K: Send, V: Send> Send for RawSlots<K, V> {}
// SAFETY: Shared access only hands out shared references to keys and values.
unsafe impl<K: Sync, V: Sync> Sync for RawSlots<K, V> {}

impl<K, V> RawSlots<K, V> {
    /// A table with no buckets and no allocation.
    pub(crate) const fn unallocated() -> Self {
        Self {
            layout: DataLayout::empty(),
            alloc: NonNull::dangling(),
            buckets: 0,
            _phantom: PhantomData,
        }
    }

    /// Allocates `buckets` buckets, all `EMPTY`.
    ///
    /// `buckets` must be zero or a power of two. Nothing is allocated for
    /// zero buckets.
    pub(crate) fn try_with_buckets(buckets: usize) -> Result<Self, TryReserveError> {
        debug_assert!(buckets == 0 || buckets.is_power_of_two());
        if buckets == 0 {
            return Ok(Self::unallocated());
        }

        let layout = DataLayout::new::<K, V>(buckets)?;
        // SAFETY: The flag array alone makes the layout at least `buckets`
        // bytes, so it is non-zero sized. A null return is reported, not
        // dereferenced.
        let alloc = unsafe {
            let raw_alloc = alloc::alloc::alloc(layout.layout);
            if raw_alloc.is_null() {
                return Err(TryReserveError::AllocError {
                    layout: layout.layout,
                });
            }

            core::ptr::write_bytes(raw_alloc, EMPTY, buckets);
            NonNull::new_unchecked(raw_alloc)
        };

        Ok(Self {
            layout,
            alloc,
            buckets,
            _phantom: PhantomData,
        })
    }

    #[inline(always)]
    pub(crate) fn buckets(&self) -> usize {
        self.buckets
    }

    /// `buckets - 1`, or `usize::MAX` when unallocated.
    #[inline(always)]
    pub(crate) fn mask(&self) -> usize {
        self.buckets.wrapping_sub(1)
    }

    /// Bytes held by the allocation.
    #[cfg_attr(not(any(test, feature = "stats")), allow(dead_code))]
    pub(crate) fn allocation_size(&self) -> usize {
        self.layout.layout.size()
    }

    #[inline(always)]
    pub(crate) fn flags(&self) -> &[u8] {
        // SAFETY: The first `buckets` bytes of the allocation are the
        // initialized flag array; a dangling pointer with zero length is a
        // valid empty `u8` slice.
        unsafe { core::slice::from_raw_parts(self.alloc.as_ptr(), self.buckets) }
    }

    #[inline(always)]
    fn flags_mut(&mut self) -> &mut [u8] {
        // SAFETY: As in `flags`, with unique access through `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.alloc.as_ptr(), self.buckets) }
    }

    #[inline(always)]
    fn keys_ptr(&self) -> *mut MaybeUninit<K> {
        // SAFETY: `keys_offset` lies within the allocation (or is zero for
        // the unallocated table, which never dereferences it).
        unsafe { self.alloc.as_ptr().add(self.layout.keys_offset).cast() }
    }

    #[inline(always)]
    fn values_ptr(&self) -> *mut MaybeUninit<V> {
        // SAFETY: As in `keys_ptr`.
        unsafe { self.alloc.as_ptr().add(self.layout.values_offset).cast() }
    }

    /// # Safety
    ///
    /// `index` must be less than `buckets()`.
    #[inline(always)]
    pub(crate) unsafe fn flag(&self, index: usize) -> u8 {
        debug_assert!(index < self.buckets);
        // SAFETY: Caller guarantees `index` is in bounds.
        unsafe { *self.flags().get_unchecked(index) }
    }

    /// # Safety
    ///
    /// `index` must be less than `buckets()`, and the cells must already be
    /// in the state `flag` describes.
    #[inline(always)]
    pub(crate) unsafe fn set_flag(&mut self, index: usize, flag: u8) {
        debug_assert!(index < self.buckets);
        // SAFETY: Caller guarantees `index` is in bounds.
        unsafe {
            *self.flags_mut().get_unchecked_mut(index) = flag;
        }
    }

    /// # Safety
    ///
    /// `index` must be in bounds and its key cell initialized.
    #[inline(always)]
    pub(crate) unsafe fn key(&self, index: usize) -> &K {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { (*self.keys_ptr().add(index)).assume_init_ref() }
    }

    /// # Safety
    ///
    /// `index` must be in bounds and its key cell uninitialized (or already
    /// moved out), otherwise the old key leaks.
    #[inline(always)]
    pub(crate) unsafe fn write_key(&mut self, index: usize, key: K) {
        // SAFETY: Caller guarantees bounds.
        unsafe {
            (*self.keys_ptr().add(index)).write(key);
        }
    }

    /// Moves the key out, leaving the cell logically uninitialized.
    ///
    /// # Safety
    ///
    /// `index` must be in bounds and its key cell initialized; the caller
    /// must update the flag so the cell is not read or dropped again.
    #[inline(always)]
    pub(crate) unsafe fn take_key(&mut self, index: usize) -> K {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { (*self.keys_ptr().add(index)).assume_init_read() }
    }

    /// # Safety
    ///
    /// `index` must be in bounds and its value cell initialized.
    #[inline(always)]
    pub(crate) unsafe fn value(&self, index: usize) -> &V {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { (*self.values_ptr().add(index)).assume_init_ref() }
    }

    /// # Safety
    ///
    /// `index` must be in bounds and its value cell initialized.
    #[inline(always)]
    pub(crate) unsafe fn value_mut(&mut self, index: usize) -> &mut V {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { (*self.values_ptr().add(index)).assume_init_mut() }
    }

    /// # Safety
    ///
    /// `index` must be in bounds and its value cell uninitialized.
    #[inline(always)]
    pub(crate) unsafe fn write_value(&mut self, index: usize, value: V) {
        // SAFETY: Caller guarantees bounds.
        unsafe {
            (*self.values_ptr().add(index)).write(value);
        }
    }

    /// # Safety
    ///
    /// Same contract as [`RawSlots::take_key`], for the value cell.
    #[inline(always)]
    pub(crate) unsafe fn take_value(&mut self, index: usize) -> V {
        // SAFETY: Caller guarantees bounds and initialization.
        unsafe { (*self.values_ptr().add(index)).assume_init_read() }
    }

    /// Drops every initialized cell and marks all buckets `EMPTY`, keeping
    /// the allocation.
    pub(crate) fn clear(&mut self) {
        self.drop_cells();
        let buckets = self.buckets;
        if buckets != 0 {
            self.flags_mut().fill(EMPTY);
        }
    }

    fn drop_cells(&mut self) {
        if !core::mem::needs_drop::<K>() && !core::mem::needs_drop::<V>() {
            return;
        }

        for index in 0..self.buckets {
            // SAFETY: `index < buckets`; cells are initialized exactly where
            // the flag says, and the flag is reset below before anything can
            // observe the dropped cell.
            unsafe {
                let flag = self.flag(index);
                if !is_occupied(flag) {
                    continue;
                }
                self.set_flag(index, EMPTY);
                if has_value(flag) {
                    (*self.values_ptr().add(index)).assume_init_drop();
                }
                (*self.keys_ptr().add(index)).assume_init_drop();
            }
        }
    }
}

impl<K, V> Drop for RawSlots<K, V> {
    fn drop(&mut self) {
        self.drop_cells();

        if self.layout.layout.size() != 0 {
            // SAFETY: The allocation was made with exactly this layout and
            // every initialized cell has been dropped above.
            unsafe {
                alloc::alloc::dealloc(self.alloc.as_ptr(), self.layout.layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn fresh_buckets_are_empty() {
        let slots: RawSlots<String, u64> = RawSlots::try_with_buckets(16).unwrap();
        assert_eq!(slots.buckets(), 16);
        assert_eq!(slots.mask(), 15);
        assert!(slots.flags().iter().all(|&f| f == EMPTY));
        assert!(slots.allocation_size() >= 16 + 16 * core::mem::size_of::<String>() + 16 * 8);
    }

    #[test]
    fn unallocated_has_no_buckets() {
        let slots: RawSlots<String, u64> = RawSlots::unallocated();
        assert_eq!(slots.buckets(), 0);
        assert_eq!(slots.mask(), usize::MAX);
        assert!(slots.flags().is_empty());
        assert_eq!(slots.allocation_size(), 0);
    }

    #[test]
    fn overflowing_request_is_reported() {
        let err = RawSlots::<u64, u64>::try_with_buckets(1 << (usize::BITS - 1)).err();
        assert_eq!(err, Some(TryReserveError::CapacityOverflow));
    }

    #[test]
    fn drop_releases_only_initialized_cells() {
        let tracker = Rc::new(());
        {
            let mut slots: RawSlots<Rc<()>, Rc<()>> = RawSlots::try_with_buckets(8).unwrap();
            // SAFETY: indices are below 8 and flags match the written cells.
            unsafe {
                slots.write_key(1, tracker.clone());
                slots.set_flag(1, OCCUPIED);

                slots.write_key(3, tracker.clone());
                slots.write_value(3, tracker.clone());
                slots.set_flag(3, OCCUPIED | VALUE_SET);

                slots.set_flag(5, DELETED);
            }
            assert_eq!(Rc::strong_count(&tracker), 4);
        }
        assert_eq!(Rc::strong_count(&tracker), 1);
    }

    #[test]
    fn clear_keeps_the_allocation() {
        let mut slots: RawSlots<String, String> = RawSlots::try_with_buckets(4).unwrap();
        // SAFETY: index 2 is in bounds and starts uninitialized.
        unsafe {
            slots.write_key(2, "k".to_string());
            slots.write_value(2, "v".to_string());
            slots.set_flag(2, OCCUPIED | VALUE_SET);
            assert_eq!(slots.key(2), "k");
            assert_eq!(slots.value(2), "v");
        }

        slots.clear();
        assert_eq!(slots.buckets(), 4);
        assert!(slots.flags().iter().all(|&f| f == EMPTY));
    }
}
