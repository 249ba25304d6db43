//! Hash/equality strategies.
//!
//! A [`HashTable`] never hashes or compares keys itself; it asks the
//! strategy it was instantiated with. The strategy is a type parameter, so
//! every `(key, value, strategy)` combination is compiled into its own
//! specialized table.
//!
//! [`HashTable`]: crate::HashTable

use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

/// A hash function and an equality predicate for keys of type `K`.
///
/// Implementations must uphold `equals(a, b) => hash(a) == hash(b)`, and
/// both functions must be deterministic for the lifetime of a table. A
/// strategy that breaks this makes lookups miss or report duplicates, but
/// never causes memory unsafety.
pub trait HashStrategy<K: ?Sized> {
    /// Hashes `key`. Only the low bits are used to pick the home bucket.
    fn hash(&self, key: &K) -> u64;

    /// Returns `true` if `a` and `b` are the same key.
    fn equals(&self, a: &K, b: &K) -> bool;
}

impl<K: ?Sized, S: HashStrategy<K> + ?Sized> HashStrategy<K> for &S {
    #[inline]
    fn hash(&self, key: &K) -> u64 {
        (**self).hash(key)
    }

    #[inline]
    fn equals(&self, a: &K, b: &K) -> bool {
        (**self).equals(a, b)
    }
}

/// Adapts a [`BuildHasher`] into a strategy for any `Hash + Eq` key.
#[derive(Clone, Copy, Default, Debug)]
pub struct BuildHasherStrategy<B> {
    hash_builder: B,
}

impl<B> BuildHasherStrategy<B> {
    /// Wraps `hash_builder`.
    pub const fn new(hash_builder: B) -> Self {
        Self { hash_builder }
    }

    /// Returns the wrapped hasher builder.
    pub fn hasher(&self) -> &B {
        &self.hash_builder
    }
}

impl<K, B> HashStrategy<K> for BuildHasherStrategy<B>
where
    K: Hash + Eq + ?Sized,
    B: BuildHasher,
{
    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    #[inline]
    fn equals(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`DefaultStrategy`].
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`DefaultStrategy`].
        pub type DefaultHashBuilder = std::hash::RandomState;
    }
}

/// The strategy used when none is named: `Hash + Eq` through a randomly
/// seeded hasher.
#[cfg(any(feature = "std", feature = "foldhash"))]
pub type DefaultStrategy = BuildHasherStrategy<DefaultHashBuilder>;

/// The X31 string hash, `h = h * 31 + byte`, with byte-wise equality.
///
/// Cheap and deterministic across runs, which is what you want for small
/// tables of short identifiers. It is trivially attackable; prefer
/// [`DefaultStrategy`] for untrusted input.
#[derive(Clone, Copy, Default, Debug)]
pub struct StrHash;

impl StrHash {
    #[inline]
    fn x31(bytes: &[u8]) -> u32 {
        bytes
            .iter()
            .fold(0u32, |h, &b| (h << 5).wrapping_sub(h).wrapping_add(u32::from(b)))
    }
}

impl<K: AsRef<str> + ?Sized> HashStrategy<K> for StrHash {
    #[inline]
    fn hash(&self, key: &K) -> u64 {
        u64::from(Self::x31(key.as_ref().as_bytes()))
    }

    #[inline]
    fn equals(&self, a: &K, b: &K) -> bool {
        a.as_ref() == b.as_ref()
    }
}

/// Integer hashing: identity for 32-bit and narrower keys, and the
/// `(k >> 33) ^ k ^ (k << 11)` fold for 64-bit keys.
#[derive(Clone, Copy, Default, Debug)]
pub struct IntHash;

macro_rules! int_hash_identity {
    ($($t:ty),*) => {$(
        impl HashStrategy<$t> for IntHash {
            #[inline]
            fn hash(&self, key: &$t) -> u64 {
                u64::from(*key as u32)
            }

            #[inline]
            fn equals(&self, a: &$t, b: &$t) -> bool {
                a == b
            }
        }
    )*};
}

macro_rules! int_hash_fold {
    ($($t:ty),*) => {$(
        impl HashStrategy<$t> for IntHash {
            #[inline]
            fn hash(&self, key: &$t) -> u64 {
                let k = *key as u64;
                u64::from(((k >> 33) ^ k ^ (k << 11)) as u32)
            }

            #[inline]
            fn equals(&self, a: &$t, b: &$t) -> bool {
                a == b
            }
        }
    )*};
}

int_hash_identity!(u8, u16, u32, i8, i16, i32);
int_hash_fold!(u64, i64, usize, isize);

/// A strategy built from a pair of closures.
///
/// ```rust
/// use quad_hash::HashTable;
/// use quad_hash::strategy::FnStrategy;
///
/// let strategy = FnStrategy::new(
///     |k: &u32| u64::from(*k) * 0x9E37_79B9,
///     |a: &u32, b: &u32| a == b,
/// );
/// let mut table: HashTable<u32, &str, _> = HashTable::with_strategy(strategy);
/// let (slot, _) = table.put(7).unwrap();
/// table.set_value(slot, "seven");
/// assert_eq!(table.get(&7).and_then(|s| table.value(s)), Some(&"seven"));
/// ```
#[derive(Clone, Copy)]
pub struct FnStrategy<H, E> {
    hash_fn: H,
    equals_fn: E,
}

impl<H, E> FnStrategy<H, E> {
    /// Pairs a hash function with an equality function.
    pub const fn new(hash_fn: H, equals_fn: E) -> Self {
        Self { hash_fn, equals_fn }
    }
}

impl<H, E> Debug for FnStrategy<H, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnStrategy").finish_non_exhaustive()
    }
}

impl<K, H, E> HashStrategy<K> for FnStrategy<H, E>
where
    K: ?Sized,
    H: Fn(&K) -> u64,
    E: Fn(&K, &K) -> bool,
{
    #[inline]
    fn hash(&self, key: &K) -> u64 {
        (self.hash_fn)(key)
    }

    #[inline]
    fn equals(&self, a: &K, b: &K) -> bool {
        (self.equals_fn)(a, b)
    }
}
