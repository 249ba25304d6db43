#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod error;
mod probe;
mod raw;

/// A key-value map built on [`HashTable`] with a single-call insertion
/// interface.
pub mod hash_map;

pub mod hash_table;

pub mod strategy;

pub use error::TryReserveError;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::HashTable;
pub use hash_table::PutStatus;
pub use hash_table::Slot;
