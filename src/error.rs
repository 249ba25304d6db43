use core::alloc::Layout;

use thiserror::Error;

/// The error type for operations that have to grow the bucket arrays.
///
/// Returned by [`HashTable::put`] when a required resize cannot be
/// performed, and by the `try_*` constructors and reservation methods. The
/// table is left exactly as it was before the call.
///
/// [`HashTable::put`]: crate::HashTable::put
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryReserveError {
    /// The requested bucket count, or the size of the allocation backing it,
    /// does not fit in `usize`.
    #[error("capacity overflow while sizing the bucket arrays")]
    CapacityOverflow,

    /// The allocator returned null for the bucket arrays.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
}

impl TryReserveError {
    /// Turns a fallible result into an infallible one the way `alloc` does:
    /// allocator failures abort through [`handle_alloc_error`], overflow
    /// panics.
    ///
    /// [`handle_alloc_error`]: alloc::alloc::handle_alloc_error
    pub(crate) fn unwrap_infallible<T>(result: Result<T, Self>) -> T {
        match result {
            Ok(value) => value,
            Err(TryReserveError::AllocError { layout }) => {
                alloc::alloc::handle_alloc_error(layout)
            }
            Err(TryReserveError::CapacityOverflow) => panic!("capacity overflow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            TryReserveError::CapacityOverflow.to_string(),
            "capacity overflow while sizing the bucket arrays"
        );

        let layout = Layout::from_size_align(4096, 8).unwrap();
        assert_eq!(
            TryReserveError::AllocError { layout }.to_string(),
            "memory allocation of 4096 bytes failed"
        );
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn overflow_panics_when_unwrapped() {
        TryReserveError::unwrap_infallible::<()>(Err(TryReserveError::CapacityOverflow));
    }
}
