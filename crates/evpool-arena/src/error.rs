//! Pool-specific error types.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur during pool operations.
///
/// Only [`PoolError::AllocationFailed`] and [`PoolError::LayoutOverflow`]
/// can come out of the vending path. Both leave the pool exactly as it was
/// before the call and should be treated as fatal by callers: there is no
/// fallback allocation strategy to retry with.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The system allocator could not provide a new block.
    #[error("block allocation failed: {bytes} bytes at alignment {align}")]
    AllocationFailed {
        /// Size of the block region that was requested.
        bytes: usize,
        /// Alignment of the block region that was requested.
        align: usize,
    },
    /// A block of the requested element count cannot be described by a
    /// valid memory layout.
    #[error("block layout overflow: {elements} elements of {element_size} bytes")]
    LayoutOverflow {
        /// Number of elements requested for the block.
        elements: usize,
        /// Size of one element in bytes.
        element_size: usize,
    },
    /// A [`PoolConfig`](crate::PoolConfig) failed validation.
    #[error("invalid pool config: {reason}")]
    InvalidConfig {
        /// Human-readable description of the violated constraint.
        reason: String,
    },
    /// A non-blocking handle acquisition found the pool held by handles on
    /// another thread.
    #[error("pool for {type_name} in arena '{arena}' is held by another thread")]
    PoolBusy {
        /// Element type of the contended pool.
        type_name: &'static str,
        /// Name of the arena owning the pool.
        arena: String,
    },
    /// A reset, erase or element access was refused because other live
    /// handles may still hold references into the pool.
    #[error("{handles} live handle(s) may still hold elements of {type_name}")]
    ElementsOnLoan {
        /// Element type of the pool.
        type_name: &'static str,
        /// Handles with open loans, excluding the caller.
        handles: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_failed_mentions_size_and_alignment() {
        let err = PoolError::AllocationFailed {
            bytes: 4096,
            align: 32,
        };
        assert_eq!(
            err.to_string(),
            "block allocation failed: 4096 bytes at alignment 32"
        );
    }

    #[test]
    fn pool_busy_names_type_and_arena() {
        let err = PoolError::PoolBusy {
            type_name: "u64",
            arena: "slot-3".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("u64"));
        assert!(msg.contains("slot-3"));
    }

    #[test]
    fn elements_on_loan_counts_handles() {
        let err = PoolError::ElementsOnLoan {
            type_name: "Hit",
            handles: 2,
        };
        assert_eq!(err.to_string(), "2 live handle(s) may still hold elements of Hit");
    }
}
