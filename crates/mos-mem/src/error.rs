//! Allocator error types

use serde::{Deserialize, Serialize};

/// Errors returned by arena operations.
///
/// All variants are recoverable and reported to the caller; the arena never
/// retries on its own. Corruption of the segment lists themselves is not an
/// error value, it is a kernel bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemError {
    /// No free segment large enough for the request
    OutOfMemory,

    /// Requested size exceeds what the arena could ever satisfy
    InvalidSize,

    /// Address does not fall inside any live allocated segment
    InvalidAddress,

    /// Address is not the exact start of an allocated payload
    NotAllocated,

    /// Segment is owned by a different process
    NotOwned,

    /// A byte-compare found contents differing from the expected value
    ValueMismatch,
}

impl MemError {
    /// Check if this is an ownership violation
    pub fn is_not_owned(&self) -> bool {
        matches!(self, MemError::NotOwned)
    }

    /// Check if this is an exhaustion failure
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, MemError::OutOfMemory)
    }
}
