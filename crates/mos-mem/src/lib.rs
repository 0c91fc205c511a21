//! mos arena heap manager
//!
//! A single fixed-size arena carved into segments, tracked by two sorted
//! lists:
//!
//! - **Free list**: free segments, ascending by payload size. First-fit over
//!   this ordering is equivalent to best-fit.
//! - **Allocated list**: live segments, ascending by address. Makes
//!   "is this address allocated" a bounded linear scan and address-adjacency
//!   merging a neighbor lookup.
//!
//! Every segment is a header followed by an 8-byte-aligned payload; the two
//! lists partition the arena exactly, with no gaps and no overlap. Allocated
//! segments carry an owning process id (or none, for kernel-internal
//! allocations), and a release must come from the owner.
//!
//! # Design Principles
//!
//! 1. **Explicit state**: the arena is an owned value passed to callers,
//!    never a global. Test harnesses instantiate one per test.
//! 2. **Identity over pointers**: releases validate the exact payload start
//!    and the caller's process id, not mere reachability.
//! 3. **Recoverable by default**: every caller-facing failure is a
//!    [`MemError`]; only internal list corruption aborts.

#![no_std]

extern crate alloc;

pub mod arena;
pub mod error;

pub use arena::{Arena, MapEntry, Pid, ALIGN, ARENA_NULL, HEADER_SIZE};
pub use error::MemError;
