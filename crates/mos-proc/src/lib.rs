//! Process control blocks and the process table
//!
//! - **Pcb**: per-process record (pid, state, stack segment, timing, and the
//!   open-stream table)
//! - **ProcTable**: fixed-capacity slab threaded into a circular schedule
//!   ring; the scheduler walks the ring and reclaims killed neighbors
//!
//! State transitions are the narrow waist here: a process moves between
//! `Ready`, `Running`, and `Blocked`, and once marked `Kill` it never leaves
//! that state. Teardown is lazy: marking does no reclamation, the scheduler
//! does it when its walk passes the corpse.

#![no_std]

extern crate alloc;

pub mod error;
pub mod pcb;
pub mod table;

pub use error::ProcError;
pub use pcb::{Pcb, ProcessState};
pub use table::{ProcTable, MAX_PROCS};
