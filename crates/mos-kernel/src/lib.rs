//! mos kernel runtime
//!
//! Ties the subsystem crates together behind one owned [`Kernel`] value:
//!
//! - **mos-mem**: the arena heap every stack, block, and buffer lives in
//! - **mos-fs**: the in-memory filesystem, streams, users, and audit log
//! - **mos-proc**: control blocks and the circular schedule ring
//! - **mos-hal**: the peripheral trait the kernel is generic over
//!
//! # Design Principles
//!
//! 1. **One owner**: the kernel owns all tables and the HAL; system calls
//!    are plain `&mut self` methods, so there is no interior locking.
//! 2. **Cooperative quanta**: a process body is a closure run once per
//!    scheduler tick; it reports `Yield`, `Block`, or `Done` and keeps all
//!    persistent state in the kernel tables between quanta.
//! 3. **Lazy teardown**: `kill` only marks; the scheduler walk reclaims the
//!    stack, streams, and table slot when it next passes the corpse.
//!
//! ```text
//!  shell / tests                     spawned bodies
//!       │  syscalls (&mut self)            │ one quantum per tick
//!       ▼                                  ▼
//!  ┌─────────────────────────────────────────────┐
//!  │                 Kernel<H: Hal>              │
//!  │   Arena ── FileSystem ── ProcTable ── HAL   │
//!  └─────────────────────────────────────────────┘
//! ```

#![no_std]

extern crate alloc;

pub mod error;
pub mod kernel;

pub use error::KernelError;
pub use kernel::{Body, Kernel, KernelConfig, QuantumOutcome};
