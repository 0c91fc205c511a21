//! mos in-memory hierarchical filesystem
//!
//! A fixed-capacity inode table over block chains stored in the arena heap,
//! with regular files, directories, and seven classes of device file:
//!
//! - **Types**: Inode, Permissions, Stream, StreamTable
//! - **Path**: component validation and recursive-descent resolution
//! - **Users**: fixed user table feeding the nine-bit permission checks
//! - **Log**: structured security-log entries appended to `/security.log`
//! - **Service**: the `FileSystem` operations (open/close/create/delete/
//!   rewind/purge/char and line I/O/directory listing)
//!
//! # Design Principles
//!
//! 1. **Reserved slots**: device inodes live at fixed table indices, and a
//!    process's streams to them live at the same indices of its stream
//!    table; regular files draw from shared free chains.
//! 2. **Insertion order**: directory records are appended (or dropped into
//!    the first tombstoned slot) and listed in that order; lookup is always
//!    a linear scan.
//! 3. **Audited denial**: every permission or direction violation appends a
//!    structured entry to the security log before the error returns.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       FileSystem                          │
//! │  • path resolution      • permission checks + audit log   │
//! │  • inode management     • directory records (tombstoned)  │
//! │  • stream char/line IO  • device dispatch by inode kind   │
//! └───────────────┬───────────────────────────┬───────────────┘
//!                 │ blocks                    │ peripherals
//!                 ▼                           ▼
//!       ┌──────────────────┐        ┌──────────────────┐
//!       │  mos-mem Arena   │        │   mos-hal Hal    │
//!       │  4-byte next +   │        │  LEDs, switches, │
//!       │  512-byte payload│        │  LCD, ADC, touch │
//!       └──────────────────┘        └──────────────────┘
//! ```

#![no_std]

extern crate alloc;

pub mod error;
pub mod log;
pub mod path;
pub mod service;
pub mod types;
pub mod users;

pub use error::FsError;
pub use log::{LogAction, LogEntry};
pub use path::{parse_path, valid_node_name, PathSpec};
pub use service::FileSystem;
pub use types::{
    device_parent_dir, slots, well_known_slot, Access, DeviceId, Inode, Mode, ModeKind, NodeKind,
    Permissions, Position, Stream, StreamTable,
};
pub use users::{User, UserTable};

/// Payload bytes per file data block (excludes the block-chain link word).
pub const BLOCK_SIZE: u32 = 512;

/// Maximum length of one path component.
pub const MAX_FILE_NAME: usize = 14;

/// Maximum length of a whole path.
pub const MAX_PATH_NAME: usize = 255;

/// Bytes per directory record: a name field plus a child inode index.
pub const DIR_RECORD_SIZE: u32 = 16;

/// Child-index sentinel marking an erased (tombstoned) directory record.
pub const TOMBSTONE: u16 = u16::MAX;

/// Streams per process stream table.
pub const MAX_STREAMS: u8 = 32;

/// Fixed path of the security log.
pub const LOG_PATH: &str = "/security.log";
