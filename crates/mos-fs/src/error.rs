//! Filesystem error types

use alloc::string::String;
use mos_mem::MemError;
use serde::{Deserialize, Serialize};

/// Errors returned by filesystem operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsError {
    /// Path is malformed (bad component name, too long, empty)
    InvalidPath(String),

    /// No file or directory at the given path
    NotFound,

    /// A non-final path component resolved to something other than a directory
    NotADirectory,

    /// Directory given where a regular file is required
    IsADirectory,

    /// Directory still has live entries
    DirectoryNotEmpty,

    /// The nine-bit permission check denied the request
    PermissionDenied,

    /// Inode still has open streams
    FileBusy,

    /// Hardware device already held open by another process
    DeviceBusy,

    /// No free slot in the process stream table
    StreamExhausted,

    /// No free inode in the table
    InodeExhausted,

    /// Stream handle does not name an open stream
    BadStream,

    /// Read on a write-only stream, or write on a read-only stream
    WrongDirection,

    /// Rewind of an append-mode stream
    AppendRewind,

    /// User table is full
    UserExhausted,

    /// User name already taken
    UserExists,

    /// No such user
    UnknownUser,

    /// Password did not match
    BadCredentials,

    /// User name exceeds the fixed limit
    NameTooLong,

    /// Underlying arena failure
    Mem(MemError),
}

impl FsError {
    /// Create an InvalidPath error with a description
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        FsError::InvalidPath(msg.into())
    }

    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound)
    }

    /// Check if this is a permission error
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, FsError::PermissionDenied)
    }
}

impl From<MemError> for FsError {
    fn from(e: MemError) -> Self {
        FsError::Mem(e)
    }
}
