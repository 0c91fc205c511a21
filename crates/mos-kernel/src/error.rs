//! Kernel error type

use mos_fs::FsError;
use mos_mem::MemError;
use mos_proc::ProcError;

/// Errors crossing the system-call boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Filesystem or stream failure
    Fs(FsError),
    /// Allocator failure
    Mem(MemError),
    /// Process-table failure
    Proc(ProcError),
    /// A system call arrived with no live current process
    NoCurrentProcess,
    /// `wait` aimed at the calling process itself
    WaitOnSelf,
}

impl From<FsError> for KernelError {
    fn from(e: FsError) -> KernelError {
        KernelError::Fs(e)
    }
}

impl From<MemError> for KernelError {
    fn from(e: MemError) -> KernelError {
        KernelError::Mem(e)
    }
}

impl From<ProcError> for KernelError {
    fn from(e: ProcError) -> KernelError {
        KernelError::Proc(e)
    }
}

impl KernelError {
    pub fn is_fs(&self) -> bool {
        matches!(self, KernelError::Fs(_))
    }
}
