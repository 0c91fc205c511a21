//! Process-management error type

/// Errors from process-table operations and state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// No live process carries the given pid
    NoSuchProcess,
    /// The table has no free slot for another process
    TableFull,
    /// Transition attempted on a process already marked for teardown
    AlreadyKilled,
    /// Wake attempted on a process that is not blocked
    NotBlocked,
}

impl ProcError {
    pub fn is_no_such_process(&self) -> bool {
        matches!(self, ProcError::NoSuchProcess)
    }
}
