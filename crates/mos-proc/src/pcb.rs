//! Per-process control block

use mos_fs::StreamTable;
use mos_mem::Pid;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a process.
///
/// `Kill` is terminal: it marks the process for teardown but reclaims
/// nothing itself. The scheduler frees the stack, streams, and table slot
/// when its walk next passes the marked process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessState {
    /// Runnable, waiting for a quantum
    Ready,
    /// Currently holding the processor
    Running,
    /// Waiting on an event; skipped by the scheduler
    Blocked,
    /// Marked for lazy teardown
    Kill,
}

/// One process control block.
#[derive(Debug)]
pub struct Pcb {
    /// Assigned once at spawn and never reassigned
    pub pid: Pid,
    pub state: ProcessState,
    /// Arena address of the stack segment, tagged with this pid
    pub stack_addr: u32,
    pub stack_size: u32,
    /// Monotonic milliseconds at spawn
    pub start_time: u64,
    /// Monotonic milliseconds when marked `Kill`, zero while alive
    pub end_time: u64,
    /// Quanta this process has been given
    pub cpu_time: u64,
    /// Open streams, current directory, log handle
    pub fio: StreamTable,
}

impl Pcb {
    pub fn new(pid: Pid, stack_addr: u32, stack_size: u32, start_time: u64) -> Pcb {
        Pcb {
            pid,
            state: ProcessState::Blocked,
            stack_addr,
            stack_size,
            start_time,
            end_time: 0,
            cpu_time: 0,
            fio: StreamTable::new(),
        }
    }

    pub fn is_killed(&self) -> bool {
        self.state == ProcessState::Kill
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pcb_starts_blocked() {
        let pcb = Pcb::new(Pid(7), 0x40, 512, 100);
        assert_eq!(pcb.state, ProcessState::Blocked);
        assert_eq!(pcb.pid, Pid(7));
        assert_eq!(pcb.end_time, 0);
        assert!(!pcb.is_killed());
    }
}
