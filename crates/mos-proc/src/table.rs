//! Fixed-capacity process table threaded into a schedule ring

use alloc::vec::Vec;
use mos_mem::Pid;

use crate::error::ProcError;
use crate::pcb::{Pcb, ProcessState};

/// Maximum live processes.
pub const MAX_PROCS: usize = 16;

struct Node {
    pcb: Pcb,
    next: usize,
    prev: usize,
}

/// The process table: a slab of control blocks linked into a circular
/// schedule ring, plus the cursor of the currently running process.
///
/// Pids are assigned from a monotonic counter exactly once, at insertion;
/// nothing later in a process's life rewrites them.
pub struct ProcTable {
    slots: Vec<Option<Node>>,
    current: Option<usize>,
    next_pid: u32,
}

impl ProcTable {
    pub fn new() -> ProcTable {
        let mut slots = Vec::with_capacity(MAX_PROCS);
        for _ in 0..MAX_PROCS {
            slots.push(None);
        }
        ProcTable {
            slots,
            current: None,
            next_pid: 0,
        }
    }

    /// Draw the next pid from the counter.
    pub fn alloc_pid(&mut self) -> Pid {
        let pid = Pid(self.next_pid);
        self.next_pid += 1;
        pid
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    fn slot_of(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.as_ref().map_or(false, |n| n.pcb.pid == pid))
    }

    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        self.slots.get(self.slot_of(pid)?)?.as_ref().map(|n| &n.pcb)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        let slot = self.slot_of(pid)?;
        self.slots.get_mut(slot)?.as_mut().map(|n| &mut n.pcb)
    }

    pub fn current_pid(&self) -> Option<Pid> {
        Some(self.slots[self.current?].as_ref()?.pcb.pid)
    }

    pub fn current_mut(&mut self) -> Option<&mut Pcb> {
        let slot = self.current?;
        self.slots.get_mut(slot)?.as_mut().map(|n| &mut n.pcb)
    }

    /// Pid of the ring successor of `pid`.
    pub fn next_of(&self, pid: Pid) -> Option<Pid> {
        let slot = self.slot_of(pid)?;
        let next = self.slots[slot].as_ref()?.next;
        Some(self.slots[next].as_ref()?.pcb.pid)
    }

    /// Make `pid` the running current process.
    pub fn set_current(&mut self, pid: Pid) -> Result<(), ProcError> {
        let slot = self.slot_of(pid).ok_or(ProcError::NoSuchProcess)?;
        if let Some(node) = self.slots[slot].as_mut() {
            node.pcb.state = ProcessState::Running;
        }
        self.current = Some(slot);
        Ok(())
    }

    /// Insert a control block into the ring, immediately after the current
    /// process (or as the whole ring when the table is empty).
    pub fn insert(&mut self, pcb: Pcb) -> Result<(), ProcError> {
        let slot = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(ProcError::TableFull)?;
        match self.current {
            None => {
                self.slots[slot] = Some(Node {
                    pcb,
                    next: slot,
                    prev: slot,
                });
                self.current = Some(slot);
            }
            Some(cur) => {
                let next = match self.slots[cur].as_ref() {
                    Some(n) => n.next,
                    None => return Err(ProcError::NoSuchProcess),
                };
                self.slots[slot] = Some(Node {
                    pcb,
                    next,
                    prev: cur,
                });
                if let Some(n) = self.slots[cur].as_mut() {
                    n.next = slot;
                }
                if let Some(n) = self.slots[next].as_mut() {
                    n.prev = slot;
                }
            }
        }
        Ok(())
    }

    /// Remove a process from the ring and the slab, returning its control
    /// block for teardown.
    pub fn unlink(&mut self, pid: Pid) -> Result<Pcb, ProcError> {
        let slot = self.slot_of(pid).ok_or(ProcError::NoSuchProcess)?;
        let (next, prev) = match self.slots[slot].as_ref() {
            Some(n) => (n.next, n.prev),
            None => return Err(ProcError::NoSuchProcess),
        };
        if next == slot {
            self.current = None;
        } else {
            if let Some(n) = self.slots[prev].as_mut() {
                n.next = next;
            }
            if let Some(n) = self.slots[next].as_mut() {
                n.prev = prev;
            }
            if self.current == Some(slot) {
                self.current = Some(next);
            }
        }
        match self.slots[slot].take() {
            Some(node) => Ok(node.pcb),
            None => Err(ProcError::NoSuchProcess),
        }
    }

    // ===== state transitions =====

    /// Block a process. A process marked `Kill` stays marked.
    pub fn block(&mut self, pid: Pid) -> Result<(), ProcError> {
        let pcb = self.get_mut(pid).ok_or(ProcError::NoSuchProcess)?;
        if pcb.state == ProcessState::Kill {
            return Err(ProcError::AlreadyKilled);
        }
        pcb.state = ProcessState::Blocked;
        Ok(())
    }

    /// Wake a blocked process.
    pub fn wake(&mut self, pid: Pid) -> Result<(), ProcError> {
        let pcb = self.get_mut(pid).ok_or(ProcError::NoSuchProcess)?;
        match pcb.state {
            ProcessState::Blocked => {
                pcb.state = ProcessState::Ready;
                Ok(())
            }
            ProcessState::Kill => Err(ProcError::AlreadyKilled),
            _ => Err(ProcError::NotBlocked),
        }
    }

    /// Mark a process for lazy teardown and stamp its end time.
    pub fn kill(&mut self, pid: Pid, end_time: u64) -> Result<(), ProcError> {
        let pcb = self.get_mut(pid).ok_or(ProcError::NoSuchProcess)?;
        if pcb.state == ProcessState::Kill {
            return Err(ProcError::AlreadyKilled);
        }
        pcb.state = ProcessState::Kill;
        pcb.end_time = end_time;
        Ok(())
    }

    /// Pids in ring order starting at the current process.
    pub fn ring_pids(&self) -> Vec<Pid> {
        let mut out = Vec::new();
        let Some(start) = self.current else {
            return out;
        };
        let mut slot = start;
        loop {
            let Some(node) = self.slots[slot].as_ref() else {
                break;
            };
            out.push(node.pcb.pid);
            slot = node.next;
            if slot == start {
                break;
            }
        }
        out
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        ProcTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(t: &mut ProcTable) -> Pid {
        let pid = t.alloc_pid();
        t.insert(Pcb::new(pid, 0, 256, 0)).unwrap();
        pid
    }

    // ===== ring structure =====

    #[test]
    fn first_insert_forms_a_self_ring() {
        let mut t = ProcTable::new();
        let p = spawn(&mut t);
        assert_eq!(t.next_of(p), Some(p));
        assert_eq!(t.ring_pids(), [p]);
    }

    #[test]
    fn inserts_land_after_the_current_process() {
        let mut t = ProcTable::new();
        let a = spawn(&mut t);
        t.set_current(a).unwrap();
        let b = spawn(&mut t);
        let c = spawn(&mut t);
        // c was inserted after a, pushing b around the ring
        assert_eq!(t.ring_pids(), [a, c, b]);
    }

    #[test]
    fn unlink_closes_the_ring() {
        let mut t = ProcTable::new();
        let a = spawn(&mut t);
        t.set_current(a).unwrap();
        let b = spawn(&mut t);
        let c = spawn(&mut t);
        t.unlink(c).unwrap();
        assert_eq!(t.ring_pids(), [a, b]);
        assert_eq!(t.next_of(b), Some(a));
        t.unlink(a).unwrap();
        assert_eq!(t.ring_pids(), [b]);
        t.unlink(b).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.current_pid(), None);
    }

    #[test]
    fn unlinking_the_current_process_moves_the_cursor() {
        let mut t = ProcTable::new();
        let a = spawn(&mut t);
        t.set_current(a).unwrap();
        let b = spawn(&mut t);
        t.unlink(a).unwrap();
        assert_eq!(t.current_pid(), Some(b));
    }

    // ===== pids =====

    #[test]
    fn pids_are_monotonic_and_never_reused() {
        let mut t = ProcTable::new();
        let a = spawn(&mut t);
        let b = spawn(&mut t);
        t.unlink(a).unwrap();
        let c = spawn(&mut t);
        assert!(b.0 > a.0);
        assert!(c.0 > b.0);
    }

    #[test]
    fn pid_survives_init() {
        // the pid assigned at insertion must still be there after the
        // process's streams and state are initialized separately
        let mut t = ProcTable::new();
        let pid = t.alloc_pid();
        t.insert(Pcb::new(pid, 0x100, 512, 5)).unwrap();
        {
            let pcb = t.get_mut(pid).unwrap();
            pcb.fio = mos_fs::StreamTable::new();
            pcb.state = ProcessState::Ready;
        }
        assert_eq!(t.get(pid).unwrap().pid, pid);
        assert_eq!(t.ring_pids(), [pid]);
    }

    #[test]
    fn table_capacity_is_enforced() {
        let mut t = ProcTable::new();
        assert!(!t.is_full());
        for _ in 0..MAX_PROCS {
            spawn(&mut t);
        }
        assert!(t.is_full());
        let pid = t.alloc_pid();
        assert_eq!(t.insert(Pcb::new(pid, 0, 256, 0)), Err(ProcError::TableFull));
    }

    // ===== transitions =====

    #[test]
    fn blocked_processes_wake_ready() {
        let mut t = ProcTable::new();
        let p = spawn(&mut t);
        t.block(p).unwrap();
        assert_eq!(t.get(p).unwrap().state, ProcessState::Blocked);
        t.wake(p).unwrap();
        assert_eq!(t.get(p).unwrap().state, ProcessState::Ready);
        assert_eq!(t.wake(p), Err(ProcError::NotBlocked));
    }

    #[test]
    fn kill_is_terminal() {
        let mut t = ProcTable::new();
        let p = spawn(&mut t);
        t.kill(p, 42).unwrap();
        assert_eq!(t.get(p).unwrap().end_time, 42);
        assert_eq!(t.block(p), Err(ProcError::AlreadyKilled));
        assert_eq!(t.wake(p), Err(ProcError::AlreadyKilled));
        assert_eq!(t.kill(p, 43), Err(ProcError::AlreadyKilled));
    }

    #[test]
    fn missing_pids_are_reported() {
        let mut t = ProcTable::new();
        let err = t.block(Pid(99)).unwrap_err();
        assert!(err.is_no_such_process());
    }
}
