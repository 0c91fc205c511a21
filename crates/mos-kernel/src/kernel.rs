//! The kernel proper: owned state, system-call surface, scheduler

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use mos_fs::{FileSystem, StreamTable};
use mos_hal::Hal;
use mos_mem::{Arena, MapEntry, Pid, ALIGN};
use mos_proc::{Pcb, ProcError, ProcTable, ProcessState};

use crate::error::KernelError;

/// What a process body reports at the end of one quantum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantumOutcome {
    /// More work remains; schedule me again
    Yield,
    /// Waiting on an event; skip me until woken
    Block,
    /// Finished; mark me for teardown
    Done,
}

/// A process body: called once per quantum with the kernel and its own pid.
pub type Body<H> = Box<dyn FnMut(&mut Kernel<H>, Pid) -> QuantumOutcome>;

/// Arena bytes reserved per process for its stream-table backing, tagged
/// with the owning pid so teardown reclaims it with the stack.
const STREAM_TABLE_BYTES: u32 = 256;

/// Kernel construction parameters.
pub struct KernelConfig {
    /// Heap arena capacity in bytes
    pub arena_bytes: u32,
    /// Inode table capacity
    pub max_inodes: u16,
    /// Password installed for the administrator account
    pub admin_password: String,
}

impl Default for KernelConfig {
    fn default() -> KernelConfig {
        KernelConfig {
            arena_bytes: 128 * 1024,
            max_inodes: 64,
            admin_password: String::from("mos"),
        }
    }
}

/// The kernel: arena heap, filesystem, process table, and the HAL, with a
/// round-robin scheduler over process bodies.
///
/// Process bodies are closures invoked one quantum at a time; between
/// quanta all state lives in the kernel-owned tables, which is what the
/// tests inspect.
pub struct Kernel<H: Hal> {
    pub mem: Arena,
    pub fs: FileSystem,
    pub procs: ProcTable,
    pub hal: H,
    bodies: BTreeMap<u32, Body<H>>,
}

impl<H: Hal> Kernel<H> {
    /// Boot the kernel: build the tables and install the shell process
    /// (pid 0), which represents the caller and has no scheduled body.
    pub fn new(hal: H, config: KernelConfig) -> Result<Kernel<H>, KernelError> {
        let mut kernel = Kernel {
            mem: Arena::new(config.arena_bytes),
            fs: FileSystem::new(config.max_inodes, &config.admin_password),
            procs: ProcTable::new(),
            hal,
            bodies: BTreeMap::new(),
        };
        let pid = kernel.procs.alloc_pid();
        let start = kernel.hal.now_millis();
        let mut pcb = Pcb::new(pid, mos_mem::ARENA_NULL, 0, start);
        pcb.fio.backing = kernel
            .mem
            .allocate(STREAM_TABLE_BYTES, Some(pid))?;
        kernel
            .fs
            .init_process_streams(&mut kernel.mem, &mut pcb.fio, &mut kernel.hal)?;
        kernel.procs.insert(pcb)?;
        kernel.procs.set_current(pid)?;
        Ok(kernel)
    }

    // ===== process management =====

    /// Spawn a process: allocate its stack and stream-table backing in the
    /// arena (both tagged with the new pid), initialize its streams, link
    /// it into the schedule ring ready to run.
    ///
    /// The pid is drawn from the monotonic counter here and never touched
    /// again; later re-initialization of the control block must not change
    /// it.
    pub fn spawn(&mut self, stack_size: u32, body: Body<H>) -> Result<Pid, KernelError> {
        // Check capacity before touching the arena or the inode counts, so
        // a refused spawn leaves nothing behind to reclaim.
        if self.procs.is_full() {
            return Err(ProcError::TableFull.into());
        }
        let stack_size = stack_size.max(ALIGN).next_multiple_of(ALIGN);
        let pid = self.procs.alloc_pid();
        let stack_addr = self.mem.allocate(stack_size, Some(pid))?;
        let start = self.hal.now_millis();
        let mut pcb = Pcb::new(pid, stack_addr, stack_size, start);
        let backing = match self.mem.allocate(STREAM_TABLE_BYTES, Some(pid)) {
            Ok(addr) => addr,
            Err(e) => {
                self.mem.release(stack_addr, Some(pid))?;
                return Err(e.into());
            }
        };
        pcb.fio.backing = backing;
        if let Err(e) = self
            .fs
            .init_process_streams(&mut self.mem, &mut pcb.fio, &mut self.hal)
        {
            self.fs.close_all(&mut pcb.fio);
            self.mem.release_all(pid);
            return Err(e.into());
        }
        pcb.state = ProcessState::Ready;
        self.procs.insert(pcb)?;
        self.bodies.insert(pid.0, body);
        Ok(pid)
    }

    /// Mark a process for teardown. Nothing is reclaimed here; the
    /// scheduler frees the stack, streams, and table slot when its walk
    /// next passes the marked process.
    pub fn kill(&mut self, pid: Pid) -> Result<(), KernelError> {
        let now = self.hal.now_millis();
        self.procs.kill(pid, now)?;
        Ok(())
    }

    pub fn block(&mut self, pid: Pid) -> Result<(), KernelError> {
        self.procs.block(pid)?;
        Ok(())
    }

    pub fn wake(&mut self, pid: Pid) -> Result<(), KernelError> {
        self.procs.wake(pid)?;
        Ok(())
    }

    /// Pid of the process currently holding the processor.
    pub fn current_pid(&self) -> Option<Pid> {
        self.procs.current_pid()
    }

    /// Give up the remainder of the quantum: run one scheduler tick.
    pub fn yield_now(&mut self) {
        self.tick();
    }

    /// Run scheduler ticks until `pid` has been torn down. This blocks the
    /// caller inside the kernel rather than suspending it; the shell is the
    /// only intended caller.
    pub fn wait(&mut self, pid: Pid) -> Result<(), KernelError> {
        if self.procs.current_pid() == Some(pid) {
            return Err(KernelError::WaitOnSelf);
        }
        while self.procs.get(pid).is_some() {
            self.tick();
        }
        Ok(())
    }

    /// Tick until only the shell remains in the ring.
    pub fn run_until_idle(&mut self) {
        while self.procs.len() > 1 {
            self.tick();
        }
    }

    // ===== scheduler =====

    /// One scheduler quantum.
    ///
    /// The current process is demoted to ready (unless blocked or marked),
    /// then the ring is walked from its successor: marked processes met on
    /// the way are reclaimed on the spot, and the first ready process
    /// becomes current and runs one quantum of its body.
    pub fn tick(&mut self) {
        let Some(cur) = self.procs.current_pid() else {
            return;
        };
        if let Some(pcb) = self.procs.get_mut(cur) {
            if pcb.state == ProcessState::Running {
                pcb.state = ProcessState::Ready;
            }
        }

        let mut candidate = self.procs.next_of(cur);
        let mut budget = self.procs.len();
        while budget > 0 {
            let Some(pid) = candidate else {
                return;
            };
            match self.procs.get(pid).map(|p| p.state) {
                Some(ProcessState::Kill) => {
                    candidate = self.procs.next_of(pid).filter(|n| *n != pid);
                    self.reclaim(pid);
                    budget = self.procs.len();
                }
                Some(ProcessState::Ready) => {
                    if self.procs.set_current(pid).is_err() {
                        return;
                    }
                    if let Some(pcb) = self.procs.get_mut(pid) {
                        pcb.cpu_time += 1;
                    }
                    self.run_quantum(pid);
                    return;
                }
                _ => {
                    candidate = self.procs.next_of(pid);
                    budget -= 1;
                }
            }
        }
    }

    /// Tear down a marked process: unlink it from the ring, drop its
    /// streams (releasing device claims), and return every arena segment
    /// tagged with its pid, stack and stream-table backing included.
    fn reclaim(&mut self, pid: Pid) {
        let Ok(mut pcb) = self.procs.unlink(pid) else {
            return;
        };
        self.fs.close_all(&mut pcb.fio);
        self.mem.release_all(pid);
        self.bodies.remove(&pid.0);
    }

    fn run_quantum(&mut self, pid: Pid) {
        let Some(mut body) = self.bodies.remove(&pid.0) else {
            return;
        };
        match body(self, pid) {
            QuantumOutcome::Yield => {
                self.bodies.insert(pid.0, body);
            }
            QuantumOutcome::Block => {
                let _ = self.procs.block(pid);
                self.bodies.insert(pid.0, body);
            }
            QuantumOutcome::Done => {
                let now = self.hal.now_millis();
                let _ = self.procs.kill(pid, now);
            }
        }
    }

    // ===== system-call surface: filesystem =====

    fn parts(
        &mut self,
    ) -> Result<(&mut Arena, &mut FileSystem, &mut StreamTable, &mut H), KernelError> {
        let Kernel {
            mem,
            fs,
            procs,
            hal,
            ..
        } = self;
        let pcb = procs.current_mut().ok_or(KernelError::NoCurrentProcess)?;
        Ok((mem, fs, &mut pcb.fio, hal))
    }

    pub fn open(&mut self, path: &str, mode: &str) -> Result<u8, KernelError> {
        let creator = self.procs.current_pid();
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.open(mem, fio, hal, path, mode, creator)?)
    }

    pub fn close(&mut self, stream: u8) -> Result<(), KernelError> {
        let (_, fs, fio, _) = self.parts()?;
        Ok(fs.close(fio, stream)?)
    }

    pub fn create(&mut self, path: &str, perm_spec: Option<&str>) -> Result<(), KernelError> {
        let creator = self.procs.current_pid();
        let (mem, fs, fio, _) = self.parts()?;
        fs.create(mem, fio, path, perm_spec, creator)?;
        Ok(())
    }

    pub fn delete(&mut self, path: &str) -> Result<(), KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.delete(mem, fio, hal, path)?)
    }

    pub fn purge(&mut self, stream: u8) -> Result<(), KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.purge(mem, fio, hal, stream)?)
    }

    pub fn rewind(&mut self, stream: u8) -> Result<(), KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.rewind(mem, fio, hal, stream)?)
    }

    pub fn get_char(&mut self, stream: u8) -> Result<Option<u8>, KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.get_char(mem, fio, hal, stream)?)
    }

    pub fn put_char(&mut self, stream: u8, byte: u8) -> Result<(), KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.put_char(mem, fio, hal, stream, byte)?)
    }

    pub fn get_line(&mut self, stream: u8) -> Result<String, KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.get_line(mem, fio, hal, stream)?)
    }

    pub fn put_line(&mut self, stream: u8, line: &str) -> Result<(), KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.put_line(mem, fio, hal, stream, line)?)
    }

    pub fn open_dir(&mut self, path: &str) -> Result<u8, KernelError> {
        let (mem, fs, fio, _) = self.parts()?;
        Ok(fs.open_dir(mem, fio, path)?)
    }

    pub fn next_dir_record(&mut self, stream: u8) -> Result<Option<String>, KernelError> {
        let (mem, fs, fio, _) = self.parts()?;
        Ok(fs.next_dir_record(mem, fio, stream)?)
    }

    pub fn change_dir(&mut self, path: &str) -> Result<(), KernelError> {
        let (mem, fs, fio, _) = self.parts()?;
        Ok(fs.change_dir(mem, fio, path)?)
    }

    // ===== system-call surface: users and audit =====

    pub fn login(&mut self, name: &str, password: &str) -> Result<(), KernelError> {
        Ok(self.fs.users.login(name, password)?)
    }

    pub fn logout(&mut self) {
        self.fs.users.logout();
    }

    pub fn add_user(&mut self, name: &str, group: &str, password: &str) -> Result<(), KernelError> {
        Ok(self.fs.users.add_user(name, group, password)?)
    }

    pub fn log_read(&mut self) -> Result<String, KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.log_read(mem, fio, hal)?)
    }

    pub fn log_purge(&mut self) -> Result<(), KernelError> {
        let (mem, fs, fio, hal) = self.parts()?;
        Ok(fs.log_purge(mem, fio, hal)?)
    }

    // ===== system-call surface: memory =====

    /// Allocate arena bytes tagged with the current pid.
    pub fn mem_alloc(&mut self, size: u32) -> Result<u32, KernelError> {
        let pid = self
            .procs
            .current_pid()
            .ok_or(KernelError::NoCurrentProcess)?;
        Ok(self.mem.allocate(size, Some(pid))?)
    }

    /// Release an allocation made by the current pid.
    pub fn mem_free(&mut self, address: u32) -> Result<(), KernelError> {
        let pid = self
            .procs
            .current_pid()
            .ok_or(KernelError::NoCurrentProcess)?;
        Ok(self.mem.release(address, Some(pid))?)
    }

    pub fn mem_set(&mut self, address: u32, value: u8, nbytes: u32) -> Result<(), KernelError> {
        let pid = self.procs.current_pid();
        Ok(self.mem.mem_set(address, value, nbytes, pid)?)
    }

    pub fn mem_check(&self, address: u32, value: u8, nbytes: u32) -> Result<(), KernelError> {
        let pid = self.procs.current_pid();
        Ok(self.mem.mem_check(address, value, nbytes, pid)?)
    }

    pub fn mem_copy(&mut self, dst: u32, src: u32, nbytes: u32) -> u32 {
        let pid = self.procs.current_pid();
        self.mem.mem_copy(dst, src, nbytes, pid)
    }

    /// Snapshot of the arena partition, address order.
    pub fn memory_map(&self) -> Vec<MapEntry> {
        self.mem.map()
    }

    // ===== clocks =====

    pub fn uptime_millis(&mut self) -> u64 {
        self.hal.now_millis()
    }

    pub fn set_wallclock(&mut self, epoch_seconds: u64) {
        self.hal.set_wallclock(epoch_seconds);
    }
}
