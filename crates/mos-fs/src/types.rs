//! Core filesystem types: inodes, permissions, streams

use alloc::string::String;
use alloc::vec::Vec;
use mos_hal::{AnalogSource, Led, Switch, TouchPad};
use mos_mem::{Pid, ARENA_NULL};
use serde::{Deserialize, Serialize};

use crate::error::FsError;
use crate::MAX_STREAMS;

/// Reserved inode/stream slot indices.
///
/// Device inodes occupy these fixed table slots, and a process's stream to a
/// device is bound at the identical index of its stream table. The free
/// pools for regular inodes and pooled streams both start past
/// [`slots::LAST_RESERVED`].
pub mod slots {
    pub const STDIN: u16 = 0;
    pub const STDOUT: u16 = 1;
    pub const STDERR: u16 = 2;
    pub const ROOT_DIR: u16 = 3;
    pub const DEV_DIR: u16 = 4;
    pub const LED_DIR: u16 = 5;
    pub const PB_DIR: u16 = 6;
    pub const ANALOG_DIR: u16 = 7;
    pub const TS_DIR: u16 = 8;
    pub const ORANGE: u16 = 9;
    pub const YELLOW: u16 = 10;
    pub const GREEN: u16 = 11;
    pub const BLUE: u16 = 12;
    pub const SW1: u16 = 13;
    pub const SW2: u16 = 14;
    pub const LCD: u16 = 15;
    pub const POTENTIOMETER: u16 = 16;
    pub const THERMISTOR: u16 = 17;
    pub const TS1: u16 = 18;
    pub const TS2: u16 = 19;
    pub const TS3: u16 = 20;
    pub const TS4: u16 = 21;
    pub const LAST_RESERVED: u16 = TS4;
}

/// Which peripheral a device inode drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceId {
    Stdin,
    Stdout,
    Stderr,
    Led(Led),
    Switch(Switch),
    Lcd,
    Analog(AnalogSource),
    Touch(TouchPad),
}

impl DeviceId {
    /// Peripheral for a reserved device slot, if the slot is one.
    pub fn for_slot(slot: u16) -> Option<DeviceId> {
        Some(match slot {
            slots::STDIN => DeviceId::Stdin,
            slots::STDOUT => DeviceId::Stdout,
            slots::STDERR => DeviceId::Stderr,
            slots::ORANGE => DeviceId::Led(Led::Orange),
            slots::YELLOW => DeviceId::Led(Led::Yellow),
            slots::GREEN => DeviceId::Led(Led::Green),
            slots::BLUE => DeviceId::Led(Led::Blue),
            slots::SW1 => DeviceId::Switch(Switch::Sw1),
            slots::SW2 => DeviceId::Switch(Switch::Sw2),
            slots::LCD => DeviceId::Lcd,
            slots::POTENTIOMETER => DeviceId::Analog(AnalogSource::Potentiometer),
            slots::THERMISTOR => DeviceId::Analog(AnalogSource::Thermistor),
            slots::TS1 => DeviceId::Touch(TouchPad::E1),
            slots::TS2 => DeviceId::Touch(TouchPad::E2),
            slots::TS3 => DeviceId::Touch(TouchPad::E3),
            slots::TS4 => DeviceId::Touch(TouchPad::E4),
            _ => return None,
        })
    }

    /// True for peripherals that produce data only (writes are physically
    /// meaningless and answered with a console notice, not an error).
    pub fn is_input_only(&self) -> bool {
        matches!(
            self,
            DeviceId::Switch(_) | DeviceId::Analog(_) | DeviceId::Touch(_)
        )
    }
}

/// Reserved slot for a well-known device name, if the name is one.
pub fn well_known_slot(name: &str) -> Option<u16> {
    Some(match name {
        "STDIN" => slots::STDIN,
        "STDOUT" => slots::STDOUT,
        "STDERR" => slots::STDERR,
        "ORANGE" => slots::ORANGE,
        "YELLOW" => slots::YELLOW,
        "GREEN" => slots::GREEN,
        "BLUE" => slots::BLUE,
        "SW1" => slots::SW1,
        "SW2" => slots::SW2,
        "LCD" => slots::LCD,
        "POTENTIOMETER" => slots::POTENTIOMETER,
        "THERMISTOR" => slots::THERMISTOR,
        "TS1" => slots::TS1,
        "TS2" => slots::TS2,
        "TS3" => slots::TS3,
        "TS4" => slots::TS4,
        _ => return None,
    })
}

/// Directory slot a device's record is written into on first open.
pub fn device_parent_dir(slot: u16) -> u16 {
    match slot {
        slots::ORANGE..=slots::BLUE => slots::LED_DIR,
        slots::SW1 | slots::SW2 => slots::PB_DIR,
        slots::POTENTIOMETER | slots::THERMISTOR => slots::ANALOG_DIR,
        slots::TS1..=slots::TS4 => slots::TS_DIR,
        _ => slots::DEV_DIR,
    }
}

/// What an inode currently represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Slot is on the free chain (or an untouched reserved device slot)
    Free,
    Regular,
    Directory,
    Device(DeviceId),
}

/// One permission triple (read/write/execute).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// Nine-bit permission set: owner/group/world each with read/write/execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub owner: Access,
    pub group: Access,
    pub world: Access,
}

impl Permissions {
    /// Default when no spec is given: owner read-write-execute (the execute
    /// bit lets the creator delete the file), group read-write, world none.
    pub fn default_file() -> Permissions {
        Permissions {
            owner: Access {
                read: true,
                write: true,
                execute: true,
            },
            group: Access {
                read: true,
                write: true,
                execute: false,
            },
            world: Access::default(),
        }
    }

    /// Everything granted to everyone.
    pub fn wide_open() -> Permissions {
        let rwx = Access {
            read: true,
            write: true,
            execute: true,
        };
        Permissions {
            owner: rwx,
            group: rwx,
            world: rwx,
        }
    }

    /// Parse a positional spec string: positions
    /// `[oR oW oX gR gW gX wR wW wX]`, any non-`-` character grants. A spec
    /// shorter than nine characters sets only the positions it covers.
    pub fn from_spec(spec: &str) -> Permissions {
        let mut p = Permissions::default();
        let mut grants = [false; 9];
        for (i, ch) in spec.chars().take(9).enumerate() {
            grants[i] = ch != '-';
        }
        let triple = |g: &[bool]| Access {
            read: g[0],
            write: g[1],
            execute: g[2],
        };
        p.owner = triple(&grants[0..3]);
        p.group = triple(&grants[3..6]);
        p.world = triple(&grants[6..9]);
        p
    }
}

/// Filesystem metadata record for one file, directory, or device.
#[derive(Debug, Clone)]
pub struct Inode {
    pub kind: NodeKind,
    pub perm: Permissions,
    /// Name of the owning user (the shell identity is not a table entry,
    /// so ownership is recorded by name, not index)
    pub owner_name: String,
    /// Group of the owning user
    pub owner_group: String,
    /// Process that created the file
    pub creator: Option<Pid>,
    /// Open-stream reference count. `u16::MAX` on a reserved device slot
    /// means the device has never been opened.
    pub access_count: u16,
    /// Content bytes (directories: record bytes, tombstones included)
    pub size: u32,
    /// Arena address of the first data block, or `ARENA_NULL`
    pub first_block: u32,
    /// Live directory records
    pub num_rec: u16,
    /// Tombstoned directory records available for reuse
    pub num_free_rec: u16,
    /// Free-chain link when the slot is unused
    pub next_free: u16,
}

impl Inode {
    pub fn unused(next_free: u16) -> Inode {
        Inode {
            kind: NodeKind::Free,
            perm: Permissions::default(),
            owner_name: String::new(),
            owner_group: String::new(),
            creator: None,
            access_count: u16::MAX,
            size: 0,
            first_block: ARENA_NULL,
            num_rec: 0,
            num_free_rec: 0,
            next_free,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }
}

/// Stream access mode: base direction plus the `+` update flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeKind {
    Read,
    Write,
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    pub kind: ModeKind,
    pub update: bool,
}

impl Mode {
    pub const READ: Mode = Mode {
        kind: ModeKind::Read,
        update: false,
    };
    pub const WRITE: Mode = Mode {
        kind: ModeKind::Write,
        update: false,
    };
    pub const APPEND: Mode = Mode {
        kind: ModeKind::Append,
        update: false,
    };

    /// Parse `"r"`, `"w"`, `"a"`, optionally followed by `"+"`.
    pub fn parse(s: &str) -> Result<Mode, FsError> {
        let mut chars = s.chars();
        let kind = match chars.next() {
            Some('r') => ModeKind::Read,
            Some('w') => ModeKind::Write,
            Some('a') => ModeKind::Append,
            _ => return Err(FsError::invalid_path("bad stream mode")),
        };
        let update = match chars.next() {
            None => false,
            Some('+') if chars.next().is_none() => true,
            _ => return Err(FsError::invalid_path("bad stream mode")),
        };
        Ok(Mode { kind, update })
    }

    pub fn allows_read(&self) -> bool {
        self.kind == ModeKind::Read || self.update
    }

    pub fn allows_write(&self) -> bool {
        self.kind != ModeKind::Read || self.update
    }

    /// Single character used in log entries.
    pub fn letter(&self) -> char {
        match self.kind {
            ModeKind::Read => 'r',
            ModeKind::Write => 'w',
            ModeKind::Append => 'a',
        }
    }
}

/// Read/write position within a file, as block index plus offset.
///
/// Deliberately holds no arena address: the block is re-resolved from the
/// inode's chain on every access, so a position can never dangle into a
/// block that `purge` or `delete` released (even from another process's
/// stream table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Zero-based index of the current block in the chain
    pub block_no: u32,
    /// Byte offset within the current block
    pub offset: u32,
}

impl Position {
    /// Absolute byte offset within the file.
    pub fn absolute(&self) -> u32 {
        self.block_no * crate::BLOCK_SIZE + self.offset
    }

    /// Step one byte forward, rolling into the next block at the boundary.
    pub fn advance(&mut self) {
        self.offset += 1;
        if self.offset == crate::BLOCK_SIZE {
            self.block_no += 1;
            self.offset = 0;
        }
    }
}

/// One open-file descriptor, bound to exactly one inode.
#[derive(Debug, Clone)]
pub struct Stream {
    pub inode: u16,
    pub mode: Mode,
    pub pos: Position,
    /// Name or id the stream was opened with (device name or final path
    /// component), kept for log entries
    pub name: String,
}

/// Per-process table of open streams.
///
/// Slots up to [`slots::LAST_RESERVED`] are reserved for device streams at
/// their fixed indices; the rest form a free chain. Also carries the
/// process's current-directory inode and its handle to the security-log
/// append stream.
#[derive(Debug)]
pub struct StreamTable {
    entries: Vec<Option<Stream>>,
    next_free: Vec<u8>,
    first_free: u8,
    pub current_dir: u16,
    pub log_stream: Option<u8>,
    /// Arena segment backing this table, tagged with the owning pid
    pub backing: u32,
}

impl StreamTable {
    pub fn new() -> StreamTable {
        let n = MAX_STREAMS as usize;
        let mut next_free = Vec::with_capacity(n);
        for i in 0..n {
            next_free.push(i as u8 + 1);
        }
        StreamTable {
            entries: alloc::vec![None; n],
            next_free,
            first_free: slots::LAST_RESERVED as u8 + 1,
            current_dir: slots::ROOT_DIR,
            log_stream: None,
            backing: ARENA_NULL,
        }
    }

    pub fn get(&self, idx: u8) -> Option<&Stream> {
        self.entries.get(idx as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, idx: u8) -> Option<&mut Stream> {
        self.entries.get_mut(idx as usize)?.as_mut()
    }

    /// Bind a stream at a reserved slot (device open).
    pub fn bind_reserved(&mut self, idx: u8, stream: Stream) {
        self.entries[idx as usize] = Some(stream);
    }

    /// Bind a stream at a pooled slot drawn from the free chain.
    pub fn bind_pooled(&mut self, stream: Stream) -> Result<u8, FsError> {
        if self.first_free >= MAX_STREAMS {
            return Err(FsError::StreamExhausted);
        }
        let idx = self.first_free;
        self.first_free = self.next_free[idx as usize];
        self.entries[idx as usize] = Some(stream);
        Ok(idx)
    }

    /// Release a pooled slot back to the free chain.
    pub fn release(&mut self, idx: u8) -> Option<Stream> {
        let s = self.entries.get_mut(idx as usize)?.take()?;
        if u16::from(idx) > slots::LAST_RESERVED {
            self.next_free[idx as usize] = self.first_free;
            self.first_free = idx;
        }
        Some(s)
    }

    /// Reset the position of every stream bound to `inode`. Used after a
    /// purge so no stream on the truncated file keeps a mid-file cursor.
    pub fn rewind_streams_of(&mut self, inode: u16) {
        for entry in self.entries.iter_mut().flatten() {
            if entry.inode == inode {
                entry.pos = Position::default();
            }
        }
    }

    /// First open stream bound to `inode`, with the given mode if required.
    pub fn find_open(&self, inode: u16, mode: Option<Mode>) -> Option<u8> {
        self.entries.iter().enumerate().find_map(|(i, e)| {
            let s = e.as_ref()?;
            if s.inode == inode && mode.map_or(true, |m| s.mode == m) {
                Some(i as u8)
            } else {
                None
            }
        })
    }

    /// Iterate open streams with their slot indices.
    pub fn iter_open(&self) -> impl Iterator<Item = (u8, &Stream)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|s| (i as u8, s)))
    }
}

impl Default for StreamTable {
    fn default() -> Self {
        StreamTable::new()
    }
}
