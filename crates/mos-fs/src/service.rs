//! Filesystem operations
//!
//! [`FileSystem`] owns the inode table and the user table; file content
//! lives in arena blocks and open streams live in each process's
//! [`StreamTable`]. Every operation takes the arena (and, where device I/O
//! or audit logging is involved, the HAL) by reference — there is no global
//! state, and a test harness instantiates one filesystem per test.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use mos_hal::Hal;
use mos_mem::{Arena, Pid, ARENA_NULL};

use crate::error::FsError;
use crate::log::{LogAction, LogEntry};
use crate::path::{parse_path, PathSpec};
use crate::types::{
    device_parent_dir, slots, well_known_slot, DeviceId, Inode, Mode, ModeKind, NodeKind,
    Permissions, Position, Stream, StreamTable,
};
use crate::users::{UserTable, ADMIN_USER, SHELL_GROUP};
use crate::{BLOCK_SIZE, DIR_RECORD_SIZE, LOG_PATH, TOMBSTONE};

/// Bytes of the block-chain link word preceding each block's payload.
const LINK_WORD: u32 = 4;

/// Name-field bytes within a directory record (the rest is the child index).
const RECORD_NAME_BYTES: usize = 14;

/// The filesystem service: inode table, free-inode chain, user table.
pub struct FileSystem {
    inodes: Vec<Inode>,
    first_free_inode: u16,
    pub users: UserTable,
}

impl FileSystem {
    /// Build a table of `max_inodes` slots. Slots up to
    /// [`slots::LAST_RESERVED`] are reserved; the rest form the free chain.
    pub fn new(max_inodes: u16, admin_password: &str) -> FileSystem {
        let max = max_inodes.max(slots::LAST_RESERVED + 2);
        let mut inodes = Vec::with_capacity(max as usize);
        for i in 0..max {
            inodes.push(Inode::unused(i + 1));
        }
        FileSystem {
            inodes,
            first_free_inode: slots::LAST_RESERVED + 1,
            users: UserTable::new(admin_password),
        }
    }

    pub fn node(&self, idx: u16) -> Result<&Inode, FsError> {
        self.inodes.get(idx as usize).ok_or(FsError::NotFound)
    }

    fn node_mut(&mut self, idx: u16) -> Result<&mut Inode, FsError> {
        self.inodes.get_mut(idx as usize).ok_or(FsError::NotFound)
    }

    fn alloc_inode(&mut self) -> Result<u16, FsError> {
        let idx = self.first_free_inode;
        if idx as usize >= self.inodes.len() {
            return Err(FsError::InodeExhausted);
        }
        self.first_free_inode = self.inodes[idx as usize].next_free;
        Ok(idx)
    }

    fn release_inode(&mut self, idx: u16) {
        self.inodes[idx as usize] = Inode::unused(self.first_free_inode);
        self.inodes[idx as usize].access_count = 0;
        self.first_free_inode = idx;
    }

    fn current_identity_owned(&self) -> (String, String) {
        let (u, g) = self.users.current_identity();
        (u.to_string(), g.to_string())
    }

    // ===== block chains =====

    fn alloc_block(&mut self, mem: &mut Arena) -> Result<u32, FsError> {
        let blk = mem.allocate(LINK_WORD + BLOCK_SIZE, None)?;
        mem.write_word(blk, ARENA_NULL)?;
        mem.mem_set(blk + LINK_WORD, 0, BLOCK_SIZE, None)?;
        Ok(blk)
    }

    /// Walk the chain to block `block_no`, allocating and linking any
    /// missing blocks along the way.
    fn block_at_or_extend(
        &mut self,
        mem: &mut Arena,
        inode_idx: u16,
        block_no: u32,
    ) -> Result<u32, FsError> {
        if self.node(inode_idx)?.first_block == ARENA_NULL {
            let blk = self.alloc_block(mem)?;
            self.node_mut(inode_idx)?.first_block = blk;
        }
        let mut blk = self.node(inode_idx)?.first_block;
        for _ in 0..block_no {
            let next = mem.read_word(blk)?;
            if next == ARENA_NULL {
                let fresh = self.alloc_block(mem)?;
                mem.write_word(blk, fresh)?;
                blk = fresh;
            } else {
                blk = next;
            }
        }
        Ok(blk)
    }

    /// Arena address of content byte `abs` of an inode.
    fn data_addr(&mut self, mem: &mut Arena, inode_idx: u16, abs: u32) -> Result<u32, FsError> {
        let blk = self.block_at_or_extend(mem, inode_idx, abs / BLOCK_SIZE)?;
        Ok(blk + LINK_WORD + abs % BLOCK_SIZE)
    }

    /// Release a whole block chain starting at `blk`.
    fn release_chain(&mut self, mem: &mut Arena, mut blk: u32) -> Result<(), FsError> {
        while blk != ARENA_NULL {
            let next = mem.read_word(blk)?;
            mem.release(blk, None)?;
            blk = next;
        }
        Ok(())
    }

    /// Position at the end of an inode's content.
    fn seek_end(&self, inode_idx: u16) -> Result<Position, FsError> {
        let size = self.node(inode_idx)?.size;
        Ok(Position {
            block_no: size / BLOCK_SIZE,
            offset: size % BLOCK_SIZE,
        })
    }

    /// Write one content byte at `pos`, growing the chain and the size as
    /// needed, and advance the position. The block is resolved from the
    /// chain on every call so positions survive the chain being rebuilt.
    fn write_byte(
        &mut self,
        mem: &mut Arena,
        inode_idx: u16,
        pos: &mut Position,
        byte: u8,
    ) -> Result<(), FsError> {
        let blk = self.block_at_or_extend(mem, inode_idx, pos.block_no)?;
        mem.bytes_mut(blk + LINK_WORD + pos.offset, 1)?[0] = byte;
        let after = pos.absolute() + 1;
        let node = self.node_mut(inode_idx)?;
        if after > node.size {
            node.size = after;
        }
        pos.advance();
        Ok(())
    }

    /// Read the content byte at `pos` and advance. The caller has already
    /// checked the position against the size.
    fn read_byte(
        &mut self,
        mem: &mut Arena,
        inode_idx: u16,
        pos: &mut Position,
    ) -> Result<u8, FsError> {
        let blk = self.block_at_or_extend(mem, inode_idx, pos.block_no)?;
        let byte = mem.bytes(blk + LINK_WORD + pos.offset, 1)?[0];
        pos.advance();
        Ok(byte)
    }

    // ===== directory records =====

    fn read_record(
        &mut self,
        mem: &mut Arena,
        dir: u16,
        rec_no: u32,
    ) -> Result<(String, u16), FsError> {
        let addr = self.data_addr(mem, dir, rec_no * DIR_RECORD_SIZE)?;
        let raw = mem.bytes(addr, DIR_RECORD_SIZE)?;
        let end = raw[..RECORD_NAME_BYTES]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(RECORD_NAME_BYTES);
        let name = String::from_utf8_lossy(&raw[..end]).into_owned();
        let child = u16::from_le_bytes([raw[RECORD_NAME_BYTES], raw[RECORD_NAME_BYTES + 1]]);
        Ok((name, child))
    }

    fn write_record_at(
        &mut self,
        mem: &mut Arena,
        dir: u16,
        rec_no: u32,
        name: &str,
        child: u16,
    ) -> Result<(), FsError> {
        let addr = self.data_addr(mem, dir, rec_no * DIR_RECORD_SIZE)?;
        let raw = mem.bytes_mut(addr, DIR_RECORD_SIZE)?;
        raw[..RECORD_NAME_BYTES].fill(0);
        for (i, b) in name.bytes().take(RECORD_NAME_BYTES).enumerate() {
            raw[i] = b;
        }
        raw[RECORD_NAME_BYTES..].copy_from_slice(&child.to_le_bytes());
        Ok(())
    }

    fn record_slots(&self, dir: u16) -> Result<u32, FsError> {
        Ok(self.node(dir)?.size / DIR_RECORD_SIZE)
    }

    /// Add a record to a directory: the first tombstoned slot is reused,
    /// otherwise the record is appended (extending the block chain when the
    /// last block is full).
    fn write_record(
        &mut self,
        mem: &mut Arena,
        dir: u16,
        name: &str,
        child: u16,
    ) -> Result<(), FsError> {
        if self.node(dir)?.num_free_rec > 0 {
            for rec_no in 0..self.record_slots(dir)? {
                let (_, existing) = self.read_record(mem, dir, rec_no)?;
                if existing == TOMBSTONE {
                    self.write_record_at(mem, dir, rec_no, name, child)?;
                    let node = self.node_mut(dir)?;
                    node.num_free_rec -= 1;
                    node.num_rec += 1;
                    return Ok(());
                }
            }
        }
        let rec_no = self.record_slots(dir)?;
        self.write_record_at(mem, dir, rec_no, name, child)?;
        let node = self.node_mut(dir)?;
        node.num_rec += 1;
        node.size += DIR_RECORD_SIZE;
        Ok(())
    }

    /// Tombstone the record naming `name`. The record keeps its slot (and
    /// the directory its size); only the next write may reuse it.
    fn erase_record(&mut self, mem: &mut Arena, dir: u16, name: &str) -> Result<(), FsError> {
        for rec_no in 0..self.record_slots(dir)? {
            let (rec_name, child) = self.read_record(mem, dir, rec_no)?;
            if child != TOMBSTONE && rec_name == name {
                self.write_record_at(mem, dir, rec_no, "", TOMBSTONE)?;
                let node = self.node_mut(dir)?;
                node.num_free_rec += 1;
                node.num_rec -= 1;
                return Ok(());
            }
        }
        Err(FsError::NotFound)
    }

    /// Linear scan, insertion order, tombstones skipped.
    fn find_record(
        &mut self,
        mem: &mut Arena,
        dir: u16,
        name: &str,
    ) -> Result<Option<u16>, FsError> {
        for rec_no in 0..self.record_slots(dir)? {
            let (rec_name, child) = self.read_record(mem, dir, rec_no)?;
            if child != TOMBSTONE && rec_name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    // ===== node creation and path resolution =====

    /// Fixed slot for the well-known subtree names, if `name` is one.
    fn preset_dir_slot(name: &str) -> Option<u16> {
        Some(match name {
            "dev" => slots::DEV_DIR,
            "led" => slots::LED_DIR,
            "pb" => slots::PB_DIR,
            "analog" => slots::ANALOG_DIR,
            "ts" => slots::TS_DIR,
            _ => return None,
        })
    }

    fn init_directory_at(
        &mut self,
        mem: &mut Arena,
        slot: u16,
        parent: u16,
        perm: Permissions,
        owner: (&str, &str),
    ) -> Result<(), FsError> {
        {
            let node = self.node_mut(slot)?;
            node.kind = NodeKind::Directory;
            node.perm = perm;
            node.owner_name = owner.0.to_string();
            node.owner_group = owner.1.to_string();
            node.access_count = 0;
            node.size = 0;
            node.first_block = ARENA_NULL;
            node.num_rec = 0;
            node.num_free_rec = 0;
        }
        self.write_record(mem, slot, ".", slot)?;
        self.write_record(mem, slot, "..", parent)?;
        Ok(())
    }

    /// Create a node named `name` under `parent`. Preset subtree names take
    /// their fixed slots; everything else draws from the free-inode chain.
    fn create_node(
        &mut self,
        mem: &mut Arena,
        parent: u16,
        name: &str,
        is_dir: bool,
        creator: Option<Pid>,
    ) -> Result<u16, FsError> {
        let (user, group) = self.current_identity_owned();

        if is_dir {
            if let Some(slot) = Self::preset_dir_slot(name) {
                if self.node(slot)?.kind == NodeKind::Free {
                    self.init_directory_at(
                        mem,
                        slot,
                        parent,
                        Permissions::wide_open(),
                        (&user, &group),
                    )?;
                    self.write_record(mem, parent, name, slot)?;
                }
                return Ok(slot);
            }
            let idx = self.alloc_inode()?;
            self.init_directory_at(mem, idx, parent, Permissions::default_file(), (&user, &group))?;
            self.node_mut(idx)?.creator = creator;
            self.write_record(mem, parent, name, idx)?;
            return Ok(idx);
        }

        let idx = self.alloc_inode()?;
        {
            let node = self.node_mut(idx)?;
            node.kind = NodeKind::Regular;
            node.perm = Permissions::default_file();
            node.owner_name = user;
            node.owner_group = group;
            node.creator = creator;
            node.access_count = 0;
            node.size = 0;
            node.first_block = ARENA_NULL;
        }
        self.write_record(mem, parent, name, idx)?;
        Ok(idx)
    }

    /// Recursive-descent resolution: every non-final component must already
    /// exist and be a directory; the final component is created on demand
    /// when `create` holds (directory if the path had a trailing slash).
    fn find_file(
        &mut self,
        mem: &mut Arena,
        start_dir: u16,
        spec: &PathSpec,
        create: bool,
        creator: Option<Pid>,
    ) -> Result<u16, FsError> {
        let mut cur = if spec.absolute {
            slots::ROOT_DIR
        } else {
            start_dir
        };
        let last = spec.components.len().wrapping_sub(1);
        for (i, name) in spec.components.iter().enumerate() {
            if !self.node(cur)?.is_directory() {
                return Err(FsError::NotADirectory);
            }
            match self.find_record(mem, cur, name)? {
                Some(child) => cur = child,
                None if i == last && create => {
                    cur = self.create_node(mem, cur, name, spec.trailing_slash, creator)?;
                }
                None => return Err(FsError::NotFound),
            }
        }
        Ok(cur)
    }

    /// Resolve everything but the final component; returns the parent
    /// directory and the final name.
    fn resolve_parent(
        &mut self,
        mem: &mut Arena,
        start_dir: u16,
        spec: &PathSpec,
    ) -> Result<(u16, String), FsError> {
        let mut prefix = spec.clone();
        let name = match prefix.components.pop() {
            Some(n) => n,
            None => return Err(FsError::invalid_path("path names the root")),
        };
        prefix.trailing_slash = false;
        let parent = self.find_file(mem, start_dir, &prefix, false, None)?;
        Ok((parent, name))
    }

    /// Create the root and the `/dev` subtree if they do not exist yet.
    pub fn ensure_preset_dirs(&mut self, mem: &mut Arena) -> Result<(), FsError> {
        let admin = (ADMIN_USER, SHELL_GROUP);
        if self.node(slots::ROOT_DIR)?.kind == NodeKind::Free {
            self.init_directory_at(
                mem,
                slots::ROOT_DIR,
                slots::ROOT_DIR,
                Permissions::wide_open(),
                admin,
            )?;
        }
        let presets = [
            (slots::DEV_DIR, slots::ROOT_DIR, "dev"),
            (slots::LED_DIR, slots::DEV_DIR, "led"),
            (slots::PB_DIR, slots::DEV_DIR, "pb"),
            (slots::ANALOG_DIR, slots::DEV_DIR, "analog"),
            (slots::TS_DIR, slots::DEV_DIR, "ts"),
        ];
        for (slot, parent, name) in presets {
            if self.node(slot)?.kind == NodeKind::Free {
                self.init_directory_at(mem, slot, parent, Permissions::wide_open(), admin)?;
                self.write_record(mem, parent, name, slot)?;
            }
        }
        Ok(())
    }

    // ===== permissions and audit =====

    /// Check the wanted bits for the current user against an inode: the
    /// world bits are consulted first, then the owner bits on a name match,
    /// then the group bits on a group match.
    fn permission_granted(&self, idx: u16, read: bool, write: bool, execute: bool) -> bool {
        let node = match self.node(idx) {
            Ok(n) => n,
            Err(_) => return false,
        };
        let (user, group) = self.users.current_identity();
        let scopes = [
            Some(node.perm.world),
            (node.owner_name == user).then_some(node.perm.owner),
            (node.owner_group == group).then_some(node.perm.group),
        ];
        let granted = |want: bool, pick: fn(&crate::types::Access) -> bool| {
            !want
                || scopes
                    .iter()
                    .flatten()
                    .any(|a| pick(a))
        };
        granted(read, |a| a.read) && granted(write, |a| a.write) && granted(execute, |a| a.execute)
    }

    /// Append a structured entry to the security log. Logging never fails
    /// the operation being logged; errors here are swallowed.
    fn log_event(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        action: LogAction,
        target: &str,
        mode: Option<char>,
    ) {
        let Some(log_idx) = st.log_stream else {
            return;
        };
        let entry = LogEntry {
            time: hal.wallclock(),
            user: self.users.current_identity().0.to_string(),
            action,
            target: target.to_string(),
            mode,
        };
        let Ok(mut line) = serde_json::to_string(&entry) else {
            return;
        };
        line.push('\n');
        let Some(stream) = st.get(log_idx) else {
            return;
        };
        let inode_idx = stream.inode;
        let mut pos = match self.seek_end(inode_idx) {
            Ok(p) => p,
            Err(_) => return,
        };
        for b in line.bytes() {
            if self.write_byte(mem, inode_idx, &mut pos, b).is_err() {
                break;
            }
        }
        if let Some(stream) = st.get_mut(log_idx) {
            stream.pos = pos;
        }
    }

    /// Find or create the security-log file. Owned by the administrator,
    /// owner read-write only; ordinary processes reach it solely through
    /// their kernel-opened append stream.
    fn ensure_log_file(&mut self, mem: &mut Arena) -> Result<u16, FsError> {
        let spec = parse_path(LOG_PATH)?;
        if let Some(idx) = self.find_record(mem, slots::ROOT_DIR, &spec.components[0])? {
            return Ok(idx);
        }
        let idx = self.alloc_inode()?;
        {
            let node = self.node_mut(idx)?;
            node.kind = NodeKind::Regular;
            node.perm = Permissions::from_spec("rw");
            node.owner_name = ADMIN_USER.to_string();
            node.owner_group = SHELL_GROUP.to_string();
            node.creator = None;
            node.access_count = 0;
            node.size = 0;
            node.first_block = ARENA_NULL;
        }
        self.write_record(mem, slots::ROOT_DIR, &spec.components[0], idx)?;
        Ok(idx)
    }

    // ===== open/close =====

    /// Open a stream. Well-known device names bind the reserved slot for
    /// that device; filesystem paths resolve per the recursive descent and
    /// bind a pooled slot, creating the final component for write/append
    /// modes and checking permissions against the current user.
    pub fn open(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        path: &str,
        mode: &str,
        creator: Option<Pid>,
    ) -> Result<u8, FsError> {
        let mode = Mode::parse(mode)?;
        if let Some(slot) = well_known_slot(path) {
            return self.device_open(mem, st, slot, path, mode);
        }

        let spec = parse_path(path)?;
        let create = mode.kind != ModeKind::Read;
        let idx = self.find_file(mem, st.current_dir, &spec, create, creator)?;

        match self.node(idx)?.kind {
            NodeKind::Free => Err(FsError::NotFound),
            NodeKind::Device(_) => {
                let name = spec.components.last().cloned().unwrap_or_default();
                self.device_open(mem, st, idx, &name, mode)
            }
            NodeKind::Directory if idx <= slots::LAST_RESERVED => {
                if st.get(idx as u8).is_none() {
                    st.bind_reserved(
                        idx as u8,
                        Stream {
                            inode: idx,
                            mode,
                            pos: Position::default(),
                            name: spec.components.last().cloned().unwrap_or_else(|| "/".to_string()),
                        },
                    );
                    self.node_mut(idx)?.access_count += 1;
                }
                Ok(idx as u8)
            }
            NodeKind::Directory | NodeKind::Regular => {
                if !self.permission_granted(idx, mode.allows_read(), mode.allows_write(), false) {
                    self.log_event(
                        mem,
                        st,
                        hal,
                        LogAction::PermissionDenied,
                        path,
                        Some(mode.letter()),
                    );
                    return Err(FsError::PermissionDenied);
                }
                if let Some(existing) = st.find_open(idx, Some(mode)) {
                    return Ok(existing);
                }
                let pos = if mode.kind == ModeKind::Append {
                    self.seek_end(idx)?
                } else {
                    Position::default()
                };
                let slot = st.bind_pooled(Stream {
                    inode: idx,
                    mode,
                    pos,
                    name: spec.components.last().cloned().unwrap_or_default(),
                })?;
                self.node_mut(idx)?.access_count += 1;
                Ok(slot)
            }
        }
    }

    /// Open a device stream at its reserved slot. Idempotent within a
    /// process; hardware devices are exclusive across processes.
    fn device_open(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        slot: u16,
        name: &str,
        mode: Mode,
    ) -> Result<u8, FsError> {
        if st.get(slot as u8).is_some() {
            return Ok(slot as u8);
        }
        self.ensure_preset_dirs(mem)?;
        self.device_create(mem, slot, name)?;

        let device = match self.node(slot)?.kind {
            NodeKind::Device(d) => d,
            _ => return Err(FsError::NotFound),
        };
        let exclusive = !matches!(device, DeviceId::Stdin | DeviceId::Stdout | DeviceId::Stderr);
        if exclusive && self.node(slot)?.access_count >= 1 {
            return Err(FsError::DeviceBusy);
        }
        self.node_mut(slot)?.access_count += 1;
        st.bind_reserved(
            slot as u8,
            Stream {
                inode: slot,
                mode,
                pos: Position::default(),
                name: name.to_string(),
            },
        );
        Ok(slot as u8)
    }

    /// First open of a device slot initializes its inode and writes its
    /// record into the owning `/dev` subdirectory.
    fn device_create(&mut self, mem: &mut Arena, slot: u16, name: &str) -> Result<(), FsError> {
        if self.node(slot)?.access_count != u16::MAX {
            return Ok(());
        }
        let device = DeviceId::for_slot(slot).ok_or(FsError::NotFound)?;
        let (user, group) = self.current_identity_owned();
        {
            let node = self.node_mut(slot)?;
            node.kind = NodeKind::Device(device);
            node.perm = Permissions::wide_open();
            node.owner_name = user;
            node.owner_group = group;
            node.access_count = 0;
            node.size = 0;
            node.first_block = ARENA_NULL;
        }
        self.write_record(mem, device_parent_dir(slot), name, slot)
    }

    /// Close a stream. Reserved device/directory slots stay open for the
    /// life of the process (closing them is a position reset); pooled slots
    /// go back to the free chain and drop the inode's access count.
    pub fn close(&mut self, st: &mut StreamTable, idx: u8) -> Result<(), FsError> {
        let stream = st.get(idx).ok_or(FsError::BadStream)?;
        if u16::from(idx) <= slots::LAST_RESERVED {
            if let Some(s) = st.get_mut(idx) {
                s.pos = Position::default();
            }
            return Ok(());
        }
        let inode = stream.inode;
        st.release(idx);
        if let Ok(node) = self.node_mut(inode) {
            node.access_count = node.access_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Release every open stream of a process. Used at process teardown,
    /// where reserved device slots must genuinely drop their claims.
    pub fn close_all(&mut self, st: &mut StreamTable) {
        let open: Vec<(u8, u16)> = st.iter_open().map(|(i, s)| (i, s.inode)).collect();
        for (i, inode) in open {
            st.release(i);
            if let Ok(node) = self.node_mut(inode) {
                if node.access_count != u16::MAX {
                    node.access_count = node.access_count.saturating_sub(1);
                }
            }
        }
        st.log_stream = None;
    }

    // ===== create/delete/purge/rewind =====

    /// Create a file (or, with a trailing slash, a directory) without
    /// opening it. An explicit permission spec overrides the defaults.
    pub fn create(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        path: &str,
        perm_spec: Option<&str>,
        creator: Option<Pid>,
    ) -> Result<u16, FsError> {
        let spec = parse_path(path)?;
        if spec.components.is_empty() {
            return Err(FsError::invalid_path("path names the root"));
        }
        let idx = self.find_file(mem, st.current_dir, &spec, true, creator)?;
        if let Some(ps) = perm_spec {
            self.node_mut(idx)?.perm = Permissions::from_spec(ps);
        }
        Ok(idx)
    }

    /// Delete a file or empty directory. Deleting something that does not
    /// exist (or a reserved device/preset slot) is an idempotent success;
    /// open streams and live directory entries block deletion; the caller
    /// needs execute permission on the target.
    pub fn delete(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        path: &str,
    ) -> Result<(), FsError> {
        let spec = parse_path(path)?;
        if spec.components.is_empty() || well_known_slot(path).is_some() {
            return Ok(());
        }
        let (parent, name) = match self.resolve_parent(mem, st.current_dir, &spec) {
            Ok(v) => v,
            Err(FsError::NotFound) => return Ok(()),
            Err(e) => return Err(e),
        };
        let idx = match self.find_record(mem, parent, &name)? {
            Some(idx) => idx,
            None => return Ok(()),
        };
        if idx <= slots::LAST_RESERVED {
            return Ok(());
        }

        let node = self.node(idx)?;
        if node.access_count > 0 && node.access_count != u16::MAX {
            return Err(FsError::FileBusy);
        }
        if node.is_directory() && node.num_rec > 2 {
            return Err(FsError::DirectoryNotEmpty);
        }
        if !self.permission_granted(idx, false, false, true) {
            self.log_event(mem, st, hal, LogAction::PermissionDenied, path, Some('x'));
            return Err(FsError::PermissionDenied);
        }

        let first = self.node(idx)?.first_block;
        self.release_chain(mem, first)?;
        self.erase_record(mem, parent, &name)?;
        self.release_inode(idx);
        Ok(())
    }

    /// Truncate a regular file to zero length, keeping the inode and its
    /// first block. Directories cannot be purged.
    pub fn purge(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        idx: u8,
    ) -> Result<(), FsError> {
        let stream = st.get(idx).ok_or(FsError::BadStream)?;
        let (inode_idx, name) = (stream.inode, stream.name.clone());
        match self.node(inode_idx)?.kind {
            NodeKind::Directory => return Err(FsError::IsADirectory),
            NodeKind::Device(_) => return Ok(()),
            NodeKind::Regular => {}
            NodeKind::Free => return Err(FsError::BadStream),
        }
        if !self.permission_granted(inode_idx, false, false, true) {
            self.log_event(mem, st, hal, LogAction::PermissionDenied, &name, Some('x'));
            return Err(FsError::PermissionDenied);
        }
        self.purge_content(mem, inode_idx)?;
        st.rewind_streams_of(inode_idx);
        Ok(())
    }

    fn purge_content(&mut self, mem: &mut Arena, inode_idx: u16) -> Result<(), FsError> {
        let first = self.node(inode_idx)?.first_block;
        if first != ARENA_NULL {
            let rest = mem.read_word(first)?;
            self.release_chain(mem, rest)?;
            mem.write_word(first, ARENA_NULL)?;
            mem.mem_set(first + LINK_WORD, 0, BLOCK_SIZE, None)?;
        }
        self.node_mut(inode_idx)?.size = 0;
        Ok(())
    }

    /// Reset a stream's position to the start of its inode's content.
    /// Append-mode streams must not be rewound; the attempt is logged.
    pub fn rewind(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        idx: u8,
    ) -> Result<(), FsError> {
        let stream = st.get(idx).ok_or(FsError::BadStream)?;
        let (mode, name) = (stream.mode, stream.name.clone());
        if mode.kind == ModeKind::Append {
            self.log_event(mem, st, hal, LogAction::AppendRewind, &name, Some('a'));
            return Err(FsError::AppendRewind);
        }
        if let Some(s) = st.get_mut(idx) {
            s.pos = Position::default();
        }
        Ok(())
    }

    // ===== character and line I/O =====

    /// Read one byte from a stream. `Ok(None)` is end-of-file (or, for the
    /// console, no byte pending).
    pub fn get_char(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        idx: u8,
    ) -> Result<Option<u8>, FsError> {
        let stream = st.get(idx).ok_or(FsError::BadStream)?;
        let (inode_idx, mode, name) = (stream.inode, stream.mode, stream.name.clone());

        if let NodeKind::Device(device) = self.node(inode_idx)?.kind {
            return Ok(self.device_getc(hal, device));
        }

        if !mode.allows_read() {
            self.log_event(mem, st, hal, LogAction::WrongDirection, &name, Some('r'));
            return Err(FsError::WrongDirection);
        }
        let mut pos = st.get(idx).ok_or(FsError::BadStream)?.pos;
        if pos.absolute() >= self.node(inode_idx)?.size {
            return Ok(None);
        }
        let byte = self.read_byte(mem, inode_idx, &mut pos)?;
        if let Some(s) = st.get_mut(idx) {
            s.pos = pos;
        }
        Ok(Some(byte))
    }

    /// Write one byte to a stream. Input-only peripherals answer with a
    /// console notice instead of an error; regular files enforce the
    /// stream's direction and append streams always land at the end.
    pub fn put_char(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        idx: u8,
        byte: u8,
    ) -> Result<(), FsError> {
        let stream = st.get(idx).ok_or(FsError::BadStream)?;
        let (inode_idx, mode, name) = (stream.inode, stream.mode, stream.name.clone());

        match self.node(inode_idx)?.kind {
            NodeKind::Device(device) => {
                self.device_putc(hal, device, byte);
                return Ok(());
            }
            NodeKind::Directory => return Err(FsError::IsADirectory),
            NodeKind::Regular => {}
            NodeKind::Free => return Err(FsError::BadStream),
        }

        if !mode.allows_write() {
            self.log_event(mem, st, hal, LogAction::WrongDirection, &name, Some('w'));
            return Err(FsError::WrongDirection);
        }
        let mut pos = st.get(idx).ok_or(FsError::BadStream)?.pos;
        if mode.kind == ModeKind::Append
            && pos.absolute() != self.node(inode_idx)?.size
        {
            pos = self.seek_end(inode_idx)?;
        }
        self.write_byte(mem, inode_idx, &mut pos, byte)?;
        if let Some(s) = st.get_mut(idx) {
            s.pos = pos;
        }
        Ok(())
    }

    /// Read up to and including the next newline, or to end-of-input.
    pub fn get_line(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        idx: u8,
    ) -> Result<String, FsError> {
        let mut out = Vec::new();
        loop {
            match self.get_char(mem, st, hal, idx)? {
                Some(b) => {
                    out.push(b);
                    if b == b'\n' {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Write every byte of `line` to the stream.
    pub fn put_line(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
        idx: u8,
        line: &str,
    ) -> Result<(), FsError> {
        for b in line.bytes() {
            self.put_char(mem, st, hal, idx, b)?;
        }
        Ok(())
    }

    fn device_getc(&mut self, hal: &mut dyn Hal, device: DeviceId) -> Option<u8> {
        match device {
            DeviceId::Stdin | DeviceId::Stdout | DeviceId::Stderr => hal.console_read(),
            DeviceId::Led(led) => Some(if hal.led_status(led) { b'1' } else { b'0' }),
            DeviceId::Switch(sw) => Some(if hal.switch_pressed(sw) { b'1' } else { b'0' }),
            DeviceId::Analog(src) => Some(hal.analog_read(src)),
            DeviceId::Touch(pad) => Some(if hal.touch_pressed(pad) { b'1' } else { b'0' }),
            DeviceId::Lcd => {
                notice(hal, "the LCD is an output device; nothing to read\r\n");
                None
            }
        }
    }

    fn device_putc(&mut self, hal: &mut dyn Hal, device: DeviceId, byte: u8) {
        match device {
            DeviceId::Stdin | DeviceId::Stdout | DeviceId::Stderr => hal.console_write(byte),
            DeviceId::Lcd => hal.lcd_write(byte),
            DeviceId::Led(led) => match byte {
                b'1' => hal.led_set(led, true),
                b'0' => hal.led_set(led, false),
                _ => {}
            },
            DeviceId::Switch(_) => {
                notice(hal, "writing to a push button is not possible\r\n");
            }
            DeviceId::Analog(_) => {
                notice(hal, "writing to an analog device is not possible\r\n");
            }
            DeviceId::Touch(_) => {
                notice(hal, "writing to a touch sensor is not possible\r\n");
            }
        }
    }

    // ===== directory listing =====

    /// Open a directory for listing. Reuses an existing stream to the same
    /// directory so the cursor is shared, as with any other open.
    pub fn open_dir(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        path: &str,
    ) -> Result<u8, FsError> {
        let spec = parse_path(path)?;
        let idx = self.find_file(mem, st.current_dir, &spec, false, None)?;
        if !self.node(idx)?.is_directory() {
            return Err(FsError::NotADirectory);
        }
        if idx <= slots::LAST_RESERVED {
            if st.get(idx as u8).is_none() {
                st.bind_reserved(
                    idx as u8,
                    Stream {
                        inode: idx,
                        mode: Mode::READ,
                        pos: Position::default(),
                        name: spec.components.last().cloned().unwrap_or_else(|| "/".to_string()),
                    },
                );
                self.node_mut(idx)?.access_count += 1;
            }
            return Ok(idx as u8);
        }
        if let Some(existing) = st.find_open(idx, None) {
            return Ok(existing);
        }
        let slot = st.bind_pooled(Stream {
            inode: idx,
            mode: Mode::READ,
            pos: Position::default(),
            name: spec.components.last().cloned().unwrap_or_default(),
        })?;
        self.node_mut(idx)?.access_count += 1;
        Ok(slot)
    }

    /// Yield the next directory record name, skipping tombstones, advancing
    /// the stream's cursor. `Ok(None)` at the end; `rewind` restarts.
    pub fn next_dir_record(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        idx: u8,
    ) -> Result<Option<String>, FsError> {
        let stream = st.get(idx).ok_or(FsError::BadStream)?;
        let inode_idx = stream.inode;
        if !self.node(inode_idx)?.is_directory() {
            return Err(FsError::NotADirectory);
        }
        let mut pos = stream.pos;
        let result = loop {
            let abs = pos.absolute();
            if abs >= self.node(inode_idx)?.size {
                break None;
            }
            let (name, child) = self.read_record(mem, inode_idx, abs / DIR_RECORD_SIZE)?;
            for _ in 0..DIR_RECORD_SIZE {
                pos.advance();
            }
            if child != TOMBSTONE {
                break Some(name);
            }
        };
        if let Some(s) = st.get_mut(idx) {
            s.pos = pos;
        }
        Ok(result)
    }

    /// Change the process's current directory.
    pub fn change_dir(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        path: &str,
    ) -> Result<(), FsError> {
        let spec = parse_path(path)?;
        let idx = self.find_file(mem, st.current_dir, &spec, false, None)?;
        if !self.node(idx)?.is_directory() {
            return Err(FsError::NotADirectory);
        }
        st.current_dir = idx;
        Ok(())
    }

    // ===== security log =====

    /// Open the kernel-held append stream to the security log for a fresh
    /// process. Bypasses the permission check: ordinary users may append
    /// through this stream only, never open the file themselves.
    pub fn init_log_stream(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
    ) -> Result<(), FsError> {
        let inode_idx = self.ensure_log_file(mem)?;
        let pos = self.seek_end(inode_idx)?;
        let slot = st.bind_pooled(Stream {
            inode: inode_idx,
            mode: Mode::APPEND,
            pos,
            name: "security.log".to_string(),
        })?;
        self.node_mut(inode_idx)?.access_count += 1;
        st.log_stream = Some(slot);
        Ok(())
    }

    /// Read the whole security log. Administrator only; the attempt itself
    /// is logged when someone else tries.
    pub fn log_read(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
    ) -> Result<String, FsError> {
        if !self.users.is_admin() {
            self.log_event(mem, st, hal, LogAction::LogAccess, LOG_PATH, Some('r'));
            return Err(FsError::PermissionDenied);
        }
        let spec = parse_path(LOG_PATH)?;
        let inode_idx = match self.find_record(mem, slots::ROOT_DIR, &spec.components[0])? {
            Some(idx) => idx,
            None => return Ok(String::new()),
        };
        let size = self.node(inode_idx)?.size;
        let mut pos = Position::default();
        let mut out = Vec::with_capacity(size as usize);
        while pos.absolute() < size {
            out.push(self.read_byte(mem, inode_idx, &mut pos)?);
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Truncate the security log. Administrator only.
    pub fn log_purge(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
    ) -> Result<(), FsError> {
        if !self.users.is_admin() {
            self.log_event(mem, st, hal, LogAction::LogAccess, LOG_PATH, Some('w'));
            return Err(FsError::PermissionDenied);
        }
        let spec = parse_path(LOG_PATH)?;
        if let Some(inode_idx) = self.find_record(mem, slots::ROOT_DIR, &spec.components[0])? {
            self.purge_content(mem, inode_idx)?;
        }
        Ok(())
    }

    // ===== process bootstrap =====

    /// Set up a fresh process's filesystem state: current directory at the
    /// root, the root and `/dev` subtree streams at their reserved slots,
    /// the three standard streams, and the security-log append stream.
    pub fn init_process_streams(
        &mut self,
        mem: &mut Arena,
        st: &mut StreamTable,
        hal: &mut dyn Hal,
    ) -> Result<(), FsError> {
        self.ensure_preset_dirs(mem)?;
        st.current_dir = slots::ROOT_DIR;
        self.open(mem, st, hal, "/", "r", None)?;
        self.open(mem, st, hal, "/dev/", "r", None)?;
        self.open(mem, st, hal, "/dev/led/", "r", None)?;
        self.open(mem, st, hal, "/dev/pb/", "r", None)?;
        self.open(mem, st, hal, "/dev/analog/", "r", None)?;
        self.open(mem, st, hal, "/dev/ts/", "r", None)?;
        self.device_open(mem, st, slots::STDIN, "STDIN", Mode::READ)?;
        self.device_open(mem, st, slots::STDOUT, "STDOUT", Mode::WRITE)?;
        self.device_open(mem, st, slots::STDERR, "STDERR", Mode::WRITE)?;
        self.init_log_stream(mem, st)?;
        Ok(())
    }
}

/// Human-facing notice for physically impossible device requests; sent to
/// the console rather than raised as an error.
fn notice(hal: &mut dyn Hal, msg: &str) {
    for b in msg.bytes() {
        hal.console_write(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::vec;
    use mos_hal::{Led, LoopbackHal};

    fn setup() -> (Arena, FileSystem, StreamTable, LoopbackHal) {
        let mut mem = Arena::new(128 * 1024);
        let mut fs = FileSystem::new(64, "secret");
        let mut st = StreamTable::new();
        let mut hal = LoopbackHal::default();
        fs.init_process_streams(&mut mem, &mut st, &mut hal)
            .unwrap();
        (mem, fs, st, hal)
    }

    fn listing(
        fs: &mut FileSystem,
        mem: &mut Arena,
        st: &mut StreamTable,
        path: &str,
    ) -> Vec<String> {
        let d = fs.open_dir(mem, st, path).unwrap();
        fs.rewind(mem, st, &mut LoopbackHal::default(), d).unwrap();
        let mut names = vec![];
        while let Some(name) = fs.next_dir_record(mem, st, d).unwrap() {
            names.push(name);
        }
        names
    }

    // ===== bootstrap =====

    #[test]
    fn bootstrap_binds_reserved_streams() {
        let (_, _, st, _) = setup();
        for slot in [
            slots::STDIN,
            slots::STDOUT,
            slots::STDERR,
            slots::ROOT_DIR,
            slots::DEV_DIR,
            slots::LED_DIR,
            slots::PB_DIR,
            slots::ANALOG_DIR,
            slots::TS_DIR,
        ] {
            assert!(st.get(slot as u8).is_some(), "slot {} unbound", slot);
        }
        assert_eq!(st.current_dir, slots::ROOT_DIR);
        assert!(st.log_stream.is_some());
    }

    #[test]
    fn root_starts_with_dot_entries() {
        let (mut mem, mut fs, mut st, _) = setup();
        let names = listing(&mut fs, &mut mem, &mut st, "/");
        assert_eq!(&names[..3], &[".", "..", "dev"]);
        assert!(names.contains(&"security.log".to_string()));
    }

    // ===== regular file round trips =====

    #[test]
    fn write_then_read_back() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let w = fs.open(&mut mem, &mut st, &mut hal, "/notes", "w", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, w, "hello\n").unwrap();
        fs.close(&mut st, w).unwrap();

        let r = fs.open(&mut mem, &mut st, &mut hal, "/notes", "r", None).unwrap();
        assert_eq!(fs.get_line(&mut mem, &mut st, &mut hal, r), Ok("hello\n".to_string()));
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, r), Ok(None));
    }

    #[test]
    fn update_mode_reads_after_rewind() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let s = fs.open(&mut mem, &mut st, &mut hal, "/f", "w+", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, s, "ab").unwrap();
        fs.rewind(&mut mem, &mut st, &mut hal, s).unwrap();
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(b'a')));
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(b'b')));
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(None));
    }

    #[test]
    fn line_io_preserves_non_ascii_bytes() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let s = fs.open(&mut mem, &mut st, &mut hal, "/f", "w+", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, s, "héllo wörld\n").unwrap();
        fs.rewind(&mut mem, &mut st, &mut hal, s).unwrap();
        assert_eq!(
            fs.get_line(&mut mem, &mut st, &mut hal, s),
            Ok("héllo wörld\n".to_string())
        );
    }

    #[test]
    fn content_crosses_block_boundaries() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let s = fs.open(&mut mem, &mut st, &mut hal, "/big", "w+", None).unwrap();
        for i in 0..(BLOCK_SIZE + 40) {
            fs.put_char(&mut mem, &mut st, &mut hal, s, (i % 251) as u8).unwrap();
        }
        fs.rewind(&mut mem, &mut st, &mut hal, s).unwrap();
        for i in 0..(BLOCK_SIZE + 40) {
            assert_eq!(
                fs.get_char(&mut mem, &mut st, &mut hal, s),
                Ok(Some((i % 251) as u8))
            );
        }
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(None));
    }

    #[test]
    fn append_always_lands_at_the_end() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let w = fs.open(&mut mem, &mut st, &mut hal, "/f", "w", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, w, "one").unwrap();
        fs.close(&mut st, w).unwrap();

        let a = fs.open(&mut mem, &mut st, &mut hal, "/f", "a", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, a, "two").unwrap();
        fs.close(&mut st, a).unwrap();

        let r = fs.open(&mut mem, &mut st, &mut hal, "/f", "r", None).unwrap();
        assert_eq!(fs.get_line(&mut mem, &mut st, &mut hal, r), Ok("onetwo".to_string()));
    }

    #[test]
    fn same_mode_open_reuses_the_stream() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let a = fs.open(&mut mem, &mut st, &mut hal, "/f", "w", None).unwrap();
        let b = fs.open(&mut mem, &mut st, &mut hal, "/f", "w", None).unwrap();
        assert_eq!(a, b);
        let c = fs.open(&mut mem, &mut st, &mut hal, "/f", "r", None).unwrap();
        assert_ne!(a, c);
    }

    // ===== directions and rewind =====

    #[test]
    fn wrong_direction_fails_and_is_logged() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let r = fs.open(&mut mem, &mut st, &mut hal, "/f", "w", None).unwrap();
        fs.close(&mut st, r).unwrap();
        let r = fs.open(&mut mem, &mut st, &mut hal, "/f", "r", None).unwrap();
        assert_eq!(
            fs.put_char(&mut mem, &mut st, &mut hal, r, b'x'),
            Err(FsError::WrongDirection)
        );
        let w = fs.open(&mut mem, &mut st, &mut hal, "/f", "w", None).unwrap();
        assert_eq!(
            fs.get_char(&mut mem, &mut st, &mut hal, w),
            Err(FsError::WrongDirection)
        );

        fs.users.login("admin", "secret").unwrap();
        let log = fs.log_read(&mut mem, &mut st, &mut hal).unwrap();
        assert!(log.contains("WrongDirection"), "log: {}", log);
        assert!(log.contains("\"f\""));
    }

    #[test]
    fn append_streams_refuse_rewind() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let a = fs.open(&mut mem, &mut st, &mut hal, "/f", "a", None).unwrap();
        assert_eq!(
            fs.rewind(&mut mem, &mut st, &mut hal, a),
            Err(FsError::AppendRewind)
        );
        fs.users.login("admin", "secret").unwrap();
        let log = fs.log_read(&mut mem, &mut st, &mut hal).unwrap();
        assert!(log.contains("AppendRewind"));
    }

    // ===== directories =====

    #[test]
    fn listing_preserves_insertion_order() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        for name in ["z", "a", "m"] {
            fs.create(&mut mem, &mut st, &format!("/{}", name), None, None)
                .unwrap();
        }
        let names = listing(&mut fs, &mut mem, &mut st, "/");
        let tail: Vec<&str> = names.iter().rev().take(3).rev().map(|s| s.as_str()).collect();
        assert_eq!(tail, ["z", "a", "m"]);
        let _ = hal;
    }

    #[test]
    fn deleted_record_slot_is_reused() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        fs.create(&mut mem, &mut st, "/a", None, None).unwrap();
        fs.create(&mut mem, &mut st, "/b", None, None).unwrap();
        let before = listing(&mut fs, &mut mem, &mut st, "/");
        fs.delete(&mut mem, &mut st, &mut hal, "/a").unwrap();
        fs.create(&mut mem, &mut st, "/c", None, None).unwrap();
        let after = listing(&mut fs, &mut mem, &mut st, "/");
        assert_eq!(before.len(), after.len());
        let a_pos = before.iter().position(|n| n == "a").unwrap();
        assert_eq!(after[a_pos], "c");
    }

    #[test]
    fn delete_round_trip_restores_inode_counters() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let free_before = {
            let mut n = 0;
            let mut idx = slots::LAST_RESERVED + 1;
            while let Ok(node) = fs.node(idx) {
                if node.kind == NodeKind::Free {
                    n += 1;
                }
                idx += 1;
            }
            n
        };
        fs.create(&mut mem, &mut st, "/tmp", None, None).unwrap();
        fs.delete(&mut mem, &mut st, &mut hal, "/tmp").unwrap();
        let mut free_after = 0;
        let mut idx = slots::LAST_RESERVED + 1;
        while let Ok(node) = fs.node(idx) {
            if node.kind == NodeKind::Free {
                free_after += 1;
            }
            idx += 1;
        }
        assert_eq!(free_before, free_after);
        assert!(mem.partition_holds());
    }

    #[test]
    fn delete_guards() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        // missing paths and reserved names are idempotent successes
        assert_eq!(fs.delete(&mut mem, &mut st, &mut hal, "/nothing"), Ok(()));
        assert_eq!(fs.delete(&mut mem, &mut st, &mut hal, "STDOUT"), Ok(()));

        let s = fs.open(&mut mem, &mut st, &mut hal, "/open", "w", None).unwrap();
        assert_eq!(
            fs.delete(&mut mem, &mut st, &mut hal, "/open"),
            Err(FsError::FileBusy)
        );
        fs.close(&mut st, s).unwrap();

        fs.create(&mut mem, &mut st, "/d/", None, None).unwrap();
        fs.create(&mut mem, &mut st, "/d/child", None, None).unwrap();
        assert_eq!(
            fs.delete(&mut mem, &mut st, &mut hal, "/d"),
            Err(FsError::DirectoryNotEmpty)
        );
        fs.delete(&mut mem, &mut st, &mut hal, "/d/child").unwrap();
        assert_eq!(fs.delete(&mut mem, &mut st, &mut hal, "/d"), Ok(()));
    }

    #[test]
    fn change_dir_and_relative_paths() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        fs.create(&mut mem, &mut st, "/d/", None, None).unwrap();
        fs.change_dir(&mut mem, &mut st, "/d").unwrap();
        let w = fs.open(&mut mem, &mut st, &mut hal, "f", "w", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, w, "x").unwrap();
        fs.close(&mut st, w).unwrap();

        let r = fs.open(&mut mem, &mut st, &mut hal, "/d/f", "r", None).unwrap();
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, r), Ok(Some(b'x')));

        fs.change_dir(&mut mem, &mut st, "..").unwrap();
        assert_eq!(st.current_dir, slots::ROOT_DIR);
        assert!(fs.change_dir(&mut mem, &mut st, "/d/f").is_err());
    }

    #[test]
    fn reserved_dir_close_resets_the_cursor() {
        let (mut mem, mut fs, mut st, _) = setup();
        let d = fs.open_dir(&mut mem, &mut st, "/").unwrap();
        assert_eq!(u16::from(d), slots::ROOT_DIR);
        let first = fs.next_dir_record(&mut mem, &mut st, d).unwrap();
        assert_eq!(first.as_deref(), Some("."));
        fs.close(&mut st, d).unwrap();
        assert!(st.get(d).is_some());
        let again = fs.next_dir_record(&mut mem, &mut st, d).unwrap();
        assert_eq!(again.as_deref(), Some("."));
    }

    // ===== purge =====

    #[test]
    fn purge_truncates_but_keeps_the_first_block() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let s = fs.open(&mut mem, &mut st, &mut hal, "/big", "w+", None).unwrap();
        for _ in 0..(BLOCK_SIZE + 100) {
            fs.put_char(&mut mem, &mut st, &mut hal, s, b'x').unwrap();
        }
        let inode = st.get(s).unwrap().inode;
        let first = fs.node(inode).unwrap().first_block;
        fs.purge(&mut mem, &mut st, &mut hal, s).unwrap();
        assert_eq!(fs.node(inode).unwrap().size, 0);
        assert_eq!(fs.node(inode).unwrap().first_block, first);
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(None));
        assert!(mem.partition_holds());
    }

    #[test]
    fn purge_rewinds_every_open_stream_on_the_file() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let w = fs.open(&mut mem, &mut st, &mut hal, "/f", "w+", None).unwrap();
        fs.put_line(&mut mem, &mut st, &mut hal, w, "stale").unwrap();
        let r = fs.open(&mut mem, &mut st, &mut hal, "/f", "r", None).unwrap();
        for _ in 0..3 {
            fs.get_char(&mut mem, &mut st, &mut hal, r).unwrap();
        }
        fs.purge(&mut mem, &mut st, &mut hal, w).unwrap();
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, r), Ok(None));
        fs.put_char(&mut mem, &mut st, &mut hal, w, b'q').unwrap();
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, r), Ok(Some(b'q')));
    }

    #[test]
    fn stale_readers_follow_a_purged_and_regrown_chain() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let mut other = StreamTable::new();
        fs.init_process_streams(&mut mem, &mut other, &mut hal).unwrap();

        let w = fs.open(&mut mem, &mut st, &mut hal, "/big", "w+", None).unwrap();
        for _ in 0..(BLOCK_SIZE + 10) {
            fs.put_char(&mut mem, &mut st, &mut hal, w, b'a').unwrap();
        }

        // A reader in another process's table, parked past the first block.
        let r = fs.open(&mut mem, &mut other, &mut hal, "/big", "r", None).unwrap();
        for _ in 0..(BLOCK_SIZE + 1) {
            assert_eq!(
                fs.get_char(&mut mem, &mut other, &mut hal, r),
                Ok(Some(b'a'))
            );
        }

        // Purge frees the second block; grab the hole and scribble on it so
        // any access through a dangling block address would show up.
        fs.purge(&mut mem, &mut st, &mut hal, w).unwrap();
        let scratch = mem.allocate(BLOCK_SIZE + LINK_WORD, None).unwrap();
        mem.mem_set(scratch, b'z', BLOCK_SIZE + LINK_WORD, None).unwrap();

        for _ in 0..(BLOCK_SIZE + 10) {
            fs.put_char(&mut mem, &mut st, &mut hal, w, b'b').unwrap();
        }
        assert_eq!(
            fs.get_char(&mut mem, &mut other, &mut hal, r),
            Ok(Some(b'b'))
        );
        assert!(mem.partition_holds());
    }

    #[test]
    fn purge_rejects_directories() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let d = fs.open_dir(&mut mem, &mut st, "/").unwrap();
        assert_eq!(
            fs.purge(&mut mem, &mut st, &mut hal, d),
            Err(FsError::IsADirectory)
        );
    }

    // ===== permissions =====

    #[test]
    fn stranger_is_denied_and_the_denial_is_logged() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        fs.create(&mut mem, &mut st, "/private", None, None).unwrap();

        fs.users.login("admin", "secret").unwrap();
        fs.users.add_user("kim", "GRP1", "pw").unwrap();
        fs.users.login("kim", "pw").unwrap();

        assert_eq!(
            fs.open(&mut mem, &mut st, &mut hal, "/private", "r", None),
            Err(FsError::PermissionDenied)
        );

        fs.users.login("admin", "secret").unwrap();
        let log = fs.log_read(&mut mem, &mut st, &mut hal).unwrap();
        assert!(log.contains("PermissionDenied"));
        assert!(log.contains("\"kim\""));
        assert!(log.contains("/private"));
    }

    #[test]
    fn explicit_spec_opens_a_file_to_the_world() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        fs.create(&mut mem, &mut st, "/shared", Some("rw-rw-r"), None)
            .unwrap();
        fs.users.login("admin", "secret").unwrap();
        fs.users.add_user("kim", "GRP1", "pw").unwrap();
        fs.users.login("kim", "pw").unwrap();
        assert!(fs.open(&mut mem, &mut st, &mut hal, "/shared", "r", None).is_ok());
        assert_eq!(
            fs.open(&mut mem, &mut st, &mut hal, "/shared", "w", None),
            Err(FsError::PermissionDenied)
        );
    }

    #[test]
    fn log_file_is_admin_only() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        assert_eq!(
            fs.log_read(&mut mem, &mut st, &mut hal),
            Err(FsError::PermissionDenied)
        );
        assert_eq!(
            fs.open(&mut mem, &mut st, &mut hal, "/security.log", "r", None),
            Err(FsError::PermissionDenied)
        );
        fs.users.login("admin", "secret").unwrap();
        let log = fs.log_read(&mut mem, &mut st, &mut hal).unwrap();
        assert!(log.contains("LogAccess"));
        fs.log_purge(&mut mem, &mut st, &mut hal).unwrap();
        assert_eq!(fs.log_read(&mut mem, &mut st, &mut hal), Ok(String::new()));
    }

    // ===== devices =====

    #[test]
    fn led_round_trip_through_the_hal() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let s = fs.open(&mut mem, &mut st, &mut hal, "ORANGE", "w", None).unwrap();
        assert_eq!(u16::from(s), slots::ORANGE);
        fs.put_char(&mut mem, &mut st, &mut hal, s, b'1').unwrap();
        assert!(hal.leds[Led::Orange as usize]);
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(b'1')));
        fs.put_char(&mut mem, &mut st, &mut hal, s, b'0').unwrap();
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(b'0')));
    }

    #[test]
    fn first_device_open_writes_its_directory_record() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let before = listing(&mut fs, &mut mem, &mut st, "/dev/led");
        assert!(!before.contains(&"GREEN".to_string()));
        fs.open(&mut mem, &mut st, &mut hal, "GREEN", "w", None).unwrap();
        let after = listing(&mut fs, &mut mem, &mut st, "/dev/led");
        assert!(after.contains(&"GREEN".to_string()));
    }

    #[test]
    fn hardware_devices_are_exclusive_across_processes() {
        let (mut mem, mut fs, mut st1, mut hal) = setup();
        let mut st2 = StreamTable::new();
        fs.init_process_streams(&mut mem, &mut st2, &mut hal).unwrap();

        let a = fs.open(&mut mem, &mut st1, &mut hal, "LCD", "w", None).unwrap();
        // reopen by the same process is idempotent
        assert_eq!(fs.open(&mut mem, &mut st1, &mut hal, "LCD", "w", None), Ok(a));
        assert_eq!(
            fs.open(&mut mem, &mut st2, &mut hal, "LCD", "w", None),
            Err(FsError::DeviceBusy)
        );

        fs.close_all(&mut st1);
        assert!(fs.open(&mut mem, &mut st2, &mut hal, "LCD", "w", None).is_ok());
    }

    #[test]
    fn standard_streams_are_shared() {
        let (mut mem, mut fs, mut st1, mut hal) = setup();
        let mut st2 = StreamTable::new();
        // both processes hold STDIN/STDOUT/STDERR without a busy failure
        fs.init_process_streams(&mut mem, &mut st2, &mut hal).unwrap();
        assert!(st1.get(slots::STDOUT as u8).is_some());
        assert!(st2.get(slots::STDOUT as u8).is_some());
        fs.put_char(&mut mem, &mut st1, &mut hal, slots::STDOUT as u8, b'!').unwrap();
        assert_eq!(hal.console_output.last(), Some(&b'!'));
    }

    #[test]
    fn input_devices_answer_writes_with_a_notice() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        let s = fs.open(&mut mem, &mut st, &mut hal, "SW1", "r", None).unwrap();
        let before = hal.console_output.len();
        assert_eq!(fs.put_char(&mut mem, &mut st, &mut hal, s, b'1'), Ok(()));
        assert!(hal.console_output.len() > before);
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(b'0')));
        hal.switches[0] = true;
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(b'1')));
    }

    #[test]
    fn analog_reads_come_from_the_hal() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        hal.analog[0] = 0x7f;
        let s = fs
            .open(&mut mem, &mut st, &mut hal, "POTENTIOMETER", "r", None)
            .unwrap();
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, s), Ok(Some(0x7f)));
    }

    #[test]
    fn console_reads_drain_the_input_queue() {
        let (mut mem, mut fs, mut st, mut hal) = setup();
        hal.push_input(b"ok\n");
        let stdin = slots::STDIN as u8;
        assert_eq!(
            fs.get_line(&mut mem, &mut st, &mut hal, stdin),
            Ok("ok\n".to_string())
        );
        assert_eq!(fs.get_char(&mut mem, &mut st, &mut hal, stdin), Ok(None));
    }
}
