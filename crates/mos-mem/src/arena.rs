//! Arena segment management
//!
//! The arena is one contiguous byte region. Each segment is a header
//! ([`HEADER_SIZE`] bytes) followed by its payload; payload starts are always
//! aligned to [`ALIGN`]. The free list is kept ascending by payload size, the
//! allocated list ascending by address, and together they cover every byte of
//! the arena exactly once.

use alloc::vec;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::error::MemError;

/// Alignment quantum for payload starts and rounded sizes (a word pair).
pub const ALIGN: u32 = 8;

/// Per-segment bookkeeping overhead, already a multiple of [`ALIGN`].
pub const HEADER_SIZE: u32 = 8;

/// Null arena address. Returned by zero-size allocations; never a valid
/// payload start (the lowest payload begins at `HEADER_SIZE`).
pub const ARENA_NULL: u32 = 0;

/// Process identifier used to tag segment ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u32);

/// One segment of the arena: header offset, payload size, owner tag.
///
/// `start` is the offset of the header; the payload begins at
/// `start + HEADER_SIZE` and runs for `size` bytes. `owner` is `None` for
/// free segments and for kernel-internal allocations not tied to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Segment {
    start: u32,
    size: u32,
    owner: Option<Pid>,
}

impl Segment {
    fn payload(&self) -> u32 {
        self.start + HEADER_SIZE
    }

    /// One past the last payload byte; equals the next segment's header start.
    fn end(&self) -> u32 {
        self.start + HEADER_SIZE + self.size
    }
}

/// One row of the [`Arena::map`] diagnostic listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEntry {
    /// Payload start address
    pub address: u32,
    /// Payload size in bytes
    pub size: u32,
    /// Owning process, if any
    pub owner: Option<Pid>,
    /// Whether the segment is free
    pub free: bool,
}

/// The arena heap manager.
pub struct Arena {
    buf: Vec<u8>,
    /// Free segments, ascending by payload size
    free: Vec<Segment>,
    /// Allocated segments, ascending by address
    allocated: Vec<Segment>,
}

fn align_up(n: u32) -> u32 {
    (n + (ALIGN - 1)) & !(ALIGN - 1)
}

impl Arena {
    /// Create an arena of (at least) `capacity` bytes, rounded up to the
    /// alignment quantum. The whole region starts as one free segment.
    pub fn new(capacity: u32) -> Arena {
        let capacity = align_up(capacity.max(HEADER_SIZE + ALIGN));
        Arena {
            buf: vec![0u8; capacity as usize],
            free: vec![Segment {
                start: 0,
                size: capacity - HEADER_SIZE,
                owner: None,
            }],
            allocated: Vec::new(),
        }
    }

    /// Total arena capacity in bytes, headers included.
    pub fn capacity(&self) -> u32 {
        self.buf.len() as u32
    }

    /// Sum of free payload bytes across the free list.
    pub fn free_total(&self) -> u32 {
        self.free.iter().map(|s| s.size).sum()
    }

    // ===== allocation =====

    /// Allocate `size` bytes tagged with `owner`.
    ///
    /// Zero-size requests succeed and return [`ARENA_NULL`] without touching
    /// the lists. The size is rounded up to the alignment quantum and the
    /// free list is scanned in ascending size order for the first segment
    /// that fits. A leftover smaller than one header is absorbed into the
    /// allocation rather than left behind as an unusable free sliver.
    pub fn allocate(&mut self, size: u32, owner: Option<Pid>) -> Result<u32, MemError> {
        if size == 0 {
            return Ok(ARENA_NULL);
        }
        let rounded = align_up(size);
        if rounded > self.capacity() - HEADER_SIZE {
            return Err(MemError::InvalidSize);
        }

        let pos = self
            .free
            .iter()
            .position(|s| s.size >= rounded)
            .ok_or(MemError::OutOfMemory)?;
        let chosen = self.free.remove(pos);

        let leftover = chosen.size - rounded;
        let taken = if leftover <= HEADER_SIZE {
            // absorb the sliver
            Segment {
                start: chosen.start,
                size: chosen.size,
                owner,
            }
        } else {
            self.insert_free(Segment {
                start: chosen.start + HEADER_SIZE + rounded,
                size: leftover - HEADER_SIZE,
                owner: None,
            });
            Segment {
                start: chosen.start,
                size: rounded,
                owner,
            }
        };

        let payload = taken.payload();
        self.insert_allocated(taken);
        Ok(payload)
    }

    /// Release the allocation whose payload starts exactly at `address`.
    ///
    /// `caller` is the releasing process; `None` is the kernel, which
    /// bypasses the ownership check (used by [`Arena::release_all`] at
    /// process reclamation). Unowned segments may be released by anyone.
    /// The freed segment is merged with any address-adjacent free neighbor
    /// before going back on the free list.
    pub fn release(&mut self, address: u32, caller: Option<Pid>) -> Result<(), MemError> {
        let pos = self
            .allocated
            .iter()
            .take_while(|s| s.payload() <= address)
            .position(|s| s.payload() == address)
            .ok_or(MemError::NotAllocated)?;

        if let (Some(owner), Some(caller)) = (self.allocated[pos].owner, caller) {
            if owner != caller {
                return Err(MemError::NotOwned);
            }
        }

        let seg = self.allocated.remove(pos);
        self.insert_free_merged(seg);
        Ok(())
    }

    /// Release every segment owned by `owner`. Used at process exit.
    pub fn release_all(&mut self, owner: Pid) {
        loop {
            let addr = self
                .allocated
                .iter()
                .find(|s| s.owner == Some(owner))
                .map(|s| s.payload());
            match addr {
                Some(addr) => {
                    // owner matches, cannot fail
                    let _ = self.release(addr, None);
                }
                None => break,
            }
        }
    }

    // ===== byte-level operations =====

    /// Fill `nbytes` starting at `address` with `value`.
    ///
    /// The address must fall inside a live allocated segment with at least
    /// `nbytes` remaining, and (when `caller` is a process) the segment must
    /// be owned by the caller or unowned.
    pub fn mem_set(
        &mut self,
        address: u32,
        value: u8,
        nbytes: u32,
        caller: Option<Pid>,
    ) -> Result<(), MemError> {
        let (off, _) = self.checked_range(address, nbytes, caller)?;
        self.buf[off..off + nbytes as usize].fill(value);
        Ok(())
    }

    /// Verify that `nbytes` starting at `address` all equal `value`.
    pub fn mem_check(
        &self,
        address: u32,
        value: u8,
        nbytes: u32,
        caller: Option<Pid>,
    ) -> Result<(), MemError> {
        let (off, _) = self.checked_range(address, nbytes, caller)?;
        if self.buf[off..off + nbytes as usize].iter().all(|b| *b == value) {
            Ok(())
        } else {
            Err(MemError::ValueMismatch)
        }
    }

    /// Copy up to `nbytes` from `src` to `dst`, clamped to what remains of
    /// both segments from the given addresses. Returns the bytes copied;
    /// an address the caller does not own copies nothing.
    pub fn mem_copy(&mut self, dst: u32, src: u32, nbytes: u32, caller: Option<Pid>) -> u32 {
        let dst_rem = match self.checked_range(dst, 0, caller) {
            Ok((_, rem)) => rem,
            Err(_) => return 0,
        };
        let src_rem = match self.checked_range(src, 0, caller) {
            Ok((_, rem)) => rem,
            Err(_) => return 0,
        };
        let n = nbytes.min(dst_rem).min(src_rem) as usize;
        self.buf
            .copy_within(src as usize..src as usize + n, dst as usize);
        n as u32
    }

    /// Borrow `len` payload bytes starting at `address`. Kernel-internal;
    /// validates the range lies within one live allocated segment.
    pub fn bytes(&self, address: u32, len: u32) -> Result<&[u8], MemError> {
        let (off, _) = self.checked_range(address, len, None)?;
        Ok(&self.buf[off..off + len as usize])
    }

    /// Mutable variant of [`Arena::bytes`].
    pub fn bytes_mut(&mut self, address: u32, len: u32) -> Result<&mut [u8], MemError> {
        let (off, _) = self.checked_range(address, len, None)?;
        Ok(&mut self.buf[off..off + len as usize])
    }

    /// Read a little-endian word from payload bytes.
    pub fn read_word(&self, address: u32) -> Result<u32, MemError> {
        let b = self.bytes(address, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Write a little-endian word into payload bytes.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<(), MemError> {
        let b = self.bytes_mut(address, 4)?;
        b.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    // ===== diagnostics =====

    /// Ordered listing of every segment, free and allocated, by address.
    pub fn map(&self) -> Vec<MapEntry> {
        let mut entries: Vec<MapEntry> = self
            .allocated
            .iter()
            .map(|s| MapEntry {
                address: s.payload(),
                size: s.size,
                owner: s.owner,
                free: false,
            })
            .chain(self.free.iter().map(|s| MapEntry {
                address: s.payload(),
                size: s.size,
                owner: None,
                free: true,
            }))
            .collect();
        entries.sort_by_key(|e| e.address);
        entries
    }

    /// True when the two lists partition the arena exactly: segments are
    /// disjoint, contiguous, and cover every byte from 0 to capacity.
    pub fn partition_holds(&self) -> bool {
        let mut segs: Vec<Segment> = self.free.iter().chain(self.allocated.iter()).copied().collect();
        segs.sort_by_key(|s| s.start);
        let mut cursor = 0u32;
        for s in &segs {
            if s.start != cursor {
                return false;
            }
            cursor = s.end();
        }
        cursor == self.capacity()
    }

    // ===== internal list maintenance =====

    /// Locate the allocated segment containing `address` and validate the
    /// requested byte count and ownership. Returns the buffer offset and the
    /// bytes remaining in the segment from `address`.
    fn checked_range(
        &self,
        address: u32,
        nbytes: u32,
        caller: Option<Pid>,
    ) -> Result<(usize, u32), MemError> {
        let seg = self
            .allocated
            .iter()
            .take_while(|s| s.payload() <= address)
            .find(|s| address >= s.payload() && address < s.end())
            .ok_or(MemError::InvalidAddress)?;
        if let (Some(owner), Some(caller)) = (seg.owner, caller) {
            if owner != caller {
                return Err(MemError::NotOwned);
            }
        }
        let remaining = seg.end() - address;
        if nbytes > remaining {
            return Err(MemError::InvalidSize);
        }
        Ok((address as usize, remaining))
    }

    /// Insert into the free list keeping ascending size order.
    fn insert_free(&mut self, seg: Segment) {
        let pos = self
            .free
            .iter()
            .position(|s| s.size >= seg.size)
            .unwrap_or(self.free.len());
        self.free.insert(pos, seg);
    }

    /// Merge `seg` with address-adjacent free neighbors, then insert.
    fn insert_free_merged(&mut self, seg: Segment) {
        let mut merged = Segment {
            start: seg.start,
            size: seg.size,
            owner: None,
        };
        if let Some(pos) = self.free.iter().position(|f| f.end() == merged.start) {
            let prior = self.free.remove(pos);
            merged.start = prior.start;
            merged.size += prior.size + HEADER_SIZE;
        }
        if let Some(pos) = self.free.iter().position(|f| f.start == merged.end()) {
            let post = self.free.remove(pos);
            merged.size += post.size + HEADER_SIZE;
        }
        self.insert_free(merged);
    }

    /// Insert into the allocated list keeping ascending address order.
    /// Finding the address already present means the lists are corrupt;
    /// that is a kernel bug, not a caller error.
    fn insert_allocated(&mut self, seg: Segment) {
        let pos = self
            .allocated
            .iter()
            .position(|s| s.start >= seg.start)
            .unwrap_or(self.allocated.len());
        if let Some(existing) = self.allocated.get(pos) {
            if existing.start == seg.start {
                panic!("arena corruption: segment {:#x} already allocated", seg.start);
            }
        }
        self.allocated.insert(pos, seg);
    }
}
