// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// The clip store (spec §3, §4.1–§4.3): a memory-mapped, cross-process-
// shared index of captured clipboard snippets, backed by a header + packed
// slot array file and a content-addressed directory of blobs.
//
// Grounded on the teacher's `platform::posix::PlatformShm` for the raw
// mmap/munmap pair and `chunk_storage.rs` for the header-plus-fixed-stride-
// array shape, generalized from a fixed-count chunk table to a
// monotonically growing slot array.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::ptr;

use crate::content;
use crate::error::{Result, StoreError};
use crate::hash::hash_bytes;
use crate::line::{first_line, SNIP_LINE_SIZE};
use crate::lock::FileLock;

/// Slots added per capacity growth (spec §4.2).
pub const SNIP_ALLOC_BATCH: usize = 64;

const MAGIC: u64 = 0x436c_6970_4d65_6e75; // b"ClipMenu" read as a native-endian u64

#[repr(C)]
struct Header {
    magic: u64,
    nr_snips: u64,
    nr_snips_alloc: u64,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct RawSlot {
    hash: u64,
    nr_lines: u32,
    line: [u8; SNIP_LINE_SIZE],
}

fn header_size() -> usize {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page = if page > 0 { page as usize } else { 4096 };
    page.max(std::mem::size_of::<Header>())
}

fn snip_size() -> usize {
    std::mem::size_of::<RawSlot>()
}

/// Insertion deduplication policy (spec §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupPolicy {
    /// Always append a new slot; content files are reused by hash.
    KeepAll,
    /// Move an existing slot with the same hash to the newest position
    /// instead of inserting a duplicate.
    KeepLast,
}

/// Iteration / ordinal-addressing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterDir {
    OldestFirst,
    NewestFirst,
}

bitflags::bitflags! {
    /// Flags a `remove` predicate returns for the slot it was just given.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RemoveAction: u8 {
        const REMOVE = 1 << 0;
        const STOP = 1 << 1;
    }
}

/// A decoded snip: hash, line count, and first line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snip {
    pub hash: u64,
    pub nr_lines: u32,
    pub line: String,
}

/// The clip store: binds a snip index file and a content directory.
///
/// `destroy` from the original API is expressed as `Drop` — the mapping is
/// always unmapped exactly once, whether the caller does it explicitly or
/// lets the value go out of scope.
#[derive(Debug)]
pub struct ClipStore {
    snip_file: File,
    content_dir: PathBuf,
    map_ptr: *mut u8,
    map_len: usize,
}

// SAFETY: `map_ptr` points at a `MAP_SHARED` mapping of `snip_file`; all
// access to it goes through methods that acquire the file lock first, so
// sending a `ClipStore` across threads is sound as long as the caller
// doesn't use it from two threads at once (it has no internal locking for
// the in-process case, matching its single-threaded-per-process design,
// spec §5).
unsafe impl Send for ClipStore {}

impl ClipStore {
    /// Bind to `snip_file` and `content_dir`, creating and zero-
    /// initializing the snip file if it is empty (spec §4.1 `init`).
    pub fn init(snip_file: File, content_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&content_dir)?;
        let hsize = header_size() as u64;
        let ssize = snip_size() as u64;

        let len = snip_file.metadata()?.len();
        let was_empty = len == 0;
        if was_empty {
            snip_file.set_len(hsize)?;
        } else if len < hsize || (len - hsize) % ssize != 0 {
            return Err(StoreError::Invalid);
        }

        let mut store = ClipStore {
            snip_file,
            content_dir,
            map_ptr: ptr::null_mut(),
            map_len: 0,
        };
        store.remap()?;

        if was_empty {
            let header = store.header_mut();
            header.magic = MAGIC;
            header.nr_snips = 0;
            header.nr_snips_alloc = 0;
        } else {
            let header = store.header();
            if header.magic != MAGIC {
                return Err(StoreError::Invalid);
            }
            let expected = hsize + header.nr_snips_alloc * ssize;
            if expected != len {
                return Err(StoreError::Invalid);
            }
        }

        Ok(store)
    }

    fn remap(&mut self) -> Result<()> {
        let len = self.snip_file.metadata()?.len() as usize;
        self.unmap();

        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.snip_file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(StoreError::Io(io::Error::last_os_error()));
        }
        self.map_ptr = ptr as *mut u8;
        self.map_len = len;
        Ok(())
    }

    fn unmap(&mut self) {
        if !self.map_ptr.is_null() {
            unsafe {
                libc::munmap(self.map_ptr as *mut libc::c_void, self.map_len);
            }
            self.map_ptr = ptr::null_mut();
            self.map_len = 0;
        }
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.map_ptr as *const Header) }
    }

    fn header_mut(&mut self) -> &mut Header {
        unsafe { &mut *(self.map_ptr as *mut Header) }
    }

    fn slot(&self, index: usize) -> &RawSlot {
        let offset = header_size() + index * snip_size();
        unsafe { &*(self.map_ptr.add(offset) as *const RawSlot) }
    }

    fn slot_mut(&mut self, index: usize) -> &mut RawSlot {
        let offset = header_size() + index * snip_size();
        unsafe { &mut *(self.map_ptr.add(offset) as *mut RawSlot) }
    }

    fn lock(&self) -> FileLock {
        FileLock::new(&self.snip_file)
    }

    /// Live slot count (spec §4.1 `len`).
    pub fn len(&self) -> Result<usize> {
        let _g = self.lock().read_lock()?;
        Ok(self.header().nr_snips as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Current slot-array capacity (spec §4.2, testable property §8.1.5).
    pub fn capacity(&self) -> Result<usize> {
        let _g = self.lock().read_lock()?;
        Ok(self.header().nr_snips_alloc as usize)
    }

    /// Acquire a [`RefGuard`] holding the shared lock for the duration of
    /// iteration (spec §3.2, §4.1 `ref`).
    pub fn ref_guard(&self) -> Result<RefGuard<'_>> {
        let g = self.lock().read_lock()?;
        Ok(RefGuard { store: self, _lock: g })
    }

    /// Read the content file for `hash` (spec §4.1 `content_get`).
    pub fn content_get(&self, hash: u64) -> Result<content::Content> {
        content::content_get(&self.content_dir, hash)?.ok_or(StoreError::NotFound(hash))
    }

    fn grow(&mut self) -> Result<()> {
        let hsize = header_size() as u64;
        let ssize = snip_size() as u64;
        let old_alloc = self.header().nr_snips_alloc;
        let new_alloc = old_alloc + SNIP_ALLOC_BATCH as u64;
        let new_len = hsize + new_alloc * ssize;
        self.snip_file.set_len(new_len)?;
        self.remap()?;
        self.header_mut().nr_snips_alloc = new_alloc;
        Ok(())
    }

    fn decode_slot(&self, index: usize) -> Snip {
        let slot = self.slot(index);
        let nul = slot.line.iter().position(|&b| b == 0).unwrap_or(slot.line.len());
        let line = String::from_utf8_lossy(&slot.line[..nul]).into_owned();
        Snip { hash: slot.hash, nr_lines: slot.nr_lines, line }
    }

    fn encode_slot(&mut self, index: usize, hash: u64, nr_lines: u32, line: &str) {
        let bytes = line.as_bytes();
        let n = bytes.len().min(SNIP_LINE_SIZE - 1);
        let slot = self.slot_mut(index);
        slot.hash = hash;
        slot.nr_lines = nr_lines;
        slot.line[..n].copy_from_slice(&bytes[..n]);
        slot.line[n..].fill(0);
    }

    /// Count of live slots referencing `hash`, excluding `skip_index` (used
    /// while a slot's old hash is being replaced, before the slot itself is
    /// updated).
    fn other_refs(&self, hash: u64, skip_index: Option<usize>) -> usize {
        let nr = self.header().nr_snips as usize;
        (0..nr)
            .filter(|&i| Some(i) != skip_index && self.slot(i).hash == hash)
            .count()
    }

    /// Insert `text` under `policy` (spec §4.1 `add`).
    pub fn add(&mut self, text: &str, policy: DedupPolicy) -> Result<u64> {
        let _g = self.lock().write_lock()?;
        let hash = hash_bytes(text.as_bytes());
        let nr = self.header().nr_snips as usize;

        if policy == DedupPolicy::KeepLast {
            if let Some(i) = (0..nr).find(|&i| self.slot(i).hash == hash) {
                if i < nr - 1 {
                    let moved = *self.slot(i);
                    for j in i..nr - 1 {
                        let next = *self.slot(j + 1);
                        *self.slot_mut(j) = next;
                    }
                    *self.slot_mut(nr - 1) = moved;
                }
                return Ok(hash);
            }
        }

        if nr == self.header().nr_snips_alloc as usize {
            self.grow()?;
        }

        if !content::content_exists(&self.content_dir, hash) {
            content::content_create(&self.content_dir, hash, text)?;
        }

        let (line, nr_lines) = first_line(text);
        self.encode_slot(nr, hash, nr_lines, &line);
        self.header_mut().nr_snips = nr as u64 + 1;

        Ok(hash)
    }

    fn remove_slot_at(&mut self, idx: usize, nr: &mut usize) -> Result<()> {
        let hash = self.slot(idx).hash;
        let n = *nr;
        for j in idx..n - 1 {
            let next = *self.slot(j + 1);
            *self.slot_mut(j) = next;
        }
        *nr = n - 1;
        self.header_mut().nr_snips = *nr as u64;
        if self.other_refs(hash, None) == 0 {
            content::content_release(&self.content_dir, hash)?;
        }
        Ok(())
    }

    /// Remove slots matching `predicate`, walking in `dir` order (spec §4.1
    /// `remove`). Returns the number of slots removed.
    pub fn remove<F>(&mut self, dir: IterDir, mut predicate: F) -> Result<usize>
    where
        F: FnMut(u64, &str) -> RemoveAction,
    {
        let _g = self.lock().write_lock()?;
        let mut nr = self.header().nr_snips as usize;
        if nr == 0 {
            return Ok(0);
        }

        let mut removed = 0usize;
        let mut i: isize = match dir {
            IterDir::OldestFirst => 0,
            IterDir::NewestFirst => nr as isize - 1,
        };

        while i >= 0 && (i as usize) < nr {
            let idx = i as usize;
            let snip = self.decode_slot(idx);
            let action = predicate(snip.hash, &snip.line);
            let do_remove = action.contains(RemoveAction::REMOVE);
            let stop = action.contains(RemoveAction::STOP);

            if do_remove {
                self.remove_slot_at(idx, &mut nr)?;
                removed += 1;
                if dir == IterDir::NewestFirst {
                    i -= 1;
                }
                // OldestFirst: the next slot shifted into `idx`, so the
                // cursor stays put.
            } else {
                match dir {
                    IterDir::OldestFirst => i += 1,
                    IterDir::NewestFirst => i -= 1,
                }
            }

            if stop {
                break;
            }
        }

        Ok(removed)
    }

    /// Discard all but the `keep_n` newest (`dir = NewestFirst`) or oldest
    /// (`dir = OldestFirst`) slots (spec §4.1 `trim`). No-op if the store
    /// already has `keep_n` or fewer live slots.
    pub fn trim(&mut self, dir: IterDir, keep_n: usize) -> Result<()> {
        let _g = self.lock().write_lock()?;
        let mut nr = self.header().nr_snips as usize;
        if nr <= keep_n {
            return Ok(());
        }
        let to_remove = nr - keep_n;
        match dir {
            IterDir::NewestFirst => {
                for _ in 0..to_remove {
                    self.remove_slot_at(0, &mut nr)?;
                }
            }
            IterDir::OldestFirst => {
                for _ in 0..to_remove {
                    self.remove_slot_at(nr - 1, &mut nr)?;
                }
            }
        }
        Ok(())
    }

    /// Overwrite the content at ordinal position `ordinal` (0 = the first
    /// slot visited in `dir` order) with `new_text` (spec §4.1 `replace`).
    /// Fails `Range` if `ordinal >= len`.
    pub fn replace(&mut self, dir: IterDir, ordinal: usize, new_text: &str) -> Result<u64> {
        let _g = self.lock().write_lock()?;
        let nr = self.header().nr_snips as usize;
        if ordinal >= nr {
            return Err(StoreError::Range { index: ordinal, len: nr });
        }
        let idx = match dir {
            IterDir::NewestFirst => nr - 1 - ordinal,
            IterDir::OldestFirst => ordinal,
        };

        let old_hash = self.slot(idx).hash;
        let new_hash = hash_bytes(new_text.as_bytes());

        if new_hash != old_hash {
            if !content::content_exists(&self.content_dir, new_hash) {
                content::content_create(&self.content_dir, new_hash, new_text)?;
            }
            if self.other_refs(old_hash, Some(idx)) == 0 {
                content::content_release(&self.content_dir, old_hash)?;
            }
        }

        let (line, nr_lines) = first_line(new_text);
        self.encode_slot(idx, new_hash, nr_lines, &line);

        Ok(new_hash)
    }
}

impl Drop for ClipStore {
    fn drop(&mut self) {
        self.unmap();
    }
}

/// Scoped holder of the shared lock, required to iterate (spec §3.2).
pub struct RefGuard<'a> {
    store: &'a ClipStore,
    _lock: crate::lock::ReadGuard,
}

impl<'a> RefGuard<'a> {
    pub fn iter(&self, dir: IterDir) -> SnipIter<'a> {
        let nr = self.store.header().nr_snips as usize;
        let next = match (dir, nr) {
            (_, 0) => None,
            (IterDir::OldestFirst, _) => Some(0),
            (IterDir::NewestFirst, _) => Some(nr - 1),
        };
        SnipIter { store: self.store, dir, next, remaining: nr }
    }
}

/// Stateless-cursor iterator over live snips (spec §4.1 `snip_iter`).
pub struct SnipIter<'a> {
    store: &'a ClipStore,
    dir: IterDir,
    next: Option<usize>,
    remaining: usize,
}

impl Iterator for SnipIter<'_> {
    type Item = Snip;

    fn next(&mut self) -> Option<Snip> {
        let idx = self.next?;
        let snip = self.store.decode_slot(idx);
        self.remaining -= 1;
        self.next = if self.remaining == 0 {
            None
        } else {
            match self.dir {
                IterDir::OldestFirst => Some(idx + 1),
                IterDir::NewestFirst => Some(idx - 1),
            }
        };
        Some(snip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn temp_paths() -> (File, PathBuf) {
        let base = std::env::temp_dir().join(format!(
            "clipmenu-store-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&base).unwrap();
        let snip_path = base.join("line_cache");
        let content_dir = base.join("content");
        let snip_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&snip_path)
            .unwrap();
        (snip_file, content_dir)
    }

    fn open_store() -> ClipStore {
        let (f, dir) = temp_paths();
        ClipStore::init(f, dir).unwrap()
    }

    #[test]
    fn init_on_empty_file_starts_at_zero() {
        let store = open_store();
        assert_eq!(store.len().unwrap(), 0);
        assert_eq!(store.capacity().unwrap(), 0);
    }

    #[test]
    fn add_then_len_and_iterate() {
        let mut store = open_store();
        store.add("hello", DedupPolicy::KeepAll).unwrap();
        store.add("world", DedupPolicy::KeepAll).unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let guard = store.ref_guard().unwrap();
        let lines: Vec<String> = guard.iter(IterDir::OldestFirst).map(|s| s.line).collect();
        assert_eq!(lines, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn newest_first_is_reverse_of_oldest_first() {
        let mut store = open_store();
        for v in ["0", "1", "2", "3"] {
            store.add(v, DedupPolicy::KeepAll).unwrap();
        }
        let guard = store.ref_guard().unwrap();
        let mut oldest: Vec<_> = guard.iter(IterDir::OldestFirst).map(|s| s.line).collect();
        let newest: Vec<_> = guard.iter(IterDir::NewestFirst).map(|s| s.line).collect();
        oldest.reverse();
        assert_eq!(oldest, newest);
    }

    #[test]
    fn keep_last_moves_existing_slot_to_newest() {
        let mut store = open_store();
        store.add("duplicate", DedupPolicy::KeepAll).unwrap();
        store.add("duplicate", DedupPolicy::KeepAll).unwrap();
        assert_eq!(store.len().unwrap(), 2);

        store.add("duplicate", DedupPolicy::KeepLast).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn capacity_grows_across_batch_boundary() {
        let mut store = open_store();
        for i in 0..(SNIP_ALLOC_BATCH + 1) {
            store.add(&i.to_string(), DedupPolicy::KeepAll).unwrap();
        }
        assert_eq!(store.len().unwrap(), SNIP_ALLOC_BATCH + 1);
        assert!(store.capacity().unwrap() >= SNIP_ALLOC_BATCH);
    }

    #[test]
    fn replace_out_of_range_is_range_error() {
        let mut store = open_store();
        store.add("only", DedupPolicy::KeepAll).unwrap();
        let err = store.replace(IterDir::NewestFirst, 1, "x").unwrap_err();
        assert!(matches!(err, StoreError::Range { index: 1, len: 1 }));
    }

    #[test]
    fn trim_on_empty_store_is_a_no_op() {
        let mut store = open_store();
        store.trim(IterDir::NewestFirst, 5).unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn remove_on_empty_store_never_invokes_predicate() {
        let mut store = open_store();
        let mut calls = 0;
        store
            .remove(IterDir::OldestFirst, |_, _| {
                calls += 1;
                RemoveAction::empty()
            })
            .unwrap();
        assert_eq!(calls, 0);
    }

    #[test]
    fn content_get_missing_hash_is_not_found() {
        let store = open_store();
        let err = store.content_get(0xdead_beef).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(0xdead_beef)));
    }

    #[test]
    fn reopening_recovers_entries() {
        let base = std::env::temp_dir().join(format!(
            "clipmenu-store-reopen-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&base).unwrap();
        let snip_path = base.join("line_cache");
        let content_dir = base.join("content");

        let open = || {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&snip_path)
                .unwrap()
        };

        {
            let mut store = ClipStore::init(open(), content_dir.clone()).unwrap();
            store.add("persisted", DedupPolicy::KeepAll).unwrap();
        }

        let store = ClipStore::init(open(), content_dir).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        let guard = store.ref_guard().unwrap();
        let lines: Vec<_> = guard.iter(IterDir::OldestFirst).map(|s| s.line).collect();
        assert_eq!(lines, vec!["persisted".to_string()]);
    }
}
