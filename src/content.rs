// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Content directory operations (spec §3.1, §4.1, §4.3). Each distinct
// clip body lives in a regular file named by its lowercase 16-hex-digit
// hash under the content directory; the same file may be referenced by
// multiple snip slots.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::hash::hash_to_hex;

/// A content file's bytes, read into memory.
///
/// The original's `content_get`/`content_unmap` pair maps the file
/// read-only; this port reads it into an owned buffer instead, since the
/// teacher's own `platform::posix` mmap machinery is reserved for the snip
/// index (the one mapping that's actually long-lived and mutated in place)
/// and content files are short-lived, write-once, read-rarely blobs for
/// which a `Vec<u8>` is the simpler and equally correct representation.
#[derive(Debug)]
pub struct Content {
    bytes: Vec<u8>,
}

impl Content {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn content_path(dir: &Path, hash: u64) -> PathBuf {
    dir.join(hash_to_hex(hash))
}

/// Open and read the content file for `hash`.
///
/// Returns `Ok(None)` if no such file exists (the original's `NOENT`);
/// other I/O failures propagate.
pub fn content_get(dir: &Path, hash: u64) -> io::Result<Option<Content>> {
    let path = content_path(dir, hash);
    match File::open(&path) {
        Ok(mut f) => {
            let mut bytes = Vec::new();
            f.read_to_end(&mut bytes)?;
            Ok(Some(Content { bytes }))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// True if a content file for `hash` already exists.
pub fn content_exists(dir: &Path, hash: u64) -> bool {
    content_path(dir, hash).exists()
}

/// Create the content file for `hash` with `text`, unless it already
/// exists.
///
/// Writes to a uniquely-named temporary file in the same directory, then
/// renames into place, so a reader never observes a partially written
/// file (spec §4.1 step 3).
pub fn content_create(dir: &Path, hash: u64, text: &str) -> io::Result<()> {
    let final_path = content_path(dir, hash);
    if final_path.exists() {
        return Ok(());
    }

    let tmp_path = dir.join(format!(".{}.tmp-{}", hash_to_hex(hash), std::process::id()));
    {
        let mut tmp = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(text.as_bytes())?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

/// Delete the content file for `hash`.
///
/// Called once the last referencing slot is removed (spec §4.3). A
/// missing file is not an error: the caller only calls this after
/// confirming no live reference remains, and a previous crash mid-unlink
/// would otherwise surface spuriously here.
pub fn content_release(dir: &Path, hash: u64) -> io::Result<()> {
    match fs::remove_file(content_path(dir, hash)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
