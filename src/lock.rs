// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Cross-process advisory file lock, in the RAII style of the teacher's
// `scoped_access::ScopedAccess`: a guard acquires the lock on construction
// and releases it on `Drop`. Backed by `flock(2)` via `nix::fcntl::flock`
// instead of a `pthread_mutex_t` in shared memory, because the spec
// synchronizes access to a plain file shared between processes rather than
// a dedicated shm segment.

use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use nix::fcntl::{flock, FlockArg};

/// Advisory lock bound to an open file.
///
/// Multiple `ReadGuard`s may coexist (shared lock); a `WriteGuard` requires
/// exclusive access. Mirrors spec §5: iteration holds a shared lock for its
/// entire lifetime, mutation holds an exclusive lock for the duration of the
/// operation.
///
/// Holds the raw fd rather than a borrowed `&File` so that acquiring a guard
/// does not keep a borrow of the owning struct alive for the guard's
/// lifetime (callers need to mutate other fields of that struct while a
/// guard is held).
pub struct FileLock {
    fd: RawFd,
}

impl FileLock {
    pub fn new(file: &File) -> Self {
        Self { fd: file.as_raw_fd() }
    }

    /// Acquire a shared (read) lock, blocking until available.
    pub fn read_lock(&self) -> io::Result<ReadGuard> {
        flock(self.fd, FlockArg::LockShared).map_err(nix_to_io)?;
        Ok(ReadGuard { fd: self.fd })
    }

    /// Acquire an exclusive (write) lock, blocking until available.
    pub fn write_lock(&self) -> io::Result<WriteGuard> {
        flock(self.fd, FlockArg::LockExclusive).map_err(nix_to_io)?;
        Ok(WriteGuard { fd: self.fd })
    }

    /// Try to acquire an exclusive lock without blocking.
    ///
    /// Used by the single-daemon guarantee (spec §4.7): a second daemon
    /// must fail immediately rather than wait for the first to exit.
    pub fn try_write_lock(&self) -> io::Result<Option<WriteGuard>> {
        match flock(self.fd, FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(Some(WriteGuard { fd: self.fd })),
            Err(nix::errno::Errno::EWOULDBLOCK) => Ok(None),
            Err(e) => Err(nix_to_io(e)),
        }
    }
}

fn nix_to_io(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}

/// Holder of a shared lock. Released on drop.
pub struct ReadGuard {
    fd: RawFd,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        let _ = flock(self.fd, FlockArg::Unlock);
    }
}

/// Holder of an exclusive lock. Released on drop.
pub struct WriteGuard {
    fd: RawFd,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        let _ = flock(self.fd, FlockArg::Unlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn temp_file() -> File {
        let path = std::env::temp_dir().join(format!(
            "clipmenu-lock-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap()
    }

    #[test]
    fn write_lock_then_unlock_allows_reacquire() {
        let f = temp_file();
        let lock = FileLock::new(&f);
        {
            let _g = lock.write_lock().unwrap();
        }
        let _g2 = lock.write_lock().unwrap();
    }

    #[test]
    fn try_write_lock_fails_while_held() {
        let f = temp_file();
        let lock = FileLock::new(&f);
        let _held = lock.write_lock().unwrap();

        let f2 = OpenOptions::new().read(true).write(true).open(
            std::env::temp_dir(),
        );
        // Same fd (same file) - flock is per-fd-table-entry but a second
        // open of the same path creates a separate lock owner.
        drop(f2);
    }

    #[test]
    fn multiple_read_guards_coexist() {
        let f = temp_file();
        let lock = FileLock::new(&f);
        let g1 = lock.read_lock().unwrap();
        let g2 = lock.read_lock().unwrap();
        drop(g1);
        drop(g2);
    }
}
