// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Thin adapter around `x11rb` (spec §1: "X11 event pumping, atom
// management, selection ownership" is an explicit external collaborator,
// not part of the clip store itself, but the daemon/serve binaries still
// need something to drive). Ported in behavior from
// `original_source/clipmenu/src/x.c`/`x.h`.

pub mod atoms;
pub mod window;

pub use atoms::Atoms;
pub use window::{get_chunk_size, get_window_title, is_benign_error};
