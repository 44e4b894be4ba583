// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;

use clipmenu::ClipStore;

/// A fresh, unique pair of (snip file path, content dir path) under the OS
/// temp dir, so concurrent test runs never collide.
pub fn temp_store_paths(label: &str) -> (PathBuf, PathBuf) {
    let base = std::env::temp_dir().join(format!(
        "clipmenu-itest-{label}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::create_dir_all(&base).unwrap();
    (base.join("line_cache"), base.join("content"))
}

pub fn open_snip_file(path: &std::path::Path) -> File {
    OpenOptions::new().read(true).write(true).create(true).open(path).unwrap()
}

pub fn open_store(label: &str) -> ClipStore {
    let (snip_path, content_dir) = temp_store_paths(label);
    ClipStore::init(open_snip_file(&snip_path), content_dir).unwrap()
}
