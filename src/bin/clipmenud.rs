// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Capture daemon (spec §4.4 receive side, §4.5, §4.6, §4.7, §4.8): watches
// PRIMARY/CLIPBOARD ownership changes, converts new selections to
// UTF8_STRING, folds salient text into the clip store, and responds to
// SIGUSR1/SIGUSR2 by toggling capture. Ported in behavior from
// `original_source/clipmenu/src/clipmenud.c`.

use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use x11rb::connection::Connection;
use x11rb::protocol::xfixes::{self, ConnectionExt as _, SelectionEventMask};
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt as _, CreateWindowAux, EventMask, Property, PropertyNotifyEvent,
    SelectionNotifyEvent, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use clipmenu::config::Config;
use clipmenu::hash::{hash_bytes, hash_to_hex};
use clipmenu::incr::IncrReceiveTable;
use clipmenu::line::is_salient_text;
use clipmenu::lock::{FileLock, WriteGuard};
use clipmenu::x11::{get_window_title, is_benign_error, Atoms};
use clipmenu::{ClipStore, DedupPolicy, IterDir};

/// Watch PRIMARY/CLIPBOARD and record salient selections into the clip store.
#[derive(Parser)]
#[command(name = "clipmenud")]
struct Cli;

/// Selections arriving within this long of the previous capture on the
/// same selection are checked for prefix/suffix overlap and merged into
/// the existing slot instead of appended as a new one (spec §4.5).
const PARTIAL_MAX: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    env_logger::init();
    Cli::parse();
    let cfg = Config::load().context("resolving configuration")?;

    std::fs::create_dir_all(&cfg.runtime_dir).context("creating runtime dir")?;
    let session_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(cfg.session_lock_path())
        .context("opening session lock file")?;
    let _session_guard = acquire_session_lock(&session_file)?;

    std::fs::create_dir_all(&cfg.cache_dir).context("creating cache dir")?;
    let snip_file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(cfg.snip_file_path())
        .context("opening snip file")?;
    let store = ClipStore::init(snip_file, cfg.content_dir_path()).context("opening clip store")?;

    let mut daemon = Daemon::new(cfg, store)?;
    daemon.write_status()?;

    if daemon.cfg.oneshot {
        return daemon.capture_all_once();
    }

    daemon.run()
}

/// Fail fast if another `clipmenud` already holds the session lock (spec
/// §4.7): a non-blocking exclusive `flock` either succeeds immediately or
/// tells us someone else is running.
fn acquire_session_lock(file: &std::fs::File) -> Result<WriteGuard> {
    FileLock::new(file)
        .try_write_lock()
        .context("locking session file")?
        .ok_or_else(|| anyhow::anyhow!("clipmenud is already running for this session"))
}

struct PendingConvert {
    selection: u32,
    property: u32,
}

struct LastCapture {
    selection: u32,
    text: String,
    at: Instant,
}

struct Daemon {
    cfg: Config,
    store: ClipStore,
    conn: RustConnection,
    window: Window,
    atoms: Atoms,
    enabled: bool,
    incr: IncrReceiveTable,
    pending: Vec<PendingConvert>,
    last_capture: Option<LastCapture>,
    since_trim: usize,
}

impl Daemon {
    fn new(cfg: Config, store: ClipStore) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("connecting to X server")?;
        let screen = conn.setup().roots[screen_num].clone();
        let window = conn.generate_id()?;
        conn.create_window(
            0,
            window,
            screen.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new().event_mask(EventMask::PROPERTY_CHANGE),
        )?;
        conn.xfixes_query_version(5, 0)?
            .reply()
            .context("querying XFIXES version")?;

        let atoms = Atoms::intern(&conn)?;
        let watch_mask = SelectionEventMask::SET_SELECTION_OWNER
            | SelectionEventMask::SELECTION_WINDOW_DESTROY
            | SelectionEventMask::SELECTION_CLIENT_CLOSE;
        if cfg.selections.primary {
            conn.xfixes_select_selection_input(window, atoms.primary, watch_mask)?;
        }
        if cfg.selections.clipboard {
            conn.xfixes_select_selection_input(window, atoms.clipboard, watch_mask)?;
        }
        conn.flush()?;

        Ok(Self {
            cfg,
            store,
            conn,
            window,
            atoms,
            enabled: true,
            incr: IncrReceiveTable::new(),
            pending: Vec::new(),
            last_capture: None,
            since_trim: 0,
        })
    }

    fn write_status(&self) -> Result<()> {
        std::fs::write(self.cfg.status_file_path(), if self.enabled { b"1" } else { b"0" })
            .context("writing status file")
    }

    /// Capture whatever PRIMARY/CLIPBOARD currently hold, once, without
    /// entering the steady-state event loop (spec §4.8 `oneshot`).
    fn capture_all_once(&mut self) -> Result<()> {
        if self.cfg.selections.primary {
            self.request_convert(self.atoms.primary)?;
        }
        if self.cfg.selections.clipboard {
            self.request_convert(self.atoms.clipboard)?;
        }
        self.conn.flush()?;

        while !self.pending.is_empty() {
            let event = self.conn.wait_for_event()?;
            self.handle_event(event)?;
            self.conn.flush()?;
        }
        Ok(())
    }

    fn run(&mut self) -> Result<()> {
        let mut mask = SigSet::empty();
        mask.add(Signal::SIGUSR1);
        mask.add(Signal::SIGUSR2);
        mask.thread_block().context("blocking capture-toggle signals")?;
        let mut signal_fd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK).context("creating signalfd")?;

        loop {
            while let Some(event) = self.conn.poll_for_event()? {
                self.handle_event(event)?;
            }
            self.conn.flush()?;

            let x_fd = unsafe { BorrowedFd::borrow_raw(self.conn.stream().as_raw_fd()) };
            let sig_fd = unsafe { BorrowedFd::borrow_raw(signal_fd.as_raw_fd()) };
            let mut fds = [PollFd::new(&x_fd, PollFlags::POLLIN), PollFd::new(&sig_fd, PollFlags::POLLIN)];
            poll(&mut fds, -1).context("polling for events")?;

            if fds[1].revents().is_some_and(|r| r.contains(PollFlags::POLLIN)) {
                while let Ok(Some(info)) = signal_fd.read_signal() {
                    self.handle_signal(info.ssi_signo as i32)?;
                }
            }
        }
    }

    fn handle_signal(&mut self, signo: i32) -> Result<()> {
        if signo == Signal::SIGUSR1 as i32 {
            self.enabled = false;
            self.write_status()?;
        } else if signo == Signal::SIGUSR2 as i32 {
            self.enabled = true;
            self.write_status()?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::XfixesSelectionNotify(ev) => self.handle_selection_owner_change(ev)?,
            Event::SelectionNotify(ev) => self.handle_selection_notify(ev)?,
            Event::PropertyNotify(ev) => self.handle_property_notify(ev)?,
            Event::Error(err) => {
                if !is_benign_error(&err) {
                    bail!("fatal X protocol error: {err:?}");
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_selection_owner_change(&mut self, ev: xfixes::SelectionNotifyEvent) -> Result<()> {
        if !self.enabled || ev.owner == x11rb::NONE || ev.owner == self.window {
            return Ok(());
        }
        if self.is_excluded_window(ev.owner) {
            return Ok(());
        }
        self.request_convert(ev.selection)?;
        self.conn.flush()?;
        Ok(())
    }

    /// True for the daemon's own `clipserve` helper (spec §4.8
    /// self-exclusion) or a window title matching `ignore_window`.
    fn is_excluded_window(&self, window: Window) -> bool {
        let Some(title) = get_window_title(&self.conn, &self.atoms, window) else {
            return false;
        };
        if title == "clipserve" {
            return true;
        }
        self.cfg.ignore_window.as_ref().is_some_and(|re| re.is_match(&title))
    }

    /// Request `selection` be converted to UTF8_STRING, tracking the
    /// reply under a per-selection property so concurrent PRIMARY and
    /// CLIPBOARD conversions never collide.
    fn request_convert(&mut self, selection: u32) -> Result<()> {
        let property = selection;
        self.conn
            .convert_selection(self.window, selection, self.atoms.utf8_string, property, x11rb::CURRENT_TIME)?;
        self.pending.push(PendingConvert { selection, property });
        Ok(())
    }

    fn handle_selection_notify(&mut self, ev: SelectionNotifyEvent) -> Result<()> {
        let Some(idx) = self
            .pending
            .iter()
            .position(|p| p.selection == ev.selection && p.property == ev.property)
        else {
            return Ok(());
        };

        if ev.property == x11rb::NONE {
            self.pending.remove(idx);
            return Ok(());
        }

        let reply = self
            .conn
            .get_property(false, self.window, ev.property, AtomEnum::ANY, 0, u32::MAX)?
            .reply()?;

        if reply.type_ == self.atoms.incr {
            self.incr.start(self.window, ev.property);
            self.conn.delete_property(self.window, ev.property)?;
            return Ok(());
        }

        self.pending.remove(idx);
        self.conn.delete_property(self.window, ev.property)?;
        let text = String::from_utf8_lossy(&reply.value).into_owned();
        self.store_capture(ev.selection, text)
    }

    fn handle_property_notify(&mut self, ev: PropertyNotifyEvent) -> Result<()> {
        if ev.state != Property::NEW_VALUE {
            return Ok(());
        }
        if self.incr.get_mut(ev.window, ev.atom).is_none() {
            return Ok(());
        }

        let reply = self
            .conn
            .get_property(false, ev.window, ev.atom, AtomEnum::ANY, 0, u32::MAX)?
            .reply()?;
        self.incr.get_mut(ev.window, ev.atom).unwrap().push_chunk(&reply.value);
        self.conn.delete_property(ev.window, ev.atom)?;

        let Some(done) = self.incr.take_completed(ev.window, ev.atom) else {
            return Ok(());
        };
        let Some(pos) = self.pending.iter().position(|p| p.property == ev.atom) else {
            return Ok(());
        };
        let selection = self.pending.remove(pos).selection;
        self.store_capture(selection, done.finish())
    }

    fn store_capture(&mut self, selection: u32, text: String) -> Result<()> {
        if !is_salient_text(&text) {
            return Ok(());
        }

        if let Some(last) = &self.last_capture {
            if last.selection == selection && last.at.elapsed() <= PARTIAL_MAX {
                if let Some(merged) = merge_partial(&last.text, &text) {
                    self.store.replace(IterDir::NewestFirst, 0, &merged)?;
                    self.last_capture = Some(LastCapture { selection, text: merged, at: Instant::now() });
                    return Ok(());
                }
            }
        }

        let policy = if self.cfg.deduplicate { DedupPolicy::KeepLast } else { DedupPolicy::KeepAll };
        self.store.add(&text, policy)?;
        self.last_capture = Some(LastCapture { selection, text: text.clone(), at: Instant::now() });
        self.maybe_trim()?;

        if self.cfg.own_clipboard && self.selection_is_owned(selection) {
            self.spawn_clipserve(&text)?;
        }

        Ok(())
    }

    /// Whether `own_clipboard` applies to `selection`, per
    /// `cfg.owned_selections`.
    fn selection_is_owned(&self, selection: u32) -> bool {
        if selection == self.atoms.primary {
            self.cfg.owned_selections.primary
        } else if selection == self.atoms.clipboard {
            self.cfg.owned_selections.clipboard
        } else {
            false
        }
    }

    /// Trim in batches of `max_clips_batch` inserts rather than on every
    /// single one, so trimming doesn't take the exclusive lock on every
    /// capture (spec §4.8).
    fn maybe_trim(&mut self) -> Result<()> {
        self.since_trim += 1;
        if self.since_trim < self.cfg.max_clips_batch {
            return Ok(());
        }
        self.since_trim = 0;

        let len = self.store.len()?;
        if len > self.cfg.max_clips {
            self.store.trim(IterDir::NewestFirst, self.cfg.max_clips)?;
        }
        Ok(())
    }

    fn spawn_clipserve(&self, text: &str) -> Result<()> {
        let hex = hash_to_hex(hash_bytes(text.as_bytes()));
        std::process::Command::new("clipserve")
            .arg(hex)
            .spawn()
            .context("spawning clipserve")?;
        Ok(())
    }
}

/// If `old` and `new` are related by one being a prefix or suffix of the
/// other, return the merged (i.e. newer) text so the caller can replace
/// the previous slot instead of appending a near-duplicate one (spec
/// §4.5). The user may grow a drag-select (`new` extends `old`) or shrink
/// one back down (`old` extends `new`); both are partials.
fn merge_partial(old: &str, new: &str) -> Option<String> {
    if old.is_empty() {
        return None;
    }
    let is_partial =
        old.starts_with(new) || old.ends_with(new) || new.starts_with(old) || new.ends_with(old);
    if is_partial {
        Some(new.to_string())
    } else {
        None
    }
}
