// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Serve-on-demand process (spec §4.4 send side, §6.3): re-serves one
// stored clip to X11 requestors and exits once all owned selections have
// been reclaimed. Ported in behavior from
// `original_source/clipmenu/src/clipserve.c`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use x11rb::connection::Connection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt, CreateWindowAux, EventMask, Property,
    PropMode, PropertyNotifyEvent, SelectionNotifyEvent, SelectionRequestEvent, Window,
    WindowClass,
};
use x11rb::protocol::Event;

use clipmenu::config::Config;
use clipmenu::hash::hash_from_hex;
use clipmenu::incr::IncrSendTable;
use clipmenu::x11::{get_chunk_size, Atoms};
use clipmenu::ClipStore;

fn parse_hash(s: &str) -> Result<u64, String> {
    if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("expected a 16-hex-digit content hash".to_string());
    }
    hash_from_hex(s).ok_or_else(|| "invalid hash".to_string())
}

/// Re-serve one stored clip to X11 requestors.
#[derive(Parser)]
#[command(name = "clipserve")]
struct Cli {
    #[arg(value_parser = parse_hash)]
    hash: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = Config::load().context("resolving configuration")?;

    let store = open_store(&cfg)?;
    let content = store.content_get(cli.hash).context("looking up content")?;
    let text = String::from_utf8_lossy(content.as_bytes()).into_owned();

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
        &CreateWindowAux::new(),
    )?;
    conn.flush()?;

    let atoms = Atoms::intern(&conn)?;
    serve_clipboard(&conn, &atoms, window, &text)
}

fn open_store(cfg: &Config) -> Result<ClipStore> {
    std::fs::create_dir_all(&cfg.cache_dir)?;
    let snip_file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(cfg.snip_file_path())?;
    Ok(ClipStore::init(snip_file, cfg.content_dir_path())?)
}

struct SelectionOwnership {
    primary: bool,
    clipboard: bool,
}

impl SelectionOwnership {
    fn any(&self) -> bool {
        self.primary || self.clipboard
    }
}

fn serve_clipboard(conn: &impl Connection, atoms: &Atoms, window: Window, text: &str) -> Result<()> {
    conn.set_selection_owner(window, atoms.primary, x11rb::CURRENT_TIME)?;
    conn.set_selection_owner(window, atoms.clipboard, x11rb::CURRENT_TIME)?;
    conn.flush()?;

    let mut owned = SelectionOwnership { primary: true, clipboard: true };
    let chunk_size = get_chunk_size(conn);
    let mut sends = IncrSendTable::new();

    while owned.any() {
        let event = conn.wait_for_event()?;
        match event {
            Event::SelectionClear(ev) => {
                if ev.selection == atoms.primary {
                    owned.primary = false;
                } else if ev.selection == atoms.clipboard {
                    owned.clipboard = false;
                }
            }
            Event::SelectionRequest(ev) => {
                handle_selection_request(conn, atoms, ev, text, chunk_size, &mut sends)?;
            }
            Event::PropertyNotify(ev) => {
                handle_property_notify(conn, ev, &mut sends)?;
            }
            Event::Error(err) => {
                if !clipmenu::x11::is_benign_error(&err) {
                    bail!("fatal X protocol error: {err:?}");
                }
            }
            _ => {}
        }
        conn.flush()?;
    }

    Ok(())
}

fn handle_selection_request(
    conn: &impl Connection,
    atoms: &Atoms,
    ev: SelectionRequestEvent,
    text: &str,
    chunk_size: usize,
    sends: &mut IncrSendTable,
) -> Result<()> {
    let property = if ev.property == x11rb::NONE { ev.target } else { ev.property };

    if ev.target == atoms.targets {
        let targets = [atoms.targets, atoms.utf8_string, AtomEnum::STRING.into()];
        conn.change_property32(PropMode::REPLACE, ev.requestor, property, AtomEnum::ATOM, &targets)?;
    } else if ev.target == atoms.utf8_string || ev.target == AtomEnum::STRING.into() {
        let bytes = text.as_bytes();
        if bytes.len() > chunk_size {
            start_incr_send(conn, atoms, ev.requestor, property, bytes, chunk_size, sends)?;
        } else {
            conn.change_property8(PropMode::REPLACE, ev.requestor, property, ev.target, bytes)?;
        }
    } else {
        notify(conn, ev, x11rb::NONE)?;
        return Ok(());
    }

    notify(conn, ev, property)
}

fn start_incr_send(
    conn: &impl Connection,
    atoms: &Atoms,
    requestor: Window,
    property: u32,
    data: &[u8],
    chunk_size: usize,
    sends: &mut IncrSendTable,
) -> Result<()> {
    conn.change_window_attributes(
        requestor,
        &ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE),
    )?;
    let size = data.len() as u32;
    conn.change_property32(PropMode::REPLACE, requestor, property, atoms.incr, &[size])?;
    sends.start(requestor, property, data.to_vec(), chunk_size);
    Ok(())
}

fn handle_property_notify(
    conn: &impl Connection,
    ev: PropertyNotifyEvent,
    sends: &mut IncrSendTable,
) -> Result<()> {
    if ev.state != Property::DELETE {
        return Ok(());
    }
    let Some(transfer) = sends.get_mut(ev.window, ev.atom) else { return Ok(()) };
    let chunk = transfer.next_chunk().to_vec();
    conn.change_property8(PropMode::REPLACE, ev.window, ev.atom, AtomEnum::STRING, &chunk)?;
    sends.remove_if_complete(ev.window, ev.atom);
    Ok(())
}

fn notify(conn: &impl Connection, ev: SelectionRequestEvent, property: u32) -> Result<()> {
    let notify = SelectionNotifyEvent {
        response_type: x11rb::protocol::xproto::SELECTION_NOTIFY_EVENT,
        sequence: 0,
        time: ev.time,
        requestor: ev.requestor,
        selection: ev.selection,
        target: ev.target,
        property,
    };
    conn.send_event(false, ev.requestor, EventMask::NO_EVENT, notify)?;
    Ok(())
}
