// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Window-title lookup, the X error allow-list, and INCR chunk sizing —
// ported in behavior from `original_source/clipmenu/src/x.c`.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, Atom, AtomEnum, ConnectionExt, Window};
use x11rb::protocol::ErrorKind;
use x11rb::x11_utils::X11Error;

use super::Atoms;

/// `_NET_WM_NAME` (UTF8_STRING) if present, else `WM_NAME` (STRING).
/// Matches `x.c`'s `get_window_title` fallback order.
pub fn get_window_title(conn: &impl Connection, atoms: &Atoms, window: Window) -> Option<String> {
    get_text_property(conn, window, atoms.net_wm_name, atoms.utf8_string)
        .or_else(|| get_text_property(conn, window, atoms.wm_name, AtomEnum::STRING.into()))
}

fn get_text_property(
    conn: &impl Connection,
    window: Window,
    property: Atom,
    type_: Atom,
) -> Option<String> {
    let reply = conn
        .get_property(false, window, property, type_, 0, u32::MAX)
        .ok()?
        .reply()
        .ok()?;
    if reply.value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&reply.value).into_owned())
}

/// True if `error` is one of the benign `(request, error)` pairs the
/// original's `xerror_handler` swallows (windows that disappear mid-
/// transfer, grabs that lose a race, etc). Anything else is fatal.
pub fn is_benign_error(error: &X11Error) -> bool {
    if error.error_kind == ErrorKind::Window {
        return true;
    }
    matches!(
        (error.major_opcode, error.error_kind),
        (xproto::SET_INPUT_FOCUS_REQUEST, ErrorKind::Match)
            | (xproto::POLY_TEXT8_REQUEST, ErrorKind::Drawable)
            | (xproto::POLY_FILL_RECTANGLE_REQUEST, ErrorKind::Drawable)
            | (xproto::POLY_SEGMENT_REQUEST, ErrorKind::Drawable)
            | (xproto::CONFIGURE_WINDOW_REQUEST, ErrorKind::Match)
            | (xproto::GRAB_BUTTON_REQUEST, ErrorKind::Access)
            | (xproto::GRAB_KEY_REQUEST, ErrorKind::Access)
            | (xproto::COPY_AREA_REQUEST, ErrorKind::Drawable)
    )
}

/// A quarter of the server's maximum request size, matching `x.c`'s
/// `get_chunk_size`; falls back to 4 KiB if the connection reports zero.
pub fn get_chunk_size(conn: &impl Connection) -> usize {
    let max = conn.maximum_request_bytes();
    if max > 0 {
        (max / 4).max(1)
    } else {
        4096
    }
}
