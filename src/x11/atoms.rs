// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 clipmenu contributors
//
// Atom interning. A small fixed set of well-known atoms is looked up once
// per connection and cached, rather than re-interning on every use.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, ConnectionExt};

/// Atoms the daemon/serve processes reference repeatedly.
pub struct Atoms {
    pub clipboard: Atom,
    pub primary: Atom,
    pub incr: Atom,
    pub utf8_string: Atom,
    pub targets: Atom,
    pub net_wm_name: Atom,
    pub wm_name: Atom,
}

impl Atoms {
    pub fn intern(conn: &impl Connection) -> Result<Self, x11rb::errors::ReplyError> {
        let clipboard = conn.intern_atom(false, b"CLIPBOARD")?;
        let incr = conn.intern_atom(false, b"INCR")?;
        let utf8_string = conn.intern_atom(false, b"UTF8_STRING")?;
        let targets = conn.intern_atom(false, b"TARGETS")?;
        let net_wm_name = conn.intern_atom(false, b"_NET_WM_NAME")?;

        Ok(Self {
            clipboard: clipboard.reply()?.atom,
            primary: x11rb::protocol::xproto::AtomEnum::PRIMARY.into(),
            incr: incr.reply()?.atom,
            utf8_string: utf8_string.reply()?.atom,
            targets: targets.reply()?.atom,
            net_wm_name: net_wm_name.reply()?.atom,
            wm_name: x11rb::protocol::xproto::AtomEnum::WM_NAME.into(),
        })
    }
}
