//! the well-known names of the tray protocol, resolved once per screen

use crate::backend::WindowSystem;
use anyhow::{Context, Result};
use x11rb::protocol::xproto::Atom;

pub const MANAGER: &str = "MANAGER";
pub const UTF8_STRING: &str = "UTF8_STRING";
pub const NET_WM_NAME: &str = "_NET_WM_NAME";
pub const NET_SYSTEM_TRAY_OPCODE: &str = "_NET_SYSTEM_TRAY_OPCODE";
pub const NET_SYSTEM_TRAY_MESSAGE_DATA: &str = "_NET_SYSTEM_TRAY_MESSAGE_DATA";
pub const NET_SYSTEM_TRAY_ORIENTATION: &str = "_NET_SYSTEM_TRAY_ORIENTATION";

/// `_NET_SYSTEM_TRAY_S<screen>`
pub fn selection_name(screen: usize) -> String {
    format!("_NET_SYSTEM_TRAY_S{}", screen)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrayAtoms {
    pub selection: Atom,
    pub opcode: Atom,
    pub message_data: Atom,
    pub orientation: Atom,
    pub manager: Atom,
    pub utf8_string: Atom,
    pub net_wm_name: Atom,
}

impl TrayAtoms {
    pub fn resolve<W: WindowSystem + ?Sized>(ws: &W, screen: usize) -> Result<Self> {
        let intern = |name: &str| {
            ws.intern_atom(name)
                .with_context(|| format!("failed to intern {}", name))
        };
        Ok(Self {
            selection: intern(&selection_name(screen))?,
            opcode: intern(NET_SYSTEM_TRAY_OPCODE)?,
            message_data: intern(NET_SYSTEM_TRAY_MESSAGE_DATA)?,
            orientation: intern(NET_SYSTEM_TRAY_ORIENTATION)?,
            manager: intern(MANAGER)?,
            utf8_string: intern(UTF8_STRING)?,
            net_wm_name: intern(NET_WM_NAME)?,
        })
    }
}
