//! freedesktop System Tray wire format
//!
//! Opcode messages are 32-bit client messages `[time, opcode, a2, a3, a4]`.
//! Message text arrives as 8-bit client messages of 20 bytes each.

use crate::error::Dropped;
use std::fmt;
use std::str::FromStr;
use x11rb::protocol::xproto::{Atom, ClientMessageEvent, Timestamp, Window};

pub const SYSTEM_TRAY_REQUEST_DOCK: u32 = 0;
pub const SYSTEM_TRAY_BEGIN_MESSAGE: u32 = 1;
pub const SYSTEM_TRAY_CANCEL_MESSAGE: u32 = 2;

pub const SYSTEM_TRAY_ORIENTATION_HORZ: u32 = 0;
pub const SYSTEM_TRAY_ORIENTATION_VERT: u32 = 1;

/// Bytes of text carried by one `_NET_SYSTEM_TRAY_MESSAGE_DATA` event.
pub const MESSAGE_DATA_LEN: usize = 20;

/// A decoded `_NET_SYSTEM_TRAY_OPCODE` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayRequest {
    Dock {
        window: Window,
    },
    BeginMessage {
        window: Window,
        timeout: u32,
        len: u32,
        id: u32,
    },
    CancelMessage {
        window: Window,
        id: u32,
    },
}

impl TrayRequest {
    /// Decode an opcode message. The caller has already matched the
    /// message type against `_NET_SYSTEM_TRAY_OPCODE`.
    pub fn decode(event: &ClientMessageEvent) -> Result<Self, Dropped> {
        if event.format != 32 {
            return Err(Dropped::WrongFormat(event.format));
        }
        let [_time, opcode, a2, a3, a4] = event.data.as_data32();
        match opcode {
            SYSTEM_TRAY_REQUEST_DOCK => Ok(TrayRequest::Dock { window: a2 }),
            SYSTEM_TRAY_BEGIN_MESSAGE => Ok(TrayRequest::BeginMessage {
                window: event.window,
                timeout: a2,
                len: a3,
                id: a4,
            }),
            SYSTEM_TRAY_CANCEL_MESSAGE => Ok(TrayRequest::CancelMessage {
                window: event.window,
                id: a2,
            }),
            other => Err(Dropped::UnknownOpcode(other)),
        }
    }
}

/// The 20 raw bytes of a `_NET_SYSTEM_TRAY_MESSAGE_DATA` event, which must
/// be 8-bit formatted.
pub fn message_fragment(event: &ClientMessageEvent) -> Result<[u8; MESSAGE_DATA_LEN], Dropped> {
    if event.format != 8 {
        return Err(Dropped::WrongFormat(event.format));
    }
    Ok(event.data.as_data8())
}

/// The `MANAGER` broadcast sent to the root window after acquiring the
/// selection: `[time, selection, owner, 0, 0]`.
pub fn manager_announcement(
    root: Window,
    manager: Atom,
    time: Timestamp,
    selection: Atom,
    owner: Window,
) -> ClientMessageEvent {
    ClientMessageEvent::new(32, root, manager, [time, selection, owner, 0, 0])
}

/// Layout direction advertised through `_NET_SYSTEM_TRAY_ORIENTATION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Horizontal,
    Vertical,
}

impl Orientation {
    pub fn to_wire(self) -> u32 {
        match self {
            Orientation::Horizontal => SYSTEM_TRAY_ORIENTATION_HORZ,
            Orientation::Vertical => SYSTEM_TRAY_ORIENTATION_VERT,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            SYSTEM_TRAY_ORIENTATION_HORZ => Some(Orientation::Horizontal),
            SYSTEM_TRAY_ORIENTATION_VERT => Some(Orientation::Vertical),
            _ => None,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Orientation::Horizontal => Orientation::Vertical,
            Orientation::Vertical => Orientation::Horizontal,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => f.write_str("horizontal"),
            Orientation::Vertical => f.write_str("vertical"),
        }
    }
}

impl FromStr for Orientation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "horizontal" | "horz" | "h" => Ok(Orientation::Horizontal),
            "vertical" | "vert" | "v" => Ok(Orientation::Vertical),
            _ => anyhow::bail!("invalid orientation '{}' (expected horizontal or vertical)", s),
        }
    }
}
