//! xtray - freedesktop System Tray manager for X11
//!
//! Claims `_NET_SYSTEM_TRAY_S<n>`, docks client icons through an embedding
//! socket, reassembles balloon messages and advertises the tray orientation.
//! The engine is `TrayManager`; the host feeds it events and reacts to the
//! notifications it returns.
//!
//! ```text
//! manage(screen) → handle_event(ev)* → [IconAdded, MessageReceived, ...]
//! ```

pub mod atoms;
pub mod backend;
pub mod daemon;
pub mod error;
pub mod icons;
pub mod keys;
pub mod manager;
pub mod messages;
pub mod protocol;
pub mod x11;
pub mod xembed;

#[cfg(test)]
mod fake;

pub use backend::{Embedder, Icon, SocketId, TrayEvent, WindowSystem};
pub use error::{Error, Result};
pub use manager::{check_running, Lifecycle, Notification, TrayConfig, TrayManager};
pub use protocol::Orientation;
