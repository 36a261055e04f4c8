//! seams between the tray engine and the outside world
//!
//! `WindowSystem` is the X server as the engine needs it: atoms, selections,
//! client messages and a couple of properties. `Embedder` is the toolkit
//! side that owns the sockets foreign windows get embedded into. Both take
//! `&self` like x11rb requests do; implementors keep their own state behind
//! `RefCell` where they need to mutate.

use anyhow::Result;
use std::fmt;
use std::rc::Rc;
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, EventMask, SelectionClearEvent, Timestamp, Window,
};

pub trait WindowSystem {
    /// Intern `name`, creating the atom if needed.
    fn intern_atom(&self, name: &str) -> Result<Atom>;

    /// Look `name` up without creating it.
    fn lookup_atom(&self, name: &str) -> Result<Option<Atom>>;

    fn root_window(&self, screen: usize) -> Result<Window>;

    /// Create the invisible window that will own the selection. It is
    /// never mapped and listens for property and structure events.
    fn create_owner_window(&self, screen: usize) -> Result<Window>;

    fn destroy_window(&self, window: Window) -> Result<()>;

    /// Current time on the server's clock, obtained through `window`.
    fn server_time(&self, window: Window) -> Result<Timestamp>;

    /// Owner of `selection`, `x11rb::NONE` when unowned.
    fn selection_owner(&self, selection: Atom) -> Result<Window>;

    fn set_selection_owner(&self, owner: Window, selection: Atom, time: Timestamp) -> Result<()>;

    fn send_client_message(
        &self,
        destination: Window,
        mask: EventMask,
        event: ClientMessageEvent,
    ) -> Result<()>;

    /// Replace `property` on `window` with a single CARDINAL.
    fn set_cardinal_property(&self, window: Window, property: Atom, value: u32) -> Result<()>;

    /// Read a format-8 property of type `type_`. `None` if it is missing,
    /// of another type or format, or the window is gone.
    fn get_utf8_property(&self, window: Window, property: Atom, type_: Atom)
        -> Result<Option<Vec<u8>>>;

    fn flush(&self) -> Result<()>;
}

impl<T: WindowSystem + ?Sized> WindowSystem for Rc<T> {
    fn intern_atom(&self, name: &str) -> Result<Atom> {
        (**self).intern_atom(name)
    }

    fn lookup_atom(&self, name: &str) -> Result<Option<Atom>> {
        (**self).lookup_atom(name)
    }

    fn root_window(&self, screen: usize) -> Result<Window> {
        (**self).root_window(screen)
    }

    fn create_owner_window(&self, screen: usize) -> Result<Window> {
        (**self).create_owner_window(screen)
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        (**self).destroy_window(window)
    }

    fn server_time(&self, window: Window) -> Result<Timestamp> {
        (**self).server_time(window)
    }

    fn selection_owner(&self, selection: Atom) -> Result<Window> {
        (**self).selection_owner(selection)
    }

    fn set_selection_owner(&self, owner: Window, selection: Atom, time: Timestamp) -> Result<()> {
        (**self).set_selection_owner(owner, selection, time)
    }

    fn send_client_message(
        &self,
        destination: Window,
        mask: EventMask,
        event: ClientMessageEvent,
    ) -> Result<()> {
        (**self).send_client_message(destination, mask, event)
    }

    fn set_cardinal_property(&self, window: Window, property: Atom, value: u32) -> Result<()> {
        (**self).set_cardinal_property(window, property, value)
    }

    fn get_utf8_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
    ) -> Result<Option<Vec<u8>>> {
        (**self).get_utf8_property(window, property, type_)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Opaque handle to an embedding socket owned by the toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u32);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket#{}", self.0)
    }
}

/// A docked tray icon: the client's window and the socket hosting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Icon {
    pub window: Window,
    pub socket: SocketId,
}

pub trait Embedder {
    /// Create a socket for `window`. The socket remembers the window so the
    /// toolkit can report it back in `TrayEvent::PlugRemoved`.
    fn create_socket(&self, window: Window) -> Result<SocketId>;

    /// Avoid background flicker on the socket. Best-effort.
    fn suppress_flicker(&self, _socket: SocketId) {}

    /// Offer the socket to the host. True iff it ended up under a real
    /// top-level window.
    fn anchor(&self, socket: SocketId) -> bool;

    /// Bind the socket to `window` and make it visible.
    fn embed(&self, socket: SocketId, window: Window) -> Result<()>;

    fn destroy(&self, socket: SocketId);
}

impl<T: Embedder + ?Sized> Embedder for Rc<T> {
    fn create_socket(&self, window: Window) -> Result<SocketId> {
        (**self).create_socket(window)
    }

    fn suppress_flicker(&self, socket: SocketId) {
        (**self).suppress_flicker(socket)
    }

    fn anchor(&self, socket: SocketId) -> bool {
        (**self).anchor(socket)
    }

    fn embed(&self, socket: SocketId, window: Window) -> Result<()> {
        (**self).embed(socket, window)
    }

    fn destroy(&self, socket: SocketId) {
        (**self).destroy(socket)
    }
}

/// Everything the tray's event filter looks at.
#[derive(Debug, Clone, Copy)]
pub enum TrayEvent {
    ClientMessage(ClientMessageEvent),
    SelectionClear(SelectionClearEvent),
    /// the embedded client of this window went away
    PlugRemoved(Window),
}
