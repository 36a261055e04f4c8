//! registry of docked icons, keyed by the client's window

use crate::backend::{Icon, SocketId};
use std::collections::HashMap;
use x11rb::protocol::xproto::Window;

#[derive(Debug, Default)]
pub struct IconTable {
    sockets: HashMap<Window, SocketId>,
}

impl IconTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the socket previously registered for `window`, if any.
    pub fn insert(&mut self, window: Window, socket: SocketId) -> Option<SocketId> {
        self.sockets.insert(window, socket)
    }

    pub fn remove(&mut self, window: Window) -> Option<SocketId> {
        self.sockets.remove(&window)
    }

    pub fn lookup(&self, window: Window) -> Option<SocketId> {
        self.sockets.get(&window).copied()
    }

    pub fn contains(&self, window: Window) -> bool {
        self.sockets.contains_key(&window)
    }

    pub fn icon(&self, window: Window) -> Option<Icon> {
        self.lookup(window).map(|socket| Icon { window, socket })
    }

    pub fn icons(&self) -> impl Iterator<Item = Icon> + '_ {
        self.sockets
            .iter()
            .map(|(&window, &socket)| Icon { window, socket })
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn clear(&mut self) {
        self.sockets.clear();
    }
}
