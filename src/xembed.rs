//! minimal XEmbed host used by the `xtray` binary
//!
//! Every socket is a child window of one top-level panel. Docked clients
//! are reparented into their socket and told so with
//! XEMBED_EMBEDDED_NOTIFY. Sockets are laid out in a single row or column.

use crate::backend::{Embedder, SocketId};
use crate::protocol::Orientation;
use crate::x11::X11Session;
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureWindowAux, ConnectionExt,
    CreateWindowAux, EventMask, PropMode, SetMode, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::wrapper::ConnectionExt as _;

const XEMBED_EMBEDDED_NOTIFY: u32 = 0;
const XEMBED_VERSION: u32 = 0;

struct Slot {
    socket: SocketId,
    client: Window,
    embedded: bool,
}

pub struct XEmbedder {
    session: Rc<X11Session>,
    root: Window,
    panel: Window,
    xembed: u32,
    icon_size: u16,
    slots: RefCell<Vec<Slot>>,
    orientation: RefCell<Orientation>,
}

impl XEmbedder {
    /// Create and map the panel window sockets are placed in.
    pub fn new(
        session: Rc<X11Session>,
        screen: usize,
        icon_size: u16,
        orientation: Orientation,
    ) -> Result<Self> {
        let (root, black) = {
            let s = session.screen(screen)?;
            (s.root, s.black_pixel)
        };
        let conn = session.connection();
        let xembed = conn.intern_atom(false, b"_XEMBED")?.reply()?.atom;

        let panel = conn.generate_id()?;
        let values = CreateWindowAux::new()
            .background_pixel(black)
            .event_mask(EventMask::STRUCTURE_NOTIFY);
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            panel,
            root,
            0,
            0,
            icon_size,
            icon_size,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &values,
        )?
        .check()
        .context("failed to create tray panel window")?;
        conn.change_property8(PropMode::REPLACE, panel, AtomEnum::WM_NAME, AtomEnum::STRING, b"xtray")?;
        conn.map_window(panel)?;
        conn.flush()?;

        Ok(Self {
            session,
            root,
            panel,
            xembed,
            icon_size,
            slots: RefCell::new(Vec::new()),
            orientation: RefCell::new(orientation),
        })
    }

    pub fn panel(&self) -> Window {
        self.panel
    }

    pub fn set_orientation(&self, orientation: Orientation) -> Result<()> {
        *self.orientation.borrow_mut() = orientation;
        self.relayout()
    }

    /// The client window whose plug just went away, if `event` says so.
    pub fn plug_removed(&self, event: &Event) -> Option<Window> {
        let (parent, child) = match event {
            Event::DestroyNotify(e) => (e.event, e.window),
            Event::ReparentNotify(e) if e.parent != e.event => (e.event, e.window),
            _ => return None,
        };
        self.slots
            .borrow()
            .iter()
            .find(|slot| slot.socket.0 == parent && slot.client == child && slot.embedded)
            .map(|slot| slot.client)
    }

    fn relayout(&self) -> Result<()> {
        let conn = self.session.connection();
        let size = u32::from(self.icon_size);
        let vertical = *self.orientation.borrow() == Orientation::Vertical;
        let slots = self.slots.borrow();

        for (i, slot) in slots.iter().enumerate() {
            let offset = (i as u32 * size) as i32;
            let (x, y) = if vertical { (0, offset) } else { (offset, 0) };
            conn.configure_window(
                slot.socket.0,
                &ConfigureWindowAux::new().x(x).y(y).width(size).height(size),
            )?;
        }

        let length = size * (slots.len().max(1) as u32);
        let (width, height) = if vertical { (size, length) } else { (length, size) };
        conn.configure_window(
            self.panel,
            &ConfigureWindowAux::new().width(width).height(height),
        )?;
        conn.flush()?;
        Ok(())
    }
}

impl Embedder for XEmbedder {
    fn create_socket(&self, client: Window) -> Result<SocketId> {
        let conn = self.session.connection();
        let window = conn.generate_id()?;
        let size = self.icon_size;
        let values = CreateWindowAux::new()
            .event_mask(EventMask::SUBSTRUCTURE_NOTIFY | EventMask::STRUCTURE_NOTIFY);
        conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            window,
            self.panel,
            0,
            0,
            size,
            size,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &values,
        )?
        .check()
        .context("failed to create socket window")?;

        let socket = SocketId(window);
        self.slots.borrow_mut().push(Slot {
            socket,
            client,
            embedded: false,
        });
        Ok(socket)
    }

    fn suppress_flicker(&self, socket: SocketId) {
        // no background: the server never clears the socket before the
        // client repaints
        let values = ChangeWindowAttributesAux::new().background_pixmap(x11rb::NONE);
        if let Err(e) = self
            .session
            .connection()
            .change_window_attributes(socket.0, &values)
        {
            debug!(%socket, "could not clear socket background: {e}");
        }
    }

    fn anchor(&self, socket: SocketId) -> bool {
        let conn = self.session.connection();
        let parent_of = |window| -> Result<Window> { Ok(conn.query_tree(window)?.reply()?.parent) };
        match (parent_of(socket.0), parent_of(self.panel)) {
            (Ok(parent), Ok(grandparent)) => parent == self.panel && grandparent == self.root,
            _ => false,
        }
    }

    fn embed(&self, socket: SocketId, client: Window) -> Result<()> {
        let conn = self.session.connection();
        let size = u32::from(self.icon_size);

        conn.change_save_set(SetMode::INSERT, client)?;
        conn.reparent_window(client, socket.0, 0, 0)?
            .check()
            .context("failed to reparent tray icon")?;
        conn.configure_window(client, &ConfigureWindowAux::new().width(size).height(size))?;
        conn.map_window(client)?;
        conn.map_window(socket.0)?;

        let notify = ClientMessageEvent::new(
            32,
            client,
            self.xembed,
            [x11rb::CURRENT_TIME, XEMBED_EMBEDDED_NOTIFY, 0, socket.0, XEMBED_VERSION],
        );
        conn.send_event(false, client, EventMask::NO_EVENT, notify)?;

        if let Some(slot) = self
            .slots
            .borrow_mut()
            .iter_mut()
            .find(|slot| slot.socket == socket)
        {
            slot.embedded = true;
        }
        self.relayout()
    }

    fn destroy(&self, socket: SocketId) {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            let pos = slots.iter().position(|slot| slot.socket == socket);
            pos.map(|pos| slots.remove(pos))
        };
        let conn = self.session.connection();
        if let Some(slot) = removed {
            if slot.embedded {
                // the client may already be gone, errors only show up as
                // error events
                let _ = conn.reparent_window(slot.client, self.root, 0, 0);
            }
        }
        let _ = conn.destroy_window(socket.0);
        if let Err(e) = self.relayout() {
            debug!(%socket, "relayout after removing socket failed: {e:#}");
        }
    }
}
