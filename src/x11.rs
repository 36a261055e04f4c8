//! `WindowSystem` over a live x11rb connection

use crate::backend::{TrayEvent, WindowSystem};
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::fd::{AsFd, BorrowedFd};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ClientMessageEvent, ConnectionExt, CreateWindowAux, EventMask, PropMode,
    Screen, Timestamp, Window, WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

/// property appended to (with zero bytes) to read the server clock
const TIMESTAMP_PROP: &str = "_XTRAY_TIMESTAMP_PROP";

pub struct X11Session {
    conn: RustConnection,
    default_screen: usize,
    /// events read while waiting for a PropertyNotify in `server_time`
    backlog: RefCell<VecDeque<Event>>,
}

impl X11Session {
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, default_screen) =
            x11rb::connect(display).context("failed to connect to X display")?;
        Ok(Self {
            conn,
            default_screen,
            backlog: RefCell::new(VecDeque::new()),
        })
    }

    pub fn connection(&self) -> &RustConnection {
        &self.conn
    }

    pub fn default_screen(&self) -> usize {
        self.default_screen
    }

    pub fn screen(&self, screen: usize) -> Result<&Screen> {
        self.conn
            .setup()
            .roots
            .get(screen)
            .with_context(|| format!("display has no screen {}", screen))
    }

    /// The connection's socket, for readiness polling.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.conn.stream().as_fd()
    }

    /// Next event without blocking, events held back by `server_time` first.
    pub fn poll_event(&self) -> Result<Option<Event>> {
        if let Some(event) = self.backlog.borrow_mut().pop_front() {
            return Ok(Some(event));
        }
        Ok(self.conn.poll_for_event()?)
    }

    /// The part of an X event the tray filter cares about.
    pub fn tray_event(event: &Event) -> Option<TrayEvent> {
        match event {
            Event::ClientMessage(e) => Some(TrayEvent::ClientMessage(*e)),
            Event::SelectionClear(e) => Some(TrayEvent::SelectionClear(*e)),
            _ => None,
        }
    }
}

impl WindowSystem for X11Session {
    fn intern_atom(&self, name: &str) -> Result<Atom> {
        Ok(self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
    }

    fn lookup_atom(&self, name: &str) -> Result<Option<Atom>> {
        let atom = self.conn.intern_atom(true, name.as_bytes())?.reply()?.atom;
        Ok((atom != x11rb::NONE).then_some(atom))
    }

    fn root_window(&self, screen: usize) -> Result<Window> {
        Ok(self.screen(screen)?.root)
    }

    fn create_owner_window(&self, screen: usize) -> Result<Window> {
        let root = self.screen(screen)?.root;
        let window = self.conn.generate_id()?;
        let values = CreateWindowAux::new()
            .override_redirect(1)
            .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY);
        self.conn
            .create_window(
                0,
                window,
                root,
                -1,
                -1,
                1,
                1,
                0,
                WindowClass::INPUT_ONLY,
                x11rb::COPY_FROM_PARENT,
                &values,
            )?
            .check()
            .context("failed to create selection owner window")?;
        Ok(window)
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn server_time(&self, window: Window) -> Result<Timestamp> {
        // a zero-length append still generates PropertyNotify with the
        // server's time in it
        let prop = self.intern_atom(TIMESTAMP_PROP)?;
        self.conn
            .change_property8(PropMode::APPEND, window, prop, AtomEnum::STRING, &[])?;
        self.conn.flush()?;
        loop {
            let event = self.conn.wait_for_event()?;
            if let Event::PropertyNotify(e) = &event {
                if e.window == window && e.atom == prop {
                    return Ok(e.time);
                }
            }
            self.backlog.borrow_mut().push_back(event);
        }
    }

    fn selection_owner(&self, selection: Atom) -> Result<Window> {
        Ok(self.conn.get_selection_owner(selection)?.reply()?.owner)
    }

    fn set_selection_owner(&self, owner: Window, selection: Atom, time: Timestamp) -> Result<()> {
        self.conn.set_selection_owner(owner, selection, time)?;
        Ok(())
    }

    fn send_client_message(
        &self,
        destination: Window,
        mask: EventMask,
        event: ClientMessageEvent,
    ) -> Result<()> {
        self.conn.send_event(false, destination, mask, event)?;
        Ok(())
    }

    fn set_cardinal_property(&self, window: Window, property: Atom, value: u32) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            property,
            AtomEnum::CARDINAL,
            &[value],
        )?;
        Ok(())
    }

    fn get_utf8_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
    ) -> Result<Option<Vec<u8>>> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, u32::MAX)?
            .reply()?;
        if reply.type_ != type_ || reply.format != 8 {
            return Ok(None);
        }
        Ok(Some(reply.value))
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
