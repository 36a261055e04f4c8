//! the tray manager: selection ownership, docking, messages, orientation
//!
//! One `TrayManager` manages at most one screen. The host feeds it every
//! `TrayEvent` its loop sees and acts on the returned notifications.

use crate::atoms::{self, TrayAtoms};
use crate::backend::{Embedder, Icon, TrayEvent, WindowSystem};
use crate::error::{Dropped, Error, Result};
use crate::icons::IconTable;
use crate::messages::{CompletedMessage, Reassembler};
use crate::protocol::{self, Orientation, TrayRequest};
use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{ClientMessageEvent, EventMask, SelectionClearEvent, Timestamp, Window};

const DEFAULT_MAX_MESSAGE_LEN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayConfig {
    pub orientation: Orientation,
    /// take the selection over even if another tray owns it
    pub replace: bool,
    /// longest balloon message accepted, in bytes
    pub max_message_len: usize,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::Horizontal,
            replace: false,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unmanaged,
    Managing,
    /// another client took the selection; `manage()` may be retried
    Lost,
}

/// What the host is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    IconAdded(Icon),
    IconRemoved(Icon),
    MessageReceived {
        icon: Icon,
        /// exactly the declared number of bytes, not necessarily UTF-8
        body: Vec<u8>,
        id: u32,
        timeout: u32,
    },
    MessageCancelled {
        icon: Icon,
        id: u32,
    },
    SelectionLost,
    OrientationChanged(Orientation),
}

/// State of the screen being managed.
#[derive(Debug, Clone, Copy)]
struct ScreenContext {
    screen: usize,
    atoms: TrayAtoms,
    owner: Window,
    acquired_at: Timestamp,
}

/// Does some client own the tray selection of `screen`? Never acquires it
/// and never creates the selection atom.
pub fn check_running<W: WindowSystem + ?Sized>(ws: &W, screen: usize) -> anyhow::Result<bool> {
    match ws.lookup_atom(&atoms::selection_name(screen))? {
        Some(selection) => Ok(ws.selection_owner(selection)? != x11rb::NONE),
        None => Ok(false),
    }
}

pub struct TrayManager<W: WindowSystem, E: Embedder> {
    ws: W,
    embedder: E,
    config: TrayConfig,
    orientation: Orientation,
    lifecycle: Lifecycle,
    context: Option<ScreenContext>,
    icons: IconTable,
    messages: Reassembler,
}

impl<W: WindowSystem, E: Embedder> TrayManager<W, E> {
    pub fn new(ws: W, embedder: E, config: TrayConfig) -> Self {
        Self {
            orientation: config.orientation,
            messages: Reassembler::new(config.max_message_len),
            ws,
            embedder,
            config,
            lifecycle: Lifecycle::Unmanaged,
            context: None,
            icons: IconTable::new(),
        }
    }

    /// Become the system tray of `screen`.
    pub fn manage(&mut self, screen: usize) -> Result<()> {
        if let Some(ctx) = &self.context {
            return Err(Error::AlreadyManaged { screen: ctx.screen });
        }

        let atoms = TrayAtoms::resolve(&self.ws, screen)?;
        if !self.config.replace && self.ws.selection_owner(atoms.selection)? != x11rb::NONE {
            return Err(Error::OwnershipDenied { screen });
        }

        let owner = self.ws.create_owner_window(screen)?;
        match self.acquire(screen, atoms, owner) {
            Ok(Some(time)) => {
                self.context = Some(ScreenContext {
                    screen,
                    atoms,
                    owner,
                    acquired_at: time,
                });
                self.lifecycle = Lifecycle::Managing;
                info!(screen, owner, time, "acquired system tray selection");
                Ok(())
            }
            Ok(None) => {
                self.discard_owner_window(owner);
                Err(Error::OwnershipDenied { screen })
            }
            Err(e) => {
                self.discard_owner_window(owner);
                Err(e.into())
            }
        }
    }

    /// Take the selection with `owner`. `None` if someone else still holds it.
    fn acquire(
        &self,
        screen: usize,
        atoms: TrayAtoms,
        owner: Window,
    ) -> anyhow::Result<Option<Timestamp>> {
        let time = self.ws.server_time(owner)?;
        self.ws.set_selection_owner(owner, atoms.selection, time)?;
        if self.ws.selection_owner(atoms.selection)? != owner {
            return Ok(None);
        }

        self.write_orientation(owner, atoms);

        let root = self.ws.root_window(screen)?;
        let announcement =
            protocol::manager_announcement(root, atoms.manager, time, atoms.selection, owner);
        self.ws
            .send_client_message(root, EventMask::STRUCTURE_NOTIFY, announcement)?;
        self.ws.flush()?;
        Ok(Some(time))
    }

    /// Stop being the tray. The selection is released only while we still
    /// own it. Sockets already handed to the host are left alone.
    pub fn unmanage(&mut self) {
        if let Some(ctx) = self.context.take() {
            if let Err(e) = self.release(&ctx) {
                warn!(screen = ctx.screen, "failed to release tray selection: {e:#}");
            }
            self.discard_owner_window(ctx.owner);
            info!(screen = ctx.screen, "stopped managing system tray");
        }
        self.lifecycle = Lifecycle::Unmanaged;
        self.icons.clear();
        self.messages.clear();
    }

    fn release(&self, ctx: &ScreenContext) -> anyhow::Result<()> {
        if self.ws.selection_owner(ctx.atoms.selection)? != ctx.owner {
            return Ok(());
        }
        let time = self.ws.server_time(ctx.owner)?;
        self.ws
            .set_selection_owner(x11rb::NONE, ctx.atoms.selection, time)?;
        Ok(())
    }

    fn discard_owner_window(&self, owner: Window) {
        let result = self
            .ws
            .destroy_window(owner)
            .and_then(|()| self.ws.flush());
        if let Err(e) = result {
            warn!(owner, "failed to destroy selection owner window: {e:#}");
        }
    }

    pub fn check_running(&self, screen: usize) -> anyhow::Result<bool> {
        check_running(&self.ws, screen)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Window owning the selection while managing.
    pub fn owner_window(&self) -> Option<Window> {
        self.context.map(|ctx| ctx.owner)
    }

    /// Server time at which the selection was acquired.
    pub fn acquired_at(&self) -> Option<Timestamp> {
        self.context.map(|ctx| ctx.acquired_at)
    }

    pub fn icons(&self) -> &IconTable {
        &self.icons
    }

    pub fn pending_messages(&self) -> &Reassembler {
        &self.messages
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Orientation) -> Option<Notification> {
        if self.orientation == orientation {
            return None;
        }
        self.orientation = orientation;
        if let Some(ctx) = self.context {
            self.write_orientation(ctx.owner, ctx.atoms);
            if let Err(e) = self.ws.flush() {
                warn!("failed to flush orientation: {e:#}");
            }
        }
        Some(Notification::OrientationChanged(orientation))
    }

    fn write_orientation(&self, owner: Window, atoms: TrayAtoms) {
        let value = self.orientation.to_wire();
        if let Err(e) = self
            .ws
            .set_cardinal_property(owner, atoms.orientation, value)
        {
            warn!(owner, "failed to write tray orientation: {e:#}");
        }
    }

    /// `_NET_WM_NAME` of the icon's window, if it is valid UTF-8.
    pub fn child_title(&self, icon: Icon) -> Option<String> {
        let ctx = self.context.as_ref()?;
        let value = match self.ws.get_utf8_property(
            icon.window,
            ctx.atoms.net_wm_name,
            ctx.atoms.utf8_string,
        ) {
            Ok(value) => value?,
            Err(e) => {
                debug!(window = icon.window, "could not read icon title: {e:#}");
                return None;
            }
        };
        if value.is_empty() {
            return None;
        }
        String::from_utf8(value).ok()
    }

    /// Feed one event through the tray's filter.
    pub fn handle_event(&mut self, event: TrayEvent) -> Vec<Notification> {
        let mut out = Vec::new();
        match event {
            TrayEvent::PlugRemoved(window) => self.handle_plug_removed(window, &mut out),
            TrayEvent::ClientMessage(ev) => {
                let Some(ctx) = self.context else { return out };
                if ev.type_ == ctx.atoms.opcode {
                    self.handle_opcode(&ev, &mut out);
                } else if ev.type_ == ctx.atoms.message_data {
                    self.handle_message_data(&ev, &mut out);
                }
            }
            TrayEvent::SelectionClear(ev) => self.handle_selection_clear(&ev, &mut out),
        }
        out
    }

    fn handle_opcode(&mut self, ev: &ClientMessageEvent, out: &mut Vec<Notification>) {
        let request = match TrayRequest::decode(ev) {
            Ok(request) => request,
            Err(reason) => return dropped(ev.window, reason),
        };
        match request {
            TrayRequest::Dock { window } => self.handle_dock_request(window, out),
            TrayRequest::BeginMessage {
                window,
                timeout,
                len,
                id,
            } => self.handle_begin_message(window, id, timeout, len, out),
            TrayRequest::CancelMessage { window, id } => {
                self.handle_cancel_message(window, id, out)
            }
        }
    }

    fn handle_dock_request(&mut self, window: Window, out: &mut Vec<Notification>) {
        // clients are known to send the dock request twice
        if self.icons.contains(window) {
            debug!(window, "ignoring repeated dock request");
            return;
        }

        let socket = match self.embedder.create_socket(window) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(window, "failed to create embedding socket: {e:#}");
                return;
            }
        };
        self.embedder.suppress_flicker(socket);

        if !self.embedder.anchor(socket) {
            debug!(window, %socket, "host did not place the socket, discarding it");
            self.embedder.destroy(socket);
            return;
        }
        if let Err(e) = self.embedder.embed(socket, window) {
            warn!(window, %socket, "failed to embed tray icon: {e:#}");
            self.embedder.destroy(socket);
            return;
        }

        self.icons.insert(window, socket);
        debug!(window, %socket, "docked tray icon");
        out.push(Notification::IconAdded(Icon { window, socket }));
    }

    fn handle_begin_message(
        &mut self,
        window: Window,
        id: u32,
        timeout: u32,
        len: u32,
        out: &mut Vec<Notification>,
    ) {
        let Some(icon) = self.icons.icon(window) else {
            return dropped(window, Dropped::UnknownWindow);
        };
        match self.messages.begin(window, id, timeout, len) {
            Ok(Some(done)) => out.push(received(icon, done)),
            Ok(None) => {}
            Err(reason) => dropped(window, reason),
        }
    }

    fn handle_message_data(&mut self, ev: &ClientMessageEvent, out: &mut Vec<Notification>) {
        let fragment = match protocol::message_fragment(ev) {
            Ok(fragment) => fragment,
            Err(reason) => return dropped(ev.window, reason),
        };
        match self.messages.data(ev.window, &fragment) {
            Ok(Some(done)) => match self.icons.icon(done.window) {
                Some(icon) => out.push(received(icon, done)),
                None => dropped(done.window, Dropped::UnknownWindow),
            },
            Ok(None) => {}
            Err(reason) => dropped(ev.window, reason),
        }
    }

    fn handle_cancel_message(&mut self, window: Window, id: u32, out: &mut Vec<Notification>) {
        if let Err(reason) = self.messages.cancel(window, id) {
            dropped(window, reason);
        }
        if let Some(icon) = self.icons.icon(window) {
            out.push(Notification::MessageCancelled { icon, id });
        }
    }

    fn handle_plug_removed(&mut self, window: Window, out: &mut Vec<Notification>) {
        let Some(socket) = self.icons.remove(window) else {
            return;
        };
        let discarded = self.messages.discard_window(window);
        if discarded > 0 {
            debug!(window, discarded, "dropped pending messages of removed icon");
        }
        debug!(window, %socket, "tray icon removed");
        out.push(Notification::IconRemoved(Icon { window, socket }));
    }

    fn handle_selection_clear(&mut self, ev: &SelectionClearEvent, out: &mut Vec<Notification>) {
        let Some(ctx) = self.context else { return };
        if ev.selection != ctx.atoms.selection || ev.owner != ctx.owner {
            return;
        }

        info!(screen = ctx.screen, "lost system tray selection");
        self.context = None;
        self.lifecycle = Lifecycle::Lost;
        self.discard_owner_window(ctx.owner);
        self.icons.clear();
        self.messages.clear();
        out.push(Notification::SelectionLost);
    }
}

impl<W: WindowSystem, E: Embedder> Drop for TrayManager<W, E> {
    fn drop(&mut self) {
        self.unmanage();
    }
}

fn received(icon: Icon, done: CompletedMessage) -> Notification {
    Notification::MessageReceived {
        icon,
        body: done.body,
        id: done.id,
        timeout: done.timeout,
    }
}

fn dropped(window: Window, reason: Dropped) {
    debug!(window, "ignoring tray event: {reason}");
}
