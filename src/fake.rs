//! in-memory window system and embedder for tests
//!
//! Just enough X server to drive the tray: atoms, a window id allocator,
//! selection owners with the timestamp rule, properties, a clock and a log
//! of sent client messages.

use crate::backend::{Embedder, SocketId, WindowSystem};
use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ClientMessageEvent, EventMask, SelectionClearEvent, Timestamp, Window,
};

const RESOURCE_ID_BASE: u32 = 0x0020_0000;

/// Atom store: maps between atom ids and names.
struct AtomStore {
    by_name: HashMap<String, Atom>,
    by_id: HashMap<Atom, String>,
    next_id: Atom,
}

impl AtomStore {
    fn new() -> Self {
        let mut store = Self {
            by_name: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 69,
        };
        // a few of the predefined atoms, X11/Xatom.h numbering
        let predefined = [
            (1, "PRIMARY"),
            (2, "SECONDARY"),
            (4, "ATOM"),
            (6, "CARDINAL"),
            (31, "STRING"),
            (33, "WINDOW"),
            (39, "WM_NAME"),
        ];
        for (id, name) in predefined {
            store.by_name.insert(name.to_string(), id);
            store.by_id.insert(id, name.to_string());
        }
        store
    }

    fn intern(&mut self, name: &str) -> Atom {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
        id
    }

    fn get_id(&self, name: &str) -> Option<Atom> {
        self.by_name.get(name).copied()
    }

    fn get_name(&self, id: Atom) -> Option<&str> {
        self.by_id.get(&id).map(|s| s.as_str())
    }
}

struct Property {
    type_: Atom,
    format: u8,
    data: Vec<u8>,
}

struct Selection {
    owner: Window,
    changed_at: Timestamp,
}

struct ServerState {
    atoms: AtomStore,
    roots: Vec<Window>,
    windows: HashSet<Window>,
    next_window: Window,
    selections: HashMap<Atom, Selection>,
    properties: HashMap<(Window, Atom), Property>,
    sent: Vec<(Window, EventMask, ClientMessageEvent)>,
    clock: Timestamp,
    refuse_selection: bool,
}

impl ServerState {
    fn allocate_window(&mut self) -> Window {
        let id = self.next_window;
        self.next_window += 1;
        self.windows.insert(id);
        id
    }
}

pub struct FakeServer {
    state: RefCell<ServerState>,
}

impl FakeServer {
    pub fn new(screens: usize) -> Self {
        let roots: Vec<Window> = (1..=screens as Window).collect();
        Self {
            state: RefCell::new(ServerState {
                atoms: AtomStore::new(),
                windows: roots.iter().copied().collect(),
                roots,
                next_window: RESOURCE_ID_BASE,
                selections: HashMap::new(),
                properties: HashMap::new(),
                sent: Vec::new(),
                clock: 1000,
                refuse_selection: false,
            }),
        }
    }

    pub fn atom_name(&self, atom: Atom) -> Option<String> {
        self.state.borrow().atoms.get_name(atom).map(str::to_string)
    }

    pub fn owner_of(&self, selection: Atom) -> Window {
        self.state
            .borrow()
            .selections
            .get(&selection)
            .map_or(x11rb::NONE, |s| s.owner)
    }

    /// Make another client's window the tray of `screen`.
    pub fn foreign_owner(&self, screen: usize) -> Window {
        let mut state = self.state.borrow_mut();
        let selection = state.atoms.intern(&crate::atoms::selection_name(screen));
        let window = state.allocate_window();
        let changed_at = state.clock;
        state.selections.insert(selection, Selection { owner: window, changed_at });
        window
    }

    /// Another client takes `selection`; returns the SelectionClear the
    /// previous owner receives.
    pub fn steal_selection(&self, selection: Atom) -> SelectionClearEvent {
        let mut state = self.state.borrow_mut();
        state.clock += 10;
        let time = state.clock;
        let thief = state.allocate_window();
        let previous = state
            .selections
            .insert(selection, Selection { owner: thief, changed_at: time })
            .map_or(x11rb::NONE, |s| s.owner);
        SelectionClearEvent {
            time,
            owner: previous,
            selection,
            ..Default::default()
        }
    }

    pub fn clear_selection(&self, selection: Atom) {
        self.state.borrow_mut().selections.remove(&selection);
    }

    /// Silently ignore every SetSelectionOwner, as if a competing client
    /// always won the race.
    pub fn refuse_selection_changes(&self, refuse: bool) {
        self.state.borrow_mut().refuse_selection = refuse;
    }

    pub fn advance_clock(&self, ms: Timestamp) {
        self.state.borrow_mut().clock += ms;
    }

    pub fn window_count(&self) -> usize {
        self.state.borrow().windows.len()
    }

    pub fn window_exists(&self, window: Window) -> bool {
        self.state.borrow().windows.contains(&window)
    }

    pub fn sent_messages(&self) -> Vec<(Window, EventMask, ClientMessageEvent)> {
        self.state.borrow().sent.clone()
    }

    pub fn cardinal(&self, window: Window, property: Atom) -> Option<u32> {
        let state = self.state.borrow();
        let prop = state.properties.get(&(window, property))?;
        if prop.type_ != Atom::from(AtomEnum::CARDINAL) || prop.format != 32 {
            return None;
        }
        let bytes: [u8; 4] = prop.data.get(..4)?.try_into().ok()?;
        Some(u32::from_ne_bytes(bytes))
    }

    pub fn set_utf8_title(&self, window: Window, title: &[u8]) {
        let mut state = self.state.borrow_mut();
        let name = state.atoms.intern(crate::atoms::NET_WM_NAME);
        let utf8 = state.atoms.intern(crate::atoms::UTF8_STRING);
        state.properties.insert(
            (window, name),
            Property {
                type_: utf8,
                format: 8,
                data: title.to_vec(),
            },
        );
    }
}

impl WindowSystem for FakeServer {
    fn intern_atom(&self, name: &str) -> Result<Atom> {
        Ok(self.state.borrow_mut().atoms.intern(name))
    }

    fn lookup_atom(&self, name: &str) -> Result<Option<Atom>> {
        Ok(self.state.borrow().atoms.get_id(name))
    }

    fn root_window(&self, screen: usize) -> Result<Window> {
        match self.state.borrow().roots.get(screen) {
            Some(&root) => Ok(root),
            None => bail!("no screen {}", screen),
        }
    }

    fn create_owner_window(&self, screen: usize) -> Result<Window> {
        let mut state = self.state.borrow_mut();
        if screen >= state.roots.len() {
            bail!("no screen {}", screen);
        }
        Ok(state.allocate_window())
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.windows.remove(&window) {
            bail!("BadWindow {:#x}", window);
        }
        state.selections.retain(|_, s| s.owner != window);
        state.properties.retain(|(w, _), _| *w != window);
        Ok(())
    }

    fn server_time(&self, window: Window) -> Result<Timestamp> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains(&window) {
            bail!("BadWindow {:#x}", window);
        }
        state.clock += 1;
        Ok(state.clock)
    }

    fn selection_owner(&self, selection: Atom) -> Result<Window> {
        Ok(self.owner_of(selection))
    }

    fn set_selection_owner(&self, owner: Window, selection: Atom, time: Timestamp) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.refuse_selection {
            return Ok(());
        }
        let stale = state
            .selections
            .get(&selection)
            .is_some_and(|s| time < s.changed_at);
        if stale {
            return Ok(());
        }
        if owner == x11rb::NONE {
            state.selections.remove(&selection);
        } else {
            state.selections.insert(selection, Selection { owner, changed_at: time });
        }
        Ok(())
    }

    fn send_client_message(
        &self,
        destination: Window,
        mask: EventMask,
        event: ClientMessageEvent,
    ) -> Result<()> {
        self.state.borrow_mut().sent.push((destination, mask, event));
        Ok(())
    }

    fn set_cardinal_property(&self, window: Window, property: Atom, value: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains(&window) {
            bail!("BadWindow {:#x}", window);
        }
        state.properties.insert(
            (window, property),
            Property {
                type_: AtomEnum::CARDINAL.into(),
                format: 32,
                data: value.to_ne_bytes().to_vec(),
            },
        );
        Ok(())
    }

    fn get_utf8_property(
        &self,
        window: Window,
        property: Atom,
        type_: Atom,
    ) -> Result<Option<Vec<u8>>> {
        let state = self.state.borrow();
        Ok(state
            .properties
            .get(&(window, property))
            .filter(|p| p.type_ == type_ && p.format == 8)
            .map(|p| p.data.clone()))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

struct FakeSocket {
    window: Window,
    flicker_suppressed: bool,
    embedded: Option<Window>,
}

struct EmbedState {
    next: u32,
    sockets: HashMap<SocketId, FakeSocket>,
    destroyed: Vec<SocketId>,
    anchoring: bool,
}

pub struct FakeEmbedder {
    state: RefCell<EmbedState>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(EmbedState {
                next: 1,
                sockets: HashMap::new(),
                destroyed: Vec::new(),
                anchoring: true,
            }),
        }
    }

    /// Whether the host places new sockets under its top-level window.
    pub fn set_anchoring(&self, anchoring: bool) {
        self.state.borrow_mut().anchoring = anchoring;
    }

    pub fn created_count(&self) -> usize {
        (self.state.borrow().next - 1) as usize
    }

    pub fn is_embedded(&self, socket: SocketId, window: Window) -> bool {
        self.state
            .borrow()
            .sockets
            .get(&socket)
            .is_some_and(|s| s.window == window && s.embedded == Some(window))
    }

    pub fn flicker_suppressed(&self, socket: SocketId) -> bool {
        self.state
            .borrow()
            .sockets
            .get(&socket)
            .is_some_and(|s| s.flicker_suppressed)
    }

    pub fn destroyed(&self) -> Vec<SocketId> {
        self.state.borrow().destroyed.clone()
    }
}

impl Embedder for FakeEmbedder {
    fn create_socket(&self, window: Window) -> Result<SocketId> {
        let mut state = self.state.borrow_mut();
        let socket = SocketId(state.next);
        state.next += 1;
        state.sockets.insert(
            socket,
            FakeSocket {
                window,
                flicker_suppressed: false,
                embedded: None,
            },
        );
        Ok(socket)
    }

    fn suppress_flicker(&self, socket: SocketId) {
        if let Some(s) = self.state.borrow_mut().sockets.get_mut(&socket) {
            s.flicker_suppressed = true;
        }
    }

    fn anchor(&self, _socket: SocketId) -> bool {
        self.state.borrow().anchoring
    }

    fn embed(&self, socket: SocketId, window: Window) -> Result<()> {
        match self.state.borrow_mut().sockets.get_mut(&socket) {
            Some(s) => {
                s.embedded = Some(window);
                Ok(())
            }
            None => bail!("no such {}", socket),
        }
    }

    fn destroy(&self, socket: SocketId) {
        let mut state = self.state.borrow_mut();
        state.sockets.remove(&socket);
        state.destroyed.push(socket);
    }
}
