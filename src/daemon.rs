//! the `xtray run` event loop
//!
//! Single-threaded: the X connection, the manager and the panel all live on
//! one task. Buffered events are drained before every await, so nothing
//! sits in x11rb's queue while we wait on the socket.

use crate::backend::{Embedder, TrayEvent};
use crate::keys;
use crate::manager::{self, Notification, TrayConfig, TrayManager};
use crate::x11::X11Session;
use crate::xembed::XEmbedder;
use anyhow::{Context, Result};
use std::os::fd::BorrowedFd;
use std::rc::Rc;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Keycode, ModMask};
use x11rb::protocol::Event;

type Manager = TrayManager<Rc<X11Session>, Rc<XEmbedder>>;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// X display, `$DISPLAY` when unset
    pub display: Option<String>,
    /// screen to manage, the display's default screen when unset
    pub screen: Option<usize>,
    pub tray: TrayConfig,
    pub icon_size: u16,
    /// bare key that flips the orientation
    pub toggle_keycode: Option<Keycode>,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Interrupted,
    SelectionLost,
}

/// Is a tray running on `screen` of `display`?
pub fn check(display: Option<&str>, screen: Option<usize>) -> Result<(usize, bool)> {
    let session = X11Session::connect(display)?;
    let screen = screen.unwrap_or(session.default_screen());
    session.screen(screen)?;
    Ok((screen, manager::check_running(&session, screen)?))
}

pub async fn run(config: DaemonConfig) -> Result<Exit> {
    let session = Rc::new(X11Session::connect(config.display.as_deref())?);
    let screen = config.screen.unwrap_or(session.default_screen());
    let root = session.screen(screen)?.root;

    let embedder = Rc::new(XEmbedder::new(
        session.clone(),
        screen,
        config.icon_size,
        config.tray.orientation,
    )?);
    let mut manager = TrayManager::new(session.clone(), embedder.clone(), config.tray.clone());
    manager
        .manage(screen)
        .with_context(|| format!("cannot become the system tray of screen {}", screen))?;
    info!(screen, panel = embedder.panel(), "system tray running");

    if let Some(keycode) = config.toggle_keycode {
        keys::grab_key(
            session.connection(),
            root,
            keycode,
            ModMask::from(0u16),
            &keys::IGNORED_MODIFIERS,
        )?;
        debug!(keycode, "grabbed orientation toggle key");
    }

    let fd = watch(session.fd())?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let exit = loop {
        if let Some(exit) = drain(&session, &embedder, &mut manager, &config)? {
            break exit;
        }
        session.connection().flush()?;

        tokio::select! {
            ready = fd.readable() => {
                let mut guard = ready?;
                guard.clear_ready();
            }
            result = &mut ctrl_c => {
                result.context("failed to listen for ctrl-c")?;
                break Exit::Interrupted;
            }
        }
    };

    manager.unmanage();
    session.connection().flush()?;
    Ok(exit)
}

/// Register `fd` with the reactor for readability.
fn watch(fd: BorrowedFd<'_>) -> Result<AsyncFd<BorrowedFd<'_>>> {
    AsyncFd::with_interest(fd, Interest::READABLE).context("failed to watch X connection")
}

fn drain(
    session: &X11Session,
    embedder: &XEmbedder,
    manager: &mut Manager,
    config: &DaemonConfig,
) -> Result<Option<Exit>> {
    while let Some(event) = session.poll_event()? {
        let notifications = match &event {
            Event::KeyPress(e) => match config.toggle_keycode {
                Some(keycode)
                    if keys::matches(e, keycode, ModMask::from(0u16), &keys::IGNORED_MODIFIERS) =>
                {
                    let flipped = manager.orientation().flipped();
                    manager.set_orientation(flipped).into_iter().collect()
                }
                _ => continue,
            },
            Event::Error(e) => {
                debug!("X error: {:?}", e);
                continue;
            }
            event => {
                let tray_event = X11Session::tray_event(event)
                    .or_else(|| embedder.plug_removed(event).map(TrayEvent::PlugRemoved));
                match tray_event {
                    Some(tray_event) => manager.handle_event(tray_event),
                    None => continue,
                }
            }
        };

        for notification in notifications {
            if let Some(exit) = on_notification(manager, embedder, notification) {
                return Ok(Some(exit));
            }
        }
    }
    Ok(None)
}

fn on_notification(
    manager: &Manager,
    embedder: &XEmbedder,
    notification: Notification,
) -> Option<Exit> {
    match notification {
        Notification::IconAdded(icon) => {
            let title = manager.child_title(icon).unwrap_or_default();
            info!(window = icon.window, socket = %icon.socket, title = %title, "icon added");
        }
        Notification::IconRemoved(icon) => {
            info!(window = icon.window, socket = %icon.socket, "icon removed");
            embedder.destroy(icon.socket);
        }
        Notification::MessageReceived {
            icon,
            body,
            id,
            timeout,
        } => {
            let text = String::from_utf8_lossy(&body);
            info!(window = icon.window, id, timeout_ms = timeout, "{}", text);
        }
        Notification::MessageCancelled { icon, id } => {
            info!(window = icon.window, id, "message cancelled");
        }
        Notification::OrientationChanged(orientation) => {
            info!(%orientation, "orientation changed");
            if let Err(e) = embedder.set_orientation(orientation) {
                warn!("failed to relayout panel: {e:#}");
            }
        }
        Notification::SelectionLost => return Some(Exit::SelectionLost),
    }
    None
}
