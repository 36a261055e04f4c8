//! key grabs that still fire with CapsLock, NumLock or ScrollLock on

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, GrabMode, KeyPressEvent, Keycode, ModMask, Window};

/// Lock, NumLock (usually Mod2) and ScrollLock (usually Mod5).
pub const IGNORED_MODIFIERS: [ModMask; 3] = [ModMask::LOCK, ModMask::M2, ModMask::M5];

/// `base` combined with every subset of `ignored`, without duplicates.
pub fn modifier_combinations(base: ModMask, ignored: &[ModMask]) -> Vec<ModMask> {
    let mut combos = vec![base];
    for &extra in ignored {
        let with_extra: Vec<ModMask> = combos.iter().map(|&m| m | extra).collect();
        for m in with_extra {
            if !combos.contains(&m) {
                combos.push(m);
            }
        }
    }
    combos
}

/// Grab `keycode` + `base` on `root` under every combination of `ignored`.
pub fn grab_key<C: Connection>(
    conn: &C,
    root: Window,
    keycode: Keycode,
    base: ModMask,
    ignored: &[ModMask],
) -> Result<()> {
    for modifiers in modifier_combinations(base, ignored) {
        conn.grab_key(false, root, modifiers, keycode, GrabMode::ASYNC, GrabMode::ASYNC)?
            .check()
            .with_context(|| format!("failed to grab keycode {}", keycode))?;
    }
    Ok(())
}

/// Does `event` press the grabbed key, whatever state the ignored locks are in?
pub fn matches(event: &KeyPressEvent, keycode: Keycode, base: ModMask, ignored: &[ModMask]) -> bool {
    let ignored = ignored
        .iter()
        .fold(0u16, |acc, &m| acc | u16::from(m));
    let state = u16::from(event.state) & !ignored;
    event.detail == keycode && state == u16::from(base) & !ignored
}
