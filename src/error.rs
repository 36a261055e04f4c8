//! error taxonomy for the tray engine
//!
//! `Error` is what the host sees from `manage()`. `Dropped` never leaves the
//! crate: a misbehaving client only gets its event ignored and a debug line.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("screen {screen} is already managed by this tray")]
    AlreadyManaged { screen: usize },
    #[error("another system tray already owns the selection on screen {screen}")]
    OwnershipDenied { screen: usize },
    #[error(transparent)]
    WindowSystem(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why an incoming event was ignored.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    /// data fragment with no pending message for its window
    #[error("message data without a pending message")]
    MalformedFragment,
    /// cancel for a message id that is not pending
    #[error("cancel for a message that is not pending")]
    UnknownCancel,
    /// begin message from a window that never docked
    #[error("message from a window that is not docked")]
    UnknownWindow,
    /// begin message larger than `TrayConfig::max_message_len`
    #[error("message longer than the configured limit")]
    Oversized,
    /// opcode outside the three the protocol defines
    #[error("unknown tray opcode {0}")]
    UnknownOpcode(u32),
    /// tray client message with the wrong data format
    #[error("tray message with format {0}")]
    WrongFormat(u8),
}
