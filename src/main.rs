//! xtray - freedesktop System Tray for X11
//!
//! Owns `_NET_SYSTEM_TRAY_S<n>` and docks notification-area icons into a
//! small panel window.
//!
//! ```text
//! xtray run                  → manage the default screen
//! xtray run --orientation vertical --toggle-keycode 118
//! xtray check --screen 1     → is a tray already running?
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use x11rb::protocol::xproto::Keycode;
use xtray::daemon::{self, DaemonConfig, Exit};
use xtray::{Orientation, TrayConfig};

#[derive(Parser)]
#[command(name = "xtray")]
#[command(about = "freedesktop System Tray for X11")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Become the system tray and embed icons until interrupted
    Run {
        /// X display (e.g., :0), defaults to $DISPLAY
        #[arg(short, long)]
        display: Option<String>,

        /// Screen to manage, defaults to the display's default screen
        #[arg(short, long)]
        screen: Option<usize>,

        /// Icon layout advertised to clients
        #[arg(short, long, default_value = "horizontal")]
        orientation: Orientation,

        /// Take over from a tray that is already running
        #[arg(long)]
        replace: bool,

        /// Icon size in pixels
        #[arg(long, default_value = "24")]
        icon_size: u16,

        /// Keycode that flips the orientation (e.g., 118 for Insert)
        #[arg(long)]
        toggle_keycode: Option<Keycode>,
    },

    /// Report whether a system tray owns the screen
    Check {
        /// X display (e.g., :0), defaults to $DISPLAY
        #[arg(short, long)]
        display: Option<String>,

        /// Screen to check, defaults to the display's default screen
        #[arg(short, long)]
        screen: Option<usize>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xtray=info".parse()?)
                .add_directive("x11rb=warn".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            display,
            screen,
            orientation,
            replace,
            icon_size,
            toggle_keycode,
        } => {
            let config = DaemonConfig {
                display,
                screen,
                tray: TrayConfig {
                    orientation,
                    replace,
                    ..TrayConfig::default()
                },
                icon_size,
                toggle_keycode,
            };
            match daemon::run(config).await? {
                Exit::Interrupted => eprintln!("interrupted, tray released"),
                Exit::SelectionLost => eprintln!("another tray took over, exiting"),
            }
            Ok(())
        }
        Commands::Check { display, screen } => {
            let (screen, running) = daemon::check(display.as_deref(), screen)?;
            if running {
                println!("screen {}: system tray running", screen);
            } else {
                println!("screen {}: no system tray", screen);
            }
            Ok(())
        }
    }
}
