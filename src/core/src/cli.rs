use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "AutoDark - per-app force-dark block list for Android", version)]
pub struct Cli {
    #[clap(long, short, help = "Settings file (TOML)", global = true)]
    pub config: Option<PathBuf>,

    #[clap(long, help = "Override the directory holding the block list", global = true)]
    pub data_dir: Option<PathBuf>,

    #[clap(long, help = "Override the broadcast socket directory", global = true)]
    pub socket_dir: Option<PathBuf>,

    #[clap(
        long,
        help = "Give up waiting for the host after this many milliseconds (waits forever by default)",
        global = true
    )]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the persisted block list
    List,
    /// Block packages and sync the list
    Add {
        #[clap(required = true)]
        packages: Vec<String>,
    },
    /// Unblock packages and sync the list
    Remove {
        #[clap(required = true)]
        packages: Vec<String>,
    },
    /// Push the current list and wait for the host to load it
    Sync,
    /// Push the persisted list without waiting, used on boot and scheduled alarms
    Resync,
    /// Check that the host module is loaded
    Probe,
    /// Report the active input method to the host
    Ime { package: String },
    /// Report a foreground activity to the host
    Activity { package: String },
    /// Make the host log its block set
    Dump,
    /// Unregister the host receiver
    Shutdown,
    /// Run the privileged host without runtime hooks
    Serve {
        #[clap(long, help = "Detach from the terminal")]
        daemon: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
