use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Drive a huddle session against the loopback engine", long_about = None)]
pub struct Cli {
    /// Directory holding settings.json
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a scripted call and print every event as a JSON line
    Call {
        /// Room to join
        #[arg(short, long, default_value = "huddle-demo")]
        room: String,

        /// Access token handed to the engine
        #[arg(short, long, default_value = "loopback-token")]
        token: String,

        /// Turn the camera on after joining
        #[arg(long)]
        video: bool,

        /// Publish a data track and send a message over it
        #[arg(long)]
        data: bool,

        /// Identities of remote participants already in the room
        #[arg(long = "remote")]
        remotes: Vec<String>,

        /// Background and resume the host mid-call
        #[arg(long)]
        background: bool,
    },

    /// Show or change the stored join defaults
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print the stored settings
    Show,

    /// Change one setting, e.g. `set camera-type back`
    Set {
        key: String,
        value: String,
    },
}
