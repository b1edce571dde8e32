use clap::{Parser, Subcommand};

use crate::config::EngineKind;

#[derive(Debug, Parser)]
#[command(
    name = "lessonplay",
    version,
    about = "Work through course modules and resume their videos where you left off"
)]
pub struct Cli {
    /// Backend base URL (overrides LESSONPLAY_API_URL).
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Media engine used for playback.
    #[arg(long, value_enum, global = true)]
    pub engine: Option<EngineKind>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session token.
    Login {
        #[arg(long)]
        email: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    Logout,
    /// Print the current module.
    Module,
    /// Advance to the next module and print it.
    Next,
    /// Play locators in order without the TUI.
    Play {
        #[arg(required = true)]
        locators: Vec<String>,
        /// Duration assumed by the headless engine, in seconds.
        #[arg(long, default_value_t = 60.0)]
        duration: f64,
    },
    /// List stored resume positions.
    Positions,
    /// Drop the stored resume position for one locator.
    Forget { locator: String },
    /// Keep only the most recently updated resume positions.
    Prune {
        #[arg(long)]
        keep: usize,
    },
    Tui,
}
