mod app;
mod cli;
mod config;
mod db;
mod http;
mod logging;
mod paths;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    if let Err(err) = paths::log_file_path().and_then(|path| logging::init_logging(&path)) {
        eprintln!("Warning: logging disabled: {err:#}");
    }
    app::run(cli)
}
