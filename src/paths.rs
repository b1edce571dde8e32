use std::path::PathBuf;

use anyhow::{Context, Result};

fn data_root() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("lessonplay"))
}

pub fn database_file_path() -> Result<PathBuf> {
    Ok(data_root()?.join("lessonplay.db"))
}

pub fn log_file_path() -> Result<PathBuf> {
    Ok(data_root()?.join("lessonplay.log"))
}
