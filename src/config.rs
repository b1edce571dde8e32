use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

pub const DEFAULT_API_BASE_URL: &str = "https://lizmotors-backend.vercel.app";
const DEFAULT_PLAYER_BIN: &str = "mpv";
const MIN_PROGRESS_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Drive an external mpv process over its IPC socket.
    Mpv,
    /// Simulated timeline, no video output.
    Headless,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub player_bin: PathBuf,
    pub progress_interval: Duration,
    pub engine: EngineKind,
}

impl Config {
    pub fn resolve(api_url_override: Option<&str>, engine_override: Option<EngineKind>) -> Self {
        let api_base_url = match api_url_override {
            Some(url) if !url.trim().is_empty() => normalize_base_url(url),
            _ => resolve_api_base_url_from_env(env::var_os("LESSONPLAY_API_URL")),
        };
        Self {
            api_base_url,
            player_bin: resolve_player_bin_from_env(env::var_os("LESSONPLAY_PLAYER_BIN")),
            progress_interval: resolve_progress_interval_from_env(env::var_os(
                "LESSONPLAY_PROGRESS_INTERVAL_MS",
            )),
            engine: engine_override.unwrap_or(default_engine()),
        }
    }
}

fn default_engine() -> EngineKind {
    if cfg!(unix) {
        EngineKind::Mpv
    } else {
        EngineKind::Headless
    }
}

pub fn resolve_api_base_url_from_env(env_value: Option<OsString>) -> String {
    match env_value.and_then(|value| value.into_string().ok()) {
        Some(value) if !value.trim().is_empty() => normalize_base_url(&value),
        _ => DEFAULT_API_BASE_URL.to_string(),
    }
}

pub fn resolve_player_bin_from_env(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from(DEFAULT_PLAYER_BIN),
    }
}

/// Progress writes are bounded to one per second at most.
pub fn resolve_progress_interval_from_env(env_value: Option<OsString>) -> Duration {
    env_value
        .and_then(|value| value.into_string().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .map(|interval| interval.max(MIN_PROGRESS_INTERVAL))
        .unwrap_or(MIN_PROGRESS_INTERVAL)
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
