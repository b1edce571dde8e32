use std::sync::mpsc;

use crate::config::Config;
use crate::db::Database;

use super::super::backend::{BackendClient, ModuleSnapshot};
use super::super::build_engine;
use super::super::module::module_locators;
use super::super::player::{ClockEngine, MediaEngine, PlayerOptions, PlaylistPlayer};
use super::{FetchKind, FetchResult, ModulePage};

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

pub(super) fn volume_step(current: f32, delta: f32) -> f32 {
    (((current + delta) * 10.0).round() / 10.0).clamp(0.0, 1.0)
}

pub(super) fn spawn_fetch(
    client: &BackendClient,
    token: &str,
    kind: FetchKind,
    tx: &mpsc::Sender<FetchResult>,
) {
    let client = client.clone();
    let token = token.to_string();
    let tx = tx.clone();
    std::thread::spawn(move || {
        let outcome = match kind {
            FetchKind::Current => client.current_module(&token),
            FetchKind::Next { current_serial } => client.next_module(&token, current_serial),
        };
        let _ = tx.send(FetchResult { kind, outcome });
    });
}

pub(super) fn drain_fetch_results(rx: &mpsc::Receiver<FetchResult>) -> Vec<FetchResult> {
    let mut out = Vec::new();
    while let Ok(result) = rx.try_recv() {
        out.push(result);
    }
    out
}

/// Builds the page for a freshly fetched module. Falls back to the headless
/// engine when the configured one cannot start; the notice says so.
pub(super) fn build_module_page<'a>(
    db: &'a Database,
    config: &Config,
    snapshot: ModuleSnapshot,
    options: PlayerOptions,
) -> (ModulePage<'a>, Option<String>) {
    let video = &snapshot.progress.video;
    let durations = vec![(video.url.clone(), video.duration)];
    let (engine, notice): (Box<dyn MediaEngine>, Option<String>) =
        match build_engine(config, &durations, video.duration) {
            Ok(engine) => (engine, None),
            Err(err) => {
                tracing::warn!("media engine unavailable, using headless playback: {err:#}");
                let engine = ClockEngine::new(video.duration, config.progress_interval)
                    .with_duration(&video.url, video.duration);
                (
                    Box::new(engine),
                    Some(status_error(&format!(
                        "Video engine unavailable ({err}); using headless playback."
                    ))),
                )
            }
        };

    let player = PlaylistPlayer::new(module_locators(&snapshot), engine, db, options);
    (ModulePage { snapshot, player }, notice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_step_rounds_to_tenths_and_clamps() {
        assert_eq!(volume_step(0.8, 0.1), 0.9);
        assert_eq!(volume_step(0.95, 0.1), 1.0);
        assert_eq!(volume_step(0.05, -0.1), 0.0);
        assert_eq!(volume_step(0.3, -0.1), 0.2);
    }

    #[test]
    fn status_helpers_prefix_messages() {
        assert_eq!(status_info("ready"), "INFO: ready");
        assert_eq!(status_error("boom"), "ERROR: boom");
    }
}
