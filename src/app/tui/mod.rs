mod actions;
mod render;
mod session;

use std::io;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use crate::config::Config;
use crate::db::Database;

use super::auth::{clear_token, is_authenticated, require_token};
use super::backend::{BackendClient, BackendError, ModuleSnapshot};
use super::player::{Dimension, MediaEngine, PlayerOptions, PlaylistPlayer, RenderHints};

use self::actions::{
    build_module_page, drain_fetch_results, spawn_fetch, status_error, status_info, volume_step,
};
use self::render::draw_tui;
use self::session::TerminalSession;

const VOLUME_STEP: f32 = 0.1;
/// Fixed video surface on the module page, in terminal cells.
const MODULE_VIDEO_HINTS: RenderHints = RenderHints {
    width: Dimension::Cells(60),
    height: Dimension::Cells(12),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FetchKind {
    Current,
    Next { current_serial: i64 },
}

impl FetchKind {
    fn failure_label(self) -> &'static str {
        match self {
            Self::Current => "Failed to fetch module progress",
            Self::Next { .. } => "Failed to fetch next module",
        }
    }
}

#[derive(Debug)]
pub(super) struct FetchResult {
    pub(super) kind: FetchKind,
    pub(super) outcome: Result<ModuleSnapshot, BackendError>,
}

pub(super) struct ModulePage<'a> {
    pub(super) snapshot: ModuleSnapshot,
    pub(super) player: PlaylistPlayer<Box<dyn MediaEngine>, &'a Database>,
}

pub(crate) fn run_tui(db: &Database, client: &BackendClient, config: &Config) -> Result<()> {
    if !is_authenticated(db) {
        println!(
            "No auth token found, please log in again with `lessonplay login --email <EMAIL>`."
        );
        return Ok(());
    }
    let token = require_token(db)?;

    let mut session = TerminalSession::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let (fetch_tx, fetch_rx) = mpsc::channel::<FetchResult>();
    let mut page = None::<ModulePage>;
    let mut pending_fetch = Some(FetchKind::Current);
    let mut exit_message = None::<String>;
    let mut status = status_info("Loading...");
    spawn_fetch(client, &token, FetchKind::Current, &fetch_tx);

    loop {
        for result in drain_fetch_results(&fetch_rx) {
            pending_fetch = None;
            match result.outcome {
                Ok(snapshot) => {
                    let options = PlayerOptions {
                        hints: MODULE_VIDEO_HINTS,
                        ..PlayerOptions::default()
                    };
                    let (new_page, notice) = build_module_page(db, config, snapshot, options);
                    status = notice.unwrap_or_else(|| {
                        status_info(&format!(
                            "Module {} ready. Press space to play.",
                            new_page.snapshot.module.serial_number
                        ))
                    });
                    page = Some(new_page);
                }
                Err(BackendError::Unauthorized) => {
                    tracing::warn!("backend rejected token, clearing it");
                    clear_token(db)?;
                    exit_message = Some(
                        "Unauthorized access. Log in again with `lessonplay login --email <EMAIL>`."
                            .to_string(),
                    );
                }
                Err(err) => {
                    tracing::error!("{}: {err}", result.kind.failure_label());
                    status = status_error(&format!("{}: {err}", result.kind.failure_label()));
                }
            }
        }
        if exit_message.is_some() {
            break;
        }

        if let Some(current) = page.as_mut() {
            current.player.pump();
        }

        terminal.draw(|frame| draw_tui(frame, page.as_ref(), &status, pending_fetch))?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('q') => break,
            KeyCode::Char('n') => {
                if pending_fetch.is_some() {
                    status = status_info("Still loading, please wait.");
                    continue;
                }
                let Some(current) = page.as_ref() else {
                    continue;
                };
                let kind = FetchKind::Next {
                    current_serial: current.snapshot.module.serial_number,
                };
                spawn_fetch(client, &token, kind, &fetch_tx);
                pending_fetch = Some(kind);
                status = status_info("Loading next module...");
            }
            KeyCode::Char('r') => {
                if pending_fetch.is_none() {
                    spawn_fetch(client, &token, FetchKind::Current, &fetch_tx);
                    pending_fetch = Some(FetchKind::Current);
                    status = status_info("Reloading module...");
                }
            }
            code => {
                let Some(current) = page.as_mut() else {
                    continue;
                };
                let player = &mut current.player;
                if !player.has_playable_source() {
                    continue;
                }
                match code {
                    KeyCode::Char(' ') => player.toggle_play_pause(),
                    KeyCode::Left => player.rewind(),
                    KeyCode::Right => player.fast_forward(),
                    KeyCode::Char('+') | KeyCode::Char('=') => {
                        let volume = volume_step(player.state().volume, VOLUME_STEP);
                        player.set_volume(volume);
                    }
                    KeyCode::Char('-') => {
                        let volume = volume_step(player.state().volume, -VOLUME_STEP);
                        player.set_volume(volume);
                    }
                    KeyCode::Char('m') => player.toggle_mute(),
                    _ => {}
                }
            }
        }
    }

    // Drop the engine before restoring the terminal.
    drop(page);
    terminal.show_cursor()?;
    session.leave()?;
    if let Some(message) = exit_message {
        println!("{message}");
    }
    Ok(())
}
