mod auth;
mod backend;
mod module;
mod player;
mod tui;


use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::cli::{Cli, Command};
use crate::config::{Config, EngineKind};
use crate::db::Database;
use crate::paths::database_file_path;

use self::auth::{clear_token, require_token, save_token, validate_credentials};
use self::backend::{BackendClient, BackendError, ModuleSnapshot};
use self::module::{format_clock, format_module_summary, format_saved_at_display, truncate};
use self::player::{
    ClockEngine, MediaEngine, PlayerOptions, PlayerPhase, PlaylistPlayer, RESUME_KEY_PREFIX,
    ResumePositions, locator_from_resume_key, resume_key,
};

const PLAY_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli.api_url.as_deref(), cli.engine);
    let db = open_db()?;
    let client = BackendClient::new(&config.api_base_url);
    tracing::debug!(api = %config.api_base_url, engine = ?config.engine, "starting");

    match cli.command {
        Some(Command::Login { email, password }) => run_login(&db, &client, &email, password)?,
        Some(Command::Logout) => run_logout(&db)?,
        Some(Command::Module) => run_module(&db, &client)?,
        Some(Command::Next) => run_next(&db, &client)?,
        Some(Command::Play {
            locators,
            duration,
        }) => run_play(&db, &config, &locators, duration)?,
        Some(Command::Positions) => run_positions(&db)?,
        Some(Command::Forget { locator }) => run_forget(&db, &locator)?,
        Some(Command::Prune { keep }) => run_prune(&db, keep)?,
        Some(Command::Tui) | None => tui::run_tui(&db, &client, &config)?,
    }

    Ok(())
}

fn run_login(
    db: &Database,
    client: &BackendClient,
    email: &str,
    password: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password()?,
    };
    validate_credentials(email, &password)?;

    let token = client
        .login(email.trim(), &password)
        .context("login failed")?;
    save_token(db, &token)?;
    tracing::info!(email = email.trim(), "logged in");
    println!("Logged in as {}.", email.trim());
    Ok(())
}

fn prompt_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn run_logout(db: &Database) -> Result<()> {
    if clear_token(db)? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

fn run_module(db: &Database, client: &BackendClient) -> Result<()> {
    let token = match require_token(db) {
        Ok(token) => token,
        Err(err) => return report_backend_error(db, err, "Failed to fetch module progress"),
    };
    match client.current_module(&token) {
        Ok(snapshot) => print_snapshot(db, &snapshot),
        Err(err) => report_backend_error(db, err, "Failed to fetch module progress")?,
    }
    Ok(())
}

fn run_next(db: &Database, client: &BackendClient) -> Result<()> {
    let token = match require_token(db) {
        Ok(token) => token,
        Err(err) => return report_backend_error(db, err, "Failed to fetch next module"),
    };
    let current = match client.current_module(&token) {
        Ok(snapshot) => snapshot,
        Err(err) => return report_backend_error(db, err, "Failed to fetch module progress"),
    };
    match client.next_module(&token, current.module.serial_number) {
        Ok(snapshot) => print_snapshot(db, &snapshot),
        Err(err) => report_backend_error(db, err, "Failed to fetch next module")?,
    }
    Ok(())
}

fn print_snapshot(db: &Database, snapshot: &ModuleSnapshot) {
    println!("{}", format_module_summary(snapshot));
    if let Some(seconds) = ResumePositions::new(db).load(&snapshot.progress.video.url) {
        println!("Resume from {}", format_clock(seconds));
    }
}

/// 401 drops the stored token; other failures are reported and leave state alone.
fn report_backend_error(db: &Database, err: BackendError, what: &str) -> Result<()> {
    match err {
        BackendError::Unauthorized => {
            tracing::warn!("backend rejected token, clearing it");
            clear_token(db)?;
            println!("Unauthorized access. {}", not_logged_in_message());
        }
        BackendError::MissingToken => println!("{}", not_logged_in_message()),
        other => {
            tracing::error!("{what}: {other}");
            println!("{what}: {other}");
        }
    }
    Ok(())
}

fn not_logged_in_message() -> &'static str {
    "No auth token found, please log in again with `lessonplay login --email <EMAIL>`."
}

pub(super) fn build_engine(
    config: &Config,
    durations: &[(String, f64)],
    fallback_duration: f64,
) -> Result<Box<dyn MediaEngine>> {
    match config.engine {
        EngineKind::Headless => {
            let mut engine = ClockEngine::new(fallback_duration, config.progress_interval);
            for (locator, seconds) in durations {
                engine = engine.with_duration(locator, *seconds);
            }
            Ok(Box::new(engine))
        }
        #[cfg(unix)]
        EngineKind::Mpv => Ok(Box::new(player::MpvEngine::spawn(
            &config.player_bin,
            config.progress_interval,
        )?)),
        #[cfg(not(unix))]
        EngineKind::Mpv => bail!("the mpv engine is only available on unix; use --engine headless"),
    }
}

fn run_play(db: &Database, config: &Config, locators: &[String], duration: f64) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        bail!("--duration must be a positive number of seconds");
    }
    let engine = build_engine(config, &[], duration)?;
    let mut player = PlaylistPlayer::new(
        locators,
        engine,
        db,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );
    if !player.has_playable_source() {
        println!("No valid video sources available.");
        return Ok(());
    }

    let total = player.playlist().len();
    let mut last_reported = None;
    loop {
        player.pump();
        let phase = player.phase();
        if last_reported != Some(phase) {
            last_reported = Some(phase);
            match phase {
                PlayerPhase::Playing(index) | PlayerPhase::Paused(index) => {
                    let locator = player.current_locator().unwrap_or_default();
                    match player.resumed_from() {
                        Some(seconds) => println!(
                            "[{}/{total}] {phase}: {locator} (resumed at {})",
                            index + 1,
                            format_clock(seconds)
                        ),
                        None => println!("[{}/{total}] {phase}: {locator}", index + 1),
                    }
                }
                PlayerPhase::Stopped => {
                    println!("Playlist finished.");
                    break;
                }
                PlayerPhase::Idle | PlayerPhase::Loading(_) | PlayerPhase::SeekingThenPlaying(_) => {}
            }
        }
        thread::sleep(PLAY_POLL_INTERVAL);
    }
    Ok(())
}

fn run_positions(db: &Database) -> Result<()> {
    let items = db.list_prefixed(RESUME_KEY_PREFIX)?;
    if items.is_empty() {
        println!("No stored resume positions yet.");
        return Ok(());
    }

    println!("{:<60} {:<10} {:<28}", "LOCATOR", "POSITION", "SAVED");
    for item in items {
        let locator = locator_from_resume_key(&item.key).unwrap_or(&item.key);
        let position = item
            .value
            .parse::<f64>()
            .map(format_clock)
            .unwrap_or_else(|_| item.value.clone());
        println!(
            "{:<60} {:<10} {:<28}",
            truncate(locator, 60),
            position,
            format_saved_at_display(&item.updated_at)
        );
    }
    Ok(())
}

fn run_forget(db: &Database, locator: &str) -> Result<()> {
    if db.remove_value(&resume_key(locator))? {
        println!("Forgot resume position for {locator}.");
    } else {
        println!("No resume position stored for {locator}.");
    }
    Ok(())
}

fn run_prune(db: &Database, keep: usize) -> Result<()> {
    let removed = db.prune_prefixed(RESUME_KEY_PREFIX, keep)?;
    tracing::info!(removed, keep, "pruned resume positions");
    println!("Removed {removed} resume position(s); kept at most {keep}.");
    Ok(())
}

fn open_db() -> Result<Database> {
    let db_path = database_file_path()?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
