use std::env;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

use super::{MediaEngine, PlayerEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);
const TIME_POS_OBSERVER: u64 = 1;
const DURATION_OBSERVER: u64 = 2;

/// Command and notification bookkeeping for one mpv session, kept apart from
/// the socket so the ordering rules can be checked without a process.
#[derive(Debug)]
struct IpcState {
    locator: Option<String>,
    file_loaded: bool,
    pending_seek: Option<f64>,
    pending_play: bool,
    time_pos: Option<f64>,
    duration: Option<f64>,
    playing: bool,
    disconnected: bool,
    failure_reported: bool,
    progress_interval: Duration,
    last_progress: Option<Instant>,
    queued: Vec<PlayerEvent>,
}

impl IpcState {
    fn new(progress_interval: Duration) -> Self {
        Self {
            locator: None,
            file_loaded: false,
            pending_seek: None,
            pending_play: false,
            time_pos: None,
            duration: None,
            playing: false,
            disconnected: false,
            failure_reported: false,
            progress_interval,
            last_progress: None,
            queued: Vec::new(),
        }
    }

    /// Commands for a fresh item. The file stays paused until `file-loaded`
    /// so a deferred resume seek lands first.
    fn begin_load(&mut self, locator: &str) -> Vec<Value> {
        self.locator = Some(locator.to_string());
        self.file_loaded = false;
        self.pending_seek = None;
        self.pending_play = false;
        self.time_pos = None;
        self.duration = None;
        self.last_progress = None;
        self.playing = false;
        self.failure_reported = false;
        vec![
            json!(["set_property", "pause", true]),
            json!(["loadfile", locator, "replace"]),
        ]
    }

    fn request_play(&mut self) -> Option<Value> {
        self.playing = true;
        if !self.file_loaded {
            self.pending_play = true;
            return None;
        }
        Some(json!(["set_property", "pause", false]))
    }

    fn request_pause(&mut self) -> Value {
        self.pending_play = false;
        self.playing = false;
        json!(["set_property", "pause", true])
    }

    fn request_seek(&mut self, seconds: f64) -> Option<Value> {
        if !self.file_loaded {
            self.pending_seek = Some(seconds);
            return None;
        }
        Some(json!(["seek", seconds, "absolute"]))
    }

    fn current_time(&self) -> Option<f64> {
        if self.file_loaded {
            self.time_pos
        } else {
            self.pending_seek
        }
    }

    /// Applies one IPC message and returns the commands it releases.
    fn apply_message(&mut self, message: &Value) -> Vec<Value> {
        let Some(event) = message.get("event").and_then(Value::as_str) else {
            if let Some(error) = message.get("error").and_then(Value::as_str)
                && error != "success"
            {
                tracing::debug!(error, "mpv rejected a command");
            }
            return Vec::new();
        };

        let mut commands = Vec::new();
        match event {
            "property-change" => {
                let data = message.get("data").and_then(Value::as_f64);
                match message.get("id").and_then(Value::as_u64) {
                    Some(TIME_POS_OBSERVER) => self.time_pos = data,
                    Some(DURATION_OBSERVER) => self.duration = data,
                    _ => {}
                }
            }
            "file-loaded" => {
                self.file_loaded = true;
                if let Some(seconds) = self.pending_seek.take() {
                    commands.push(json!(["seek", seconds, "absolute"]));
                }
                if std::mem::take(&mut self.pending_play) {
                    commands.push(json!(["set_property", "pause", false]));
                }
            }
            "end-file" => match message.get("reason").and_then(Value::as_str) {
                Some("eof") => {
                    if let Some(locator) = self.locator.clone() {
                        self.playing = false;
                        self.queued.push(PlayerEvent::Ended { locator });
                    }
                }
                Some("error") => {
                    let detail = message
                        .get("file_error")
                        .and_then(Value::as_str)
                        .unwrap_or("unreadable source");
                    self.report_failure(detail);
                }
                _ => {}
            },
            _ => {}
        }
        commands
    }

    /// Queues at most one failure per loaded item.
    fn report_failure(&mut self, reason: &str) {
        if self.failure_reported {
            return;
        }
        let Some(locator) = self.locator.clone() else {
            return;
        };
        self.failure_reported = true;
        self.playing = false;
        self.queued.push(PlayerEvent::Failed {
            locator,
            reason: reason.to_string(),
        });
    }

    fn mark_disconnected(&mut self) {
        self.disconnected = true;
        self.report_failure("mpv exited");
    }

    fn queue_progress(&mut self, now: Instant) {
        let due = self
            .last_progress
            .is_none_or(|last| now.saturating_duration_since(last) >= self.progress_interval);
        if self.playing
            && self.file_loaded
            && due
            && let (Some(locator), Some(position), Some(duration)) =
                (self.locator.clone(), self.time_pos, self.duration)
            && duration > 0.0
        {
            self.last_progress = Some(now);
            self.queued.push(PlayerEvent::Progress {
                locator,
                played_fraction: position / duration,
            });
        }
    }

    fn take_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.queued)
    }
}

/// Engine backed by an external mpv process controlled over its JSON IPC socket.
pub(crate) struct MpvEngine {
    child: Child,
    socket_path: PathBuf,
    stream: UnixStream,
    read_buf: Vec<u8>,
    state: IpcState,
}

impl MpvEngine {
    pub(crate) fn spawn(bin: &Path, progress_interval: Duration) -> Result<Self> {
        let socket_path = ipc_socket_path();
        let mut child = ProcessCommand::new(bin)
            .arg("--idle=yes")
            .arg("--force-window=yes")
            .arg("--keep-open=no")
            .arg("--no-terminal")
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", bin.display()))?;

        let stream = match connect_with_deadline(&socket_path, CONNECT_TIMEOUT) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = fs::remove_file(&socket_path);
                return Err(err);
            }
        };
        stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .context("failed to configure mpv socket")?;

        let mut engine = Self {
            child,
            socket_path,
            stream,
            read_buf: Vec::new(),
            state: IpcState::new(progress_interval),
        };
        engine.send(json!(["observe_property", TIME_POS_OBSERVER, "time-pos"]))?;
        engine.send(json!(["observe_property", DURATION_OBSERVER, "duration"]))?;
        tracing::info!(socket = %engine.socket_path.display(), "mpv engine ready");
        Ok(engine)
    }

    fn send(&mut self, command: Value) -> Result<()> {
        if self.state.disconnected {
            return Err(anyhow!("mpv is no longer running"));
        }
        let mut line = json!({ "command": command }).to_string();
        line.push('\n');
        self.stream
            .write_all(line.as_bytes())
            .context("failed to write mpv command")
    }

    fn send_all(&mut self, commands: Vec<Value>) -> Result<()> {
        for command in commands {
            self.send(command)?;
        }
        Ok(())
    }

    fn read_messages(&mut self) -> Result<Vec<Value>> {
        self.stream.set_nonblocking(true)?;
        let mut chunk = [0_u8; 4096];
        let read_result = loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break Err(anyhow!("mpv closed the IPC socket")),
                Ok(read) => self.read_buf.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(err.into()),
            }
        };
        self.stream.set_nonblocking(false)?;
        read_result?;

        let mut messages = Vec::new();
        while let Some(newline) = self.read_buf.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.read_buf.drain(..=newline).collect();
            match serde_json::from_slice::<Value>(&line) {
                Ok(value) => messages.push(value),
                Err(err) => tracing::debug!("skipping malformed mpv message: {err}"),
            }
        }
        Ok(messages)
    }
}

impl MediaEngine for MpvEngine {
    fn load(&mut self, locator: &str) -> Result<()> {
        let commands = self.state.begin_load(locator);
        if self.state.disconnected {
            self.state.report_failure("mpv exited");
        }
        self.send_all(commands)
    }

    fn play(&mut self) -> Result<()> {
        match self.state.request_play() {
            Some(command) => self.send(command),
            None => Ok(()),
        }
    }

    fn pause(&mut self) -> Result<()> {
        let command = self.state.request_pause();
        self.send(command)
    }

    fn seek_to(&mut self, seconds: f64) -> Result<()> {
        match self.state.request_seek(seconds) {
            Some(command) => self.send(command),
            None => Ok(()),
        }
    }

    fn current_time(&self) -> Option<f64> {
        self.state.current_time()
    }

    fn duration(&self) -> Option<f64> {
        self.state.duration
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.send(json!(["set_property", "volume", f64::from(volume) * 100.0]))
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.send(json!(["set_property", "mute", muted]))
    }

    fn poll_events(&mut self) -> Vec<PlayerEvent> {
        if !self.state.disconnected {
            match self.read_messages() {
                Ok(messages) => {
                    for message in &messages {
                        let commands = self.state.apply_message(message);
                        if let Err(err) = self.send_all(commands) {
                            tracing::warn!("deferred mpv command failed: {err:#}");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("mpv IPC read failed, treating engine as gone: {err:#}");
                    self.state.mark_disconnected();
                }
            }
        }

        self.state.queue_progress(Instant::now());
        self.state.take_events()
    }
}

impl Drop for MpvEngine {
    fn drop(&mut self) {
        let _ = self.send(json!(["quit"]));
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = fs::remove_file(&self.socket_path);
    }
}

fn ipc_socket_path() -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    env::temp_dir().join(format!("lessonplay-mpv-{}-{ts}.sock", std::process::id()))
}

fn connect_with_deadline(path: &Path, timeout: Duration) -> Result<UnixStream> {
    let deadline = Instant::now() + timeout;
    loop {
        match UnixStream::connect(path) {
            Ok(stream) => return Ok(stream),
            Err(err) if Instant::now() < deadline => {
                tracing::trace!("waiting for mpv IPC socket: {err}");
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("mpv IPC socket {} never came up", path.display())
                });
            }
        }
    }
}
