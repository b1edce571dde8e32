mod engine;
#[cfg(unix)]
mod mpv;
mod resume;

#[cfg(test)]
mod tests;

use std::fmt;

use crate::db::KeyValueStore;

pub(crate) use engine::{ClockEngine, MediaEngine};
#[cfg(unix)]
pub(crate) use mpv::MpvEngine;
pub(crate) use resume::{RESUME_KEY_PREFIX, ResumePositions, locator_from_resume_key, resume_key};

pub(crate) const SKIP_SECONDS: f64 = 10.0;
pub(crate) const DEFAULT_VOLUME: f32 = 0.8;

/// Notifications an engine delivers about the item it is playing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlayerEvent {
    Progress {
        locator: String,
        played_fraction: f64,
    },
    Ended {
        locator: String,
    },
    /// The engine gave up on the item (unreadable source, engine gone).
    Failed {
        locator: String,
        reason: String,
    },
}

impl PlayerEvent {
    fn locator(&self) -> &str {
        match self {
            Self::Progress { locator, .. }
            | Self::Ended { locator }
            | Self::Failed { locator, .. } => locator,
        }
    }
}

/// Rendering hint for one axis of the video surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dimension {
    Fill,
    Auto,
    Cells(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RenderHints {
    pub(crate) width: Dimension,
    pub(crate) height: Dimension,
}

impl Default for RenderHints {
    fn default() -> Self {
        Self {
            width: Dimension::Fill,
            height: Dimension::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PlayerOptions {
    pub(crate) autoplay: bool,
    pub(crate) volume: f32,
    pub(crate) hints: RenderHints,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            autoplay: false,
            volume: DEFAULT_VOLUME,
            hints: RenderHints::default(),
        }
    }
}

/// Locators eligible for playback, blank entries removed, order preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Playlist {
    entries: Vec<String>,
}

impl Playlist {
    pub(crate) fn from_locators<I, S>(locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = locators
            .into_iter()
            .filter(|locator| !locator.as_ref().trim().is_empty())
            .map(|locator| locator.as_ref().to_string())
            .collect();
        Self { entries }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn as_slice(&self) -> &[String] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PlaybackState {
    pub(crate) current_index: usize,
    pub(crate) is_playing: bool,
    pub(crate) played_fraction: f64,
    pub(crate) volume: f32,
    pub(crate) muted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayerPhase {
    /// No playable source; terminal.
    Idle,
    Loading(usize),
    SeekingThenPlaying(usize),
    Playing(usize),
    Paused(usize),
    /// Last item finished; terminal.
    Stopped,
}

impl PlayerPhase {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }
}

impl fmt::Display for PlayerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("No playable source"),
            Self::Loading(_) => f.write_str("Loading"),
            Self::SeekingThenPlaying(_) => f.write_str("Resuming"),
            Self::Playing(_) => f.write_str("Playing"),
            Self::Paused(_) => f.write_str("Paused"),
            Self::Stopped => f.write_str("Finished"),
        }
    }
}

/// Sequential player over a [`Playlist`] that remembers where each locator was left.
pub(crate) struct PlaylistPlayer<E, S> {
    playlist: Playlist,
    engine: E,
    positions: ResumePositions<S>,
    state: PlaybackState,
    phase: PlayerPhase,
    hints: RenderHints,
    resumed_from: Option<f64>,
}

impl<E: MediaEngine, S: KeyValueStore> PlaylistPlayer<E, S> {
    pub(crate) fn new<I, L>(locators: I, engine: E, store: S, options: PlayerOptions) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<str>,
    {
        let playlist = Playlist::from_locators(locators);
        let mut player = Self {
            playlist,
            engine,
            positions: ResumePositions::new(store),
            state: PlaybackState {
                current_index: 0,
                is_playing: false,
                played_fraction: 0.0,
                volume: sanitize_volume(options.volume).unwrap_or(DEFAULT_VOLUME),
                muted: false,
            },
            phase: PlayerPhase::Idle,
            hints: options.hints,
            resumed_from: None,
        };

        if player.playlist.is_empty() {
            tracing::info!("playlist has no playable source");
            return player;
        }

        player.state.is_playing = options.autoplay;
        player.sync_audio();
        player.activate(0);
        player
    }

    pub(crate) fn has_playable_source(&self) -> bool {
        !self.playlist.is_empty()
    }

    pub(crate) fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.state
    }

    pub(crate) fn phase(&self) -> PlayerPhase {
        self.phase
    }

    pub(crate) fn hints(&self) -> RenderHints {
        self.hints
    }

    pub(crate) fn resumed_from(&self) -> Option<f64> {
        self.resumed_from
    }

    pub(crate) fn current_locator(&self) -> Option<&str> {
        if self.phase == PlayerPhase::Idle {
            return None;
        }
        self.playlist.get(self.state.current_index)
    }

    pub(crate) fn engine(&self) -> &E {
        &self.engine
    }

    #[cfg(test)]
    pub(crate) fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Drains queued engine notifications through [`Self::handle_event`].
    pub(crate) fn pump(&mut self) -> usize {
        let events = self.engine.poll_events();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    /// Events are matched to the current item by locator only, so a late event
    /// from an earlier duplicate of the same locator is applied to the current one.
    pub(crate) fn handle_event(&mut self, event: PlayerEvent) {
        if self.phase.is_terminal() {
            return;
        }
        if self.current_locator() != Some(event.locator()) {
            tracing::debug!(locator = event.locator(), "dropping event for superseded item");
            return;
        }

        match event {
            PlayerEvent::Progress {
                locator,
                played_fraction,
            } => self.record_progress(&locator, played_fraction),
            PlayerEvent::Ended { .. } => self.finish_current(true),
            PlayerEvent::Failed { locator, reason } => {
                tracing::warn!(locator = %locator, reason = %reason, "skipping unplayable item");
                self.finish_current(self.state.is_playing);
            }
        }
    }

    pub(crate) fn toggle_play_pause(&mut self) {
        let index = match self.phase {
            PlayerPhase::Playing(index) | PlayerPhase::Paused(index) => index,
            _ => return,
        };
        self.state.is_playing = !self.state.is_playing;
        self.apply_transport(index);
    }

    pub(crate) fn rewind(&mut self) {
        self.seek_relative(-SKIP_SECONDS);
    }

    pub(crate) fn fast_forward(&mut self) {
        self.seek_relative(SKIP_SECONDS);
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        if !self.has_playable_source() {
            return;
        }
        let Some(volume) = sanitize_volume(volume) else {
            return;
        };
        self.state.volume = volume;
        self.state.muted = false;
        self.sync_audio();
    }

    pub(crate) fn toggle_mute(&mut self) {
        if !self.has_playable_source() {
            return;
        }
        self.state.muted = !self.state.muted;
        if let Err(err) = self.engine.set_muted(self.state.muted) {
            tracing::warn!("engine mute failed: {err:#}");
        }
    }

    fn activate(&mut self, index: usize) {
        let Some(locator) = self.playlist.get(index).map(str::to_string) else {
            return;
        };
        self.state.current_index = index;
        self.state.played_fraction = 0.0;
        self.resumed_from = None;
        self.phase = PlayerPhase::Loading(index);
        tracing::info!(index, locator = %locator, "loading playlist item");

        if let Err(err) = self.engine.load(&locator) {
            tracing::warn!(locator = %locator, "engine load failed: {err:#}");
        }

        // Restore must land before play is issued.
        if let Some(seconds) = self.positions.load(&locator) {
            self.phase = PlayerPhase::SeekingThenPlaying(index);
            match self.engine.seek_to(seconds) {
                Ok(()) => self.resumed_from = Some(seconds),
                Err(err) => tracing::warn!(locator = %locator, seconds, "resume seek failed: {err:#}"),
            }
        }

        self.apply_transport(index);
    }

    fn apply_transport(&mut self, index: usize) {
        let result = if self.state.is_playing {
            self.phase = PlayerPhase::Playing(index);
            self.engine.play()
        } else {
            self.phase = PlayerPhase::Paused(index);
            self.engine.pause()
        };
        if let Err(err) = result {
            tracing::warn!(index, "engine transport command failed: {err:#}");
        }
    }

    fn record_progress(&mut self, locator: &str, played_fraction: f64) {
        if !played_fraction.is_finite() {
            return;
        }
        self.state.played_fraction = played_fraction.clamp(0.0, 1.0);

        let Some(duration) = self.engine.duration() else {
            return;
        };
        if duration.is_finite() && duration > 0.0 {
            self.positions
                .save(locator, self.state.played_fraction * duration);
        }
    }

    fn finish_current(&mut self, play_next: bool) {
        let next = self.state.current_index + 1;
        if next < self.playlist.len() {
            self.state.is_playing = play_next;
            self.activate(next);
            return;
        }

        self.state.is_playing = false;
        self.phase = PlayerPhase::Stopped;
        tracing::info!("playlist finished");
        if let Err(err) = self.engine.pause() {
            tracing::warn!("engine pause at end of playlist failed: {err:#}");
        }
    }

    fn seek_relative(&mut self, offset: f64) {
        if !matches!(
            self.phase,
            PlayerPhase::Playing(_) | PlayerPhase::Paused(_)
        ) {
            return;
        }
        let Some(now) = self.engine.current_time() else {
            return;
        };
        if let Err(err) = self.engine.seek_to(now + offset) {
            tracing::warn!(offset, "relative seek failed: {err:#}");
        }
    }

    fn sync_audio(&mut self) {
        if let Err(err) = self.engine.set_volume(self.state.volume) {
            tracing::warn!("engine volume change failed: {err:#}");
        }
        if let Err(err) = self.engine.set_muted(self.state.muted) {
            tracing::warn!("engine mute failed: {err:#}");
        }
    }
}

fn sanitize_volume(volume: f32) -> Option<f32> {
    volume.is_finite().then(|| volume.clamp(0.0, 1.0))
}
