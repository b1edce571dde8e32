use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use super::PlayerEvent;

/// The media backend a [`super::PlaylistPlayer`] drives.
///
/// Commands may fail; the player treats every failure as a no-op. Notifications
/// are queued by the engine and handed out through `poll_events`.
pub(crate) trait MediaEngine {
    fn load(&mut self, locator: &str) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn seek_to(&mut self, seconds: f64) -> Result<()>;
    fn current_time(&self) -> Option<f64>;
    fn duration(&self) -> Option<f64>;
    fn set_volume(&mut self, volume: f32) -> Result<()>;
    fn set_muted(&mut self, muted: bool) -> Result<()>;
    fn poll_events(&mut self) -> Vec<PlayerEvent>;
}

impl<E: MediaEngine + ?Sized> MediaEngine for Box<E> {
    fn load(&mut self, locator: &str) -> Result<()> {
        (**self).load(locator)
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<()> {
        (**self).pause()
    }

    fn seek_to(&mut self, seconds: f64) -> Result<()> {
        (**self).seek_to(seconds)
    }

    fn current_time(&self) -> Option<f64> {
        (**self).current_time()
    }

    fn duration(&self) -> Option<f64> {
        (**self).duration()
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        (**self).set_volume(volume)
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        (**self).set_muted(muted)
    }

    fn poll_events(&mut self) -> Vec<PlayerEvent> {
        (**self).poll_events()
    }
}

/// Headless engine: a simulated timeline advanced by the wall clock.
#[derive(Debug)]
pub(crate) struct ClockEngine {
    durations: HashMap<String, f64>,
    fallback_duration: f64,
    progress_interval: Duration,
    locator: Option<String>,
    duration: f64,
    position: f64,
    playing: bool,
    ended: bool,
    since_progress: Duration,
    last_poll: Option<Instant>,
    volume: f32,
    muted: bool,
    failures: Vec<PlayerEvent>,
}

impl ClockEngine {
    pub(crate) fn new(fallback_duration: f64, progress_interval: Duration) -> Self {
        Self {
            durations: HashMap::new(),
            fallback_duration: fallback_duration.max(0.0),
            progress_interval,
            locator: None,
            duration: 0.0,
            position: 0.0,
            playing: false,
            ended: false,
            since_progress: Duration::ZERO,
            last_poll: None,
            volume: 1.0,
            muted: false,
            failures: Vec::new(),
        }
    }

    pub(crate) fn with_duration(mut self, locator: &str, seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            self.durations.insert(locator.to_string(), seconds);
        }
        self
    }

    #[cfg(test)]
    pub(crate) fn is_playing(&self) -> bool {
        self.playing
    }

    #[cfg(test)]
    pub(crate) fn audio(&self) -> (f32, bool) {
        (self.volume, self.muted)
    }

    /// Moves the timeline forward and returns the notifications it produced.
    pub(crate) fn advance(&mut self, elapsed: Duration) -> Vec<PlayerEvent> {
        let mut events = std::mem::take(&mut self.failures);
        let Some(locator) = self.locator.clone() else {
            return events;
        };
        if !self.playing || self.ended {
            return events;
        }

        self.position += elapsed.as_secs_f64();
        self.since_progress += elapsed;

        if self.position >= self.duration {
            self.position = self.duration;
            self.playing = false;
            self.ended = true;
            events.push(PlayerEvent::Progress {
                locator: locator.clone(),
                played_fraction: 1.0,
            });
            events.push(PlayerEvent::Ended { locator });
            return events;
        }

        if self.since_progress >= self.progress_interval {
            self.since_progress = Duration::ZERO;
            events.push(PlayerEvent::Progress {
                locator,
                played_fraction: self.position / self.duration,
            });
        }
        events
    }
}

impl MediaEngine for ClockEngine {
    fn load(&mut self, locator: &str) -> Result<()> {
        let duration = self
            .durations
            .get(locator)
            .copied()
            .unwrap_or(self.fallback_duration);
        if duration <= 0.0 {
            self.locator = None;
            self.failures.push(PlayerEvent::Failed {
                locator: locator.to_string(),
                reason: "no known duration".to_string(),
            });
            return Err(anyhow!("no known duration for {locator}"));
        }
        self.locator = Some(locator.to_string());
        self.duration = duration;
        self.position = 0.0;
        self.playing = false;
        self.ended = false;
        self.since_progress = Duration::ZERO;
        self.last_poll = None;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        if self.locator.is_none() {
            return Err(anyhow!("nothing loaded"));
        }
        if !self.ended {
            self.playing = true;
            self.last_poll = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.playing = false;
        self.last_poll = None;
        Ok(())
    }

    fn seek_to(&mut self, seconds: f64) -> Result<()> {
        if self.locator.is_none() {
            return Err(anyhow!("nothing loaded"));
        }
        if !seconds.is_finite() {
            return Err(anyhow!("invalid seek target {seconds}"));
        }
        self.position = seconds.clamp(0.0, self.duration);
        Ok(())
    }

    fn current_time(&self) -> Option<f64> {
        self.locator.as_ref().map(|_| self.position)
    }

    fn duration(&self) -> Option<f64> {
        self.locator.as_ref().map(|_| self.duration)
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.volume = volume;
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.muted = muted;
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<PlayerEvent> {
        let now = Instant::now();
        let elapsed = self
            .last_poll
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        if self.playing {
            self.last_poll = Some(now);
        }
        self.advance(elapsed)
    }
}
