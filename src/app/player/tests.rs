use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};

use super::*;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Load(String),
    Play,
    Pause,
    SeekTo(f64),
    Volume(f32),
    Muted(bool),
}

#[derive(Debug, Default)]
struct RecordingEngine {
    calls: Vec<Call>,
    time: Option<f64>,
    duration: Option<f64>,
    fail_seeks: bool,
    queued: Vec<PlayerEvent>,
}

impl RecordingEngine {
    fn with_timeline(time: f64, duration: f64) -> Self {
        Self {
            time: Some(time),
            duration: Some(duration),
            ..Self::default()
        }
    }

    fn transport_calls(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|call| !matches!(call, Call::Volume(_) | Call::Muted(_)))
            .cloned()
            .collect()
    }
}

impl MediaEngine for RecordingEngine {
    fn load(&mut self, locator: &str) -> Result<()> {
        self.calls.push(Call::Load(locator.to_string()));
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.calls.push(Call::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.calls.push(Call::Pause);
        Ok(())
    }

    fn seek_to(&mut self, seconds: f64) -> Result<()> {
        self.calls.push(Call::SeekTo(seconds));
        if self.fail_seeks {
            return Err(anyhow!("seek rejected"));
        }
        Ok(())
    }

    fn current_time(&self) -> Option<f64> {
        self.time
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.calls.push(Call::Volume(volume));
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.calls.push(Call::Muted(muted));
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.queued)
    }
}

#[derive(Debug, Default)]
struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    fn with(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }

    fn value(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.values.borrow_mut().remove(key).is_some())
    }
}

struct BrokenStore;

impl KeyValueStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("storage unavailable"))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("storage full"))
    }

    fn remove(&self, _key: &str) -> Result<bool> {
        Err(anyhow!("storage unavailable"))
    }
}

const A1: &str = "https://a/1.mp4";
const A2: &str = "https://a/2.mp4";

fn progress(locator: &str, played_fraction: f64) -> PlayerEvent {
    PlayerEvent::Progress {
        locator: locator.to_string(),
        played_fraction,
    }
}

fn ended(locator: &str) -> PlayerEvent {
    PlayerEvent::Ended {
        locator: locator.to_string(),
    }
}

#[test]
fn playlist_drops_blank_entries_and_keeps_order() {
    let playlist = Playlist::from_locators(["", "b", "   ", "a", "\t", "c"]);
    assert_eq!(playlist.as_slice(), ["b", "a", "c"]);
    assert_eq!(playlist.len(), 3);
}

#[test]
fn empty_playlist_reports_no_source_and_never_touches_engine() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        ["", "  "],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    player.toggle_play_pause();
    player.fast_forward();
    player.set_volume(0.3);
    player.toggle_mute();
    player.handle_event(ended(""));

    assert!(!player.has_playable_source());
    assert_eq!(player.phase(), PlayerPhase::Idle);
    assert_eq!(player.current_locator(), None);
    assert!(player.engine().calls.is_empty());
    assert!(!player.state().is_playing);
}

#[test]
fn scenario_filters_then_auto_advances_on_end() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        ["", A1, A2],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    assert_eq!(player.playlist().as_slice(), [A1, A2]);
    assert_eq!(player.state().current_index, 0);
    assert_eq!(player.current_locator(), Some(A1));
    assert_eq!(player.phase(), PlayerPhase::Paused(0));

    player.handle_event(ended(A1));

    assert_eq!(player.state().current_index, 1);
    assert!(player.state().is_playing);
    assert_eq!(player.phase(), PlayerPhase::Playing(1));
    let calls = player.engine().transport_calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        [Call::Load(A2.to_string()), Call::Play]
    );
}

#[test]
fn completion_on_last_item_stops_without_advancing() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        RecordingEngine::default(),
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    player.handle_event(ended(A1));
    player.handle_event(ended(A2));

    assert_eq!(player.state().current_index, 1);
    assert!(!player.state().is_playing);
    assert_eq!(player.phase(), PlayerPhase::Stopped);

    player.toggle_play_pause();
    assert_eq!(player.phase(), PlayerPhase::Stopped);
    assert!(!player.state().is_playing);
}

#[test]
fn stored_position_is_sought_before_playback_starts() {
    let store = MemoryStore::with(&resume_key(A1), "45");
    let player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::with_timeline(0.0, 90.0),
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    assert_eq!(
        player.engine().transport_calls(),
        [Call::Load(A1.to_string()), Call::SeekTo(45.0), Call::Play]
    );
    assert_eq!(player.resumed_from(), Some(45.0));
    assert_eq!(player.state().played_fraction, 0.0);
}

#[test]
fn missing_position_starts_from_zero_without_seeking() {
    let store = MemoryStore::default();
    let player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    assert!(
        !player
            .engine()
            .calls
            .iter()
            .any(|call| matches!(call, Call::SeekTo(_)))
    );
    assert_eq!(player.resumed_from(), None);
}

#[test]
fn unparseable_position_is_treated_as_absent() {
    let store = MemoryStore::with(&resume_key(A1), "soon");
    let player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    assert_eq!(
        player.engine().transport_calls(),
        [Call::Load(A1.to_string()), Call::Pause]
    );
}

#[test]
fn progress_persists_elapsed_seconds_and_restores_them() {
    let store = MemoryStore::default();
    {
        let mut player = PlaylistPlayer::new(
            [A1],
            RecordingEngine::with_timeline(0.0, 90.0),
            &store,
            PlayerOptions::default(),
        );
        player.toggle_play_pause();
        player.handle_event(progress(A1, 0.25));
        assert_eq!(player.state().played_fraction, 0.25);
    }
    assert_eq!(store.value(&resume_key(A1)).as_deref(), Some("22.5"));

    let player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::with_timeline(0.0, 90.0),
        &store,
        PlayerOptions::default(),
    );
    assert!(player.engine().calls.contains(&Call::SeekTo(22.5)));
}

#[test]
fn progress_without_known_duration_updates_fraction_only() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    player.handle_event(progress(A1, 0.4));

    assert_eq!(player.state().played_fraction, 0.4);
    assert_eq!(store.value(&resume_key(A1)), None);
}

#[test]
fn stale_events_for_superseded_item_are_ignored() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        RecordingEngine::with_timeline(0.0, 100.0),
        &store,
        PlayerOptions::default(),
    );
    player.handle_event(ended(A1));

    player.handle_event(progress(A1, 0.9));
    player.handle_event(ended(A1));

    assert_eq!(player.state().current_index, 1);
    assert_eq!(player.phase(), PlayerPhase::Playing(1));
    assert_eq!(player.state().played_fraction, 0.0);
    assert_eq!(store.value(&resume_key(A1)), None);
}

#[test]
fn store_failures_never_interrupt_playback() {
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        RecordingEngine::with_timeline(10.0, 60.0),
        BrokenStore,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    player.handle_event(progress(A1, 0.5));
    assert_eq!(player.state().played_fraction, 0.5);
    assert_eq!(player.phase(), PlayerPhase::Playing(0));

    player.handle_event(ended(A1));
    assert_eq!(player.phase(), PlayerPhase::Playing(1));
}

#[test]
fn failed_resume_seek_still_plays_current_item() {
    let store = MemoryStore::with(&resume_key(A1), "30");
    let engine = RecordingEngine {
        fail_seeks: true,
        ..RecordingEngine::default()
    };
    let player = PlaylistPlayer::new(
        [A1],
        engine,
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    assert_eq!(player.phase(), PlayerPhase::Playing(0));
    assert_eq!(player.resumed_from(), None);
    assert_eq!(player.engine().calls.last(), Some(&Call::Play));
}

#[test]
fn play_pause_toggle_leaves_index_and_store_alone() {
    let store = MemoryStore::with(&resume_key(A1), "12");
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    player.toggle_play_pause();
    assert!(player.state().is_playing);
    assert_eq!(player.phase(), PlayerPhase::Playing(0));
    player.toggle_play_pause();
    assert!(!player.state().is_playing);
    assert_eq!(player.phase(), PlayerPhase::Paused(0));

    assert_eq!(player.state().current_index, 0);
    assert_eq!(store.value(&resume_key(A1)).as_deref(), Some("12"));
}

#[test]
fn relative_seeks_move_ten_seconds_without_clamping() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::with_timeline(4.0, 60.0),
        &store,
        PlayerOptions::default(),
    );

    player.rewind();
    player.fast_forward();

    let seeks: Vec<Call> = player
        .engine()
        .calls
        .iter()
        .filter(|call| matches!(call, Call::SeekTo(_)))
        .cloned()
        .collect();
    assert_eq!(seeks, [Call::SeekTo(-6.0), Call::SeekTo(14.0)]);
}

#[test]
fn relative_seek_without_current_time_is_a_no_op() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    player.fast_forward();

    assert!(
        !player
            .engine()
            .calls
            .iter()
            .any(|call| matches!(call, Call::SeekTo(_)))
    );
}

#[test]
fn mute_then_volume_change_scenario() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );
    assert_eq!(player.state().volume, 0.8);
    assert!(!player.state().muted);

    player.toggle_mute();
    assert!(player.state().muted);
    assert_eq!(player.state().volume, 0.8);

    player.set_volume(0.5);
    assert_eq!(player.state().volume, 0.5);
    assert!(!player.state().muted);
    assert_eq!(
        &player.engine().calls[player.engine().calls.len() - 2..],
        [Call::Volume(0.5), Call::Muted(false)]
    );
}

#[test]
fn toggling_mute_twice_is_idempotent() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions {
            volume: 0.35,
            ..PlayerOptions::default()
        },
    );
    let before = player.state();

    player.toggle_mute();
    player.toggle_mute();

    assert_eq!(player.state().muted, before.muted);
    assert_eq!(player.state().volume, before.volume);
}

#[test]
fn pump_drains_engine_queue_in_order() {
    let store = MemoryStore::default();
    let mut engine = RecordingEngine::with_timeline(0.0, 20.0);
    engine.queued = vec![progress(A1, 0.5), ended(A1), progress(A2, 0.1)];
    let mut player = PlaylistPlayer::new([A1, A2], engine, &store, PlayerOptions::default());

    assert_eq!(player.pump(), 3);

    assert_eq!(player.state().current_index, 1);
    assert_eq!(player.state().played_fraction, 0.1);
    assert_eq!(store.value(&resume_key(A1)).as_deref(), Some("10"));
    assert_eq!(store.value(&resume_key(A2)).as_deref(), Some("2"));
}

#[test]
fn clock_engine_plays_through_playlist_and_persists_positions() {
    let store = MemoryStore::default();
    let engine = ClockEngine::new(0.0, Duration::from_secs(1))
        .with_duration(A1, 3.0)
        .with_duration(A2, 2.0);
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        engine,
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    for _ in 0..8 {
        let events = player.engine_mut().advance(Duration::from_secs(1));
        for event in events {
            player.handle_event(event);
        }
    }

    assert_eq!(player.phase(), PlayerPhase::Stopped);
    assert_eq!(player.state().current_index, 1);
    assert!(!player.engine().is_playing());
    assert_eq!(store.value(&resume_key(A1)).as_deref(), Some("3"));
    assert_eq!(store.value(&resume_key(A2)).as_deref(), Some("2"));
}

#[test]
fn clock_engine_clamps_seeks_and_resumes_from_stored_offset() {
    let store = MemoryStore::with(&resume_key(A1), "45");
    let engine = ClockEngine::new(90.0, Duration::from_secs(1));
    let mut player = PlaylistPlayer::new([A1], engine, &store, PlayerOptions::default());

    assert_eq!(player.engine().current_time(), Some(45.0));

    player.fast_forward();
    assert_eq!(player.engine().current_time(), Some(55.0));

    for _ in 0..7 {
        player.rewind();
    }
    assert_eq!(player.engine().current_time(), Some(0.0));
    assert_eq!(player.engine().audio(), (DEFAULT_VOLUME, false));
}

#[test]
fn clock_engine_paused_timeline_does_not_move() {
    let mut engine = ClockEngine::new(30.0, Duration::from_secs(1));
    engine.load(A1).expect("load");

    assert!(engine.advance(Duration::from_secs(5)).is_empty());
    assert_eq!(engine.current_time(), Some(0.0));

    engine.play().expect("play");
    let events = engine.advance(Duration::from_secs(3));
    assert_eq!(events, [progress(A1, 0.1)]);
}

#[test]
fn resume_value_parsing_rejects_negative_and_non_finite() {
    assert_eq!(resume::parse_resume_seconds(" 12.5 "), Some(12.5));
    assert_eq!(resume::parse_resume_seconds("-1"), None);
    assert_eq!(resume::parse_resume_seconds("NaN"), None);
    assert_eq!(resume::parse_resume_seconds("inf"), None);
    assert_eq!(locator_from_resume_key(&resume_key(A1)), Some(A1));
    assert_eq!(locator_from_resume_key("authToken"), None);
}

fn failed(locator: &str) -> PlayerEvent {
    PlayerEvent::Failed {
        locator: locator.to_string(),
        reason: "unreadable source".to_string(),
    }
}

#[test]
fn failed_item_is_skipped_while_playing() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        RecordingEngine::default(),
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    player.engine_mut().queued.push(failed(A1));
    assert_eq!(player.pump(), 1);

    assert_eq!(player.phase(), PlayerPhase::Playing(1));
    assert_eq!(player.current_locator(), Some(A2));
    let calls = player.engine().transport_calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        [Call::Load(A2.to_string()), Call::Play]
    );
}

#[test]
fn failed_item_keeps_paused_transport_for_the_next_one() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        RecordingEngine::default(),
        &store,
        PlayerOptions::default(),
    );

    player.handle_event(failed(A1));

    assert_eq!(player.phase(), PlayerPhase::Paused(1));
    assert!(!player.state().is_playing);
}

#[test]
fn failed_last_item_stops_the_playlist() {
    let store = MemoryStore::default();
    let mut player = PlaylistPlayer::new(
        [A1],
        RecordingEngine::default(),
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );

    player.handle_event(failed(A2));
    assert_eq!(player.phase(), PlayerPhase::Playing(0));

    player.handle_event(failed(A1));
    assert_eq!(player.phase(), PlayerPhase::Stopped);
    assert!(!player.state().is_playing);
    assert_eq!(store.value(&resume_key(A1)), None);
}

#[test]
fn clock_engine_without_duration_fails_item_and_moves_on() {
    let store = MemoryStore::default();
    let engine = ClockEngine::new(0.0, Duration::from_secs(1)).with_duration(A2, 2.0);
    let mut player = PlaylistPlayer::new(
        [A1, A2],
        engine,
        &store,
        PlayerOptions {
            autoplay: true,
            ..PlayerOptions::default()
        },
    );
    assert_eq!(player.phase(), PlayerPhase::Playing(0));

    let events = player.engine_mut().advance(Duration::ZERO);
    assert_eq!(
        events,
        [PlayerEvent::Failed {
            locator: A1.to_string(),
            reason: "no known duration".to_string(),
        }]
    );
    for event in events {
        player.handle_event(event);
    }
    assert_eq!(player.phase(), PlayerPhase::Playing(1));

    for _ in 0..3 {
        let events = player.engine_mut().advance(Duration::from_secs(1));
        for event in events {
            player.handle_event(event);
        }
    }
    assert_eq!(player.phase(), PlayerPhase::Stopped);
}
