//! Track-change detection on top of the raw MPRIS notification stream.
//!
//! The bus delivers `PropertiesChanged` signals with no payload guarantees:
//! a single real change may arrive as several notifications, and batched
//! property updates may arrive in any order. [`PlayerWatcher`] therefore
//! never trusts a notification payload. It re-reads the full player state
//! through the [`PlayerBus`] seam on every notification and diffs the
//! (title, album, artist) triple against what it saw last, which makes the
//! detector idempotent under redundant or reordered notifications.

use std::time::Duration;

use tracing::info;

/// Read side of the player's MPRIS interface plus its fire-and-forget
/// transport controls. Call failures are logged by the implementation and
/// never surfaced here.
pub trait PlayerBus {
    /// Fresh metadata snapshot, re-queried from the player.
    fn snapshot(&self) -> TrackMetadata;
    /// Raw playback status string as reported by the player.
    fn playback_status(&self) -> String;
    fn play(&self);
    fn pause(&self);
    fn stop(&self);
    fn play_pause(&self);
}

/// The (title, album, artist) triple used as the sole equality key for
/// detecting a track boundary. Comparison is exact and case-sensitive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrackIdentity {
    pub title: String,
    pub album: String,
    pub artist: String,
}

/// One full metadata read. Empty strings and zero numbers mean "unknown".
#[derive(Clone, Debug, Default)]
pub struct TrackMetadata {
    pub identity: TrackIdentity,
    pub year: String,
    pub genre: String,
    pub track_number: u32,
    pub disk_number: u32,
    pub length: Duration,
    pub track_id: String,
}

/// Edge-triggered events derived from the raw notification stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    PlaybackStarted,
    TrackChanged,
    PlaybackStopped,
}

/// Single source of truth for "what is playing now".
///
/// Owns the last-known track identity and playback flag; a consumer drives
/// it by calling [`PlayerWatcher::handle_properties_changed`] once per bus
/// notification and dispatching the returned events in order.
pub struct PlayerWatcher<B> {
    bus: B,
    identity: TrackIdentity,
    year: String,
    genre: String,
    track_number: u32,
    disk_number: u32,
    length: Duration,
    is_playing: bool,
    is_ad: bool,
    silent: bool,
    ignore_playback_status: bool,
    ad_marker: String,
}

impl<B: PlayerBus> PlayerWatcher<B> {
    pub fn new(bus: B, ignore_playback_status: bool, ad_marker: impl Into<String>) -> Self {
        Self {
            bus,
            identity: TrackIdentity::default(),
            year: String::new(),
            genre: String::new(),
            track_number: 0,
            disk_number: 0,
            length: Duration::ZERO,
            is_playing: false,
            is_ad: false,
            silent: false,
            ignore_playback_status,
            ad_marker: ad_marker.into(),
        }
    }

    /// Re-reads the current player state and returns the events this
    /// notification produced, in emission order. A stopped player starting a
    /// new track yields `[PlaybackStarted, TrackChanged]`.
    ///
    /// While `silent` is set the state still updates but no events are
    /// returned; the recording supervisor silences the watcher around its own
    /// pause/resume calls so they cannot re-trigger it.
    ///
    /// `TrackChanged` is delivered for ad tracks too; the ad policy
    /// (skip or stop) belongs to the consumer, which checks [`Self::is_ad`].
    pub fn handle_properties_changed(&mut self) -> Vec<PlayerEvent> {
        let meta = self.bus.snapshot();
        let playing_now = if self.ignore_playback_status {
            // Some players report a stale or bogus PlaybackStatus; a
            // non-empty title is the next best playing signal.
            !meta.identity.title.is_empty()
        } else {
            self.bus.playback_status().eq_ignore_ascii_case("playing")
        };
        self.is_ad = !self.ad_marker.is_empty() && meta.track_id.contains(&self.ad_marker);

        let mut events = Vec::new();
        if playing_now {
            if !self.is_playing {
                self.is_playing = true;
                info!("playback started");
                if !self.silent {
                    events.push(PlayerEvent::PlaybackStarted);
                }
            }
            if meta.identity != self.identity {
                self.identity = meta.identity;
                self.year = meta.year;
                self.genre = meta.genre;
                self.track_number = meta.track_number;
                self.disk_number = meta.disk_number;
                self.length = meta.length;
                info!(title = %self.identity.title, "next track");
                if !self.silent {
                    events.push(PlayerEvent::TrackChanged);
                }
            }
        } else if self.is_playing {
            self.is_playing = false;
            info!("playback stopped");
            if !self.silent {
                events.push(PlayerEvent::PlaybackStopped);
            }
        }
        events
    }

    /// Suppress or re-enable outward events. State keeps updating while
    /// silent.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn title(&self) -> &str {
        &self.identity.title
    }

    pub fn album(&self) -> &str {
        &self.identity.album
    }

    pub fn artist(&self) -> &str {
        &self.identity.artist
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn track_number(&self) -> u32 {
        self.track_number
    }

    pub fn disk_number(&self) -> u32 {
        self.disk_number
    }

    /// Player-reported track length; zero when unknown.
    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_ad(&self) -> bool {
        self.is_ad
    }

    pub fn play(&self) {
        self.bus.play();
    }

    pub fn pause(&self) {
        self.bus.pause();
    }

    pub fn stop(&self) {
        self.bus.stop();
    }

    pub fn play_pause(&self) {
        self.bus.play_pause();
    }
}
