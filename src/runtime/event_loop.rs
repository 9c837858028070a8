//! Single-threaded dispatch over the bus event channel.
//!
//! Exactly one handler runs at a time; a blocking encoder stop simply delays
//! the next notification. Because every notification triggers a full
//! re-query, notifications queued up behind a slow handler collapse into
//! no-ops once the state has been seen.

use std::sync::mpsc::Receiver;

use tracing::{debug, info};

use crate::mpris::BusEvent;
use crate::recorder::{FatalEncoderError, Recorder, Spawn};
use crate::watcher::{PlayerBus, PlayerEvent, PlayerWatcher};

pub fn run<B: PlayerBus, S: Spawn>(
    watcher: &mut PlayerWatcher<B>,
    recorder: &mut Recorder<S>,
    events: &Receiver<BusEvent>,
) -> Result<(), FatalEncoderError> {
    // Pick up a track that was already playing before we connected.
    refresh(watcher, recorder)?;

    for event in events.iter() {
        match event {
            BusEvent::PropertiesChanged => refresh(watcher, recorder)?,
            BusEvent::ServiceOwnerChanged {
                service,
                old_owner,
                new_owner,
            } => {
                if old_owner.is_none() {
                    info!(%service, "player appeared on the bus");
                } else if new_owner.is_none() {
                    info!(%service, "player left the bus");
                    // Queries against a vanished service fail, so the
                    // re-read derives the stop edge.
                    refresh(watcher, recorder)?;
                }
            }
        }
    }

    debug!("event channel closed, shutting down");
    recorder.on_playback_stopped()
}

fn refresh<B: PlayerBus, S: Spawn>(
    watcher: &mut PlayerWatcher<B>,
    recorder: &mut Recorder<S>,
) -> Result<(), FatalEncoderError> {
    let events = watcher.handle_properties_changed();
    dispatch(watcher, recorder, events)
}

fn dispatch<B: PlayerBus, S: Spawn>(
    watcher: &mut PlayerWatcher<B>,
    recorder: &mut Recorder<S>,
    events: Vec<PlayerEvent>,
) -> Result<(), FatalEncoderError> {
    for event in events {
        match event {
            PlayerEvent::TrackChanged => recorder.on_track_changed(watcher)?,
            PlayerEvent::PlaybackStopped => recorder.on_playback_stopped()?,
            // The boundary that matters is the track change; a start with no
            // new identity means the old track resumed.
            PlayerEvent::PlaybackStarted => {}
        }
    }
    Ok(())
}
