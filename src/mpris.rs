//! Blocking zbus bindings for the watched player's MPRIS interfaces.
//!
//! [`MprisPlayer`] is the real [`PlayerBus`] implementation: every read is a
//! fresh round-trip (property caching is disabled), and the transport
//! controls are fire-and-forget. [`spawn_signal_forwarder`] turns the bus's
//! `PropertiesChanged` and `NameOwnerChanged` signal streams into
//! [`BusEvent`]s on an mpsc channel so the dispatch loop can consume them
//! from a single thread.

use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::time::Duration;

use tracing::{debug, warn};
use zbus::blocking::Connection;
use zbus::blocking::fdo::{DBusProxy, PropertiesProxy};
use zbus::proxy::CacheProperties;
use zvariant::{OwnedValue, Value};

use crate::watcher::{PlayerBus, TrackIdentity, TrackMetadata};

pub const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";

/// Well-known bus name of an MPRIS player, e.g.
/// `org.mpris.MediaPlayer2.spotify`.
pub fn service_name(application: &str) -> String {
    format!("org.mpris.MediaPlayer2.{application}")
}

#[zbus::proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait MediaPlayer2Player {
    fn play(&self) -> zbus::Result<()>;
    fn pause(&self) -> zbus::Result<()>;
    fn stop(&self) -> zbus::Result<()>;
    fn play_pause(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

/// Raw bus notifications handed to the dispatch loop.
#[derive(Debug)]
pub enum BusEvent {
    /// Some player property may have changed; re-query everything.
    PropertiesChanged,
    /// The watched service appeared on or vanished from the bus.
    ServiceOwnerChanged {
        service: String,
        old_owner: Option<String>,
        new_owner: Option<String>,
    },
}

pub struct MprisPlayer {
    proxy: MediaPlayer2PlayerProxyBlocking<'static>,
}

impl MprisPlayer {
    pub fn connect(connection: &Connection, application: &str) -> zbus::Result<Self> {
        let proxy = MediaPlayer2PlayerProxyBlocking::builder(connection)
            .destination(service_name(application))?
            // Cached properties would short-circuit the re-query-on-every-
            // notification contract.
            .cache_properties(CacheProperties::No)
            .build()?;
        Ok(Self { proxy })
    }
}

impl PlayerBus for MprisPlayer {
    fn snapshot(&self) -> TrackMetadata {
        match self.proxy.metadata() {
            Ok(map) => metadata_from_map(&map),
            Err(err) => {
                debug!(%err, "metadata query failed");
                TrackMetadata::default()
            }
        }
    }

    fn playback_status(&self) -> String {
        match self.proxy.playback_status() {
            Ok(status) => status,
            Err(err) => {
                debug!(%err, "playback status query failed");
                String::new()
            }
        }
    }

    fn play(&self) {
        if let Err(err) = self.proxy.play() {
            debug!(%err, "Play call failed");
        }
    }

    fn pause(&self) {
        if let Err(err) = self.proxy.pause() {
            debug!(%err, "Pause call failed");
        }
    }

    fn stop(&self) {
        if let Err(err) = self.proxy.stop() {
            debug!(%err, "Stop call failed");
        }
    }

    fn play_pause(&self) {
        if let Err(err) = self.proxy.play_pause() {
            debug!(%err, "PlayPause call failed");
        }
    }
}

/// Forwards bus signals into the dispatch channel: one thread per signal
/// stream, both ending once the receiving side hangs up.
pub fn spawn_signal_forwarder(
    connection: &Connection,
    application: &str,
    tx: Sender<BusEvent>,
) -> zbus::Result<()> {
    let service = service_name(application);

    let props_connection = connection.clone();
    let props_service = service.clone();
    let props_tx = tx.clone();
    std::thread::spawn(move || {
        let proxy = PropertiesProxy::builder(&props_connection)
            .destination(props_service.as_str())
            .and_then(|builder| builder.path(MPRIS_PATH))
            .and_then(|builder| builder.build());
        let proxy = match proxy {
            Ok(proxy) => proxy,
            Err(err) => {
                warn!(%err, "cannot subscribe to property changes");
                return;
            }
        };
        let signals = match proxy.receive_properties_changed() {
            Ok(signals) => signals,
            Err(err) => {
                warn!(%err, "cannot subscribe to property changes");
                return;
            }
        };
        // The payload is untrusted by design; only the fact that something
        // changed is forwarded.
        for _change in signals {
            if props_tx.send(BusEvent::PropertiesChanged).is_err() {
                break;
            }
        }
    });

    let owner_connection = connection.clone();
    std::thread::spawn(move || {
        let signals = DBusProxy::new(&owner_connection)
            .and_then(|proxy| proxy.receive_name_owner_changed());
        let signals = match signals {
            Ok(signals) => signals,
            Err(err) => {
                warn!(%err, "cannot watch service ownership");
                return;
            }
        };
        for signal in signals {
            let Ok(args) = signal.args() else { continue };
            if args.name().as_str() != service {
                continue;
            }
            let event = BusEvent::ServiceOwnerChanged {
                service: service.clone(),
                old_owner: args.old_owner().as_ref().map(|n| n.to_string()),
                new_owner: args.new_owner().as_ref().map(|n| n.to_string()),
            };
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    Ok(())
}

fn metadata_from_map(map: &HashMap<String, OwnedValue>) -> TrackMetadata {
    TrackMetadata {
        identity: TrackIdentity {
            title: string_value(map, &["xesam:title"]),
            album: string_value(map, &["xesam:album"]),
            artist: string_value(map, &["xesam:artist"]),
        },
        year: string_value(map, &["xesam:contentCreated"]),
        genre: string_value(map, &["xesam:genre"]),
        // Players disagree on the capitalization of these keys.
        track_number: numeric_value(map, &["xesam:trackNumber", "xesam:tracknumber"]),
        disk_number: numeric_value(map, &["xesam:discNumber", "xesam:discnumber"]),
        length: length_value(map),
        track_id: string_value(map, &["mpris:trackid"]),
    }
}

/// String coercion over the wire variance MPRIS players exhibit: plain
/// strings, string arrays (first entry wins) and object paths.
fn string_value(map: &HashMap<String, OwnedValue>, keys: &[&str]) -> String {
    for key in keys {
        let Some(value) = map.get(*key) else { continue };
        match &**value {
            Value::Str(s) => return s.to_string(),
            Value::ObjectPath(path) => return path.to_string(),
            Value::Array(items) => {
                if let Some(Value::Str(s)) = items.iter().next() {
                    return s.to_string();
                }
            }
            _ => {}
        }
    }
    String::new()
}

fn numeric_value(map: &HashMap<String, OwnedValue>, keys: &[&str]) -> u32 {
    for key in keys {
        let Some(value) = map.get(*key) else { continue };
        match &**value {
            Value::U16(n) => return u32::from(*n),
            Value::I16(n) => return (*n).max(0) as u32,
            Value::U32(n) => return *n,
            Value::I32(n) => return (*n).max(0) as u32,
            Value::U64(n) => return (*n).min(u64::from(u32::MAX)) as u32,
            Value::I64(n) => return (*n).clamp(0, i64::from(u32::MAX)) as u32,
            Value::Str(s) => return s.parse().unwrap_or(0),
            _ => {}
        }
    }
    0
}

fn length_value(map: &HashMap<String, OwnedValue>) -> Duration {
    let Some(value) = map.get("mpris:length") else {
        return Duration::ZERO;
    };
    let micros = match &**value {
        Value::I64(n) => (*n).max(0) as u64,
        Value::U64(n) => *n,
        Value::I32(n) => (*n).max(0) as u64,
        Value::U32(n) => u64::from(*n),
        _ => 0,
    };
    Duration::from_micros(micros)
}
