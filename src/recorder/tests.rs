use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use tempfile::tempdir;

use super::*;
use crate::watcher::{PlayerBus, TrackIdentity, TrackMetadata};

#[derive(Default)]
struct FakeBusState {
    metadata: TrackMetadata,
    status: String,
    calls: Vec<&'static str>,
}

#[derive(Clone, Default)]
struct FakeBus(Rc<RefCell<FakeBusState>>);

impl FakeBus {
    fn playing(title: &str, album: &str, artist: &str) -> Self {
        let bus = Self::default();
        {
            let mut state = bus.0.borrow_mut();
            state.metadata.identity = TrackIdentity {
                title: title.to_string(),
                album: album.to_string(),
                artist: artist.to_string(),
            };
            state.status = "Playing".to_string();
        }
        bus
    }

    fn set_meta(&self, f: impl FnOnce(&mut TrackMetadata)) {
        f(&mut self.0.borrow_mut().metadata);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.0.borrow().calls.clone()
    }
}

impl PlayerBus for FakeBus {
    fn snapshot(&self) -> TrackMetadata {
        self.0.borrow().metadata.clone()
    }

    fn playback_status(&self) -> String {
        self.0.borrow().status.clone()
    }

    fn play(&self) {
        self.0.borrow_mut().calls.push("play");
    }

    fn pause(&self) {
        self.0.borrow_mut().calls.push("pause");
    }

    fn stop(&self) {
        self.0.borrow_mut().calls.push("stop");
    }

    fn play_pause(&self) {
        self.0.borrow_mut().calls.push("play_pause");
    }
}

fn playing_watcher(bus: &FakeBus) -> PlayerWatcher<FakeBus> {
    let mut watcher = PlayerWatcher::new(bus.clone(), false, "spotify:ad");
    watcher.handle_properties_changed();
    watcher
}

#[derive(Clone, Copy, Default, PartialEq)]
enum Behavior {
    #[default]
    ExitOnTerminate,
    ExitOnKill,
    NeverExit,
}

#[derive(Default)]
struct ProcessState {
    terminated: bool,
    killed: bool,
    exited: bool,
    waits: Vec<Duration>,
}

#[derive(Default)]
struct SpawnerState {
    behavior: Behavior,
    fail_spawn: bool,
    spawned: Vec<(String, Vec<String>)>,
    processes: Vec<Rc<RefCell<ProcessState>>>,
}

#[derive(Clone, Default)]
struct FakeSpawner(Rc<RefCell<SpawnerState>>);

impl FakeSpawner {
    fn with_behavior(behavior: Behavior) -> Self {
        let spawner = Self::default();
        spawner.0.borrow_mut().behavior = behavior;
        spawner
    }

    fn failing() -> Self {
        let spawner = Self::default();
        spawner.0.borrow_mut().fail_spawn = true;
        spawner
    }

    fn spawned(&self) -> Vec<(String, Vec<String>)> {
        self.0.borrow().spawned.clone()
    }

    fn process(&self, index: usize) -> Rc<RefCell<ProcessState>> {
        self.0.borrow().processes[index].clone()
    }
}

struct FakeProcess {
    behavior: Behavior,
    state: Rc<RefCell<ProcessState>>,
}

impl Spawn for FakeSpawner {
    type Process = FakeProcess;

    fn spawn(&self, program: &str, args: &[String]) -> io::Result<FakeProcess> {
        let mut inner = self.0.borrow_mut();
        if inner.fail_spawn {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
        }
        inner.spawned.push((program.to_string(), args.to_vec()));
        let state = Rc::new(RefCell::new(ProcessState::default()));
        inner.processes.push(state.clone());
        Ok(FakeProcess {
            behavior: inner.behavior,
            state,
        })
    }
}

impl EncoderProcess for FakeProcess {
    fn terminate(&mut self) {
        self.state.borrow_mut().terminated = true;
    }

    fn kill(&mut self) {
        self.state.borrow_mut().killed = true;
    }

    fn wait_exited(&mut self, timeout: Duration) -> bool {
        let mut state = self.state.borrow_mut();
        state.waits.push(timeout);
        let exits = match self.behavior {
            Behavior::ExitOnTerminate => state.terminated || state.killed,
            Behavior::ExitOnKill => state.killed,
            Behavior::NeverExit => false,
        };
        if exits {
            state.exited = true;
        }
        exits
    }

    fn running(&mut self) -> bool {
        !self.state.borrow().exited
    }
}

fn settings(dir: &Path) -> RecorderSettings {
    RecorderSettings {
        target_dir: dir.to_path_buf(),
        terminate_timeout_ms: 10,
        kill_timeout_ms: 5,
        ..RecorderSettings::default()
    }
}

fn has_metadata(args: &[String], pair: &str) -> bool {
    args.windows(2)
        .any(|w| w[0] == "-metadata" && w[1] == pair)
}

#[test]
fn stop_job_without_running_job_is_a_no_op() {
    let dir = tempdir().unwrap();
    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));

    assert!(recorder.stop_job().is_ok());
    assert!(spawner.spawned().is_empty());
}

#[test]
fn track_change_spawns_encoder_with_expected_target_and_metadata() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    bus.set_meta(|m| m.track_number = 3);
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    let spawned = spawner.spawned();
    assert_eq!(spawned.len(), 1);
    let (program, args) = &spawned[0];
    assert_eq!(program, "ffmpeg");

    let expected_target = dir
        .path()
        .join("Artist A")
        .join("Album A")
        .join("03 - Song A.m4a");
    assert_eq!(args.last().unwrap(), expected_target.to_str().unwrap());
    assert_eq!(&args[..4], &["-f", "pulse", "-i", "default"]);
    assert!(has_metadata(args, "title=Song A"));
    assert!(has_metadata(args, "album=Album A"));
    assert!(has_metadata(args, "artist=Artist A"));
    assert!(has_metadata(args, "track=3"));
    assert!(!args.iter().any(|a| a.starts_with("disk=")));
    // No length known anywhere, so no explicit duration either.
    assert!(!args.contains(&"-t".to_string()));

    // Hand-off: player paused while swapping encoders, then resumed.
    assert_eq!(bus.calls(), vec!["pause", "play"]);
    assert!(!watcher.is_silent());
}

#[test]
fn disk_number_shows_up_in_prefix_and_metadata() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    bus.set_meta(|m| {
        m.track_number = 3;
        m.disk_number = 2;
    });
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    let (_, args) = &spawner.spawned()[0];
    assert!(args.last().unwrap().ends_with("2-03 - Song A.m4a"));
    assert!(has_metadata(args, "disk=2"));
}

#[test]
fn unknown_tags_fall_back_to_misc_and_unknown_track() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("", "", "");
    // With the status trusted, an empty title still counts as playing.
    let mut watcher = PlayerWatcher::new(bus.clone(), false, "spotify:ad");
    watcher.handle_properties_changed();

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    // No identity was stored yet, so force the boundary by hand.
    recorder.on_track_changed(&mut watcher).unwrap();

    let (_, args) = &spawner.spawned()[0];
    let expected_target = dir.path().join("misc").join("misc").join("unknown track.m4a");
    assert_eq!(args.last().unwrap(), expected_target.to_str().unwrap());
    assert!(!args.iter().any(|a| a.starts_with("title=")));
}

#[test]
fn override_length_takes_precedence_over_player_length() {
    let dir = tempdir().unwrap();
    let album_dir = dir.path().join("Artist A").join("Album A");
    fs::create_dir_all(&album_dir).unwrap();
    fs::write(
        album_dir.join("info.ini"),
        "[length]\n3 = 00:02:30\n\n[general]\nyear = 2016\ngenre = Rock\ntotal_tracks = 12\n",
    )
    .unwrap();

    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    bus.set_meta(|m| m.track_number = 3);
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    let (_, args) = &spawner.spawned()[0];
    let t = args.iter().position(|a| a == "-t").unwrap();
    assert_eq!(args[t + 1], "00:02:30");
    assert!(has_metadata(args, "year=2016"));
    assert!(has_metadata(args, "genre=Rock"));
    assert!(has_metadata(args, "track=3/12"));
}

#[test]
fn player_length_is_used_when_no_override_exists() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    bus.set_meta(|m| m.length = Duration::from_secs(215));
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    let (_, args) = &spawner.spawned()[0];
    let t = args.iter().position(|a| a == "-t").unwrap();
    assert_eq!(args[t + 1], "215");
}

#[test]
fn name_collisions_count_up_deterministically() {
    let dir = tempdir().unwrap();
    let album_dir = dir.path().join("Artist A").join("Album A");
    fs::create_dir_all(&album_dir).unwrap();
    fs::write(album_dir.join("03 - Song A.m4a"), b"x").unwrap();
    fs::write(album_dir.join("03 - Song A (2).m4a"), b"x").unwrap();

    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    bus.set_meta(|m| m.track_number = 3);
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    let (_, args) = &spawner.spawned()[0];
    assert!(args.last().unwrap().ends_with("03 - Song A (3).m4a"));
}

#[test]
fn second_track_change_stops_the_previous_encoder_first() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    bus.set_meta(|m| m.identity.title = "Song B".to_string());
    watcher.handle_properties_changed();
    recorder.on_track_changed(&mut watcher).unwrap();

    assert_eq!(spawner.spawned().len(), 2);
    let first = spawner.process(0);
    assert!(first.borrow().terminated);
    assert!(first.borrow().exited);
    assert!(!spawner.process(1).borrow().exited);
}

#[test]
fn unresponsive_encoder_escalates_to_fatal() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::with_behavior(Behavior::NeverExit);
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    bus.set_meta(|m| m.identity.title = "Song B".to_string());
    watcher.handle_properties_changed();
    assert!(recorder.on_track_changed(&mut watcher).is_err());

    let process = spawner.process(0);
    let state = process.borrow();
    assert!(state.terminated);
    assert!(state.killed);
    // Both bounded waits ran to completion before the fatal verdict.
    assert_eq!(
        state.waits,
        vec![Duration::from_millis(10), Duration::from_millis(5)]
    );
    assert_eq!(spawner.spawned().len(), 1);
}

#[test]
fn kill_resolves_an_encoder_that_ignores_terminate() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::with_behavior(Behavior::ExitOnKill);
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    assert!(recorder.on_playback_stopped().is_ok());
    let process = spawner.process(0);
    assert!(process.borrow().killed);
    assert!(process.borrow().exited);
}

#[test]
fn ad_change_leaves_a_running_encoder_alone() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();
    let calls_before = bus.calls().len();

    bus.set_meta(|m| {
        m.identity.title = "Ad Break".to_string();
        m.track_id = "spotify:ad:0000".to_string();
    });
    watcher.handle_properties_changed();
    recorder.on_track_changed(&mut watcher).unwrap();

    assert_eq!(spawner.spawned().len(), 1);
    assert!(!spawner.process(0).borrow().terminated);
    // No pause/play hand-off happened either.
    assert_eq!(bus.calls().len(), calls_before);
}

#[test]
fn stop_on_ad_policy_stops_without_starting_a_new_job() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(
        spawner.clone(),
        RecorderSettings {
            stop_on_ad: true,
            ..settings(dir.path())
        },
    );
    recorder.on_track_changed(&mut watcher).unwrap();

    bus.set_meta(|m| {
        m.identity.title = "Ad Break".to_string();
        m.track_id = "spotify:ad:0000".to_string();
    });
    watcher.handle_properties_changed();
    recorder.on_track_changed(&mut watcher).unwrap();

    assert_eq!(spawner.spawned().len(), 1);
    assert!(spawner.process(0).borrow().exited);
}

#[test]
fn spawn_failure_leaves_no_job_and_resumes_the_player() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::failing();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));

    assert!(recorder.on_track_changed(&mut watcher).is_ok());
    assert!(recorder.job.is_none());
    assert_eq!(bus.calls(), vec!["pause", "play"]);
    assert!(!watcher.is_silent());
}

#[test]
fn playback_stopped_stops_without_restart() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(spawner.clone(), settings(dir.path()));
    recorder.on_track_changed(&mut watcher).unwrap();

    recorder.on_playback_stopped().unwrap();
    assert!(spawner.process(0).borrow().exited);
    assert_eq!(spawner.spawned().len(), 1);
}

#[test]
fn extension_without_a_dot_is_normalized() {
    let dir = tempdir().unwrap();
    let bus = FakeBus::playing("Song A", "Album A", "Artist A");
    let mut watcher = playing_watcher(&bus);

    let spawner = FakeSpawner::default();
    let mut recorder = Recorder::new(
        spawner.clone(),
        RecorderSettings {
            extension: "ogg".to_string(),
            ..settings(dir.path())
        },
    );
    recorder.on_track_changed(&mut watcher).unwrap();

    let (_, args) = &spawner.spawned()[0];
    assert!(args.last().unwrap().ends_with("Song A.ogg"));
}
