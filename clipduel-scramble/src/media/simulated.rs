//! Timer-driven media backend
//!
//! Stands in for a platform video decoder in the headless runner and in
//! tests. Each URL can be given a [`ClipProfile`] (load latency, clip length,
//! failure mode); everything else uses the backend's default profile.
//!
//! All timing uses `tokio::time`, so tests running on a paused clock see
//! fully deterministic event sequences.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::{MediaBackend, MediaEvent, MediaHandle, MediaStatus, PlaybackParams, SharedHandle};

/// Status stream depth per handle
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Position report interval when a handle was configured without one
const CLOCK_TICK: Duration = Duration::from_millis(250);

/// How a load attempt ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBehavior {
    /// Reports `ReadyToPlay` after the load latency
    Ready,
    /// Reports `Error` after the load latency
    Fail,
    /// Never reports anything (a decoder that lost its callback)
    Silent,
}

/// Simulated characteristics of one clip
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipProfile {
    pub load_latency: Duration,
    pub duration: Duration,
    pub behavior: LoadBehavior,
}

impl Default for ClipProfile {
    fn default() -> Self {
        Self {
            load_latency: Duration::from_millis(400),
            duration: Duration::from_secs(6),
            behavior: LoadBehavior::Ready,
        }
    }
}

/// Command issued to a simulated handle
#[derive(Debug, Clone, PartialEq)]
pub enum MediaAction {
    Load(String),
    Play,
    Pause,
}

/// Journal entry, for asserting on command order in tests
#[derive(Debug, Clone)]
pub struct MediaLogEntry {
    pub handle_id: usize,
    pub action: MediaAction,
    pub muted: bool,
    pub at: Instant,
}

struct SimShared {
    default_profile: ClipProfile,
    profiles: Mutex<HashMap<String, ClipProfile>>,
    journal: Mutex<Vec<MediaLogEntry>>,
    next_handle_id: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimShared {
    fn profile_for(&self, url: &str) -> ClipProfile {
        lock(&self.profiles)
            .get(url)
            .copied()
            .unwrap_or(self.default_profile)
    }

    fn record(&self, handle_id: usize, action: MediaAction, muted: bool) {
        lock(&self.journal).push(MediaLogEntry {
            handle_id,
            action,
            muted,
            at: Instant::now(),
        });
    }
}

/// Media backend whose handles run on tokio timers
#[derive(Clone)]
pub struct SimulatedMediaBackend {
    shared: Arc<SimShared>,
}

impl SimulatedMediaBackend {
    pub fn new(default_profile: ClipProfile) -> Self {
        Self {
            shared: Arc::new(SimShared {
                default_profile,
                profiles: Mutex::new(HashMap::new()),
                journal: Mutex::new(Vec::new()),
                next_handle_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Override the profile for one URL
    pub fn set_profile(&self, url: impl Into<String>, profile: ClipProfile) {
        lock(&self.shared.profiles).insert(url.into(), profile);
    }

    /// Every command issued so far, in order
    pub fn journal(&self) -> Vec<MediaLogEntry> {
        lock(&self.shared.journal).clone()
    }

    /// URLs loaded so far, in order, with whether the loading handle was muted
    pub fn loads(&self) -> Vec<(String, bool)> {
        lock(&self.shared.journal)
            .iter()
            .filter_map(|entry| match &entry.action {
                MediaAction::Load(url) => Some((url.clone(), entry.muted)),
                _ => None,
            })
            .collect()
    }

    pub fn handles_created(&self) -> usize {
        self.shared.next_handle_id.load(Ordering::Relaxed)
    }
}

impl Default for SimulatedMediaBackend {
    fn default() -> Self {
        Self::new(ClipProfile::default())
    }
}

impl MediaBackend for SimulatedMediaBackend {
    fn create_handle(&self, params: PlaybackParams) -> SharedHandle {
        let id = self.shared.next_handle_id.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(SimulatedHandle {
            id,
            shared: Arc::clone(&self.shared),
            state: Arc::new(Mutex::new(HandleState {
                source: None,
                status: MediaStatus::Idle,
                playing: false,
                play_requested: false,
                position: Duration::ZERO,
                duration: Duration::ZERO,
                params,
                load_generation: 0,
                clock_generation: 0,
            })),
            tx,
        })
    }
}

struct HandleState {
    source: Option<String>,
    status: MediaStatus,
    playing: bool,
    /// `play()` arrived before the load finished
    play_requested: bool,
    position: Duration,
    duration: Duration,
    params: PlaybackParams,
    /// Bumped per load; stale load timers compare against it
    load_generation: u64,
    /// Bumped per play/pause; stale clock timers compare against it
    clock_generation: u64,
}

/// One simulated decode session
pub struct SimulatedHandle {
    id: usize,
    shared: Arc<SimShared>,
    state: Arc<Mutex<HandleState>>,
    tx: broadcast::Sender<MediaEvent>,
}

fn emit(tx: &broadcast::Sender<MediaEvent>, event: MediaEvent) {
    // No listeners is fine
    let _ = tx.send(event);
}

/// Start the playback clock; caller holds the state lock
fn begin_playback(
    handle_state: &Arc<Mutex<HandleState>>,
    state: &mut HandleState,
    tx: &broadcast::Sender<MediaEvent>,
) {
    if state.position >= state.duration {
        state.position = Duration::ZERO;
    }
    state.playing = true;
    state.play_requested = false;
    state.clock_generation += 1;
    emit(tx, MediaEvent::PlayingChanged { is_playing: true });

    let generation = state.clock_generation;
    let tick = state.params.time_update_interval.unwrap_or(CLOCK_TICK);
    let report = state.params.time_update_interval.is_some();
    let rate = if state.params.rate > 0.0 {
        state.params.rate
    } else {
        1.0
    };
    let handle_state = Arc::clone(handle_state);
    let tx = tx.clone();

    tokio::spawn(async move {
        loop {
            sleep(tick.div_f64(rate)).await;

            let mut state = lock(&handle_state);
            if state.clock_generation != generation || !state.playing {
                return;
            }

            state.position = (state.position + tick).min(state.duration);
            if report {
                emit(
                    &tx,
                    MediaEvent::TimeUpdate {
                        position_secs: state.position.as_secs_f64(),
                    },
                );
            }
            if state.position < state.duration {
                continue;
            }

            emit(&tx, MediaEvent::PlayedToEnd);
            if state.params.looping {
                state.position = Duration::ZERO;
                continue;
            }

            state.playing = false;
            emit(&tx, MediaEvent::PlayingChanged { is_playing: false });
            return;
        }
    });
}

impl MediaHandle for SimulatedHandle {
    fn source(&self) -> Option<String> {
        lock(&self.state).source.clone()
    }

    fn load(&self, url: &str) {
        let profile = self.shared.profile_for(url);
        let generation = {
            let mut state = lock(&self.state);
            self.shared
                .record(self.id, MediaAction::Load(url.to_string()), state.params.muted);
            state.load_generation += 1;
            state.clock_generation += 1;
            state.source = Some(url.to_string());
            state.status = MediaStatus::Loading;
            state.playing = false;
            state.position = Duration::ZERO;
            state.load_generation
        };
        emit(
            &self.tx,
            MediaEvent::StatusChanged {
                status: MediaStatus::Loading,
                error: None,
            },
        );

        let handle_state = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let url = url.to_string();
        let handle_id = self.id;

        tokio::spawn(async move {
            sleep(profile.load_latency).await;

            let (status, error) = match profile.behavior {
                LoadBehavior::Ready => (MediaStatus::ReadyToPlay, None),
                LoadBehavior::Fail => (MediaStatus::Error, Some(format!("cannot decode {}", url))),
                LoadBehavior::Silent => {
                    debug!("Handle {} swallowed readiness for {}", handle_id, url);
                    return;
                }
            };

            let mut state = lock(&handle_state);
            if state.load_generation != generation {
                // Source replaced while loading
                return;
            }
            state.status = status;
            state.duration = profile.duration;

            if status == MediaStatus::Error {
                warn!("Handle {} failed to load {}", handle_id, url);
            }
            emit(&tx, MediaEvent::StatusChanged { status, error });

            if state.play_requested && status == MediaStatus::ReadyToPlay {
                begin_playback(&handle_state, &mut state, &tx);
            }
        });
    }

    fn play(&self) {
        let mut state = lock(&self.state);
        self.shared.record(self.id, MediaAction::Play, state.params.muted);
        match state.status {
            MediaStatus::ReadyToPlay if !state.playing => {
                begin_playback(&self.state, &mut state, &self.tx);
            }
            MediaStatus::Loading => state.play_requested = true,
            _ => {}
        }
    }

    fn pause(&self) {
        let mut state = lock(&self.state);
        self.shared.record(self.id, MediaAction::Pause, state.params.muted);
        state.play_requested = false;
        if state.playing {
            state.playing = false;
            state.clock_generation += 1;
            emit(&self.tx, MediaEvent::PlayingChanged { is_playing: false });
        }
    }

    fn configure(&self, params: PlaybackParams) {
        lock(&self.state).params = params;
    }

    fn status(&self) -> MediaStatus {
        lock(&self.state).status
    }

    fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.tx.subscribe()
    }
}
