//! Media decode handles
//!
//! A [`MediaHandle`] is one decode session (one video surface or one
//! off-screen preload). Commands are fire-and-forget; everything the handle
//! learns (load finished, playback started, position, end of clip) comes
//! back as a [`MediaEvent`] on its status stream.
//!
//! Subscribing to the stream is the add-listener operation and dropping the
//! returned receiver is the remove-listener operation. Whoever owns a handle
//! owns its subscriptions for exactly as long.

pub mod simulated;

pub use simulated::{ClipProfile, LoadBehavior, MediaAction, MediaLogEntry, SimulatedMediaBackend};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Load status of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    /// No source loaded
    Idle,
    /// Source is loading/decoding
    Loading,
    /// Enough is decoded to start without stalling
    ReadyToPlay,
    /// Source failed to load
    Error,
}

impl std::fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaStatus::Idle => write!(f, "idle"),
            MediaStatus::Loading => write!(f, "loading"),
            MediaStatus::ReadyToPlay => write!(f, "readyToPlay"),
            MediaStatus::Error => write!(f, "error"),
        }
    }
}

/// Events on a handle's status stream
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Load status changed
    StatusChanged {
        status: MediaStatus,
        /// Failure detail when `status` is `Error`
        error: Option<String>,
    },

    /// Playback started or stopped
    PlayingChanged { is_playing: bool },

    /// Periodic playback position report
    TimeUpdate { position_secs: f64 },

    /// Clip reached its natural end
    PlayedToEnd,
}

/// Per-handle playback settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackParams {
    pub muted: bool,
    pub rate: f64,
    pub looping: bool,
    /// Interval between `TimeUpdate` events; `None` disables them
    pub time_update_interval: Option<Duration>,
}

impl PlaybackParams {
    /// Off-screen preload: muted, non-looping, no position reports
    pub fn preload(rate: f64) -> Self {
        Self {
            muted: true,
            rate,
            looping: false,
            time_update_interval: None,
        }
    }

    /// On-screen duel surface: audible, non-looping, position reports for trims
    pub fn duel(rate: f64, time_update_interval: Duration) -> Self {
        Self {
            muted: false,
            rate,
            looping: false,
            time_update_interval: Some(time_update_interval),
        }
    }

    /// Result card replay of the winning clip
    pub fn showcase() -> Self {
        Self {
            muted: false,
            rate: 1.0,
            looping: true,
            time_update_interval: None,
        }
    }
}

/// One decode session
///
/// Implementations must be cheap to call from the session loop: every
/// method returns immediately and reports progress on the status stream.
pub trait MediaHandle: Send + Sync {
    /// Currently loaded (or loading) source URL
    fn source(&self) -> Option<String>;

    /// Replace the source and begin loading it
    fn load(&self, url: &str);

    /// Start playback; if still loading, playback starts once ready
    fn play(&self);

    fn pause(&self);

    /// Apply new playback settings (e.g. unmute an adopted preload)
    fn configure(&self, params: PlaybackParams);

    fn status(&self) -> MediaStatus;

    fn is_playing(&self) -> bool;

    /// Add a listener to the status stream; drop the receiver to remove it
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}

/// Shared, exclusively-owned-by-convention decode handle
pub type SharedHandle = Arc<dyn MediaHandle>;

/// Factory for decode sessions
pub trait MediaBackend: Send + Sync {
    fn create_handle(&self, params: PlaybackParams) -> SharedHandle;
}
