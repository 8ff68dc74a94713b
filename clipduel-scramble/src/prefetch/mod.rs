//! Media prefetch pipeline
//!
//! Hides decode and network latency in two places:
//! - between "duel decided" and "next duel playable" (lead preload, run
//!   while the Instructions or Result screen is up)
//! - between "top clip ends" and "bottom clip starts" (trailing preload,
//!   started only once the top clip is actually playing)
//!
//! Both use [`AssetPreloader`]; they differ only in their [`PreloadPolicy`].

mod preloader;

pub use preloader::AssetPreloader;

use std::time::Duration;

use crate::media::PlaybackParams;

/// Readiness of a preloaded asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// No readiness signal yet
    Pending,
    /// Status stream reported playable
    Ready,
    /// Readiness assumed after a failure or a silent decoder
    Assumed,
}

impl Readiness {
    /// Whether the asset may be revealed/advanced to
    pub fn is_signalled(self) -> bool {
        !matches!(self, Readiness::Pending)
    }
}

/// How a preloader loads and when it gives up waiting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreloadPolicy {
    /// Delay between a load error and assuming readiness anyway
    pub error_grace: Duration,
    /// Overall wait before readiness is assumed; `None` waits for the stream
    pub readiness_timeout: Option<Duration>,
    /// Settings of the preloading handle
    pub params: PlaybackParams,
}

impl PreloadPolicy {
    /// Next round's lead asset, prefetched behind a static screen
    pub fn lead(playback_rate: f64, error_grace: Duration) -> Self {
        Self {
            error_grace,
            readiness_timeout: None,
            params: PlaybackParams::preload(playback_rate),
        }
    }

    /// Current duel's trailing asset, prefetched while the lead plays
    pub fn trailing(playback_rate: f64, error_grace: Duration, readiness_timeout: Duration) -> Self {
        Self {
            error_grace,
            readiness_timeout: Some(readiness_timeout),
            params: PlaybackParams::preload(playback_rate),
        }
    }
}
