//! Duel presentation controller
//!
//! Owns the two presentation slots of one duel and sequences them:
//!
//! ```text
//! AwaitingLead ──top ready──▶ (play top) ──top playing──▶ LeadPlaying
//!                                                            │ starts trailing preload
//!        top ended / reached trim / top failed               ▼
//!                                                     TrailingPlaying ──bottom ended──▶ Finished
//! ```
//!
//! The top slot is either adopted from the lead preloader or loaded here.
//! The bottom slot shows a placeholder until the handoff, then adopts the
//! trailing preload if it reported playable, otherwise loads the clip itself.
//!
//! Each slot's status stream is forwarded into the session loop as round
//! tagged [`DuelSignal`]s. Dropping the controller aborts those listeners
//! (removing the subscriptions), cancels a pending fade and pauses both
//! handles.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use clipduel_common::events::{EventBus, ScrambleEvent};
use clipduel_common::model::SubmitOutcomeResponse;
use clipduel_common::rating::estimate_duel;
use clipduel_common::{Duel, Moment, MomentId, SessionId};

use super::gesture::{SwipeRelease, SwipeThresholds};
use super::haptics::{Haptics, ImpactStyle};
use crate::api::ScrambleBackend;
use crate::config::ScrambleConfig;
use crate::media::{MediaBackend, MediaEvent, MediaStatus, PlaybackParams, SharedHandle};
use crate::prefetch::{AssetPreloader, PreloadPolicy, Readiness};

/// Presentation slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Lead asset, plays first
    Top,
    /// Trailing asset, plays second
    Bottom,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Top => Side::Bottom,
            Side::Bottom => Side::Top,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Top => write!(f, "top"),
            Side::Bottom => write!(f, "bottom"),
        }
    }
}

/// Where a duel's playback sequence is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlaybackStage {
    /// Top clip loading (or adopted and about to start)
    AwaitingLead,
    /// Top clip playing; trailing clip preloading
    LeadPlaying,
    /// Handed off to the bottom clip
    TrailingPlaying,
    /// Both clips played
    Finished,
}

/// Everything the controller reports back to the session loop
///
/// `round` is the session's round index the signal belongs to; the loop
/// drops signals for any round other than the one on screen.
#[derive(Debug, Clone)]
pub enum DuelSignal {
    /// Event from one slot's status stream
    Media {
        round: usize,
        side: Side,
        event: MediaEvent,
    },

    /// Trailing preload finished
    TrailingPreloaded { round: usize, readiness: Readiness },

    /// Fade-out finished after a vote; estimates are attached
    Decided {
        round: usize,
        side: Side,
        winner: Moment,
        loser: Moment,
    },

    /// Backend answered (or failed) the outcome submission
    Submitted {
        round: usize,
        outcome: std::result::Result<SubmitOutcomeResponse, String>,
    },
}

impl DuelSignal {
    pub fn round(&self) -> usize {
        match self {
            DuelSignal::Media { round, .. }
            | DuelSignal::TrailingPreloaded { round, .. }
            | DuelSignal::Decided { round, .. }
            | DuelSignal::Submitted { round, .. } => *round,
        }
    }
}

/// Duel timing and playback settings
#[derive(Debug, Clone, Copy)]
pub struct DuelSettings {
    pub fade_out: Duration,
    pub thresholds: SwipeThresholds,
    pub playback: PlaybackParams,
    pub trailing: PreloadPolicy,
}

impl DuelSettings {
    pub fn from_config(config: &ScrambleConfig) -> Self {
        Self {
            fade_out: config.duel.fade_out(),
            thresholds: config.duel.swipe_thresholds(),
            playback: config.duel.playback_params(config.prefetch.playback_rate),
            trailing: config.prefetch.trailing_policy(),
        }
    }
}

/// Collaborators shared by every duel of a session
#[derive(Clone)]
pub struct DuelContext {
    pub session_id: SessionId,
    pub backend: Arc<dyn ScrambleBackend>,
    pub media: Arc<dyn MediaBackend>,
    pub haptics: Arc<dyn Haptics>,
    pub events: EventBus,
    pub settings: DuelSettings,
}

/// Renderable state of one surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceView {
    pub moment_id: MomentId,
    pub video_url: String,
    /// Still image shown until the clip is on the surface
    pub placeholder_url: Option<String>,
    pub playing: bool,
}

/// Renderable state of the duel pair
#[derive(Debug, Clone, PartialEq)]
pub struct DuelPairView {
    pub round_index: usize,
    pub total_rounds: usize,
    pub top: SurfaceView,
    pub bottom: SurfaceView,
    pub stage: PlaybackStage,
    /// Side already voted for; further swipes are ignored
    pub voted: Option<Side>,
    /// Surfaces fading out after the vote
    pub fading: bool,
}

/// A decode handle bound to one surface, plus its status listener
struct Slot {
    handle: SharedHandle,
    listener: JoinHandle<()>,
}

impl Slot {
    /// Subscribe first, then forward; nothing the handle does afterwards is missed
    fn attach(
        handle: SharedHandle,
        round: usize,
        side: Side,
        signals: mpsc::UnboundedSender<DuelSignal>,
    ) -> Self {
        let mut events = handle.subscribe();
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if signals.send(DuelSignal::Media { round, side, event }).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Round {} {} listener lagged by {} events", round, side, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { handle, listener }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.listener.abort();
        self.handle.pause();
    }
}

/// Presentation of one duel
pub struct DuelController {
    ctx: DuelContext,
    round: usize,
    total_rounds: usize,
    duel: Duel,
    top: Slot,
    bottom: Option<Slot>,
    bottom_live: bool,
    stage: PlaybackStage,
    trailing: Option<AssetPreloader>,
    trailing_requested: bool,
    voted: Option<Side>,
    fade: Option<JoinHandle<()>>,
    signals: mpsc::UnboundedSender<DuelSignal>,
}

impl DuelController {
    /// Put a duel on screen
    ///
    /// `lead` is the top clip's handle if the lead preloader already decoded
    /// it; otherwise the top clip is loaded here.
    pub fn mount(
        ctx: DuelContext,
        round: usize,
        total_rounds: usize,
        duel: Duel,
        lead: Option<SharedHandle>,
        signals: mpsc::UnboundedSender<DuelSignal>,
    ) -> Self {
        let params = ctx.settings.playback;
        let (handle, adopted) = match lead {
            Some(handle) => {
                handle.configure(params);
                (handle, true)
            }
            None => (ctx.media.create_handle(params), false),
        };

        let top = Slot::attach(handle, round, Side::Top, signals.clone());
        if !adopted {
            top.handle.load(&duel.top().video_url);
        }
        info!(
            "Mounted round {} ({} vs {}), lead {}",
            round,
            duel.top().id,
            duel.bottom().id,
            if adopted { "preloaded" } else { "loading" }
        );

        let mut controller = Self {
            ctx,
            round,
            total_rounds,
            duel,
            top,
            bottom: None,
            bottom_live: false,
            stage: PlaybackStage::AwaitingLead,
            trailing: None,
            trailing_requested: false,
            voted: None,
            fade: None,
            signals,
        };
        if controller.top.handle.status() == MediaStatus::ReadyToPlay {
            controller.top.handle.play();
        }
        controller
    }

    pub fn round(&self) -> usize {
        self.round
    }

    pub fn duel(&self) -> &Duel {
        &self.duel
    }

    pub fn stage(&self) -> PlaybackStage {
        self.stage
    }

    pub fn voted(&self) -> Option<Side> {
        self.voted
    }

    /// Whether the trailing preload has been started
    pub fn trailing_requested(&self) -> bool {
        self.trailing_requested
    }

    /// Feed a signal from the session loop
    ///
    /// Returns false for signals this controller does not consume (other
    /// rounds, votes and submissions).
    pub fn handle(&mut self, signal: &DuelSignal) -> bool {
        if signal.round() != self.round {
            return false;
        }
        match signal {
            DuelSignal::Media { side, event, .. } => {
                match side {
                    Side::Top => self.on_top_event(event),
                    Side::Bottom => self.on_bottom_event(event),
                }
                true
            }
            DuelSignal::TrailingPreloaded { readiness, .. } => {
                debug!("Round {} trailing clip preloaded: {:?}", self.round, readiness);
                true
            }
            _ => false,
        }
    }

    fn on_top_event(&mut self, event: &MediaEvent) {
        match event {
            MediaEvent::StatusChanged {
                status: MediaStatus::ReadyToPlay,
                ..
            } if self.stage == PlaybackStage::AwaitingLead => {
                debug!("Round {} lead ready, starting playback", self.round);
                self.top.handle.play();
            }
            MediaEvent::StatusChanged {
                status: MediaStatus::Error,
                error,
            } if self.stage <= PlaybackStage::LeadPlaying => {
                warn!(
                    "Round {} lead clip failed ({}), handing off",
                    self.round,
                    error.as_deref().unwrap_or("unknown error")
                );
                self.flip_to_trailing();
            }
            MediaEvent::PlayingChanged { is_playing: true }
                if self.stage == PlaybackStage::AwaitingLead =>
            {
                self.stage = PlaybackStage::LeadPlaying;
                self.start_trailing_preload();
            }
            MediaEvent::TimeUpdate { position_secs } if self.stage == PlaybackStage::LeadPlaying => {
                if let Some(trim) = self.duel.top().trim_end_offset {
                    if *position_secs >= trim {
                        debug!("Round {} lead reached trim point {}s", self.round, trim);
                        self.flip_to_trailing();
                    }
                }
            }
            MediaEvent::PlayedToEnd if self.stage == PlaybackStage::LeadPlaying => {
                self.flip_to_trailing();
            }
            _ => {}
        }
    }

    fn on_bottom_event(&mut self, event: &MediaEvent) {
        if self.stage != PlaybackStage::TrailingPlaying {
            return;
        }
        match event {
            MediaEvent::PlayingChanged { is_playing: true } => {
                self.bottom_live = true;
            }
            MediaEvent::StatusChanged {
                status: MediaStatus::Error,
                ..
            } => {
                warn!("Round {} trailing clip failed to play", self.round);
                self.finish();
            }
            MediaEvent::TimeUpdate { position_secs } => {
                if let Some(trim) = self.duel.bottom().trim_end_offset {
                    if *position_secs >= trim {
                        self.finish();
                    }
                }
            }
            MediaEvent::PlayedToEnd => self.finish(),
            _ => {}
        }
    }

    /// Trailing preload starts only once the lead is actually playing
    fn start_trailing_preload(&mut self) {
        if self.trailing_requested {
            return;
        }
        self.trailing_requested = true;

        let signals = self.signals.clone();
        let round = self.round;
        self.trailing = AssetPreloader::start(
            self.ctx.media.as_ref(),
            Some(self.duel.bottom()),
            &self.ctx.settings.trailing,
            move |readiness| {
                let _ = signals.send(DuelSignal::TrailingPreloaded { round, readiness });
            },
        );
        debug!("Round {} lead playing, trailing preload started", self.round);
    }

    fn flip_to_trailing(&mut self) {
        if !matches!(
            self.stage,
            PlaybackStage::AwaitingLead | PlaybackStage::LeadPlaying
        ) {
            return;
        }
        self.top.handle.pause();
        self.stage = PlaybackStage::TrailingPlaying;

        let params = self.ctx.settings.playback;
        let adopted = self.trailing.take().and_then(AssetPreloader::take_handle);
        let preloaded = adopted.is_some();
        let handle = match adopted {
            Some(handle) => {
                handle.configure(params);
                handle
            }
            None => self.ctx.media.create_handle(params),
        };

        let slot = Slot::attach(handle, self.round, Side::Bottom, self.signals.clone());
        if !preloaded {
            slot.handle.load(&self.duel.bottom().video_url);
        }
        slot.handle.play();
        self.bottom = Some(slot);

        info!(
            "Round {} handed off to {} ({})",
            self.round,
            self.duel.bottom().id,
            if preloaded { "preloaded" } else { "loading now" }
        );
        self.ctx.events.emit_lossy(ScrambleEvent::PlaybackHandoff {
            round_index: self.round,
            moment_id: self.duel.bottom().id.clone(),
            preloaded,
            timestamp: clipduel_common::time::now(),
        });
    }

    fn finish(&mut self) {
        if let Some(bottom) = &self.bottom {
            bottom.handle.pause();
        }
        self.stage = PlaybackStage::Finished;
        debug!("Round {} playback finished", self.round);
    }

    /// A surface was released
    ///
    /// Returns true if this release cast the vote. Only the first completed
    /// swipe per duel counts.
    pub fn swipe(&mut self, side: Side, release: SwipeRelease) -> bool {
        if let Some(voted) = self.voted {
            debug!("Round {} already voted {}, ignoring swipe", self.round, voted);
            return false;
        }
        if self.ctx.settings.thresholds.evaluate(release).is_none() {
            return false;
        }
        self.voted = Some(side);
        self.ctx.haptics.impact(ImpactStyle::Light);

        let (winner, loser) = match side {
            Side::Top => (self.duel.top(), self.duel.bottom()),
            Side::Bottom => (self.duel.bottom(), self.duel.top()),
        };
        let estimate = estimate_duel(winner.rating_before, loser.rating_before);
        let winner = winner.with_estimate(estimate.winner_after);
        let loser = loser.with_estimate(estimate.loser_after);
        info!(
            "Round {} vote: {} ({} → {}) beats {} ({} → {})",
            self.round,
            winner.id,
            winner.rating_before,
            estimate.winner_after,
            loser.id,
            loser.rating_before,
            estimate.loser_after
        );

        let ctx = self.ctx.clone();
        let signals = self.signals.clone();
        let round = self.round;
        let backend_round = self.duel.round_index();
        self.fade = Some(tokio::spawn(async move {
            sleep(ctx.settings.fade_out).await;
            ctx.haptics.impact(ImpactStyle::Medium);

            let winner_id = winner.id.clone();
            if signals
                .send(DuelSignal::Decided {
                    round,
                    side,
                    winner,
                    loser,
                })
                .is_err()
            {
                return;
            }

            // Detached: the UI never waits on the backend
            tokio::spawn(submit_outcome(
                ctx.backend,
                ctx.session_id,
                winner_id,
                round,
                backend_round,
                signals,
            ));
        }));
        true
    }

    pub fn view(&self) -> DuelPairView {
        let top = self.duel.top();
        let bottom = self.duel.bottom();
        let playing = |slot: Option<&Slot>| slot.map(|s| s.handle.is_playing()).unwrap_or(false);

        DuelPairView {
            round_index: self.round,
            total_rounds: self.total_rounds,
            top: SurfaceView {
                moment_id: top.id.clone(),
                video_url: top.video_url.clone(),
                placeholder_url: None,
                playing: playing(Some(&self.top)),
            },
            bottom: SurfaceView {
                moment_id: bottom.id.clone(),
                video_url: bottom.video_url.clone(),
                placeholder_url: (!self.bottom_live).then(|| bottom.placeholder_url()),
                playing: playing(self.bottom.as_ref()),
            },
            stage: self.stage,
            voted: self.voted,
            fading: self.voted.is_some(),
        }
    }
}

impl Drop for DuelController {
    fn drop(&mut self) {
        if let Some(fade) = self.fade.take() {
            fade.abort();
        }
        debug!("Unmounted round {}", self.round);
    }
}

async fn submit_outcome(
    backend: Arc<dyn ScrambleBackend>,
    session_id: SessionId,
    winner_id: MomentId,
    round: usize,
    backend_round: usize,
    signals: mpsc::UnboundedSender<DuelSignal>,
) {
    let outcome = match backend
        .submit_outcome(&session_id, &winner_id, backend_round)
        .await
    {
        Ok(response) => {
            info!(
                "Round {} outcome accepted (completed: {})",
                backend_round, response.completed
            );
            Ok(response)
        }
        Err(e) => {
            // Not retried; the optimistic result stands
            error!("Round {} outcome submission failed: {}", backend_round, e);
            Err(e.to_string())
        }
    };
    let _ = signals.send(DuelSignal::Submitted { round, outcome });
}
