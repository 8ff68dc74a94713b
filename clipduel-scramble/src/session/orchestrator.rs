//! Session orchestrator
//!
//! Creates the session, owns the single [`PhaseEngine`] for its lifetime and
//! runs one cooperative loop that turns user input, preload readiness and
//! duel signals into engine actions. After every step the owned resources
//! are reconciled with the new engine state:
//!
//! - a lead preloader runs for exactly the round the engine awaits
//! - a duel controller is mounted exactly while the engine is in Duel
//! - the winner clip replays on loop exactly while the engine is in Result
//!
//! and the projected [`SessionView`] is published on a watch channel.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use clipduel_common::events::{EventBus, ScrambleEvent};
use clipduel_common::model::LeagueTableEntry;
use clipduel_common::time::{is_expired, now};
use clipduel_common::{MomentId, Phase, Session, SessionId};

use super::engine::{Action, PhaseEngine, SessionFailure};
use super::view::SessionView;
use crate::api::ScrambleBackend;
use crate::config::ScrambleConfig;
use crate::duel::{
    DuelContext, DuelController, DuelSettings, DuelSignal, Haptics, Side, SwipeRelease,
};
use crate::media::{MediaBackend, PlaybackParams, SharedHandle};
use crate::prefetch::{AssetPreloader, Readiness};

/// Input from whoever is playing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UserInput {
    /// Dismiss the instructions
    TapPlay,
    /// Release a swipe on one surface
    Swipe { side: Side, release: SwipeRelease },
    /// Leave the result card
    Advance,
    /// Abandon the session
    Quit,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub session_id: Option<SessionId>,
    pub final_phase: Phase,
    pub rounds_played: usize,
    pub failure: Option<SessionFailure>,
    pub submissions_accepted: usize,
    pub submissions_failed: usize,
    pub league_table: Vec<LeagueTableEntry>,
}

/// Lead preload finished for `round`
#[derive(Debug)]
struct LeadReady {
    round: usize,
    moment_id: MomentId,
    readiness: Readiness,
}

/// One Scramble game instance
pub struct ScrambleSession {
    backend: Arc<dyn ScrambleBackend>,
    media: Arc<dyn MediaBackend>,
    haptics: Arc<dyn Haptics>,
    config: ScrambleConfig,
    settings: DuelSettings,
    events: EventBus,
    engine: PhaseEngine,

    lead: Option<(usize, AssetPreloader)>,
    lead_tx: mpsc::UnboundedSender<LeadReady>,
    lead_rx: mpsc::UnboundedReceiver<LeadReady>,
    controller: Option<DuelController>,
    duel_tx: mpsc::UnboundedSender<DuelSignal>,
    duel_rx: mpsc::UnboundedReceiver<DuelSignal>,
    showcase: Option<SharedHandle>,

    league_table: Vec<LeagueTableEntry>,
    pending_submissions: usize,
    submissions_accepted: usize,
    submissions_failed: usize,
    view_tx: watch::Sender<SessionView>,
}

impl ScrambleSession {
    pub fn new(
        backend: Arc<dyn ScrambleBackend>,
        media: Arc<dyn MediaBackend>,
        haptics: Arc<dyn Haptics>,
        config: ScrambleConfig,
    ) -> Self {
        let (lead_tx, lead_rx) = mpsc::unbounded_channel();
        let (duel_tx, duel_rx) = mpsc::unbounded_channel();
        let (view_tx, _) = watch::channel(SessionView::Loading);

        Self {
            backend,
            media,
            haptics,
            settings: DuelSettings::from_config(&config),
            events: EventBus::new(config.event_bus_capacity),
            config,
            engine: PhaseEngine::new(),
            lead: None,
            lead_tx,
            lead_rx,
            controller: None,
            duel_tx,
            duel_rx,
            showcase: None,
            league_table: Vec::new(),
            pending_submissions: 0,
            submissions_accepted: 0,
            submissions_failed: 0,
            view_tx,
        }
    }

    /// Session events; subscribe before calling [`run`](Self::run)
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Latest view, updated after every step of the loop
    pub fn subscribe_view(&self) -> watch::Receiver<SessionView> {
        self.view_tx.subscribe()
    }

    /// Create the session and play it until it completes, fails or is quit
    pub async fn run(mut self, mut inputs: mpsc::Receiver<UserInput>) -> SessionReport {
        self.create().await;
        self.sync_effects();
        self.publish();

        let mut inputs_open = true;
        while !self.finished() {
            let before = (self.engine.state().phase, self.engine.state().round_index);

            tokio::select! {
                input = inputs.recv(), if inputs_open => match input {
                    Some(UserInput::Quit) => {
                        info!("Session abandoned by user");
                        break;
                    }
                    // Nothing left to play; keep waiting for submissions
                    None if self.engine.state().is_complete() => inputs_open = false,
                    None => {
                        info!("Input closed, abandoning session");
                        break;
                    }
                    Some(input) => self.on_input(input),
                },
                Some(signal) = self.duel_rx.recv() => self.on_duel_signal(signal),
                Some(ready) = self.lead_rx.recv() => self.on_lead_ready(ready),
            }

            self.note_transition(before);
            self.sync_effects();
            self.publish();
        }

        self.shutdown()
    }

    async fn create(&mut self) {
        let sport = self.config.session.sport.clone();
        info!("Creating scramble session (sport: {})", sport.as_deref().unwrap_or("any"));

        match self.backend.create_session(sport.as_deref()).await {
            Ok(response) => {
                let session = Arc::new(Session::from_response(response));
                info!(
                    "Session {} created: {} playable duels, sport {:?}",
                    session.id,
                    session.len(),
                    session.sport
                );
                self.events.emit_lossy(ScrambleEvent::SessionCreated {
                    session_id: session.id.clone(),
                    sport: session.sport.clone(),
                    total_rounds: session.len(),
                    timestamp: now(),
                });
                self.engine.dispatch(Action::InitSession(session));
            }
            Err(e) => {
                let auth_required = e.is_auth_failure();
                error!("Session creation failed: {}", e);
                self.events.emit_lossy(ScrambleEvent::SessionFailed {
                    reason: e.to_string(),
                    auth_required,
                    timestamp: now(),
                });
                self.engine.dispatch(Action::SessionFailed {
                    reason: e.to_string(),
                    auth_required,
                });
            }
        }
    }

    fn finished(&self) -> bool {
        let state = self.engine.state();
        state.failure.is_some() || (state.is_complete() && self.pending_submissions == 0)
    }

    fn on_input(&mut self, input: UserInput) {
        match input {
            UserInput::TapPlay => {
                let state = self.engine.state();
                if state.phase == Phase::Instructions && !state.next_asset_ready {
                    debug!("Play pressed before the first clip is ready");
                    return;
                }
                self.check_expiry();
                self.engine.dispatch(Action::TapPlay);
            }
            UserInput::Swipe { side, release } => {
                if self.engine.state().phase != Phase::Duel {
                    return;
                }
                if let Some(controller) = self.controller.as_mut() {
                    controller.swipe(side, release);
                }
            }
            UserInput::Advance => {
                let state = self.engine.state();
                if state.phase == Phase::Result && !state.next_asset_ready {
                    debug!("Advance pressed before round {} is ready", state.round_index + 1);
                    return;
                }
                self.check_expiry();
                self.engine.dispatch(Action::NextRound);
            }
            UserInput::Quit => {}
        }
    }

    fn on_duel_signal(&mut self, signal: DuelSignal) {
        match signal {
            DuelSignal::Decided {
                round,
                side,
                winner,
                loser,
            } => {
                self.pending_submissions += 1;
                if round != self.engine.state().round_index {
                    debug!("Ignoring decision for superseded round {}", round);
                    return;
                }
                let winner_id = winner.id.clone();
                let loser_id = loser.id.clone();
                let winner_after = winner.rating_after.unwrap_or_default();
                let loser_after = loser.rating_after.unwrap_or_default();

                if !self.engine.dispatch(Action::DeclareWinner { winner, loser }) {
                    return;
                }
                if let Some(session) = self.engine.state().session.as_ref() {
                    self.events.emit_lossy(ScrambleEvent::WinnerDeclared {
                        session_id: session.id.clone(),
                        round_index: round,
                        winner_id,
                        loser_id,
                        winner_rating_after: winner_after,
                        loser_rating_after: loser_after,
                        timestamp: now(),
                    });
                }
                debug!("Round {} won by the {} clip", round, side);
                self.engine.dispatch(Action::ShowResult);
            }

            DuelSignal::Submitted { round, outcome } => {
                self.pending_submissions = self.pending_submissions.saturating_sub(1);
                let Some(session_id) = self.session_id() else {
                    return;
                };
                match outcome {
                    Ok(response) => {
                        self.submissions_accepted += 1;
                        // Reconciliation: only the league table is taken over
                        if let Some(entries) = response.league_table_entries {
                            self.league_table = entries;
                        }
                        self.events.emit_lossy(ScrambleEvent::OutcomeSubmitted {
                            session_id,
                            round_index: round,
                            completed: response.completed,
                            timestamp: now(),
                        });
                    }
                    Err(reason) => {
                        self.submissions_failed += 1;
                        self.events.emit_lossy(ScrambleEvent::OutcomeSubmissionFailed {
                            session_id,
                            round_index: round,
                            reason,
                            timestamp: now(),
                        });
                    }
                }
            }

            signal => {
                if let Some(controller) = self.controller.as_mut() {
                    controller.handle(&signal);
                }
            }
        }
    }

    fn on_lead_ready(&mut self, ready: LeadReady) {
        let accepted = self.engine.dispatch(Action::AssetReady {
            round_index: ready.round,
        });
        if !accepted {
            debug!("Dropping readiness of round {}", ready.round);
            return;
        }
        self.events.emit_lossy(ScrambleEvent::AssetReady {
            round_index: ready.round,
            moment_id: ready.moment_id,
            assumed: ready.readiness == Readiness::Assumed,
            timestamp: now(),
        });
    }

    /// Expiry is advisory: the backend stays authoritative, play continues
    fn check_expiry(&self) {
        let Some(session) = self.engine.state().session.as_ref() else {
            return;
        };
        if let Some(expires_at) = session.expires_at {
            if is_expired(Some(expires_at), now()) {
                warn!("Session {} expired at {}", session.id, expires_at);
                self.events.emit_lossy(ScrambleEvent::SessionExpired {
                    session_id: session.id.clone(),
                    expires_at,
                    timestamp: now(),
                });
            }
        }
    }

    fn note_transition(&self, (old_phase, old_round): (Phase, usize)) {
        let state = self.engine.state();
        if state.phase == old_phase && state.round_index == old_round {
            return;
        }
        let Some(session_id) = self.session_id() else {
            return;
        };
        self.events.emit_lossy(ScrambleEvent::PhaseChanged {
            session_id,
            old_phase,
            new_phase: state.phase,
            round_index: state.round_index,
            timestamp: now(),
        });
    }

    /// Bring owned resources in line with the engine state
    fn sync_effects(&mut self) {
        let state = self.engine.state();
        let phase = state.phase;
        let round = state.round_index;
        let pair = state.current_pair.clone();
        let session = state.session.clone();
        let awaited = state.awaited_round();
        let total_rounds = state.duel_count();

        // Duel controller: mounted exactly while in Duel, for the current round
        if phase != Phase::Duel {
            self.controller = None;
        } else if self.controller.as_ref().map(|c| c.round()) != Some(round) {
            self.controller = None;
            if let (Some(pair), Some(session)) = (pair, session.as_ref()) {
                let lead = match self.lead.take() {
                    Some((lead_round, preloader)) if lead_round == round => preloader.take_handle(),
                    _ => None,
                };
                let ctx = DuelContext {
                    session_id: session.id.clone(),
                    backend: Arc::clone(&self.backend),
                    media: Arc::clone(&self.media),
                    haptics: Arc::clone(&self.haptics),
                    events: self.events.clone(),
                    settings: self.settings,
                };
                self.controller = Some(DuelController::mount(
                    ctx,
                    round,
                    total_rounds,
                    pair,
                    lead,
                    self.duel_tx.clone(),
                ));
            }
        }

        // Lead preloader: running exactly for the awaited round
        match awaited {
            Some(next) if self.lead.as_ref().map(|(r, _)| *r) != Some(next) => {
                let moment = session.as_ref().and_then(|s| s.duel(next)).map(|d| d.top());
                let tx = self.lead_tx.clone();
                let moment_id = moment.map(|m| m.id.clone());
                let preloader = AssetPreloader::start(
                    self.media.as_ref(),
                    moment,
                    &self.config.prefetch.lead_policy(),
                    move |readiness| {
                        if let Some(moment_id) = moment_id {
                            let _ = tx.send(LeadReady {
                                round: next,
                                moment_id,
                                readiness,
                            });
                        }
                    },
                );
                self.lead = preloader.map(|p| (next, p));
            }
            Some(_) => {}
            None => self.lead = None,
        }

        // Showcase: winner clip on loop behind the result card
        if phase == Phase::Result {
            if self.showcase.is_none() {
                if let Some(winner) = self.engine.state().winner.as_ref() {
                    let handle = self.media.create_handle(PlaybackParams::showcase());
                    handle.load(&winner.video_url);
                    handle.play();
                    self.showcase = Some(handle);
                }
            }
        } else if let Some(handle) = self.showcase.take() {
            handle.pause();
        }
    }

    fn publish(&self) {
        let view = SessionView::project(
            self.engine.state(),
            self.controller.as_ref().map(DuelController::view),
            &self.league_table,
        );
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            debug!("View → {}", view.name());
            *current = view;
            true
        });
    }

    fn session_id(&self) -> Option<SessionId> {
        self.engine.state().session.as_ref().map(|s| s.id.clone())
    }

    fn shutdown(mut self) -> SessionReport {
        self.controller = None;
        self.lead = None;
        if let Some(handle) = self.showcase.take() {
            handle.pause();
        }
        let league_table = std::mem::take(&mut self.league_table);
        let session_id = self.session_id();

        let state = self.engine.state();
        let rounds_played = match state.phase {
            Phase::Complete => state.round_index + 1,
            Phase::Result => state.round_index + 1,
            _ => state.round_index,
        };
        if state.is_complete() {
            if let Some(session_id) = session_id.clone() {
                info!("Session {} complete after {} rounds", session_id, rounds_played);
                self.events.emit_lossy(ScrambleEvent::SessionCompleted {
                    session_id,
                    rounds_played,
                    timestamp: now(),
                });
            }
        }

        SessionReport {
            session_id,
            final_phase: state.phase,
            rounds_played,
            failure: state.failure.clone(),
            submissions_accepted: self.submissions_accepted,
            submissions_failed: self.submissions_failed,
            league_table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiContext, HttpBackend};
    use crate::duel::TracingHaptics;
    use crate::media::{ClipProfile, SimulatedMediaBackend};
    use clipduel_common::{Duel, Moment};

    fn offline_session() -> ScrambleSession {
        let config = ScrambleConfig::default();
        let backend = HttpBackend::new(ApiContext::from_config(&config.api)).unwrap();
        ScrambleSession::new(
            Arc::new(backend),
            Arc::new(SimulatedMediaBackend::new(ClipProfile::default())),
            Arc::new(TracingHaptics),
            config,
        )
    }

    fn ready(round: usize) -> LeadReady {
        LeadReady {
            round,
            moment_id: MomentId::from(1),
            readiness: Readiness::Ready,
        }
    }

    #[tokio::test]
    async fn test_only_accepted_readiness_is_announced() {
        let mut session = offline_session();
        let mut events = session.events().subscribe();

        // Still loading: nothing is awaited
        session.on_lead_ready(ready(0));
        assert!(events.try_recv().is_err());

        let duel = Duel::new(
            0,
            Moment::new(1, "clip-1", 1500.0),
            Moment::new(2, "clip-2", 1500.0),
        )
        .unwrap();
        let created = Session::new(SessionId::from(3), "football", vec![duel], None);
        assert!(session.engine.dispatch(Action::InitSession(Arc::new(created))));

        session.on_lead_ready(ready(1));
        assert!(events.try_recv().is_err());

        session.on_lead_ready(ready(0));
        assert!(matches!(
            events.try_recv(),
            Ok(ScrambleEvent::AssetReady { round_index: 0, .. })
        ));

        // Repeats are absorbed by the engine
        session.on_lead_ready(ready(0));
        assert!(events.try_recv().is_err());
    }
}
