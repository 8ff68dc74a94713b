//! Session phase engine
//!
//! A pure reducer: `reduce(state, action)` returns the next state, or `None`
//! when the action is not valid in the current state. Invalid actions are
//! routine (UI input and media callbacks race against phase changes), so
//! they are ignored rather than reported as errors.
//!
//! Phase transitions:
//!
//! | Action          | Valid when                              | Effect                                   |
//! |-----------------|-----------------------------------------|------------------------------------------|
//! | InitSession     | loading                                 | Instructions, pair = duels[0]            |
//! | SessionFailed   | loading                                 | failure recorded                         |
//! | AssetReady(r)   | r is the round currently being awaited  | next_asset_ready = true                  |
//! | TapPlay         | Instructions with a first duel          | Duel, next_asset_ready = false           |
//! | DeclareWinner   | Duel, no winner yet, ids match the pair | winner/loser stored                      |
//! | ShowResult      | Duel with a winner                      | Result                                   |
//! | NextRound       | Result                                  | next duel, or Complete after the last    |

use std::sync::Arc;
use tracing::{debug, info};

use clipduel_common::{Duel, Moment, Phase, Session};

/// Inputs to the phase engine
#[derive(Debug, Clone)]
pub enum Action {
    /// Backend created the session
    InitSession(Arc<Session>),
    /// Backend could not create the session
    SessionFailed { reason: String, auth_required: bool },
    /// The lead asset of `round_index` is prefetched
    AssetReady { round_index: usize },
    /// User dismissed the instructions
    TapPlay,
    /// Vote recorded, estimates attached
    DeclareWinner { winner: Moment, loser: Moment },
    /// Fade-out finished
    ShowResult,
    /// User advanced from the result card
    NextRound,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::InitSession(_) => "INIT_SESSION",
            Action::SessionFailed { .. } => "SESSION_FAILED",
            Action::AssetReady { .. } => "ASSET_READY",
            Action::TapPlay => "TAP_PLAY",
            Action::DeclareWinner { .. } => "DECLARE_WINNER",
            Action::ShowResult => "SHOW_RESULT",
            Action::NextRound => "NEXT_ROUND",
        }
    }
}

/// Session creation failure, terminal for this game instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    pub reason: String,
    pub auth_required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub phase: Phase,
    pub round_index: usize,
    pub session: Option<Arc<Session>>,
    pub current_pair: Option<Duel>,
    pub winner: Option<Moment>,
    pub loser: Option<Moment>,
    pub next_asset_ready: bool,
    pub loading: bool,
    pub failure: Option<SessionFailure>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            phase: Phase::Instructions,
            round_index: 0,
            session: None,
            current_pair: None,
            winner: None,
            loser: None,
            next_asset_ready: false,
            loading: true,
            failure: None,
        }
    }
}

impl EngineState {
    pub fn duel_count(&self) -> usize {
        self.session.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    pub fn has_next_round(&self) -> bool {
        self.round_index + 1 < self.duel_count()
    }

    /// Round whose lead asset is being prefetched right now, if any
    ///
    /// Only readiness for this round counts; anything else is a callback
    /// from a superseded preload.
    pub fn awaited_round(&self) -> Option<usize> {
        if self.loading || self.failure.is_some() {
            return None;
        }
        match self.phase {
            Phase::Instructions if self.duel_count() > 0 => Some(0),
            Phase::Result if self.has_next_round() => Some(self.round_index + 1),
            _ => None,
        }
    }

    /// Every duel has been played
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
            || (!self.loading && self.failure.is_none() && self.duel_count() == 0)
    }
}

/// Apply `action` to `state`; `None` means the action is a no-op here
pub fn reduce(state: &EngineState, action: &Action) -> Option<EngineState> {
    match action {
        Action::InitSession(session) => {
            if !state.loading {
                return None;
            }
            Some(EngineState {
                phase: Phase::Instructions,
                round_index: 0,
                current_pair: session.duel(0).cloned(),
                session: Some(Arc::clone(session)),
                loading: false,
                ..EngineState::default()
            })
        }

        Action::SessionFailed {
            reason,
            auth_required,
        } => {
            if !state.loading {
                return None;
            }
            Some(EngineState {
                loading: false,
                failure: Some(SessionFailure {
                    reason: reason.clone(),
                    auth_required: *auth_required,
                }),
                ..state.clone()
            })
        }

        Action::AssetReady { round_index } => {
            if state.next_asset_ready || state.awaited_round() != Some(*round_index) {
                return None;
            }
            Some(EngineState {
                next_asset_ready: true,
                ..state.clone()
            })
        }

        Action::TapPlay => {
            if state.phase != Phase::Instructions || state.loading || state.current_pair.is_none() {
                return None;
            }
            Some(EngineState {
                phase: Phase::Duel,
                next_asset_ready: false,
                ..state.clone()
            })
        }

        Action::DeclareWinner { winner, loser } => {
            if state.phase != Phase::Duel || state.winner.is_some() {
                return None;
            }
            let pair = state.current_pair.as_ref()?;
            let ids = (&winner.id, &loser.id);
            let matches_pair = ids == (&pair.top().id, &pair.bottom().id)
                || ids == (&pair.bottom().id, &pair.top().id);
            if !matches_pair {
                return None;
            }
            Some(EngineState {
                winner: Some(winner.clone()),
                loser: Some(loser.clone()),
                ..state.clone()
            })
        }

        Action::ShowResult => {
            if state.phase != Phase::Duel || state.winner.is_none() {
                return None;
            }
            Some(EngineState {
                phase: Phase::Result,
                // Nothing left to prefetch: advancing is immediately allowed
                next_asset_ready: !state.has_next_round(),
                ..state.clone()
            })
        }

        Action::NextRound => {
            if state.phase != Phase::Result {
                return None;
            }
            if !state.has_next_round() {
                return Some(EngineState {
                    phase: Phase::Complete,
                    next_asset_ready: false,
                    ..state.clone()
                });
            }
            let round_index = state.round_index + 1;
            Some(EngineState {
                phase: Phase::Duel,
                round_index,
                current_pair: state
                    .session
                    .as_ref()
                    .and_then(|s| s.duel(round_index))
                    .cloned(),
                winner: None,
                loser: None,
                next_asset_ready: false,
                ..state.clone()
            })
        }
    }
}

/// Owner of the single engine state of a session
#[derive(Debug, Default)]
pub struct PhaseEngine {
    state: EngineState,
}

impl PhaseEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Apply an action; returns whether it changed anything
    pub fn dispatch(&mut self, action: Action) -> bool {
        match reduce(&self.state, &action) {
            Some(next) => {
                if next.phase != self.state.phase {
                    info!(
                        "Phase {} → {} (round {})",
                        self.state.phase, next.phase, next.round_index
                    );
                }
                self.state = next;
                true
            }
            None => {
                debug!(
                    "Ignoring {} in phase {} (round {})",
                    action.name(),
                    self.state.phase,
                    self.state.round_index
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipduel_common::SessionId;
    use proptest::prelude::*;

    fn session(duels: usize) -> Arc<Session> {
        let duels = (0..duels)
            .map(|round| {
                let top = Moment::new((round * 2) as i64, format!("clip-{}-top", round), 1200.0);
                let bottom =
                    Moment::new((round * 2 + 1) as i64, format!("clip-{}-bottom", round), 1200.0);
                Duel::new(round, top, bottom).unwrap()
            })
            .collect();
        Arc::new(Session::new(SessionId::from("s-1"), "football", duels, None))
    }

    fn started(duels: usize) -> PhaseEngine {
        let mut engine = PhaseEngine::new();
        assert!(engine.dispatch(Action::InitSession(session(duels))));
        engine
    }

    fn vote_top(engine: &mut PhaseEngine) {
        let pair = engine.state().current_pair.clone().unwrap();
        assert!(engine.dispatch(Action::DeclareWinner {
            winner: pair.top().with_estimate(1220),
            loser: pair.bottom().with_estimate(1180),
        }));
        assert!(engine.dispatch(Action::ShowResult));
    }

    #[test]
    fn test_init_session_enters_instructions() {
        let engine = started(3);
        let state = engine.state();
        assert_eq!(state.phase, Phase::Instructions);
        assert!(!state.loading);
        assert_eq!(state.current_pair.as_ref().unwrap().round_index(), 0);
        assert_eq!(state.awaited_round(), Some(0));
    }

    #[test]
    fn test_every_round_then_complete() {
        let mut engine = started(3);
        assert!(engine.dispatch(Action::TapPlay));

        // N-1 NEXT_ROUNDs walk through every duel
        for round in 1..3 {
            vote_top(&mut engine);
            assert!(engine.dispatch(Action::NextRound));
            assert_eq!(engine.state().phase, Phase::Duel);
            assert_eq!(engine.state().round_index, round);
            assert!(engine.state().winner.is_none());
        }

        // The last result card advances to Complete
        vote_top(&mut engine);
        assert!(engine.dispatch(Action::NextRound));
        assert_eq!(engine.state().phase, Phase::Complete);
        assert_eq!(engine.state().round_index, 2);

        assert!(!engine.dispatch(Action::NextRound));
        assert!(!engine.dispatch(Action::TapPlay));
        assert_eq!(engine.state().phase, Phase::Complete);
    }

    #[test]
    fn test_tap_play_only_from_instructions() {
        let mut engine = started(2);
        assert!(engine.dispatch(Action::TapPlay));
        let before = engine.state().clone();
        assert!(!engine.dispatch(Action::TapPlay));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_next_asset_ready_resets() {
        let mut engine = started(2);
        assert!(engine.dispatch(Action::AssetReady { round_index: 0 }));
        assert!(engine.state().next_asset_ready);
        // Idempotent
        assert!(!engine.dispatch(Action::AssetReady { round_index: 0 }));

        assert!(engine.dispatch(Action::TapPlay));
        assert!(!engine.state().next_asset_ready);

        vote_top(&mut engine);
        assert!(!engine.state().next_asset_ready);
        assert!(engine.dispatch(Action::AssetReady { round_index: 1 }));
        assert!(engine.state().next_asset_ready);

        assert!(engine.dispatch(Action::NextRound));
        assert!(!engine.state().next_asset_ready);
    }

    #[test]
    fn test_superseded_readiness_is_ignored() {
        let mut engine = started(3);
        assert!(engine.dispatch(Action::TapPlay));
        vote_top(&mut engine);
        assert!(engine.dispatch(Action::NextRound));
        vote_top(&mut engine);

        // Now awaiting round 2; a late signal for round 1 must not count
        assert_eq!(engine.state().awaited_round(), Some(2));
        assert!(!engine.dispatch(Action::AssetReady { round_index: 1 }));
        assert!(!engine.state().next_asset_ready);
    }

    #[test]
    fn test_last_result_needs_no_prefetch() {
        let mut engine = started(1);
        assert!(engine.dispatch(Action::TapPlay));
        vote_top(&mut engine);
        assert!(engine.state().next_asset_ready);
        assert_eq!(engine.state().awaited_round(), None);
    }

    #[test]
    fn test_declare_winner_once_and_for_current_pair() {
        let mut engine = started(2);
        let stranger = Moment::new(99, "elsewhere", 1200.0);
        let pair = engine.state().current_pair.clone().unwrap();

        // Not yet in Duel
        assert!(!engine.dispatch(Action::DeclareWinner {
            winner: pair.top().clone(),
            loser: pair.bottom().clone(),
        }));
        assert!(engine.dispatch(Action::TapPlay));
        assert!(!engine.dispatch(Action::ShowResult));

        assert!(!engine.dispatch(Action::DeclareWinner {
            winner: stranger,
            loser: pair.bottom().clone(),
        }));
        assert!(engine.dispatch(Action::DeclareWinner {
            winner: pair.bottom().with_estimate(1220),
            loser: pair.top().with_estimate(1180),
        }));
        assert!(!engine.dispatch(Action::DeclareWinner {
            winner: pair.top().clone(),
            loser: pair.bottom().clone(),
        }));
        assert_eq!(engine.state().winner.as_ref().unwrap().id, pair.bottom().id);
        assert_eq!(engine.state().phase, Phase::Duel);
    }

    #[test]
    fn test_session_failure_is_terminal() {
        let mut engine = PhaseEngine::new();
        assert!(engine.dispatch(Action::SessionFailed {
            reason: "401".to_string(),
            auth_required: true,
        }));
        assert!(!engine.dispatch(Action::InitSession(session(2))));
        assert!(!engine.dispatch(Action::TapPlay));
        assert!(engine.state().failure.as_ref().unwrap().auth_required);
    }

    #[test]
    fn test_empty_session_is_complete() {
        let mut engine = started(0);
        assert!(engine.state().is_complete());
        assert!(!engine.dispatch(Action::TapPlay));
        assert_eq!(engine.state().awaited_round(), None);
    }

    fn any_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            (0usize..5).prop_map(|round_index| Action::AssetReady { round_index }),
            Just(Action::TapPlay),
            Just(Action::ShowResult),
            Just(Action::NextRound),
            Just(Action::DeclareWinner {
                winner: Moment::new(0, "clip-0-top", 1200.0),
                loser: Moment::new(1, "clip-0-bottom", 1200.0),
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_index_stays_in_bounds(
            duels in 0usize..4,
            actions in prop::collection::vec(any_action(), 0..40),
        ) {
            let mut engine = started(duels);
            let mut last_round = 0;
            for action in actions {
                let was_complete = engine.state().phase == Phase::Complete;
                let before = engine.state().clone();
                engine.dispatch(action);
                let state = engine.state();

                prop_assert!(state.round_index <= duels);
                prop_assert!(state.round_index >= last_round);
                if was_complete {
                    prop_assert_eq!(state, &before);
                }
                last_round = state.round_index;
            }
        }
    }
}
