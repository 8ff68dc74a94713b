//! Scripted player for headless runs
//!
//! Watches the published [`SessionView`] and answers it the way a user
//! would: taps play, waits for the clips, swipes one side, advances once
//! the next round is ready.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info};

use super::orchestrator::UserInput;
use super::view::{ResultCardView, SessionView};
use crate::duel::{PlaybackStage, Side, SwipeRelease, SwipeTracker};

/// Finger travel used for scripted swipes, well past any sane threshold
const SCRIPTED_SWIPE_PX: f64 = 400.0;

/// Finger steps of a scripted swipe; top swipes right, bottom left
fn scripted_swipe(side: Side) -> Option<SwipeRelease> {
    let direction = match side {
        Side::Top => 1.0,
        Side::Bottom => -1.0,
    };
    let mut tracker = SwipeTracker::default();
    tracker.press(0.0);
    for step in 1..=4 {
        tracker.drag(direction * SCRIPTED_SWIPE_PX * f64::from(step) / 4.0);
    }
    tracker.release(0.0)
}

/// Which surface to vote for in each round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickStrategy {
    Top,
    Bottom,
    /// Top on even rounds, bottom on odd ones
    Alternate,
    /// Explicit per-round picks; rounds past the end pick the top
    Script(Vec<Side>),
}

impl PickStrategy {
    pub fn pick(&self, round: usize) -> Side {
        match self {
            PickStrategy::Top => Side::Top,
            PickStrategy::Bottom => Side::Bottom,
            PickStrategy::Alternate if round % 2 == 0 => Side::Top,
            PickStrategy::Alternate => Side::Bottom,
            PickStrategy::Script(picks) => picks.get(round).copied().unwrap_or(Side::Top),
        }
    }
}

impl std::str::FromStr for PickStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "top" => Ok(PickStrategy::Top),
            "bottom" => Ok(PickStrategy::Bottom),
            "alternate" => Ok(PickStrategy::Alternate),
            other => Err(format!(
                "unknown pick strategy '{}' (expected top, bottom or alternate)",
                other
            )),
        }
    }
}

/// What the autopilot saw
#[derive(Debug, Clone, Default)]
pub struct AutopilotLog {
    pub result_cards: Vec<ResultCardView>,
    pub advances: usize,
    pub final_view: Option<SessionView>,
}

/// Play until the session reaches a terminal view
///
/// `patience` bounds how long a duel may play before the vote is cast
/// anyway (a clip that never finishes must not stall the run).
pub async fn drive(
    mut views: watch::Receiver<SessionView>,
    inputs: mpsc::Sender<UserInput>,
    strategy: PickStrategy,
    patience: Duration,
) -> AutopilotLog {
    let mut log = AutopilotLog::default();
    let mut tapped = false;
    let mut voted_round: Option<usize> = None;
    let mut advanced_round: Option<usize> = None;

    loop {
        let view = views.borrow_and_update().clone();
        let mut vote_now = false;

        match &view {
            SessionView::Loading => {}
            SessionView::AuthRequired { .. } | SessionView::Error { .. } | SessionView::Complete(_) => {
                log.final_view = Some(view);
                return log;
            }
            SessionView::Instructions(instructions) => {
                if instructions.play_enabled && !tapped {
                    tapped = true;
                    debug!("Autopilot: tap play");
                    if inputs.send(UserInput::TapPlay).await.is_err() {
                        return log;
                    }
                }
            }
            SessionView::DuelPair(pair) => {
                vote_now = voted_round != Some(pair.round_index)
                    && pair.voted.is_none()
                    && pair.stage == PlaybackStage::Finished;
            }
            SessionView::ResultCard(card) => {
                if log.result_cards.last().map(|c| c.round_index) != Some(card.round_index) {
                    info!(
                        "Round {}/{}: {} beat {}",
                        card.round_index + 1,
                        card.total_rounds,
                        card.winner.moment_id,
                        card.loser.moment_id
                    );
                    log.result_cards.push(card.clone());
                }
                if card.advance_enabled && advanced_round != Some(card.round_index) {
                    advanced_round = Some(card.round_index);
                    log.advances += 1;
                    debug!("Autopilot: advance from round {}", card.round_index);
                    if inputs.send(UserInput::Advance).await.is_err() {
                        return log;
                    }
                }
            }
        }

        if !vote_now {
            match timeout(patience, views.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => {
                    // Session dropped its view sender
                    log.final_view = Some(views.borrow().clone());
                    return log;
                }
                Err(_) => {
                    // Nothing happened for a while; vote if a duel is waiting
                    let current = views.borrow().clone();
                    match current {
                        SessionView::DuelPair(pair)
                            if pair.voted.is_none() && voted_round != Some(pair.round_index) => {}
                        _ => continue,
                    }
                }
            }
        }

        let current = views.borrow().clone();
        if let SessionView::DuelPair(pair) = current {
            if voted_round == Some(pair.round_index) {
                continue;
            }
            voted_round = Some(pair.round_index);
            let side = strategy.pick(pair.round_index);
            debug!("Autopilot: swipe {} in round {}", side, pair.round_index);
            let Some(release) = scripted_swipe(side) else {
                continue;
            };
            let swipe = UserInput::Swipe { side, release };
            if inputs.send(swipe).await.is_err() {
                return log;
            }
        }
    }
}
