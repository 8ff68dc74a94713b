//! Renderable views derived from engine state
//!
//! Views are plain data; every optional display field degrades to a blank
//! label instead of failing the render.

use clipduel_common::model::{HeadToHead, LeagueTableEntry};
use clipduel_common::{Moment, MomentId, Phase};

use super::engine::EngineState;
use crate::duel::DuelPairView;

/// What the session currently shows
#[derive(Debug, Clone, PartialEq)]
pub enum SessionView {
    /// Session is being created
    Loading,
    /// Session creation was refused for lack of valid credentials
    AuthRequired { reason: String },
    /// Session creation failed for any other reason
    Error { message: String },
    Instructions(InstructionsView),
    DuelPair(DuelPairView),
    ResultCard(ResultCardView),
    Complete(CompleteView),
}

impl SessionView {
    /// Project engine state (plus the mounted duel's own view) into a view
    pub fn project(
        state: &EngineState,
        duel: Option<DuelPairView>,
        league_table: &[LeagueTableEntry],
    ) -> Self {
        if state.loading {
            return SessionView::Loading;
        }
        if let Some(failure) = &state.failure {
            return if failure.auth_required {
                SessionView::AuthRequired {
                    reason: failure.reason.clone(),
                }
            } else {
                SessionView::Error {
                    message: failure.reason.clone(),
                }
            };
        }
        if state.is_complete() {
            return SessionView::Complete(CompleteView {
                rounds_played: if state.phase == Phase::Complete {
                    state.round_index + 1
                } else {
                    0
                },
                league_table: league_table.to_vec(),
            });
        }

        match state.phase {
            Phase::Instructions => SessionView::Instructions(InstructionsView {
                sport: state
                    .session
                    .as_ref()
                    .map(|s| s.sport.clone())
                    .unwrap_or_default(),
                total_rounds: state.duel_count(),
                play_enabled: state.current_pair.is_some() && state.next_asset_ready,
            }),
            Phase::Duel => match duel {
                Some(view) => SessionView::DuelPair(view),
                None => SessionView::Loading,
            },
            Phase::Result => match (&state.winner, &state.loser) {
                (Some(winner), Some(loser)) => SessionView::ResultCard(ResultCardView {
                    round_index: state.round_index,
                    total_rounds: state.duel_count(),
                    winner: MomentCard::from_moment(winner),
                    loser: MomentCard::from_moment(loser),
                    showcase_url: winner.video_url.clone(),
                    advance_enabled: state.next_asset_ready,
                    is_last_round: !state.has_next_round(),
                }),
                _ => SessionView::Loading,
            },
            Phase::Complete => SessionView::Complete(CompleteView {
                rounds_played: state.round_index + 1,
                league_table: league_table.to_vec(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionView::Loading => "loading",
            SessionView::AuthRequired { .. } => "auth-required",
            SessionView::Error { .. } => "error",
            SessionView::Instructions(_) => "instructions",
            SessionView::DuelPair(_) => "duel",
            SessionView::ResultCard(_) => "result",
            SessionView::Complete(_) => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionsView {
    pub sport: String,
    pub total_rounds: usize,
    /// A first duel exists and its lead clip is decoded
    pub play_enabled: bool,
}

/// One side of the result card
#[derive(Debug, Clone, PartialEq)]
pub struct MomentCard {
    pub moment_id: MomentId,
    pub title: String,
    pub player: String,
    pub team: String,
    pub opposition: String,
    pub competition: String,
    pub rating_before: i32,
    pub rating_after: Option<i32>,
    pub rating_delta: Option<i32>,
    /// Places gained (positive) or lost (negative)
    pub rank_change: i64,
    pub current_rank: Option<u32>,
    pub total_in_category: Option<u32>,
    pub tier: String,
    pub win_rate_percent: u32,
    pub head_to_head: Option<HeadToHead>,
}

impl MomentCard {
    pub fn from_moment(moment: &Moment) -> Self {
        let label = |field: &Option<String>| field.clone().unwrap_or_default();
        Self {
            moment_id: moment.id.clone(),
            title: label(&moment.details.title),
            player: label(&moment.details.player),
            team: label(&moment.details.team),
            opposition: label(&moment.details.opposition),
            competition: label(&moment.details.competition),
            rating_before: moment.rating_before.round() as i32,
            rating_after: moment.rating_after,
            rating_delta: moment.rating_delta(),
            rank_change: moment.rank_change(),
            current_rank: moment.current_rank(),
            total_in_category: moment.total_moments_in_category,
            tier: moment.tier_label().to_string(),
            win_rate_percent: moment.win_rate_percent(),
            head_to_head: moment.head_to_head,
        }
    }

    /// "1234/5678" style rank label, blank when unranked
    pub fn rank_label(&self) -> String {
        match self.current_rank {
            Some(rank) => format!("{}/{}", rank, self.total_in_category.unwrap_or(1)),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultCardView {
    pub round_index: usize,
    pub total_rounds: usize,
    pub winner: MomentCard,
    pub loser: MomentCard,
    /// Winner clip, replayed on loop behind the card
    pub showcase_url: String,
    /// Next round's lead clip is decoded (or there is no next round)
    pub advance_enabled: bool,
    pub is_last_round: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompleteView {
    pub rounds_played: usize,
    /// Latest authoritative table from the backend, if it sent one
    pub league_table: Vec<LeagueTableEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::engine::{reduce, Action};
    use clipduel_common::model::MomentDetails;
    use clipduel_common::{Duel, Session, SessionId};
    use std::sync::Arc;

    fn one_duel_state() -> EngineState {
        let mut top = Moment::new(1, "clip-1", 1500.0);
        top.details = MomentDetails {
            player: Some("Keeper".to_string()),
            ..MomentDetails::default()
        };
        top.rank_before = Some(12);
        top.rank_after = Some(9);
        top.total_moments_in_category = Some(40);
        top.win_rate = Some(0.625);
        let bottom = Moment::new(2, "clip-2", 1500.0);
        let session = Session::new(
            SessionId::from(7),
            "",
            vec![Duel::new(0, top, bottom).unwrap()],
            None,
        );
        reduce(&EngineState::default(), &Action::InitSession(Arc::new(session))).unwrap()
    }

    #[test]
    fn test_loading_and_failures() {
        assert_eq!(
            SessionView::project(&EngineState::default(), None, &[]),
            SessionView::Loading
        );

        let failed = reduce(
            &EngineState::default(),
            &Action::SessionFailed {
                reason: "token expired".to_string(),
                auth_required: true,
            },
        )
        .unwrap();
        assert_eq!(
            SessionView::project(&failed, None, &[]),
            SessionView::AuthRequired {
                reason: "token expired".to_string()
            }
        );
    }

    #[test]
    fn test_result_card_degrades_to_blank_labels() {
        let mut state = one_duel_state();
        state = reduce(&state, &Action::TapPlay).unwrap();
        let pair = state.current_pair.clone().unwrap();
        state = reduce(
            &state,
            &Action::DeclareWinner {
                winner: pair.top().with_estimate(1510),
                loser: pair.bottom().with_estimate(1490),
            },
        )
        .unwrap();
        state = reduce(&state, &Action::ShowResult).unwrap();

        let SessionView::ResultCard(card) = SessionView::project(&state, None, &[]) else {
            panic!("expected result card");
        };
        assert!(card.advance_enabled);
        assert!(card.is_last_round);
        assert_eq!(card.showcase_url, "clip-1");

        assert_eq!(card.winner.player, "Keeper");
        assert_eq!(card.winner.team, "");
        assert_eq!(card.winner.rating_delta, Some(10));
        assert_eq!(card.winner.rank_change, 3);
        assert_eq!(card.winner.rank_label(), "9/40");
        assert_eq!(card.winner.win_rate_percent, 63);
        assert_eq!(card.winner.tier, "N/A");

        assert_eq!(card.loser.rating_delta, Some(-10));
        assert_eq!(card.loser.rank_label(), "");
    }

    #[test]
    fn test_play_enabled_once_first_lead_is_ready() {
        let state = one_duel_state();
        let SessionView::Instructions(waiting) = SessionView::project(&state, None, &[]) else {
            panic!("expected instructions");
        };
        assert!(!waiting.play_enabled);
        assert_eq!(waiting.total_rounds, 1);

        let ready = reduce(&state, &Action::AssetReady { round_index: 0 }).unwrap();
        let SessionView::Instructions(ready) = SessionView::project(&ready, None, &[]) else {
            panic!("expected instructions");
        };
        assert!(ready.play_enabled);
    }

    #[test]
    fn test_duel_without_mounted_pair_renders_loading() {
        let state = reduce(&one_duel_state(), &Action::TapPlay).unwrap();
        assert_eq!(SessionView::project(&state, None, &[]), SessionView::Loading);
    }
}
