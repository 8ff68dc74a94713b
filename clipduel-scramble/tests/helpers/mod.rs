//! Shared fixtures for clipduel-scramble integration tests
//!
//! - [`SpyBackend`]: scripted [`ScrambleBackend`] that records submissions
//! - [`RecordingHaptics`]: records every impact in order
//! - fixture builders for create-session responses

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use clipduel_common::model::{
    CreateSessionResponse, LeagueTableEntry, SportSummary, SubmitOutcomeResponse, WireDuel,
    WireMoment,
};
use clipduel_common::{MomentId, SessionId};
use clipduel_scramble::api::ScrambleBackend;
use clipduel_scramble::config::ScrambleConfig;
use clipduel_scramble::duel::{Haptics, ImpactStyle};
use clipduel_scramble::media::{ClipProfile, LoadBehavior};
use clipduel_scramble::{Error, Result};

/// Submission as seen by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSubmission {
    pub session_id: SessionId,
    pub winner_id: MomentId,
    pub round_index: usize,
}

/// How `create_session` answers
#[derive(Debug, Clone)]
pub enum CreateBehavior {
    Succeed(CreateSessionResponse),
    Unauthorized,
    ServerError,
}

struct SpyState {
    create: CreateBehavior,
    create_calls: Vec<Option<String>>,
    submissions: Vec<RecordedSubmission>,
    /// Rounds whose submission is refused
    failing_rounds: Vec<usize>,
    submit_delay: Duration,
    league_tables: VecDeque<Vec<LeagueTableEntry>>,
}

/// Scripted backend
#[derive(Clone)]
pub struct SpyBackend {
    state: Arc<Mutex<SpyState>>,
}

impl SpyBackend {
    pub fn new(create: CreateBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(SpyState {
                create,
                create_calls: Vec::new(),
                submissions: Vec::new(),
                failing_rounds: Vec::new(),
                submit_delay: Duration::from_millis(50),
                league_tables: VecDeque::new(),
            })),
        }
    }

    pub fn with_session(response: CreateSessionResponse) -> Self {
        Self::new(CreateBehavior::Succeed(response))
    }

    /// Refuse the submission for `round_index`
    pub fn fail_round(&self, round_index: usize) {
        self.state.lock().unwrap().failing_rounds.push(round_index);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.state.lock().unwrap().submit_delay = delay;
    }

    /// Queue a league table returned by the next accepted submission
    pub fn push_league_table(&self, entries: Vec<LeagueTableEntry>) {
        self.state.lock().unwrap().league_tables.push_back(entries);
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn create_calls(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().create_calls.clone()
    }
}

#[async_trait]
impl ScrambleBackend for SpyBackend {
    async fn create_session(&self, sport: Option<&str>) -> Result<CreateSessionResponse> {
        let create = {
            let mut state = self.state.lock().unwrap();
            state.create_calls.push(sport.map(str::to_string));
            state.create.clone()
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        match create {
            CreateBehavior::Succeed(response) => Ok(response),
            CreateBehavior::Unauthorized => Err(Error::Unauthorized("token expired".to_string())),
            CreateBehavior::ServerError => Err(Error::Backend {
                status: 500,
                message: "database unavailable".to_string(),
            }),
        }
    }

    async fn submit_outcome(
        &self,
        session_id: &SessionId,
        winner_id: &MomentId,
        round_index: usize,
    ) -> Result<SubmitOutcomeResponse> {
        let (delay, fails) = {
            let mut state = self.state.lock().unwrap();
            state.submissions.push(RecordedSubmission {
                session_id: session_id.clone(),
                winner_id: winner_id.clone(),
                round_index,
            });
            (state.submit_delay, state.failing_rounds.contains(&round_index))
        };
        tokio::time::sleep(delay).await;

        if fails {
            return Err(Error::Backend {
                status: 422,
                message: format!("round {} rejected", round_index),
            });
        }
        let league_table_entries = self.state.lock().unwrap().league_tables.pop_front();
        Ok(SubmitOutcomeResponse {
            completed: false,
            league_table_entries,
        })
    }

    async fn fetch_sports(&self) -> Result<Vec<SportSummary>> {
        Ok(vec![SportSummary {
            id: None,
            name: "Football".to_string(),
            slug: Some("football".to_string()),
        }])
    }
}

/// Haptics that remember every impact
#[derive(Clone, Default)]
pub struct RecordingHaptics {
    impacts: Arc<Mutex<Vec<ImpactStyle>>>,
}

impl RecordingHaptics {
    pub fn impacts(&self) -> Vec<ImpactStyle> {
        self.impacts.lock().unwrap().clone()
    }
}

impl Haptics for RecordingHaptics {
    fn impact(&self, style: ImpactStyle) {
        self.impacts.lock().unwrap().push(style);
    }
}

/// URL of a fixture moment's clip
pub fn clip_url(id: i64) -> String {
    format!("https://cdn.example/clips/{}.mp4", id)
}

pub fn wire_moment(id: i64, rating: f64) -> WireMoment {
    WireMoment {
        id: Some(MomentId::from(id)),
        video_url: Some(clip_url(id)),
        thumbnail_url: Some(format!("https://cdn.example/thumbs/{}.jpg", id)),
        elo_before: Some(rating),
        title: Some(format!("Moment {}", id)),
        ..WireMoment::default()
    }
}

/// Session whose duel `n` pairs moments `10n+1` (top) and `10n+2` (bottom)
pub fn session_response(session_id: i64, duels: usize) -> CreateSessionResponse {
    session_response_expiring(session_id, duels, None)
}

pub fn session_response_expiring(
    session_id: i64,
    duels: usize,
    expires_at: Option<DateTime<Utc>>,
) -> CreateSessionResponse {
    CreateSessionResponse {
        session_id: SessionId::from(session_id),
        sport: Some("football".to_string()),
        duels: (0..duels)
            .map(|n| {
                let base = 10 * n as i64;
                WireDuel {
                    moment1: Some(wire_moment(base + 1, 1500.0)),
                    moment2: Some(wire_moment(base + 2, 1500.0)),
                }
            })
            .collect(),
        total_rounds: Some(duels),
        expires_at,
    }
}

pub fn top_id(round: usize) -> MomentId {
    MomentId::from(10 * round as i64 + 1)
}

pub fn bottom_id(round: usize) -> MomentId {
    MomentId::from(10 * round as i64 + 2)
}

/// Fast clips for session runs
pub fn quick_clip() -> ClipProfile {
    ClipProfile {
        load_latency: Duration::from_millis(200),
        duration: Duration::from_secs(2),
        behavior: LoadBehavior::Ready,
    }
}

/// Defaults with a short fade so paused-clock runs stay brief
pub fn test_config() -> ScrambleConfig {
    let mut config = ScrambleConfig::default();
    config.duel.fade_out_ms = 300;
    config.prefetch.readiness_grace_ms = 500;
    config.prefetch.trailing_timeout_ms = 1_000;
    config
}
