//! Domain model shared by ClipDuel game modes
//!
//! Two layers live here:
//! - **Wire types** (`Wire*`, `CreateSessionResponse`, ...): exactly what the
//!   backend returns. Every display field is optional so a sparse payload
//!   still deserializes.
//! - **Domain types** (`Moment`, `Duel`, `Session`): validated, immutable
//!   values the session engine reads by index.
//!
//! Conversion from wire to domain is the only place malformed duels are
//! detected. A duel missing one of its moments (or pairing a moment with
//! itself) is dropped with a warning rather than failing the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::rating::DEFAULT_RATING;
use crate::{Error, Result};

/// Identifier as the backend sends it: numeric or textual
///
/// Kept in its original shape so it serializes back unchanged when the
/// engine reports a winner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Numeric(n) => write!(f, "{}", n),
            WireId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Moment (video clip) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MomentId(pub WireId);

impl fmt::Display for MomentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for MomentId {
    fn from(id: i64) -> Self {
        MomentId(WireId::Numeric(id))
    }
}

impl From<i32> for MomentId {
    fn from(id: i32) -> Self {
        MomentId(WireId::Numeric(i64::from(id)))
    }
}

impl From<&str> for MomentId {
    fn from(id: &str) -> Self {
        MomentId(WireId::Text(id.to_string()))
    }
}

/// Scramble session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub WireId);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        SessionId(WireId::Numeric(id))
    }
}

impl From<i32> for SessionId {
    fn from(id: i32) -> Self {
        SessionId(WireId::Numeric(i64::from(id)))
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        SessionId(WireId::Text(id.to_string()))
    }
}

/// Session phase
///
/// Transitions: Instructions → Duel → Result → (Duel → Result)* → Complete.
/// Complete is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Rules screen; the first duel's lead asset preloads in the background
    Instructions,
    /// Two clips on screen, waiting for a swipe vote
    Duel,
    /// Result card for the decided duel
    Result,
    /// All duels played
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Instructions => write!(f, "instructions"),
            Phase::Duel => write!(f, "duel"),
            Phase::Result => write!(f, "result"),
            Phase::Complete => write!(f, "complete"),
        }
    }
}

// ========================================
// Wire types
// ========================================

/// Moment as returned by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireMoment {
    pub id: Option<MomentId>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Seconds into the clip at which playback hands off to the paired clip
    #[serde(alias = "trim_end_offset")]
    pub play_until: Option<f64>,
    pub elo_before: Option<f64>,
    pub elo_rating: Option<f64>,
    pub rank_before: Option<u32>,
    pub rank_after: Option<u32>,
    pub tier_before: Option<String>,
    pub tier_after: Option<String>,
    pub global_win_rate: Option<f64>,
    pub total_moments_in_category: Option<u32>,
    pub wins_vs_opponent: Option<u32>,
    pub total_matchups_vs_opponent: Option<u32>,
    pub player: Option<String>,
    pub team: Option<String>,
    pub opposition: Option<String>,
    pub competition: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// One duel of a freshly created session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireDuel {
    pub moment1: Option<WireMoment>,
    pub moment2: Option<WireMoment>,
}

/// Response of `POST /api/v1/scramble`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub duels: Vec<WireDuel>,
    #[serde(default)]
    pub total_rounds: Option<usize>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/v1/scramble/{session_id}/submit_duel`
///
/// Only the winner is reported; local rating estimates never leave the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitOutcomeRequest {
    pub session_id: SessionId,
    pub winner_id: MomentId,
    pub round_index: usize,
}

/// One row of the authoritative league table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeagueTableEntry {
    pub rank: Option<u32>,
    pub moment_id: Option<MomentId>,
    #[serde(alias = "elo_rating")]
    pub rating: Option<f64>,
    pub title: Option<String>,
    pub team: Option<String>,
}

/// Authoritative response to an outcome submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitOutcomeResponse {
    pub completed: bool,
    pub league_table_entries: Option<Vec<LeagueTableEntry>>,
}

/// Entry of the reference sports list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SportSummary {
    pub id: Option<WireId>,
    pub name: String,
    pub slug: Option<String>,
}

// ========================================
// Domain types
// ========================================

/// Descriptive fields shown on cards; any may be blank
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentDetails {
    pub player: Option<String>,
    pub team: Option<String>,
    pub opposition: Option<String>,
    pub competition: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
}

/// Head-to-head record of a moment against its current opponent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub wins: u32,
    pub matchups: u32,
}

impl HeadToHead {
    pub fn losses(&self) -> u32 {
        self.matchups.saturating_sub(self.wins)
    }
}

/// A single ranked highlight clip
///
/// `rating_after` stays `None` until the duel containing this moment is
/// decided; the decided copy is produced by [`Moment::with_estimate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    pub id: MomentId,
    pub video_url: String,
    pub thumbnail_url: Option<String>,
    pub trim_end_offset: Option<f64>,
    pub rating_before: f64,
    pub rating_after: Option<i32>,
    pub rank_before: Option<u32>,
    pub rank_after: Option<u32>,
    pub tier_before: Option<String>,
    pub tier_after: Option<String>,
    pub win_rate: Option<f64>,
    pub total_moments_in_category: Option<u32>,
    pub head_to_head: Option<HeadToHead>,
    pub details: MomentDetails,
}

impl Moment {
    /// Minimal moment, mostly useful for fixtures
    pub fn new(id: impl Into<MomentId>, video_url: impl Into<String>, rating_before: f64) -> Self {
        Self {
            id: id.into(),
            video_url: video_url.into(),
            thumbnail_url: None,
            trim_end_offset: None,
            rating_before,
            rating_after: None,
            rank_before: None,
            rank_after: None,
            tier_before: None,
            tier_after: None,
            win_rate: None,
            total_moments_in_category: None,
            head_to_head: None,
            details: MomentDetails::default(),
        }
    }

    /// Copy of this moment carrying a post-duel rating
    pub fn with_estimate(&self, rating_after: i32) -> Moment {
        Moment {
            rating_after: Some(rating_after),
            ..self.clone()
        }
    }

    /// Image shown on a surface whose clip has not been loaded yet
    ///
    /// Falls back to the first second of the clip itself.
    pub fn placeholder_url(&self) -> String {
        match &self.thumbnail_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}#t=1", self.video_url),
        }
    }

    /// Rating change, once the duel is decided
    pub fn rating_delta(&self) -> Option<i32> {
        self.rating_after
            .map(|after| after - self.rating_before.round() as i32)
    }

    /// Places gained (positive) or lost (negative)
    pub fn rank_change(&self) -> i64 {
        i64::from(self.rank_before.unwrap_or(0)) - i64::from(self.rank_after.unwrap_or(0))
    }

    pub fn current_rank(&self) -> Option<u32> {
        self.rank_after.or(self.rank_before)
    }

    pub fn tier_label(&self) -> &str {
        self.tier_after
            .as_deref()
            .or(self.tier_before.as_deref())
            .unwrap_or("N/A")
    }

    pub fn win_rate_percent(&self) -> u32 {
        (self.win_rate.unwrap_or(0.0) * 100.0).round().max(0.0) as u32
    }
}

impl TryFrom<WireMoment> for Moment {
    type Error = Error;

    fn try_from(wire: WireMoment) -> Result<Self> {
        let id = wire
            .id
            .ok_or_else(|| Error::InvalidInput("moment without id".to_string()))?;
        let video_url = match wire.video_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "moment {} has no video url",
                    id
                )))
            }
        };
        let head_to_head = wire.wins_vs_opponent.map(|wins| HeadToHead {
            wins,
            matchups: wire.total_matchups_vs_opponent.unwrap_or(1).max(wins),
        });

        Ok(Self {
            id,
            video_url,
            thumbnail_url: wire.thumbnail_url,
            trim_end_offset: wire.play_until.filter(|secs| *secs > 0.0),
            rating_before: wire.elo_before.or(wire.elo_rating).unwrap_or(DEFAULT_RATING),
            rating_after: None,
            rank_before: wire.rank_before,
            rank_after: wire.rank_after,
            tier_before: wire.tier_before,
            tier_after: wire.tier_after,
            win_rate: wire.global_win_rate,
            total_moments_in_category: wire.total_moments_in_category,
            head_to_head,
            details: MomentDetails {
                player: wire.player,
                team: wire.team,
                opposition: wire.opposition,
                competition: wire.competition,
                title: wire.title,
                summary: wire.summary,
            },
        })
    }
}

/// One round's pairing of two distinct moments
///
/// `top` plays first (lead asset), `bottom` second (trailing asset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duel {
    round_index: usize,
    top: Moment,
    bottom: Moment,
}

impl Duel {
    /// Pair two moments; rejects a moment duelling itself
    pub fn new(round_index: usize, top: Moment, bottom: Moment) -> Result<Self> {
        if top.id == bottom.id {
            return Err(Error::InvalidInput(format!(
                "duel {} pairs moment {} with itself",
                round_index, top.id
            )));
        }
        Ok(Self {
            round_index,
            top,
            bottom,
        })
    }

    /// Round index the backend knows this duel by
    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn top(&self) -> &Moment {
        &self.top
    }

    pub fn bottom(&self) -> &Moment {
        &self.bottom
    }
}

/// A created Scramble session: immutable ordered duels
///
/// The current round lives in the session engine's state, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub sport: String,
    duels: Vec<Duel>,
    pub total_rounds: usize,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        id: SessionId,
        sport: impl Into<String>,
        duels: Vec<Duel>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let total_rounds = duels.len();
        Self {
            id,
            sport: sport.into(),
            duels,
            total_rounds,
            expires_at,
        }
    }

    /// Build a session from the create-session response
    ///
    /// Malformed duels are skipped; surviving duels keep the round index the
    /// backend assigned so submissions stay aligned.
    pub fn from_response(response: CreateSessionResponse) -> Self {
        let mut duels = Vec::with_capacity(response.duels.len());
        for (round_index, wire) in response.duels.into_iter().enumerate() {
            match convert_duel(round_index, wire) {
                Ok(duel) => duels.push(duel),
                Err(e) => warn!(
                    "Skipping malformed duel {} in session {}: {}",
                    round_index, response.session_id, e
                ),
            }
        }

        let total_rounds = response.total_rounds.unwrap_or(duels.len());
        if total_rounds != duels.len() {
            warn!(
                "Session {} announced {} rounds but {} duels are playable",
                response.session_id,
                total_rounds,
                duels.len()
            );
        }

        Self {
            id: response.session_id,
            sport: response.sport.unwrap_or_default(),
            duels,
            total_rounds,
            expires_at: response.expires_at,
        }
    }

    pub fn duels(&self) -> &[Duel] {
        &self.duels
    }

    pub fn duel(&self, index: usize) -> Option<&Duel> {
        self.duels.get(index)
    }

    pub fn len(&self) -> usize {
        self.duels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duels.is_empty()
    }
}

fn convert_duel(round_index: usize, wire: WireDuel) -> Result<Duel> {
    let top = wire
        .moment1
        .ok_or_else(|| Error::InvalidInput("missing moment1".to_string()))?;
    let bottom = wire
        .moment2
        .ok_or_else(|| Error::InvalidInput("missing moment2".to_string()))?;
    Duel::new(round_index, top.try_into()?, bottom.try_into()?)
}
