//! Backend collaborator
//!
//! The backend owns the authoritative ranking. The engine only consumes it:
//! one round trip to create a session, one fire-and-forget submission per
//! decided duel, and the reference sports list for the runner.

mod client;

pub use client::{ApiContext, HttpBackend};

use async_trait::async_trait;

use clipduel_common::model::{CreateSessionResponse, SportSummary, SubmitOutcomeResponse};
use clipduel_common::{MomentId, SessionId};

use crate::Result;

/// Operations the Scramble engine needs from the backend
#[async_trait]
pub trait ScrambleBackend: Send + Sync {
    /// Create a session, optionally restricted to one sport
    async fn create_session(&self, sport: Option<&str>) -> Result<CreateSessionResponse>;

    /// Report the winner of one round; never carries local estimates
    async fn submit_outcome(
        &self,
        session_id: &SessionId,
        winner_id: &MomentId,
        round_index: usize,
    ) -> Result<SubmitOutcomeResponse>;

    /// Reference list of sports a session can be restricted to
    async fn fetch_sports(&self) -> Result<Vec<SportSummary>>;
}
