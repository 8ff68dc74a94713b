//! # ClipDuel Scramble Engine (clipduel-scramble)
//!
//! Session engine for the Scramble game mode: a sequence of swipe-voted
//! video duels.
//!
//! **Purpose:** Create a session, play each duel's two clips back to back,
//! record the swipe vote with an optimistic rating estimate, and submit the
//! outcome to the backend without blocking the next round.
//!
//! **Architecture:** One cooperative event loop ([`session::ScrambleSession`])
//! owns a pure phase reducer ([`session::PhaseEngine`]); media readiness and
//! duel outcomes arrive as tagged messages on channels, so late callbacks
//! from superseded rounds resolve to no-ops.

pub mod api;
pub mod config;
pub mod duel;
pub mod error;
pub mod media;
pub mod prefetch;
pub mod session;

pub use error::{Error, Result};
