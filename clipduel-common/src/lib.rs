//! # ClipDuel Common Library
//!
//! Shared code for ClipDuel game-mode engines:
//! - Domain model (Moment, Duel, Session, Phase) and backend wire types
//! - Rating estimator used for optimistic result display
//! - Event types (ScrambleEvent enum) and the EventBus
//! - Configuration file resolution
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod rating;
pub mod time;

pub use error::{Error, Result};
pub use model::{Duel, Moment, MomentId, Phase, Session, SessionId};
