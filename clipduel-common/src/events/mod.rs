//! Event types for ClipDuel session engines
//!
//! Provides the shared event definitions and the EventBus used to fan them
//! out to observers (logging, runners, UI adapters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{MomentId, Phase, SessionId};

/// Observable Scramble session events
///
/// Events are broadcast via EventBus and can be serialized for transport.
/// Observers never drive the session with these; they only report what the
/// session engine already did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScrambleEvent {
    /// Session created by the backend and loaded into the engine
    SessionCreated {
        session_id: SessionId,
        sport: String,
        total_rounds: usize,
        timestamp: DateTime<Utc>,
    },

    /// Session could not be created (terminal for this game instance)
    SessionFailed {
        /// Human-readable failure
        reason: String,
        /// Whether the user must sign in again
        auth_required: bool,
        timestamp: DateTime<Utc>,
    },

    /// Engine moved to a new phase
    PhaseChanged {
        session_id: SessionId,
        old_phase: Phase,
        new_phase: Phase,
        round_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// A prefetched lead asset became playable
    AssetReady {
        /// Round whose lead asset was prefetched
        round_index: usize,
        moment_id: MomentId,
        /// True when readiness was assumed after the grace period
        assumed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Duel playback handed off from the lead to the trailing clip
    PlaybackHandoff {
        round_index: usize,
        moment_id: MomentId,
        /// Whether the trailing clip was already prefetched
        preloaded: bool,
        timestamp: DateTime<Utc>,
    },

    /// A vote was recorded, with optimistic ratings attached
    WinnerDeclared {
        session_id: SessionId,
        round_index: usize,
        winner_id: MomentId,
        loser_id: MomentId,
        winner_rating_after: i32,
        loser_rating_after: i32,
        timestamp: DateTime<Utc>,
    },

    /// Backend accepted an outcome
    OutcomeSubmitted {
        session_id: SessionId,
        round_index: usize,
        completed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Backend rejected or never received an outcome (not retried)
    OutcomeSubmissionFailed {
        session_id: SessionId,
        round_index: usize,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// User advanced a session past its expiry
    SessionExpired {
        session_id: SessionId,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Every duel was played
    SessionCompleted {
        session_id: SessionId,
        rounds_played: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ScrambleEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ScrambleEvent::SessionCreated { .. } => "SessionCreated",
            ScrambleEvent::SessionFailed { .. } => "SessionFailed",
            ScrambleEvent::PhaseChanged { .. } => "PhaseChanged",
            ScrambleEvent::AssetReady { .. } => "AssetReady",
            ScrambleEvent::PlaybackHandoff { .. } => "PlaybackHandoff",
            ScrambleEvent::WinnerDeclared { .. } => "WinnerDeclared",
            ScrambleEvent::OutcomeSubmitted { .. } => "OutcomeSubmitted",
            ScrambleEvent::OutcomeSubmissionFailed { .. } => "OutcomeSubmissionFailed",
            ScrambleEvent::SessionExpired { .. } => "SessionExpired",
            ScrambleEvent::SessionCompleted { .. } => "SessionCompleted",
        }
    }
}

/// Fan-out of [`ScrambleEvent`]s to any number of observers
///
/// Backed by a tokio broadcast channel, so emitting never waits on a slow
/// observer; one that falls more than `capacity` events behind sees
/// `RecvError::Lagged` and skips ahead. Receivers only get events emitted
/// after they subscribed.
///
/// ```
/// use clipduel_common::events::{EventBus, ScrambleEvent};
///
/// let bus = EventBus::new(16);
/// let mut observer = bus.subscribe();
///
/// bus.emit_lossy(ScrambleEvent::SessionFailed {
///     reason: "offline".to_string(),
///     auth_required: false,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(observer.try_recv(), Ok(ScrambleEvent::SessionFailed { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScrambleEvent>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` events are kept per observer before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScrambleEvent> {
        self.sender.subscribe()
    }

    /// Deliver to current observers
    ///
    /// The `Ok` value is how many observers received the event; `Err` hands
    /// the event back when nobody is subscribed.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScrambleEvent,
    ) -> Result<usize, broadcast::error::SendError<ScrambleEvent>> {
        self.sender.send(event)
    }

    /// Deliver if anyone is listening; the session loop uses this
    pub fn emit_lossy(&self, event: ScrambleEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed() -> ScrambleEvent {
        ScrambleEvent::SessionFailed {
            reason: "timeout".to_string(),
            auth_required: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_observers_are_counted() {
        let bus = EventBus::new(8);
        assert_eq!(bus.capacity(), 8);
        assert_eq!(bus.subscriber_count(), 0);

        let first = bus.subscribe();
        let _second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_emit_without_observers() {
        let bus = EventBus::new(4);
        assert!(bus.emit(failed()).is_err());
        bus.emit_lossy(failed());
    }

    #[tokio::test]
    async fn test_observer_receives_events_in_order() {
        let bus = EventBus::new(4);
        let mut observer = bus.subscribe();

        assert_eq!(bus.emit(failed()).unwrap(), 1);
        bus.emit_lossy(ScrambleEvent::SessionCompleted {
            session_id: SessionId::from(3),
            rounds_played: 5,
            timestamp: Utc::now(),
        });

        assert!(matches!(
            observer.recv().await.unwrap(),
            ScrambleEvent::SessionFailed { .. }
        ));
        assert!(matches!(
            observer.recv().await.unwrap(),
            ScrambleEvent::SessionCompleted { rounds_played: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_slow_observer_lags() {
        let bus = EventBus::new(2);
        let mut observer = bus.subscribe();
        for _ in 0..3 {
            bus.emit_lossy(failed());
        }
        assert!(matches!(
            observer.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ScrambleEvent::PhaseChanged {
            session_id: SessionId::from("s1"),
            old_phase: Phase::Duel,
            new_phase: Phase::Result,
            round_index: 2,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "PhaseChanged");
        assert_eq!(json["new_phase"], "result");
        assert_eq!(event.event_type(), "PhaseChanged");
    }
}
