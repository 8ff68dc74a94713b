//! Scramble session: phase engine, views and the orchestrating event loop

pub mod autopilot;
pub mod engine;
pub mod orchestrator;
pub mod view;

pub use autopilot::{drive, AutopilotLog, PickStrategy};
pub use engine::{reduce, Action, EngineState, PhaseEngine, SessionFailure};
pub use orchestrator::{ScrambleSession, SessionReport, UserInput};
pub use view::{CompleteView, InstructionsView, MomentCard, ResultCardView, SessionView};
