//! Duel presentation: two swipeable surfaces, sequenced playback, one vote

pub mod controller;
pub mod gesture;
pub mod haptics;

pub use controller::{
    DuelContext, DuelController, DuelPairView, DuelSettings, DuelSignal, PlaybackStage, Side,
    SurfaceView,
};
pub use gesture::{SwipeDirection, SwipeRelease, SwipeThresholds, SwipeTracker};
pub use haptics::{Haptics, ImpactStyle, TracingHaptics};
