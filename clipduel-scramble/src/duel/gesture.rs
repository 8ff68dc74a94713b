//! Swipe recognition for a duel surface
//!
//! A surface follows the finger at `1 / friction` of its travel. Releasing
//! past `distance` (surface pixels, either direction) opens the surface,
//! which is what counts as a vote. A fast fling opens it from half way.

/// Swipe completion thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeThresholds {
    /// Surface offset that completes a swipe
    pub distance: f64,
    /// Finger travel per pixel of surface offset
    pub friction: f64,
    /// Release speed (finger px/s) that completes a half-distance swipe
    pub velocity: f64,
}

impl Default for SwipeThresholds {
    fn default() -> Self {
        Self {
            distance: 50.0,
            friction: 2.0,
            velocity: 800.0,
        }
    }
}

/// Direction a surface was swiped open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Left,
    Right,
}

/// Finger lifted from a surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeRelease {
    /// Horizontal finger travel since press (px)
    pub translation_x: f64,
    /// Horizontal finger speed at release (px/s)
    pub velocity_x: f64,
}

impl SwipeRelease {
    /// A deliberate, slow swipe of `translation_x` finger pixels
    pub fn drag(translation_x: f64) -> Self {
        Self {
            translation_x,
            velocity_x: 0.0,
        }
    }
}

impl SwipeThresholds {
    /// Surface offset for a given finger travel
    pub fn offset(&self, translation_x: f64) -> f64 {
        if self.friction > 0.0 {
            translation_x / self.friction
        } else {
            translation_x
        }
    }

    /// Whether a release opens the surface, and which way
    pub fn evaluate(&self, release: SwipeRelease) -> Option<SwipeDirection> {
        let offset = self.offset(release.translation_x);
        let magnitude = offset.abs();
        if magnitude == 0.0 {
            return None;
        }

        let flung = release.velocity_x.abs() >= self.velocity
            && release.velocity_x.signum() == offset.signum()
            && magnitude >= self.distance / 2.0;

        if magnitude >= self.distance || flung {
            Some(if offset > 0.0 {
                SwipeDirection::Right
            } else {
                SwipeDirection::Left
            })
        } else {
            None
        }
    }
}

/// Press/drag/release tracking for one pointer on one surface
#[derive(Debug, Clone, Default)]
pub struct SwipeTracker {
    start_x: Option<f64>,
    current_x: f64,
}

impl SwipeTracker {
    pub fn press(&mut self, x: f64) {
        self.start_x = Some(x);
        self.current_x = x;
    }

    pub fn drag(&mut self, x: f64) {
        if self.start_x.is_some() {
            self.current_x = x;
        }
    }

    /// Finish the gesture; `None` if there was no press
    pub fn release(&mut self, velocity_x: f64) -> Option<SwipeRelease> {
        let start = self.start_x.take()?;
        Some(SwipeRelease {
            translation_x: self.current_x - start,
            velocity_x,
        })
    }

    /// Pointer cancelled (e.g. captured by the system)
    pub fn cancel(&mut self) {
        self.start_x = None;
    }
}
