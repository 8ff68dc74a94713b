//! Haptic feedback seam
//!
//! The engine only decides *when* to pulse; the embedding platform decides
//! how. The headless runner logs pulses instead.

use tracing::debug;

/// Strength of a haptic pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactStyle {
    Light,
    Medium,
}

pub trait Haptics: Send + Sync {
    fn impact(&self, style: ImpactStyle);
}

/// Haptics for platforms without a motor
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHaptics;

impl Haptics for TracingHaptics {
    fn impact(&self, style: ImpactStyle) {
        debug!("Haptic impact: {:?}", style);
    }
}
