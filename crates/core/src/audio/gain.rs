//! Volume multipliers and their decibel form.

use std::fmt;

use serde::Serialize;

/// Amplitude change applied to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "db", rename_all = "lowercase")]
pub enum Gain {
    /// Change in decibels; 0 dB leaves samples untouched.
    Db(f64),
    /// Silence every sample.
    Mute,
}

impl Gain {
    /// Linear amplitude factor.
    pub fn factor(&self) -> f64 {
        match *self {
            Gain::Db(db) => 10.0f64.powf(db / 20.0),
            Gain::Mute => 0.0,
        }
    }
}

impl fmt::Display for Gain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gain::Db(db) => write!(f, "{:.1}dB", db),
            Gain::Mute => write!(f, "muted"),
        }
    }
}

/// A linear volume multiplier: 1.0 keeps the original level, 2.0 is about
/// +6 dB, 0.5 about -6 dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Volume(pub f64);

impl Volume {
    pub const UNITY: Volume = Volume(1.0);

    /// Convert to a gain via `20 * log10(v)`.
    ///
    /// `log10(0)` has no finite value, so any multiplier at or below zero
    /// maps to [`Gain::Mute`]. Negative multipliers are rejected earlier by
    /// configuration validation.
    pub fn gain(&self) -> Gain {
        if self.0 <= 0.0 {
            Gain::Mute
        } else {
            Gain::Db(20.0 * self.0.log10())
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::UNITY
    }
}
