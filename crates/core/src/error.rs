//! Error types for clip loading and configuration, plus the reasons a
//! paragraph can end up without music.

use serde::Serialize;
use thiserror::Error;

/// Failure to materialize a clip's audio.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("no audio found for clip '{0}'")]
    NotFound(String),
    #[error("clip '{0}' decoded to zero samples")]
    Empty(String),
    #[error("failed to decode clip '{id}': {message}")]
    Decode { id: String, message: String },
    #[error("clip id '{0}' is not a plain file name")]
    InvalidId(String),
}

/// Rejected render parameters.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} volume must be >= 0, got {value}")]
    NegativeVolume { name: &'static str, value: f64 },
    #[error("{name} volume must be finite, got {value}")]
    NonFiniteVolume { name: &'static str, value: f64 },
    #[error("sample rate must be at least {min} Hz, got {rate}")]
    SampleRateTooLow { rate: u32, min: u32 },
    #[error("total duration must be positive")]
    ZeroDuration,
}

/// Why a paragraph received no segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Every clip in the library is already used.
    #[error("no unused clip left")]
    NoCandidate,
    /// The matched clip has no backing audio.
    #[error("clip '{clip_id}' is unavailable")]
    ClipUnavailable { clip_id: String },
}
