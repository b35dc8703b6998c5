//! Backdrop: emotion-matched background music for narrated text.
//!
//! Paragraphs are matched to the emotionally closest unused music clip,
//! the clips are stitched with crossfades into one timeline of fixed length,
//! and the result is mixed with an ambient bed.

pub mod audio;
pub mod error;
pub mod pipeline;
pub mod score;
pub mod source;
pub mod types;
