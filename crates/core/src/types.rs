//! Emotion descriptors for paragraphs and clips, the clip library, and the
//! per-paragraph planning records written to the manifest.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SkipReason;

/// A point in valence/arousal space. No range is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionPoint {
    pub valence: f64,
    pub arousal: f64,
}

impl EmotionPoint {
    pub fn new(valence: f64, arousal: f64) -> Self {
        Self { valence, arousal }
    }

    /// Euclidean distance between two points.
    pub fn distance(&self, other: &EmotionPoint) -> f64 {
        ((self.valence - other.valence).powi(2) + (self.arousal - other.arousal).powi(2)).sqrt()
    }
}

/// Emotion tag for one music clip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MusicClipMeta {
    /// Unique key; also the clip's file name inside the music directory.
    pub id: String,
    pub emotion: EmotionPoint,
}

/// All known clips, keyed by id, in insertion order.
///
/// Insertion order is what the matcher walks, so equal-distance ties
/// resolve the same way on every run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipLibrary {
    clips: Vec<MusicClipMeta>,
}

impl ClipLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clip. Fails if the id is already present.
    pub fn insert(&mut self, id: impl Into<String>, emotion: EmotionPoint) -> Result<()> {
        let id = id.into();
        if self.contains(&id) {
            bail!("Duplicate clip id in library: {}", id);
        }
        self.clips.push(MusicClipMeta { id, emotion });
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&MusicClipMeta> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MusicClipMeta> {
        self.clips.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.clips.iter().map(|c| c.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Parse `{"clip.wav": {"valence": v, "arousal": a, ...}, ...}`.
    ///
    /// Document order is kept. Extra keys per entry are ignored.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).context("Music library must be a JSON object")?;
        let mut library = Self::new();
        for (id, value) in map {
            let emotion: EmotionPoint = serde_json::from_value(value)
                .with_context(|| format!("Invalid emotion values for clip '{}'", id))?;
            library.insert(id, emotion)?;
        }
        Ok(library)
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read music library: {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Failed to parse music library: {}", path.display()))
    }
}

/// Fractional position of a paragraph within the whole text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proportion {
    pub start: f64,
    pub end: f64,
}

/// One paragraph of the narrated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphSpec {
    #[serde(rename = "emotions")]
    pub emotion: EmotionPoint,
    pub proportion: Proportion,
}

impl ParagraphSpec {
    pub fn new(valence: f64, arousal: f64, start: f64, end: f64) -> Self {
        Self {
            emotion: EmotionPoint::new(valence, arousal),
            proportion: Proportion { start, end },
        }
    }

    /// True when `0 <= start < end <= 1`.
    pub fn is_well_formed(&self) -> bool {
        let Proportion { start, end } = self.proportion;
        (0.0..=1.0).contains(&start) && (0.0..=1.0).contains(&end) && start < end
    }
}

/// Emotion-annotated text: `{"paragraphs": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEmotions {
    pub paragraphs: Vec<ParagraphSpec>,
}

impl TextEmotions {
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read text emotions: {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse text emotions: {}", path.display()))?;
        for (i, p) in parsed.paragraphs.iter().enumerate() {
            if !p.is_well_formed() {
                log::warn!(
                    "Paragraph {} has unusual proportion [{}, {})",
                    i + 1,
                    p.proportion.start,
                    p.proportion.end
                );
            }
        }
        Ok(parsed)
    }
}

/// A clip chosen for one paragraph, with the length it must fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentAssignment {
    pub clip_id: String,
    pub planned_duration_ms: u64,
}

/// Clip ids already consumed in one planning pass. Only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedClips(HashSet<String>);

impl UsedClips {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    /// Record `id`; returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        self.0.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What happened to one paragraph during planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParagraphOutcome {
    Assigned {
        index: usize,
        #[serde(flatten)]
        assignment: SegmentAssignment,
    },
    Skipped {
        index: usize,
        planned_duration_ms: u64,
        #[serde(flatten)]
        reason: SkipReason,
    },
}

impl ParagraphOutcome {
    pub fn assignment(&self) -> Option<&SegmentAssignment> {
        match self {
            ParagraphOutcome::Assigned { assignment, .. } => Some(assignment),
            ParagraphOutcome::Skipped { .. } => None,
        }
    }
}
