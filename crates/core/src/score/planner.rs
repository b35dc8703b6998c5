//! Turn paragraphs into an ordered list of clip assignments.
//!
//! Each paragraph gets a duration proportional to its share of the text.
//! Every paragraph after the first is lengthened by the crossfade, since
//! joining it to its predecessor later overlaps that much audio.

use serde::Serialize;

use crate::error::{ClipError, SkipReason};
use crate::score::matcher::find_closest;
use crate::types::{ClipLibrary, ParagraphOutcome, ParagraphSpec, SegmentAssignment, UsedClips};

/// What to do when the matched clip has no audio behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableClipPolicy {
    /// Skip the paragraph. The clip is not marked used, so a later
    /// paragraph may match it (and be skipped) again.
    #[default]
    Skip,
    /// Drop the clip from consideration for the rest of the run and match
    /// the same paragraph against the next-closest clip.
    Retry,
}

/// Result of one planning pass.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// One entry per input paragraph, in paragraph order.
    pub outcomes: Vec<ParagraphOutcome>,
    /// Clips consumed by the assignments.
    pub used: UsedClips,
}

impl Plan {
    /// Assignments in timeline order, skipped paragraphs left out.
    pub fn assignments(&self) -> Vec<SegmentAssignment> {
        self.outcomes
            .iter()
            .filter_map(|o| o.assignment().cloned())
            .collect()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.assignment().is_none())
            .count()
    }
}

/// Planned length of paragraph `index` in milliseconds.
///
/// `round((end - start) * total)`, plus `crossfade_ms` for every paragraph
/// but the first. Inverted proportions clamp to zero.
pub fn planned_duration_ms(
    paragraph: &ParagraphSpec,
    index: usize,
    total_duration_ms: u64,
    crossfade_ms: u64,
) -> u64 {
    let share = paragraph.proportion.end - paragraph.proportion.start;
    let raw = (share * total_duration_ms as f64).round().max(0.0) as u64;
    if index > 0 {
        raw + crossfade_ms
    } else {
        raw
    }
}

/// Greedily assign the closest unused clip to every paragraph.
///
/// `load` is called on each matched clip before it is committed and should
/// actually decode it, so any clip that cannot be loaded is handled by
/// `policy` instead of surfacing later as a gap in the timeline.
pub fn plan(
    paragraphs: &[ParagraphSpec],
    library: &ClipLibrary,
    mut load: impl FnMut(&str) -> Result<(), ClipError>,
    total_duration_ms: u64,
    crossfade_ms: u64,
    policy: UnavailableClipPolicy,
) -> Plan {
    let mut used = UsedClips::new();
    // used plus clips written off under the retry policy
    let mut excluded = UsedClips::new();
    let mut outcomes = Vec::with_capacity(paragraphs.len());

    for (i, paragraph) in paragraphs.iter().enumerate() {
        let duration = planned_duration_ms(paragraph, i, total_duration_ms, crossfade_ms);
        log::info!(
            "Paragraph {}: duration {:.2}s (including crossfade compensation)",
            i + 1,
            duration as f64 / 1000.0
        );

        let outcome = loop {
            let Some(id) = find_closest(&paragraph.emotion, library, &excluded) else {
                log::warn!("Paragraph {}: no unused clip left, skipping", i + 1);
                break ParagraphOutcome::Skipped {
                    index: i,
                    planned_duration_ms: duration,
                    reason: SkipReason::NoCandidate,
                };
            };

            let err = match load(id) {
                Ok(()) => {
                    used.insert(id);
                    excluded.insert(id);
                    log::info!("Paragraph {}: selected {}", i + 1, id);
                    break ParagraphOutcome::Assigned {
                        index: i,
                        assignment: SegmentAssignment {
                            clip_id: id.to_string(),
                            planned_duration_ms: duration,
                        },
                    };
                }
                Err(err) => err,
            };

            match policy {
                UnavailableClipPolicy::Skip => {
                    log::warn!("Paragraph {}: {}, skipping", i + 1, err);
                    break ParagraphOutcome::Skipped {
                        index: i,
                        planned_duration_ms: duration,
                        reason: SkipReason::ClipUnavailable {
                            clip_id: id.to_string(),
                        },
                    };
                }
                UnavailableClipPolicy::Retry => {
                    log::warn!("Paragraph {}: {}, trying next", i + 1, err);
                    excluded.insert(id);
                }
            }
        };

        outcomes.push(outcome);
    }

    Plan { outcomes, used }
}
