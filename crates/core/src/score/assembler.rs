//! Build the music timeline from planned assignments.

use rayon::prelude::*;

use crate::audio::buffer::SampleBuffer;
use crate::source::ClipSource;
use crate::types::SegmentAssignment;

/// Loop a clip by doubling until it covers `duration_ms`, then trim to it.
pub fn prepare_segment(clip: &SampleBuffer, duration_ms: u64) -> SampleBuffer {
    clip.loop_to(duration_ms).slice(0, duration_ms)
}

/// Load and prepare every assignment, in order.
///
/// Segments are independent, so this runs in parallel. A clip that fails to
/// load here is dropped with a warning; [`crate::pipeline::compose`] decodes
/// every clip while planning so this only happens with a bare source.
fn prepare_all(assignments: &[SegmentAssignment], source: &dyn ClipSource) -> Vec<SampleBuffer> {
    let prepared: Vec<Option<SampleBuffer>> = assignments
        .par_iter()
        .map(|a| match source.load_clip(&a.clip_id) {
            Ok(clip) => {
                let segment = prepare_segment(&clip, a.planned_duration_ms);
                log::debug!(
                    "Prepared {}: {:.2}s source -> {:.2}s segment",
                    a.clip_id,
                    clip.len_ms() as f64 / 1000.0,
                    segment.len_ms() as f64 / 1000.0
                );
                Some(segment)
            }
            Err(e) => {
                log::warn!("Dropping segment: {}", e);
                None
            }
        })
        .collect();

    prepared.into_iter().flatten().collect()
}

/// Crossfade-join segments left to right.
///
/// Returns `None` for an empty list.
pub fn join_segments(segments: Vec<SampleBuffer>, crossfade_ms: u64) -> Option<SampleBuffer> {
    let mut iter = segments.into_iter();
    let first = iter.next()?;
    log::debug!("Starting with first segment: {:.2}s", first.len_ms() as f64 / 1000.0);

    Some(iter.enumerate().fold(first, |acc, (i, segment)| {
        let joined = acc.crossfade(&segment, crossfade_ms);
        log::debug!(
            "Combined length after segment {}: {:.2}s",
            i + 2,
            joined.len_ms() as f64 / 1000.0
        );
        joined
    }))
}

/// Force the buffer to `total_ms`, trimming or padding with silence.
pub fn normalize_length(buffer: SampleBuffer, total_ms: u64) -> SampleBuffer {
    let len = buffer.len_ms();
    if len > total_ms {
        log::info!("Trimmed audio from {:.2}s to target length", len as f64 / 1000.0);
    } else if len < total_ms {
        log::info!("Padded audio with {:.2}s silence", (total_ms - len) as f64 / 1000.0);
    }
    buffer.fit_to(total_ms)
}

/// Assemble the music bed.
///
/// Always returns exactly `total_ms` of audio in the source's format: an
/// empty (or entirely unloadable) assignment list yields silence. The result
/// is faded in and out over `fade_ms`.
pub fn assemble(
    assignments: &[SegmentAssignment],
    source: &dyn ClipSource,
    total_ms: u64,
    crossfade_ms: u64,
    fade_ms: u64,
) -> SampleBuffer {
    let segments = prepare_all(assignments, source);

    let joined = match join_segments(segments, crossfade_ms) {
        Some(buffer) => buffer,
        None => {
            log::warn!("No music segments available, using silence");
            return SampleBuffer::silent(total_ms, source.format());
        }
    };

    log::info!(
        "Music length before adjustment: {:.2}s (target {:.2}s)",
        joined.len_ms() as f64 / 1000.0,
        total_ms as f64 / 1000.0
    );

    normalize_length(joined, total_ms)
        .fade_in(fade_ms)
        .fade_out(fade_ms)
}
