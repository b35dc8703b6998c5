//! Mix the music bed with an ambient layer.

use crate::audio::buffer::SampleBuffer;
use crate::audio::gain::Gain;
use crate::score::assembler::prepare_segment;

/// Loop/trim an ambient bed to `total_ms` and fade it in and out.
pub fn fit_ambient(ambient: &SampleBuffer, total_ms: u64, fade_ms: u64) -> SampleBuffer {
    if ambient.is_empty() {
        return SampleBuffer::silent(total_ms, ambient.format());
    }
    prepare_segment(ambient, total_ms)
        .fade_in(fade_ms)
        .fade_out(fade_ms)
}

/// Overlay `ambient` under `music`, each scaled by its own gain.
///
/// The ambient buffer is first fitted to the music's length with
/// [`fit_ambient`]. Samples are summed without clamping.
///
/// # Panics
/// If the two buffers have different formats.
pub fn mix(
    music: &SampleBuffer,
    ambient: &SampleBuffer,
    music_gain: Gain,
    ambient_gain: Gain,
    fade_ms: u64,
) -> SampleBuffer {
    let bed = fit_ambient(ambient, music.len_ms(), fade_ms);
    music
        .apply_gain(music_gain)
        .overlay(&bed.apply_gain(ambient_gain))
}

/// Mix when an ambient bed was found; otherwise return the music unchanged.
pub fn mix_with_ambient(
    music: SampleBuffer,
    ambient: Option<&SampleBuffer>,
    music_gain: Gain,
    ambient_gain: Gain,
    fade_ms: u64,
) -> SampleBuffer {
    match ambient {
        Some(ambient) => {
            log::info!("Mixing music ({}) with ambient ({})", music_gain, ambient_gain);
            mix(&music, ambient, music_gain, ambient_gain, fade_ms)
        }
        None => {
            log::info!("No ambient sound available, using music alone");
            music
        }
    }
}
