//! In-memory audio buffer with millisecond-addressed editing operations.
//!
//! Samples are interleaved `f64` in [-1, 1]. Every operation that edits a
//! buffer returns a new value; the receiver is left untouched. Operations
//! combining two buffers require both to share one [`AudioFormat`].

use serde::{Deserialize, Serialize};

use crate::audio::gain::Gain;

/// Sample rate and channel layout shared by every buffer in a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Number of frames covering `ms` milliseconds (rounded to nearest).
    pub fn frames_for_ms(&self, ms: u64) -> usize {
        (ms as f64 * self.sample_rate as f64 / 1000.0).round() as usize
    }

    /// Duration of `frames` frames in milliseconds (rounded to nearest).
    pub fn ms_for_frames(&self, frames: usize) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (frames as f64 * 1000.0 / self.sample_rate as f64).round() as u64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(44100, 2)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    format: AudioFormat,
    samples: Vec<f64>,
}

impl SampleBuffer {
    /// Wrap interleaved samples. A trailing partial frame is dropped.
    pub fn new(format: AudioFormat, mut samples: Vec<f64>) -> Self {
        let channels = format.channels as usize;
        samples.truncate(samples.len() - samples.len() % channels);
        Self { format, samples }
    }

    /// Silence lasting `ms` milliseconds.
    pub fn silent(ms: u64, format: AudioFormat) -> Self {
        let n = format.frames_for_ms(ms) * format.channels as usize;
        Self {
            format,
            samples: vec![0.0; n],
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in milliseconds.
    pub fn len_ms(&self) -> u64 {
        self.format.ms_for_frames(self.frames())
    }

    fn channels(&self) -> usize {
        self.format.channels as usize
    }

    fn with_samples(&self, samples: Vec<f64>) -> Self {
        Self {
            format: self.format,
            samples,
        }
    }

    fn check_format(&self, other: &SampleBuffer) {
        assert_eq!(
            self.format, other.format,
            "cannot combine buffers of different formats"
        );
    }

    fn slice_frames(&self, start: usize, end: usize) -> Self {
        let start = start.min(self.frames());
        let end = end.min(self.frames());
        if start >= end {
            return self.with_samples(Vec::new());
        }
        let ch = self.channels();
        self.with_samples(self.samples[start * ch..end * ch].to_vec())
    }

    /// Extract `[start_ms, end_ms)`. Clamps to valid bounds.
    pub fn slice(&self, start_ms: u64, end_ms: u64) -> Self {
        self.slice_frames(
            self.format.frames_for_ms(start_ms),
            self.format.frames_for_ms(end_ms),
        )
    }

    /// Plain concatenation: `self` followed by `other`.
    ///
    /// # Panics
    /// If the formats differ.
    pub fn append(&self, other: &SampleBuffer) -> Self {
        self.check_format(other);
        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len());
        samples.extend_from_slice(&self.samples);
        samples.extend_from_slice(&other.samples);
        self.with_samples(samples)
    }

    /// Concatenate with a linear crossfade over `crossfade_ms`.
    ///
    /// The tail of `self` fades out while the head of `other` fades in, so the
    /// result is `crossfade_ms` shorter than a plain append. The overlap is
    /// clamped to the shorter of the two buffers.
    ///
    /// # Panics
    /// If the formats differ.
    pub fn crossfade(&self, other: &SampleBuffer, crossfade_ms: u64) -> Self {
        self.check_format(other);
        let ch = self.channels();
        let cf = self
            .format
            .frames_for_ms(crossfade_ms)
            .min(self.frames())
            .min(other.frames());

        if cf == 0 {
            return self.append(other);
        }

        let mut samples = Vec::with_capacity(self.samples.len() + other.samples.len() - cf * ch);
        samples.extend_from_slice(&self.samples);

        let tail_start = (self.frames() - cf) * ch;
        for i in 0..cf {
            let t = i as f64 / cf as f64;
            for c in 0..ch {
                let idx = tail_start + i * ch + c;
                samples[idx] = samples[idx] * (1.0 - t) + other.samples[i * ch + c] * t;
            }
        }
        samples.extend_from_slice(&other.samples[cf * ch..]);

        self.with_samples(samples)
    }

    /// Repeat the buffer by doubling until it lasts at least `ms`.
    ///
    /// The result may overshoot `ms`; callers trim afterwards. An empty
    /// buffer cannot grow and is returned as is.
    pub fn loop_to(&self, ms: u64) -> Self {
        let mut out = self.clone();
        if out.is_empty() {
            return out;
        }
        let target = self.format.frames_for_ms(ms);
        while out.frames() < target {
            out = out.append(&out);
        }
        out
    }

    /// Trim or pad with trailing silence to exactly `ms`.
    pub fn fit_to(&self, ms: u64) -> Self {
        let target = self.format.frames_for_ms(ms);
        if self.frames() >= target {
            return self.slice_frames(0, target);
        }
        let mut samples = self.samples.clone();
        samples.resize(target * self.channels(), 0.0);
        self.with_samples(samples)
    }

    /// Scale every sample by `gain`.
    pub fn apply_gain(&self, gain: Gain) -> Self {
        match gain {
            Gain::Mute => self.with_samples(vec![0.0; self.samples.len()]),
            Gain::Db(db) if db.abs() < 0.01 => self.clone(),
            Gain::Db(_) => {
                let factor = gain.factor();
                self.with_samples(self.samples.iter().map(|s| s * factor).collect())
            }
        }
    }

    /// Linear fade from silence over the first `ms`.
    pub fn fade_in(&self, ms: u64) -> Self {
        let n = self.format.frames_for_ms(ms).min(self.frames());
        let ch = self.channels();
        let mut samples = self.samples.clone();
        for i in 0..n {
            let g = i as f64 / n as f64;
            for s in &mut samples[i * ch..(i + 1) * ch] {
                *s *= g;
            }
        }
        self.with_samples(samples)
    }

    /// Linear fade to silence over the last `ms`.
    pub fn fade_out(&self, ms: u64) -> Self {
        let n = self.format.frames_for_ms(ms).min(self.frames());
        let ch = self.channels();
        let start = self.frames() - n;
        let mut samples = self.samples.clone();
        for i in 0..n {
            let g = (n - 1 - i) as f64 / n as f64;
            let frame = start + i;
            for s in &mut samples[frame * ch..(frame + 1) * ch] {
                *s *= g;
            }
        }
        self.with_samples(samples)
    }

    /// Sum two buffers sample-wise. The result is as long as the longer input.
    ///
    /// No clamping is applied here; encoding clips to [-1, 1].
    ///
    /// # Panics
    /// If the formats differ.
    pub fn overlay(&self, other: &SampleBuffer) -> Self {
        self.check_format(other);
        let (long, short) = if self.samples.len() >= other.samples.len() {
            (&self.samples, &other.samples)
        } else {
            (&other.samples, &self.samples)
        };
        let mut samples = long.clone();
        for (s, o) in samples.iter_mut().zip(short.iter()) {
            *s += o;
        }
        self.with_samples(samples)
    }

    /// Convert to another channel count.
    ///
    /// Mono is duplicated to every output channel; downmixing to mono
    /// averages; other layouts keep the leading channels and fill missing
    /// ones from the last available channel.
    pub fn with_channels(&self, channels: u16) -> Self {
        let channels = channels.max(1);
        if channels == self.format.channels {
            return self.clone();
        }
        let src = self.channels();
        let dst = channels as usize;
        let mut samples = Vec::with_capacity(self.frames() * dst);
        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                samples.push(frame.iter().sum::<f64>() / src as f64);
            } else {
                for c in 0..dst {
                    samples.push(frame[c.min(src - 1)]);
                }
            }
        }
        Self {
            format: AudioFormat::new(self.format.sample_rate, channels),
            samples,
        }
    }
}
