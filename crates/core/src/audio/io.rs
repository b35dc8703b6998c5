//! Audio I/O: WAV writing, any-format decoding, resampling.

use std::path::Path;

use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::buffer::{AudioFormat, SampleBuffer};

/// Write a buffer to a 16-bit PCM WAV file.
///
/// Clips values to [-1, 1] before conversion.
/// Creates parent directories if needed.
pub fn write_wav(path: &Path, buffer: &SampleBuffer) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let format = buffer.format();
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in buffer.samples() {
        let clipped = sample.clamp(-1.0, 1.0);
        let int16 = (clipped * 32767.0) as i16;
        writer.write_sample(int16)?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Decode any supported container (WAV, MP3, MP4/AAC) into a buffer.
pub fn decode_file(path: &Path) -> Result<SampleBuffer> {
    use symphonia::core::audio::SampleBuffer as DecodeBuffer;
    use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
    use symphonia::core::errors::Error as SymphError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unsupported format: {}", path.display()))?;

    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio track found")?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported codec")?;

    let mut all_samples: Vec<f64> = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut sample_buf = DecodeBuffer::<f64>::new(decoded.frames() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);
                all_samples.extend_from_slice(sample_buf.samples());
            }
            Err(SymphError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(SampleBuffer::new(
        AudioFormat::new(sample_rate, channels),
        all_samples,
    ))
}

/// Resample planar channels from `from_sr` to `to_sr` with rubato.
///
/// Output is resized to the nominal `frames * to_sr / from_sr` length.
fn resample_channels(channels: Vec<Vec<f64>>, from_sr: u32, to_sr: u32) -> Result<Vec<Vec<f64>>> {
    let frames = channels.first().map(|c| c.len()).unwrap_or(0);
    if from_sr == to_sr || frames == 0 {
        return Ok(channels);
    }

    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_sr as f64 / from_sr as f64;
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, frames, channels.len())?;
    let mut output = resampler.process(&channels, None)?;

    // The sinc filter delay eats into the tail; keep the nominal length.
    let expected = (frames as f64 * ratio).round() as usize;
    for ch in output.iter_mut() {
        ch.resize(expected, 0.0);
    }
    Ok(output)
}

/// Convert a buffer to `target` sample rate and channel layout.
pub fn conform(buffer: SampleBuffer, target: AudioFormat) -> Result<SampleBuffer> {
    let buffer = buffer.with_channels(target.channels);
    let from_sr = buffer.format().sample_rate;
    if from_sr == target.sample_rate {
        return Ok(buffer);
    }

    let ch = target.channels as usize;
    let mut planar = vec![Vec::with_capacity(buffer.frames()); ch];
    for frame in buffer.samples().chunks_exact(ch) {
        for (c, &s) in frame.iter().enumerate() {
            planar[c].push(s);
        }
    }

    let resampled = resample_channels(planar, from_sr, target.sample_rate).with_context(|| {
        format!("Failed to resample {} Hz -> {} Hz", from_sr, target.sample_rate)
    })?;

    let frames = resampled.first().map(|c| c.len()).unwrap_or(0);
    let mut interleaved = Vec::with_capacity(frames * ch);
    for i in 0..frames {
        for channel in &resampled {
            interleaved.push(channel[i]);
        }
    }
    Ok(SampleBuffer::new(target, interleaved))
}

/// Decode `path` and convert it to `target`.
pub fn load_audio(path: &Path, target: AudioFormat) -> Result<SampleBuffer> {
    let decoded = decode_file(path)?;
    log::debug!(
        "Decoded {}: {} Hz, {} ch, {:.2}s",
        path.display(),
        decoded.format().sample_rate,
        decoded.format().channels,
        decoded.len_ms() as f64 / 1000.0
    );
    conform(decoded, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_wav_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("backdrop_test_io_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn sine(format: AudioFormat, frames: usize) -> SampleBuffer {
        let ch = format.channels as usize;
        let samples = (0..frames * ch)
            .map(|i| ((i / ch) as f64 / 100.0 * std::f64::consts::TAU).sin() * 0.5)
            .collect();
        SampleBuffer::new(format, samples)
    }

    #[test]
    fn test_write_decode_roundtrip_stereo() {
        let path = temp_wav_path("roundtrip.wav");
        let buf = sine(AudioFormat::new(16000, 2), 1000);
        write_wav(&path, &buf).unwrap();

        let read = decode_file(&path).unwrap();
        assert_eq!(read.format(), buf.format());
        assert_eq!(read.frames(), 1000);

        // 16-bit quantization introduces small error
        for (a, b) in buf.samples().iter().zip(read.samples()) {
            assert!((a - b).abs() < 0.001, "sample mismatch: {} vs {}", a, b);
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_clips_values() {
        let path = temp_wav_path("clipping.wav");
        let buf = SampleBuffer::new(AudioFormat::new(16000, 1), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        write_wav(&path, &buf).unwrap();

        let read = decode_file(&path).unwrap();
        let s = read.samples();
        assert!(s[0] >= -1.0 && s[0] <= -0.99);
        assert!(s[4] >= 0.99 && s[4] <= 1.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_decode_wav_via_symphonia() {
        let path = temp_wav_path("decode.wav");
        let buf = sine(AudioFormat::new(22050, 2), 22050);
        write_wav(&path, &buf).unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.format(), AudioFormat::new(22050, 2));
        assert_eq!(decoded.len_ms(), 1000);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_decode_missing_file() {
        assert!(decode_file(Path::new("/nonexistent/backdrop/clip.wav")).is_err());
    }

    #[test]
    fn test_resample_same_rate() {
        let channels = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        let result = resample_channels(channels.clone(), 16000, 16000).unwrap();
        assert_eq!(result, channels);
    }

    #[test]
    fn test_resample_empty() {
        let result = resample_channels(vec![Vec::new()], 16000, 8000).unwrap();
        assert_eq!(result, vec![Vec::<f64>::new()]);
    }

    #[test]
    fn test_conform_rate_and_channels() {
        let buf = sine(AudioFormat::new(8000, 1), 4000);
        let target = AudioFormat::new(16000, 2);
        let out = conform(buf, target).unwrap();
        assert_eq!(out.format(), target);
        assert_eq!(out.frames(), 8000);
        assert_eq!(out.len_ms(), 500);
    }

    #[test]
    fn test_conform_noop() {
        let buf = sine(AudioFormat::new(8000, 2), 100);
        let out = conform(buf.clone(), AudioFormat::new(8000, 2)).unwrap();
        assert_eq!(out, buf);
    }
}
