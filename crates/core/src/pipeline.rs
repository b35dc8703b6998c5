//! End-to-end render: descriptors in, mixed WAV out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::audio::buffer::{AudioFormat, SampleBuffer};
use crate::audio::gain::Volume;
use crate::audio::io::{load_audio, write_wav};
use crate::error::ConfigError;
use crate::score::assembler::assemble;
use crate::score::mixer::mix_with_ambient;
use crate::score::planner::{plan, Plan, UnavailableClipPolicy};
use crate::source::{AmbientPool, ClipCache, ClipSource, DirectoryClipSource};
use crate::types::{ClipLibrary, ParagraphSpec, TextEmotions};

pub const GENERATED_MUSIC_FILE: &str = "generated_music.wav";
pub const FINAL_OUTPUT_FILE: &str = "final_output_audio.wav";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Lowest accepted output rate. Below it a millisecond is shorter than a
/// frame and lengths no longer round-trip exactly.
pub const MIN_SAMPLE_RATE: u32 = 1000;

/// Render parameters.
#[derive(Debug, Clone, Serialize)]
pub struct RenderConfig {
    pub total_duration_ms: u64,
    pub crossfade_ms: u64,
    pub fade_ms: u64,
    pub music_volume: Volume,
    pub ambient_volume: Volume,
    /// Format of every decoded clip and of the output files.
    pub format: AudioFormat,
    pub unavailable_policy: UnavailableClipPolicy,
    /// Seed for the ambient choice.
    pub seed: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            total_duration_ms: 60_000,
            crossfade_ms: 5_000,
            fade_ms: 3_000,
            music_volume: Volume::UNITY,
            ambient_volume: Volume::UNITY,
            format: AudioFormat::default(),
            unavailable_policy: UnavailableClipPolicy::default(),
            seed: None,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, volume) in [("music", self.music_volume), ("ambient", self.ambient_volume)] {
            if !volume.0.is_finite() {
                return Err(ConfigError::NonFiniteVolume { name, value: volume.0 });
            }
            if volume.0 < 0.0 {
                return Err(ConfigError::NegativeVolume { name, value: volume.0 });
            }
        }
        if self.format.sample_rate < MIN_SAMPLE_RATE {
            return Err(ConfigError::SampleRateTooLow {
                rate: self.format.sample_rate,
                min: MIN_SAMPLE_RATE,
            });
        }
        if self.total_duration_ms == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }
}

/// In-memory result of planning, assembly and mixing.
pub struct Composition {
    pub plan: Plan,
    /// Music bed alone.
    pub music: SampleBuffer,
    /// Final mix, or the music bed when no ambient was supplied.
    pub output: SampleBuffer,
}

/// Plan, assemble and mix without touching the filesystem.
///
/// Every matched clip is decoded while planning, so a clip that cannot be
/// loaded is handled by the unavailable-clip policy and the assembler works
/// from the already decoded audio.
pub fn compose(
    paragraphs: &[ParagraphSpec],
    library: &ClipLibrary,
    source: &dyn ClipSource,
    ambient: Option<&SampleBuffer>,
    config: &RenderConfig,
) -> Composition {
    let clips = ClipCache::new(source);
    let plan = plan(
        paragraphs,
        library,
        |id| clips.preload(id),
        config.total_duration_ms,
        config.crossfade_ms,
        config.unavailable_policy,
    );
    log::debug!(
        "Planned {} segments from {} decoded clips",
        plan.used.len(),
        clips.len()
    );

    let music = assemble(
        &plan.assignments(),
        &clips,
        config.total_duration_ms,
        config.crossfade_ms,
        config.fade_ms,
    );

    let output = mix_with_ambient(
        music.clone(),
        ambient,
        config.music_volume.gain(),
        config.ambient_volume.gain(),
        config.fade_ms,
    );

    Composition { plan, music, output }
}

/// Input and output locations.
#[derive(Debug, Clone)]
pub struct RenderPaths {
    pub text_emotions: PathBuf,
    pub music_library: PathBuf,
    pub music_dir: PathBuf,
    pub ambience_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RenderPaths {
    fn default() -> Self {
        Self {
            text_emotions: PathBuf::from("text_emotion.json"),
            music_library: PathBuf::from("music_emotion_results.json"),
            music_dir: PathBuf::from("music_library"),
            ambience_dir: PathBuf::from("ambience"),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Output of [`render`].
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub plan: Plan,
    pub generated_music: PathBuf,
    pub final_output: PathBuf,
    pub ambient: Option<PathBuf>,
    pub output_ms: u64,
    pub manifest: serde_json::Value,
}

/// Load descriptors, render the track and write it under `paths.output_dir`.
///
/// Recoverable matching problems show up as skipped paragraphs; unreadable
/// descriptors, an undecodable ambient file and write failures are errors.
pub fn render(paths: &RenderPaths, config: &RenderConfig) -> Result<RenderResult> {
    config.validate()?;

    let text = TextEmotions::from_json_file(&paths.text_emotions)?;
    let library = ClipLibrary::from_json_file(&paths.music_library)?;
    log::info!(
        "Loaded {} paragraphs and {} library clips",
        text.paragraphs.len(),
        library.len()
    );

    let source = DirectoryClipSource::new(&paths.music_dir, config.format);

    let ambient_path = AmbientPool::new(&paths.ambience_dir).choose(config.seed)?;
    let ambient = match &ambient_path {
        Some(path) => Some(
            load_audio(path, config.format)
                .with_context(|| format!("Failed to load ambient sound: {}", path.display()))?,
        ),
        None => None,
    };

    let composition = compose(&text.paragraphs, &library, &source, ambient.as_ref(), config);

    let generated_music = paths.output_dir.join(GENERATED_MUSIC_FILE);
    write_wav(&generated_music, &composition.music)?;

    let final_output = paths.output_dir.join(FINAL_OUTPUT_FILE);
    write_wav(&final_output, &composition.output)?;

    let manifest = build_manifest(&composition.plan, ambient_path.as_deref(), config);
    let manifest_path = paths.output_dir.join(MANIFEST_FILE);
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    Ok(RenderResult {
        plan: composition.plan,
        generated_music,
        final_output,
        ambient: ambient_path,
        output_ms: composition.output.len_ms(),
        manifest,
    })
}

fn build_manifest(plan: &Plan, ambient: Option<&Path>, config: &RenderConfig) -> serde_json::Value {
    serde_json::json!({
        "config": config,
        "paragraphs": plan.outcomes,
        "clips_used": plan.assignments().len(),
        "paragraphs_skipped": plan.skipped(),
        "ambient": ambient.map(|p| p.display().to_string()),
        "music_gain": config.music_volume.gain(),
        "ambient_gain": config.ambient_volume.gain(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::gain::Gain;
    use crate::error::SkipReason;
    use crate::source::MemoryClipSource;
    use crate::types::{EmotionPoint, ParagraphOutcome};

    const FORMAT: AudioFormat = AudioFormat {
        sample_rate: 1000,
        channels: 1,
    };

    fn constant(ms: u64, value: f64) -> SampleBuffer {
        SampleBuffer::new(FORMAT, vec![value; FORMAT.frames_for_ms(ms)])
    }

    fn is_silent(buffer: &SampleBuffer) -> bool {
        buffer.samples().iter().all(|&s| s == 0.0)
    }

    fn test_config() -> RenderConfig {
        RenderConfig {
            format: FORMAT,
            ..RenderConfig::default()
        }
    }

    fn three_paragraphs() -> Vec<ParagraphSpec> {
        vec![
            ParagraphSpec::new(0.8, 0.8, 0.0, 0.2),
            ParagraphSpec::new(-0.8, -0.8, 0.2, 0.6),
            ParagraphSpec::new(-0.8, 0.8, 0.6, 1.0),
        ]
    }

    fn three_clip_library() -> ClipLibrary {
        let mut lib = ClipLibrary::new();
        lib.insert("bright", EmotionPoint::new(0.7, 0.7)).unwrap();
        lib.insert("gloomy", EmotionPoint::new(-0.7, -0.7)).unwrap();
        lib.insert("tense", EmotionPoint::new(-0.7, 0.7)).unwrap();
        lib
    }

    #[test]
    fn test_default_config() {
        let c = RenderConfig::default();
        assert_eq!(c.total_duration_ms, 60_000);
        assert_eq!(c.crossfade_ms, 5_000);
        assert_eq!(c.fade_ms, 3_000);
        assert_eq!(c.music_volume, Volume(1.0));
        assert_eq!(c.ambient_volume, Volume(1.0));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_volumes() {
        let c = RenderConfig {
            ambient_volume: Volume(-0.5),
            ..RenderConfig::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigError::NegativeVolume { name: "ambient", value: -0.5 })
        );

        let c = RenderConfig {
            music_volume: Volume(f64::NAN),
            ..RenderConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::NonFiniteVolume { name: "music", .. })));

        let c = RenderConfig {
            music_volume: Volume(0.0),
            ..RenderConfig::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_low_sample_rate() {
        let c = RenderConfig {
            format: AudioFormat::new(500, 1),
            total_duration_ms: 60_001,
            ..RenderConfig::default()
        };
        assert_eq!(
            c.validate(),
            Err(ConfigError::SampleRateTooLow { rate: 500, min: MIN_SAMPLE_RATE })
        );

        let c = RenderConfig {
            format: AudioFormat::new(0, 2),
            ..RenderConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::SampleRateTooLow { rate: 0, .. })));

        let c = RenderConfig {
            format: AudioFormat::new(MIN_SAMPLE_RATE, 1),
            ..RenderConfig::default()
        };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_output_length_exact_at_accepted_rates() {
        let paragraphs = vec![ParagraphSpec::new(0.7, 0.7, 0.0, 1.0)];
        let mut lib = ClipLibrary::new();
        lib.insert("bright", EmotionPoint::new(0.7, 0.7)).unwrap();

        for rate in [1000, 1001, 7919, 11_025, 22_050, 44_100] {
            let format = AudioFormat::new(rate, 1);
            let mut source = MemoryClipSource::new(format);
            let clip = SampleBuffer::new(format, vec![0.1; format.frames_for_ms(333)]);
            source.insert("bright", clip).unwrap();
            for total in [1, 999, 60_001] {
                let config = RenderConfig {
                    format,
                    total_duration_ms: total,
                    crossfade_ms: 0,
                    fade_ms: 0,
                    ..RenderConfig::default()
                };
                assert!(config.validate().is_ok());
                let comp = compose(&paragraphs, &lib, &source, None, &config);
                assert_eq!(comp.output.len_ms(), total, "rate {} total {}", rate, total);
            }
        }
    }

    #[test]
    fn test_empty_clip_is_skipped_under_skip_policy() {
        let mut source = MemoryClipSource::new(FORMAT);
        source.insert("empty", SampleBuffer::new(FORMAT, vec![])).unwrap();
        source.insert("good", constant(60_000, 0.5)).unwrap();
        let mut lib = ClipLibrary::new();
        lib.insert("empty", EmotionPoint::new(0.0, 0.0)).unwrap();
        lib.insert("good", EmotionPoint::new(0.5, 0.5)).unwrap();
        let paragraphs = vec![ParagraphSpec::new(0.0, 0.0, 0.0, 1.0)];

        let comp = compose(&paragraphs, &lib, &source, None, &test_config());
        assert_eq!(
            comp.plan.outcomes,
            vec![ParagraphOutcome::Skipped {
                index: 0,
                planned_duration_ms: 60_000,
                reason: SkipReason::ClipUnavailable {
                    clip_id: "empty".into()
                },
            }]
        );
        assert!(comp.plan.used.is_empty());
        assert_eq!(comp.music.len_ms(), 60_000);
        assert!(is_silent(&comp.music));
    }

    #[test]
    fn test_empty_clip_is_replaced_under_retry_policy() {
        let mut source = MemoryClipSource::new(FORMAT);
        source.insert("empty", SampleBuffer::new(FORMAT, vec![])).unwrap();
        source.insert("good", constant(60_000, 0.5)).unwrap();
        let mut lib = ClipLibrary::new();
        lib.insert("empty", EmotionPoint::new(0.0, 0.0)).unwrap();
        lib.insert("good", EmotionPoint::new(0.5, 0.5)).unwrap();
        let paragraphs = vec![ParagraphSpec::new(0.0, 0.0, 0.0, 1.0)];
        let config = RenderConfig {
            unavailable_policy: UnavailableClipPolicy::Retry,
            ..test_config()
        };

        let comp = compose(&paragraphs, &lib, &source, None, &config);
        let ids: Vec<String> = comp.plan.assignments().into_iter().map(|a| a.clip_id).collect();
        assert_eq!(ids, vec!["good"]);
        assert!(!comp.plan.used.contains("empty"));
        assert_eq!(comp.music.len_ms(), 60_000);
        // Past the 3s fade-in the good clip plays at full level
        assert!((comp.music.samples()[30_000] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_three_paragraphs_three_clips() {
        let mut source = MemoryClipSource::new(FORMAT);
        source.insert("bright", constant(15_000, 0.1)).unwrap();
        source.insert("gloomy", constant(30_000, 0.2)).unwrap();
        source.insert("tense", constant(30_000, 0.3)).unwrap();

        let library = three_clip_library();
        let comp = compose(&three_paragraphs(), &library, &source, None, &test_config());

        assert_eq!(comp.plan.skipped(), 0);
        let ids: Vec<String> = comp.plan.assignments().into_iter().map(|a| a.clip_id).collect();
        assert_eq!(ids, vec!["bright", "gloomy", "tense"]);
        assert_eq!(comp.plan.used.len(), 3);
        assert_eq!(comp.music.len_ms(), 60_000);
        assert_eq!(comp.output, comp.music);
        // 12s of "bright", then the "gloomy" body after its 5s crossfade
        assert!((comp.music.samples()[6_000] - 0.1).abs() < 1e-12);
        assert!((comp.music.samples()[20_000] - 0.2).abs() < 1e-12);
        assert!((comp.music.samples()[45_000] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_fewer_clips_than_paragraphs_still_full_length() {
        let mut source = MemoryClipSource::new(FORMAT);
        source.insert("bright", constant(2_000, 0.5)).unwrap();
        let mut lib = ClipLibrary::new();
        lib.insert("bright", EmotionPoint::new(0.7, 0.7)).unwrap();

        let comp = compose(&three_paragraphs(), &lib, &source, None, &test_config());
        assert_eq!(comp.plan.skipped(), 2);
        assert_eq!(comp.music.len_ms(), 60_000);
        // Only the first 12s carry music; the rest is silence padding
        assert!(comp.music.samples()[30_000..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_nothing_playable_yields_silence() {
        let source = MemoryClipSource::new(FORMAT);
        let library = three_clip_library();
        let comp = compose(&three_paragraphs(), &library, &source, None, &test_config());
        assert_eq!(comp.plan.skipped(), 3);
        assert_eq!(comp.output.len_ms(), 60_000);
        assert!(is_silent(&comp.output));
    }

    #[test]
    fn test_unity_mix_is_plain_overlay() {
        let mut source = MemoryClipSource::new(FORMAT);
        source.insert("bright", constant(60_000, 0.25)).unwrap();
        let mut lib = ClipLibrary::new();
        lib.insert("bright", EmotionPoint::new(0.7, 0.7)).unwrap();
        let ambient = constant(7_000, 0.125);
        let paragraphs = vec![ParagraphSpec::new(0.7, 0.7, 0.0, 1.0)];

        let comp = compose(&paragraphs, &lib, &source, Some(&ambient), &test_config());
        let expected = comp
            .music
            .overlay(&crate::score::mixer::fit_ambient(&ambient, 60_000, 3_000));
        assert_eq!(comp.output.len_ms(), 60_000);
        for (a, b) in comp.output.samples().iter().zip(expected.samples()) {
            assert!((a - b).abs() < 1e-9);
        }
        assert!((comp.output.samples()[30_000] - 0.375).abs() < 1e-9);
    }

    #[test]
    fn test_muted_music_keeps_only_ambient() {
        let mut source = MemoryClipSource::new(FORMAT);
        source.insert("bright", constant(60_000, 0.25)).unwrap();
        let mut lib = ClipLibrary::new();
        lib.insert("bright", EmotionPoint::new(0.7, 0.7)).unwrap();
        let ambient = constant(60_000, 0.125);
        let config = RenderConfig {
            music_volume: Volume(0.0),
            ..test_config()
        };
        assert_eq!(config.music_volume.gain(), Gain::Mute);

        let paragraphs = vec![ParagraphSpec::new(0.7, 0.7, 0.0, 1.0)];
        let comp = compose(&paragraphs, &lib, &source, Some(&ambient), &config);
        assert!((comp.output.samples()[30_000] - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_render_writes_outputs() {
        let dir = std::env::temp_dir().join(format!("backdrop_render_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let music_dir = dir.join("music_library");
        let ambience_dir = dir.join("ambience");
        std::fs::create_dir_all(&music_dir).unwrap();
        std::fs::create_dir_all(&ambience_dir).unwrap();

        let format = AudioFormat::new(8000, 1);
        let tone = SampleBuffer::new(format, vec![0.2; 8000]);
        write_wav(&music_dir.join("bright.wav"), &tone).unwrap();
        write_wav(&music_dir.join("gloomy.wav"), &tone).unwrap();
        write_wav(&ambience_dir.join("rain.wav"), &tone).unwrap();

        std::fs::write(
            dir.join("text_emotion.json"),
            r#"{"paragraphs": [
                {"emotions": {"valence": 0.8, "arousal": 0.8}, "proportion": {"start": 0.0, "end": 0.5}},
                {"emotions": {"valence": -0.8, "arousal": -0.8}, "proportion": {"start": 0.5, "end": 1.0}}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("music_emotion_results.json"),
            r#"{"bright.wav": {"valence": 0.7, "arousal": 0.7},
                "gloomy.wav": {"valence": -0.7, "arousal": -0.7},
                "absent.wav": {"valence": 0.0, "arousal": 0.0}}"#,
        )
        .unwrap();

        let paths = RenderPaths {
            text_emotions: dir.join("text_emotion.json"),
            music_library: dir.join("music_emotion_results.json"),
            music_dir,
            ambience_dir,
            output_dir: dir.join("out"),
        };
        let config = RenderConfig {
            total_duration_ms: 4_000,
            crossfade_ms: 500,
            fade_ms: 200,
            format,
            seed: Some(1),
            ..RenderConfig::default()
        };

        let result = render(&paths, &config).unwrap();
        assert_eq!(result.output_ms, 4_000);
        assert_eq!(result.plan.skipped(), 0);
        assert!(result.generated_music.exists());
        assert!(result.final_output.exists());
        assert!(result.ambient.as_ref().unwrap().ends_with("rain.wav"));
        assert_eq!(result.manifest["clips_used"], 2);
        assert_eq!(result.manifest["paragraphs"][1]["clip_id"], "gloomy.wav");

        let written = load_audio(&result.final_output, format).unwrap();
        assert_eq!(written.len_ms(), 4_000);
        assert!(dir.join("out").join(MANIFEST_FILE).exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Lays out a render fixture whose closest clip for the only paragraph
    /// exists on disk but is not audio.
    fn broken_clip_fixture(name: &str) -> (PathBuf, RenderPaths) {
        let dir = std::env::temp_dir()
            .join(format!("backdrop_render_{}_{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let music_dir = dir.join("music_library");
        std::fs::create_dir_all(&music_dir).unwrap();

        let tone = SampleBuffer::new(AudioFormat::new(8000, 1), vec![0.2; 8000]);
        write_wav(&music_dir.join("good.wav"), &tone).unwrap();
        std::fs::write(music_dir.join("broken.wav"), b"RIFF but not really").unwrap();

        std::fs::write(
            dir.join("text_emotion.json"),
            r#"{"paragraphs": [
                {"emotions": {"valence": 0.0, "arousal": 0.0}, "proportion": {"start": 0.0, "end": 1.0}}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("music_emotion_results.json"),
            r#"{"broken.wav": {"valence": 0.0, "arousal": 0.0},
                "good.wav": {"valence": 0.5, "arousal": 0.5}}"#,
        )
        .unwrap();

        let paths = RenderPaths {
            text_emotions: dir.join("text_emotion.json"),
            music_library: dir.join("music_emotion_results.json"),
            music_dir,
            ambience_dir: dir.join("ambience"),
            output_dir: dir.join("out"),
        };
        (dir, paths)
    }

    fn broken_clip_config(policy: UnavailableClipPolicy) -> RenderConfig {
        RenderConfig {
            total_duration_ms: 2_000,
            crossfade_ms: 0,
            fade_ms: 0,
            format: AudioFormat::new(8000, 1),
            unavailable_policy: policy,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_render_reports_undecodable_clip_as_skipped() {
        let (dir, paths) = broken_clip_fixture("broken_skip");
        let config = broken_clip_config(UnavailableClipPolicy::Skip);

        let result = render(&paths, &config).unwrap();
        assert_eq!(result.plan.skipped(), 1);
        assert!(result.plan.used.is_empty());
        assert_eq!(result.manifest["clips_used"], 0);
        assert_eq!(result.manifest["paragraphs_skipped"], 1);
        let entry = &result.manifest["paragraphs"][0];
        assert_eq!(entry["status"], "skipped");
        assert_eq!(entry["reason"], "clip_unavailable");
        assert_eq!(entry["clip_id"], "broken.wav");

        let written = load_audio(&result.generated_music, config.format).unwrap();
        assert_eq!(written.len_ms(), 2_000);
        assert!(is_silent(&written));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_retries_past_undecodable_clip() {
        let (dir, paths) = broken_clip_fixture("broken_retry");
        let config = broken_clip_config(UnavailableClipPolicy::Retry);

        let result = render(&paths, &config).unwrap();
        assert_eq!(result.plan.skipped(), 0);
        assert!(!result.plan.used.contains("broken.wav"));
        assert_eq!(result.manifest["clips_used"], 1);
        let entry = &result.manifest["paragraphs"][0];
        assert_eq!(entry["status"], "assigned");
        assert_eq!(entry["clip_id"], "good.wav");

        let written = load_audio(&result.generated_music, config.format).unwrap();
        assert_eq!(written.len_ms(), 2_000);
        assert!(!is_silent(&written));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_render_rejects_negative_volume() {
        let config = RenderConfig {
            music_volume: Volume(-1.0),
            ..RenderConfig::default()
        };
        assert!(render(&RenderPaths::default(), &config).is_err());
    }
}
