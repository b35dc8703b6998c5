//! Backdrop CLI — emotion-matched background music for narrated text.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use backdrop_core::audio::buffer::AudioFormat;
use backdrop_core::audio::gain::Volume;
use backdrop_core::pipeline::{render, RenderConfig, RenderPaths, MIN_SAMPLE_RATE};
use backdrop_core::score::planner::{plan, UnavailableClipPolicy};
use backdrop_core::source::{ClipSource, DirectoryClipSource};
use backdrop_core::types::{ClipLibrary, ParagraphOutcome, TextEmotions};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "backdrop",
    about = "Score narrated text with emotion-matched music and ambience",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the music track and mix it with an ambient bed
    Render(RenderArgs),
    /// Show which clip each paragraph would get, without rendering audio
    Plan(PlanArgs),
}

// ─── Shared arguments (embedded in each subcommand) ──────────────

#[derive(Parser, Debug)]
struct SharedArgs {
    /// Emotion-annotated text (JSON)
    #[arg(long, default_value = "text_emotion.json")]
    text: PathBuf,

    /// Music library emotion metadata (JSON)
    #[arg(long, default_value = "music_emotion_results.json")]
    library: PathBuf,

    /// Directory holding the music clips named in the library
    #[arg(long, default_value = "music_library")]
    music_dir: PathBuf,

    /// Total output duration (ms)
    #[arg(long, default_value_t = 60_000)]
    duration: u64,

    /// Crossfade between consecutive clips (ms)
    #[arg(long, default_value_t = 5_000)]
    crossfade: u64,

    /// On a missing clip, try the next-closest one instead of skipping the paragraph
    #[arg(long, default_value_t = false)]
    retry_unavailable: bool,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl SharedArgs {
    fn policy(&self) -> UnavailableClipPolicy {
        if self.retry_unavailable {
            UnavailableClipPolicy::Retry
        } else {
            UnavailableClipPolicy::Skip
        }
    }
}

// ─── Render ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Render the music track and the final mix")]
struct RenderArgs {
    #[command(flatten)]
    shared: SharedArgs,

    /// Directory of ambient .wav files (one is picked at random)
    #[arg(long, default_value = "ambience")]
    ambience_dir: PathBuf,

    /// Output directory
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Fade in/out length (ms)
    #[arg(long, default_value_t = 3_000)]
    fade: u64,

    /// Music volume multiplier (0 = silent, 1 = original, 2 = double)
    #[arg(long, default_value_t = 1.0)]
    music_volume: f64,

    /// Ambient volume multiplier (0 = silent, 1 = original, 2 = double)
    #[arg(long, default_value_t = 1.0)]
    ambient_volume: f64,

    /// Output sample rate (Hz)
    #[arg(
        long,
        default_value_t = 44_100,
        value_parser = clap::value_parser!(u32).range(MIN_SAMPLE_RATE as i64..)
    )]
    sample_rate: u32,

    /// Output channel count
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..=8))]
    channels: u16,

    /// RNG seed for the ambient choice
    #[arg(long)]
    seed: Option<u64>,
}

// ─── Plan ────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Dry run: print the paragraph-to-clip assignments")]
struct PlanArgs {
    #[command(flatten)]
    shared: SharedArgs,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    let log_level = match &cli.command {
        Command::Render(a) if a.shared.verbose => "debug",
        Command::Plan(a) if a.shared.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Render(args) => run_render(args),
        Command::Plan(args) => run_plan(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn print_outcomes(outcomes: &[ParagraphOutcome]) {
    for outcome in outcomes {
        match outcome {
            ParagraphOutcome::Assigned { index, assignment } => println!(
                "  {:>3}  {:>8.2}s  {}",
                index + 1,
                assignment.planned_duration_ms as f64 / 1000.0,
                assignment.clip_id
            ),
            ParagraphOutcome::Skipped {
                index,
                planned_duration_ms,
                reason,
            } => println!(
                "  {:>3}  {:>8.2}s  (skipped: {})",
                index + 1,
                *planned_duration_ms as f64 / 1000.0,
                reason
            ),
        }
    }
}

// ─── Render runner ───────────────────────────────────────────────

fn run_render(args: RenderArgs) -> Result<()> {
    let paths = RenderPaths {
        text_emotions: args.shared.text.clone(),
        music_library: args.shared.library.clone(),
        music_dir: args.shared.music_dir.clone(),
        ambience_dir: args.ambience_dir,
        output_dir: args.output_dir,
    };

    let config = RenderConfig {
        total_duration_ms: args.shared.duration,
        crossfade_ms: args.shared.crossfade,
        fade_ms: args.fade,
        music_volume: Volume(args.music_volume),
        ambient_volume: Volume(args.ambient_volume),
        format: AudioFormat::new(args.sample_rate, args.channels),
        unavailable_policy: args.shared.policy(),
        seed: args.seed,
    };

    let result = render(&paths, &config)?;

    println!("Paragraphs:");
    print_outcomes(&result.plan.outcomes);
    println!("Music: {}", result.generated_music.display());
    match &result.ambient {
        Some(ambient) => {
            println!("Mixed with ambient sound: {}", ambient.display());
            println!(
                "Ambient volume multiplier: {:.2} ({})",
                config.ambient_volume.0,
                config.ambient_volume.gain()
            );
            println!(
                "Music volume multiplier: {:.2} ({})",
                config.music_volume.0,
                config.music_volume.gain()
            );
        }
        None => println!("No ambient sounds found in {}", paths.ambience_dir.display()),
    }
    println!("Output: {}", result.final_output.display());
    println!("Final output length: {:.2} seconds", result.output_ms as f64 / 1000.0);

    Ok(())
}

// ─── Plan runner ─────────────────────────────────────────────────

fn run_plan(args: PlanArgs) -> Result<()> {
    let text = TextEmotions::from_json_file(&args.shared.text)?;
    let library = ClipLibrary::from_json_file(&args.shared.library)?;
    let source = DirectoryClipSource::new(&args.shared.music_dir, AudioFormat::default());

    // Decode each match so the dry run skips the same clips a render would.
    let result = plan(
        &text.paragraphs,
        &library,
        |id| source.load_clip(id).map(|_| ()),
        args.shared.duration,
        args.shared.crossfade,
        args.shared.policy(),
    );

    println!(
        "{} paragraphs, {} clips in library, {} assigned, {} skipped",
        text.paragraphs.len(),
        library.len(),
        result.used.len(),
        result.skipped()
    );
    print_outcomes(&result.outcomes);

    Ok(())
}
