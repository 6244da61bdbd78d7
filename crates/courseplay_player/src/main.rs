// SPDX-License-Identifier: MIT OR Apache-2.0
//! CoursePlay headless player
//!
//! Loads a courseware document, plays it on a simulated frame clock and logs
//! every scene change and session event.

mod adapter;
mod audio;
mod config;

use adapter::LoggingSceneAdapter;
use anyhow::{Context, Result};
use audio::SimulatedAudioHost;
use clap::Parser;
use config::PlayerConfig;
use courseplay_sequencer::{CoursewareDocument, PlaybackState, SessionEvent, TimelineSession};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "courseplay")]
#[command(about = "Play a courseware outline headlessly and log its scene changes")]
#[command(version)]
struct Cli {
    /// Courseware document (JSON)
    document: PathBuf,

    /// Player settings (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Playback rate
    #[arg(short, long)]
    rate: Option<f64>,

    /// Start at this animation step
    #[arg(long, conflicts_with = "segment")]
    step: Option<String>,

    /// Start at this segment index
    #[arg(long)]
    segment: Option<usize>,

    /// Stop after this many seconds of playback
    #[arg(long, default_value_t = 600.0)]
    max_seconds: f64,

    /// Sleep between frames instead of running as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Ignore narration audio and time every item on the wall clock
    #[arg(long)]
    no_audio: bool,

    /// Write the effective settings to this path and exit
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PlayerConfig::load_or_default(path)
            .with_context(|| format!("Failed to load player config {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    init_tracing(&config.log_filter);
    tracing::info!("Starting CoursePlay v{}", env!("CARGO_PKG_VERSION"));

    if let Some(path) = &cli.write_config {
        config
            .save(path)
            .with_context(|| format!("Failed to write player config {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let summary = run(&cli, &config)?;
    println!(
        "Played {:.2}s of {:.2}s in {} frames ({}), {} render calls, {} warnings",
        summary.time,
        summary.duration,
        summary.frames,
        summary.state.name(),
        summary.render_calls,
        summary.warnings,
    );

    Ok(())
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

struct PlaybackSummary {
    time: f64,
    duration: f64,
    frames: u64,
    state: PlaybackState,
    render_calls: usize,
    warnings: usize,
}

fn run(cli: &Cli, config: &PlayerConfig) -> Result<PlaybackSummary> {
    let json = std::fs::read_to_string(&cli.document)
        .with_context(|| format!("Failed to read {}", cli.document.display()))?;
    let document = CoursewareDocument::from_json(&json)
        .with_context(|| format!("{} is not a courseware document", cli.document.display()))?;

    let audio = SimulatedAudioHost::new();
    let mut session = TimelineSession::new(config.session.clone());
    if config.simulate_audio && !cli.no_audio {
        session.set_audio_host(Some(Box::new(audio.clone())));
    }
    session.on_event(log_event);

    session.load_outline(document).context("Failed to load outline")?;
    tracing::info!(
        session = %session.id(),
        segments = session.segments().len(),
        duration = session.duration(),
        "outline loaded"
    );

    if let Some(rate) = cli.rate {
        session.set_rate(rate);
    }
    if let Some(index) = cli.segment {
        session.seek_to_segment(index)?;
    }
    if let Some(step) = &cli.step {
        session.seek_to_step(step)?;
    }

    let mut adapter = LoggingSceneAdapter::new();
    let frame = config.frame_interval();
    let pacing = cli.realtime.then(|| Duration::from_secs_f64(frame));
    let (frames, warnings) = drive(
        &mut session,
        &audio,
        &mut adapter,
        frame,
        cli.max_seconds,
        pacing,
    )?;

    Ok(PlaybackSummary {
        time: session.time(),
        duration: session.duration(),
        frames,
        state: session.state(),
        render_calls: adapter.calls,
        warnings,
    })
}

/// Play until the outline ends or `max_seconds` of frames have run.
///
/// Returns the number of frames ticked and the warnings seen.
fn drive(
    session: &mut TimelineSession,
    audio: &SimulatedAudioHost,
    adapter: &mut LoggingSceneAdapter,
    frame: f64,
    max_seconds: f64,
    pacing: Option<Duration>,
) -> Result<(u64, usize)> {
    let mut frames = 0u64;
    let mut warnings = 0;

    // Publish the landing state before the clock moves.
    session.tick(0.0).apply_to(adapter);
    session.play()?;
    warnings += count_warnings(session.take_events());

    while session.state() != PlaybackState::Ended {
        if frames as f64 * frame >= max_seconds {
            tracing::warn!(max_seconds, "time limit reached, stopping");
            break;
        }

        audio.advance(frame);
        session.tick(frame).apply_to(adapter);
        frames += 1;
        warnings += count_warnings(session.take_events());

        if let Some(pause) = pacing {
            std::thread::sleep(pause);
        }
    }

    Ok((frames, warnings))
}

fn count_warnings(events: Vec<SessionEvent>) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, SessionEvent::Warning(_)))
        .count()
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { from, to } => {
            tracing::debug!(from = from.name(), to = to.name(), "playback state");
        }
        SessionEvent::SegmentChanged { index, id } => {
            tracing::info!(index, id = %id, "segment");
        }
        SessionEvent::ItemStarted { item, id } => {
            tracing::info!(segment = item.segment, item = item.item, id = %id, "item");
        }
        SessionEvent::Subtitle { text, .. } => {
            tracing::info!("\u{201c}{}\u{201d}", text);
        }
        SessionEvent::Step { step, animation } => {
            tracing::info!(animation = %animation, step = %step.id, name = %step.name, "step");
        }
        SessionEvent::Ended => tracing::info!("outline finished"),
        SessionEvent::Warning(warning) => tracing::warn!("{}", warning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = include_str!("../../../demos/engine.json");

    fn demo_session(audio: &SimulatedAudioHost) -> TimelineSession {
        let document = CoursewareDocument::from_json(DEMO).unwrap();
        let mut session = TimelineSession::new(PlayerConfig::default().session)
            .with_audio_host(audio.clone());
        session.load_outline(document).unwrap();
        session
    }

    #[test]
    fn test_demo_plays_to_the_end() {
        let audio = SimulatedAudioHost::new();
        let mut session = demo_session(&audio);
        assert!((session.duration() - 11.5).abs() < 1e-9);

        let mut adapter = LoggingSceneAdapter::new();
        let (frames, warnings) =
            drive(&mut session, &audio, &mut adapter, 1.0 / 60.0, 60.0, None).unwrap();

        assert_eq!(session.state(), PlaybackState::Ended);
        assert_eq!(warnings, 0);
        assert!(frames >= 600);
        assert_eq!(adapter.pointers.len(), 1);
        assert_eq!(adapter.visible.get("cover"), Some(&false));
        assert_eq!(adapter.highlighted.get("valve"), Some(&false));
        assert_eq!(adapter.annotations.get("valve-note"), Some(&false));
        let piston = adapter.transforms.get("piston").unwrap();
        assert!((piston.position[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_time_limit_stops_playback() {
        let audio = SimulatedAudioHost::new();
        let mut session = demo_session(&audio);
        let mut adapter = LoggingSceneAdapter::new();

        let (frames, _) = drive(&mut session, &audio, &mut adapter, 0.5, 2.0, None).unwrap();

        assert_eq!(frames, 4);
        assert_eq!(session.state(), PlaybackState::Playing);
        assert!(session.time() <= 2.0 + 1e-9);
    }

    #[test]
    fn test_cli_rejects_step_with_segment() {
        let parsed = Cli::try_parse_from([
            "courseplay",
            "demo.json",
            "--step",
            "apart",
            "--segment",
            "1",
        ]);
        assert!(parsed.is_err());
    }
}
