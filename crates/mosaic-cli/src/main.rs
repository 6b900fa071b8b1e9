use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mosaic_core::{OpaqueFrame, SessionConfig, SourceKind, SubmissionStrategy, UploadStrategy};
use mosaic_pipeline::{Session, SourceEvent};
use mosaic_render::GpuContext;

#[derive(Parser)]
#[command(
    name = "mosaic",
    version,
    about = "Mosaic — multi-stream GPU grid compositor",
    long_about = "Composites N independent sources onto one shared surface, each in its own\ncell of an auto-computed grid, at animation-frame cadence."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a compositing session against a synthetic source
    Run {
        /// Path to a TOML session config; the flags below are ignored when set
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of independent streams
        #[arg(long, default_value_t = 4)]
        streams: u32,

        /// Width of one grid cell
        #[arg(long, default_value_t = 320)]
        tile_width: u32,

        /// Height of one grid cell
        #[arg(long, default_value_t = 240)]
        tile_height: u32,

        /// Source kind: opaque-frame, still-image, planar-chunk
        #[arg(long, default_value = "planar-chunk")]
        source: String,

        /// Upload strategy: direct-write, staged-copy
        #[arg(long, default_value = "direct-write")]
        upload: String,

        /// Submission strategy: single, per-lane
        #[arg(long, default_value = "single")]
        submit: String,

        /// Draw-loop cadence in frames per second
        #[arg(long, default_value_t = 60)]
        fps: u32,

        /// Image served by every lane for the still-image source
        #[arg(long)]
        still: Option<PathBuf>,

        /// Seconds to run; 0 runs until Ctrl-C
        #[arg(long, default_value_t = 5)]
        duration: u64,
    },

    /// Print the selected GPU adapter
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run {
            config,
            streams,
            tile_width,
            tile_height,
            source,
            upload,
            submit,
            fps,
            still,
            duration,
        } => {
            let config = match config {
                Some(path) => SessionConfig::load_from_file(&path)
                    .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", path.display()))?,
                None => SessionConfig {
                    stream_count: streams,
                    tile_width,
                    tile_height,
                    source_kind: parse_source_kind(&source)?,
                    upload_strategy: parse_upload(&upload)?,
                    submission_strategy: parse_submit(&submit)?,
                    frame_rate: fps,
                    still_image: still,
                },
            };
            cmd_run(config, duration)
        }
        Commands::Info => cmd_info(),
    }
}

#[tokio::main]
async fn cmd_run(config: SessionConfig, duration: u64) -> Result<()> {
    let frame_rate = config.frame_rate;
    let source_kind = config.source_kind;
    let tile = (config.tile_width, config.tile_height);
    let viewport = config.viewport();
    tracing::info!(
        streams = config.stream_count,
        grid = viewport.col_row,
        surface_w = viewport.surface_width,
        surface_h = viewport.surface_height,
        "starting session"
    );
    let session = Session::spawn(config).context("failed to start session")?;

    let source = session.source();
    let pump = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / frame_rate as f64));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut frame_index: u64 = 0;
        loop {
            interval.tick().await;
            let event = match source_kind {
                SourceKind::OpaqueFrame => {
                    SourceEvent::Unit(synthetic_frame(tile.0, tile.1, frame_index))
                }
                SourceKind::StillImage | SourceKind::PlanarChunk => SourceEvent::Tick,
            };
            if source.send(event).is_err() {
                break;
            }
            frame_index += 1;
        }
    });

    if duration == 0 {
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(duration)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    pump.abort();
    let summary = session.stop().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_info() -> Result<()> {
    let gpu = GpuContext::init_blocking().context("failed to initialize GPU")?;
    let info = gpu.adapter.get_info();
    println!("adapter:  {}", info.name);
    println!("backend:  {:?}", info.backend);
    println!("type:     {:?}", info.device_type);
    println!("driver:   {} {}", info.driver, info.driver_info);
    println!("max 2d:   {}", gpu.max_surface_dimension());
    Ok(())
}

/// A moving solid-color frame standing in for a capture source.
fn synthetic_frame(width: u32, height: u32, frame_index: u64) -> OpaqueFrame {
    let phase = (frame_index % 510) as i64;
    let level = (255 - (phase - 255).abs()) as u8;
    OpaqueFrame::solid(
        width,
        height,
        frame_index * 16_667,
        [level, 255 - level, 0xd4, 0xff],
    )
}

fn parse_source_kind(value: &str) -> Result<SourceKind> {
    match value {
        "opaque-frame" => Ok(SourceKind::OpaqueFrame),
        "still-image" => Ok(SourceKind::StillImage),
        "planar-chunk" => Ok(SourceKind::PlanarChunk),
        other => anyhow::bail!("unknown source kind: {other}"),
    }
}

fn parse_upload(value: &str) -> Result<UploadStrategy> {
    match value {
        "direct-write" => Ok(UploadStrategy::DirectWrite),
        "staged-copy" => Ok(UploadStrategy::StagedCopy),
        other => anyhow::bail!("unknown upload strategy: {other}"),
    }
}

fn parse_submit(value: &str) -> Result<SubmissionStrategy> {
    match value {
        "single" => Ok(SubmissionStrategy::Single),
        "per-lane" => Ok(SubmissionStrategy::PerLane),
        other => anyhow::bail!("unknown submission strategy: {other}"),
    }
}
