use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use wray_core::SceneSettings;
use wray_marshal::RenderSession;
use wray_renderer::rgba_to_bytes;

const USAGE: &str = "Usage: wray <scene.json> [rounds] [duration_ms] [out.png]";

/// Command-line options
struct Args {
    scene: PathBuf,
    rounds: u32,
    duration_ms: u64,
    output: PathBuf,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);

        let Some(scene) = args.next() else {
            bail!(USAGE);
        };
        let rounds = match args.next() {
            Some(s) => s.parse().with_context(|| format!("invalid round count \"{s}\""))?,
            None => 10,
        };
        let duration_ms = match args.next() {
            Some(s) => s.parse().with_context(|| format!("invalid duration \"{s}\""))?,
            None => 1000,
        };
        let output = args.next().unwrap_or_else(|| "wray.png".into());

        Ok(Self {
            scene: scene.into(),
            rounds,
            duration_ms,
            output: output.into(),
        })
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse()?;

    log::info!("Loading scene {}", args.scene.display());
    let scene = SceneSettings::load(&args.scene)
        .with_context(|| format!("failed to load {}", args.scene.display()))?;

    let session = RenderSession::start().context("failed to start the render marshal")?;

    let start = Instant::now();
    session
        .assign_settings(scene)
        .context("failed to assign render settings")?;
    log::info!("Scene ready in {:.2?}", start.elapsed());

    for round in 1..=args.rounds {
        let stats = session
            .render(args.duration_ms)
            .with_context(|| format!("render round {round} failed"))?;
        log::info!(
            "Round {}/{}: {:.1} samples per pixel, {} samples/s",
            round,
            args.rounds,
            stats.avg_samples_per_pixel,
            stats.samples_per_second
        );
    }

    let buffer = session
        .upload_render_buffer(true)
        .context("failed to collect the render buffer")?;
    session.shutdown();

    log::info!(
        "Rendered {}x{} at {:.1} samples per pixel in {:.2?}",
        buffer.width,
        buffer.height,
        buffer.avg_samples_per_pixel,
        start.elapsed()
    );

    let image = image::RgbaImage::from_raw(
        buffer.width as u32,
        buffer.height as u32,
        rgba_to_bytes(&buffer.pixels),
    )
    .context("render buffer does not match its resolution")?;
    image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    log::info!("Wrote {}", args.output.display());
    Ok(())
}
