use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use log::info;

use juliacam::antialias::AntialiasingMode;
use juliacam::capture::ProcessingWorker;
use juliacam::config::{load_config, AppConfig};
use juliacam::feedback::SimulatedCamera;
use juliacam::kernel::KernelLibrary;
use juliacam::warp::WarpVariant;
use juliacam::{ControlSurface, Frame};

#[derive(Debug, Parser)]
#[command(name = "juliacam")]
#[command(about = "Real-time video-feedback fractal warp")]
struct Cli {
    /// YAML config file. Built-in defaults apply when omitted.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Warp a single image.
    Render {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[command(flatten)]
        overrides: ParamOverrides,
    },
    /// Run the camera-at-the-screen loop headless and write every displayed frame.
    Feedback {
        seed: PathBuf,
        #[arg(short = 'o', long = "out-dir")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 30)]
        frames: u32,
        /// Weight of the previous displayed frame in each capture.
        #[arg(long, default_value_t = 0.85)]
        gain: f32,
        #[command(flatten)]
        overrides: ParamOverrides,
    },
    /// Validate a config file and report which kernels load.
    Check { path: PathBuf },
}

#[derive(Debug, Args)]
struct ParamOverrides {
    #[arg(long)]
    warp: Option<WarpVariant>,
    #[arg(long)]
    antialiasing: Option<AntialiasingMode>,
    #[arg(long)]
    upscale: Option<f32>,
    #[arg(long)]
    zoom: Option<f32>,
    /// Warp origin as "x,y" fractions of the output.
    #[arg(long, value_parser = parse_center)]
    center: Option<(f32, f32)>,
    #[arg(long)]
    aberration: bool,
}

impl ParamOverrides {
    fn apply(&self, controls: &ControlSurface) -> Result<()> {
        if let Some(variant) = self.warp {
            controls.set_warp_variant(variant);
        }
        if let Some(mode) = self.antialiasing {
            controls.set_antialiasing(mode);
        }
        if let Some(factor) = self.upscale {
            controls.set_upscale_factor(factor)?;
        }
        if let Some(zoom) = self.zoom {
            controls.set_zoom_level(zoom)?;
        }
        if let Some((x, y)) = self.center {
            controls.set_center(x, y)?;
        }
        if self.aberration {
            controls.set_aberration_enabled(true);
        }
        Ok(())
    }
}

fn parse_center(raw: &str) -> Result<(f32, f32), String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected \"x,y\", got '{raw}'"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<f32>()
            .map_err(|error| format!("invalid coordinate '{value}': {error}"))
    };
    Ok((parse(x)?, parse(y)?))
}

fn version() -> &'static str {
    match option_env!("JULIACAM_GIT_HASH") {
        Some(hash) => {
            Box::leak(format!("{} ({hash})", env!("CARGO_PKG_VERSION")).into_boxed_str())
        }
        None => env!("CARGO_PKG_VERSION"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Cli::command().version(version()).get_matches();
    let cli = Cli::from_arg_matches(&matches)?;
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Render {
            input,
            output,
            overrides,
        } => run_render(&config, &overrides, &input, &output),
        Commands::Feedback {
            seed,
            out_dir,
            frames,
            gain,
            overrides,
        } => run_feedback(&config, &overrides, &seed, &out_dir, frames, gain),
        Commands::Check { path } => run_check(&path),
    }
}

fn open_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgba8();
    Ok(Frame::from(image))
}

fn save_frame(frame: Frame, path: &Path) -> Result<()> {
    frame
        .into_image()
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn run_render(
    config: &AppConfig,
    overrides: &ParamOverrides,
    input: &Path,
    output: &Path,
) -> Result<()> {
    let pipeline = config.build_pipeline()?;
    overrides.apply(&pipeline.controls())?;

    let frame = open_frame(input)?;
    let warped = pipeline
        .handle_frame(&frame)
        .ok_or_else(|| anyhow!("{} has no pixels", input.display()))?;
    let (width, height) = warped.extent();
    save_frame(warped, output)?;
    println!("Wrote {} ({width}x{height})", output.display());
    Ok(())
}

fn run_feedback(
    config: &AppConfig,
    overrides: &ParamOverrides,
    seed: &Path,
    out_dir: &Path,
    frames: u32,
    gain: f32,
) -> Result<()> {
    let seed = open_frame(seed)?;
    if seed.is_empty() {
        bail!("seed image has no pixels");
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let pipeline = Arc::new(config.build_pipeline()?);
    overrides.apply(&pipeline.controls())?;

    let (displayed_tx, displayed) = mpsc::channel();
    let worker = ProcessingWorker::spawn(pipeline, move |frame: Frame, timestamp: Duration| {
        let _ = displayed_tx.send((frame, timestamp));
    })?;
    let mut camera = SimulatedCamera::new(seed, gain);

    for index in 0..frames {
        worker.submit(camera.capture())?;
        let (frame, timestamp): (Frame, _) = displayed
            .recv()
            .context("frame-processing worker stopped early")?;
        save_frame(frame.clone(), &out_dir.join(format!("frame_{index:04}.png")))?;
        camera.display(frame);

        if index % 10 == 0 {
            info!("displayed frame {}/{} at {:?}", index + 1, frames, timestamp);
        }
    }

    let stats = worker.shutdown()?;
    println!(
        "Wrote {} frames to {} ({} dropped)",
        stats.processed,
        out_dir.display(),
        stats.dropped
    );
    Ok(())
}

fn run_check(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let library = KernelLibrary::load(config.backend, config.threads)?;
    let params = config.parameters;

    println!(
        "OK: {} (warp {}, antialiasing {}, upscale {}, zoom {}, aberration {})",
        path.display(),
        params.warp_variant,
        params.antialiasing,
        params.upscale_factor,
        params.zoom_level,
        if params.aberration_enabled { "on" } else { "off" }
    );
    println!("Kernels: {library:?}");
    Ok(())
}
