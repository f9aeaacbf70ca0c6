use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use veriface_core::matcher::{EuclideanMatcher, Matcher};
use veriface_core::replay::{Fixture, FixtureModel, FixtureSource};
use veriface_core::{
    cancellation, ActiveSource, Config, FaceDescriptor, FrameSource, LivenessRunner,
    SessionOutcome,
};
use veriface_hw::{Camera, CameraSource, StillImageSource};

#[derive(Parser)]
#[command(name = "veriface", about = "Veriface liveness and face-match tooling")]
struct Cli {
    /// TOML config file (VERIFACE_* env vars still override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a liveness session over a recorded JSON fixture
    Replay {
        /// Fixture file
        fixture: PathBuf,
    },
    /// Compare two face descriptors stored as JSON
    Compare {
        /// Selfie descriptor file
        selfie: PathBuf,
        /// Document photo descriptor file
        document: PathBuf,
    },
    /// Acquire a frame source, pull frames, release it
    Probe {
        /// V4L2 device path (e.g., /dev/video0)
        #[arg(short, long, conflicts_with = "image", required_unless_present = "image")]
        device: Option<String>,
        /// Still image path
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Frames to pull
        #[arg(short, long, default_value_t = 10)]
        frames: usize,
    },
    /// List V4L2 capture devices
    Devices,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { fixture } => replay(&config, &fixture).await,
        Commands::Compare { selfie, document } => compare(&config, &selfie, &document),
        Commands::Probe { device, image, frames } => match (device, image) {
            (Some(device), _) => probe(&mut CameraSource::new(device), frames).await,
            (None, Some(image)) => probe(&mut StillImageSource::from_path(image), frames).await,
            (None, None) => bail!("either --device or --image is required"),
        },
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}\t{}\t{} ({})", d.path, d.name, d.driver, d.bus);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", toml::to_string(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => Config::load(p)?,
        None => Config::default(),
    };
    config.apply_env()?;
    Ok(config)
}

async fn replay(config: &Config, fixture_path: &Path) -> Result<()> {
    let fixture = Fixture::load(fixture_path)?;
    tracing::info!(path = %fixture_path.display(), frames = fixture.frames.len(), "replaying fixture");

    let mut runner = LivenessRunner::new(
        Arc::new(FixtureModel::new(fixture)),
        config.liveness.clone(),
    );
    let mut source = FixtureSource::new();

    let (handle, signal) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    match runner.run(&mut source, signal).await? {
        SessionOutcome::Completed(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        SessionOutcome::Cancelled(c) => {
            bail!(
                "session {} cancelled after {} of {} challenges ({} completed)",
                c.session_id,
                c.attempted,
                runner.challenges().len(),
                c.completed
            )
        }
    }
}

fn read_descriptor(path: &Path) -> Result<FaceDescriptor> {
    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&src).with_context(|| format!("invalid descriptor in {}", path.display()))
}

fn compare(config: &Config, selfie: &Path, document: &Path) -> Result<()> {
    let selfie = read_descriptor(selfie)?;
    let document = read_descriptor(document)?;
    let matcher = EuclideanMatcher { thresholds: config.matching };
    let result = matcher.compare(&selfie, &document)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn probe<S: FrameSource>(source: &mut S, frames: usize) -> Result<()> {
    let mut active = ActiveSource::acquire(source).await?;

    let mut dark = 0usize;
    let mut brightness = 0.0f32;
    for _ in 0..frames {
        let frame = active.next_frame().await?;
        if frame.is_dark {
            dark += 1;
        }
        brightness += frame.avg_brightness();
        println!(
            "frame {:>4}  {}x{}  brightness {:>6.1}{}",
            frame.sequence,
            frame.width,
            frame.height,
            frame.avg_brightness(),
            if frame.is_dark { "  (dark)" } else { "" }
        );
    }
    drop(active);

    if frames > 0 {
        println!(
            "{frames} frames, {dark} dark, mean brightness {:.1}",
            brightness / frames as f32
        );
    }
    Ok(())
}
