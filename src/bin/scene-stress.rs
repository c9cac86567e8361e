use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueEnum};
use scene_stress::{
    HarnessConfig, ObjectKind, OutputConfig,
    client::{FatalAction, stderr_status_callback},
};
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "scene-stress", version)]
struct Cli {
    /// JSON config; every field is optional.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory rendered frames are written to.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Render without writing any images.
    #[arg(long, conflicts_with = "out_dir")]
    no_output: bool,

    /// Number of frames to render.
    #[arg(long)]
    frames: Option<u32>,

    /// Extra time each simulated render takes.
    #[arg(long)]
    render_delay_ms: Option<u64>,

    /// Make the simulated device report a fatal error when committing this kind of object.
    #[arg(long, value_enum)]
    fatal_on_commit: Option<FaultKind>,

    /// Remove an extension from the simulated device's list (repeatable).
    #[arg(long = "hide-extension")]
    hide_extension: Vec<String>,

    /// Library to load (`environment` reads SCENE_STRESS_LIBRARY).
    #[arg(long)]
    library: Option<String>,

    /// More logging (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// No logging.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FaultKind {
    World,
    Renderer,
    Camera,
    Frame,
    Geometry,
    Material,
    Sampler,
    Surface,
}

impl From<FaultKind> for ObjectKind {
    fn from(k: FaultKind) -> Self {
        match k {
            FaultKind::World => ObjectKind::World,
            FaultKind::Renderer => ObjectKind::Renderer,
            FaultKind::Camera => ObjectKind::Camera,
            FaultKind::Frame => ObjectKind::Frame,
            FaultKind::Geometry => ObjectKind::Geometry,
            FaultKind::Material => ObjectKind::Material,
            FaultKind::Sampler => ObjectKind::Sampler,
            FaultKind::Surface => ObjectKind::Surface,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = build_config(&cli)?;
    init_tracing(&cli, &cfg.log_level)?;
    tracing::info!(config = ?cfg, "resolved config");

    let status = stderr_status_callback(FatalAction::Exit(1));
    scene_stress::run_configured(&cfg, status)?;
    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut cfg = match &cli.config {
        Some(path) => HarnessConfig::from_json_file(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(dir) = &cli.out_dir {
        let prefix = cfg.output.take().unwrap_or_default().prefix;
        cfg.output = Some(OutputConfig {
            dir: dir.clone(),
            prefix,
        });
    }
    if cli.no_output {
        cfg.output = None;
    }
    if let Some(frames) = cli.frames {
        cfg.frame_count = frames;
    }
    if let Some(ms) = cli.render_delay_ms {
        cfg.sim.render_delay_ms = ms;
    }
    if let Some(kind) = cli.fatal_on_commit {
        cfg.sim.fatal_on_commit = Some(kind.into());
    }
    cfg.sim
        .hidden_extensions
        .extend(cli.hide_extension.iter().cloned());
    if let Some(library) = &cli.library {
        cfg.library = library.clone();
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn init_tracing(cli: &Cli, configured: &str) -> anyhow::Result<()> {
    let level = if cli.quiet {
        LevelFilter::OFF
    } else {
        match cli.verbose {
            0 => configured
                .parse::<LevelFilter>()
                .with_context(|| format!("invalid log_level '{configured}'"))?,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}
