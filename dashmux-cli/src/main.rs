//! dashmux: combine a DASH video download and its audio download into one MP4.
//!
//! Usage:
//!   dashmux --video <file> [--audio <file>] -o <file> [options]
//!
//! Options:
//!   --video <file>          Video stream (fragmented or progressive MP4)
//!   --audio <file>          Audio stream; omit for a video-only remux
//!   -o, --output <file>     Output path
//!   --mode <mode>           auto | progressive | fragmented (default: auto)
//!   --config <file>         Load MuxConfig JSON; --mode overrides its strategy
//!   -v, --verbose           Debug logging (RUST_LOG takes precedence)

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Instant;

use dm_common::{MuxConfig, MuxProgress, MuxStrategy};
use dm_mux::Remuxer;

struct Args {
    video: PathBuf,
    audio: Option<PathBuf>,
    output: PathBuf,
    mode: Option<MuxStrategy>,
    config: Option<PathBuf>,
    verbose: bool,
}

fn print_usage() {
    eprintln!("Usage: dashmux --video <file> [--audio <file>] -o <file> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --mode <mode>        auto | progressive | fragmented (default: auto)");
    eprintln!("  --config <file>      Load MuxConfig JSON");
    eprintln!("  -v, --verbose        Debug logging");
    eprintln!("  -h, --help           Show this help");
}

fn parse_mode(value: &str) -> Result<MuxStrategy> {
    match value {
        "auto" => Ok(MuxStrategy::Auto),
        "progressive" => Ok(MuxStrategy::Progressive),
        "fragmented" => Ok(MuxStrategy::Fragmented),
        other => bail!("unknown --mode '{other}' (expected auto, progressive or fragmented)"),
    }
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut video = None;
    let mut audio = None;
    let mut output = None;
    let mut mode = None;
    let mut config = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--video", Some(v)) => video = Some(PathBuf::from(v)),
            ("--audio", Some(v)) => audio = Some(PathBuf::from(v)),
            ("-o" | "--output", Some(v)) => output = Some(PathBuf::from(v)),
            ("--mode", Some(v)) => mode = Some(parse_mode(v)?),
            ("--config", Some(v)) => config = Some(PathBuf::from(v)),
            ("-v" | "--verbose", _) => {
                verbose = true;
                i += 1;
                continue;
            }
            ("-h" | "--help", _) => {
                print_usage();
                std::process::exit(0);
            }
            (flag, _) => bail!("unexpected argument '{flag}'"),
        }
        i += 2;
    }

    Ok(Args {
        video: video.context("--video is required")?,
        audio,
        output: output.context("-o/--output is required")?,
        mode,
        config,
        verbose,
    })
}

fn load_config(args: &Args) -> Result<MuxConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<MuxConfig>(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => MuxConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.strategy = mode;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let raw: Vec<String> = std::env::args().collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(err) => {
            print_usage();
            return Err(err);
        }
    };

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(&args)?;
    let video = std::fs::read(&args.video)
        .with_context(|| format!("reading video {}", args.video.display()))?;
    let audio = match &args.audio {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("reading audio {}", path.display()))?,
        ),
        None => None,
    };

    let started = Instant::now();
    let mut report = |event: &MuxProgress| tracing::info!("{event}");
    let output = Remuxer::new(config).remux(&video, audio.as_deref(), Some(&mut report));

    std::fs::write(&args.output, &output.bytes)
        .with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(
        strategy = %output.strategy,
        bytes = output.bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Wrote {}",
        args.output.display()
    );
    Ok(())
}
