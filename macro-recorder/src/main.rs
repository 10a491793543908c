//! `macro` - record and replay keyboard/mouse macros
//!
//! Usage:
//!   macro record [PATH] [-m on|off]
//!   macro run [PATH] [-s SPEED] [-d overlay|none]

use std::{
    future,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use macro_recorder::{
    countdown::TerminalCountdown,
    input::{DesktopSink, DesktopSource, InputSource, Subscription},
    run_macro_with, MacroLog, MacroRecorder, MotionCapture, PlaybackOutcome, PlayerConfig, RecorderConfig,
};
use tokio::runtime::Runtime;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_PATH: &str = "macro.json";
const INTERRUPTED: u8 = 130;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "macro")]
#[command(about = "Record and replay keyboard/mouse macros. Press ESC to stop either mode.")]
struct Args {
    /// Log debug output (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record input until ESC is pressed
    Record {
        /// Output JSON path
        #[arg(default_value = DEFAULT_PATH)]
        path: PathBuf,

        /// Mouse motion: `on` keeps every sample, `off` keeps only the last
        /// position before each click, key or scroll
        #[arg(short = 'm', long = "motion", value_enum, default_value_t = MotionArg::On)]
        motion: MotionArg,
    },
    /// Run a recorded macro
    Run {
        /// Input JSON path
        #[arg(default_value = DEFAULT_PATH)]
        path: PathBuf,

        /// Playback speed multiplier
        #[arg(short, long, default_value_t = 1.0, value_parser = parse_speed)]
        speed: f64,

        /// Countdown display
        #[arg(short = 'd', long = "dialog", value_enum, default_value_t = DialogArg::Overlay)]
        dialog: DialogArg,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MotionArg {
    On,
    Off,
}

impl From<MotionArg> for MotionCapture {
    fn from(arg: MotionArg) -> Self {
        match arg {
            MotionArg::On => MotionCapture::Full,
            MotionArg::Off => MotionCapture::Compact,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DialogArg {
    Overlay,
    None,
}

fn parse_speed(raw: &str) -> Result<f64, String> {
    let speed: f64 = raw.parse().map_err(|_| format!("`{}` is not a number", raw))?;
    if speed.is_finite() && speed > 0.0 {
        Ok(speed)
    } else {
        Err("speed must be greater than zero".to_string())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    // Prompts and hook startup block, so they happen before the runtime starts
    let result = match args.command {
        Command::Record { path, motion } => record(&path, motion.into()),
        Command::Run { path, speed, dialog } => run(&path, speed, dialog),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn runtime() -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")
}

fn subscribe_desktop(purpose: &str) -> anyhow::Result<Subscription> {
    DesktopSource::default()
        .subscribe()
        .with_context(|| format!("Cannot {} without access to global input", purpose))
}

fn record(path: &Path, motion: MotionCapture) -> anyhow::Result<ExitCode> {
    if path.exists() {
        let stdin = io::stdin();
        let confirmed = confirm_overwrite(path, &mut stdin.lock(), &mut io::stdout())
            .context("Failed to read overwrite confirmation")?;
        if !confirmed {
            println!("🚫 Recording cancelled (user declined to overwrite).");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let recorder = MacroRecorder::new(RecorderConfig {
        motion,
        ..Default::default()
    });
    let subscription = subscribe_desktop("record")?;
    let started_at = Instant::now();

    println!("🎙 Recording… Press ESC at any time to stop.");
    let recorded = runtime()?.block_on(async {
        tokio::select! {
            log = recorder.record_from(subscription, started_at) => log.map(Some),
            _ = tokio::signal::ctrl_c() => Ok(None),
        }
    })?;
    let Some(log) = recorded else {
        warn!("Interrupted; nothing was saved");
        return Ok(ExitCode::from(INTERRUPTED));
    };

    log.save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("✅ Recorded {} events → {}", log.len(), path.display());
    Ok(ExitCode::SUCCESS)
}

fn run(path: &Path, speed: f64, dialog: DialogArg) -> anyhow::Result<ExitCode> {
    let log = MacroLog::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let config = PlayerConfig {
        speed,
        ..Default::default()
    };
    config.validate()?;
    let countdown = match dialog {
        DialogArg::Overlay => Some(TerminalCountdown::stderr()),
        DialogArg::None => None,
    };
    debug!("Countdown display: {:?}", dialog);
    let subscription = subscribe_desktop("watch for the abort key")?;

    println!("▶ Running {} events at {}x… (press ESC to abort)", log.len(), speed);
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let interrupt = async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => flag.store(true, Ordering::SeqCst),
            Err(e) => {
                debug!("Ctrl-C handler unavailable: {}", e);
                future::pending::<()>().await
            }
        }
    };
    let outcome = runtime()?.block_on(run_macro_with(
        &log,
        subscription,
        DesktopSink::new(),
        config,
        countdown,
        interrupt,
    ))?;

    if interrupted.load(Ordering::SeqCst) {
        warn!("Interrupted after {} events", outcome.dispatched());
        return Ok(ExitCode::from(INTERRUPTED));
    }
    match outcome {
        PlaybackOutcome::Completed { .. } => println!("✅ Run finished."),
        PlaybackOutcome::Aborted { dispatched, remaining, .. } => {
            println!("🛑 Run aborted by user ({} dispatched, {} skipped).", dispatched, remaining)
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Ask until the answer is yes or no. Empty input and end of input mean no.
fn confirm_overwrite<R: BufRead, W: Write>(path: &Path, input: &mut R, output: &mut W) -> io::Result<bool> {
    loop {
        write!(output, "⚠️ File '{}' already exists. Overwrite? [y/N]: ", path.display())?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" | "" => return Ok(false),
            _ => writeln!(output, "Please answer 'y' or 'n'.")?,
        }
    }
}
