mod cli;
mod error;
mod ffmpeg;
mod library;
mod probe;
mod process;
mod progress;
mod tui;
mod workflow;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use cli::{Cli, Command, EncodeArgs};
use error::KatError;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use workflow::{BatchOptions, StagingDir, Transcoder};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.command.shared().verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<KatError>()
                .map(KatError::exit_code)
                .unwrap_or(1);
            if matches!(err.downcast_ref::<KatError>(), Some(KatError::Interrupted)) {
                info!("Received interrupt");
            } else {
                error!("[{}] {err:#}", style("FAILED").red());
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Rename(args) => {
            library::rename_service(&args.shared.input, &args.shared.out, &args.options())?;
        }
        Command::Move(args) => {
            library::move_service(&args.shared.input, &args.shared.out)?;
        }
        Command::Encode(args) => encode(args)?,
    }
    Ok(())
}

fn encode(args: EncodeArgs) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    for sig in [SIGINT, SIGTERM] {
        signal_hook::flag::register(sig, Arc::clone(&interrupted))
            .context("failed to install signal handler")?;
    }

    let cfg = args.into_config()?;
    let tools = ffmpeg::resolve_tools(cfg.ffmpeg.clone(), cfg.ffprobe.clone())
        .context("ffmpeg/ffprobe are required for encoding")?;

    let pairs = if cfg.recursive {
        library::encode_pairs(&cfg.input, &cfg.out)
    } else {
        vec![(cfg.input.clone(), cfg.out.clone())]
    };
    info!("{} file(s) to encode, limit {}", pairs.len(), cfg.limit);

    let mut staging = StagingDir::create(cfg.staging_dir())?;
    debug!("staging in {}", staging.path().display());
    let transcoder = Transcoder::new(&tools)
        .keep_source(cfg.keep_source)
        .show_progress(console::Term::stdout().is_term())
        .cancel_on(&interrupted);
    let opts = BatchOptions {
        limit: cfg.limit,
        policy: cfg.policy,
        format: cfg.format,
    };
    let result = workflow::run_batch(
        &transcoder,
        &mut staging,
        &pairs,
        opts,
        &interrupted,
        tui::confirm_overwrite,
    );

    info!("Cleaning up...");
    staging.cleanup();

    let summary = result?;
    info!("{} encoded, {} skipped", summary.encoded, summary.skipped);
    Ok(())
}
