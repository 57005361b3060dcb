use anyhow::{Context, Result};
use clap::Parser;
use mend::buffer::FileBuffer;
use mend::build::{BuildRunner, CommandBuildRunner};
use mend::config::Config;
use mend::diagnostics;
use mend::rpc::{HttpTransport, RpcClient};
use mend::verify::{LoopEvent, LoopOptions, VerificationLoop};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "mend",
    about = "A build-diagnose-fix-apply companion for your codebase",
    version
)]
struct Args {
    /// Path to the project (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Source file the fixes are applied to
    #[arg(short, long, required_unless_present = "check")]
    file: Option<PathBuf>,

    /// Build command run in the project directory
    #[arg(short, long, default_value = "make")]
    build_cmd: String,

    /// Maximum build-fix cycles (overrides the config file)
    #[arg(short, long)]
    max_cycles: Option<u32>,

    /// Fixing service endpoint (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Run a single build, print diagnostics, and exit (no fixing)
    #[arg(short, long)]
    check: bool,

    /// Skip the rebuild after each applied fix
    #[arg(long)]
    no_reverify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let path = args.path.canonicalize().context("project path not found")?;

    let mut config = Config::load();
    if let Some(max_cycles) = args.max_cycles {
        config.max_cycles = max_cycles;
    }
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if args.no_reverify {
        config.reverify_after_apply = false;
    }

    let runner = CommandBuildRunner::new(
        args.build_cmd,
        Duration::from_secs(config.build_timeout_secs),
    );

    if args.check {
        return check_once(&runner, &path);
    }

    let file = args
        .file
        .context("--file is required unless --check is given")?;
    let mut buffer = FileBuffer::open(&file)
        .with_context(|| format!("could not read {}", file.display()))?;

    eprintln!("🔧 Connecting to fixing service at {}...", config.endpoint);
    let mut client = RpcClient::new(Arc::new(HttpTransport::new(config.endpoint.clone())))
        .with_max_retries(config.max_retries)
        .with_attempt_timeout(Duration::from_secs(config.rpc_timeout_secs));
    client.connect().await.context("handshake failed")?;

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            print_event(&event);
        }
    });

    let looper = VerificationLoop::new(Arc::new(runner), client, LoopOptions::from(&config))
        .with_events(tx);

    let result = looper.run(&path, &mut buffer).await;

    // Dropping the loop drops the event sender; the printer then drains and
    // exits.
    drop(looper);
    let _ = printer.join();

    println!("\n{}", result.summary());
    match result.status {
        mend::verify::LoopStatus::Succeeded => Ok(()),
        _ => std::process::exit(1),
    }
}

/// Single build pass: report diagnostics and set the exit code.
fn check_once(runner: &CommandBuildRunner, path: &std::path::Path) -> Result<()> {
    eprintln!("🔨 Building...");
    let output = runner.run(path)?;
    let diags = diagnostics::parse(&output.raw_output);
    println!("{}", diagnostics::format_diagnostics(&diags));

    let errors = diagnostics::errors_only(&diags).len();
    if output.success && errors == 0 {
        eprintln!("  ✨ Build clean");
        Ok(())
    } else {
        eprintln!("  {} error(s)", errors);
        std::process::exit(1);
    }
}

fn print_event(event: &LoopEvent) {
    match event {
        LoopEvent::CycleStarted { cycle, max_cycles } => {
            eprintln!("🔨 Cycle {}/{}: building...", cycle, max_cycles);
        }
        LoopEvent::BuildFinished { errors, warnings } => {
            eprintln!("  {} error(s), {} warning(s)", errors, warnings);
        }
        LoopEvent::FixApplied { stats } => {
            eprintln!(
                "  ✏️  Fix applied: +{} -{} ~{}",
                stats.additions, stats.deletions, stats.modifications
            );
        }
        LoopEvent::CycleFinished { status, .. } => {
            eprintln!("  → {}", status.label());
        }
        LoopEvent::PhaseChanged(_) | LoopEvent::Finished(_) => {}
    }
}
