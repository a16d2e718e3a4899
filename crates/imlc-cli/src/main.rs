//! imlc CLI
//!
//! Runs Intel Memory Latency Checker benchmarks from the terminal.

#![allow(clippy::doc_markdown)]
#![allow(clippy::needless_pass_by_value)]

use clap::{Parser, Subcommand};
use imlc_cli::{
    CliResult, ConsoleObserver, EXIT_INTERRUPTED, build_sink, elevation_warning, exit_code_for,
    open_config_store, parse_inject_delay, summary_json,
};
use imlc_core::{
    DispatchQueue, LogPathRegistry, ProcessSupervisor, RealToolLauncher, RunRequest,
    TestOrchestrator, Toggle, ToolContext, ToolLauncher, dispatch_channel,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How long the UI loop waits for the next update before re-checking
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "imlc")]
#[command(about = "Intel Memory Latency Checker front end", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file holding the MLC path
    #[arg(long, global = true, env = "IMLC_CONFIG")]
    config: Option<PathBuf>,

    /// Write the run log to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Use this MLC executable for one invocation without saving it
    #[arg(long, global = true, env = "IMLC_MLC")]
    mlc: Option<PathBuf>,

    /// Print the run summary as JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Idle latency and peak bandwidth of node 0
    Quick,

    /// Maximum bandwidth for five read/write mixes
    Bandwidth {
        /// Measure peak injection bandwidth instead of maximum bandwidth
        #[arg(long)]
        peak: bool,
    },

    /// L2 cache-to-cache transfer latencies
    Cache,

    /// Loaded latency sweep over the inject delays
    Latency {
        /// Measure a single inject delay (cycles, e.g. 200)
        #[arg(long, value_parser = parse_inject_delay)]
        inject_delay: Option<String>,
    },

    /// Save the MLC executable path and detect its version
    Configure {
        /// Path to mlc (or mlc.exe)
        path: PathBuf,
    },

    /// Show the configured MLC path and its version
    Version,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Ctrl-C stops MLC before the process exits
fn setup_signal_handler(supervisor: Arc<ProcessSupervisor>) {
    if let Err(e) = ctrlc::set_handler(move || {
        let killed = supervisor.stop();
        if killed {
            eprintln!("\nSIGINT received. MLC stopped.");
        }
        std::process::exit(EXIT_INTERRUPTED);
    }) {
        eprintln!("Warning: Failed to set signal handler: {e}");
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if let Some(warning) = elevation_warning(imlc_core::is_elevated()) {
        tracing::warn!("{warning}");
    }

    let registry = LogPathRegistry::new();
    let sink = match build_sink(cli.log_file.as_deref(), &registry) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let config = match open_config_store(cli.config.as_deref(), cli.mlc.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let launcher: Arc<dyn ToolLauncher> = Arc::new(RealToolLauncher::new());
    let tool = Arc::new(ToolContext::new(config, Arc::clone(&launcher), Arc::clone(&sink)));
    let supervisor = Arc::new(ProcessSupervisor::new(launcher, sink));
    setup_signal_handler(Arc::clone(&supervisor));

    let observer = Arc::new(ConsoleObserver::new(cli.json));
    let (dispatcher, queue) = dispatch_channel();
    let orchestrator = match TestOrchestrator::new(
        supervisor,
        Arc::clone(&tool),
        Arc::new(dispatcher),
        observer.clone(),
    ) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Quick => run_test(&orchestrator, &queue, &observer, RunRequest::Quick, cli.json),
        Commands::Bandwidth { peak } => run_test(
            &orchestrator,
            &queue,
            &observer,
            RunRequest::Bandwidth {
                peak_injection: peak,
            },
            cli.json,
        ),
        Commands::Cache => run_test(&orchestrator, &queue, &observer, RunRequest::Cache, cli.json),
        Commands::Latency { inject_delay } => run_test(
            &orchestrator,
            &queue,
            &observer,
            RunRequest::Latency { inject_delay },
            cli.json,
        ),
        Commands::Configure { path } => match orchestrator.configure_path(&path) {
            Ok(Some(version)) => {
                CliResult::Success(format!("MLC path: {}\nMLC version: {version}", path.display()))
                    .report()
            }
            Ok(None) => {
                CliResult::Error(imlc_core::Notice::VersionUnavailable.to_string()).report()
            }
            Err(_) => {
                queue.run_pending();
                1
            }
        },
        Commands::Version => match tool.fetch_version() {
            Some(version) => CliResult::Success(format!(
                "MLC path: {}\nMLC version: {version}",
                display_path(&tool.path())
            ))
            .report(),
            None => CliResult::Error(imlc_core::Notice::VersionUnavailable.to_string()).report(),
        },
    };

    std::process::exit(code);
}

fn display_path(path: &str) -> String {
    if path.trim().is_empty() {
        format!("(not set, using {})", imlc_core::default_executable().display())
    } else {
        path.to_string()
    }
}

/// Start a run and drain UI updates on this thread until it finishes
fn run_test(
    orchestrator: &TestOrchestrator,
    queue: &DispatchQueue,
    observer: &ConsoleObserver,
    request: RunRequest,
    json: bool,
) -> i32 {
    tracing::debug!(%request, "starting run");
    match orchestrator.toggle(request) {
        Toggle::Started => {}
        Toggle::Rejected(_) => {
            queue.run_pending();
            return 1;
        }
        Toggle::Cancelled => return EXIT_INTERRUPTED,
    }

    let summary = loop {
        queue.run_next(POLL_INTERVAL);
        if let Some(summary) = observer.summary() {
            break summary;
        }
    };
    queue.run_pending();

    if json {
        match summary_json(&summary) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        }
    }
    exit_code_for(&summary.outcome)
}
