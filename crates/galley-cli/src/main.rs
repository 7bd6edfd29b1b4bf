use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use galley_core::{init_tracing, LogFormat, Settings, WorkItem, WorkerRole};
use galley_queue::{Simulation, SimulationReport, WorkContext};
use std::future::pending;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "galley")]
#[command(about = "Galley - producer/consumer kitchen simulation", long_about = None)]
#[command(version)]
struct Cli {
    /// Report format (json, pretty)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Directory holding default.toml / {env}.toml / local.toml
    #[arg(long, global = true, env = "GALLEY_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Configuration environment name
    #[arg(long, global = true)]
    env: Option<String>,

    /// Log format override
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run producers and consumers until stopped
    Run(RunArgs),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args)]
struct RunArgs {
    /// Number of producer threads
    #[arg(short, long)]
    producers: Option<usize>,

    /// Number of consumer threads
    #[arg(short, long)]
    consumers: Option<usize>,

    /// Milliseconds a producer spends on one item
    #[arg(long)]
    produce_ms: Option<u64>,

    /// Milliseconds a consumer spends on one item
    #[arg(long)]
    consume_ms: Option<u64>,

    /// Items each producer makes before stopping
    #[arg(long)]
    items: Option<u64>,

    /// Bound the queue; producers wait when it is full
    #[arg(long)]
    capacity: Option<usize>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective settings as TOML
    Show,
    /// Print the JSON schema of the settings
    Schema,
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        let sim = &mut settings.simulation;
        if let Some(v) = self.producers {
            sim.producers = v;
        }
        if let Some(v) = self.consumers {
            sim.consumers = v;
        }
        if let Some(v) = self.produce_ms {
            sim.production_latency_ms = v;
        }
        if let Some(v) = self.consume_ms {
            sim.consumption_latency_ms = v;
        }
        if self.items.is_some() {
            sim.items_per_producer = self.items;
        }
        if self.capacity.is_some() {
            sim.capacity = self.capacity;
        }
        if self.duration.is_some() {
            sim.run_for_secs = self.duration;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match execute(&cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir
        .clone()
        .unwrap_or_else(Settings::default_config_dir)
}

/// File and environment layers first, then command-line flags, then one
/// validation over the merged result.
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load_unvalidated(&config_dir(cli), cli.env.as_deref())
        .context("Failed to load configuration")?;
    if let Some(format) = cli.log_format {
        settings.logging.format = format.into();
    }
    if let Commands::Run(args) = &cli.command {
        args.apply(&mut settings);
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

async fn execute(cli: &Cli) -> Result<()> {
    let settings = resolve_settings(cli)?;

    match &cli.command {
        Commands::Run(_) => {
            init_tracing(&settings.logging, cli.verbose)?;
            info!(
                "Loaded configuration for env '{}' from {:?}",
                settings.env,
                config_dir(cli)
            );
            let report = run(&settings).await?;
            print_report(&cli.output, &report)
        }
        Commands::Config(ConfigCommands::Show) => {
            print!("{}", settings.to_toml()?);
            Ok(())
        }
        Commands::Config(ConfigCommands::Schema) => {
            println!("{}", Settings::json_schema()?);
            Ok(())
        }
    }
}

async fn run(settings: &Settings) -> Result<SimulationReport> {
    let sim_config = settings.simulation.clone();
    let sim = Simulation::start(&sim_config).context("Failed to start workers")?;
    let ctx = sim.context().clone();

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = run_timer(sim_config.run_for()) => {
            info!("Run duration elapsed, shutting down");
        }
        _ = all_consumed(ctx, sim_config.expected_items()) => {
            info!("Every produced item was consumed, shutting down");
        }
    }

    tokio::task::spawn_blocking(move || sim.shutdown())
        .await
        .context("shutdown task failed")?
        .context("Failed to stop workers")
}

async fn run_timer(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => pending().await,
    }
}

async fn all_consumed(ctx: WorkContext<WorkItem>, expected: Option<u64>) {
    let Some(expected) = expected else {
        return pending().await;
    };
    let waited = tokio::task::spawn_blocking(move || ctx.wait_for_taken(expected)).await;
    if !matches!(waited, Ok(Ok(()))) {
        // Cancelled from elsewhere; let another branch finish the run.
        pending::<()>().await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}

fn print_report(format: &OutputFormat, report: &SimulationReport) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Pretty => {
            println!(
                "\n{} {:.1}s",
                "Run finished after".bold(),
                report.elapsed.as_secs_f64()
            );
            println!(
                "{:<14} {:>8}  {}",
                "worker".cyan().bold(),
                "items".cyan().bold(),
                "exit".cyan().bold()
            );
            for worker in &report.workers {
                let name = match worker.id.role {
                    WorkerRole::Producer => worker.id.to_string().green(),
                    WorkerRole::Consumer => worker.id.to_string().yellow(),
                };
                println!("{:<14} {:>8}  {:?}", name, worker.items, worker.exit);
            }
            println!(
                "\n{}: {}  {}: {}  {}: {}",
                "produced".cyan(),
                report.produced.to_string().yellow(),
                "consumed".cyan(),
                report.consumed.to_string().yellow(),
                "left over".cyan(),
                report.leftover.to_string().yellow()
            );
        }
    }
    Ok(())
}
