use anyhow::{bail, Context, Result};
use clap::Parser;
use logguard_core::Config;
use logguard_ingestion::Orchestrator;
use logguard_output::{OutputFormat, StdoutWriter};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// LogGuard - live log collection from stdin, files and unix sockets
#[derive(Parser, Debug)]
#[command(name = "logguard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: pretty, json, or raw (overrides config)
    #[arg(short, long)]
    format: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    config.apply_process_env()?;
    Ok(config)
}

fn init_tracing(args: &Args, config: &Config) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        config.general.log_level.parse().unwrap_or(Level::INFO)
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn any_source_enabled(config: &Config) -> bool {
    let ingestion = &config.ingestion;
    ingestion.stdin.enabled || ingestion.file.enabled || ingestion.unix.enabled
}

fn main() -> Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(run(args));

    // A stdin read parked on the blocking pool cannot be cancelled
    runtime.shutdown_background();
    result
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    if args.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    init_tracing(&args, &config);
    config.validate()?;

    if !any_source_enabled(&config) {
        warn!("No ingestion sources enabled. Enable stdin, file, or unix in config.");
        return Ok(());
    }

    // CLI overrides config
    let format: OutputFormat = args
        .format
        .as_deref()
        .unwrap_or(&config.output.stdout.format)
        .parse()
        .map_err(anyhow::Error::msg)?;
    let mut writer = if config.output.stdout.enabled {
        StdoutWriter::with_format(format)
    } else {
        StdoutWriter::with_writer(format, tokio::io::sink())
    };

    let shutdown_timeout = config.general.shutdown_timeout();
    info!(instance = %config.general.instance_name, "Starting LogGuard");

    let mut orchestrator = Orchestrator::new(config);
    let handle = orchestrator.handle();
    let mut running = tokio::spawn(async move {
        orchestrator.run(&mut writer).await;
        writer
    });

    let writer = tokio::select! {
        finished = &mut running => finished?,
        _ = handle.cancelled() => {
            match tokio::time::timeout(shutdown_timeout, &mut running).await {
                Ok(finished) => finished?,
                Err(_) => {
                    error!(
                        timeout = ?shutdown_timeout,
                        active = handle.active_sources(),
                        "Sources did not stop in time"
                    );
                    bail!("shutdown timed out after {:?}", shutdown_timeout);
                }
            }
        }
    };

    info!(written = writer.written(), errors = writer.error_count(), "LogGuard stopped");

    if writer.error_count() > 0 {
        bail!("{} ingestion error(s) reported", writer.error_count());
    }
    Ok(())
}
