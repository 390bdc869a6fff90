mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use metrics_exporter_statsd::{StatsdBuilder, StatsdError};
use picker::PickerError;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "contactd";

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve a random messaging contact per agency
    Picker(CliArgs),
}

#[derive(Args)]
struct CliArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("missing `{0}` section in config")]
    MissingServiceConfig(&'static str),
    #[error("could not set up metrics: {0}")]
    Metrics(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    RecorderAlreadySet,
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Picker(#[from] PickerError),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Picker(args) => run_picker(args),
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        eprintln!("contactd: {e}");
        process::exit(1);
    }
}

fn run_picker(args: CliArgs) -> Result<(), CliError> {
    let config = Config::from_file(&args.config_file_path)?;
    let picker_config = config
        .picker
        .ok_or(CliError::MissingServiceConfig("picker"))?;

    let _sentry = init_logging(config.common.logging.as_ref());
    if let Some(metrics_config) = &config.common.metrics {
        init_metrics(metrics_config)?;
    }

    tracing::info!("Starting picker");
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(picker::run(picker_config))?;

    Ok(())
}

/// Installs the tracing subscriber, forwarding events to Sentry when a DSN is configured.
/// The returned guard flushes pending Sentry events on drop.
fn init_logging(logging: Option<&LoggingConfig>) -> Option<sentry::ClientInitGuard> {
    let guard = logging
        .and_then(|l| l.sentry_dsn.as_deref())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    guard
}

fn init_metrics(config: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(METRICS_PREFIX))?;
    metrics::set_global_recorder(recorder).map_err(|_| CliError::RecorderAlreadySet)?;

    shared::metrics_defs::describe_all(picker::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "sending metrics to statsd"
    );

    Ok(())
}
