use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cropbatch_config::{AppConfig, ConfigValidator};

use cropbatch::app::{AppMode, Application};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("cropbatch")
        .version("0.3.0")
        .about("Prepares crop/soil simulation batches, dispatches them to a worker pool and collects the results")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to the TOML configuration file"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Run mode")
                .value_parser(["producer", "consumer", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mode_str = matches.get_one::<String>("mode").unwrap();
    let log_level = matches.get_one::<String>("log-level").unwrap();
    let log_format = matches.get_one::<String>("log-format").unwrap();

    init_logging(log_level, log_format)?;

    info!("starting cropbatch");
    info!("run mode: {mode_str}");

    let config = AppConfig::load(config_path.map(String::as_str))
        .context("failed to load configuration")?;
    config.validate()?;

    let mode = parse_app_mode(mode_str)?;
    let app = Application::new(config, mode).await?;
    app.run().await?;

    info!("cropbatch finished");
    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("failed to initialize JSON log format")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("failed to initialize pretty log format")?;
        }
        _ => {
            return Err(anyhow::anyhow!("unsupported log format: {log_format}"));
        }
    }

    Ok(())
}

fn parse_app_mode(mode_str: &str) -> Result<AppMode> {
    match mode_str {
        "producer" => Ok(AppMode::Producer),
        "consumer" => Ok(AppMode::Consumer),
        "all" => Ok(AppMode::All),
        _ => Err(anyhow::anyhow!("unsupported run mode: {mode_str}")),
    }
}
