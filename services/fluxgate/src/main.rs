//! fluxgate - drives controller write actions from stdin
//!
//! Each stdin line is one JSON action, e.g.
//!
//! ```text
//! {"action":"write_float_point","measurement":"temp","tags":"room=lab","value":"21.5"}
//! ```
//!
//! SIGHUP reloads the configuration file; EOF, Ctrl+C or SIGTERM flush the
//! buffer and exit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fluxgate::shutdown::{self, ReloadSignal};
use fluxgate::{
    logging, Action, ActionError, ActionOutcome, Config, Connector, InfluxConnector, Instance,
    MemoryConnector, VariableMap, VariableResolver, SERVICE_NAME, SERVICE_VERSION,
};
use fluxgate_writer::MemorySink;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "FLUXGATE_CONFIG",
        default_value = Config::DEFAULT_PATH
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Controller variable available to `$(label:name)` placeholders (repeatable)
    #[arg(long = "var", value_name = "LABEL:NAME=VALUE")]
    vars: Vec<String>,

    /// Print the lines that would be written instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level.clone());
    logging::init(&level)?;

    info!("Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);

    let resolver: Arc<dyn VariableResolver> = Arc::new(VariableMap::from_assignments(&args.vars)?);

    if args.dry_run {
        let sink = Arc::new(MemorySink::new());
        let instance = Instance::new(MemoryConnector::new(sink.clone()), resolver);
        run(&instance, &config, &args.config).await?;
        for line in sink.lines() {
            println!("{line}");
        }
    } else {
        let instance = Instance::new(InfluxConnector, resolver);
        run(&instance, &config, &args.config).await?;
    }

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

async fn run<C: Connector>(
    instance: &Instance<C>,
    config: &Config,
    config_path: &Path,
) -> Result<()> {
    instance
        .init(config)
        .await
        .context("Failed to initialize InfluxDB instance")?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut reload = ReloadSignal::new();
    let shutdown = shutdown::wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
            _ = reload.recv() => {
                reload_config(instance, config_path).await;
            }
            line = input.next_line() => {
                match line.context("Failed to read action from stdin")? {
                    Some(line) => execute_line(instance, &line).await,
                    None => {
                        info!("Action input closed");
                        break;
                    }
                }
            }
        }
    }

    instance.destroy().await?;
    Ok(())
}

async fn execute_line<C: Connector>(instance: &Instance<C>, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    let action: Action = match serde_json::from_str(line) {
        Ok(action) => action,
        Err(e) => {
            warn!("Ignoring invalid action '{}': {}", line, e);
            return;
        },
    };

    match instance.handle_action(&action).await {
        Ok(ActionOutcome::Flushed(lines)) => info!(lines, "InfluxDB buffer flushed"),
        Ok(ActionOutcome::Buffered) => {},
        Err(ActionError::NotReady(state)) => {
            warn!("Dropping {} action, instance is {}", action.name(), state)
        },
        // Logged by the instance
        Err(_) => {},
    }
}

async fn reload_config<C: Connector>(instance: &Instance<C>, config_path: &Path) {
    info!("Received SIGHUP, reloading configuration...");

    match Config::load(config_path) {
        Ok(config) => {
            if let Err(e) = instance.config_updated(&config).await {
                error!("Failed to apply configuration: {}", e);
            }
        },
        Err(e) => error!("Failed to reload configuration: {:#}", e),
    }
}
