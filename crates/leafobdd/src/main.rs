//! leafobdd - Leaf OBD Telemetry Daemon
//!
//! Polls a Nissan Leaf through an ELM327 BLE adapter and prints one JSON
//! snapshot per cycle to stdout.
//!
//! Usage:
//!   leafobdd [OPTIONS] [config.toml]
//!
//! Options:
//!   --oneshot  Run a single poll cycle and exit
//!
//! If no config file is provided, uses the mock transport for demo purposes.

use std::time::Duration;

use leafobd_engine::{create_link, EngineConfig, PollOrchestrator};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_INTERVAL_MS: u64 = 10_000;

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
    /// Run one cycle and exit
    oneshot: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        oneshot: false,
    };

    for arg in &args {
        match arg.as_str() {
            "--oneshot" => result.oneshot = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
            }
            _ => {
                tracing::warn!("Unknown argument: {}", arg);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"leafobdd - Leaf OBD Telemetry Daemon

Usage: leafobdd [OPTIONS] [config.toml]

Options:
  --oneshot   Run a single poll cycle and exit
  -h, --help  Print this help message

Examples:
  # Run with the mock transport
  leafobdd

  # Poll a real adapter
  leafobdd config.toml

  # Single cycle, e.g. from cron
  leafobdd --oneshot config.toml
"#
    );
}

/// Daemon configuration: the engine config plus the cycle cadence
#[derive(Debug, Default, Deserialize)]
struct DaemonConfig {
    #[serde(default)]
    daemon: DaemonSection,
    #[serde(flatten)]
    engine: EngineConfig,
}

#[derive(Debug, Deserialize)]
struct DaemonSection {
    #[serde(default = "default_interval_ms")]
    interval_ms: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn load_config(args: &Args) -> anyhow::Result<DaemonConfig> {
    match &args.config_path {
        Some(path) => {
            tracing::info!("Loading config from: {}", path);
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        }
        None => {
            tracing::info!("No config file provided, using mock transport");
            Ok(DaemonConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leafobdd=info,leafobd_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting leafobdd (Leaf OBD Telemetry Daemon)");

    let args = parse_args();
    let config = load_config(&args)?;

    let link = create_link(&config.engine.transport)?;
    let orchestrator = PollOrchestrator::new(link, config.engine.poll.clone());

    let mut ticker = tokio::time::interval(Duration::from_millis(config.daemon.interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                match orchestrator.poll_once().await {
                    Ok(snapshot) => {
                        tracing::info!(
                            signals = snapshot.len(),
                            valid = snapshot.valid_count(),
                            "poll cycle complete"
                        );
                        println!("{}", serde_json::to_string(&snapshot)?);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "poll cycle failed");
                    }
                }
                if args.oneshot {
                    break;
                }
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
