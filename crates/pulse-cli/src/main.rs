//! Pulse command-line entry point.
//!
//! Usage: pulse [--base-dir <dir>] [--log-level <level>] <command>
//!
//! Each invocation configures a client over the on-disk state under the base
//! directory, records at most one event, and waits for it to be sent or
//! queued before exiting.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pulse_config_and_utils::{init_logging_for_service, sdk_log_level, Config, Paths};
use pulse_sdk::{DispatchOutcome, Properties, PropertyValue, Pulse, Severity, StaticDeviceInfo};
use pulse_storage::FileKeyValueStore;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Pulse: record analytics events and errors from the shell.
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(about = "Record analytics events and errors, and manage the delivery queue")]
struct Args {
    /// Directory holding config, identity and queued deliveries.
    /// Defaults to the platform data directory.
    #[arg(long, env = "PULSE_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    /// Defaults to the level implied by `enable_logging` in the config.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a custom event.
    Track {
        name: String,
        /// Event property as key=value; repeatable.
        #[arg(long = "prop", value_parser = parse_prop)]
        props: Vec<(String, PropertyValue)>,
    },
    /// Record a screen view.
    Screen {
        name: String,
        #[arg(long = "prop", value_parser = parse_prop)]
        props: Vec<(String, PropertyValue)>,
    },
    /// Report an error message.
    Error {
        message: String,
        #[arg(long, default_value = "error")]
        severity: Severity,
    },
    /// Attach a name and email to the current visitor.
    Identify {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Deliver queued events now.
    Flush,
    /// Show identity and queued deliveries.
    Status,
    /// Forget the visitor, the session and every queued delivery.
    Reset,
}

fn parse_prop(raw: &str) -> Result<(String, PropertyValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property name in '{raw}'"));
    }
    Ok((key.to_string(), PropertyValue::infer(value)))
}

fn properties(props: Vec<(String, PropertyValue)>) -> Properties {
    props.into_iter().collect()
}

fn report(outcome: DispatchOutcome) -> Result<()> {
    match outcome {
        DispatchOutcome::Sent => println!("sent"),
        DispatchOutcome::Queued => println!("queued"),
        DispatchOutcome::Dropped => bail!("event could not be encoded or queued"),
        DispatchOutcome::RateLimited => println!("rate limited"),
        DispatchOutcome::Duplicate => println!("duplicate"),
        DispatchOutcome::Disabled => println!("tracking disabled"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let paths = match args.base_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config = Config::load(&paths).context("Failed to load config")?;
    let level = args
        .log_level
        .unwrap_or_else(|| sdk_log_level(config.enable_logging).to_string());
    init_logging_for_service("pulse-cli", &level, &paths, true);

    debug!(base_dir = %paths.base_dir().display(), "Using Pulse data directory");

    let store = Arc::new(FileKeyValueStore::open(paths.identity_file())?);
    let pulse = Pulse::new(config, paths, Arc::new(StaticDeviceInfo::host()), store)
        .context("Failed to configure Pulse client")?;

    match args.command {
        Command::Track { name, props } => {
            report(pulse.track_custom_event(&name, properties(props)).await)?;
        }
        Command::Screen { name, props } => {
            report(pulse.track_screen_view(&name, properties(props)).await)?;
        }
        Command::Error { message, severity } => {
            report(
                pulse
                    .capture_message(&message, severity, Properties::new())
                    .await,
            )?;
        }
        Command::Identify { name, email } => {
            if name.is_none() && email.is_none() {
                bail!("identify needs --name or --email");
            }
            report(
                pulse
                    .identify(name.as_deref(), email.as_deref(), Properties::new())
                    .await,
            )?;
        }
        Command::Flush => match pulse.flush().await? {
            Some(drained) => {
                info!(?drained, "Flush finished");
                println!(
                    "attempted {}, delivered {}, retried {}, discarded {}",
                    drained.attempted, drained.delivered, drained.retried, drained.discarded
                );
            }
            None => println!("flush already in progress"),
        },
        Command::Status => {
            let pending = pulse.pending_deliveries()?;
            let status = json!({
                "visitorId": pulse.visitor_id()?,
                "sessionId": pulse.session_id()?,
                "queued": pending.len(),
                "deliveries": pending
                    .iter()
                    .map(|d| json!({
                        "id": d.id(),
                        "endpoint": d.endpoint(),
                        "retryCount": d.retry_count(),
                        "enqueuedAt": d.enqueued_at().to_rfc3339(),
                    }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Reset => {
            pulse.reset()?;
            println!("reset");
        }
    }

    pulse.shutdown();
    Ok(())
}
