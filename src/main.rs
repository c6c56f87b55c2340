use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::{UpdateLevel, UpdaterConfig};
use crate::engine::models::{RunSummary, UpdatePlan};
use crate::engine::state::UpdateState;
use crate::engine::{UpdateEngine, UpdateSettings};
use crate::networking::NetworkClient;
use crate::version::Version;

mod config;
mod download;
mod engine;
mod env;
mod error;
mod networking;
mod storage;
mod updater;
mod util;
mod version;

#[derive(Parser, Debug)]
#[command(
    name = "Delta Updater",
    author,
    version,
    about = "Incremental self-update client: fetches only the files changed since the installed build"
)]
struct Cli {
    /// Print updater version and exit.
    #[arg(long)]
    version_only: bool,
    /// Settings file (defaults to updater.toml in the working directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the configured update level.
    #[arg(long, global = true, value_enum, ignore_case = true)]
    level: Option<UpdateLevel>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Report whether a newer build is published.
    Check,
    /// Download and install the changes since the installed build.
    Update {
        /// Run even when the server reports nothing newer.
        #[arg(long)]
        force: bool,
    },
    /// Print the installed application version.
    Version,
}

#[derive(Serialize)]
struct CheckReport {
    #[serde(flatten)]
    plan: UpdatePlan,
    update_available: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.version_only {
        println!("Delta Updater {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let config_path = cli.config.clone().unwrap_or_else(env::default_config_path);
    info!("loading config from {}", config_path.display());
    let config = match UpdaterConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Command::Update { force: false }) {
        Command::Version => print_version(&config, cli.json),
        command => run_pipeline(&config, command, &cli).await,
    }
}

fn print_version(config: &UpdaterConfig, json: bool) -> ExitCode {
    let Some(jar) = config.jar_path() else {
        error!("application.jar_path is not set");
        return ExitCode::FAILURE;
    };
    match Version::from_jar(&jar) {
        Ok(version) if json => print_json(&version),
        Ok(version) => {
            println!("{version}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("cannot read version from {}: {err}", jar.display());
            ExitCode::FAILURE
        }
    }
}

async fn run_pipeline(config: &UpdaterConfig, command: Command, cli: &Cli) -> ExitCode {
    let server = &config.update.server;
    info!(
        "update server: {}://{}:{}",
        server.scheme, server.host, server.port
    );
    let client = match NetworkClient::new(server, config.keystore.as_ref()) {
        Ok(client) => client,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let current = version::current_build_number(config.jar_path().as_deref());
    let settings = UpdateSettings::from_config(config, cli.level);
    let mut engine = UpdateEngine::new(Arc::new(client), settings, current);

    let (tx, mut rx) = mpsc::unbounded_channel::<UpdateState>();
    let quiet = cli.json;
    let reporter = tokio::spawn(async move {
        while let Some(state) = rx.recv().await {
            if !quiet && let Some(line) = describe(&state) {
                println!("{line}");
            }
        }
    });

    let code = match command {
        Command::Check => {
            let update_available = engine.check_new_versions(&tx).await;
            let report = CheckReport {
                plan: engine.plan(),
                update_available,
            };
            if cli.json {
                print_json(&report)
            } else {
                println!(
                    "installed {}, latest {}: {}",
                    report.plan.current_version,
                    report.plan.latest_version,
                    if update_available {
                        "update available"
                    } else {
                        "no update"
                    }
                );
                ExitCode::SUCCESS
            }
        }
        Command::Update { force } => {
            let state = engine.run_once(force, &tx).await;
            if cli.json {
                print_json(&state)
            } else {
                ExitCode::SUCCESS
            }
        }
        Command::Version => ExitCode::SUCCESS,
    };

    drop(tx);
    let _ = reporter.await;
    code
}

fn describe(state: &UpdateState) -> Option<String> {
    match state {
        UpdateState::Harvesting { from, to } => {
            Some(format!("Harvesting changes from {from} to {to}..."))
        }
        UpdateState::Downloading { files } => Some(format!("Downloading {files} files...")),
        UpdateState::Installing => Some("Installing staged files...".into()),
        UpdateState::GatedStop { reason } => Some(format!("Nothing to do: {reason}")),
        UpdateState::Done(summary) => Some(describe_summary(summary)),
        UpdateState::Idle | UpdateState::Probing => None,
    }
}

fn describe_summary(summary: &RunSummary) -> String {
    let mut line = format!("Done: {} changed files", summary.changes);
    if let Some(download) = &summary.download {
        line.push_str(&format!(
            ", {} downloaded ({} bytes)",
            download.files_downloaded,
            util::format_grouped(download.total_bytes)
        ));
        if !download.files_failed.is_empty() {
            line.push_str(&format!(", {} failed", download.files_failed.len()));
        }
    }
    if let Some(err) = &summary.download_error {
        line.push_str(&format!(", download error: {err}"));
    }
    if let Some(install) = &summary.install {
        line.push_str(&format!(", {} installed", install.files_installed));
    }
    if let Some(err) = &summary.install_error {
        line.push_str(&format!(", install error: {err}"));
    }
    line
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("failed to render JSON: {err}");
            ExitCode::FAILURE
        }
    }
}
