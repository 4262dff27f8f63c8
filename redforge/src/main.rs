//! redforge server entry point
//!
//! Provisions red-team infrastructure with Terraform and configures it with
//! Ansible over a Tailscale mesh, behind a JSON HTTP API.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::Context;
use redforge::app::options::AppOptions;
use redforge::app::run::run;
use redforge::filesys::file::File;
use redforge::logs::{init_logging, LogOptions};
use redforge::storage::settings::Settings;
use redforge::utils::version_info;

use tracing::{error, info};

const DEFAULT_CONFIG: &str = "/etc/redforge/settings.json";

#[tokio::main]
async fn main() {
    if let Err(e) = run_main().await {
        eprintln!("redforge failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    // Settings: --config, then the default path, then built-in defaults
    let settings = match cli_args.get("config") {
        Some(path) => File::new(path)
            .read_json::<Settings>()
            .await
            .with_context(|| format!("Unable to read settings file {path}"))?,
        None => {
            let file = File::new(DEFAULT_CONFIG);
            if file.exists().await {
                file.read_json::<Settings>()
                    .await
                    .with_context(|| format!("Unable to read settings file {DEFAULT_CONFIG}"))?
            } else {
                Settings::default()
            }
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.as_ref().map(PathBuf::from),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings);
    info!(
        "Running redforge {} ({}) with options: {:?}",
        version.version, version.git_hash, options
    );

    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run redforge: {e}");
        return Err(e.into());
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Unable to install signal handlers: {e}");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Unable to listen for Ctrl+C: {e}");
                    }
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {e}");
        }
        info!("Ctrl+C received, shutting down...");
    }
}
