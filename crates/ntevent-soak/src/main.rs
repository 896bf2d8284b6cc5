//! Soak harness binary.
//!
//! Loads configuration, initializes structured logging, runs the workload on
//! a blocking task, and prints the report as JSON. Ctrl+C stops producers
//! early; the exit code is non-zero unless the run was consistent.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ntevent_soak::config;
use ntevent_soak::run_soak;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("NTEVENT_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("soak.toml"));

    let config = match config::load_config(selected_config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ntevent-soak: {err}");
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let mut worker = tokio::task::spawn_blocking({
        let cancel = Arc::clone(&cancel);
        move || run_soak(&config, &cancel)
    });

    let joined = tokio::select! {
        joined = &mut worker => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, stopping producers");
            cancel.store(true, Ordering::Relaxed);
            worker.await
        }
    };

    let report = match joined {
        Ok(Ok(report)) => report,
        Ok(Err(err)) => {
            tracing::error!(error = %err, "cannot create listener storage");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            tracing::error!(error = %err, "soak worker failed");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::error!(error = %err, "failed to serialize soak report"),
    }

    if report.is_consistent() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
