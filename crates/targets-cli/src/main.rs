//! Replay binary for the target aggregation engine.
//!
//! Loads the persisted target state, applies a file of emission batches,
//! computes an aggregate snapshot over the configured window, prints the
//! snapshot as JSON on stdout, and writes the state back.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `targets-config.yaml` (or `TARGETS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Load and migrate the state file
//! 4. Apply emission batches
//! 5. Aggregate, print, and persist

mod config;
mod error;
mod replay;

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use targets_state::aggregate;

use crate::config::ReplayConfig;
use crate::error::CliError;

/// Environment variable overriding the configuration file path.
const CONFIG_ENV: &str = "TARGETS_CONFIG";

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "targets-config.yaml";

fn main() -> Result<(), CliError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        targets = config.targets.len(),
        state_path = %config.paths.state.display(),
        emissions_path = %config.paths.emissions.display(),
        "Configuration loaded"
    );

    // 3. Load the state.
    let mut state = replay::load_state(&config.paths.state, &config.targets)?;
    info!(
        targets = state.target_count(),
        requestor_entries = state.requestor_count(),
        "Target state loaded"
    );

    // 4. Apply emission batches.
    if config.paths.emissions.exists() {
        let batches = replay::load_batches(&config.paths.emissions)?;
        let report = replay::apply_batches(&mut state, &batches);
        info!(
            batches = report.batches,
            updated = report.updated,
            rejected = report.rejected,
            dropped = report.drops.total_dropped(),
            "Emission batches applied"
        );
    } else {
        info!("No emissions file, aggregating stored emissions only");
    }

    // 5. Aggregate, print, and persist.
    let outcome = aggregate(&mut state, config.interval, config.update_state);
    info!(
        targets = outcome.aggregate.targets.len(),
        is_updated = outcome.is_updated,
        "Aggregate computed"
    );
    println!("{}", serde_json::to_string_pretty(&outcome.aggregate)?);

    replay::save_state(&config.paths.state, &state)?;
    info!("targets-cli finished");

    Ok(())
}

/// Load the replay configuration, falling back to defaults when the file
/// does not exist.
fn load_config() -> Result<ReplayConfig, CliError> {
    let path = std::env::var_os(CONFIG_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        Ok(ReplayConfig::from_file(&path)?)
    } else {
        Ok(ReplayConfig::default())
    }
}
