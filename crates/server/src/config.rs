//! Configuration loading for the server binary.

use anyhow::{Context, Result};
use calsnap_core::config::AppConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use std::path::Path;

/// Environment prefix for nested settings, e.g. `CALSNAP_SERVER__BIND`.
pub const ENV_PREFIX: &str = "CALSNAP_";

/// Flat variable names accepted for compatibility with older deployments,
/// mapped to their nested config keys.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("db_path", "metadata.path"),
    ("max_partial_ss", "retention.max_partial_snapshots"),
    ("max_full_ss", "retention.max_full_snapshots"),
    ("cleanup_interval", "retention.cleanup_interval_secs"),
    ("max_ss_age", "retention.max_snapshot_age_secs"),
    ("delete_empty_owners", "retention.delete_empty_owners"),
    ("max_payload_length", "server.max_payload_bytes"),
    ("incoming_binary_locking", "server.serialize_large_payload_reads"),
    ("exporter_archive_path", "exporter.archive_path"),
    ("exporter_version_path", "exporter.version_path"),
];

fn legacy_env() -> Env {
    let names: Vec<&str> = LEGACY_ENV_KEYS.iter().map(|(name, _)| *name).collect();
    Env::prefixed("CALAPI_").only(&names).map(|key| {
        LEGACY_ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, target)| (*target).into())
            .unwrap_or_else(|| key.as_str().to_string().into())
    })
}

/// Build the figment: defaults, then the TOML file (if present), then legacy
/// variables, then `CALSNAP_` variables.
pub fn figment(config_path: &Path) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if config_path.exists() {
        tracing::info!(config_path = %config_path.display(), "Loading configuration from file");
        figment = figment.merge(Toml::file(config_path));
    } else {
        tracing::debug!(config_path = %config_path.display(), "No config file found");
    }

    figment
        .merge(legacy_env())
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
}

/// Load and validate the application configuration.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let config: AppConfig = figment(config_path)
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}
