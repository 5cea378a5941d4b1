//! Optional client configuration file.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Defaults for `calsnap` flags. Command-line flags and their environment
/// variables take precedence over these values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server: Option<String>,
    pub owner: Option<String>,
    pub hash_name: bool,
    pub passphrase_file: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub storage_dir: Option<PathBuf>,
    pub last_run_file: Option<PathBuf>,
    /// Exporter program followed by its arguments.
    pub exporter_command: Vec<String>,
}

/// Resolve the config file location: explicit path, then
/// `$XDG_CONFIG_HOME/calsnap/client.toml`, then `~/.config/calsnap/client.toml`.
pub fn client_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(path) => PathBuf::from(path),
        None => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("calsnap").join("client.toml"))
}

/// Load the config file, if present, with `CALSNAP_CLIENT__*` overrides. A
/// missing file yields the defaults; an unusable value from either source is
/// an error.
pub fn load_client_config(path: &Path) -> anyhow::Result<ClientConfig> {
    let mut figment = Figment::new();

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("CALSNAP_CLIENT__").split("__"));

    figment
        .extract()
        .map_err(|err| anyhow::anyhow!(err).context("failed to load client configuration"))
}
