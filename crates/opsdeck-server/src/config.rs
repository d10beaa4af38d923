//! Server configuration: TOML file plus CLI overrides.

use opsdeck_core::{DeckError, DeckResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    // Local binding unless network mode is requested explicitly.
    "127.0.0.1".to_string()
}

/// Resolved configuration with CLI overrides applied.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl ServerConfig {
    /// Load config from a TOML file if it exists, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_network: bool,
    ) -> DeckResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| DeckError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let port = cli_port.unwrap_or(file_config.server.port);
        let host = if cli_network {
            warn!("network mode enabled, the server will be reachable from other machines");
            "0.0.0.0".to_string()
        } else {
            file_config.server.host
        };

        Ok(Self { port, host })
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_when_sections_missing() {
        let parsed: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(parsed.server.port, 3000);
        assert_eq!(parsed.server.host, "127.0.0.1");
    }

    #[test]
    fn file_values_parse() {
        let parsed: ConfigFile =
            toml::from_str("[server]\nport = 8080\nhost = \"192.168.1.5\"\n").unwrap();
        assert_eq!(parsed.server.port, 8080);
        assert_eq!(parsed.server.host, "192.168.1.5");
    }

    #[test]
    fn cli_port_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[server]\nport = 8080").unwrap();

        let config = ServerConfig::load(Some(&path), Some(9090), false).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn network_flag_binds_all_interfaces() {
        let config = ServerConfig::load(None, None, true).unwrap();
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config =
            ServerConfig::load(Some(Path::new("/nonexistent/config.toml")), None, false).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
    }
}
