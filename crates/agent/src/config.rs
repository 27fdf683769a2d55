//! Agent configuration file.
//!
//! A small YAML document, written at install time:
//!
//! ```yaml
//! server_url: http://server:8080
//! client_id: 3e9a1c52-...
//! ```
//!
//! Both fields are required; the agent refuses to start without them.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Default config path, next to the working directory the service runs in.
pub const DEFAULT_CONFIG_PATH: &str = "aegis-agent.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config file '{path}' is missing a value for '{field}'")]
    MissingField { path: String, field: &'static str },
}

/// The agent's connection settings. Opaque to the agent itself; both values
/// are passed through to the fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub server_url: String,
    pub client_id: String,
}

impl AgentConfig {
    /// Load and validate the YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        let config: AgentConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: display.clone(),
                source,
            })?;

        if config.server_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                path: display,
                field: "server_url",
            });
        }
        if config.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                path: display,
                field: "client_id",
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_a_valid_config() {
        let file = write_config("server_url: http://server:8080\nclient_id: abc-123\n");
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.server_url, "http://server:8080");
        assert_eq!(config.client_id, "abc-123");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            AgentConfig::load("/definitely/not/here.yaml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn missing_fields_are_refused() {
        let file = write_config("server_url: http://server:8080\nclient_id: \"\"\n");
        assert!(matches!(
            AgentConfig::load(file.path()),
            Err(ConfigError::MissingField { field: "client_id", .. })
        ));

        let file = write_config("client_id: abc\n");
        assert!(matches!(
            AgentConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
