//! Server configuration, read from an optional RON file.

use std::ffi::OsString;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_info, LogDestination};
use log::LevelFilter;
use mux_engine::{
    DiagnosticsSink, FetchSettings, Fetcher, MultiplexConfig, DEFAULT_MAX_CONCURRENT,
    DEFAULT_MAX_URLS, DEFAULT_REQUEST_TIMEOUT,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "MUX_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub max_connections: usize,
    pub shutdown_grace_ms: u64,
    pub log_destination: LogDestination,
    pub log_level: String,
    pub multiplex: MultiplexSection,
    pub fetch: FetchSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexSection {
    pub max_urls: usize,
    pub max_concurrent: usize,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub connect_timeout_ms: u64,
    pub pool_idle_timeout_ms: u64,
    pub pool_max_idle_per_host: usize,
    pub user_agent: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".to_string(),
            max_connections: 100,
            shutdown_grace_ms: 1_000,
            log_destination: LogDestination::Terminal,
            log_level: "info".to_string(),
            multiplex: MultiplexSection::default(),
            fetch: FetchSection::default(),
        }
    }
}

impl Default for MultiplexSection {
    fn default() -> Self {
        Self {
            max_urls: DEFAULT_MAX_URLS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for FetchSection {
    fn default() -> Self {
        let settings = FetchSettings::default();
        Self {
            connect_timeout_ms: settings.connect_timeout.as_millis() as u64,
            pool_idle_timeout_ms: settings.pool_idle_timeout.as_millis() as u64,
            pool_max_idle_per_host: settings.pool_max_idle_per_host,
            user_agent: None,
        }
    }
}

impl ServerConfig {
    /// Loads `path` if given. A missing file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                engine_info!("Config {:?} not found, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config = Self::parse(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        engine_info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        self.level_filter()?;
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".into()));
        }
        if self.multiplex.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "multiplex.max_concurrent must be at least 1".into(),
            ));
        }
        if self.multiplex.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "multiplex.request_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("address {:?}: {err}", self.address)))
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("log_level {:?}", self.log_level)))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        let defaults = FetchSettings::default();
        FetchSettings {
            connect_timeout: Duration::from_millis(self.fetch.connect_timeout_ms),
            pool_idle_timeout: Duration::from_millis(self.fetch.pool_idle_timeout_ms),
            pool_max_idle_per_host: self.fetch.pool_max_idle_per_host,
            user_agent: self.fetch.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }

    pub fn multiplex_config(
        &self,
        fetcher: Arc<dyn Fetcher>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> MultiplexConfig {
        MultiplexConfig::new(fetcher)
            .with_max_urls(self.multiplex.max_urls)
            .with_max_concurrent(self.multiplex.max_concurrent)
            .with_request_timeout(Duration::from_millis(self.multiplex.request_timeout_ms))
            .with_diagnostics(diagnostics)
    }
}

/// First CLI argument wins over the environment variable.
pub fn resolve_config_path(arg: Option<String>, env: Option<OsString>) -> Option<PathBuf> {
    arg.map(PathBuf::from).or_else(|| env.map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ServerConfig::parse("()").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.multiplex.max_urls, 20);
        assert_eq!(config.multiplex.max_concurrent, 4);
        assert_eq!(config.multiplex.request_timeout_ms, 1_000);
        assert_eq!(config.max_connections, 100);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let text = r#"(
            address: "127.0.0.1:9000",
            log_destination: Both,
            multiplex: (max_urls: 5, request_timeout_ms: 250),
            fetch: (pool_max_idle_per_host: 8, user_agent: Some("mux-test/1")),
        )"#;
        let config = ServerConfig::parse(text).unwrap();
        assert_eq!(config.address, "127.0.0.1:9000");
        assert_eq!(config.log_destination, LogDestination::Both);
        assert_eq!(config.multiplex.max_urls, 5);
        assert_eq!(config.multiplex.max_concurrent, 4);
        assert_eq!(config.fetch_settings().pool_max_idle_per_host, 8);
        assert_eq!(config.fetch_settings().user_agent, "mux-test/1");
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            ServerConfig::parse(r#"(address: "nowhere")"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::parse(r#"(log_level: "loud")"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::parse("(multiplex: (max_concurrent: 0))"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::parse("(address: 12"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = ServerConfig::load(Some(&temp.path().join("absent.ron"))).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn parse_error_names_the_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bad.ron");
        fs::write(&path, "(max_connections: \"many\")").unwrap();
        match ServerConfig::load(Some(&path)) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cli_argument_wins_over_environment() {
        assert_eq!(
            resolve_config_path(Some("a.ron".into()), Some("b.ron".into())),
            Some(PathBuf::from("a.ron"))
        );
        assert_eq!(
            resolve_config_path(None, Some("b.ron".into())),
            Some(PathBuf::from("b.ron"))
        );
        assert_eq!(resolve_config_path(None, None), None);
    }
}
