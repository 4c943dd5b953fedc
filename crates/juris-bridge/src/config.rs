//! Configuration file support

use juris_ai::providers::google::{API_KEY_ENV_VARS, DEFAULT_BASE_URL, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};
use juris_client::{ClientConfig, WatchdogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "JURIS_CONFIG_PATH";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuration for juris
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the bridge listens on
    pub listen_addr: String,
    /// Gemini API key (alternative to environment variables)
    pub api_key: Option<String>,
    pub upstream: UpstreamConfig,
    pub client: ClientSection,
}

/// Upstream model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub model: String,
    pub connect_timeout_secs: u64,
    /// Longest wait for the next read from the upstream
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
}

/// Settings used by `juris ask`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub endpoint: Option<String>,
    pub first_token_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            api_key: None,
            upstream: UpstreamConfig::default(),
            client: ClientSection::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout_secs: 10,
            timeout_secs: 120,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        let watchdog = WatchdogConfig::default();
        Self {
            endpoint: None,
            first_token_timeout_secs: watchdog.first_token_timeout.as_secs(),
            inactivity_timeout_secs: watchdog.inactivity_timeout.as_secs(),
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("juris")
    }

    /// Resolve the config file path: explicit path, then `JURIS_CONFIG_PATH`,
    /// then the platform config directory
    pub fn config_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config; a missing file yields the defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::config_path(explicit);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the example config if no file exists yet
    pub fn init(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path(explicit);
        if path.exists() {
            return Ok(path);
        }
        let write_err = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        fs::write(&path, example_config()).map_err(write_err)?;
        Ok(path)
    }

    /// API key from config, then `GEMINI_API_KEY`, then `GOOGLE_API_KEY`
    pub fn api_key(&self) -> Option<String> {
        juris_ai::providers::get_api_key(self.api_key.as_deref(), API_KEY_ENV_VARS).ok()
    }

    /// Consumer settings for `juris ask`
    pub fn client_config(&self) -> ClientConfig {
        let endpoint = self
            .client
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("http://{}/api/chat", self.listen_addr));
        ClientConfig {
            endpoint,
            watchdog: WatchdogConfig {
                first_token_timeout: Duration::from_secs(self.client.first_token_timeout_secs),
                inactivity_timeout: Duration::from_secs(self.client.inactivity_timeout_secs),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# juris configuration file
# Place at ~/.config/juris/config.toml (Linux/Mac) or %APPDATA%\juris\config.toml (Windows)

# Address the bridge listens on
listen_addr = "127.0.0.1:8787"

# Gemini API key (optional - GEMINI_API_KEY or GOOGLE_API_KEY also work)
# It's recommended to use environment variables instead for security
# api_key = "..."

[upstream]
base_url = "https://generativelanguage.googleapis.com/v1beta"
model = "gemini-2.0-flash"
connect_timeout_secs = 10
# Longest silence allowed between reads; long answers are not cut off
timeout_secs = 120
max_output_tokens = 8192

# Used by `juris ask`
[client]
# endpoint = "http://127.0.0.1:8787/api/chat"
first_token_timeout_secs = 60
inactivity_timeout_secs = 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("juris-config-{}-{name}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let parsed: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed: Config = toml::from_str(
            r#"
listen_addr = "0.0.0.0:9000"
[upstream]
model = "gemini-1.5-pro"
"#,
        )
        .unwrap();
        assert_eq!(parsed.listen_addr, "0.0.0.0:9000");
        assert_eq!(parsed.upstream.model, "gemini-1.5-pro");
        assert_eq!(parsed.upstream.timeout_secs, 120);
        assert_eq!(parsed.client.first_token_timeout_secs, 60);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = temp_path("missing.toml");
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let path = temp_path("bad.toml");
        fs::write(&path, "listen_addr = [").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_init_writes_example_once() {
        let dir = temp_path("init");
        let path = dir.join("config.toml");
        let written = Config::init(Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(fs::read_to_string(&path).unwrap(), example_config());

        fs::write(&path, "listen_addr = \"127.0.0.1:1\"\n").unwrap();
        Config::init(Some(&path)).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().listen_addr, "127.0.0.1:1");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_configured_key_wins() {
        let config = Config {
            api_key: Some("from-config".to_string()),
            ..Default::default()
        };
        assert_eq!(config.api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_client_config_endpoint() {
        let config = Config::default();
        let client = config.client_config();
        assert_eq!(client.endpoint, "http://127.0.0.1:8787/api/chat");
        assert_eq!(client.watchdog.first_token_timeout, Duration::from_secs(60));

        let config = Config {
            client: ClientSection {
                endpoint: Some("http://exemplo:1/chat".to_string()),
                inactivity_timeout_secs: 5,
                ..Default::default()
            },
            ..Default::default()
        };
        let client = config.client_config();
        assert_eq!(client.endpoint, "http://exemplo:1/chat");
        assert_eq!(client.watchdog.inactivity_timeout, Duration::from_secs(5));
    }
}
