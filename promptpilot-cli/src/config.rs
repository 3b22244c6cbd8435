use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use promptpilot_sdk::auth::{EnvToken, StaticToken, TokenProvider};
use promptpilot_sdk::ClientConfig;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_CONFIG: &str = r#"
[api]
base_url = "http://localhost:8000/api/v1"
# ws_url = "ws://localhost:8000/execute-agent"  # derived from base_url when unset

[auth]
# token = "paste-a-token-here"
token_env = "PROMPTPILOT_TOKEN"

[timeouts]
route_secs = 10
connect_secs = 10
action_secs = 30

[stream]
queue_capacity = 1024
ws_path = "/execute-agent"  # some deployments use "/ws/execute-agent"
"#;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PilotConfig {
    pub api: ApiSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub stream: StreamSection,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiSection {
    pub base_url: String,
    pub ws_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuthSection {
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimeoutSection {
    pub route_secs: u64,
    pub connect_secs: u64,
    pub action_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamSection {
    pub queue_capacity: usize,
    pub ws_path: String,
}

fn default_token_env() -> String {
    "PROMPTPILOT_TOKEN".to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token: None,
            token_env: default_token_env(),
        }
    }
}

impl Default for TimeoutSection {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            route_secs: client.route_timeout.as_secs(),
            connect_secs: client.connect_timeout.as_secs(),
            action_secs: client.action_timeout.as_secs(),
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            queue_capacity: ClientConfig::default().queue_capacity,
            ws_path: "/execute-agent".to_string(),
        }
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            api: ApiSection {
                base_url: ClientConfig::default().base_url,
                ws_url: None,
            },
            auth: AuthSection::default(),
            timeouts: TimeoutSection::default(),
            stream: StreamSection::default(),
        }
    }
}

impl PilotConfig {
    /// Load the config file, writing the default one first if it is missing.
    ///
    /// `PROMPTPILOT__SECTION__KEY` environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf), ConfigError> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
        ensure_default_file(&config_path)?;

        let builder = Config::builder()
            .add_source(File::from(config_path.clone()))
            .add_source(
                Environment::with_prefix("PROMPTPILOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PilotConfig = builder.try_deserialize()?;
        Ok((config, config_path))
    }

    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let ws_url = match &self.api.ws_url {
            Some(url) if !url.trim().is_empty() => url.clone(),
            _ => derive_ws_url(&self.api.base_url, &self.stream.ws_path)?,
        };

        let mut client = ClientConfig::default()
            .with_base_url(self.api.base_url.clone())
            .with_ws_url(ws_url);
        client.route_timeout = Duration::from_secs(self.timeouts.route_secs);
        client.connect_timeout = Duration::from_secs(self.timeouts.connect_secs);
        client.action_timeout = Duration::from_secs(self.timeouts.action_secs);
        client.queue_capacity = self.stream.queue_capacity.max(1);
        Ok(client)
    }

    /// A token from the file wins over the environment variable
    pub fn token_provider(&self) -> Result<Arc<dyn TokenProvider>, ConfigError> {
        match self.auth.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => {
                let provider = StaticToken::new(token).map_err(|e| ConfigError::Message(e.to_string()))?;
                Ok(Arc::new(provider))
            }
            _ => Ok(Arc::new(EnvToken::new(self.auth.token_env.clone()))),
        }
    }
}

pub fn get_config_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        config_dir.join("promptpilot/config.toml")
    } else {
        PathBuf::from("promptpilot.toml")
    }
}

/// Write the commented default config unless `path` already exists.
///
/// Returns whether a file was written.
pub fn ensure_default_file(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Message(format!("Failed to create config directory: {e}")))?;
    }
    std::fs::write(path, DEFAULT_CONFIG.trim_start())
        .map_err(|e| ConfigError::Message(format!("Failed to write default config: {e}")))?;
    tracing::info!("Wrote default configuration to {}", path.display());
    Ok(true)
}

/// Stream endpoint on the same host as the REST API: `http://h/api/v1` -> `ws://h/execute-agent`
pub fn derive_ws_url(base_url: &str, ws_path: &str) -> Result<String, ConfigError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ConfigError::Message(format!("Invalid api.base_url '{base_url}': {e}")))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConfigError::Message(format!(
                "Unsupported api.base_url scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::Message(format!("Cannot derive a WebSocket URL from {base_url}")))?;
    url.set_path(ws_path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_file_written_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let (config, loaded_from) = PilotConfig::load(Some(&path)).unwrap();

        assert_eq!(loaded_from, path);
        assert!(path.exists());
        assert_eq!(config.api.base_url, PilotConfig::default().api.base_url);
        assert_eq!(config.auth.token_env, "PROMPTPILOT_TOKEN");
        assert_eq!(config.timeouts.action_secs, 30);
        assert!(!ensure_default_file(&path).unwrap());
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://pilot.example.com/api/v1\"\n\n[auth]\ntoken = \"abc\"\n",
        )
        .unwrap();

        let (config, _) = PilotConfig::load(Some(&path)).unwrap();
        let client = config.client_config().unwrap();

        assert_eq!(client.ws_url, "wss://pilot.example.com/execute-agent");
        assert_eq!(client.route_timeout, Duration::from_secs(10));
        assert_eq!(config.stream.queue_capacity, 1024);
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let mut config = PilotConfig::default();
        config.api.ws_url = Some("ws://other:9000/ws/execute-agent".to_string());
        assert_eq!(config.client_config().unwrap().ws_url, "ws://other:9000/ws/execute-agent");
    }

    #[test]
    fn test_derive_ws_url() {
        assert_eq!(
            derive_ws_url("http://localhost:8000/api/v1", "/ws/execute-agent").unwrap(),
            "ws://localhost:8000/ws/execute-agent"
        );
        assert!(derive_ws_url("ftp://host/api", "/execute-agent").is_err());
        assert!(derive_ws_url("not a url", "/execute-agent").is_err());
    }

    #[test]
    fn test_blank_token_falls_back_to_env() {
        let mut config = PilotConfig::default();
        config.auth.token = Some("   ".to_string());
        assert!(config.token_provider().is_ok());
    }
}
