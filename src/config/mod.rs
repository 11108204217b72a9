//! Configuration management for Parley gateway

pub mod file;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

use self::file::ParleyConfigFile;

/// Default local backend address
pub const DEFAULT_LOCAL_ADDRESS: &str = "http://localhost:5001";

/// Default local backend endpoint path
pub const DEFAULT_ENDPOINT_PATH: &str = "/api/v1";

/// Default remote chat-completion endpoint (`OpenRouter`)
pub const DEFAULT_REMOTE_ADDRESS: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default backend request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default HTTP API port
pub const DEFAULT_API_PORT: u16 = 18790;

/// Parley gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Model backend
    pub backend: BackendConfig,

    /// Conversation history storage
    pub history: HistoryConfig,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// `WhatsApp` channel (disabled when token or phone ID is missing)
    pub whatsapp: Option<WhatsAppConfig>,

    /// Chat message that shuts the bot down (disabled when unset)
    pub shutdown_keyword: Option<String>,
}

/// Which model backend handles completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// Locally hosted completion endpoint, falling back to remote on failure
    Local,
    /// Hosted chat-completion API
    #[default]
    Remote,
}

impl FromStr for BackendMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::Config(format!("unsupported backend mode: {other}"))),
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

/// Static description of the model endpoint, fixed for the process lifetime
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Primary backend
    pub mode: BackendMode,

    /// Local backend base address
    pub address: String,

    /// Local backend endpoint path, appended to `address`
    pub endpoint_path: String,

    /// Remote chat-completion endpoint
    pub remote_address: String,

    /// Remote model identifier (`null` on the wire when unset)
    pub model: Option<String>,

    /// Authorization header value for the remote backend
    pub authorization: Option<String>,

    /// Extra headers sent with every backend request
    pub headers: HashMap<String, String>,

    /// Stop sequence for remote completions
    pub stop_sequence: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            address: DEFAULT_LOCAL_ADDRESS.to_string(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            remote_address: DEFAULT_REMOTE_ADDRESS.to_string(),
            model: None,
            authorization: None,
            headers: HashMap::new(),
            stop_sequence: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl BackendConfig {
    /// Full URL of the local completion endpoint
    #[must_use]
    pub fn local_url(&self) -> String {
        let base = self.address.trim_end_matches('/');
        if self.endpoint_path.is_empty() {
            return base.to_string();
        }
        let path = self.endpoint_path.trim_start_matches('/');
        format!("{base}/{path}")
    }
}

/// Conversation history storage configuration
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Root directory holding one subdirectory per contact
    pub dir: PathBuf,

    /// Prompt window; `None` sends the full history
    pub max_prompt_turns: Option<usize>,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,
}

/// `WhatsApp` Cloud API credentials
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Business API access token
    pub access_token: String,

    /// Phone number ID registered with `WhatsApp` Business
    pub phone_number_id: String,

    /// Token expected during webhook subscription verification
    pub verify_token: Option<String>,
}

/// Default history directory: `~/.local/share/parley/history` on Linux
fn default_history_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".local/share/parley/history"),
        |d| d.data_dir().join("parley").join("history"),
    )
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    ///
    /// # Errors
    ///
    /// Returns error if the backend mode is unsupported or a numeric setting
    /// cannot be parsed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > file > default.
    ///
    /// # Errors
    ///
    /// Returns error if the backend mode is unsupported or a numeric setting
    /// cannot be parsed
    pub fn from_sources<F>(fc: ParleyConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fb = fc.backend;

        let mode = env("MODEL_TYPE")
            .or(fb.mode)
            .map_or_else(|| Ok(BackendMode::default()), |m| m.parse())?;

        let timeout_secs = match env("REQUEST_TIMEOUT_SECS") {
            Some(raw) => parse_number(&raw, "REQUEST_TIMEOUT_SECS")?,
            None => fb.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let backend = BackendConfig {
            mode,
            address: env("API_ADDRESS")
                .or(fb.address)
                .unwrap_or_else(|| DEFAULT_LOCAL_ADDRESS.to_string()),
            endpoint_path: env("GENERATION_ENDPOINT")
                .or(fb.endpoint_path)
                .unwrap_or_else(|| DEFAULT_ENDPOINT_PATH.to_string()),
            remote_address: env("REMOTE_API_ADDRESS")
                .or(fb.remote_address)
                .unwrap_or_else(|| DEFAULT_REMOTE_ADDRESS.to_string()),
            model: env("TEXT_EVALUATOR_MODEL").or(fb.model),
            authorization: env("API_AUTHORIZATION").or(fb.authorization),
            headers: fb.headers,
            stop_sequence: env("STOPPING_STRING")
                .or(fb.stop_sequence)
                .filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(timeout_secs),
        };

        let max_prompt_turns = match env("PARLEY_MAX_PROMPT_TURNS") {
            Some(raw) => Some(parse_number(&raw, "PARLEY_MAX_PROMPT_TURNS")?),
            None => fc.history.max_prompt_turns,
        };

        let history = HistoryConfig {
            dir: env("PARLEY_HISTORY_DIR")
                .or(fc.history.dir)
                .map_or_else(default_history_dir, PathBuf::from),
            max_prompt_turns,
        };

        let port = match env("PARLEY_PORT") {
            Some(raw) => parse_number(&raw, "PARLEY_PORT")?,
            None => fc.server.port.unwrap_or(DEFAULT_API_PORT),
        };

        let whatsapp = match (
            env("WHATSAPP_TOKEN").or(fc.whatsapp.access_token),
            env("WHATSAPP_PHONE_ID").or(fc.whatsapp.phone_number_id),
        ) {
            (Some(access_token), Some(phone_number_id)) => Some(WhatsAppConfig {
                access_token,
                phone_number_id,
                verify_token: env("WHATSAPP_VERIFY_TOKEN").or(fc.whatsapp.verify_token),
            }),
            _ => None,
        };

        let shutdown_keyword = env("PARLEY_SHUTDOWN_KEYWORD")
            .or(fc.server.shutdown_keyword)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        tracing::debug!(
            mode = %backend.mode,
            history_dir = %history.dir.display(),
            whatsapp = whatsapp.is_some(),
            "configuration loaded"
        );

        Ok(Self {
            backend,
            history,
            api_server: ApiServerConfig { port },
            whatsapp,
            shutdown_keyword,
        })
    }
}

fn parse_number<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_any_source() {
        let config = Config::from_sources(ParleyConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.backend.mode, BackendMode::Remote);
        assert_eq!(config.backend.local_url(), "http://localhost:5001/api/v1");
        assert_eq!(config.backend.remote_address, DEFAULT_REMOTE_ADDRESS);
        assert_eq!(config.backend.timeout, Duration::from_secs(120));
        assert!(config.backend.stop_sequence.is_none());
        assert!(config.history.max_prompt_turns.is_none());
        assert_eq!(config.api_server.port, DEFAULT_API_PORT);
        assert!(config.whatsapp.is_none());
        assert!(config.shutdown_keyword.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = ParleyConfigFile::default();
        fc.backend.mode = Some("remote".to_string());
        fc.backend.model = Some("file-model".to_string());
        fc.server.port = Some(9000);

        let config = Config::from_sources(
            fc,
            env_from(&[
                ("MODEL_TYPE", "Local"),
                ("TEXT_EVALUATOR_MODEL", "env-model"),
                ("STOPPING_STRING", "\nUser:"),
            ]),
        )
        .unwrap();

        assert_eq!(config.backend.mode, BackendMode::Local);
        assert_eq!(config.backend.model.as_deref(), Some("env-model"));
        assert_eq!(config.backend.stop_sequence.as_deref(), Some("\nUser:"));
        assert_eq!(config.api_server.port, 9000);
    }

    #[test]
    fn unsupported_mode_is_a_config_error() {
        let err = Config::from_sources(ParleyConfigFile::default(), env_from(&[("MODEL_TYPE", "cloud")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("cloud")));
    }

    #[test]
    fn bad_number_is_a_config_error() {
        let err = Config::from_sources(
            ParleyConfigFile::default(),
            env_from(&[("REQUEST_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn whatsapp_requires_token_and_phone_id() {
        let only_token =
            Config::from_sources(ParleyConfigFile::default(), env_from(&[("WHATSAPP_TOKEN", "t")])).unwrap();
        assert!(only_token.whatsapp.is_none());

        let both = Config::from_sources(
            ParleyConfigFile::default(),
            env_from(&[("WHATSAPP_TOKEN", "t"), ("WHATSAPP_PHONE_ID", "123")]),
        )
        .unwrap();
        let wa = both.whatsapp.unwrap();
        assert_eq!(wa.phone_number_id, "123");
        assert!(wa.verify_token.is_none());
    }

    #[test]
    fn local_url_joins_slashes() {
        let backend = BackendConfig {
            address: "http://127.0.0.1:8080/".to_string(),
            endpoint_path: "generate".to_string(),
            ..BackendConfig::default()
        };
        assert_eq!(backend.local_url(), "http://127.0.0.1:8080/generate");

        let bare = BackendConfig {
            address: "http://127.0.0.1:8080".to_string(),
            endpoint_path: String::new(),
            ..BackendConfig::default()
        };
        assert_eq!(bare.local_url(), "http://127.0.0.1:8080");
    }
}
