//! TOML configuration file loading
//!
//! Supports `~/.config/parley/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Model backend configuration
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Conversation history configuration
    #[serde(default)]
    pub history: HistoryFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// `WhatsApp` Cloud API configuration
    #[serde(default)]
    pub whatsapp: WhatsAppFileConfig,
}

/// Model backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct BackendFileConfig {
    /// Backend mode ("local" or "remote")
    pub mode: Option<String>,

    /// Local backend base address (e.g. `<http://localhost:5001>`)
    pub address: Option<String>,

    /// Local backend endpoint path (e.g. "/api/v1")
    pub endpoint_path: Option<String>,

    /// Remote chat-completion endpoint
    pub remote_address: Option<String>,

    /// Remote model identifier
    pub model: Option<String>,

    /// Authorization header value
    pub authorization: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Stop sequence passed to the remote backend
    pub stop_sequence: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Conversation history configuration
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    /// Root directory for per-contact logs
    pub dir: Option<String>,

    /// Only the most recent N turns go into the prompt
    pub max_prompt_turns: Option<usize>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Chat message that shuts the bot down
    pub shutdown_keyword: Option<String>,
}

/// `WhatsApp` Cloud API configuration
#[derive(Debug, Default, Deserialize)]
pub struct WhatsAppFileConfig {
    pub access_token: Option<String>,
    pub phone_number_id: Option<String>,
    pub verify_token: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    config_file_path().map_or_else(ParleyConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> ParleyConfigFile {
    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match read_from(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Read and parse a TOML config file
///
/// # Errors
///
/// Returns `Error::Io` if the file cannot be read and `Error::Toml` if it is
/// not valid TOML for this schema
pub fn read_from(path: &Path) -> Result<ParleyConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("parley").join("config.toml"))
}
