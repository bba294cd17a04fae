//! Configuration loading and gateway settings.
//!
//! Files are read in any format the `config` crate understands (detected
//! from the extension), with `${VAR}` and `$VAR` environment substitution
//! applied to the raw text before parsing.

use crate::error::{KernelError, KernelResult};
use chrono::{DateTime, Utc};
use config::{Config as Cfg, File, FileFormat};
use error_stack::{Report, ResultExt};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

/// Configuration loading error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parsing error: {0}")]
    Parse(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

static BRACED_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("braced env var pattern is valid")
});

static BARE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").expect("bare env var pattern is valid")
});

/// Detect configuration format from file extension
///
/// Supported: `.yaml`/`.yml`, `.toml`, `.json`, `.ini`, `.ron`, `.json5`.
pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// Substitute environment variables in a string
///
/// `${VAR_NAME}` is replaced first, then `$VAR_NAME`. References to unset
/// variables are left as written.
pub fn substitute_env_vars(content: &str) -> String {
    let braced = BRACED_VAR.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    BARE_VAR
        .replace_all(&braced, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Load configuration from a file, detecting its format from the extension.
pub fn load_config<T>(path: &str) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    from_str(&content, format)
}

/// Load configuration from a string with explicit format
pub fn from_str<T>(content: &str, format: FileFormat) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    let substituted_content = substitute_env_vars(content);

    let config = Cfg::builder()
        .add_source(File::from_str(&substituted_content, format))
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::Serialization(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway settings
// ─────────────────────────────────────────────────────────────────────────────

/// Site-wide gateway settings. Every field has a default, so an empty file
/// is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewaySettings {
    /// Global write switch. Write modules fail with `noapiwrite` when off.
    pub enable_write: bool,
    /// Disclose replica and server host names in responses.
    pub show_hostnames: bool,
    /// Show internal failure messages verbatim instead of a generic text.
    pub show_exception_details: bool,
    /// Host label for `servedby`.
    pub served_by: String,
    /// Name reported by `action=siteinfo`.
    pub site_name: String,
    pub content_language: String,
    /// Documentation URL referenced from usage errors.
    pub doc_url: String,
    /// Action used when the request names none.
    pub default_action: Option<String>,
    pub anonymous_rights: Vec<String>,
    /// Nothing is reported as modified before this instant.
    pub cache_epoch: Option<DateTime<Utc>>,
    /// CDN cache lifetime in seconds. Content is never considered older
    /// than `now - cdn_max_age`.
    pub cdn_max_age: Option<u64>,
    pub cors_allowed_origins: Vec<String>,
    pub server: ServerSettings,
    pub users: Vec<UserSettings>,
    pub replication: ReplicationSettings,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enable_write: true,
            show_hostnames: false,
            show_exception_details: false,
            served_by: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            site_name: "Apigate".to_string(),
            content_language: "en".to_string(),
            doc_url: "https://localhost/api".to_string(),
            default_action: None,
            anonymous_rights: vec!["read".to_string(), "writeapi".to_string()],
            cache_epoch: None,
            cdn_max_age: None,
            cors_allowed_origins: Vec::new(),
            server: ServerSettings::default(),
            users: Vec::new(),
            replication: ReplicationSettings::default(),
        }
    }
}

impl GatewaySettings {
    /// Load settings from a file in any supported format.
    pub fn load(path: &str) -> KernelResult<Self> {
        tracing::debug!(path, "loading gateway settings");
        load_config(path)
            .map_err(KernelError::from)
            .map_err(Report::new)
            .attach(format!("loading gateway settings from {path}"))
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&str>) -> KernelResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn user_by_key(&self, api_key: &str) -> Option<&UserSettings> {
        self.users.iter().find(|u| u.api_key == api_key)
    }
}

/// Listener settings for the HTTP binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// A statically configured caller, selected by API key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSettings {
    pub name: String,
    pub api_key: String,
    #[serde(default)]
    pub rights: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Session tokens by kind, e.g. `csrf`.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

/// Replica state reported by the static lag probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplicationSettings {
    pub host: String,
    pub lag_seconds: f64,
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            lag_seconds: 0.0,
        }
    }
}
