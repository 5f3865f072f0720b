//! Configuration for the publisher client.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Files are read
//! from `~/.config/socrata/config.toml` and/or `.socrata/config.toml` in the
//! workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::workflow::PollPolicy;

/// Base URL of the public open-data domain.
pub const DEFAULT_BASE_URL: &str = "https://opendata.socrata.com/api";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SocrataConfig {
    pub connection: ConnectionConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
}

impl SocrataConfig {
    /// Validate every section, returning human-readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.connection.validate();
        warnings.extend(self.polling.validate());
        warnings
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// API root, e.g. `https://data.example.gov/api`.
    pub base_url: String,
    /// Domain CNAME sent in the `X-Socrata-Host` header.
    pub domain: String,
    /// User (email) to authenticate as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Name of the environment variable holding the password.
    pub password_env: String,
    /// Application token sent in the `X-App-Token` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token: Option<String>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            domain: "opendata.socrata.com".to_string(),
            username: None,
            password_env: "SOCRATA_PASSWORD".to_string(),
            app_token: None,
            request_timeout_secs: 120,
        }
    }
}

impl ConnectionConfig {
    /// Read the password from the configured environment variable.
    pub fn password(&self) -> Option<String> {
        std::env::var(&self.password_env).ok()
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        match url::Url::parse(&self.base_url) {
            Ok(url) if url.scheme() != "https" && url.scheme() != "http" => {
                warnings.push(format!(
                    "connection.base_url uses unsupported scheme '{}'",
                    url.scheme()
                ));
            }
            Ok(_) => {}
            Err(e) => warnings.push(format!("connection.base_url is not a valid URL: {}", e)),
        }
        if self.domain.trim().is_empty() {
            warnings.push("connection.domain is empty".to_string());
        }
        if self.username.is_some() && self.password().is_none() {
            warnings.push(format!(
                "connection.username is set but ${} is not",
                self.password_env
            ));
        }
        if self.request_timeout_secs == 0 {
            warnings.push("connection.request_timeout_secs must be greater than 0".to_string());
        }
        warnings
    }
}

/// Intervals and limits for ticketed operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Seconds between polls of an import/copy/publish ticket.
    pub ticket_interval_secs: u64,
    /// Seconds between polls of the pending geocoding count.
    pub geocoding_interval_secs: u64,
    /// Give up after this many seconds of polling. `None` polls without limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            ticket_interval_secs: 10,
            geocoding_interval_secs: 10,
            timeout_secs: Some(3600),
        }
    }
}

impl PollingConfig {
    pub fn ticket_policy(&self) -> PollPolicy {
        self.policy(self.ticket_interval_secs)
    }

    pub fn geocoding_policy(&self) -> PollPolicy {
        self.policy(self.geocoding_interval_secs)
    }

    fn policy(&self, interval_secs: u64) -> PollPolicy {
        let interval = Duration::from_secs(interval_secs);
        match self.timeout_secs {
            Some(secs) => PollPolicy::new(interval, Duration::from_secs(secs)),
            None => PollPolicy::unbounded(interval),
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.ticket_interval_secs == 0 {
            warnings.push("polling.ticket_interval_secs is 0; the server will be polled in a tight loop".to_string());
        }
        if self.geocoding_interval_secs == 0 {
            warnings.push("polling.geocoding_interval_secs is 0; the server will be polled in a tight loop".to_string());
        }
        if self.timeout_secs.is_none() {
            warnings.push("polling.timeout_secs is unset; ticketed operations may poll forever".to_string());
        }
        warnings
    }
}

/// Log output settings used by [`crate::logging::init_logging`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `socrata_publisher=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Directory, relative to a workspace, holding its `config.toml`.
pub const WORKSPACE_CONFIG_DIR: &str = ".socrata";
/// Prefix of configuration environment variables. Nested keys are joined
/// with `__`: `SOCRATA_POLLING__TIMEOUT_SECS=600`.
pub const ENV_PREFIX: &str = "SOCRATA_";

const CONFIG_FILE: &str = "config.toml";

/// The per-user configuration file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("com", "socrata", "socrata")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn merge_if_present(figment: Figment, path: Option<PathBuf>) -> Figment {
    match path {
        Some(path) if path.is_file() => figment.merge(Toml::file(path)),
        _ => figment,
    }
}

/// Resolve the configuration.
///
/// Later layers win: built-in defaults, the user file, the workspace's
/// `.socrata/config.toml`, `SOCRATA_*` variables, then `overrides`.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&SocrataConfig>,
) -> Result<SocrataConfig, Box<figment::Error>> {
    let base = Figment::from(Serialized::defaults(SocrataConfig::default()));
    let with_user = merge_if_present(base, user_config_path());
    let with_workspace = merge_if_present(
        with_user,
        workspace.map(|ws| ws.join(WORKSPACE_CONFIG_DIR).join(CONFIG_FILE)),
    );
    let layered = with_workspace.merge(Env::prefixed(ENV_PREFIX).split("__"));

    let resolved = match overrides {
        Some(overrides) => layered.merge(Serialized::defaults(overrides)),
        None => layered,
    };
    resolved.extract().map_err(Box::new)
}
