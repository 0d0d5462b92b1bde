//! Shared configuration for meshdock consoles.
//!
//! TOML file + `MESHDOCK_` environment loading, auth-key resolution
//! (env + keyring + plaintext), and translation to
//! `meshdock_core::ConsoleConfig`. The CLI layers its own flag overrides
//! on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use meshdock_core::config::{DEFAULT_CONTROL_URL, DEFAULT_SELFSERVICE_HOSTNAME};
use meshdock_core::{ChannelConfig, ConsoleConfig, DEFAULT_READ_BUFFER};

/// Environment variable consulted for the auth key after `auth_key_env`.
pub const AUTH_KEY_ENV: &str = "MESHDOCK_AUTH_KEY";

/// Keyring service and entry holding the auth key.
pub const KEYRING_SERVICE: &str = "meshdock";
pub const KEYRING_USER: &str = "auth-key";

const ENV_PREFIX: &str = "MESHDOCK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Control server to boot against. Wins over the last-known profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_url: Option<String>,

    /// Fallback when neither `control_url` nor a stored profile names one.
    #[serde(default = "default_control_url")]
    pub default_control_url: String,

    /// Pre-authorized key (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,

    /// Name of an environment variable holding the auth key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_key_env: Option<String>,

    #[serde(default = "default_route_all")]
    pub route_all: bool,

    /// ACL tags advertised by this node.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default = "default_selfservice_hostname")]
    pub selfservice_hostname: String,

    /// Where the stack's key/value state lives. Defaults to the platform
    /// data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub channels: Channels,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_url: None,
            default_control_url: default_control_url(),
            auth_key: None,
            auth_key_env: None,
            route_all: default_route_all(),
            tags: Vec::new(),
            hostname: None,
            selfservice_hostname: default_selfservice_hostname(),
            state_file: None,
            channels: Channels::default(),
        }
    }
}

/// `[channels]` section: raw channel read buffers, in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Channels {
    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnc: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdp: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            read_buffer: default_read_buffer(),
            ssh: None,
            vnc: None,
            rdp: None,
            connect_timeout_secs: None,
        }
    }
}

fn default_control_url() -> String {
    DEFAULT_CONTROL_URL.into()
}
fn default_route_all() -> bool {
    true
}
fn default_selfservice_hostname() -> String {
    DEFAULT_SELFSERVICE_HOSTNAME.into()
}
fn default_read_buffer() -> usize {
    DEFAULT_READ_BUFFER
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "meshdock", "meshdock")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("meshdock");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the persisted stack state.
pub fn default_state_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("state.json"),
        |dirs| dirs.data_dir().join("state.json"),
    )
}

impl Config {
    /// State file to open: the configured one, else the platform default.
    pub fn state_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(default_state_path)
    }
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Auth key ────────────────────────────────────────────────────────

/// Store an auth key in the system keyring.
pub fn store_auth_key(secret: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?.set_password(secret)?;
    Ok(())
}

fn keyring_auth_key() -> Option<String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER).ok()?;
    entry.get_password().ok()
}

impl Config {
    /// Resolve the auth key: env var named by `auth_key_env`, then
    /// `MESHDOCK_AUTH_KEY`, then the keyring, then plaintext.
    ///
    /// No key at all is fine; the stack then goes through interactive login.
    pub fn resolve_auth_key(&self) -> Option<SecretString> {
        self.resolve_auth_key_with(|name| std::env::var(name).ok(), keyring_auth_key)
    }

    fn resolve_auth_key_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
        keyring: impl FnOnce() -> Option<String>,
    ) -> Option<SecretString> {
        // 1. Configured env var
        if let Some(value) = self.auth_key_env.as_deref().and_then(&env) {
            return Some(SecretString::from(value));
        }

        // 2. Well-known env var
        if let Some(value) = env(AUTH_KEY_ENV) {
            return Some(SecretString::from(value));
        }

        // 3. System keyring
        if let Some(value) = keyring() {
            return Some(SecretString::from(value));
        }

        // 4. Plaintext in config
        self.auth_key.clone().map(SecretString::from)
    }

    /// Validate and build the runtime `ConsoleConfig`.
    pub fn to_console_config(&self) -> Result<ConsoleConfig, ConfigError> {
        self.to_console_config_with(self.resolve_auth_key())
    }

    /// Check every value without touching the environment or keyring.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_console_config_with(None).map(|_| ())
    }

    fn to_console_config_with(
        &self,
        auth_key: Option<SecretString>,
    ) -> Result<ConsoleConfig, ConfigError> {
        let control_url = self
            .control_url
            .as_deref()
            .map(|raw| parse_url("control_url", raw))
            .transpose()?;
        let default_control_url = parse_url("default_control_url", &self.default_control_url)?;

        if self.selfservice_hostname.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "selfservice_hostname".into(),
                reason: "must not be empty".into(),
            });
        }
        if let Some(tag) = self.tags.iter().find(|t| !t.starts_with("tag:")) {
            return Err(ConfigError::Validation {
                field: "tags".into(),
                reason: format!("'{tag}' must start with 'tag:'"),
            });
        }

        Ok(ConsoleConfig {
            control_url,
            default_control_url,
            auth_key,
            route_all: self.route_all,
            advertise_tags: self.tags.clone(),
            hostname: self.hostname.clone().filter(|h| !h.is_empty()),
            selfservice_hostname: self.selfservice_hostname.clone(),
            channels: self.channels.to_channel_config()?,
        })
    }
}

impl Channels {
    /// Validate buffer sizes and build the core channel tuning.
    pub fn to_channel_config(&self) -> Result<ChannelConfig, ConfigError> {
        for (field, size) in [
            ("channels.read_buffer", Some(self.read_buffer)),
            ("channels.ssh", self.ssh),
            ("channels.vnc", self.vnc),
            ("channels.rdp", self.rdp),
        ] {
            if size == Some(0) {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "read buffer must be larger than zero".into(),
                });
            }
        }

        Ok(ChannelConfig {
            default_read_buffer: self.read_buffer,
            ssh_read_buffer: self.ssh,
            vnc_read_buffer: self.vnc,
            rdp_read_buffer: self.rdp,
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
        })
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_values_and_env_overrides() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                    control_url = "https://hs.example.net/"
                    tags = ["tag:console"]
                    hostname = "ops-console"

                    [channels]
                    rdp = 65536
                    connect_timeout_secs = 10
                "#,
            )?;
            jail.set_env("MESHDOCK_ROUTE_ALL", "false");
            jail.set_env("MESHDOCK_CHANNELS__SSH", "131072");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.control_url.as_deref(), Some("https://hs.example.net/"));
            assert_eq!(cfg.tags, vec!["tag:console".to_owned()]);
            assert!(!cfg.route_all);
            assert_eq!(cfg.channels.rdp, Some(65536));
            assert_eq!(cfg.channels.ssh, Some(131_072));
            assert_eq!(cfg.channels.read_buffer, DEFAULT_READ_BUFFER);
            assert_eq!(cfg.selfservice_hostname, "self-service");
            Ok(())
        });
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            control_url: Some("https://hs.example.net/".into()),
            auth_key_env: Some("OPS_KEY".into()),
            state_file: Some(dir.path().join("state.json")),
            ..Config::default()
        };

        save_config_to(&cfg, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("auth_key_env = \"OPS_KEY\""));
        assert!(!written.contains("\nhostname ="));

        let loaded: Config = Figment::from(Toml::file(&path)).extract().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn auth_key_resolution_order() {
        let cfg = Config {
            auth_key: Some("plain".into()),
            auth_key_env: Some("OPS_KEY".into()),
            ..Config::default()
        };

        let key = cfg.resolve_auth_key_with(
            env_of(&[("OPS_KEY", "from-custom"), (AUTH_KEY_ENV, "from-default")]),
            || Some("from-keyring".into()),
        );
        assert_eq!(key.unwrap().expose_secret(), "from-custom");

        let key = cfg.resolve_auth_key_with(env_of(&[(AUTH_KEY_ENV, "from-default")]), || {
            Some("from-keyring".into())
        });
        assert_eq!(key.unwrap().expose_secret(), "from-default");

        let key = cfg.resolve_auth_key_with(env_of(&[]), || Some("from-keyring".into()));
        assert_eq!(key.unwrap().expose_secret(), "from-keyring");

        let key = cfg.resolve_auth_key_with(env_of(&[]), || None);
        assert_eq!(key.unwrap().expose_secret(), "plain");

        let bare = Config::default();
        assert!(bare.resolve_auth_key_with(env_of(&[]), || None).is_none());
    }

    #[test]
    fn console_config_translation() {
        let cfg = Config {
            control_url: Some("https://hs.example.net/".into()),
            hostname: Some(String::new()),
            channels: Channels {
                vnc: Some(1024),
                connect_timeout_secs: Some(5),
                ..Channels::default()
            },
            ..Config::default()
        };

        let console = cfg.to_console_config_with(None).unwrap();
        assert_eq!(
            console.control_url.as_ref().map(Url::as_str),
            Some("https://hs.example.net/")
        );
        assert_eq!(console.default_control_url.as_str(), DEFAULT_CONTROL_URL);
        assert!(console.route_all);
        assert!(console.hostname.is_none());
        assert_eq!(console.channels.vnc_read_buffer, Some(1024));
        assert_eq!(console.channels.connect_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn console_config_rejects_bad_values() {
        let bad_url = Config {
            control_url: Some("not a url".into()),
            ..Config::default()
        };
        assert!(matches!(
            bad_url.to_console_config_with(None),
            Err(ConfigError::Validation { ref field, .. }) if field == "control_url"
        ));

        let zero_buffer = Config {
            channels: Channels {
                rdp: Some(0),
                ..Channels::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            zero_buffer.to_console_config_with(None),
            Err(ConfigError::Validation { ref field, .. }) if field == "channels.rdp"
        ));

        let bad_tag = Config {
            tags: vec!["console".into()],
            ..Config::default()
        };
        assert!(matches!(
            bad_tag.to_console_config_with(None),
            Err(ConfigError::Validation { ref field, .. }) if field == "tags"
        ));
    }

    #[test]
    fn state_path_prefers_configured_file() {
        let cfg = Config {
            state_file: Some(PathBuf::from("/var/lib/meshdock/state.json")),
            ..Config::default()
        };
        assert_eq!(cfg.state_path(), PathBuf::from("/var/lib/meshdock/state.json"));
        assert!(Config::default().state_path().ends_with("state.json"));
    }
}
