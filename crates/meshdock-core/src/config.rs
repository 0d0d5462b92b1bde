// ── Runtime console configuration ──
//
// Plain immutable values describing how to boot the stack and open
// channels. Core never reads config files; `meshdock-config` (or a test)
// builds a `ConsoleConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use strum::{Display, EnumString, IntoStaticStr};
use serde::{Deserialize, Serialize};
use url::Url;

/// Control server used when neither the config nor a stored profile
/// names one: a Headscale instance on its default local listener.
pub const DEFAULT_CONTROL_URL: &str = "http://127.0.0.1:8080/";

/// Read buffer requested per TCP session unless overridden.
pub const DEFAULT_READ_BUFFER: usize = 4 * 1024 * 1024;

pub const DEFAULT_SELFSERVICE_HOSTNAME: &str = "self-service";

/// Remote-access protocol carried over a raw channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    Ssh,
    Vnc,
    Rdp,
}

impl Protocol {
    /// Well-known port of the protocol.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ssh => 22,
            Self::Vnc => 5900,
            Self::Rdp => 3389,
        }
    }
}

/// Raw channel tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub default_read_buffer: usize,
    pub ssh_read_buffer: Option<usize>,
    pub vnc_read_buffer: Option<usize>,
    pub rdp_read_buffer: Option<usize>,
    /// Passed to the stack's TCP open; `None` leaves it to the stack.
    pub connect_timeout: Option<Duration>,
}

impl ChannelConfig {
    /// Read-buffer size for a protocol, falling back to the default.
    pub fn read_buffer_for(&self, protocol: Protocol) -> usize {
        let specific = match protocol {
            Protocol::Ssh => self.ssh_read_buffer,
            Protocol::Vnc => self.vnc_read_buffer,
            Protocol::Rdp => self.rdp_read_buffer,
        };
        specific.unwrap_or(self.default_read_buffer)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_read_buffer: DEFAULT_READ_BUFFER,
            ssh_read_buffer: None,
            vnc_read_buffer: None,
            rdp_read_buffer: None,
            connect_timeout: None,
        }
    }
}

/// Everything the controller needs to boot the stack.
///
/// Built by the CLI/config layer and passed to
/// [`Controller::start`](crate::Controller::start).
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Explicit control server. Wins over any stored profile.
    pub control_url: Option<Url>,
    /// Used when neither `control_url` nor the last-known profile has one.
    pub default_control_url: Url,
    /// Pre-authorized key handed to the stack at boot.
    pub auth_key: Option<SecretString>,
    pub route_all: bool,
    pub advertise_tags: Vec<String>,
    pub hostname: Option<String>,
    /// Short hostname of the self-service peer.
    pub selfservice_hostname: String,
    pub channels: ChannelConfig,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            control_url: None,
            default_control_url: default_control_url(),
            auth_key: None,
            route_all: true,
            advertise_tags: Vec::new(),
            hostname: None,
            selfservice_hostname: DEFAULT_SELFSERVICE_HOSTNAME.into(),
            channels: ChannelConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// Control URL to boot with: the explicit value, else the last-known
    /// profile's, else the default.
    pub fn resolve_control_url(&self, last_known: Option<&str>) -> Url {
        if let Some(url) = &self.control_url {
            return url.clone();
        }
        last_known
            .and_then(|raw| Url::parse(raw).ok())
            .unwrap_or_else(|| self.default_control_url.clone())
    }
}

#[allow(clippy::expect_used)]
fn default_control_url() -> Url {
    Url::parse(DEFAULT_CONTROL_URL).expect("DEFAULT_CONTROL_URL is a valid URL")
}
