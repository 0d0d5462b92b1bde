// ── Connection links ──
//
// A remote-access target packed into a URL-safe token so it can be handed
// to a panel or shared as a link.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::config::Protocol;
use crate::error::CoreError;

/// Target of a remote-access session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub proto: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ConnectParams {
    pub fn new(proto: Protocol) -> Self {
        Self {
            proto,
            host: None,
            port: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Explicit port, else the protocol's well-known one.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.proto.default_port())
    }

    /// Encode as unpadded URL-safe base64 of the JSON form.
    pub fn encode(&self) -> Result<String, CoreError> {
        let json = serde_json::to_vec(self).map_err(|e| CoreError::Link {
            message: e.to_string(),
        })?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a token produced by [`encode`](Self::encode). Padding and the
    /// standard base64 alphabet are tolerated.
    pub fn decode(token: &str) -> Result<Self, CoreError> {
        let normalized: String = token
            .trim()
            .trim_end_matches('=')
            .chars()
            .map(|c| match c {
                '+' => '-',
                '/' => '_',
                other => other,
            })
            .collect();
        let json = URL_SAFE_NO_PAD
            .decode(normalized)
            .map_err(|e| CoreError::Link {
                message: format!("not base64: {e}"),
            })?;
        serde_json::from_slice(&json).map_err(|e| CoreError::Link {
            message: format!("not a connection target: {e}"),
        })
    }
}
