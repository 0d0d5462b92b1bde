// ── Network map domain types ──
//
// Decoded view of the mesh as the authenticated device sees it. A map is
// immutable once built: every net-map notification replaces it wholesale.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use meshdock_api::{MachineStatus, NetMapPayload, NetMapPeerNode, NetMapSelfNode, NetMapUser};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The authenticated device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfNode {
    pub name: String,
    pub addresses: Vec<String>,
    pub machine_key: String,
    pub node_key: String,
    pub created_at: Option<DateTime<Utc>>,
    pub ipn_version: Option<String>,
    pub machine_status: MachineStatus,
}

/// A peer in the mesh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Peer {
    pub id: String,
    pub name: String,
    pub addresses: Vec<String>,
    pub machine_key: String,
    pub node_key: String,
    pub os: String,
    pub os_version: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub user: String,
    pub routes: Vec<String>,
    pub tags: Vec<String>,
    pub online: bool,
    pub expired: bool,
    pub tailscale_ssh_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login_name: String,
    pub display_name: String,
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMap {
    pub domain: String,
    pub self_node: SelfNode,
    pub peers: Vec<Peer>,
    pub locked_out: bool,
    pub users: BTreeMap<String, User>,
}

impl NetworkMap {
    /// Decode the JSON string carried by a net-map notification.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        NetMapPayload::from_json(raw)
            .map(Self::from)
            .map_err(|e| CoreError::NetMapDecode {
                message: e.to_string(),
            })
    }

    pub fn online_peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.online)
    }

    /// First peer whose short hostname equals `short_name`.
    pub fn peer_by_short_name(&self, short_name: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.short_name() == short_name)
    }

    /// Online peer acting as the self-service endpoint, if any.
    pub fn selfservice_peer(&self, hostname: &str) -> Option<&Peer> {
        self.online_peers().find(|p| p.short_name() == hostname)
    }

    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }
}

impl Peer {
    /// First DNS label of the peer name (`db.corp.example.net.` → `db`).
    pub fn short_name(&self) -> &str {
        self.name.split('.').next().unwrap_or_default()
    }

    /// First assigned address, usually the IPv4 one.
    pub fn primary_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

// ── Conversion from wire types ──────────────────────────────────────

impl From<NetMapPayload> for NetworkMap {
    fn from(p: NetMapPayload) -> Self {
        Self {
            domain: p.domain,
            self_node: p.self_node.into(),
            peers: p.peers.into_iter().map(Peer::from).collect(),
            locked_out: p.locked_out,
            users: p
                .users
                .into_iter()
                .map(|(id, u)| (id, User::from(u)))
                .collect(),
        }
    }
}

impl From<NetMapSelfNode> for SelfNode {
    fn from(n: NetMapSelfNode) -> Self {
        Self {
            name: n.name,
            addresses: n.addresses,
            machine_key: n.machine_key,
            node_key: n.node_key,
            created_at: parse_timestamp(n.created_at.as_deref()),
            ipn_version: n.ipn_version.filter(|v| !v.is_empty()),
            machine_status: n.machine_status,
        }
    }
}

impl From<NetMapPeerNode> for Peer {
    fn from(n: NetMapPeerNode) -> Self {
        Self {
            id: n.id,
            name: n.name,
            addresses: n.addresses,
            machine_key: n.machine_key,
            node_key: n.node_key,
            os: n.os,
            os_version: n.os_version,
            last_seen: parse_timestamp(n.last_seen.as_deref()),
            user: n.user,
            routes: n.routes.unwrap_or_default(),
            tags: n.tags.unwrap_or_default(),
            online: n.online,
            expired: n.expired,
            tailscale_ssh_enabled: n.tailscale_ssh_enabled,
        }
    }
}

impl From<NetMapUser> for User {
    fn from(u: NetMapUser) -> Self {
        Self {
            id: u.id,
            login_name: u.login_name,
            display_name: u.display_name,
            profile_pic_url: Some(u.profile_pic_url).filter(|s| !s.is_empty()),
        }
    }
}

/// RFC 3339 timestamps; the stack reports Go's zero time for "never".
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw?).ok()?.with_timezone(&Utc);
    (ts.timestamp() > 0).then_some(ts)
}
