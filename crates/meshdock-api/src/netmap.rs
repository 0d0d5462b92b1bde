// Wire form of the network map delivered by the stack's net-map
// notification. Field names follow the stack's camelCase JSON; fields added
// in later stack revisions default so older payloads still decode.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Machine authorization status of the local node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineStatus {
    #[default]
    MachineUnknown,
    MachineUnauthorized,
    MachineAuthorized,
    MachineInvalid,
}

/// Top-level network map payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetMapPayload {
    #[serde(default)]
    pub domain: String,
    #[serde(rename = "self")]
    pub self_node: NetMapSelfNode,
    #[serde(default, deserialize_with = "null_as_default")]
    pub peers: Vec<NetMapPeerNode>,
    #[serde(default)]
    pub locked_out: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: HashMap<String, NetMapUser>,
}

/// The authenticated device itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetMapSelfNode {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub machine_key: String,
    #[serde(default)]
    pub node_key: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub ipn_version: Option<String>,
    #[serde(default)]
    pub machine_status: MachineStatus,
}

/// A reachable peer in the mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct NetMapPeerNode {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub machine_key: String,
    #[serde(default)]
    pub node_key: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub ipn_version: Option<String>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub routes: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub expired: bool,
    #[serde(default, rename = "tailscaleSSHEnabled")]
    pub tailscale_ssh_enabled: bool,
}

/// Entry of the user directory, keyed by user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetMapUser {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "ProfilePicURL")]
    pub profile_pic_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<serde_json::Value>,
}

impl NetMapPayload {
    /// Parse the JSON string carried by a net-map notification.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// The stack serializes empty Go slices and maps as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "domain": "corp.example.net",
        "self": {
            "name": "console.corp.example.net.",
            "addresses": ["100.64.0.1", "fd7a:115c:a1e0::1"],
            "machineKey": "mkey:aa",
            "nodeKey": "nodekey:bb",
            "machineStatus": "MachineAuthorized"
        },
        "peers": [{
            "id": "n1",
            "name": "db.corp.example.net.",
            "addresses": ["100.64.0.7"],
            "machineKey": "mkey:cc",
            "nodeKey": "nodekey:dd",
            "os": "linux",
            "osVersion": "6.1",
            "lastSeen": "2026-10-01T10:00:00Z",
            "user": "7",
            "routes": null,
            "tags": ["tag:db"],
            "online": true,
            "expired": false,
            "tailscaleSSHEnabled": true
        }],
        "lockedOut": false,
        "users": {"7": {"ID": 7, "LoginName": "ops@example.net", "DisplayName": "Ops", "ProfilePicURL": "", "Roles": []}}
    }"#;

    #[test]
    fn decodes_full_payload() {
        let map = NetMapPayload::from_json(SAMPLE).unwrap();
        assert_eq!(map.domain, "corp.example.net");
        assert_eq!(map.self_node.machine_status, MachineStatus::MachineAuthorized);
        assert_eq!(map.peers.len(), 1);
        assert!(map.peers[0].tailscale_ssh_enabled);
        assert_eq!(map.peers[0].routes, None);
        assert_eq!(map.users["7"].login_name, "ops@example.net");
    }

    #[test]
    fn null_collections_decode_as_empty() {
        let map = NetMapPayload::from_json(
            r#"{"self": {"name": "a", "addresses": null}, "peers": null, "users": null}"#,
        )
        .unwrap();
        assert!(map.peers.is_empty());
        assert!(map.users.is_empty());
        assert!(map.self_node.addresses.is_empty());
        assert_eq!(map.self_node.machine_status, MachineStatus::MachineUnknown);
    }

    #[test]
    fn rejects_non_json() {
        assert!(NetMapPayload::from_json("not valid json").is_err());
    }
}
