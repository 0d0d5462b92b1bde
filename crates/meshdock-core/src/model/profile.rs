// ── Identity profiles ──
//
// A profile is the stack's persisted snapshot of one identity: control
// server, preferences, and node identity. The console only ever reads them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stack-side profile name, e.g. `profile-3f9a`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// User identity attached to a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    #[serde(rename = "ID", default)]
    pub id: i64,
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub display_name: String,
}

/// Node identity fields of a profile. Private keys are never decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileIdentity {
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    #[serde(default)]
    pub user_profile: UserProfile,
    #[serde(default)]
    pub network_lock_key: String,
}

/// Preference fields the console cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ProfilePrefs {
    #[serde(rename = "ControlURL", default)]
    pub control_url: String,
    #[serde(default)]
    pub route_all: bool,
    #[serde(default)]
    pub want_running: bool,
    #[serde(default)]
    pub logged_out: bool,
    #[serde(default)]
    pub hostname: String,
    #[serde(rename = "RunSSH", default)]
    pub run_ssh: bool,
    #[serde(rename = "CorpDNS", default)]
    pub corp_dns: bool,
    #[serde(default)]
    pub shields_up: bool,
    #[serde(default, deserialize_with = "tags_or_empty")]
    pub advertise_tags: Vec<String>,
    #[serde(default)]
    pub config: Option<ProfileIdentity>,
}

/// A decoded profile: typed preferences plus the raw opaque blob.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub id: ProfileId,
    #[serde(flatten)]
    pub prefs: ProfilePrefs,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Profile {
    /// Decode a profile from its JSON form.
    pub fn from_json(id: ProfileId, json: &str) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_str(json)?;
        let prefs = ProfilePrefs::deserialize(&raw)?;
        Ok(Self { id, prefs, raw })
    }

    /// Control server URL, if the profile carries one.
    pub fn control_url(&self) -> Option<&str> {
        let url = self.prefs.control_url.trim();
        (!url.is_empty()).then_some(url)
    }

    pub fn login_name(&self) -> Option<&str> {
        self.prefs
            .config
            .as_ref()
            .map(|c| c.user_profile.login_name.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn node_id(&self) -> Option<&str> {
        self.prefs
            .config
            .as_ref()
            .map(|c| c.node_id.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// All profiles found in storage plus the resolved current pointer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSet {
    pub current: Option<ProfileId>,
    pub profiles: BTreeMap<ProfileId, Profile>,
}

impl ProfileSet {
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// The profile the current pointer names, if it resolved.
    pub fn current_profile(&self) -> Option<&Profile> {
        self.current.as_ref().and_then(|id| self.profiles.get(id))
    }

    pub fn get(&self, id: &ProfileId) -> Option<&Profile> {
        self.profiles.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ProfileId> {
        self.profiles.keys()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(ProfileId::as_str)
    }
}

/// `AdvertiseTags` is `null` when unset.
fn tags_or_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "ControlURL": "https://hs.example.net",
        "RouteAll": true,
        "WantRunning": true,
        "LoggedOut": false,
        "Hostname": "console",
        "RunSSH": false,
        "CorpDNS": true,
        "ShieldsUp": false,
        "AdvertiseTags": null,
        "NetfilterMode": 2,
        "Config": {
            "PrivateNodeKey": "privkey:secret",
            "NodeID": "nABC123",
            "UserProfile": {"ID": 42, "LoginName": "ops@example.net", "DisplayName": "Ops"}
        }
    }"#;

    #[test]
    fn decodes_prefs_and_keeps_raw_blob() {
        let profile = Profile::from_json("profile-work".into(), PROFILE).unwrap();
        assert_eq!(profile.control_url(), Some("https://hs.example.net"));
        assert!(profile.prefs.route_all);
        assert!(profile.prefs.advertise_tags.is_empty());
        assert_eq!(profile.node_id(), Some("nABC123"));
        assert_eq!(profile.login_name(), Some("ops@example.net"));
        assert_eq!(profile.raw["NetfilterMode"], 2);
    }

    #[test]
    fn serialized_form_omits_private_keys() {
        let profile = Profile::from_json("profile-work".into(), PROFILE).unwrap();
        let out = serde_json::to_string(&profile).unwrap();
        assert!(!out.contains("privkey"));
        assert!(out.contains("\"id\":\"profile-work\""));
    }

    #[test]
    fn empty_control_url_is_none() {
        let profile = Profile::from_json("profile-x".into(), "{}").unwrap();
        assert_eq!(profile.control_url(), None);
        assert_eq!(profile.login_name(), None);
    }

    #[test]
    fn current_profile_requires_matching_entry() {
        let mut set = ProfileSet::default();
        assert!(set.is_empty());
        set.current = Some("profile-a".into());
        assert!(set.current_profile().is_none());

        let profile = Profile::from_json("profile-a".into(), "{}").unwrap();
        set.profiles.insert(profile.id.clone(), profile);
        assert_eq!(set.current_profile().map(|p| p.id.as_str()), Some("profile-a"));
    }
}
