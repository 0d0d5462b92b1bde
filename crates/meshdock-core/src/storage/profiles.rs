//! Profile discovery over the persisted key/value layout.
//!
//! Layout written by the stack:
//!
//! - `ipn-state-profile-<id>` → byte-pair hex of the profile JSON
//! - `ipn-state-_current-profile` → byte-pair hex of the current profile
//!   name (`profile-<id>`)
//!
//! Nothing here caches: every call re-reads the store.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::codec;
use super::{
    CURRENT_PROFILE_ID, KeyValueStore, PROFILE_ID_PREFIX, STATE_PREFIX, StorageError, state_key,
};
use crate::model::{Profile, ProfileId, ProfileSet};

/// Read every stored profile and resolve the current pointer.
///
/// Entries that fail to decode are skipped with a warning. A pointer that
/// names a missing profile (or does not decode) resolves to `None`.
pub fn load_profiles<S>(store: &S) -> Result<ProfileSet, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let mut current = read_current_pointer(store)?;

    let mut profiles = BTreeMap::new();
    for key in store.keys()? {
        let Some(name) = profile_name_from_key(&key) else {
            continue;
        };
        let Some(encoded) = store.get(&key)? else {
            continue;
        };

        let id = ProfileId::new(name);
        let decoded = codec::decode(&encoded)
            .map_err(|e| e.to_string())
            .and_then(|json| Profile::from_json(id.clone(), &json).map_err(|e| e.to_string()));
        match decoded {
            Ok(profile) => {
                debug!(profile = %id, "found profile");
                profiles.insert(id, profile);
            }
            Err(reason) => warn!(key, %reason, "failed to parse stored profile"),
        }
    }

    if let Some(id) = current.take() {
        if profiles.contains_key(&id) {
            current = Some(id);
        } else {
            warn!(profile = %id, "current profile pointer names a profile that does not exist");
        }
    }

    Ok(ProfileSet { current, profiles })
}

/// Point the current-profile pointer at `id`.
pub fn set_current_profile<S>(store: &S, id: &ProfileId) -> Result<(), StorageError>
where
    S: KeyValueStore + ?Sized,
{
    store.set(&state_key(CURRENT_PROFILE_ID), &codec::encode(id.as_str()))
}

/// Remove the current-profile pointer. Returns whether one was present.
/// Safe to call repeatedly.
pub fn clear_current_profile<S>(store: &S) -> Result<bool, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    store.remove(&state_key(CURRENT_PROFILE_ID))
}

fn read_current_pointer<S>(store: &S) -> Result<Option<ProfileId>, StorageError>
where
    S: KeyValueStore + ?Sized,
{
    let Some(encoded) = store.get(&state_key(CURRENT_PROFILE_ID))? else {
        return Ok(None);
    };
    if encoded.is_empty() {
        return Ok(None);
    }
    match codec::decode(&encoded) {
        Ok(name) if !name.is_empty() => Ok(Some(ProfileId::new(name))),
        Ok(_) => Ok(None),
        Err(e) => {
            warn!(error = %e, "current profile pointer does not decode");
            Ok(None)
        }
    }
}

/// `ipn-state-profile-<alnum>…` (prefix case-insensitive) → `profile-<alnum>…`.
fn profile_name_from_key(key: &str) -> Option<&str> {
    let prefix_len = STATE_PREFIX.len() + PROFILE_ID_PREFIX.len();
    let head = key.get(..prefix_len)?;
    let (state, profile) = head.split_at(STATE_PREFIX.len());
    if !state.eq_ignore_ascii_case(STATE_PREFIX) || !profile.eq_ignore_ascii_case(PROFILE_ID_PREFIX)
    {
        return None;
    }
    let first = key.get(prefix_len..)?.chars().next()?;
    if !first.is_ascii_alphanumeric() {
        return None;
    }
    key.get(STATE_PREFIX.len()..)
}
