//! In-memory profile store
//!
//! Profiles live in a concurrent map. Identity keys (registry number,
//! contact channels, name and locality, source ids) and localities are
//! indexed under one mutex, so checking for an existing identity and
//! inserting a new profile or claiming keys for a matched one happen
//! atomically.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use radar_core::{normalize_name, IdentityKeys, Profile, ProfileId, ProfileStats, Ring, StoreError};
use radar_engine::{conflicting_registry, ClaimOutcome, InsertOutcome, ProfileLookup};

#[derive(Debug, Default)]
struct IdentityIndex {
    /// Identity key -> first profile that claimed it
    keys: HashMap<String, ProfileId>,
    /// Normalized locality -> profiles located there
    localities: HashMap<String, HashSet<ProfileId>>,
}

impl IdentityIndex {
    fn add(&mut self, profile: &Profile) {
        let id = profile.profile_id();
        for key in profile.identity_keys().index_keys() {
            self.keys.entry(key).or_insert(id);
        }
        if let Some(locality) = profile.location().map(normalize_name) {
            self.localities.entry(locality).or_default().insert(id);
        }
    }

    fn remove(&mut self, profile: &Profile) {
        let id = profile.profile_id();
        for key in profile.identity_keys().index_keys() {
            if self.keys.get(&key) == Some(&id) {
                self.keys.remove(&key);
            }
        }
        if let Some(locality) = profile.location().map(normalize_name) {
            if let Some(ids) = self.localities.get_mut(&locality) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.localities.remove(&locality);
                }
            }
        }
    }
}

/// Exclusive access to one profile; the lock entry is dropped with the
/// last guard
pub struct ProfileGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    store: &'a InMemoryProfileStore,
    profile_id: ProfileId,
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.store
            .locks
            .remove_if(&self.profile_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Shared store of profiles, the only mutable state shared by items
#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<ProfileId, Profile>,
    index: Mutex<IdentityIndex>,
    locks: DashMap<ProfileId, Arc<tokio::sync::Mutex<()>>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, profile_id: ProfileId) -> Option<Profile> {
        self.profiles.get(&profile_id).map(|p| p.clone())
    }

    /// Exclusive access to one profile for a read-modify-write cycle
    pub async fn lock_profile(&self, profile_id: ProfileId) -> ProfileGuard<'_> {
        let lock = self
            .locks
            .entry(profile_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        ProfileGuard {
            guard: Some(lock.lock_owned().await),
            store: self,
            profile_id,
        }
    }

    /// Profiles with a live lock entry
    pub fn locked_count(&self) -> usize {
        self.locks.len()
    }

    /// Replace a stored profile and re-index its identity keys.
    /// Callers hold the profile lock.
    pub fn update(&self, profile: Profile) -> Result<(), StoreError> {
        let id = profile.profile_id();
        let mut index = self.index.lock();
        let previous = self
            .profiles
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::UnknownProfile(id.to_string()))?;

        index.remove(&previous);
        index.add(&profile);
        self.profiles.insert(id, profile);
        Ok(())
    }

    fn find_by_key(&self, key: &str) -> Option<Profile> {
        let id = self.index.lock().keys.get(key).copied()?;
        self.get(id)
    }

    /// All profiles, oldest first
    pub fn list(&self) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self.profiles.iter().map(|p| p.clone()).collect();
        profiles.sort_by_key(|p| p.created_at());
        profiles
    }

    /// Profiles in one ring, best quality score first
    pub fn filter_by_ring(&self, ring: Ring) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self
            .profiles
            .iter()
            .filter(|p| p.ring() == Some(ring))
            .map(|p| p.clone())
            .collect();
        profiles.sort_by(|a, b| {
            let score = |p: &Profile| p.quality_score().unwrap_or_default();
            score(b).total_cmp(&score(a))
        });
        profiles
    }

    pub fn stats(&self) -> ProfileStats {
        ProfileStats::from_profiles(&self.list())
    }
}

#[async_trait]
impl ProfileLookup for InMemoryProfileStore {
    async fn find_by_registry_id(&self, registry_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.find_by_key(&format!("registry:{}", registry_id)))
    }

    async fn find_by_contact(&self, contact_key: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.find_by_key(contact_key))
    }

    async fn find_by_source(&self, source_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self.find_by_key(&format!("source:{}", source_id)))
    }

    async fn find_in_locality(&self, locality: &str) -> Result<Vec<Profile>, StoreError> {
        let ids: Vec<ProfileId> = self
            .index
            .lock()
            .localities
            .get(locality)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        Ok(ids.into_iter().filter_map(|id| self.get(id)).collect())
    }

    async fn insert_if_absent(&self, profile: Profile) -> Result<InsertOutcome, StoreError> {
        let identity: IdentityKeys = profile.identity_keys();
        let mut index = self.index.lock();

        for key in identity.index_keys() {
            let Some(existing_id) = index.keys.get(&key).copied() else {
                continue;
            };
            let Some(existing) = self.get(existing_id) else {
                continue;
            };
            if !conflicting_registry(&identity, &existing) {
                debug!("Identity key {} already held by {}", key, existing_id);
                return Ok(InsertOutcome::Existing(existing_id));
            }
        }

        let id = profile.profile_id();
        index.add(&profile);
        self.profiles.insert(id, profile);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn claim_keys(
        &self,
        profile_id: ProfileId,
        keys: &IdentityKeys,
    ) -> Result<ClaimOutcome, StoreError> {
        let mut index = self.index.lock();
        if !self.profiles.contains_key(&profile_id) {
            return Err(StoreError::UnknownProfile(profile_id.to_string()));
        }

        if let Some(registry_id) = &keys.registry_id {
            let key = format!("registry:{}", registry_id);
            match index.keys.get(&key).copied() {
                Some(holder) if holder != profile_id && self.profiles.contains_key(&holder) => {
                    return Ok(ClaimOutcome::HeldBy(holder));
                }
                _ => {
                    index.keys.insert(key, profile_id);
                }
            }
        }
        for key in keys.index_keys() {
            index.keys.entry(key).or_insert(profile_id);
        }
        Ok(ClaimOutcome::Claimed)
    }
}
