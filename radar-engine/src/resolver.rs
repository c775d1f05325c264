//! Entity resolution
//!
//! Decides whether a candidate record belongs to an existing profile.
//! Matching runs in priority order and the first hit wins:
//! 1. Exact registry number
//! 2. Exact canonical contact channel (website, phone, email)
//! 3. Name similarity above a threshold within the same locality
//!
//! A record seen before resolves by its source id ahead of the fuzzy step.
//! Name similarity alone never matches. Records with no match seed a new
//! profile through the lookup's atomic insert; matched records claim their
//! keys on the profile they resolved to. Either way concurrent records for
//! one identity end up on a single profile.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use radar_core::{normalize_name, CandidateRecord, IdentityKeys, Profile, ProfileId, StoreError};

/// Outcome of an atomic insert-by-identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(ProfileId),
    /// Another profile already holds one of the identity keys
    Existing(ProfileId),
}

/// Outcome of claiming a record's identity keys for a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The registry key already belongs to another profile
    HeldBy(ProfileId),
}

/// Upper bound on re-resolving after losing a claim
const MAX_CLAIM_ROUNDS: usize = 3;

/// Profile lookups the resolver needs, plus the atomic insert and claim
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn find_by_registry_id(&self, registry_id: &str) -> Result<Option<Profile>, StoreError>;

    /// `contact_key` as produced by [`IdentityKeys`], e.g. `web:jansen.nl`
    async fn find_by_contact(&self, contact_key: &str) -> Result<Option<Profile>, StoreError>;

    /// Profile that already merged an observation from `source_id`
    async fn find_by_source(&self, source_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Profiles whose normalized locality equals `locality`
    async fn find_in_locality(&self, locality: &str) -> Result<Vec<Profile>, StoreError>;

    /// Insert unless a profile already holds one of its identity keys
    async fn insert_if_absent(&self, profile: Profile) -> Result<InsertOutcome, StoreError>;

    /// Atomically attach `keys` to `profile_id`. Fails with `HeldBy` when
    /// the registry key is held by another profile; weaker keys keep their
    /// first holder.
    async fn claim_keys(
        &self,
        profile_id: ProfileId,
        keys: &IdentityKeys,
    ) -> Result<ClaimOutcome, StoreError>;
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum Jaro-Winkler similarity of normalized names
    pub name_similarity_threshold: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            name_similarity_threshold: 0.90,
        }
    }
}

/// How a record was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    RegistryId,
    Contact,
    /// The same source was merged before
    Source,
    FuzzyName,
    /// No match; a new profile was created
    Created,
    /// No match, but a concurrent record created the identity first
    Raced,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchKind::RegistryId => "registry_id",
            MatchKind::Contact => "contact",
            MatchKind::Source => "source",
            MatchKind::FuzzyName => "fuzzy_name",
            MatchKind::Created => "created",
            MatchKind::Raced => "raced",
        };
        f.write_str(s)
    }
}

/// Result of resolving one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub profile_id: ProfileId,
    pub is_new: bool,
    pub matched_by: MatchKind,
}

/// Matches records to profiles
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Resolve a record to a profile, creating one when nothing matches.
    /// Attributes are not merged here.
    pub async fn resolve(
        &self,
        record: &CandidateRecord,
        lookup: &dyn ProfileLookup,
    ) -> Result<Resolution, StoreError> {
        let keys = IdentityKeys::from_record(record);

        for _ in 0..MAX_CLAIM_ROUNDS {
            let resolution = match self.find_match(&keys, lookup).await? {
                Some(resolution) => resolution,
                None => match lookup.insert_if_absent(Profile::seed(record)).await? {
                    InsertOutcome::Inserted(profile_id) => {
                        debug!("Created profile {} from {}", profile_id, record.source_id());
                        return Ok(Resolution {
                            profile_id,
                            is_new: true,
                            matched_by: MatchKind::Created,
                        });
                    }
                    InsertOutcome::Existing(profile_id) => {
                        debug!(
                            "Identity for {} created concurrently; using profile {}",
                            record.source_id(),
                            profile_id
                        );
                        Resolution {
                            profile_id,
                            is_new: false,
                            matched_by: MatchKind::Raced,
                        }
                    }
                },
            };

            match lookup.claim_keys(resolution.profile_id, &keys).await? {
                ClaimOutcome::Claimed => return Ok(resolution),
                ClaimOutcome::HeldBy(holder) => debug!(
                    "Registry key of {} went to profile {}; resolving again",
                    record.source_id(),
                    holder
                ),
            }
        }

        Err(StoreError::Conflict(format!(
            "could not settle identity of {}",
            record.source_id()
        )))
    }

    async fn find_match(
        &self,
        keys: &IdentityKeys,
        lookup: &dyn ProfileLookup,
    ) -> Result<Option<Resolution>, StoreError> {
        let matched = |profile: &Profile, matched_by| Resolution {
            profile_id: profile.profile_id(),
            is_new: false,
            matched_by,
        };

        if let Some(registry_id) = &keys.registry_id {
            if let Some(profile) = lookup.find_by_registry_id(registry_id).await? {
                return Ok(Some(matched(&profile, MatchKind::RegistryId)));
            }
        }

        for contact in &keys.contacts {
            if let Some(profile) = lookup.find_by_contact(contact).await? {
                if conflicting_registry(keys, &profile) {
                    debug!("Contact {} shared by a different registered entity", contact);
                    continue;
                }
                return Ok(Some(matched(&profile, MatchKind::Contact)));
            }
        }

        for source_id in &keys.sources {
            if let Some(profile) = lookup.find_by_source(source_id).await? {
                if conflicting_registry(keys, &profile) {
                    continue;
                }
                return Ok(Some(matched(&profile, MatchKind::Source)));
            }
        }

        let Some((name, locality)) = &keys.name_locality else {
            return Ok(None);
        };

        let mut best: Option<(f64, Profile)> = None;
        for candidate in lookup.find_in_locality(locality).await? {
            if conflicting_registry(keys, &candidate) {
                continue;
            }
            let Some(candidate_name) = candidate.name().map(normalize_name) else {
                continue;
            };
            let similarity = strsim::jaro_winkler(name, &candidate_name);
            if similarity < self.config.name_similarity_threshold {
                continue;
            }
            if best.as_ref().map_or(true, |(s, _)| similarity > *s) {
                best = Some((similarity, candidate));
            }
        }

        Ok(best.map(|(similarity, profile)| {
            debug!(
                "Fuzzy name match {:.3} on profile {}",
                similarity,
                profile.profile_id()
            );
            matched(&profile, MatchKind::FuzzyName)
        }))
    }
}

/// Both sides carry a registry number and they differ
pub fn conflicting_registry(keys: &IdentityKeys, profile: &Profile) -> bool {
    match (&keys.registry_id, profile.registry_id()) {
        (Some(ours), Some(theirs)) => ours != theirs,
        _ => false,
    }
}
