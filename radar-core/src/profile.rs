//! Profiles: the durable identity a candidate record resolves to
//!
//! A profile is the single point of truth for one real-world entity. It is
//! seeded by the resolver, enriched by the merger and classified by the
//! classifier. Ring and quality score only ever change together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

use crate::{
    attr, normalize_name, AttrValue, CandidateRecord, ExtractedAttributes, FieldProvenance, Ring,
    MAX_QUALITY_SCORE, MIN_QUALITY_SCORE,
};

/// Stable profile identifier, generated on first creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub Uuid);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keys an identity can be looked up by, strongest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKeys {
    /// Normalized registry identifier
    pub registry_id: Option<String>,
    /// Canonical contact channels, e.g. `web:jansen.nl`, `phone:31612345678`
    pub contacts: Vec<String>,
    /// Normalized name and locality, both required
    pub name_locality: Option<(String, String)>,
    /// Source ids of the observations behind the identity
    pub sources: Vec<String>,
}

impl IdentityKeys {
    pub fn from_attributes(attributes: &ExtractedAttributes) -> Self {
        let text = |name: &str| {
            attributes
                .get(name)
                .and_then(AttrValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let registry_id = text(attr::REGISTRY_ID).map(str::to_string);

        let mut contacts = Vec::new();
        if let Some(web) = text(attr::WEBSITE) {
            contacts.push(format!("web:{}", web));
        }
        if let Some(phone) = text(attr::PHONE) {
            contacts.push(format!("phone:{}", phone));
        }
        if let Some(email) = text(attr::EMAIL) {
            contacts.push(format!("email:{}", email.to_lowercase()));
        }

        let name_locality = match (text(attr::NAME), text(attr::LOCALITY)) {
            (Some(name), Some(locality)) => {
                let name = normalize_name(name);
                let locality = normalize_name(locality);
                (!name.is_empty() && !locality.is_empty()).then_some((name, locality))
            }
            _ => None,
        };

        Self {
            registry_id,
            contacts,
            name_locality,
            sources: Vec::new(),
        }
    }

    pub fn from_record(record: &CandidateRecord) -> Self {
        let mut keys = Self::from_attributes(&record.attribute_values());
        keys.sources.push(record.source_id().to_string());
        keys
    }

    /// Flat key strings used by stores to index identities
    pub fn index_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(id) = &self.registry_id {
            keys.push(format!("registry:{}", id));
        }
        keys.extend(self.contacts.iter().cloned());
        if let Some((name, locality)) = &self.name_locality {
            keys.push(format!("name:{}@{}", name, locality));
        }
        keys.extend(self.sources.iter().map(|s| format!("source:{}", s)));
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.registry_id.is_none()
            && self.contacts.is_empty()
            && self.name_locality.is_none()
            && self.sources.is_empty()
    }
}

/// The durable aggregate identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredProfile")]
pub struct Profile {
    profile_id: ProfileId,
    name: Option<String>,
    location: Option<String>,
    specializations: BTreeSet<String>,
    attributes: BTreeMap<String, FieldProvenance>,
    /// Insertion order is merge order
    merged_source_ids: Vec<String>,
    source_fingerprints: BTreeMap<String, String>,
    ring: Option<Ring>,
    quality_score: Option<f64>,
    confidence: Option<f64>,
    rationale: Option<String>,
    outreach_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Serialized form of a [`Profile`], checked before it becomes one
#[derive(Deserialize)]
struct StoredProfile {
    profile_id: ProfileId,
    name: Option<String>,
    location: Option<String>,
    #[serde(default)]
    specializations: BTreeSet<String>,
    #[serde(default)]
    attributes: BTreeMap<String, FieldProvenance>,
    merged_source_ids: Vec<String>,
    #[serde(default)]
    source_fingerprints: BTreeMap<String, String>,
    ring: Option<Ring>,
    quality_score: Option<f64>,
    confidence: Option<f64>,
    rationale: Option<String>,
    #[serde(default)]
    outreach_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredProfile> for Profile {
    type Error = String;

    fn try_from(stored: StoredProfile) -> Result<Self, Self::Error> {
        if stored.ring.is_some() != stored.quality_score.is_some() {
            return Err(format!(
                "profile {}: ring and quality score must be set together",
                stored.profile_id
            ));
        }
        if let Some(score) = stored.quality_score {
            if !(MIN_QUALITY_SCORE..=MAX_QUALITY_SCORE).contains(&score) {
                return Err(format!(
                    "profile {}: quality score {} out of range",
                    stored.profile_id, score
                ));
            }
        }
        if let Some(confidence) = stored.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(format!(
                    "profile {}: confidence {} out of range",
                    stored.profile_id, confidence
                ));
            }
        }
        if stored.merged_source_ids.is_empty() {
            return Err(format!("profile {}: no merged sources", stored.profile_id));
        }
        let unique: BTreeSet<&String> = stored.merged_source_ids.iter().collect();
        if unique.len() != stored.merged_source_ids.len() {
            return Err(format!("profile {}: duplicate merged source", stored.profile_id));
        }

        Ok(Self {
            profile_id: stored.profile_id,
            name: stored.name,
            location: stored.location,
            specializations: stored.specializations,
            attributes: stored.attributes,
            merged_source_ids: stored.merged_source_ids,
            source_fingerprints: stored.source_fingerprints,
            ring: stored.ring,
            quality_score: stored.quality_score,
            confidence: stored.confidence,
            rationale: stored.rationale,
            outreach_sent: stored.outreach_sent,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }
}

impl Profile {
    /// Seed a new profile from the first unmatched record
    pub fn seed(record: &CandidateRecord) -> Self {
        let now = Utc::now();
        let mut profile = Self {
            profile_id: ProfileId::new(),
            name: None,
            location: None,
            specializations: BTreeSet::new(),
            attributes: BTreeMap::new(),
            merged_source_ids: Vec::new(),
            source_fingerprints: BTreeMap::new(),
            ring: None,
            quality_score: None,
            confidence: None,
            rationale: None,
            outreach_sent: false,
            created_at: now,
            updated_at: now,
        };

        for (name, field) in record.extracted_attributes() {
            profile.set_attribute(name, field.clone());
        }
        if let Some(specs) = record.attribute(attr::SPECIALIZATIONS) {
            profile.add_specializations(specs.as_list());
        }
        profile.record_source(record.source_id(), record.fingerprint());
        profile.updated_at = now;
        profile
    }

    pub fn profile_id(&self) -> ProfileId {
        self.profile_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn specializations(&self) -> &BTreeSet<String> {
        &self.specializations
    }

    pub fn attributes(&self) -> &BTreeMap<String, FieldProvenance> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&FieldProvenance> {
        self.attributes.get(name)
    }

    /// Plain attribute values, without provenance
    pub fn attribute_values(&self) -> ExtractedAttributes {
        self.attributes
            .iter()
            .map(|(k, f)| (k.clone(), f.value.clone()))
            .collect()
    }

    pub fn merged_source_ids(&self) -> &[String] {
        &self.merged_source_ids
    }

    pub fn ring(&self) -> Option<Ring> {
        self.ring
    }

    pub fn quality_score(&self) -> Option<f64> {
        self.quality_score
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    pub fn outreach_sent(&self) -> bool {
        self.outreach_sent
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn identity_keys(&self) -> IdentityKeys {
        let mut keys = IdentityKeys::from_attributes(&self.attribute_values());
        keys.sources = self.merged_source_ids.clone();
        keys
    }

    pub fn registry_id(&self) -> Option<&str> {
        self.attribute(attr::REGISTRY_ID)
            .and_then(|f| f.value.as_str())
    }

    /// Whether this exact observation (source and content) was merged already
    pub fn has_merged(&self, source_id: &str, fingerprint: &str) -> bool {
        self.source_fingerprints
            .get(source_id)
            .is_some_and(|fp| fp == fingerprint)
    }

    /// Store an attribute. Returns whether the stored value changed.
    pub fn set_attribute(&mut self, name: &str, field: FieldProvenance) -> bool {
        if let Some(current) = self.attributes.get(name) {
            if *current == field {
                return false;
            }
        }
        match name {
            attr::NAME => self.name = field.value.as_str().map(str::to_string),
            attr::LOCALITY => self.location = field.value.as_str().map(str::to_string),
            _ => {}
        }
        self.attributes.insert(name.to_string(), field);
        self.touch();
        true
    }

    /// Union specializations in. Returns whether the set grew.
    pub fn add_specializations<I, S>(&mut self, items: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut grew = false;
        for item in items {
            let item = item.as_ref().trim().to_lowercase();
            if !item.is_empty() && self.specializations.insert(item) {
                grew = true;
            }
        }
        if grew {
            self.touch();
        }
        grew
    }

    /// Append a source id if absent and remember its content fingerprint.
    /// Returns whether anything changed.
    pub fn record_source(&mut self, source_id: &str, fingerprint: &str) -> bool {
        let mut changed = false;
        if !self.merged_source_ids.iter().any(|s| s == source_id) {
            self.merged_source_ids.push(source_id.to_string());
            changed = true;
        }
        if self.source_fingerprints.get(source_id).map(String::as_str) != Some(fingerprint) {
            self.source_fingerprints
                .insert(source_id.to_string(), fingerprint.to_string());
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Set ring and score together; the score is clamped to 0..=10
    pub fn set_classification(
        &mut self,
        ring: Ring,
        quality_score: f64,
        confidence: f64,
        rationale: impl Into<String>,
    ) {
        self.ring = Some(ring);
        self.quality_score = Some(quality_score.clamp(MIN_QUALITY_SCORE, MAX_QUALITY_SCORE));
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self.rationale = Some(rationale.into());
        self.touch();
    }

    /// Clear ring and score together
    pub fn clear_classification(&mut self) {
        if self.ring.is_none() && self.quality_score.is_none() {
            return;
        }
        self.ring = None;
        self.quality_score = None;
        self.confidence = None;
        self.rationale = None;
        self.touch();
    }

    /// Outreach is monotonic: once sent it stays sent
    pub fn mark_outreach_sent(&mut self) {
        if !self.outreach_sent {
            self.outreach_sent = true;
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Aggregate statistics over a set of profiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub total: usize,
    pub by_ring: BTreeMap<u8, usize>,
    pub unclassified: usize,
    pub average_quality_score: Option<f64>,
    pub outreach_sent: usize,
}

impl ProfileStats {
    pub fn from_profiles<'a, I>(profiles: I) -> Self
    where
        I: IntoIterator<Item = &'a Profile>,
    {
        let mut stats = ProfileStats::default();
        let mut score_sum = 0.0;
        let mut scored = 0usize;

        for profile in profiles {
            stats.total += 1;
            match profile.ring() {
                Some(ring) => *stats.by_ring.entry(ring.number()).or_insert(0) += 1,
                None => stats.unclassified += 1,
            }
            if let Some(score) = profile.quality_score() {
                score_sum += score;
                scored += 1;
            }
            if profile.outreach_sent() {
                stats.outreach_sent += 1;
            }
        }

        if scored > 0 {
            stats.average_quality_score = Some((score_sum / scored as f64 * 10.0).round() / 10.0);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceType;

    fn record(source_id: &str, pairs: &[(&str, AttrValue)]) -> CandidateRecord {
        let attrs = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        CandidateRecord::new(source_id, SourceType::Scrape, "", attrs, Utc::now())
    }

    #[test]
    fn test_seed_from_record() {
        let rec = record(
            "jansen.nl",
            &[
                (attr::NAME, "Jansen Loodgieters".into()),
                (attr::LOCALITY, "Utrecht".into()),
                (
                    attr::SPECIALIZATIONS,
                    AttrValue::List(vec!["Loodgieter".into(), "CV-installateur".into()]),
                ),
            ],
        );
        let profile = Profile::seed(&rec);

        assert_eq!(profile.name(), Some("Jansen Loodgieters"));
        assert_eq!(profile.location(), Some("Utrecht"));
        assert!(profile.specializations().contains("loodgieter"));
        assert_eq!(profile.merged_source_ids(), ["jansen.nl".to_string()]);
        assert!(profile.has_merged("jansen.nl", rec.fingerprint()));
        assert!(profile.ring().is_none());
        assert!(profile.quality_score().is_none());
        assert!(!profile.outreach_sent());
    }

    #[test]
    fn test_ring_and_score_move_together() {
        let mut profile = Profile::seed(&record("a", &[]));
        profile.set_classification(Ring::Freelancer, 12.0, 1.0, "zzp");
        assert_eq!(profile.ring(), Some(Ring::Freelancer));
        assert_eq!(profile.quality_score(), Some(10.0));

        profile.clear_classification();
        assert!(profile.ring().is_none());
        assert!(profile.quality_score().is_none());
    }

    #[test]
    fn test_deserialize_checks_ring_and_score() {
        let mut profile = Profile::seed(&record("jansen.nl", &[(attr::NAME, "Jansen".into())]));
        profile.set_classification(Ring::Established, 7.5, 0.8, "registered");
        let json = serde_json::to_value(&profile).unwrap();
        let back: Profile = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, profile);

        let mut half = json.clone();
        half["quality_score"] = serde_json::Value::Null;
        let err = serde_json::from_value::<Profile>(half).unwrap_err();
        assert!(err.to_string().contains("set together"));

        let mut wild = json.clone();
        wild["quality_score"] = 42.0.into();
        assert!(serde_json::from_value::<Profile>(wild).is_err());

        let mut twice = json;
        twice["merged_source_ids"] = serde_json::json!(["jansen.nl", "jansen.nl"]);
        assert!(serde_json::from_value::<Profile>(twice).is_err());
    }

    #[test]
    fn test_record_source_is_idempotent() {
        let mut profile = Profile::seed(&record("a", &[]));
        let before = profile.updated_at();
        assert!(!profile.record_source("a", record("a", &[]).fingerprint()));
        assert_eq!(profile.updated_at(), before);
        assert!(profile.record_source("b", "ffff"));
        assert_eq!(profile.merged_source_ids(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_identity_keys() {
        let rec = record(
            "x",
            &[
                (attr::REGISTRY_ID, "12345678".into()),
                (attr::WEBSITE, "jansen.nl".into()),
                (attr::NAME, "Jansén  Loodgieters".into()),
                (attr::LOCALITY, "Utrecht".into()),
            ],
        );
        let keys = IdentityKeys::from_record(&rec);
        assert_eq!(keys.registry_id.as_deref(), Some("12345678"));
        assert_eq!(
            keys.index_keys(),
            vec![
                "registry:12345678".to_string(),
                "web:jansen.nl".to_string(),
                "name:jansen loodgieters@utrecht".to_string(),
                "source:x".to_string(),
            ]
        );

        let bare = IdentityKeys::from_record(&record("text-only", &[]));
        assert!(!bare.is_empty());
        assert_eq!(bare.index_keys(), vec!["source:text-only".to_string()]);
    }

    #[test]
    fn test_profile_stats() {
        let mut a = Profile::seed(&record("a", &[]));
        a.set_classification(Ring::Established, 8.0, 1.0, "");
        a.mark_outreach_sent();
        let mut b = Profile::seed(&record("b", &[]));
        b.set_classification(Ring::Starter, 4.5, 0.6, "");
        let c = Profile::seed(&record("c", &[]));

        let stats = ProfileStats::from_profiles([&a, &b, &c]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_ring.get(&1), Some(&1));
        assert_eq!(stats.unclassified, 1);
        assert_eq!(stats.outreach_sent, 1);
        assert_eq!(stats.average_quality_score, Some(6.3));
    }
}
