//! Enrichment merge
//!
//! Layers a candidate record's attributes onto a profile. Stable fields
//! follow source trust (registry > scrape > manual); volatile fields take
//! the most recent observation. Merging the same record twice changes
//! nothing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use radar_core::{attr, CandidateRecord, Profile, VOLATILE_ATTRIBUTES};

/// Merge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// Attributes that follow recency instead of trust
    pub volatile_fields: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            volatile_fields: VOLATILE_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MergePolicy {
    pub fn is_volatile(&self, name: &str) -> bool {
        self.volatile_fields.iter().any(|f| f == name)
    }
}

/// Updated profile plus what changed
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub profile: Profile,
    /// Attributes whose stored value or provenance changed
    pub changed_fields: Vec<String>,
    /// Whether the record's source id was new to the profile
    pub source_added: bool,
}

impl MergeOutcome {
    pub fn is_noop(&self) -> bool {
        self.changed_fields.is_empty() && !self.source_added
    }
}

/// Applies trust ordering when merging records into profiles
#[derive(Debug, Clone, Default)]
pub struct EnrichmentMerger {
    policy: MergePolicy,
}

impl EnrichmentMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    /// Merge `record` into a copy of `profile`. Previously merged data is
    /// never lost: a field is only replaced by a value that wins under the
    /// policy.
    pub fn merge(&self, profile: &Profile, record: &CandidateRecord) -> MergeOutcome {
        let mut updated = profile.clone();
        let mut changed_fields = Vec::new();

        for (name, field) in record.extracted_attributes() {
            let mut incoming = field.clone();
            incoming.volatile = self.policy.is_volatile(name);

            let replace = match updated.attribute(name) {
                None => true,
                Some(current) if current.value == incoming.value => {
                    // same value: refresh provenance only if strictly better
                    incoming.source_type.trust() > current.source_type.trust()
                        || (incoming.volatile && incoming.observed_at > current.observed_at)
                }
                Some(current) => current.yields_to(&incoming),
            };

            if replace && updated.set_attribute(name, incoming) {
                changed_fields.push(name.clone());
            }
        }

        if let Some(specs) = record.attribute(attr::SPECIALIZATIONS) {
            if updated.add_specializations(specs.as_list()) {
                changed_fields.push(attr::SPECIALIZATIONS.to_string());
            }
        }

        let source_added = !updated
            .merged_source_ids()
            .iter()
            .any(|s| s == record.source_id());
        updated.record_source(record.source_id(), record.fingerprint());

        debug!(
            "Merged {} into {}: {} fields changed",
            record.source_id(),
            updated.profile_id(),
            changed_fields.len()
        );

        MergeOutcome {
            profile: updated,
            changed_fields,
            source_added,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use radar_core::{AttrValue, ExtractedAttributes, SourceType};

    fn record(
        source_id: &str,
        source_type: SourceType,
        at: DateTime<Utc>,
        pairs: &[(&str, AttrValue)],
    ) -> CandidateRecord {
        let attrs: ExtractedAttributes = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        CandidateRecord::new(source_id, source_type, "", attrs, at)
    }

    #[test]
    fn test_volatile_newer_lower_trust_overwrites() {
        let merger = EnrichmentMerger::default();
        let then = Utc::now() - Duration::days(200);
        let registry = record(
            "registry:12345678",
            SourceType::Registry,
            then,
            &[
                (attr::EMPLOYEE_COUNT, 4.0.into()),
                (attr::NAME, "Jansen Installatie B.V.".into()),
            ],
        );
        let profile = Profile::seed(&registry);

        let scrape = record(
            "web:jansen.nl",
            SourceType::Scrape,
            Utc::now(),
            &[
                (attr::EMPLOYEE_COUNT, 9.0.into()),
                (attr::NAME, "Jansen".into()),
            ],
        );
        let merged = merger.merge(&profile, &scrape);

        let employees = merged.profile.attribute(attr::EMPLOYEE_COUNT).unwrap();
        assert_eq!(employees.value, AttrValue::Number(9.0));
        assert_eq!(employees.source_type, SourceType::Scrape);

        let name = merged.profile.attribute(attr::NAME).unwrap();
        assert_eq!(name.value, AttrValue::from("Jansen Installatie B.V."));
        assert_eq!(merged.profile.name(), Some("Jansen Installatie B.V."));
        assert!(merged.source_added);
        assert_eq!(merged.changed_fields, vec![attr::EMPLOYEE_COUNT.to_string()]);
    }

    #[test]
    fn test_higher_trust_replaces_stable_field() {
        let merger = EnrichmentMerger::default();
        let manual = record(
            "manual:1",
            SourceType::Manual,
            Utc::now(),
            &[(attr::LOCALITY, "Utrect".into())],
        );
        let profile = Profile::seed(&manual);

        let registry = record(
            "registry:12345678",
            SourceType::Registry,
            Utc::now() - Duration::days(10),
            &[(attr::LOCALITY, "Utrecht".into())],
        );
        let merged = merger.merge(&profile, &registry);
        assert_eq!(merged.profile.location(), Some("Utrecht"));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let merger = EnrichmentMerger::default();
        let rec = record(
            "web:jansen.nl",
            SourceType::Scrape,
            Utc::now(),
            &[
                (attr::RATING, 4.5.into()),
                (
                    attr::SPECIALIZATIONS,
                    AttrValue::List(vec!["loodgieter".into()]),
                ),
            ],
        );
        let profile = Profile::seed(&rec);

        let once = merger.merge(&profile, &rec);
        assert!(once.is_noop());
        let twice = merger.merge(&once.profile, &rec);
        assert!(twice.is_noop());
        assert_eq!(twice.profile, profile);
        assert_eq!(twice.profile.merged_source_ids().len(), 1);
    }

    #[test]
    fn test_specializations_union() {
        let merger = EnrichmentMerger::default();
        let a = record(
            "a",
            SourceType::Scrape,
            Utc::now(),
            &[(attr::SPECIALIZATIONS, AttrValue::List(vec!["loodgieter".into()]))],
        );
        let b = record(
            "b",
            SourceType::Manual,
            Utc::now(),
            &[(attr::SPECIALIZATIONS, AttrValue::List(vec!["Dakdekker".into()]))],
        );
        let merged = merger.merge(&Profile::seed(&a), &b);
        assert_eq!(merged.profile.specializations().len(), 2);
        assert!(merged.profile.specializations().contains("dakdekker"));
    }
}
