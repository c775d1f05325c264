//! Profile enrichment
//!
//! Enrichers look up additional data for a resolved profile. Their output
//! is an ordinary raw input that goes through the normalizer and the merger
//! like any other observation.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use radar_core::{Profile, RawInput, SourceError, SourceRef, SourceType};
use radar_sources::SharedFetcher;

/// Looks up extra data for a profile
#[async_trait]
pub trait ProfileEnricher: Send + Sync {
    /// Collaborator name, used for logging and concurrency caps
    fn name(&self) -> &str;

    /// `None` when there is nothing to look up for this profile
    async fn enrich(&self, profile: &Profile) -> Result<Option<RawInput>, SourceError>;
}

/// Shared enricher handle
pub type SharedEnricher = Arc<dyn ProfileEnricher>;

/// Fetches the registry record for profiles that carry a registry number
/// but have not been merged with registry data yet
pub struct RegistryEnricher {
    fetcher: SharedFetcher,
}

impl RegistryEnricher {
    pub fn new(fetcher: SharedFetcher) -> Self {
        Self { fetcher }
    }

    /// Registry number to look up, if the profile still needs one
    pub fn pending_lookup(profile: &Profile) -> Option<&str> {
        let registry_id = profile.registry_id()?;
        let has_registry_data = profile
            .attributes()
            .values()
            .any(|field| field.source_type == SourceType::Registry);
        (!has_registry_data).then_some(registry_id)
    }
}

#[async_trait]
impl ProfileEnricher for RegistryEnricher {
    fn name(&self) -> &str {
        self.fetcher.name()
    }

    async fn enrich(&self, profile: &Profile) -> Result<Option<RawInput>, SourceError> {
        let Some(registry_id) = Self::pending_lookup(profile) else {
            return Ok(None);
        };

        debug!("Enriching {} from registry {}", profile.profile_id(), registry_id);
        let source_ref = SourceRef::Registry(registry_id.to_string());
        self.fetcher.fetch(&source_ref).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use radar_core::{attr, AttrValue, CandidateRecord, ExtractedAttributes};
    use radar_sources::SourceFetcher;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRegistry {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for CountingRegistry {
        fn name(&self) -> &str {
            "registry"
        }

        async fn fetch(&self, source_ref: &SourceRef) -> Result<RawInput, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match source_ref {
                SourceRef::Registry(id) => Ok(RawInput::registry(id)
                    .with_attribute(attr::NAME, "Jansen Installatie B.V.")),
                other => Err(SourceError::NotFound(other.to_string())),
            }
        }
    }

    fn profile(source_type: SourceType, registry_id: Option<&str>) -> Profile {
        let mut attrs = ExtractedAttributes::new();
        attrs.insert(attr::NAME.into(), AttrValue::from("Jansen"));
        if let Some(id) = registry_id {
            attrs.insert(attr::REGISTRY_ID.into(), AttrValue::from(id));
        }
        let record = CandidateRecord::new("src", source_type, "", attrs, Utc::now());
        Profile::seed(&record)
    }

    #[tokio::test]
    async fn test_enriches_scraped_profile_with_registry_id() {
        let registry = Arc::new(CountingRegistry::default());
        let enricher = RegistryEnricher::new(registry.clone());

        let raw = enricher
            .enrich(&profile(SourceType::Scrape, Some("12345678")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw.registry_id.as_deref(), Some("12345678"));
        assert_eq!(raw.source_type, SourceType::Registry);
        assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skips_when_nothing_to_look_up() {
        let registry = Arc::new(CountingRegistry::default());
        let enricher = RegistryEnricher::new(registry.clone());

        assert!(enricher
            .enrich(&profile(SourceType::Scrape, None))
            .await
            .unwrap()
            .is_none());
        assert!(enricher
            .enrich(&profile(SourceType::Registry, Some("12345678")))
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    }
}
