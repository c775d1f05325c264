//! Source fetcher contract and reference routing

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use radar_core::{RawInput, SourceError, SourceRef};

/// Retrieves raw input for a source reference.
///
/// `RateLimited` and `Timeout` are retried by the caller with backoff;
/// `NotFound` fails the item it belongs to.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Collaborator name, used for logging and concurrency caps
    fn name(&self) -> &str;

    /// Collaborator that will serve `source_ref`
    fn collaborator(&self, _source_ref: &SourceRef) -> &str {
        self.name()
    }

    async fn fetch(&self, source_ref: &SourceRef) -> Result<RawInput, SourceError>;
}

/// Shared fetcher handle
pub type SharedFetcher = Arc<dyn SourceFetcher>;

/// Routes URLs to a web fetcher and registry numbers to a registry fetcher.
/// Free text needs no fetching and becomes a manual input directly.
#[derive(Default, Clone)]
pub struct CompositeFetcher {
    web: Option<SharedFetcher>,
    registry: Option<SharedFetcher>,
}

impl CompositeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_web(mut self, fetcher: SharedFetcher) -> Self {
        self.web = Some(fetcher);
        self
    }

    pub fn with_registry(mut self, fetcher: SharedFetcher) -> Self {
        self.registry = Some(fetcher);
        self
    }

    fn route(&self, source_ref: &SourceRef) -> Option<&SharedFetcher> {
        match source_ref {
            SourceRef::Url(_) => self.web.as_ref(),
            SourceRef::Registry(_) => self.registry.as_ref(),
            SourceRef::Text(_) => None,
        }
    }
}

#[async_trait]
impl SourceFetcher for CompositeFetcher {
    fn name(&self) -> &str {
        "composite"
    }

    fn collaborator(&self, source_ref: &SourceRef) -> &str {
        match self.route(source_ref) {
            Some(fetcher) => fetcher.collaborator(source_ref),
            None => "manual",
        }
    }

    async fn fetch(&self, source_ref: &SourceRef) -> Result<RawInput, SourceError> {
        if let SourceRef::Text(text) = source_ref {
            return Ok(RawInput::manual(text));
        }

        let fetcher = self.route(source_ref).ok_or_else(|| {
            SourceError::NotFound(format!("no fetcher configured for {}", source_ref))
        })?;

        debug!("Routing {} to {}", source_ref, fetcher.name());
        fetcher.fetch(source_ref).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_core::SourceType;

    struct FixedFetcher;

    #[async_trait]
    impl SourceFetcher for FixedFetcher {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, source_ref: &SourceRef) -> Result<RawInput, SourceError> {
            match source_ref {
                SourceRef::Registry(id) => Ok(RawInput::registry(id)),
                other => Err(SourceError::NotFound(other.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_text_needs_no_fetcher() {
        let fetcher = CompositeFetcher::new();
        let raw = fetcher
            .fetch(&SourceRef::Text("Klusjesman in Utrecht en omstreken".into()))
            .await
            .unwrap();
        assert_eq!(raw.source_type, SourceType::Manual);
        assert_eq!(fetcher.collaborator(&SourceRef::Text(String::new())), "manual");
    }

    #[tokio::test]
    async fn test_routes_by_reference_kind() {
        let fetcher = CompositeFetcher::new().with_registry(Arc::new(FixedFetcher));

        let raw = fetcher
            .fetch(&SourceRef::Registry("12345678".into()))
            .await
            .unwrap();
        assert_eq!(raw.registry_id.as_deref(), Some("12345678"));
        assert_eq!(
            fetcher.collaborator(&SourceRef::Registry("12345678".into())),
            "fixed"
        );

        let err = fetcher
            .fetch(&SourceRef::Url("https://jansen.nl".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
