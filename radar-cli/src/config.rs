//! Configuration file handling
//!
//! One TOML file with a table per component. Missing tables and keys fall
//! back to defaults. API keys never come from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use radar_core::NormalizerConfig;
use radar_engine::{
    ClassifierConfig, LlmConfig, MergePolicy, ResolverConfig, ScoringConfig, WebhookConfig,
};
use radar_runtime::{PipelineConfig, StageConfig};
use radar_sources::{HttpSourceConfig, RegistryConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub pipeline: PipelineConfig,
    pub normalizer: NormalizerConfig,
    pub resolver: ResolverConfig,
    pub merge: MergePolicy,
    pub scoring: ScoringConfig,
    pub classifier: ClassifierConfig,
    pub http: HttpSourceConfig,
    pub registry: RegistryConfig,
    pub llm: LlmConfig,
    pub webhook: WebhookConfig,
}

impl RadarConfig {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn stages(&self) -> StageConfig {
        StageConfig {
            normalizer: self.normalizer.clone(),
            resolver: self.resolver.clone(),
            merge: self.merge.clone(),
            scoring: self.scoring.clone(),
            classifier: self.classifier.clone(),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_engine::LlmProvider;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RadarConfig::parse(
            r#"
[pipeline]
max_workers = 8

[resolver]
name_similarity_threshold = 0.93

[llm]
provider = "anthropic"
"#,
        )
        .unwrap();

        assert_eq!(config.pipeline.max_workers, 8);
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.resolver.name_similarity_threshold, 0.93);
        assert_eq!(config.classifier.established_floor, 7.0);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let text = RadarConfig::default().to_toml().unwrap();
        let parsed = RadarConfig::parse(&text).unwrap();
        assert_eq!(parsed.pipeline.max_workers, 5);
        assert_eq!(parsed.scoring.review_volume_k, 40.0);
    }

    #[test]
    fn test_rejects_bad_types() {
        assert!(RadarConfig::parse("[pipeline]\nmax_workers = \"many\"").is_err());
    }
}
