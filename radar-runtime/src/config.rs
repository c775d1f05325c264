//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use radar_core::NormalizerConfig;
use radar_engine::{ClassifierConfig, MergePolicy, ResolverConfig, ScoringConfig};

use crate::RetryPolicy;

/// Settings of the decision stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub normalizer: NormalizerConfig,
    pub resolver: ResolverConfig,
    pub merge: MergePolicy,
    pub scoring: ScoringConfig,
    pub classifier: ClassifierConfig,
}

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Items processed concurrently
    pub max_workers: usize,
    /// Attempts per collaborator call, including the first
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Overall budget for one item; the item fails with `timeout` after it
    pub item_timeout_secs: u64,
    /// Simultaneous calls to any single collaborator
    pub collaborator_concurrency: usize,
    /// Per-collaborator overrides, keyed by collaborator name
    pub collaborator_limits: BTreeMap<String, usize>,
    /// Send outreach for newly classified profiles
    pub dispatch_outreach: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
            item_timeout_secs: 120,
            collaborator_concurrency: 5,
            collaborator_limits: BTreeMap::new(),
            dispatch_outreach: true,
        }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        }
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    /// Concurrency cap for one collaborator, never below 1
    pub fn limit_for(&self, collaborator: &str) -> usize {
        self.collaborator_limits
            .get(collaborator)
            .copied()
            .unwrap_or(self.collaborator_concurrency)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_limits() {
        let mut config = PipelineConfig::default();
        config.collaborator_limits.insert("registry".into(), 2);
        config.collaborator_limits.insert("webhook".into(), 0);

        assert_eq!(config.limit_for("registry"), 2);
        assert_eq!(config.limit_for("web"), 5);
        assert_eq!(config.limit_for("webhook"), 1);
    }

    #[test]
    fn test_retry_policy_bounds() {
        let config = PipelineConfig {
            max_attempts: 0,
            backoff_base_ms: 200,
            backoff_max_ms: 50,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_delay, Duration::from_millis(200));
    }
}
