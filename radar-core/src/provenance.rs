//! Source types, trust ordering and provenance-tagged fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{is_volatile, AttrValue};

/// Where an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Scraped public web page
    Scrape,
    /// Company registry record
    Registry,
    /// Manually entered free text
    Manual,
}

impl SourceType {
    /// Trust rank: registry > scrape > manual free text
    pub fn trust(&self) -> u8 {
        match self {
            SourceType::Registry => 3,
            SourceType::Scrape => 2,
            SourceType::Manual => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Scrape => "scrape",
            SourceType::Registry => "registry",
            SourceType::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute value together with where and when it was observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub value: AttrValue,
    pub source_type: SourceType,
    /// Source key of the record that contributed the value
    pub source_id: String,
    pub observed_at: DateTime<Utc>,
    /// Volatile fields follow recency instead of trust
    pub volatile: bool,
}

impl FieldProvenance {
    pub fn new(
        name: &str,
        value: AttrValue,
        source_type: SourceType,
        source_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            value,
            source_type,
            source_id: source_id.to_string(),
            observed_at,
            volatile: is_volatile(name),
        }
    }

    /// Whether `incoming` may replace this value.
    ///
    /// Stable fields follow trust: equal-or-higher trust wins. Volatile
    /// fields (as flagged on `incoming`) follow recency regardless of trust;
    /// an observation at the same instant falls back to trust.
    pub fn yields_to(&self, incoming: &FieldProvenance) -> bool {
        let trusted = incoming.source_type.trust() >= self.source_type.trust();
        if incoming.volatile {
            return incoming.observed_at > self.observed_at
                || (incoming.observed_at == self.observed_at && trusted);
        }
        trusted
    }
}
