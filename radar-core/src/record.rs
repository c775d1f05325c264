//! Raw inputs and candidate records
//!
//! A [`RawInput`] is what a source fetcher hands back. The normalizer turns
//! it into a [`CandidateRecord`]: one immutable observation from one source
//! at one point in time, with every attribute tagged by its provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{attr, AttrValue, ExtractedAttributes, FieldProvenance, SourceType};

/// Reference to something a source fetcher can retrieve
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceRef {
    /// Public web page
    Url(String),
    /// Company registry number
    Registry(String),
    /// Free text entered by hand
    Text(String),
}

impl FromStr for SourceRef {
    type Err = String;

    /// Accepts `https://...`, `url:<u>`, `registry:<id>` and `text:<free text>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty source reference".to_string());
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Ok(SourceRef::Url(s.to_string()));
        }
        match s.split_once(':') {
            Some(("url", rest)) => Ok(SourceRef::Url(rest.trim().to_string())),
            Some(("registry", rest)) => Ok(SourceRef::Registry(rest.trim().to_string())),
            Some(("text", rest)) => Ok(SourceRef::Text(rest.trim().to_string())),
            _ => Err(format!("unrecognized source reference: {}", s)),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Url(u) => write!(f, "url:{}", u),
            SourceRef::Registry(id) => write!(f, "registry:{}", id),
            SourceRef::Text(t) => {
                let preview: String = t.chars().take(40).collect();
                write!(f, "text:{}", preview)
            }
        }
    }
}

/// Heterogeneous input as returned by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    pub source_type: SourceType,
    pub url: Option<String>,
    pub registry_id: Option<String>,
    pub text: Option<String>,
    /// Structured attributes the source already knows (registry fields)
    pub attributes: ExtractedAttributes,
    pub observed_at: DateTime<Utc>,
}

impl RawInput {
    fn empty(source_type: SourceType) -> Self {
        Self {
            source_type,
            url: None,
            registry_id: None,
            text: None,
            attributes: BTreeMap::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn manual(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::empty(SourceType::Manual)
        }
    }

    pub fn scraped(url: &str, text: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            text: Some(text.to_string()),
            ..Self::empty(SourceType::Scrape)
        }
    }

    pub fn registry(registry_id: &str) -> Self {
        Self {
            registry_id: Some(registry_id.to_string()),
            ..Self::empty(SourceType::Registry)
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }
}

/// One observation from one source, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    source_id: String,
    source_type: SourceType,
    raw_text: String,
    extracted_attributes: BTreeMap<String, FieldProvenance>,
    observed_at: DateTime<Utc>,
    fingerprint: String,
}

impl CandidateRecord {
    pub fn new(
        source_id: &str,
        source_type: SourceType,
        raw_text: &str,
        attributes: ExtractedAttributes,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let fingerprint = compute_fingerprint(source_id, raw_text, &attributes);
        let extracted_attributes = attributes
            .into_iter()
            .map(|(name, value)| {
                let field = FieldProvenance::new(&name, value, source_type, source_id, observed_at);
                (name, field)
            })
            .collect();

        Self {
            source_id: source_id.to_string(),
            source_type,
            raw_text: raw_text.to_string(),
            extracted_attributes,
            observed_at,
            fingerprint,
        }
    }

    /// New record for the same observation with derived attributes added.
    ///
    /// Attributes already present are kept; the fingerprint stays that of
    /// the observed content.
    pub fn supersede(&self, derived: ExtractedAttributes) -> Self {
        let mut next = self.clone();
        for (name, value) in derived {
            if next.extracted_attributes.contains_key(&name) {
                continue;
            }
            let field = FieldProvenance::new(
                &name,
                value,
                self.source_type,
                &self.source_id,
                self.observed_at,
            );
            next.extracted_attributes.insert(name, field);
        }
        next
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn extracted_attributes(&self) -> &BTreeMap<String, FieldProvenance> {
        &self.extracted_attributes
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Content hash over source id, text and observed attributes
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.extracted_attributes.get(name).map(|f| &f.value)
    }

    /// Plain attribute values, without provenance
    pub fn attribute_values(&self) -> ExtractedAttributes {
        self.extracted_attributes
            .iter()
            .map(|(k, f)| (k.clone(), f.value.clone()))
            .collect()
    }

    pub fn registry_id(&self) -> Option<&str> {
        self.attribute(attr::REGISTRY_ID).and_then(AttrValue::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.attribute(attr::NAME).and_then(AttrValue::as_str)
    }

    pub fn locality(&self) -> Option<&str> {
        self.attribute(attr::LOCALITY).and_then(AttrValue::as_str)
    }
}

fn compute_fingerprint(source_id: &str, raw_text: &str, attributes: &ExtractedAttributes) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_text.as_bytes());
    for (name, value) in attributes {
        hasher.update([0u8]);
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
    }
    let result = hasher.finalize();
    hex_prefix(&result, 16)
}

/// Lowercase hex of a digest, truncated to `len` characters
pub(crate) fn hex_prefix(bytes: &[u8], len: usize) -> String {
    let mut out: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttrValue)]) -> ExtractedAttributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_source_ref_parsing() {
        assert_eq!(
            "https://jansen.nl".parse::<SourceRef>().unwrap(),
            SourceRef::Url("https://jansen.nl".into())
        );
        assert_eq!(
            "registry: 12345678".parse::<SourceRef>().unwrap(),
            SourceRef::Registry("12345678".into())
        );
        assert_eq!(
            "text:Klusjesman in Utrecht".parse::<SourceRef>().unwrap(),
            SourceRef::Text("Klusjesman in Utrecht".into())
        );
        assert!("ftp:whatever".parse::<SourceRef>().is_err());
        assert!("   ".parse::<SourceRef>().is_err());
    }

    #[test]
    fn test_attributes_tagged_with_provenance() {
        let now = Utc::now();
        let record = CandidateRecord::new(
            "registry:12345678",
            SourceType::Registry,
            "",
            attrs(&[
                (attr::NAME, "Jansen BV".into()),
                (attr::EMPLOYEE_COUNT, 4.0.into()),
            ]),
            now,
        );

        let name = &record.extracted_attributes()[attr::NAME];
        assert_eq!(name.source_type, SourceType::Registry);
        assert_eq!(name.source_id, "registry:12345678");
        assert_eq!(name.observed_at, now);
        assert!(!name.volatile);
        assert!(record.extracted_attributes()[attr::EMPLOYEE_COUNT].volatile);
    }

    #[test]
    fn test_supersede_keeps_original_and_fingerprint() {
        let record = CandidateRecord::new(
            "manual:abc",
            SourceType::Manual,
            "zzp loodgieter",
            attrs(&[(attr::FREELANCER, true.into())]),
            Utc::now(),
        );
        let next = record.supersede(attrs(&[
            (attr::FREELANCER, false.into()),
            (attr::RATING, 4.0.into()),
        ]));

        assert_eq!(next.attribute(attr::FREELANCER), Some(&AttrValue::Flag(true)));
        assert_eq!(next.attribute(attr::RATING), Some(&AttrValue::Number(4.0)));
        assert_eq!(next.fingerprint(), record.fingerprint());
        assert!(record.attribute(attr::RATING).is_none());
    }

    #[test]
    fn test_fingerprint_depends_on_content() {
        let now = Utc::now();
        let a = CandidateRecord::new("s", SourceType::Scrape, "one", BTreeMap::new(), now);
        let b = CandidateRecord::new("s", SourceType::Scrape, "two", BTreeMap::new(), now);
        let c = CandidateRecord::new("s", SourceType::Scrape, "one", BTreeMap::new(), Utc::now());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 16);
    }
}
