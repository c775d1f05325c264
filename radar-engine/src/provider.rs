//! Classification signal providers
//!
//! Turn raw text into a partial attribute set. Failures are soft: the
//! orchestrator logs them and scores with whatever signals remain.
//! Providers never emit the staff membership flag.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use radar_core::{attr, AttrValue, ExtractedAttributes, ExtractionError};

use crate::SharedBackend;

/// Extracts partial attributes from raw text
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Collaborator name, used for logging and concurrency caps
    fn name(&self) -> &str;

    async fn extract(&self, raw_text: &str) -> Result<ExtractedAttributes, ExtractionError>;
}

/// Shared provider handle
pub type SharedProvider = Arc<dyn SignalProvider>;

const ESTABLISHED_KEYWORDS: &[&str] = &[
    "kvk",
    "jaar ervaring",
    "years experience",
    "medewerkers",
    "employees",
    "b.v.",
    " bv",
    "reviews",
    "erkend",
    "gecertificeerd",
];

const FREELANCER_KEYWORDS: &[&str] = &[
    "zzp",
    "freelance",
    "zelfstandig",
    "instagram",
    "dm ",
    "stuur een dm",
    "volg ",
    "startend",
];

const HOBBYIST_KEYWORDS: &[&str] = &[
    "hobby",
    "bijverdienste",
    "buurman",
    "marktplaats",
    "kleine klussen",
    "geen kvk",
    "zonder kvk",
    "in het weekend",
];

/// Keyword-count heuristics, used without an LLM or as its fallback
#[derive(Debug, Clone, Default)]
pub struct RuleSignalProvider;

/// Keyword hit counts per indicator group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorCounts {
    pub established: usize,
    pub freelancer: usize,
    pub hobbyist: usize,
}

impl RuleSignalProvider {
    pub fn new() -> Self {
        Self
    }

    pub fn count_indicators(text: &str) -> IndicatorCounts {
        let lower = text.to_lowercase();
        let hits = |keywords: &[&str]| keywords.iter().filter(|k| lower.contains(*k)).count();
        IndicatorCounts {
            established: hits(ESTABLISHED_KEYWORDS),
            freelancer: hits(FREELANCER_KEYWORDS),
            hobbyist: hits(HOBBYIST_KEYWORDS),
        }
    }

    pub fn extract_sync(&self, raw_text: &str) -> Result<ExtractedAttributes, ExtractionError> {
        if raw_text.trim().is_empty() {
            return Err(ExtractionError("no text to extract from".to_string()));
        }

        let counts = Self::count_indicators(raw_text);
        let mut attributes = ExtractedAttributes::new();

        if counts.hobbyist > counts.established && counts.hobbyist >= counts.freelancer {
            attributes.insert(attr::REGISTERED.to_string(), AttrValue::Flag(false));
        } else if counts.freelancer > 0 && counts.freelancer >= counts.established {
            attributes.insert(attr::FREELANCER.to_string(), AttrValue::Flag(true));
        }

        debug!(
            "Rule indicators: established={} freelancer={} hobbyist={}",
            counts.established, counts.freelancer, counts.hobbyist
        );
        Ok(attributes)
    }
}

#[async_trait]
impl SignalProvider for RuleSignalProvider {
    fn name(&self) -> &str {
        "rules"
    }

    async fn extract(&self, raw_text: &str) -> Result<ExtractedAttributes, ExtractionError> {
        self.extract_sync(raw_text)
    }
}

/// System prompt for attribute extraction
const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You extract facts about a trade business or tradesperson from a text.

Answer with ONE JSON object and nothing else. Use only these keys and leave out
anything the text does not state:
- "name": business or person name
- "locality": city or region
- "founded_year": year the business started
- "years_in_business": years of experience or years active
- "employee_count": number of employees
- "rating": average review rating on a 0-5 scale
- "review_count": number of reviews
- "freelancer": true when the person works as a freelancer / zzp
- "registered": true when a chamber of commerce registration is mentioned, false when the text says there is none
- "specializations": list of trades or specialties
"#;

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

const TEXT_KEYS: &[&str] = &[attr::NAME, attr::LOCALITY];
const NUMBER_KEYS: &[&str] = &[
    attr::FOUNDED_YEAR,
    attr::YEARS_IN_BUSINESS,
    attr::EMPLOYEE_COUNT,
    attr::RATING,
    attr::REVIEW_COUNT,
];
const FLAG_KEYS: &[&str] = &[attr::FREELANCER, attr::REGISTERED];

/// Maps an LLM answer onto attributes. Unknown keys and the staff flag are
/// dropped.
pub fn parse_llm_attributes(response: &str) -> Result<ExtractedAttributes, ExtractionError> {
    let object = JSON_OBJECT
        .find(response)
        .ok_or_else(|| ExtractionError("no JSON object in model response".to_string()))?;
    let value: serde_json::Value = serde_json::from_str(object.as_str())
        .map_err(|e| ExtractionError(format!("invalid JSON from model: {}", e)))?;
    let map = value
        .as_object()
        .ok_or_else(|| ExtractionError("model response is not an object".to_string()))?;

    let mut attributes = ExtractedAttributes::new();
    for (key, value) in map {
        let key = key.as_str();
        let mapped = if TEXT_KEYS.contains(&key) {
            value
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .map(|s| AttrValue::Text(s.trim().to_string()))
        } else if NUMBER_KEYS.contains(&key) {
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| AttrValue::from(s).as_f64()))
                .map(AttrValue::Number)
        } else if FLAG_KEYS.contains(&key) {
            value.as_bool().map(AttrValue::Flag)
        } else if key == attr::SPECIALIZATIONS {
            value.as_array().map(|items| {
                AttrValue::List(
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                )
            })
        } else {
            None
        };

        if let Some(mapped) = mapped {
            attributes.insert(key.to_string(), mapped);
        }
    }
    Ok(attributes)
}

/// LLM-backed provider with an optional rule-based fallback
pub struct LlmSignalProvider {
    backend: SharedBackend,
    fallback: Option<RuleSignalProvider>,
    max_input_chars: usize,
}

impl LlmSignalProvider {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            fallback: Some(RuleSignalProvider),
            max_input_chars: 4000,
        }
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    async fn ask_model(&self, raw_text: &str) -> Result<ExtractedAttributes, ExtractionError> {
        let input: String = raw_text.chars().take(self.max_input_chars).collect();
        let response = self
            .backend
            .generate(EXTRACTION_SYSTEM_PROMPT, &input)
            .await
            .map_err(|e| ExtractionError(e.to_string()))?;
        parse_llm_attributes(&response)
    }
}

#[async_trait]
impl SignalProvider for LlmSignalProvider {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract(&self, raw_text: &str) -> Result<ExtractedAttributes, ExtractionError> {
        if raw_text.trim().is_empty() {
            return Err(ExtractionError("no text to extract from".to_string()));
        }

        match self.ask_model(raw_text).await {
            Ok(attributes) => {
                debug!(
                    "{} extracted {} attributes",
                    self.backend.model_name(),
                    attributes.len()
                );
                Ok(attributes)
            }
            Err(e) => match &self.fallback {
                Some(rules) => {
                    warn!("LLM extraction failed, using rules: {}", e);
                    rules.extract_sync(raw_text)
                }
                None => Err(e),
            },
        }
    }
}
