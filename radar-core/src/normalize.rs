//! Normalizer: raw source input to canonical candidate record
//!
//! Pure transform. Every attribute on the resulting record is tagged with
//! the input's source type so the merger can apply trust ordering.

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::record::hex_prefix;
use crate::{
    attr, extract_attributes, AttrValue, CandidateRecord, ExtractedAttributes, NormalizeError,
    RawInput, SourceType, MAX_RAW_TEXT_CHARS,
};

/// Normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Minimum characters of free text that count as an identifying hint
    pub min_text_chars: usize,
    /// Raw text beyond this is truncated
    pub max_text_chars: usize,
    /// Valid registry identifiers, after stripping spaces and dots
    pub registry_id_pattern: String,
    /// Country calling code applied to national phone numbers
    pub default_country_code: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 20,
            max_text_chars: MAX_RAW_TEXT_CHARS,
            registry_id_pattern: r"^\d{8}$".to_string(),
            default_country_code: "31".to_string(),
        }
    }
}

/// Turns [`RawInput`]s into [`CandidateRecord`]s
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizerConfig,
    registry_id: Regex,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Result<Self, regex::Error> {
        let registry_id = Regex::new(&config.registry_id_pattern)?;
        Ok(Self {
            config,
            registry_id,
        })
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize one raw input.
    ///
    /// Fails with `InsufficientData` when the input carries no URL, no
    /// registry number and too little text, and with `Malformed` when a
    /// hint or structured attribute is present but invalid.
    pub fn normalize(&self, raw: &RawInput) -> Result<CandidateRecord, NormalizeError> {
        let text = raw.text.as_deref().map(str::trim).unwrap_or_default();
        let url = raw.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
        let registry_id = raw
            .registry_id
            .as_deref()
            .map(strip_registry_id)
            .filter(|id| !id.is_empty());

        if url.is_none() && registry_id.is_none() && text.chars().count() < self.config.min_text_chars
        {
            return Err(NormalizeError::InsufficientData(format!(
                "no url, no registry number and {} chars of text (need {})",
                text.chars().count(),
                self.config.min_text_chars
            )));
        }

        let canonical = match url {
            Some(u) => Some(
                canonical_url(u)
                    .ok_or_else(|| NormalizeError::Malformed(format!("invalid url: {}", u)))?,
            ),
            None => None,
        };

        if let Some(id) = &registry_id {
            if !self.registry_id.is_match(id) {
                return Err(NormalizeError::Malformed(format!(
                    "invalid registry number: {}",
                    id
                )));
            }
        }

        let mut attributes = if text.is_empty() {
            ExtractedAttributes::new()
        } else {
            extract_attributes(text)
        };
        for (name, value) in &raw.attributes {
            validate_structured(name, value)?;
            attributes.insert(name.clone(), value.clone());
        }
        if let Some(id) = &registry_id {
            attributes.insert(attr::REGISTRY_ID.into(), id.as_str().into());
        }
        if let Some(web) = &canonical {
            attributes
                .entry(attr::WEBSITE.into())
                .or_insert_with(|| web.as_str().into());
        }

        self.canonicalize(&mut attributes);

        let source_id = match (raw.source_type, &registry_id, &canonical) {
            (SourceType::Registry, Some(id), _) => format!("registry:{}", id),
            (SourceType::Scrape, _, Some(web)) => format!("web:{}", web),
            (source_type, id, web) => {
                let hint = format!(
                    "{} {} {}",
                    id.as_deref().unwrap_or_default(),
                    web.as_deref().unwrap_or_default(),
                    text
                );
                format!("{}:{}", source_type, text_hash(&hint))
            }
        };

        let raw_text: String = text.chars().take(self.config.max_text_chars).collect();

        debug!(
            "Normalized {} ({} attributes, {} chars)",
            source_id,
            attributes.len(),
            raw_text.chars().count()
        );

        Ok(CandidateRecord::new(
            &source_id,
            raw.source_type,
            &raw_text,
            attributes,
            raw.observed_at,
        ))
    }

    /// Bring contact and identity attributes into canonical form, dropping
    /// text-extracted values that cannot be canonicalized
    fn canonicalize(&self, attributes: &mut ExtractedAttributes) {
        let text_attr = |attributes: &ExtractedAttributes, name: &str| {
            attributes
                .get(name)
                .map(|v| v.to_string())
                .filter(|s| !s.trim().is_empty())
        };

        if let Some(name) = text_attr(attributes, attr::NAME) {
            attributes.insert(attr::NAME.into(), collapse_whitespace(&name).into());
        }
        if let Some(locality) = text_attr(attributes, attr::LOCALITY) {
            attributes.insert(attr::LOCALITY.into(), collapse_whitespace(&locality).into());
        }

        if let Some(web) = text_attr(attributes, attr::WEBSITE) {
            match canonical_url(&web) {
                Some(c) => {
                    attributes.insert(attr::WEBSITE.into(), c.into());
                }
                None => {
                    debug!("Dropping unparseable website {}", web);
                    attributes.remove(attr::WEBSITE);
                }
            }
        }

        if let Some(phone) = text_attr(attributes, attr::PHONE) {
            match canonical_phone(&phone, &self.config.default_country_code) {
                Some(c) => {
                    attributes.insert(attr::PHONE.into(), c.into());
                }
                None => {
                    attributes.remove(attr::PHONE);
                }
            }
        }

        if let Some(email) = text_attr(attributes, attr::EMAIL) {
            attributes.insert(attr::EMAIL.into(), email.trim().to_lowercase().into());
        }

        if let Some(id) = text_attr(attributes, attr::REGISTRY_ID) {
            let id = strip_registry_id(&id);
            if self.registry_id.is_match(&id) {
                attributes.insert(attr::REGISTRY_ID.into(), id.into());
            } else {
                attributes.remove(attr::REGISTRY_ID);
            }
        }
    }
}

fn validate_structured(name: &str, value: &AttrValue) -> Result<(), NormalizeError> {
    let in_range = |lo: f64, hi: f64| value.as_f64().is_some_and(|n| (lo..=hi).contains(&n));
    let valid = match name {
        attr::RATING => in_range(0.0, 5.0),
        attr::REVIEW_COUNT | attr::EMPLOYEE_COUNT | attr::YEARS_IN_BUSINESS => {
            in_range(0.0, f64::MAX)
        }
        attr::FOUNDED_YEAR => in_range(1800.0, 2200.0),
        _ => true,
    };
    if !valid {
        return Err(NormalizeError::Malformed(format!(
            "attribute {} has invalid value {}",
            name, value
        )));
    }
    Ok(())
}

fn strip_registry_id(id: &str) -> String {
    id.chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .collect()
}

fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_name(text).as_bytes());
    hex_prefix(&hasher.finalize(), 16)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case, diacritic, punctuation and whitespace insensitive form of a name
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.nfd() {
        if is_combining_mark(c) || c == '\'' || c == '’' {
            continue;
        }
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                push_folded(&mut out, lower);
            }
        } else {
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

/// Lowercase letters that carry no canonical decomposition
fn push_folded(out: &mut String, c: char) {
    match c {
        'ı' => out.push('i'),
        'ł' => out.push('l'),
        'ø' => out.push('o'),
        'đ' | 'ð' => out.push('d'),
        'ß' => out.push_str("ss"),
        'æ' => out.push_str("ae"),
        'œ' => out.push_str("oe"),
        'þ' => out.push_str("th"),
        other => out.push(other),
    }
}

/// Host without `www.` plus path without trailing slash, e.g. `jansen.nl/contact`.
/// A missing scheme is assumed to be https; only http(s) is accepted.
pub fn canonical_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    let parsed = Url::parse(&with_scheme).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();
    if !host.contains('.') {
        return None;
    }
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let path = parsed.path().trim_end_matches('/');
    Some(format!("{}{}", host, path))
}

/// International digits-only phone number, e.g. `31612345678`
pub fn canonical_phone(raw: &str, country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut digits: String = trimmed
        .replace("(0)", "")
        .chars()
        .filter(char::is_ascii_digit)
        .collect();

    if trimmed.starts_with('+') {
        // already international
    } else if let Some(rest) = digits.strip_prefix("00") {
        digits = rest.to_string();
    } else if let Some(rest) = digits.strip_prefix('0') {
        digits = format!("{}{}", country_code, rest);
    }

    (9..=15).contains(&digits.len()).then_some(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(NormalizerConfig::default()).unwrap()
    }

    #[test]
    fn test_insufficient_hint_fails() {
        let err = normalizer().normalize(&RawInput::manual("te kort")).unwrap_err();
        assert!(matches!(err, NormalizeError::InsufficientData(_)));
    }

    #[test]
    fn test_malformed_hints_fail() {
        let n = normalizer();
        let err = n.normalize(&RawInput::registry("1234")).unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));

        let err = n
            .normalize(&RawInput::scraped("ftp://files.example.com", ""))
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));

        let raw = RawInput::registry("12345678").with_attribute(attr::RATING, 9.0);
        assert!(matches!(
            n.normalize(&raw).unwrap_err(),
            NormalizeError::Malformed(_)
        ));
    }

    #[test]
    fn test_registry_input() {
        let raw = RawInput::registry("1234 5678")
            .with_attribute(attr::NAME, "Jansen  Installatie B.V.")
            .with_attribute(attr::EMPLOYEE_COUNT, 12.0);
        let record = normalizer().normalize(&raw).unwrap();

        assert_eq!(record.source_id(), "registry:12345678");
        assert_eq!(record.source_type(), SourceType::Registry);
        assert_eq!(record.registry_id(), Some("12345678"));
        assert_eq!(record.name(), Some("Jansen Installatie B.V."));
        for field in record.extracted_attributes().values() {
            assert_eq!(field.source_type, SourceType::Registry);
        }
    }

    #[test]
    fn test_scraped_input_canonicalizes_contacts() {
        let raw = RawInput::scraped(
            "https://www.Jansen-Loodgieters.nl/",
            "Jansen Loodgieters\nBel 06-12345678 of mail Info@Jansen.nl\nGevestigd in Utrecht",
        );
        let record = normalizer().normalize(&raw).unwrap();

        assert_eq!(record.source_id(), "web:jansen-loodgieters.nl");
        assert_eq!(
            record.attribute(attr::WEBSITE),
            Some(&AttrValue::from("jansen-loodgieters.nl"))
        );
        assert_eq!(
            record.attribute(attr::PHONE),
            Some(&AttrValue::from("31612345678"))
        );
        assert_eq!(
            record.attribute(attr::EMAIL),
            Some(&AttrValue::from("info@jansen.nl"))
        );
        assert_eq!(record.locality(), Some("Utrecht"));
    }

    #[test]
    fn test_manual_source_id_is_stable() {
        let text = "Klusjesman Piet, helpt in de buurt met kleine klussen";
        let a = normalizer().normalize(&RawInput::manual(text)).unwrap();
        let b = normalizer().normalize(&RawInput::manual(text)).unwrap();
        assert!(a.source_id().starts_with("manual:"));
        assert_eq!(a.source_id(), b.source_id());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_raw_text_truncated() {
        let config = NormalizerConfig {
            max_text_chars: 30,
            ..Default::default()
        };
        let n = Normalizer::new(config).unwrap();
        let record = n.normalize(&RawInput::manual(&"a".repeat(100))).unwrap();
        assert_eq!(record.raw_text().chars().count(), 30);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Jansén   Loodgieters B.V. "), "jansen loodgieters b v");
        assert_eq!(normalize_name("Mike's Klusbedrijf"), "mikes klusbedrijf");
        assert_eq!(normalize_name("Ölçer"), "olcer");
    }

    #[test]
    fn test_normalize_name_folds_wider_diacritics() {
        assert_eq!(normalize_name("Şahin Bouw"), normalize_name("Sahin Bouw"));
        assert_eq!(normalize_name("Kılıç Tegelwerken"), "kilic tegelwerken");
        assert_eq!(normalize_name("Erdoğan & Zn."), "erdogan zn");
        assert_eq!(normalize_name("Łukasz Dvořák"), "lukasz dvorak");
        assert_eq!(normalize_name("Győri Žarko"), "gyori zarko");
        assert_eq!(normalize_name("Straße"), "strasse");
        assert_eq!(normalize_name("İnşaat"), "insaat");
    }

    #[test]
    fn test_canonical_url_and_phone() {
        assert_eq!(canonical_url("WWW.Jansen.nl/"), Some("jansen.nl".into()));
        assert_eq!(
            canonical_url("http://jansen.nl/contact/?x=1"),
            Some("jansen.nl/contact".into())
        );
        assert_eq!(canonical_url("not a url"), None);
        assert_eq!(canonical_phone("+31 6 1234 5678", "31"), Some("31612345678".into()));
        assert_eq!(canonical_phone("0031 (0)6 12345678", "31"), Some("31612345678".into()));
        assert_eq!(canonical_phone("123", "31"), None);
    }
}
