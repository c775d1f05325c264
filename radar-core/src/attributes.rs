//! Attribute values and the well-known attribute vocabulary
//!
//! Every observation about an entity is stored as a named attribute.
//! Names are plain strings so sources can carry attributes the pipeline
//! does not know about; the ones the pipeline reasons about live in [`attr`].

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known attribute names
pub mod attr {
    pub const NAME: &str = "name";
    pub const LOCALITY: &str = "locality";
    pub const REGISTRY_ID: &str = "registry_id";
    pub const WEBSITE: &str = "website";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const SOCIAL_HANDLES: &str = "social_handles";
    pub const FOUNDED_YEAR: &str = "founded_year";
    pub const YEARS_IN_BUSINESS: &str = "years_in_business";
    pub const REGISTERED_AT: &str = "registered_at";
    pub const EMPLOYEE_COUNT: &str = "employee_count";
    pub const ACTIVITY_CODES: &str = "activity_codes";
    pub const RATING: &str = "rating";
    pub const REVIEW_COUNT: &str = "review_count";
    pub const FREELANCER: &str = "freelancer";
    pub const REGISTERED: &str = "registered";
    pub const LEGAL_FORM: &str = "legal_form";
    pub const TRADE_NAMES: &str = "trade_names";
    pub const SPECIALIZATIONS: &str = "specializations";
    pub const STAFF_MEMBER: &str = "staff_member";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
}

/// Attributes whose latest observation wins regardless of source trust.
/// Registries and platforms update these over time.
pub const VOLATILE_ATTRIBUTES: &[&str] = &[
    attr::EMPLOYEE_COUNT,
    attr::ACTIVITY_CODES,
    attr::RATING,
    attr::REVIEW_COUNT,
];

/// Whether an attribute takes the most recent value regardless of trust
pub fn is_volatile(name: &str) -> bool {
    VOLATILE_ATTRIBUTES.contains(&name)
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl AttrValue {
    /// Numeric view; text is parsed leniently (comma decimal separator allowed)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) if n.is_finite() => Some(*n),
            AttrValue::Text(s) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Flag(b) => Some(*b),
            AttrValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "ja" | "1" => Some(true),
                "false" | "no" | "nee" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// List view; a single text value is treated as a one-element list
    pub fn as_list(&self) -> Vec<String> {
        match self {
            AttrValue::List(items) => items.clone(),
            AttrValue::Text(s) if !s.trim().is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Flag(b) => write!(f, "{}", b),
            AttrValue::Number(n) => write!(f, "{}", n),
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::List(items) => write!(f, "{}", items.join(", ")),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Flag(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::List(value)
    }
}

/// Untagged attributes as produced by extractors and signal providers
pub type ExtractedAttributes = BTreeMap<String, AttrValue>;

/// Years in operation as of `as_of`.
///
/// Takes the largest of stated experience, founding year and registration
/// date, whichever are present.
pub fn business_age_years(attributes: &ExtractedAttributes, as_of: DateTime<Utc>) -> Option<f64> {
    let stated = attributes
        .get(attr::YEARS_IN_BUSINESS)
        .and_then(AttrValue::as_f64)
        .filter(|y| *y >= 0.0);

    let founded = attributes
        .get(attr::FOUNDED_YEAR)
        .and_then(AttrValue::as_f64)
        .map(|year| (as_of.year() as f64 - year).max(0.0));

    let registered = attributes
        .get(attr::REGISTERED_AT)
        .and_then(AttrValue::as_str)
        .and_then(parse_date)
        .map(|date| {
            let days = (as_of.date_naive() - date).num_days().max(0);
            days as f64 / 365.25
        });

    [stated, founded, registered]
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.max(y))))
}

/// Accepts `YYYY-MM-DD` and registry style `YYYYMMDD`
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .ok()
}
