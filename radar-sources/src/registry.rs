//! Company registry client
//!
//! Looks up a company profile by registry number over HTTP JSON and maps
//! it onto pipeline attributes. Field names are accepted both in English
//! and in the Dutch chamber-of-commerce spelling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use radar_core::{attr, AttrValue, ExtractedAttributes, RawInput, SourceError, SourceRef};

use crate::{status_error, transport_error, SourceFetcher};

/// Registry client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// API root, e.g. the registry's test environment
    pub base_url: String,
    /// Profile path below `base_url`; `{id}` is replaced by the registry number
    pub profile_path: String,
    /// Header carrying the API key
    pub api_key_header: String,
    /// API key, taken from the environment rather than config files
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.kvk.nl/test/api".to_string(),
            profile_path: "v1/basisprofielen/{id}".to_string(),
            api_key_header: "apikey".to_string(),
            api_key: std::env::var("REGISTRY_API_KEY").ok(),
            timeout_secs: 30,
        }
    }
}

impl RegistryConfig {
    pub fn profile_url(&self, registry_id: &str) -> String {
        let path = self
            .profile_path
            .replace("{id}", &urlencoding::encode(registry_id));
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Trade name, either a plain string or an object with a name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TradeName {
    Plain(String),
    Named {
        #[serde(alias = "naam")]
        name: String,
    },
}

impl TradeName {
    pub fn as_str(&self) -> &str {
        match self {
            TradeName::Plain(name) => name,
            TradeName::Named { name } => name,
        }
    }
}

/// Registered business activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(alias = "sbiCode")]
    pub code: String,
    #[serde(default, alias = "sbiOmschrijving")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoData {
    #[serde(default, alias = "gpsLatitude")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "gpsLongitude")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, alias = "plaats")]
    pub city: Option<String>,
    #[serde(default, alias = "postcode")]
    pub postal_code: Option<String>,
    #[serde(default, alias = "geoData")]
    pub geo: Option<GeoData>,
}

/// Main establishment of a company
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default, alias = "adressen")]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub websites: Vec<String>,
    #[serde(default, alias = "totaalWerkzamePersonen")]
    pub employee_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(default, alias = "rechtsvorm")]
    pub legal_form: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedded {
    #[serde(default, alias = "hoofdvestiging")]
    pub main_branch: Option<Branch>,
    #[serde(default, alias = "eigenaar")]
    pub owner: Option<Owner>,
}

/// Company profile as returned by the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryProfile {
    #[serde(alias = "kvkNummer")]
    pub registry_id: String,
    #[serde(default, alias = "naam")]
    pub name: Option<String>,
    #[serde(default, alias = "handelsnamen")]
    pub trade_names: Vec<TradeName>,
    /// `YYYYMMDD` or `YYYY-MM-DD`
    #[serde(default, alias = "formeleRegistratiedatum")]
    pub registered_at: Option<String>,
    #[serde(default, alias = "totaalWerkzamePersonen")]
    pub employee_count: Option<u32>,
    #[serde(default, alias = "sbiActiviteiten")]
    pub activities: Vec<Activity>,
    #[serde(default, alias = "rechtsvorm")]
    pub legal_form: Option<String>,
    #[serde(default, rename = "_embedded")]
    pub embedded: Option<Embedded>,
}

impl RegistryProfile {
    fn main_branch(&self) -> Option<&Branch> {
        self.embedded.as_ref().and_then(|e| e.main_branch.as_ref())
    }

    /// Map the profile onto pipeline attributes
    pub fn to_attributes(&self) -> ExtractedAttributes {
        let mut attrs = ExtractedAttributes::new();
        attrs.insert(attr::REGISTRY_ID.into(), self.registry_id.as_str().into());
        attrs.insert(attr::REGISTERED.into(), true.into());

        let trade_names: Vec<String> = self
            .trade_names
            .iter()
            .map(|t| t.as_str().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let name = self
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| trade_names.first().cloned());
        if let Some(name) = name {
            attrs.insert(attr::NAME.into(), name.into());
        }
        if !trade_names.is_empty() {
            attrs.insert(attr::TRADE_NAMES.into(), AttrValue::List(trade_names));
        }

        if let Some(date) = &self.registered_at {
            attrs.insert(attr::REGISTERED_AT.into(), date.as_str().into());
        }

        let employees = self
            .employee_count
            .or_else(|| self.main_branch().and_then(|b| b.employee_count));
        if let Some(count) = employees {
            attrs.insert(attr::EMPLOYEE_COUNT.into(), count.into());
        }

        if !self.activities.is_empty() {
            let codes = self.activities.iter().map(|a| a.code.clone()).collect();
            attrs.insert(attr::ACTIVITY_CODES.into(), AttrValue::List(codes));
        }

        let legal_form = self.legal_form.clone().or_else(|| {
            self.embedded
                .as_ref()
                .and_then(|e| e.owner.as_ref())
                .and_then(|o| o.legal_form.clone())
        });
        if let Some(form) = legal_form {
            attrs.insert(attr::LEGAL_FORM.into(), form.to_lowercase().into());
        }

        if let Some(branch) = self.main_branch() {
            if let Some(address) = branch.addresses.first() {
                if let Some(city) = &address.city {
                    attrs.insert(attr::LOCALITY.into(), city.as_str().into());
                }
                if let Some(geo) = &address.geo {
                    if let (Some(lat), Some(lon)) = (geo.latitude, geo.longitude) {
                        attrs.insert(attr::LATITUDE.into(), lat.into());
                        attrs.insert(attr::LONGITUDE.into(), lon.into());
                    }
                }
            }
            if let Some(site) = branch.websites.first() {
                attrs.insert(attr::WEBSITE.into(), site.as_str().into());
            }
        }

        attrs
    }
}

/// HTTP client for the company registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    client: Client,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self, SourceError> {
        if config.api_key.is_none() {
            warn!("Registry client has no API key; requests may be rejected");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build http client: {}", e)))?;
        info!("Registry client initialized (base={})", config.base_url);
        Ok(Self { config, client })
    }

    /// Fetch the company profile for a registry number
    pub async fn lookup(&self, registry_id: &str) -> Result<RegistryProfile, SourceError> {
        let url = self.config.profile_url(registry_id);
        debug!("Registry request: {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header(self.config.api_key_header.as_str(), key);
        }

        let response = request.send().await.map_err(|e| transport_error(e, &url))?;
        let status = response.status();
        if !status.is_success() {
            warn!("Registry lookup for {} returned status: {}", registry_id, status);
            return Err(status_error(status, &url));
        }

        let body = response.text().await.map_err(|e| transport_error(e, &url))?;
        serde_json::from_str(&body)
            .map_err(|e| SourceError::Decode(format!("registry profile {}: {}", registry_id, e)))
    }
}

#[async_trait]
impl SourceFetcher for RegistryClient {
    fn name(&self) -> &str {
        "registry"
    }

    async fn fetch(&self, source_ref: &SourceRef) -> Result<RawInput, SourceError> {
        let SourceRef::Registry(id) = source_ref else {
            return Err(SourceError::NotFound(format!(
                "registry client cannot serve {}",
                source_ref
            )));
        };

        let profile = self.lookup(id).await?;
        let mut raw = RawInput::registry(&profile.registry_id);
        raw.attributes = profile.to_attributes();
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUTCH_PROFILE: &str = r#"{
        "kvkNummer": "12345678",
        "naam": "Van der Berg Loodgieters B.V.",
        "formeleRegistratiedatum": "20150312",
        "totaalWerkzamePersonen": 5,
        "handelsnamen": [{"naam": "Van der Berg Loodgieters", "volgorde": 0}],
        "sbiActiviteiten": [
            {"sbiCode": "4322", "sbiOmschrijving": "Loodgieters", "indHoofdactiviteit": "Ja"}
        ],
        "_embedded": {
            "hoofdvestiging": {
                "adressen": [{"plaats": "Amersfoort", "postcode": "3811AB",
                              "geoData": {"gpsLatitude": 52.15, "gpsLongitude": 5.38}}],
                "websites": ["www.vanderbergloodgieters.nl"]
            },
            "eigenaar": {"rechtsvorm": "BV"}
        }
    }"#;

    #[test]
    fn test_dutch_profile_mapping() {
        let profile: RegistryProfile = serde_json::from_str(DUTCH_PROFILE).unwrap();
        let attrs = profile.to_attributes();

        assert_eq!(attrs[attr::REGISTRY_ID], AttrValue::from("12345678"));
        assert_eq!(attrs[attr::NAME], AttrValue::from("Van der Berg Loodgieters B.V."));
        assert_eq!(attrs[attr::REGISTERED_AT], AttrValue::from("20150312"));
        assert_eq!(attrs[attr::EMPLOYEE_COUNT], AttrValue::Number(5.0));
        assert_eq!(attrs[attr::ACTIVITY_CODES], AttrValue::List(vec!["4322".into()]));
        assert_eq!(attrs[attr::LEGAL_FORM], AttrValue::from("bv"));
        assert_eq!(attrs[attr::LOCALITY], AttrValue::from("Amersfoort"));
        assert_eq!(attrs[attr::LATITUDE], AttrValue::Number(52.15));
        assert_eq!(
            attrs[attr::WEBSITE],
            AttrValue::from("www.vanderbergloodgieters.nl")
        );
        assert_eq!(attrs[attr::REGISTERED], AttrValue::Flag(true));
    }

    #[test]
    fn test_english_profile_falls_back_to_trade_name() {
        let json = r#"{"registry_id": "87654321", "trade_names": ["Klusbedrijf Mike"]}"#;
        let profile: RegistryProfile = serde_json::from_str(json).unwrap();
        let attrs = profile.to_attributes();
        assert_eq!(attrs[attr::NAME], AttrValue::from("Klusbedrijf Mike"));
        assert!(!attrs.contains_key(attr::EMPLOYEE_COUNT));
    }

    #[test]
    fn test_profile_url() {
        let config = RegistryConfig {
            base_url: "https://registry.example.com/api/".into(),
            ..Default::default()
        };
        assert_eq!(
            config.profile_url("12345678"),
            "https://registry.example.com/api/v1/basisprofielen/12345678"
        );
    }

    #[tokio::test]
    async fn test_rejects_non_registry_refs() {
        let client = RegistryClient::new(RegistryConfig::default()).unwrap();
        let err = client
            .fetch(&SourceRef::Text("hello".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
