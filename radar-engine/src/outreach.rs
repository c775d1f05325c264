//! Outreach dispatch
//!
//! Dispatch happens after classification. A failed dispatch leaves the
//! profile's ring and score in place and `outreach_sent` false, so a later
//! run can retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use radar_core::{attr, DispatchError, Profile, Ring};

/// How a ring is approached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    DirectMessage,
    Invite,
}

impl Channel {
    pub fn for_ring(ring: Ring) -> Self {
        match ring {
            Ring::Established | Ring::Academy => Channel::Email,
            Ring::Freelancer => Channel::DirectMessage,
            Ring::Starter => Channel::Invite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::DirectMessage => "direct_message",
            Channel::Invite => "invite",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle of a dispatched message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub channel: Channel,
    pub sent_at: DateTime<Utc>,
}

impl MessageRef {
    pub fn new(id: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: id.into(),
            channel,
            sent_at: Utc::now(),
        }
    }
}

/// Sends a ring-appropriate message to a profile
#[async_trait]
pub trait OutreachDispatcher: Send + Sync {
    fn name(&self) -> &str;

    async fn dispatch(&self, profile: &Profile, ring: Ring) -> Result<MessageRef, DispatchError>;
}

/// Shared dispatcher handle
pub type SharedDispatcher = Arc<dyn OutreachDispatcher>;

/// Logs the outreach instead of sending it
#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

#[async_trait]
impl OutreachDispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn dispatch(&self, profile: &Profile, ring: Ring) -> Result<MessageRef, DispatchError> {
        let channel = Channel::for_ring(ring);
        info!(
            "Outreach via {} to {} ({}), hook: {}",
            channel,
            profile.name().unwrap_or("unnamed"),
            ring,
            ring.hooks().first().copied().unwrap_or_default()
        );
        Ok(MessageRef::new(Uuid::new_v4().to_string(), channel))
    }
}

/// Webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_secs: 15,
        }
    }
}

/// JSON body posted to the webhook
#[derive(Debug, Clone, Serialize)]
pub struct OutreachPayload {
    pub message_id: String,
    pub profile_id: String,
    pub name: Option<String>,
    pub ring: u8,
    pub ring_name: &'static str,
    pub channel: Channel,
    pub hooks: Vec<&'static str>,
    pub quality_score: Option<f64>,
    pub contacts: Vec<String>,
}

impl OutreachPayload {
    pub fn new(profile: &Profile, ring: Ring) -> Self {
        let contacts = [attr::EMAIL, attr::PHONE, attr::WEBSITE, attr::SOCIAL_HANDLES]
            .iter()
            .filter_map(|name| profile.attribute(name))
            .flat_map(|field| field.value.as_list())
            .collect();

        Self {
            message_id: Uuid::new_v4().to_string(),
            profile_id: profile.profile_id().to_string(),
            name: profile.name().map(str::to_string),
            ring: ring.number(),
            ring_name: ring.name(),
            channel: Channel::for_ring(ring),
            hooks: ring.hooks().to_vec(),
            quality_score: profile.quality_score(),
            contacts,
        }
    }
}

/// Posts outreach requests to an external messaging service
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Result<Self, DispatchError> {
        if config.url.is_empty() {
            return Err(DispatchError("webhook url not configured".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DispatchError(e.to_string()))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl OutreachDispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn dispatch(&self, profile: &Profile, ring: Ring) -> Result<MessageRef, DispatchError> {
        let payload = OutreachPayload::new(profile, ring);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError(format!("webhook returned {}", status)));
        }

        Ok(MessageRef::new(payload.message_id, payload.channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_core::{AttrValue, CandidateRecord, ExtractedAttributes, SourceType};

    fn profile() -> Profile {
        let mut attrs = ExtractedAttributes::new();
        attrs.insert(attr::NAME.into(), AttrValue::from("Jansen"));
        attrs.insert(attr::EMAIL.into(), AttrValue::from("info@jansen.nl"));
        attrs.insert(
            attr::SOCIAL_HANDLES.into(),
            AttrValue::List(vec!["@jansen".into()]),
        );
        let record = CandidateRecord::new("manual:1", SourceType::Manual, "", attrs, Utc::now());
        Profile::seed(&record)
    }

    #[test]
    fn test_channel_per_ring() {
        assert_eq!(Channel::for_ring(Ring::Established), Channel::Email);
        assert_eq!(Channel::for_ring(Ring::Freelancer), Channel::DirectMessage);
        assert_eq!(Channel::for_ring(Ring::Starter), Channel::Invite);
        assert_eq!(Channel::for_ring(Ring::Academy), Channel::Email);
    }

    #[test]
    fn test_payload_contacts() {
        let payload = OutreachPayload::new(&profile(), Ring::Freelancer);
        assert_eq!(payload.ring, 2);
        assert_eq!(payload.channel, Channel::DirectMessage);
        assert_eq!(payload.contacts, vec!["info@jansen.nl", "@jansen"]);
    }

    #[test]
    fn test_webhook_requires_url() {
        assert!(WebhookDispatcher::new(&WebhookConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_log_dispatcher() {
        let message = LogDispatcher.dispatch(&profile(), Ring::Starter).await.unwrap();
        assert_eq!(message.channel, Channel::Invite);
        assert!(!message.id.is_empty());
    }
}
