//! Web page fetcher
//!
//! Fetches a public page and reduces it to title plus body text, skipping
//! scripts, styles and page chrome (navigation, header, footer).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use radar_core::{RawInput, SourceError, SourceRef};

use crate::SourceFetcher;

/// Web fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSourceConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum characters of page text kept
    pub max_content_chars: usize,
    /// Rotate through browser user agents per request
    pub rotate_user_agent: bool,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_content_chars: 5000,
            rotate_user_agent: true,
        }
    }
}

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:137.0) Gecko/20100101 Firefox/137.0",
];

const DEFAULT_USER_AGENT: &str = "radar/0.1 (+lead discovery)";

/// Get a random browser user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Map a non-success HTTP status onto the source error taxonomy
pub fn status_error(status: StatusCode, target: &str) -> SourceError {
    let detail = format!("{} returned {}", target, status);
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            SourceError::RateLimited(detail)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SourceError::Timeout(detail),
        s if s.is_server_error() => SourceError::Transport(detail),
        _ => SourceError::NotFound(detail),
    }
}

/// Map a client-side reqwest failure onto the source error taxonomy
pub fn transport_error(err: reqwest::Error, target: &str) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout(format!("{}: {}", target, err))
    } else if err.is_decode() {
        SourceError::Decode(format!("{}: {}", target, err))
    } else {
        SourceError::Transport(format!("{}: {}", target, err))
    }
}

/// Fetches public web pages
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    config: HttpSourceConfig,
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: HttpSourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Transport(format!("failed to build http client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn fetch_page(&self, url: &str) -> Result<RawInput, SourceError> {
        let user_agent = if self.config.rotate_user_agent {
            random_user_agent()
        } else {
            DEFAULT_USER_AGENT
        };

        debug!("Fetching page: {}", url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| transport_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Fetch of {} returned status: {}", url, status);
            return Err(status_error(status, url));
        }

        let html = response.text().await.map_err(|e| transport_error(e, url))?;
        let (title, body) = extract_content(&html);

        let mut text = match title {
            Some(t) if !t.is_empty() => format!("{}\n{}", t, body),
            _ => body,
        };
        if text.chars().count() > self.config.max_content_chars {
            text = text.chars().take(self.config.max_content_chars).collect();
        }

        Ok(RawInput::scraped(url, &text))
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "web"
    }

    async fn fetch(&self, source_ref: &SourceRef) -> Result<RawInput, SourceError> {
        match source_ref {
            SourceRef::Url(url) => self.fetch_page(url).await,
            other => Err(SourceError::NotFound(format!(
                "web fetcher cannot serve {}",
                other
            ))),
        }
    }
}

/// Extract title and visible text content from HTML
pub fn extract_content(html: &str) -> (Option<String>, String) {
    use scraper::node::Node;

    let document = Html::parse_document(html);

    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
    });

    let Some(body) = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
    else {
        return (title, String::new());
    };

    let mut text_parts = Vec::new();
    for node_ref in body.descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let in_excluded = node_ref.ancestors().any(|ancestor| {
                ancestor.value().as_element().is_some_and(|el| {
                    matches!(
                        el.name(),
                        "script" | "style" | "noscript" | "nav" | "footer" | "header"
                    )
                })
            });

            if !in_excluded {
                let trimmed = text_node.trim();
                if !trimmed.is_empty() {
                    text_parts.push(trimmed.to_string());
                }
            }
        }
    }

    (title, normalize_whitespace(&text_parts.join(" ")))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_skips_chrome() {
        let html = r#"
            <html>
            <head><title>Jansen Loodgieters</title></head>
            <body>
                <nav>Home | Contact</nav>
                <script>var x = 1;</script>
                <h1>Loodgieter in Utrecht</h1>
                <p>Al 12 jaar ervaring.</p>
                <style>.x { color: red; }</style>
                <footer>Cookiebeleid</footer>
            </body>
            </html>
        "#;

        let (title, text) = extract_content(html);

        assert_eq!(title, Some("Jansen Loodgieters".to_string()));
        assert!(text.contains("Loodgieter in Utrecht"));
        assert!(text.contains("12 jaar ervaring"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Cookiebeleid"));
        assert!(!text.contains("Home | Contact"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "u"),
            SourceError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "u"),
            SourceError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::GATEWAY_TIMEOUT, "u"),
            SourceError::Timeout(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "u"),
            SourceError::Transport(_)
        ));
    }

    #[test]
    fn test_default_config() {
        let config = HttpSourceConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert!(random_user_agent().contains("Mozilla"));
    }

    #[tokio::test]
    async fn test_rejects_non_url_refs() {
        let fetcher = HttpFetcher::new(HttpSourceConfig::default()).unwrap();
        let err = fetcher
            .fetch(&SourceRef::Registry("12345678".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }
}
