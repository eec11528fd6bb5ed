//! fast.com endpoint discovery.
//!
//! Three scraping stages: the landing page names the app script, the script
//! embeds an API token, and the API hands out Open Connect download URLs.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use super::{EndpointSource, ProviderError};
use crate::config::ProviderConfig;

lazy_static! {
    static ref SCRIPT_RE: Regex = Regex::new(r#"app-[^"'\s/]*\.js"#).unwrap();
    static ref TOKEN_RE: Regex = Regex::new(r#"token:"([[:alpha:]]*)""#).unwrap();
    static ref URL_RE: Regex = Regex::new(r#""url":"(.*?)""#).unwrap();
}

pub struct FastProvider {
    client: Client,
    config: ProviderConfig,
}

impl FastProvider {
    pub fn new(config: &ProviderConfig, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client, config.clone()))
    }

    pub fn with_client(client: Client, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    /// Scrape the landing page and app script for the API token.
    pub async fn fetch_token(&self) -> Result<String, ProviderError> {
        let base = self.config.base_url.trim_end_matches('/');
        let page = self.get_page(base, &[]).await?;
        let script = extract_script(&page).ok_or_else(|| ProviderError::ScriptNotFound {
            url: base.to_string(),
        })?;

        let script_url = format!("{}/{}", base, script);
        debug!(%script_url, "fetching api token");
        let body = self.get_page(&script_url, &[]).await?;
        let token = extract_token(&body)
            .ok_or(ProviderError::TokenNotFound { url: script_url })?;

        debug!("api token found");
        Ok(token.to_string())
    }

    async fn get_page(&self, url: &str, query: &[(&str, String)]) -> Result<String, ProviderError> {
        let http_err = |source| ProviderError::Http {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?
            .text()
            .await
            .map_err(http_err)
    }
}

#[async_trait]
impl EndpointSource for FastProvider {
    async fn list_endpoints(&self) -> Result<Vec<String>, ProviderError> {
        let token = self.fetch_token().await?;
        let api_url = &self.config.api_url;
        debug!(%api_url, url_count = self.config.url_count, "requesting download urls");

        let query = [
            ("https", self.config.https.to_string()),
            ("token", token),
            ("urlCount", self.config.url_count.to_string()),
        ];
        let body = self.get_page(api_url, &query).await?;

        let urls = extract_urls(&body);
        if urls.is_empty() {
            return Err(ProviderError::NoUrls {
                url: api_url.clone(),
            });
        }
        for url in &urls {
            debug!(%url, "got download url");
        }
        Ok(urls)
    }
}

/// First `app-*.js` reference in the landing page.
pub fn extract_script(page: &str) -> Option<&str> {
    SCRIPT_RE.find(page).map(|m| m.as_str())
}

/// Value of the first `token:"..."` in the script; empty tokens don't count.
pub fn extract_token(script: &str) -> Option<&str> {
    TOKEN_RE
        .captures(script)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|t| !t.is_empty())
}

/// Every `"url":"..."` value in the API response, in order.
pub fn extract_urls(body: &str) -> Vec<String> {
    URL_RE
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
        .collect()
}
