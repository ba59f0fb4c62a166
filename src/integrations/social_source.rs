// src/integrations/social_source.rs
//! Social-proof fetch collaborator.
//!
//! Finds a public post by a handle that contains an expected piece of text.
//! The three outcomes are kept apart on purpose by the types:
//! - `Ok(Some(text))`: a matching post was found
//! - `Ok(None)`: the source answered and no such post exists
//! - `Err(_)`: the source could not be asked right now

use crate::error::UpstreamError;
use crate::services::secret_gate::SecretGate;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::sync::Arc;

/// Looks up public posts.
#[async_trait]
pub trait SocialProofSource: Send + Sync {
    async fn find_post(&self, handle: &str, pattern: &str) -> Result<Option<String>, UpstreamError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Deserialize)]
struct Tweet {
    text: String,
}

/// Twitter API v2 recent-search client.
pub struct TwitterClient {
    client: reqwest::Client,
    api_url: String,
    gate: Arc<SecretGate>,
}

impl TwitterClient {
    /// # Arguments
    /// * `api_url` - API root, e.g. "https://api.twitter.com/2"
    /// * `gate` - Secret gate holding the bearer token
    pub fn new(api_url: impl Into<String>, gate: Arc<SecretGate>) -> Self {
        TwitterClient {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            gate,
        }
    }
}

#[async_trait]
impl SocialProofSource for TwitterClient {
    async fn find_post(&self, handle: &str, pattern: &str) -> Result<Option<String>, UpstreamError> {
        let secrets = self
            .gate
            .bundle()
            .map_err(|e| UpstreamError::Unavailable(e.to_string()))?;

        let query = format!("from:{} \"{}\"", handle, pattern);
        let response = self
            .client
            .get(format!("{}/tweets/search/recent", self.api_url))
            .bearer_auth(&secrets.twitter_bearer_token)
            .query(&[("query", query.as_str()), ("max_results", "10")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Unavailable(format!("search answered {}", status)));
        }

        let results: SearchResponse = response.json().await?;
        debug!("Search for @{} returned {} posts", handle, results.data.len());
        Ok(results
            .data
            .into_iter()
            .map(|tweet| tweet.text)
            .find(|text| text.contains(pattern)))
    }
}
