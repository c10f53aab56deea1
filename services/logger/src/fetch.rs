use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use types::errors::FeedError;

/// Where the feed body comes from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn url(&self) -> &str;

    /// One fetch of the whole feed body.
    async fn fetch(&self) -> Result<String, FeedError>;
}

/// Unauthenticated HTTP GET of the feed.
pub struct HttpFeed {
    client: Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<String, FeedError> {
        let res = self
            .client
            .get(&self.url)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|e| FeedError::Network {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        if !res.status().is_success() {
            return Err(FeedError::Status {
                url: self.url.clone(),
                status: res.status().as_u16(),
            });
        }

        res.text().await.map_err(|e| FeedError::Body {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}
