//! First-tier extraction: plain HTTP fetch plus structured-data parsing.
//!
//! No JavaScript execution. Covers the large fraction of job boards that
//! serve JSON-LD or meaningful server-rendered markup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::debug;
use url::Url;

use crate::error::ExtractError;
use crate::tiers::{dom, PageContext, Tier};
use crate::types::{TierAttempt, TierName};

pub struct StaticTier {
    client: reqwest::Client,
    timeout: Duration,
}

impl StaticTier {
    pub fn new(timeout: Duration) -> Self {
        // Browser-like headers; bare bot requests get blocked or served
        // stripped-down markup by several ATS vendors.
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            header::UPGRADE_INSECURE_REQUESTS,
            HeaderValue::from_static("1"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    async fn fetch_html(&self, url: &Url) -> Result<String, ExtractError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::fetch_timeout(url.as_str())
            } else {
                ExtractError::network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::http_status(status.as_u16(), url.as_str()));
        }

        response
            .text()
            .await
            .map_err(|e| ExtractError::network(e.to_string()))
    }
}

#[async_trait]
impl Tier for StaticTier {
    fn name(&self) -> TierName {
        TierName::Static
    }

    async fn attempt(&self, url: &Url, ctx: &mut PageContext) -> TierAttempt {
        debug!(url = %url, "static tier fetching page");

        let fetch = tokio::time::timeout(self.timeout, self.fetch_html(url));
        let html = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return TierAttempt::from_error(TierName::Static, ExtractError::Cancelled);
            }
            outcome = fetch => match outcome {
                Ok(Ok(html)) => html,
                Ok(Err(e)) => return TierAttempt::from_error(TierName::Static, e),
                Err(_) => {
                    return TierAttempt::from_error(
                        TierName::Static,
                        ExtractError::fetch_timeout(url.as_str()),
                    );
                }
            },
        };

        let fields = dom::extract_fields(&html, url);
        ctx.html = Some(html);

        TierAttempt::from_fields(TierName::Static, fields)
    }
}
