//! Test doubles for exercising the engine and batch coordinator without the
//! network, a browser, or a model credential.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::ExtractError;
use crate::tiers::{PageContext, Tier};
use crate::types::{ExtractedFields, TierAttempt, TierName};

/// Scripted tier: returns a configured outcome and records every URL it was
/// asked to attempt.
///
/// ```rust,ignore
/// let tier = MockTier::new(TierName::Static)
///     .with_fields(fields)
///     .with_delay(Duration::from_millis(50));
/// assert_eq!(tier.calls().len(), 0);
/// ```
pub struct MockTier {
    name: TierName,
    available: bool,
    delay: Option<Duration>,
    response: MockResponse,
    calls: Arc<Mutex<Vec<String>>>,
}

enum MockResponse {
    Fields(ExtractedFields),
    Error(ExtractError),
}

impl MockTier {
    pub fn new(name: TierName) -> Self {
        Self {
            name,
            available: true,
            delay: None,
            response: MockResponse::Fields(ExtractedFields::default()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with these fields on every attempt.
    pub fn with_fields(mut self, fields: ExtractedFields) -> Self {
        self.response = MockResponse::Fields(fields);
        self
    }

    /// Fail every attempt with this error.
    pub fn with_error(mut self, error: ExtractError) -> Self {
        self.response = MockResponse::Error(error);
        self
    }

    /// Sleep before answering, for concurrency/ordering tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report the tier as unavailable; `attempt` is then never reached.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// URLs attempted so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Tier for MockTier {
    fn name(&self) -> TierName {
        self.name
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn attempt(&self, url: &Url, _ctx: &mut PageContext) -> TierAttempt {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.response {
            MockResponse::Fields(fields) => TierAttempt::from_fields(self.name, fields.clone()),
            MockResponse::Error(error) => TierAttempt::from_error(self.name, error.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn records_attempted_urls() {
        let tier = MockTier::new(TierName::Static).with_fields(ExtractedFields {
            title: Some("Engineer".into()),
            company: Some("Acme".into()),
            ..Default::default()
        });

        let url = Url::parse("https://jobs.example.com/1").unwrap();
        let mut ctx = PageContext::new(CancellationToken::new());
        let attempt = tier.attempt(&url, &mut ctx).await;

        assert!(attempt.is_success());
        assert_eq!(tier.calls(), vec!["https://jobs.example.com/1".to_string()]);
    }

    #[tokio::test]
    async fn scripted_error_comes_back() {
        let tier =
            MockTier::new(TierName::Rendered).with_error(ExtractError::render("no browser"));

        let url = Url::parse("https://jobs.example.com/1").unwrap();
        let mut ctx = PageContext::new(CancellationToken::new());
        let attempt = tier.attempt(&url, &mut ctx).await;

        assert_eq!(attempt.error, Some(ExtractError::render("no browser")));
    }
}
