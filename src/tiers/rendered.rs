//! Second-tier extraction: headless Chromium rendering for pages that
//! assemble their content with JavaScript.
//!
//! One browser process is shared across attempts and launched lazily on the
//! first page that needs it. The CDP event handler must be polled for the
//! session to make progress, so it runs on its own task for the life of the
//! browser.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::error::ExtractError;
use crate::tiers::{dom, PageContext, Tier};
use crate::types::{TierAttempt, TierName};

/// Settle time after the navigation completes, for late XHR-driven DOM work.
const POST_NAVIGATION_SETTLE: Duration = Duration::from_millis(500);

struct BrowserHandle {
    browser: Arc<Browser>,
    handler_task: tokio::task::JoinHandle<()>,
}

pub struct RenderedTier {
    handle: Mutex<Option<BrowserHandle>>,
    timeout: Duration,
    enabled: bool,
}

impl RenderedTier {
    pub fn new(timeout: Duration, enabled: bool) -> Self {
        Self {
            handle: Mutex::new(None),
            timeout,
            enabled,
        }
    }

    async fn launch() -> Result<BrowserHandle, ExtractError> {
        let config = BrowserConfig::builder()
            .args(vec![
                "--no-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
            ])
            .build()
            .map_err(ExtractError::render)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ExtractError::render(e.to_string()))?;

        // The handler stream drives the CDP connection; the browser stalls
        // if it stops being polled.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    warn!(error = %err, "browser event handler error");
                }
            }
            debug!("browser event loop exited");
        });

        Ok(BrowserHandle {
            browser: Arc::new(browser),
            handler_task,
        })
    }

    /// Shared browser session, launched lazily on first use. The lock is
    /// held only for the launch; concurrent attempts render on their own
    /// pages without serializing behind each other.
    async fn browser(&self) -> Result<Arc<Browser>, ExtractError> {
        let mut guard = self.handle.lock().await;
        if guard.is_none() {
            debug!("launching headless browser");
            *guard = Some(Self::launch().await?);
        }
        guard
            .as_ref()
            .map(|handle| Arc::clone(&handle.browser))
            .ok_or_else(|| ExtractError::render("browser launch did not produce a session"))
    }

    /// Render the page and return its post-JavaScript HTML.
    async fn render_html(&self, url: &Url) -> Result<String, ExtractError> {
        let browser = self.browser().await?;

        let page = browser
            .new_page(url.as_str())
            .await
            .map_err(|e| ExtractError::render(e.to_string()))?;

        let rendered = async {
            page.wait_for_navigation()
                .await
                .map_err(|e| ExtractError::render(e.to_string()))?;
            tokio::time::sleep(POST_NAVIGATION_SETTLE).await;
            page.content()
                .await
                .map_err(|e| ExtractError::render(e.to_string()))
        }
        .await;

        if let Err(err) = page.close().await {
            debug!(error = %err, "failed to close rendered page");
        }

        rendered
    }

    /// Shut down the shared browser if one was launched.
    pub async fn shutdown(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            match Arc::try_unwrap(handle.browser) {
                Ok(mut browser) => {
                    if let Err(err) = browser.close().await {
                        debug!(error = %err, "browser close failed");
                    }
                    let _ = browser.wait().await;
                }
                Err(_) => {
                    // An attempt still holds the session; dropping the last
                    // clone ends the child process.
                    warn!("browser shut down while renders were in flight");
                }
            }
            handle.handler_task.abort();
        }
    }
}

#[async_trait]
impl Tier for RenderedTier {
    fn name(&self) -> TierName {
        TierName::Rendered
    }

    fn available(&self) -> bool {
        self.enabled
    }

    async fn attempt(&self, url: &Url, ctx: &mut PageContext) -> TierAttempt {
        debug!(url = %url, "rendered tier loading page");

        let render = tokio::time::timeout(self.timeout, self.render_html(url));
        let html = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return TierAttempt::from_error(TierName::Rendered, ExtractError::Cancelled);
            }
            outcome = render => match outcome {
                Ok(Ok(html)) => html,
                Ok(Err(e)) => return TierAttempt::from_error(TierName::Rendered, e),
                Err(_) => {
                    return TierAttempt::from_error(
                        TierName::Rendered,
                        ExtractError::render(format!("render timed out for {url}")),
                    );
                }
            },
        };

        let fields = dom::extract_fields(&html, url);
        ctx.html = Some(html);

        TierAttempt::from_fields(TierName::Rendered, fields)
    }
}
