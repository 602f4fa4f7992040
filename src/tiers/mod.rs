//! Extraction tiers, in escalation order.
//!
//! The three tiers share one contract and differ only in how they obtain
//! page content and how much compute they spend. The engine iterates a
//! fixed, ordered list; tiers communicate "incomplete, try the next one"
//! through [`TierAttempt`] outcomes, never through error propagation.

pub mod dom;
pub mod rendered;
pub mod semantic;
pub mod static_parse;

pub use rendered::RenderedTier;
pub use semantic::SemanticTier;
pub use static_parse::StaticTier;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::types::{TierAttempt, TierName};

/// Mutable state threaded through one pipeline run.
///
/// Tiers that fetch page content leave it here so later tiers can reuse it:
/// the semantic tier works off whatever HTML the static or rendered tier
/// already obtained instead of fetching a third time.
pub struct PageContext {
    /// Most recent raw HTML obtained for this URL, if any.
    pub html: Option<String>,
    /// Batch-level cancellation flag, checked at suspension points.
    pub cancel: CancellationToken,
}

impl PageContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { html: None, cancel }
    }
}

/// One extraction strategy.
#[async_trait]
pub trait Tier: Send + Sync {
    fn name(&self) -> TierName;

    /// Whether the tier's prerequisites are configured. An unavailable tier
    /// is recorded as `TierUnavailable` and skipped, not retried.
    fn available(&self) -> bool {
        true
    }

    /// Try to extract fields for `url`. Never panics and never returns a
    /// transport error directly; every failure is folded into the attempt.
    async fn attempt(&self, url: &Url, ctx: &mut PageContext) -> TierAttempt;
}
