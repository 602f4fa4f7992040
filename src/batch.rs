//! Batch orchestration: run many per-URL pipelines concurrently against one
//! shared engine, preserving input order in the output.

use std::collections::HashSet;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::ExtractionEngine;
use crate::error::ExtractError;
use crate::security::normalize_url;
use crate::types::{BatchConfig, BatchResult, ExtractionResult};

/// Fans a batch of URLs out over a bounded number of concurrent pipelines.
///
/// The engine is shared, so per-host pacing and the robots cache apply
/// across the whole batch no matter how the URLs interleave.
pub struct BatchCoordinator {
    engine: Arc<ExtractionEngine>,
    config: BatchConfig,
}

impl BatchCoordinator {
    pub fn new(engine: Arc<ExtractionEngine>, config: BatchConfig) -> Self {
        Self { engine, config }
    }

    /// Process a batch to completion. One result per input URL, in input
    /// order; individual failures never abort the batch.
    pub async fn run(&self, urls: &[String]) -> BatchResult {
        self.run_with_cancel(urls, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but URLs whose pipeline has not started when
    /// the token fires are failed as cancelled instead of being fetched.
    pub async fn run_with_cancel(
        &self,
        urls: &[String],
        cancel: CancellationToken,
    ) -> BatchResult {
        let concurrency = self.config.max_concurrency.max(1);
        info!(
            total = urls.len(),
            concurrency = concurrency,
            "starting extraction batch"
        );

        let mut slots: Vec<Option<ExtractionResult>> = vec![None; urls.len()];
        let mut seen: HashSet<String> = HashSet::with_capacity(urls.len());
        let mut pending: Vec<(usize, String)> = Vec::with_capacity(urls.len());

        // A repeated URL would double-fetch the same page within one batch;
        // later occurrences fail immediately instead.
        for (index, raw) in urls.iter().enumerate() {
            if seen.insert(normalize_url(raw)) {
                pending.push((index, raw.clone()));
            } else {
                slots[index] = Some(ExtractionResult::failure(
                    raw,
                    ExtractError::InvalidUrl {
                        url: raw.clone(),
                        reason: "duplicate URL in batch".to_string(),
                    },
                    vec![],
                ));
            }
        }

        let completed = stream::iter(pending.into_iter().map(|(index, raw)| {
            let engine = Arc::clone(&self.engine);
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return (
                        index,
                        ExtractionResult::failure(&raw, ExtractError::Cancelled, vec![]),
                    );
                }
                (index, engine.run(&raw, cancel).await)
            }
        }))
        .buffer_unordered(concurrency)
        .collect::<Vec<_>>()
        .await;

        for (index, result) in completed {
            slots[index] = Some(result);
        }

        let batch = BatchResult::from_results(slots.into_iter().flatten().collect());
        info!(
            total = batch.total,
            succeeded = batch.succeeded,
            failed = batch.failed,
            "extraction batch finished"
        );
        batch
    }
}
