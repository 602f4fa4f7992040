//! End-to-end escalation behavior through the public API, using mock tiers
//! so no network, browser, or model credential is required.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use jobflow_extract::{
    BatchConfig, BatchCoordinator, ComplianceConfig, EngineConfig, ExtractError, ExtractedFields,
    ExtractionEngine, MockTier, Tier, TierName, TierOutcome,
};

fn engine_with(tiers: Vec<Arc<dyn Tier>>) -> Arc<ExtractionEngine> {
    let config = EngineConfig::default().with_compliance(ComplianceConfig::disabled());
    Arc::new(ExtractionEngine::with_tiers(config, tiers))
}

fn complete_fields() -> ExtractedFields {
    ExtractedFields {
        title: Some("Backend Engineer".into()),
        company: Some("Predli".into()),
        location: Some("Stockholm, SE".into()),
        ..Default::default()
    }
}

fn partial_fields() -> ExtractedFields {
    ExtractedFields {
        title: Some("Backend Engineer".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn static_success_stops_escalation() {
    let static_tier = Arc::new(MockTier::new(TierName::Static).with_fields(complete_fields()));
    let rendered = Arc::new(MockTier::new(TierName::Rendered).with_fields(complete_fields()));
    let semantic = Arc::new(MockTier::new(TierName::Semantic).with_fields(complete_fields()));
    let engine = engine_with(vec![static_tier.clone(), rendered.clone(), semantic.clone()]);

    let result = engine
        .run("https://jobs.example.com/1", CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.method, Some(TierName::Static));
    assert_eq!(static_tier.calls().len(), 1);
    assert!(rendered.calls().is_empty());
    assert!(semantic.calls().is_empty());
}

#[tokio::test]
async fn incomplete_static_escalates_to_rendered() {
    let static_tier = Arc::new(MockTier::new(TierName::Static).with_fields(partial_fields()));
    let rendered = Arc::new(MockTier::new(TierName::Rendered).with_fields(complete_fields()));
    let semantic = Arc::new(MockTier::new(TierName::Semantic).with_fields(complete_fields()));
    let engine = engine_with(vec![static_tier, rendered.clone(), semantic.clone()]);

    let result = engine
        .run("https://jobs.example.com/1", CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.method, Some(TierName::Rendered));
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].outcome, TierOutcome::Incomplete);
    assert_eq!(result.attempts[1].outcome, TierOutcome::Success);
    assert_eq!(rendered.calls().len(), 1);
    assert!(semantic.calls().is_empty());
}

#[tokio::test]
async fn tier_error_escalates_like_incomplete() {
    let static_tier = Arc::new(
        MockTier::new(TierName::Static)
            .with_error(ExtractError::http_status(403, "https://jobs.example.com/1")),
    );
    let rendered = Arc::new(MockTier::new(TierName::Rendered).with_fields(complete_fields()));
    let engine = engine_with(vec![static_tier, rendered]);

    let result = engine
        .run("https://jobs.example.com/1", CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.method, Some(TierName::Rendered));
    assert_eq!(result.attempts[0].outcome, TierOutcome::Error);
}

#[tokio::test]
async fn all_incomplete_exhausts_tiers() {
    let tiers: Vec<Arc<dyn Tier>> = vec![
        Arc::new(MockTier::new(TierName::Static).with_fields(partial_fields())),
        Arc::new(MockTier::new(TierName::Rendered).with_fields(partial_fields())),
        Arc::new(MockTier::new(TierName::Semantic).with_fields(partial_fields())),
    ];
    let engine = engine_with(tiers);

    let result = engine
        .run("https://jobs.example.com/1", CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.error, Some(ExtractError::AllTiersExhausted));
    assert_eq!(result.attempts.len(), 3);
    // Partial fields stay visible in the attempt log even on failure.
    assert!(result.attempts.iter().all(|a| a.fields.is_some()));
}

#[tokio::test]
async fn malformed_url_never_reaches_a_tier() {
    let static_tier = Arc::new(MockTier::new(TierName::Static).with_fields(complete_fields()));
    let engine = engine_with(vec![static_tier.clone()]);

    let result = engine.run("not a url", CancellationToken::new()).await;

    assert!(!result.success);
    assert!(matches!(result.error, Some(ExtractError::InvalidUrl { .. })));
    assert!(result.attempts.is_empty());
    assert!(static_tier.calls().is_empty());
}

#[tokio::test]
async fn batch_returns_ordered_results_despite_varying_latency() {
    let tier = MockTier::new(TierName::Static)
        .with_fields(complete_fields())
        .with_delay(Duration::from_millis(15));
    let engine = engine_with(vec![Arc::new(tier)]);
    let coordinator = BatchCoordinator::new(
        engine,
        BatchConfig::default().with_max_concurrency(3),
    );

    let urls: Vec<String> = (1..=6)
        .map(|i| format!("https://host{i}.example.com/job"))
        .collect();
    let batch = coordinator.run(&urls).await;

    assert_eq!(batch.total, 6);
    assert_eq!(batch.succeeded, 6);
    for (input, result) in urls.iter().zip(&batch.results) {
        assert_eq!(input, &result.url);
    }
}

#[tokio::test]
async fn batch_mixes_failures_and_successes() {
    let tier = MockTier::new(TierName::Static).with_fields(complete_fields());
    let engine = engine_with(vec![Arc::new(tier)]);
    let coordinator = BatchCoordinator::new(engine, BatchConfig::default());

    let urls = vec![
        "https://a.example.com/job".to_string(),
        "ftp://bad.example.com/job".to_string(),
        "https://a.example.com/job".to_string(),
        "https://b.example.com/job".to_string(),
    ];
    let batch = coordinator.run(&urls).await;

    assert_eq!(batch.total, 4);
    assert_eq!(batch.succeeded, 2);
    assert_eq!(batch.failed, 2);
    // Unsupported scheme.
    assert!(matches!(
        batch.results[1].error,
        Some(ExtractError::InvalidUrl { .. })
    ));
    // Repeat of the first URL.
    match &batch.results[2].error {
        Some(ExtractError::InvalidUrl { reason, .. }) => {
            assert_eq!(reason, "duplicate URL in batch")
        }
        other => panic!("expected duplicate failure, got {other:?}"),
    }
}

#[tokio::test]
async fn contact_details_are_scrubbed_from_results() {
    let fields = ExtractedFields {
        title: Some("Backend Engineer".into()),
        company: Some("Predli".into()),
        description: Some(
            "Great role. Contact: Jane Smith at jane.smith@predli.com \
             or (612) 555-0147, or find her at linkedin.com/in/janesmith."
                .into(),
        ),
        ..Default::default()
    };
    let tier = Arc::new(MockTier::new(TierName::Static).with_fields(fields));
    let engine = engine_with(vec![tier]);

    let result = engine
        .run("https://jobs.predli.com/1", CancellationToken::new())
        .await;

    assert!(result.success);
    let description = result.fields.unwrap().description.unwrap();
    assert!(!description.contains("jane.smith@predli.com"));
    assert!(!description.contains("555-0147"));
    assert!(!description.contains("linkedin.com/in/janesmith"));
    assert!(description.contains("[EMAIL]"));
    assert!(description.contains("[PHONE]"));
    assert!(description.contains("[CONTACT_NAME]"));
    assert!(description.contains("Great role."));
}

#[tokio::test]
async fn unavailable_semantic_tier_is_skipped_not_fatal() {
    let tiers: Vec<Arc<dyn Tier>> = vec![
        Arc::new(MockTier::new(TierName::Static).with_fields(partial_fields())),
        Arc::new(MockTier::new(TierName::Rendered).with_fields(complete_fields())),
        Arc::new(MockTier::new(TierName::Semantic).unavailable()),
    ];
    let engine = engine_with(tiers);

    let result = engine
        .run("https://jobs.example.com/1", CancellationToken::new())
        .await;

    // Complete before the unavailable tier is ever consulted.
    assert!(result.success);
    assert_eq!(result.method, Some(TierName::Rendered));
    assert_eq!(result.attempts.len(), 2);
}

#[tokio::test]
async fn only_unavailable_tiers_means_exhaustion() {
    let tiers: Vec<Arc<dyn Tier>> = vec![
        Arc::new(MockTier::new(TierName::Rendered).unavailable()),
        Arc::new(MockTier::new(TierName::Semantic).unavailable()),
    ];
    let engine = engine_with(tiers);

    let result = engine
        .run("https://jobs.example.com/1", CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(
        result.error,
        Some(ExtractError::TierUnavailable {
            tier: TierName::Semantic
        })
    );
}

#[tokio::test]
async fn batch_cancellation_is_cooperative() {
    let tier = MockTier::new(TierName::Static)
        .with_fields(complete_fields())
        .with_delay(Duration::from_millis(50));
    let engine = engine_with(vec![Arc::new(tier)]);
    let coordinator = BatchCoordinator::new(
        engine,
        BatchConfig::default().with_max_concurrency(1),
    );

    let cancel = CancellationToken::new();
    let urls: Vec<String> = (1..=4)
        .map(|i| format!("https://host{i}.example.com/job"))
        .collect();

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(75)).await;
        cancel_clone.cancel();
    });

    let batch = coordinator.run_with_cancel(&urls, cancel).await;

    assert_eq!(batch.total, 4);
    // At least the first URL completes; later ones observe the cancellation.
    assert!(batch.succeeded >= 1);
    assert!(batch.failed >= 1);
    assert!(batch
        .results
        .iter()
        .filter(|r| !r.success)
        .all(|r| r.error == Some(ExtractError::Cancelled)));
}
