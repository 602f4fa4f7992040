//! Per-URL extraction pipeline: validate, gate, then escalate through tiers
//! until one produces a complete result.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compliance::ComplianceGate;
use crate::error::{ComplianceReason, ExtractError};
use crate::redactor;
use crate::security::UrlValidator;
use crate::tiers::{PageContext, RenderedTier, SemanticTier, StaticTier, Tier};
use crate::types::{
    DecisionReason, EngineConfig, ExtractionResult, TierAttempt, TierOutcome,
};

/// Runs the full pipeline for one URL at a time. Cheap tiers run first;
/// escalation stops at the first complete result.
///
/// One engine is shared across a whole batch: the compliance gate's robots
/// cache and per-host pacing, and the rendered tier's browser process, are
/// engine-level state.
pub struct ExtractionEngine {
    gate: Arc<ComplianceGate>,
    tiers: Vec<Arc<dyn Tier>>,
    rendered: Option<Arc<RenderedTier>>,
    validator: UrlValidator,
}

impl ExtractionEngine {
    /// Build an engine with the standard static -> rendered -> semantic
    /// escalation chain. The semantic tier reads its credential from
    /// `OPENAI_API_KEY` and sits out when none is configured.
    pub fn new(config: EngineConfig) -> Self {
        let gate = Arc::new(ComplianceGate::new(
            config.compliance.clone(),
            config.user_agent.clone(),
        ));

        let rendered = Arc::new(RenderedTier::new(
            config.rendered_timeout,
            config.rendered_enabled,
        ));

        let tiers: Vec<Arc<dyn Tier>> = vec![
            Arc::new(StaticTier::new(config.static_timeout)),
            rendered.clone(),
            Arc::new(SemanticTier::from_env(config.semantic_timeout)),
        ];

        Self {
            gate,
            tiers,
            rendered: Some(rendered),
            validator: UrlValidator::new(),
        }
    }

    /// Build an engine with a caller-supplied tier chain. Used by tests and
    /// by embedders that bring their own tier implementations.
    pub fn with_tiers(config: EngineConfig, tiers: Vec<Arc<dyn Tier>>) -> Self {
        let gate = Arc::new(ComplianceGate::new(
            config.compliance.clone(),
            config.user_agent.clone(),
        ));
        Self {
            gate,
            tiers,
            rendered: None,
            validator: UrlValidator::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn gate(&self) -> &ComplianceGate {
        &self.gate
    }

    /// Release engine-level resources (the shared headless browser, if one
    /// was launched).
    pub async fn shutdown(&self) {
        if let Some(rendered) = &self.rendered {
            rendered.shutdown().await;
        }
    }

    /// Run the pipeline for one URL. Never returns `Err`: every failure mode
    /// is folded into a failed `ExtractionResult` so batch callers get one
    /// result per input.
    pub async fn run(&self, raw_url: &str, cancel: CancellationToken) -> ExtractionResult {
        let url = match self.validator.validate(raw_url) {
            Ok(url) => url,
            Err(e) => {
                debug!(url = %raw_url, error = %e, "URL rejected before fetch");
                return ExtractionResult::failure(raw_url, e, vec![]);
            }
        };

        // Compliance verdict comes before any page fetch; a refusal produces
        // a result with an empty attempt list.
        match self.gate.check(&url).await {
            Ok(decision) if !decision.allowed => {
                let reason = match decision.reason {
                    DecisionReason::Disallowed => ComplianceReason::Disallowed,
                    _ => ComplianceReason::Unreachable,
                };
                info!(url = %url, reason = %reason, "compliance gate refused URL");
                return ExtractionResult::failure(
                    raw_url,
                    ExtractError::ComplianceRejected { reason },
                    vec![],
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(url = %url, error = %e, "compliance check failed");
                return ExtractionResult::failure(raw_url, e, vec![]);
            }
        }

        let mut ctx = PageContext::new(cancel.clone());
        let mut attempts: Vec<TierAttempt> = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            if cancel.is_cancelled() {
                return ExtractionResult::failure(raw_url, ExtractError::Cancelled, attempts);
            }

            let name = tier.name();
            if !tier.available() {
                debug!(url = %url, tier = %name, "tier unavailable, skipping");
                attempts.push(TierAttempt::from_error(
                    name,
                    ExtractError::TierUnavailable { tier: name },
                ));
                continue;
            }

            let mut attempt = tier.attempt(&url, &mut ctx).await;

            // Nothing leaves the engine unredacted, including partial fields
            // recorded on incomplete attempts.
            if let Some(fields) = attempt.fields.take() {
                attempt.fields = Some(redactor::scrub_fields(fields));
            }

            debug!(
                url = %url,
                tier = %name,
                outcome = ?attempt.outcome,
                "tier attempt finished"
            );

            let success = attempt.is_success();
            let fields = if success { attempt.fields.clone() } else { None };
            attempts.push(attempt);

            if let Some(fields) = fields {
                info!(url = %url, tier = %name, "extraction complete");
                return ExtractionResult::success(raw_url, name, fields, attempts);
            }
        }

        // Every tier ran (or sat out) without a complete result. A terminal
        // error on the last attempt is more informative than the generic
        // exhaustion error.
        let error = match attempts.last() {
            Some(last) if last.outcome == TierOutcome::Error => last
                .error
                .clone()
                .unwrap_or(ExtractError::AllTiersExhausted),
            _ => ExtractError::AllTiersExhausted,
        };
        info!(url = %url, error = %error, "extraction failed after all tiers");
        ExtractionResult::failure(raw_url, error, attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::gate::RobotsFetch;
    use crate::compliance::RobotsPolicy;
    use crate::testing::MockTier;
    use crate::types::{ComplianceConfig, ExtractedFields, TierName};

    fn engine_with(tiers: Vec<Arc<dyn Tier>>) -> ExtractionEngine {
        let config =
            EngineConfig::default().with_compliance(ComplianceConfig::disabled());
        ExtractionEngine::with_tiers(config, tiers)
    }

    fn complete_fields() -> ExtractedFields {
        ExtractedFields {
            title: Some("Backend Engineer".into()),
            company: Some("Predli".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_complete_tier_wins() {
        let first = Arc::new(MockTier::new(TierName::Static).with_fields(complete_fields()));
        let second = Arc::new(MockTier::new(TierName::Rendered).with_fields(complete_fields()));
        let engine = engine_with(vec![first.clone(), second.clone()]);

        let result = engine
            .run("https://jobs.example.com/1", CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.method, Some(TierName::Static));
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(first.calls().len(), 1);
        assert!(second.calls().is_empty());
    }

    #[tokio::test]
    async fn incomplete_result_escalates() {
        let partial = ExtractedFields {
            title: Some("Backend Engineer".into()),
            ..Default::default()
        };
        let first = Arc::new(MockTier::new(TierName::Static).with_fields(partial));
        let second = Arc::new(MockTier::new(TierName::Rendered).with_fields(complete_fields()));
        let engine = engine_with(vec![first, second]);

        let result = engine
            .run("https://jobs.example.com/1", CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.method, Some(TierName::Rendered));
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].outcome, TierOutcome::Incomplete);
    }

    #[tokio::test]
    async fn unavailable_tier_is_recorded_and_skipped() {
        let first = Arc::new(MockTier::new(TierName::Static).unavailable());
        let second = Arc::new(MockTier::new(TierName::Semantic).with_fields(complete_fields()));
        let engine = engine_with(vec![first.clone(), second]);

        let result = engine
            .run("https://jobs.example.com/1", CancellationToken::new())
            .await;

        assert!(result.success);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(
            result.attempts[0].error,
            Some(ExtractError::TierUnavailable {
                tier: TierName::Static
            })
        );
        assert!(first.calls().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_when_nothing_completes() {
        let partial = ExtractedFields {
            title: Some("Engineer".into()),
            ..Default::default()
        };
        let first = Arc::new(MockTier::new(TierName::Static).with_fields(partial.clone()));
        let second = Arc::new(MockTier::new(TierName::Rendered).with_fields(partial));
        let engine = engine_with(vec![first, second]);

        let result = engine
            .run("https://jobs.example.com/1", CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(ExtractError::AllTiersExhausted));
        assert_eq!(result.attempts.len(), 2);
    }

    #[tokio::test]
    async fn last_tier_error_becomes_terminal_error() {
        let first = Arc::new(
            MockTier::new(TierName::Static)
                .with_error(ExtractError::http_status(403, "https://jobs.example.com/1")),
        );
        let second = Arc::new(
            MockTier::new(TierName::Rendered).with_error(ExtractError::render("crash")),
        );
        let engine = engine_with(vec![first, second]);

        let result = engine
            .run("https://jobs.example.com/1", CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(result.error, Some(ExtractError::render("crash")));
    }

    #[tokio::test]
    async fn invalid_url_fails_without_attempts() {
        let tier = Arc::new(MockTier::new(TierName::Static).with_fields(complete_fields()));
        let engine = engine_with(vec![tier.clone()]);

        let result = engine.run("not a url", CancellationToken::new()).await;

        assert!(!result.success);
        assert!(matches!(result.error, Some(ExtractError::InvalidUrl { .. })));
        assert!(result.attempts.is_empty());
        assert!(tier.calls().is_empty());
    }

    #[tokio::test]
    async fn disallowed_url_fails_with_empty_attempts() {
        let tier = Arc::new(MockTier::new(TierName::Static).with_fields(complete_fields()));
        let config = EngineConfig::default();
        let engine = ExtractionEngine::with_tiers(config, vec![tier.clone()]);

        let policy = RobotsPolicy::parse("User-agent: *\nDisallow: /");
        engine
            .gate()
            .seed_robots("blocked.example.com", RobotsFetch::Policy(policy));

        let result = engine
            .run("https://blocked.example.com/jobs/1", CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(
            result.error,
            Some(ExtractError::ComplianceRejected {
                reason: ComplianceReason::Disallowed
            })
        );
        assert!(result.attempts.is_empty());
        assert!(tier.calls().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_first_tier() {
        let tier = Arc::new(MockTier::new(TierName::Static).with_fields(complete_fields()));
        let engine = engine_with(vec![tier.clone()]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = engine.run("https://jobs.example.com/1", cancel).await;

        assert!(!result.success);
        assert_eq!(result.error, Some(ExtractError::Cancelled));
        assert!(tier.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_fields_are_redacted() {
        let fields = ExtractedFields {
            title: Some("Engineer".into()),
            company: Some("Acme".into()),
            description: Some("Apply to jobs@acme.com or call (555) 123-4567.".into()),
            ..Default::default()
        };
        let tier = Arc::new(MockTier::new(TierName::Static).with_fields(fields));
        let engine = engine_with(vec![tier]);

        let result = engine
            .run("https://jobs.example.com/1", CancellationToken::new())
            .await;

        let description = result.fields.unwrap().description.unwrap();
        assert!(description.contains("[EMAIL]"));
        assert!(description.contains("[PHONE]"));
        assert!(!description.contains("jobs@acme.com"));
    }
}
